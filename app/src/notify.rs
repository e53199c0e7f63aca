use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use log::{info, warn};

use crate::config::BlynkConfig;

pub const UNKNOWN_PARAMETER: &str = "Door lock button was pressed with unknown parameter";

/// Fire-and-forget push notifications.
pub trait NotificationPort: Send {
    fn notify(&mut self, message: &str);
}

impl<T: NotificationPort + ?Sized> NotificationPort for Box<T> {
    fn notify(&mut self, message: &str) {
        (**self).notify(message)
    }
}

/// Sends Blynk events from a dedicated thread so the caller never waits on the network.
pub struct BlynkNotifier {
    tx: Sender<String>,
}

impl BlynkNotifier {
    pub fn spawn(config: BlynkConfig) -> (BlynkNotifier, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel::<String>();
        let thread = thread::spawn(move || {
            let agent = ureq::AgentBuilder::new().build();
            let url = format!("https://{}/external/api/logEvent", config.server);
            // Exits once every sender is gone.
            for message in rx {
                let sent = agent
                    .get(&url)
                    .query("token", &config.token)
                    .query("code", &config.event_code)
                    .query("description", &message)
                    .call();
                if let Err(err) = sent {
                    warn!("unable to send notification {:?}: {}", message, err);
                }
            }
            info!("notification thread exiting");
        });
        (BlynkNotifier { tx }, thread)
    }
}

impl NotificationPort for BlynkNotifier {
    fn notify(&mut self, message: &str) {
        if self.tx.send(message.to_owned()).is_err() {
            warn!("notification thread gone, dropping {:?}", message);
        }
    }
}

/// Used when no Blynk token is configured.
pub struct LogNotifier;

impl NotificationPort for LogNotifier {
    fn notify(&mut self, message: &str) {
        info!("notify: {}", message);
    }
}
