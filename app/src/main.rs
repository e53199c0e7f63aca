use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use std::{io, process, thread};

use log::{error, info, warn};
use rppal::gpio::{Gpio, InputPin, OutputPin, Trigger};
use syslog::Facility;

use doorlock::actuator::{ActuatorPort, LogActuator, ServoActuator};
use doorlock::config::{Config, Pins};
use doorlock::controller::{self, LockController, TriggerSource};
use doorlock::latency::FileLatencyLog;
use doorlock::notify::{BlynkNotifier, LogNotifier, NotificationPort};
use doorlock::router::{RouterConfig, TriggerRouter};
use doorlock::verify::HttpVerifier;
use doorlock::{http, LockState, State};

const ONE_SECOND: Duration = Duration::from_secs(1);

fn main() -> Result<(), io::Error> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {}", err);
            process::exit(2);
        }
    };
    if let Err(err) = syslog::init(Facility::LOG_DAEMON, config.log_level, Some("doorlock")) {
        eprintln!("Unable to connect to syslog: {}", err);
    }

    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&term))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&term))?;

    let mut threads = Vec::new();
    let state = Arc::new(RwLock::new(State::new(LockState::Locked)));

    // If the pins can't be acquired the lock keeps running without hardware so the
    // network surface stays up. A physical inspection of the device will show this.
    let (actuator, button) = match setup_gpio(config.pins) {
        Ok((motor, led, button)) => (
            Box::new(ServoActuator::new(motor, led)) as Box<dyn ActuatorPort>,
            Some(button),
        ),
        Err(err) => {
            error!("Unable to set up GPIO: {}", err);
            (Box::new(LogActuator) as Box<dyn ActuatorPort>, None)
        }
    };

    let notifier: Box<dyn NotificationPort> = match config.blynk.clone() {
        Some(blynk) => {
            let (notifier, thread) = BlynkNotifier::spawn(blynk);
            threads.push(thread);
            Box::new(notifier)
        }
        None => {
            warn!("BLYNK_TOKEN not set, notifications go to the log only");
            Box::new(LogNotifier)
        }
    };

    // Controller thread
    let lock = LockController::new(LockState::Locked, config.actuator, actuator, notifier);
    let (handle, thread) = controller::spawn(lock, Arc::clone(&state), Arc::clone(&term));
    threads.push(thread);

    info!("locking door");
    if let Err(err) = handle.set(LockState::Locked, TriggerSource::Startup) {
        error!("unable to lock door at startup: {}", err);
    }

    let router = Arc::new(TriggerRouter::new(
        handle,
        Arc::new(HttpVerifier::new(config.verify_url.clone())),
        Arc::new(FileLatencyLog::new(config.eval_file.clone())),
        RouterConfig::from(&config),
    ));

    // Button interrupts are delivered on rppal's interrupt thread. The pin must stay
    // alive for as long as the callback should fire.
    let _button = match button {
        Some(mut pin) => {
            let router = Arc::clone(&router);
            match pin.set_async_interrupt(Trigger::FallingEdge, move |level| {
                router.physical_edge(level)
            }) {
                Ok(()) => Some(pin),
                Err(err) => {
                    error!("Unable to watch button: {}", err);
                    None
                }
            }
        }
        None => None,
    };

    // Start HTTP server
    let remote_token = config.blynk.as_ref().map(|blynk| blynk.token.clone());
    let server = match http::Server::new(config.listen, remote_token) {
        Ok(server) => Arc::new(server),
        Err(err) => {
            error!("Unable to start http server on {}: {}", config.listen, err);
            eprintln!("Unable to start http server on {}: {}", config.listen, err);
            process::exit(1);
        }
    };
    info!("Server running on {}", config.listen);

    // Handle HTTP requests
    {
        let state = Arc::clone(&state);
        let server = Arc::clone(&server);
        let router = Arc::clone(&router);
        let thread = thread::spawn(move || {
            server.handle_requests(router, state);
            info!("server thread exiting");
        });
        threads.push(thread);
    }

    // Wait for signals to exit
    while !term.load(Ordering::Relaxed) {
        thread::sleep(ONE_SECOND);
    }
    server.shutdown();

    for thread in threads {
        let _ = thread.join();
    }

    Ok(())
}

fn setup_gpio(pins: Pins) -> doorlock::Result<(OutputPin, OutputPin, InputPin)> {
    let gpio = Gpio::new()?;
    let motor = gpio.get(pins.motor)?.into_output();
    let led = gpio.get(pins.led)?.into_output();
    let button = gpio.get(pins.button)?.into_input_pulldown();
    Ok((motor, led, button))
}
