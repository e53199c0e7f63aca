use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use rppal::gpio::Level;

use crate::config::{Config, RemoteMode, SessionConfig};
use crate::controller::{ControllerHandle, TriggerSource};
use crate::error::{Error, Result};
use crate::latency::{LatencyLog, LatencyRecord};
use crate::notify::UNKNOWN_PARAMETER;
use crate::session::{RepeatedVerificationSession, SessionReport};
use crate::verify::{Credential, Verifier};
use crate::LockState;

/// Static body sent back to network callers. It says nothing about the lock.
pub const ACKNOWLEDGEMENT: [&str; 5] = ["Tony", "Lisa", "Michael", "Ginger", "Food"];

/// The caller waiting on a network trigger. Each responder answers at most once;
/// dropping it without answering abandons the caller.
pub trait Responder {
    fn acknowledge(self);

    fn reject(self, err: &Error);
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RemoteCommand {
    Unlock,
    Lock,
    Unknown,
}

impl RemoteCommand {
    /// Only the first character counts.
    pub fn parse(param: &str) -> Self {
        match param.chars().next() {
            Some('0') => RemoteCommand::Unlock,
            Some('1') => RemoteCommand::Lock,
            _ => RemoteCommand::Unknown,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub check_cert: bool,
    pub session: SessionConfig,
    pub remote_mode: RemoteMode,
}

impl From<&Config> for RouterConfig {
    fn from(config: &Config) -> Self {
        RouterConfig {
            check_cert: config.check_cert,
            session: config.session.clone(),
            remote_mode: config.remote_mode,
        }
    }
}

/// Applies each trigger's gating policy before it reaches the controller.
pub struct TriggerRouter {
    controller: ControllerHandle,
    verifier: Arc<dyn Verifier>,
    latency: Arc<dyn LatencyLog>,
    config: RouterConfig,
}

impl TriggerRouter {
    pub fn new(
        controller: ControllerHandle,
        verifier: Arc<dyn Verifier>,
        latency: Arc<dyn LatencyLog>,
        config: RouterConfig,
    ) -> Self {
        TriggerRouter {
            controller,
            verifier,
            latency,
            config,
        }
    }

    pub fn controller(&self) -> &ControllerHandle {
        &self.controller
    }

    /// Verify once (when checking is on), toggle on success, log, and always answer.
    ///
    /// A denial is still acknowledged. Returns the new state if the door moved.
    pub fn network_toggle<R: Responder>(
        &self,
        credential: Credential,
        responder: R,
    ) -> Option<LockState> {
        let started = Instant::now();
        let verified = if self.config.check_cert {
            match self.verifier.verify(&credential) {
                Ok(outcome) => outcome.succeed,
                Err(err) => {
                    warn!("verification failed: {}", err);
                    responder.reject(&err);
                    return None;
                }
            }
        } else {
            true
        };

        let toggled = if verified {
            match self.controller.toggle(TriggerSource::Network) {
                Ok(actuated) => Some(actuated.state),
                Err(err) => {
                    error!("unable to toggle: {}", err);
                    responder.reject(&err);
                    return None;
                }
            }
        } else {
            info!("Failed at verify");
            None
        };
        self.latency.append(LatencyRecord::since(started));
        responder.acknowledge();
        toggled
    }

    /// Runs a repeated session when checking is on. With checking off the door is
    /// toggled exactly once and `None` is returned.
    pub fn network_repeated<R: Responder>(
        &self,
        credential: Credential,
        responder: R,
    ) -> Option<SessionReport> {
        if self.config.check_cert {
            let session = RepeatedVerificationSession::new(
                credential,
                self.config.session.clone(),
                self.verifier.as_ref(),
                &self.controller,
                self.latency.as_ref(),
            );
            return Some(session.run(responder));
        }

        let started = Instant::now();
        match self.controller.toggle(TriggerSource::Network) {
            Ok(_) => {
                self.latency.append(LatencyRecord::since(started));
                responder.acknowledge();
            }
            Err(err) => {
                error!("unable to toggle: {}", err);
                responder.reject(&err);
            }
        }
        None
    }

    /// Button interrupt. Only the falling edge (line low) toggles; nothing is
    /// verified, logged or debounced.
    pub fn physical_edge(&self, level: Level) {
        debug!("button level: {:?}", level);
        if level == Level::Low {
            self.log_failure(self.controller.toggle(TriggerSource::Button).map(drop));
        }
    }

    /// Write to the remote virtual pin.
    pub fn remote_write(&self, param: &str) {
        debug!("V0: {:?}", param);
        let target = match RemoteCommand::parse(param) {
            RemoteCommand::Unlock => LockState::Unlocked,
            RemoteCommand::Lock => LockState::Locked,
            RemoteCommand::Unknown => {
                self.log_failure(self.controller.notify(UNKNOWN_PARAMETER));
                return;
            }
        };
        let done = match self.config.remote_mode {
            RemoteMode::Absolute => self.controller.set(target, TriggerSource::Remote),
            RemoteMode::Toggle => self.controller.toggle(TriggerSource::Remote),
        };
        self.log_failure(done.map(drop));
    }

    fn log_failure(&self, result: Result<()>) {
        if let Err(err) = result {
            error!("trigger dropped: {}", err);
        }
    }
}
