//! Repeated verification: verify, toggle, log, wait, and go again.
//!
//! A session exists to measure the verify-then-toggle cycle under load, so every
//! successful attempt physically moves the door. After `reps` successful attempts the
//! door is back where it started if `reps` is even and flipped if it is odd.
//!
//! ```text
//!            verified, remaining > 0
//!           ┌──────────────────────┐
//!           v                      │
//!       Pending ───────────────────┘
//!        │  │  │
//!        │  │  └─ remaining = 0 ──> Success   (every attempt toggled)   ack
//!        │  │                   └─> Exhausted (some attempt denied)     ack
//!        │  └──── denied (abandon) ──> Failed                            no reply
//!        └─────── verifier error  ──> Failed                            error reply
//! ```
//!
//! There is no way to stop a session from outside once it has started.

use std::thread;
use std::time::Instant;

use log::{info, warn};

use crate::config::{DenialPolicy, SessionConfig};
use crate::controller::{ControllerHandle, TriggerSource};
use crate::error::Result;
use crate::latency::{LatencyLog, LatencyRecord};
use crate::router::Responder;
use crate::verify::{Credential, VerificationOutcome, Verifier};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SessionState {
    Pending,
    Success,
    Exhausted,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self != SessionState::Pending
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SessionReport {
    pub state: SessionState,
    pub attempts: u32,
    pub toggles: u32,
    pub denials: u32,
}

pub struct RepeatedVerificationSession<'a> {
    credential: Credential,
    config: SessionConfig,
    remaining: u32,
    state: SessionState,
    attempts: u32,
    toggles: u32,
    denials: u32,
    verifier: &'a dyn Verifier,
    controller: &'a ControllerHandle,
    latency: &'a dyn LatencyLog,
}

impl<'a> RepeatedVerificationSession<'a> {
    pub fn new(
        credential: Credential,
        config: SessionConfig,
        verifier: &'a dyn Verifier,
        controller: &'a ControllerHandle,
        latency: &'a dyn LatencyLog,
    ) -> Self {
        RepeatedVerificationSession {
            credential,
            remaining: config.reps.max(1),
            config,
            state: SessionState::Pending,
            attempts: 0,
            toggles: 0,
            denials: 0,
            verifier,
            controller,
            latency,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs attempts until the session reaches a terminal state.
    ///
    /// `responder` is acknowledged on `Success`/`Exhausted`, rejected on a verifier
    /// or controller error, and dropped unanswered when an attempt is denied under
    /// [`DenialPolicy::Abandon`].
    pub fn run<R: Responder>(mut self, responder: R) -> SessionReport {
        info!(
            "repeated session started: {} attempts every {:?}",
            self.remaining, self.config.interval
        );
        loop {
            let started = Instant::now();
            let verdict = self.verifier.verify(&self.credential);
            match self.advance(verdict, started) {
                Ok(SessionState::Pending) => thread::sleep(self.config.interval),
                Ok(SessionState::Failed) => {
                    warn!("repeated session abandoned after a denied verification");
                    drop(responder);
                    break;
                }
                Ok(_) => {
                    responder.acknowledge();
                    break;
                }
                Err(err) => {
                    warn!("repeated session failed: {}", err);
                    responder.reject(&err);
                    break;
                }
            }
        }
        let report = self.report();
        info!("repeated session finished: {:?}", report);
        report
    }

    /// Applies one attempt's verdict and returns the resulting state.
    ///
    /// A finished session ignores further verdicts and keeps its terminal state.
    pub fn advance(
        &mut self,
        verdict: Result<VerificationOutcome>,
        started: Instant,
    ) -> Result<SessionState> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        self.attempts += 1;
        let outcome = match verdict {
            Ok(outcome) => outcome,
            Err(err) => {
                self.state = SessionState::Failed;
                return Err(err);
            }
        };

        if outcome.succeed {
            if let Err(err) = self.controller.toggle(TriggerSource::RepeatedNetwork) {
                self.state = SessionState::Failed;
                return Err(err);
            }
            self.toggles += 1;
        } else {
            info!("Failed at verify (attempt {})", self.attempts);
            match self.config.denial_policy {
                DenialPolicy::Abandon => {
                    self.state = SessionState::Failed;
                    return Ok(self.state);
                }
                DenialPolicy::Skip => self.denials += 1,
            }
        }
        self.latency.append(LatencyRecord::since(started));

        self.remaining -= 1;
        self.state = match (self.remaining, self.denials) {
            (0, 0) => SessionState::Success,
            (0, _) => SessionState::Exhausted,
            _ => SessionState::Pending,
        };
        Ok(self.state)
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            state: self.state,
            attempts: self.attempts,
            toggles: self.toggles,
            denials: self.denials,
        }
    }
}
