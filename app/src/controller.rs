//! Owner of the one authoritative lock state.
//!
//! Every trigger reaches the lock through a [`ControllerHandle`], which queues a
//! [`Command`] for the controller thread. Commands are applied strictly in arrival
//! order; there is no other path to the state, so interleavings between triggers
//! are exactly the interleavings of the queue.
//!
//! Each actuation schedules a deferred power-off that cuts servo drive after the
//! settle delay. Later actuations do not cancel earlier power-offs, so a power-off
//! scheduled by one toggle can land while the servo is still moving for the next.
//! A [`PowerOffHandle`] can be cancelled explicitly.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::actuator::ActuatorPort;
use crate::config::ActuatorConfig;
use crate::error::{Error, Result};
use crate::notify::NotificationPort;
use crate::{term_on_err, LockState, State};

const ONE_SECOND: Duration = Duration::from_secs(1);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TriggerSource {
    Startup,
    Network,
    RepeatedNetwork,
    Button,
    Remote,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Startup => f.write_str("startup"),
            TriggerSource::Network => f.write_str("network"),
            TriggerSource::RepeatedNetwork => f.write_str("network (repeated)"),
            TriggerSource::Button => f.write_str("button"),
            TriggerSource::Remote => f.write_str("remote"),
        }
    }
}

/// Identifies one scheduled power-off. Generations increase monotonically.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PowerOffHandle(u64);

/// Result of a toggle or set: the state now held and the power-off it scheduled.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Actuated {
    pub state: LockState,
    pub power_off: PowerOffHandle,
}

pub enum Command {
    Toggle {
        source: TriggerSource,
        reply: Option<Sender<Actuated>>,
    },
    Set {
        target: LockState,
        source: TriggerSource,
        reply: Option<Sender<Actuated>>,
    },
    Notify(String),
    CancelPowerOff {
        handle: PowerOffHandle,
        reply: Sender<bool>,
    },
    Query(Sender<LockState>),
}

impl Command {
    fn take_reply(self) -> (Command, Option<Sender<Actuated>>) {
        match self {
            Command::Toggle { source, reply } => (Command::Toggle { source, reply: None }, reply),
            Command::Set {
                target,
                source,
                reply,
            } => (
                Command::Set {
                    target,
                    source,
                    reply: None,
                },
                reply,
            ),
            other => (other, None),
        }
    }
}

pub struct LockController<A, N> {
    state: LockState,
    config: ActuatorConfig,
    actuator: A,
    notifier: N,
    next_generation: u64,
    pending: Vec<(PowerOffHandle, Instant)>,
}

impl<A, N> LockController<A, N>
where
    A: ActuatorPort,
    N: NotificationPort,
{
    /// `initial` is assumed, not driven; issue a `set` to put the hardware there.
    pub fn new(initial: LockState, config: ActuatorConfig, actuator: A, notifier: N) -> Self {
        LockController {
            state: initial,
            config,
            actuator,
            notifier,
            next_generation: 0,
            pending: Vec::new(),
        }
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn toggle(&mut self, now: Instant) -> Actuated {
        self.actuate(self.state.complement(), now)
    }

    /// Runs the full actuation path even when `target` is already the current state.
    pub fn set(&mut self, target: LockState, now: Instant) -> Actuated {
        self.actuate(target, now)
    }

    pub fn notify(&mut self, message: &str) {
        self.notifier.notify(message)
    }

    fn actuate(&mut self, target: LockState, now: Instant) -> Actuated {
        let pulse = match target {
            LockState::Locked => self.config.locked_pulse,
            LockState::Unlocked => self.config.unlocked_pulse,
        };
        self.actuator.drive(pulse);
        self.actuator.set_indicator(target.indicator());
        self.state = target;
        self.notifier.notify(target.message());

        let handle = PowerOffHandle(self.next_generation);
        self.next_generation += 1;
        self.pending.push((handle, now + self.config.settle_delay));
        Actuated {
            state: target,
            power_off: handle,
        }
    }

    /// Returns false if the power-off already ran or was cancelled before.
    pub fn cancel_power_off(&mut self, handle: PowerOffHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(pending, _)| *pending != handle);
        self.pending.len() != before
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|(_, deadline)| *deadline).min()
    }

    /// Runs every power-off whose deadline is at or before `now`, oldest first.
    pub fn fire_due(&mut self, now: Instant) -> usize {
        let mut due: Vec<_> = self
            .pending
            .iter()
            .copied()
            .filter(|(_, deadline)| *deadline <= now)
            .collect();
        if due.is_empty() {
            return 0;
        }
        due.sort();
        self.pending.retain(|(_, deadline)| *deadline > now);
        for (handle, _) in &due {
            debug!("power-off {:?} fired", handle);
            self.actuator.power_off();
        }
        due.len()
    }

    /// Cuts drive for everything still pending.
    pub fn shutdown(&mut self) {
        if !self.pending.is_empty() {
            self.pending.clear();
            self.actuator.power_off();
        }
    }

    /// Applies one queued command. Returns the actuation, if the command caused one.
    pub fn handle(&mut self, command: Command, now: Instant) -> Option<Actuated> {
        match command {
            Command::Toggle { source, reply } => {
                let actuated = self.toggle(now);
                info!("{} toggled door: {}", source, actuated.state);
                if let Some(reply) = reply {
                    let _ = reply.send(actuated);
                }
                Some(actuated)
            }
            Command::Set {
                target,
                source,
                reply,
            } => {
                let actuated = self.set(target, now);
                info!("{} set door: {}", source, actuated.state);
                if let Some(reply) = reply {
                    let _ = reply.send(actuated);
                }
                Some(actuated)
            }
            Command::Notify(message) => {
                self.notify(&message);
                None
            }
            Command::CancelPowerOff { handle, reply } => {
                let _ = reply.send(self.cancel_power_off(handle));
                None
            }
            Command::Query(reply) => {
                let _ = reply.send(self.state);
                None
            }
        }
    }
}

/// Cheap, cloneable entry point to the controller thread.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: Sender<Command>,
}

impl ControllerHandle {
    fn channel() -> (ControllerHandle, Receiver<Command>) {
        let (tx, rx) = mpsc::channel();
        (ControllerHandle { tx }, rx)
    }

    pub fn toggle(&self, source: TriggerSource) -> Result<Actuated> {
        let (reply, rx) = mpsc::channel();
        self.send(Command::Toggle {
            source,
            reply: Some(reply),
        })?;
        rx.recv().map_err(|_| Error::ControllerGone)
    }

    pub fn set(&self, target: LockState, source: TriggerSource) -> Result<Actuated> {
        let (reply, rx) = mpsc::channel();
        self.send(Command::Set {
            target,
            source,
            reply: Some(reply),
        })?;
        rx.recv().map_err(|_| Error::ControllerGone)
    }

    pub fn notify(&self, message: &str) -> Result<()> {
        self.send(Command::Notify(message.to_owned()))
    }

    pub fn cancel_power_off(&self, handle: PowerOffHandle) -> Result<bool> {
        let (reply, rx) = mpsc::channel();
        self.send(Command::CancelPowerOff { handle, reply })?;
        rx.recv().map_err(|_| Error::ControllerGone)
    }

    /// Current state, read in queue order after everything sent before it.
    pub fn state(&self) -> Result<LockState> {
        let (reply, rx) = mpsc::channel();
        self.send(Command::Query(reply))?;
        rx.recv().map_err(|_| Error::ControllerGone)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| Error::ControllerGone)
    }
}

/// Starts the controller thread. It runs until `term` is set or every handle is dropped.
pub fn spawn<A, N>(
    controller: LockController<A, N>,
    status: Arc<RwLock<State>>,
    term: Arc<AtomicBool>,
) -> (ControllerHandle, JoinHandle<()>)
where
    A: ActuatorPort + 'static,
    N: NotificationPort + 'static,
{
    let (handle, rx) = ControllerHandle::channel();
    let thread = thread::spawn(move || run(controller, rx, status, term));
    (handle, thread)
}

fn run<A, N>(
    mut controller: LockController<A, N>,
    rx: Receiver<Command>,
    status: Arc<RwLock<State>>,
    term: Arc<AtomicBool>,
) where
    A: ActuatorPort,
    N: NotificationPort,
{
    while !term.load(Ordering::Relaxed) {
        let now = Instant::now();
        controller.fire_due(now);
        let wait = controller
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
            .map_or(ONE_SECOND, |until| until.min(ONE_SECOND));

        match rx.recv_timeout(wait) {
            Ok(command) => {
                let now = Instant::now();
                // Answer only after the snapshot is published so callers never read a stale one.
                let (command, reply) = command.take_reply();
                if let Some(actuated) = controller.handle(command, now) {
                    {
                        let mut current = term_on_err!(status.write(), &term);
                        if current.lock_state != actuated.state {
                            current.changed_at = Some(now);
                        }
                        current.lock_state = actuated.state;
                        current.toggles += 1;
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(actuated);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("all controller handles dropped");
                break;
            }
        }
    }
    controller.shutdown();
    info!("controller thread exiting");
}
