#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use doorlock::actuator::ActuatorPort;
use doorlock::config::{ActuatorConfig, DenialPolicy, RemoteMode, SessionConfig};
use doorlock::controller::{self, LockController};
use doorlock::latency::{LatencyLog, LatencyRecord};
use doorlock::notify::NotificationPort;
use doorlock::router::{Responder, RouterConfig, TriggerRouter};
use doorlock::verify::{Credential, VerificationOutcome, Verifier};
use doorlock::{Error, LockState, Result, State};

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Drive(u128),
    Indicator(bool),
    PowerOff,
    Notify(String),
}

/// Shared log of everything the lock did to its ports, in order.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<Event>>>);

impl Events {
    pub fn all(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|event| match event {
                Event::Notify(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Number of actuations, counted by servo drive commands.
    pub fn drives(&self) -> usize {
        self.all()
            .iter()
            .filter(|event| matches!(event, Event::Drive(_)))
            .count()
    }

    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }
}

impl ActuatorPort for Events {
    fn drive(&mut self, pulse_width: Duration) {
        self.push(Event::Drive(pulse_width.as_micros()));
    }

    fn set_indicator(&mut self, lit: bool) {
        self.push(Event::Indicator(lit));
    }

    fn power_off(&mut self) {
        self.push(Event::PowerOff);
    }
}

impl NotificationPort for Events {
    fn notify(&mut self, message: &str) {
        self.push(Event::Notify(message.to_owned()));
    }
}

#[derive(Default)]
pub struct MemoryLatencyLog(Mutex<Vec<LatencyRecord>>);

impl MemoryLatencyLog {
    pub fn records(&self) -> Vec<LatencyRecord> {
        self.0.lock().unwrap().clone()
    }
}

impl LatencyLog for MemoryLatencyLog {
    fn append(&self, record: LatencyRecord) {
        self.0.lock().unwrap().push(record);
    }
}

/// Plays back a fixed list of verdicts; once exhausted every call succeeds.
#[derive(Default)]
pub struct ScriptedVerifier {
    script: Mutex<VecDeque<Result<VerificationOutcome>>>,
    seen: Mutex<Vec<Credential>>,
}

impl ScriptedVerifier {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Result<VerificationOutcome>>,
    {
        ScriptedVerifier {
            script: Mutex::new(script.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<Credential> {
        self.seen.lock().unwrap().clone()
    }
}

impl Verifier for ScriptedVerifier {
    fn verify(&self, credential: &Credential) -> Result<VerificationOutcome> {
        self.seen.lock().unwrap().push(credential.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(VerificationOutcome { succeed: true }))
    }
}

/// Blocks every call until the test releases a verdict for it.
pub struct GatedVerifier {
    entered: Mutex<Sender<usize>>,
    verdicts: Mutex<Receiver<Result<VerificationOutcome>>>,
    calls: Mutex<usize>,
}

impl GatedVerifier {
    /// Returns the verifier, a receiver told the 1-based number of each call as it
    /// starts, and a sender that releases the waiting call.
    pub fn new() -> (
        GatedVerifier,
        Receiver<usize>,
        Sender<Result<VerificationOutcome>>,
    ) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (verdict_tx, verdict_rx) = mpsc::channel();
        let verifier = GatedVerifier {
            entered: Mutex::new(entered_tx),
            verdicts: Mutex::new(verdict_rx),
            calls: Mutex::new(0),
        };
        (verifier, entered_rx, verdict_tx)
    }
}

impl Verifier for GatedVerifier {
    fn verify(&self, _credential: &Credential) -> Result<VerificationOutcome> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        let _ = self.entered.lock().unwrap().send(call);
        self.verdicts
            .lock()
            .unwrap()
            .recv()
            .unwrap_or_else(|_| Err(Error::VerificationTransport("gate closed".into())))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Ack,
    Rejected(String),
}

#[derive(Clone, Default)]
pub struct Replies(Arc<Mutex<Vec<Reply>>>);

impl Replies {
    pub fn responder(&self) -> RecordingResponder {
        RecordingResponder(self.clone())
    }

    pub fn all(&self) -> Vec<Reply> {
        self.0.lock().unwrap().clone()
    }
}

pub struct RecordingResponder(Replies);

impl Responder for RecordingResponder {
    fn acknowledge(self) {
        (self.0).0.lock().unwrap().push(Reply::Ack);
    }

    fn reject(self, err: &Error) {
        (self.0).0.lock().unwrap().push(Reply::Rejected(err.to_string()));
    }
}

pub fn succeed() -> Result<VerificationOutcome> {
    Ok(VerificationOutcome { succeed: true })
}

pub fn deny() -> Result<VerificationOutcome> {
    Ok(VerificationOutcome { succeed: false })
}

pub fn router_config(check_cert: bool, reps: u32) -> RouterConfig {
    RouterConfig {
        check_cert,
        session: SessionConfig {
            reps,
            interval: Duration::from_millis(5),
            denial_policy: DenialPolicy::Abandon,
        },
        remote_mode: RemoteMode::Absolute,
    }
}

/// A running controller thread with recording ports behind a router.
pub struct Rig {
    pub router: Arc<TriggerRouter>,
    pub events: Events,
    pub latency: Arc<MemoryLatencyLog>,
    pub status: Arc<RwLock<State>>,
    term: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Rig {
    pub fn start(initial: LockState, config: RouterConfig, verifier: Arc<dyn Verifier>) -> Rig {
        let events = Events::default();
        let latency = Arc::new(MemoryLatencyLog::default());
        let status = Arc::new(RwLock::new(State::new(initial)));
        let term = Arc::new(AtomicBool::new(false));
        let lock = LockController::new(
            initial,
            ActuatorConfig::default(),
            events.clone(),
            events.clone(),
        );
        let (handle, thread) = controller::spawn(lock, Arc::clone(&status), Arc::clone(&term));
        let router = Arc::new(TriggerRouter::new(
            handle,
            verifier,
            Arc::clone(&latency) as Arc<dyn LatencyLog>,
            config,
        ));
        Rig {
            router,
            events,
            latency,
            status,
            term,
            thread: Some(thread),
        }
    }

    /// Queued behind every earlier command, so it also flushes pending notifications.
    pub fn lock_state(&self) -> LockState {
        self.router.controller().state().unwrap()
    }

    pub fn toggles(&self) -> u64 {
        self.status.read().unwrap().toggles
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.term.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
