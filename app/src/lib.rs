pub mod actuator;
pub mod config;
pub mod controller;
mod error;
pub mod http;
pub mod latency;
mod lock_state;
pub mod notify;
pub mod router;
pub mod session;
pub mod verify;

use std::time::Instant;

pub use error::{Error, Result};
pub use lock_state::LockState;

#[macro_export]
macro_rules! term_on_err {
    ($expr:expr, $term:expr) => {
        match $expr {
            std::result::Result::Ok(val) => val,
            std::result::Result::Err(err) => {
                log::error!("setting term due to error: {}", err);
                $term.store(true, std::sync::atomic::Ordering::SeqCst);
                break;
            }
        }
    };
}

/// Snapshot of the lock published by the controller thread for status readers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct State {
    pub lock_state: LockState,
    pub changed_at: Option<Instant>,
    pub toggles: u64,
}

impl State {
    pub fn new(lock_state: LockState) -> Self {
        State {
            lock_state,
            changed_at: None,
            toggles: 0,
        }
    }
}
