use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LockState {
    Unlocked,
    Locked,
}

impl LockState {
    pub fn complement(self) -> Self {
        match self {
            LockState::Unlocked => LockState::Locked,
            LockState::Locked => LockState::Unlocked,
        }
    }

    /// The indicator LED is lit while locked.
    pub fn indicator(self) -> bool {
        self == LockState::Locked
    }

    pub fn message(self) -> &'static str {
        match self {
            LockState::Locked => "Door has been locked!",
            LockState::Unlocked => "Door has been unlocked!",
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockState::Locked => f.write_str("Locked"),
            LockState::Unlocked => f.write_str("Unlocked"),
        }
    }
}
