use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The round-trip to the verification authority did not complete.
    #[error("verification transport failed: {0}")]
    VerificationTransport(String),

    /// The verification authority answered with something other than `{"succeed": bool}`.
    #[error("malformed verification response: {0}")]
    VerificationParse(String),

    /// The controller thread has exited and no longer accepts commands.
    #[error("lock controller is not running")]
    ControllerGone,

    #[error("invalid value for {key}: {message}")]
    Config { key: &'static str, message: String },

    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn config(key: &'static str, message: impl Into<String>) -> Self {
        Error::Config {
            key,
            message: message.into(),
        }
    }
}
