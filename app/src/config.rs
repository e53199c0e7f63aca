use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;

use crate::error::{Error, Result};

/// Servo pulse widths plus the delay after which drive is cut to avoid stall current.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ActuatorConfig {
    pub unlocked_pulse: Duration,
    pub locked_pulse: Duration,
    pub settle_delay: Duration,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        ActuatorConfig {
            unlocked_pulse: Duration::from_micros(1000),
            locked_pulse: Duration::from_micros(2200),
            settle_delay: Duration::from_millis(1500),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Pins {
    pub motor: u8,
    pub button: u8,
    pub led: u8,
}

/// How the remote virtual pin interprets `'0'` and `'1'`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RemoteMode {
    /// `'0'` always runs the unlock path and `'1'` the lock path, even if already there.
    Absolute,
    /// Any accepted value flips the current state.
    Toggle,
}

/// What a repeated session does when an attempt is denied.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DenialPolicy {
    /// Stop without answering the requester.
    Abandon,
    /// Count the attempt and keep polling.
    Skip,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionConfig {
    pub reps: u32,
    pub interval: Duration,
    pub denial_policy: DenialPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            reps: 100,
            interval: Duration::from_secs(2),
            denial_policy: DenialPolicy::Abandon,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlynkConfig {
    pub token: String,
    pub server: String,
    pub event_code: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub actuator: ActuatorConfig,
    pub pins: Pins,
    pub listen: SocketAddr,
    pub check_cert: bool,
    pub verify_url: String,
    pub session: SessionConfig,
    pub eval_file: PathBuf,
    pub remote_mode: RemoteMode,
    pub log_level: LevelFilter,
    pub blynk: Option<BlynkConfig>,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ActuatorConfig::default();
        let actuator = ActuatorConfig {
            unlocked_pulse: Duration::from_micros(parse_or(
                &lookup,
                "DOORLOCK_UNLOCKED_PULSE_US",
                defaults.unlocked_pulse.as_micros() as u64,
            )?),
            locked_pulse: Duration::from_micros(parse_or(
                &lookup,
                "DOORLOCK_LOCKED_PULSE_US",
                defaults.locked_pulse.as_micros() as u64,
            )?),
            settle_delay: Duration::from_millis(parse_or(
                &lookup,
                "DOORLOCK_SETTLE_MS",
                defaults.settle_delay.as_millis() as u64,
            )?),
        };

        let pins = Pins {
            motor: parse_or(&lookup, "DOORLOCK_MOTOR_PIN", 14)?,
            button: parse_or(&lookup, "DOORLOCK_BUTTON_PIN", 4)?,
            led: parse_or(&lookup, "DOORLOCK_LED_PIN", 17)?,
        };

        let reps = parse_or(&lookup, "DOORLOCK_REPS", 100u32)?;
        if reps == 0 {
            return Err(Error::config("DOORLOCK_REPS", "must be at least 1"));
        }
        let session = SessionConfig {
            reps,
            interval: Duration::from_millis(parse_or(&lookup, "DOORLOCK_POLL_INTERVAL_MS", 2000)?),
            denial_policy: match lookup("DOORLOCK_DENIAL_POLICY").as_deref() {
                None | Some("abandon") => DenialPolicy::Abandon,
                Some("skip") => DenialPolicy::Skip,
                Some(other) => {
                    return Err(Error::config(
                        "DOORLOCK_DENIAL_POLICY",
                        format!("expected abandon or skip, got {:?}", other),
                    ))
                }
            },
        };

        let remote_mode = match lookup("DOORLOCK_REMOTE_MODE").as_deref() {
            None | Some("absolute") => RemoteMode::Absolute,
            Some("toggle") => RemoteMode::Toggle,
            Some(other) => {
                return Err(Error::config(
                    "DOORLOCK_REMOTE_MODE",
                    format!("expected absolute or toggle, got {:?}", other),
                ))
            }
        };

        let blynk = lookup("BLYNK_TOKEN")
            .filter(|token| !token.is_empty())
            .map(|token| BlynkConfig {
                token,
                server: lookup("BLYNK_SERVER").unwrap_or_else(|| String::from("blynk.cloud")),
                event_code: lookup("BLYNK_EVENT_CODE")
                    .unwrap_or_else(|| String::from("door_event")),
            });

        Ok(Config {
            actuator,
            pins,
            listen: parse_or(
                &lookup,
                "DOORLOCK_LISTEN",
                SocketAddr::from(([0, 0, 0, 0], 3000)),
            )?,
            check_cert: parse_bool_or(&lookup, "DOORLOCK_CHECK_CERT", true)?,
            verify_url: lookup("DOORLOCK_VERIFY_URL")
                .unwrap_or_else(|| String::from("http://127.0.0.1:9020/verify")),
            session,
            eval_file: lookup("DOORLOCK_EVAL_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("eval-doorlock.csv")),
            remote_mode,
            log_level: parse_or(&lookup, "DOORLOCK_LOG_LEVEL", LevelFilter::Info)?,
            blynk,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err: T::Err| Error::config(key, format!("{:?}: {}", raw, err))),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some(other) => Err(Error::config(key, format!("expected a boolean, got {:?}", other))),
    }
}
