use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, error};

/// Time taken by one gating decision, from trigger to door command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LatencyRecord {
    pub elapsed: Duration,
}

impl LatencyRecord {
    pub fn since(start: Instant) -> Self {
        LatencyRecord {
            elapsed: start.elapsed(),
        }
    }

    pub fn millis(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

/// Append-only sink for latency records. Failures are logged, never returned.
pub trait LatencyLog: Send + Sync {
    fn append(&self, record: LatencyRecord);
}

/// Newline-delimited milliseconds, one line per record.
pub struct FileLatencyLog {
    path: PathBuf,
}

impl FileLatencyLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileLatencyLog { path: path.into() }
    }
}

impl LatencyLog for FileLatencyLog {
    fn append(&self, record: LatencyRecord) {
        debug!("gating decision took {}ms", record.millis());
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", record.millis()));
        if let Err(err) = written {
            error!(
                "unable to append latency to {}: {}",
                self.path.display(),
                err
            );
        }
    }
}
