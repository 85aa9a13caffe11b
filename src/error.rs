//! Error taxonomy shared by the library and the CLI.
//!
//! Worker threads never unwind across the pipeline: the first error is
//! published to a [`FirstError`] slot together with an abort flag, the other
//! workers drain their current unit of work and exit, and the controller
//! surfaces the stored error to the caller.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes surfaced by the counting, dumping and merging paths.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid run parameters (bad k, zero size, inconsistent widths).
    /// Reported synchronously, before any work starts.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Malformed FASTA/FASTQ input.
    #[error("malformed input in '{}': {reason}", path.display())]
    InputFormat { path: PathBuf, reason: String },

    /// Open/read/write failure, with the path it happened on.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Hash array full with growth disabled or exhausted, and no dump
    /// destination available to spill to.
    #[error("hash array full: {0}")]
    Capacity(String),

    /// Incompatible snapshots handed to the merger.
    #[error("cannot merge: {0}")]
    Merge(String),

    /// A CAS loop exceeded its retry bound; the backing memory can no
    /// longer be trusted.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    /// Wrap an `io::Error` with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error kind: 1 user/input error,
    /// 2 I/O error, 3 internal invariant violation.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) | Error::InputFormat { .. } | Error::Capacity(_) | Error::Merge(_) => {
                1
            }
            Error::Io { .. } => 2,
            Error::Invariant(_) => 3,
        }
    }
}

/// First-error-wins slot shared by a worker group.
///
/// `record` stores only the earliest error and raises the abort flag; the
/// flag is cheap to poll from hot loops (one `Relaxed` load per queue
/// round-trip).
#[derive(Default)]
pub struct FirstError {
    aborted: AtomicBool,
    slot: Mutex<Option<Error>>,
}

impl FirstError {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once any worker has recorded an error.
    #[inline]
    pub fn aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Record `err` if no error has been recorded yet, then raise the flag.
    pub fn record(&self, err: Error) {
        let mut slot = self.slot.lock().unwrap();
        if slot.is_none() {
            *slot = Some(err);
        }
        self.aborted.store(true, Ordering::Release);
    }

    /// Take the stored error, if any. Called by the controller after join.
    pub fn take(&self) -> Option<Error> {
        self.slot.lock().unwrap().take()
    }
}
