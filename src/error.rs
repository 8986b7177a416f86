// Crate-level error type and `Result` alias.
// Only fatal conditions live here; per-row and per-contact failures are
// reported through `RowOutcome`, `LookupFailure` and `PushOutcome` instead.
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("cannot read roster {path}: {source}")]
    Roster {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("cannot write report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl Error {
    pub fn config(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Error::Config {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
