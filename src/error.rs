use std::path::PathBuf;

/// Failures raised by the flat-file record store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("table `{table}` is malformed at line {line}: {reason}")]
    Malformed {
        table: String,
        line: usize,
        reason: String,
    },
    #[error("timed out waiting for the lock on table `{table}`")]
    LockTimeout { table: String },
    #[error("unknown table `{0}`")]
    UnknownTable(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures surfaced by the domain commands.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("invalid input: {0}")]
    Invalid(String),
}

impl AppError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
