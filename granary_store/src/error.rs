use std::path::PathBuf;

use granary_core::ErrorKind;
use snafu::Snafu;

/// Errors raised by filesystem implementations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FileSystemError {
    #[snafu(display("i/o failure on '{}'", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("i/o operation on '{}' interrupted", path.display()))]
    Interrupted { path: PathBuf },
}

pub type Result<T, E = FileSystemError> = std::result::Result<T, E>;

impl FileSystemError {
    /// Wrap an I/O error, mapping interruption onto its own class so
    /// retrying callers can surface it as cancellation.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::Interrupted {
            Self::Interrupted { path }
        } else {
            Self::Io { path, source }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Temporary,
            Self::Interrupted { .. } => ErrorKind::Cancelled,
        }
    }
}
