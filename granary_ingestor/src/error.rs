use granary_columnar::ColumnarError;
use granary_core::ErrorKind;
use granary_log::{ConsumerError, Offset, PartitionId};
use granary_store::FileSystemError;
use snafu::Snafu;

/// Validation errors raised when building an ingestor.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("instance name cannot be empty"))]
    EmptyInstanceName,
    #[snafu(display("topic cannot be empty"))]
    EmptyTopic,
    #[snafu(display("target directory cannot be empty"))]
    EmptyTargetDir,
    #[snafu(display("consumer properties cannot be empty"))]
    EmptyConsumerProperties,
    #[snafu(display("worker count must be positive"))]
    InvalidWorkerCount,
    #[snafu(display("max file bytes must be zero or at least {min}, got {got}"))]
    InvalidMaxFileBytes { min: u64, got: u64 },
    #[snafu(display("invalid directory date pattern '{pattern}'"))]
    InvalidDirectoryPattern { pattern: String },
}

/// A record whose bytes could not be parsed into the configured type.
#[derive(Debug, Snafu)]
#[snafu(display("{message}"))]
pub struct ParseError {
    pub message: String,
}

/// Errors raised by the running ingest engine.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IngestorError {
    #[snafu(display("consumer operation '{operation}' failed"))]
    Consumer {
        operation: &'static str,
        source: ConsumerError,
    },
    #[snafu(display("filesystem operation '{operation}' failed"))]
    Store {
        operation: &'static str,
        source: FileSystemError,
    },
    #[snafu(display("column writer operation '{operation}' failed"))]
    Columnar {
        operation: &'static str,
        source: ColumnarError,
    },
    #[snafu(display("malformed record at partition {partition} offset {offset}: {source}"))]
    MalformedRecord {
        partition: PartitionId,
        offset: Offset,
        source: ParseError,
    },
    #[snafu(display("connecting to the log timed out"))]
    StartupTimeout,
    #[snafu(display("wake/stop signal observed while the worker is still running"))]
    UnexpectedWakeup,
    #[snafu(display("ingestor is already started"))]
    AlreadyStarted,
}

pub type Result<T, E = IngestorError> = std::result::Result<T, E>;

impl IngestorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Consumer { source, .. } => source.kind(),
            Self::Store { source, .. } => source.kind(),
            Self::Columnar { source, .. } => source.kind(),
            Self::MalformedRecord { .. } => ErrorKind::Validation,
            Self::StartupTimeout => ErrorKind::Temporary,
            Self::UnexpectedWakeup => ErrorKind::Internal,
            Self::AlreadyStarted => ErrorKind::Internal,
        }
    }
}
