use granary_core::ErrorKind;
use granary_store::FileSystemError;
use snafu::Snafu;

/// Errors raised while encoding column files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ColumnarError {
    #[snafu(display("parquet error: {message}"))]
    Parquet {
        message: &'static str,
        source: ::parquet::errors::ParquetError,
    },
    #[snafu(display("record conversion error: {message}"))]
    Conversion {
        message: String,
        source: arrow::error::ArrowError,
    },
    #[snafu(display("invalid column file properties: {message}"))]
    InvalidProperties { message: String },
    #[snafu(display("filesystem error while {operation}"))]
    Store {
        operation: &'static str,
        source: FileSystemError,
    },
}

pub type Result<T, E = ColumnarError> = std::result::Result<T, E>;

impl ColumnarError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            // The parquet writer surfaces sink I/O failures as parquet
            // errors, so they are treated as retryable.
            Self::Parquet { .. } => ErrorKind::Temporary,
            Self::Conversion { .. } => ErrorKind::Internal,
            Self::InvalidProperties { .. } => ErrorKind::Configuration,
            Self::Store { source, .. } => source.kind(),
        }
    }
}
