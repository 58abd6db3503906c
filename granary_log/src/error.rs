use granary_core::ErrorKind;
use snafu::Snafu;

/// Errors raised by log consumers.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConsumerError {
    /// The consumer was woken by an external signal while polling.
    #[snafu(display("consumer woken up"))]
    WokenUp,
    #[snafu(display("consumer is not subscribed or already closed"))]
    Closed,
    #[snafu(display("invalid consumer configuration: {message}"))]
    InvalidConfig { message: String },
    #[snafu(display("subscription failed: {message}"))]
    Subscription { message: String },
    #[snafu(display("offset commit failed: {message}"))]
    Commit { message: String },
    #[snafu(display("log backend error: {message}"))]
    Backend { message: String },
}

pub type Result<T, E = ConsumerError> = std::result::Result<T, E>;

impl ConsumerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WokenUp => ErrorKind::Cancelled,
            Self::Closed => ErrorKind::Internal,
            Self::InvalidConfig { .. } => ErrorKind::Configuration,
            Self::Subscription { .. } => ErrorKind::Configuration,
            Self::Commit { .. } => ErrorKind::Temporary,
            Self::Backend { .. } => ErrorKind::Temporary,
        }
    }
}
