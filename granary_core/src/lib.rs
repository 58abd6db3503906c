//! Shared building blocks for the granary workspace.

/// Categories of errors for classification and handling.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad configuration, needs user fix
    Configuration,

    /// Invalid input, user error
    Validation,

    /// Network/IO errors, retry possible
    Temporary,

    /// Operation interrupted by an external stop signal
    Cancelled,

    /// Bugs, system errors
    Internal,
}

impl ErrorKind {
    /// Whether this error is retryable.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Temporary)
    }

    /// Standard exit code for this error category.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Configuration => 78, // EX_CONFIG
            Self::Validation => 64,    // EX_USAGE
            Self::Temporary => 75,     // EX_TEMPFAIL
            _ => 70,                   // EX_SOFTWARE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_temporary_errors_are_retryable() {
        assert!(ErrorKind::Temporary.is_retryable());
        assert!(!ErrorKind::Configuration.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
        assert!(!ErrorKind::Internal.is_retryable());
    }
}
