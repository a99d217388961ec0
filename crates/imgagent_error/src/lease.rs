//! Lease coordination error types.

/// Lease error conditions.
///
/// Losing a lease is not an error here; it is reported through the
/// renewal outcome. These kinds cover the backend itself misbehaving.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum LeaseErrorKind {
    /// Could not reach the lease backend
    #[display("Lease backend connection error: {}", _0)]
    Connection(String),
    /// Backend command failed
    #[display("Lease backend command error: {}", _0)]
    Command(String),
    /// Backend returned something we could not interpret
    #[display("Unexpected lease backend reply: {}", _0)]
    UnexpectedReply(String),
}

/// Lease error with source location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Lease Error: {} at line {} in {}", kind, line, file)]
pub struct LeaseError {
    /// The kind of error that occurred
    pub kind: LeaseErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl LeaseError {
    /// Create a new LeaseError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: LeaseErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for LeaseError {
    #[track_caller]
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            LeaseError::new(LeaseErrorKind::Connection(err.to_string()))
        } else {
            LeaseError::new(LeaseErrorKind::Command(err.to_string()))
        }
    }
}
