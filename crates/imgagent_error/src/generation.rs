//! Generation service error types.

/// Generation service error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum GenerationErrorKind {
    /// HTTP error with status code and message
    #[display("HTTP {}: {}", status_code, message)]
    Http {
        /// HTTP status code
        status_code: u16,
        /// Error message from the service
        message: String,
    },
    /// Network or transport failure before a response arrived
    #[display("Transport error: {}", _0)]
    Transport(String),
    /// Call exceeded its deadline
    #[display("Generation request timed out: {}", _0)]
    Timeout(String),
    /// Service reported the job as failed
    #[display("Generation task failed: {}", _0)]
    TaskFailed(String),
    /// Response could not be parsed into the expected shape
    #[display("Malformed generation response: {}", _0)]
    Malformed(String),
    /// Request rejected by content moderation
    #[display("Content rejected: {}", _0)]
    ContentRejected(String),
    /// Missing or invalid credentials
    #[display("Authentication failed: {}", _0)]
    Auth(String),
}

impl GenerationErrorKind {
    /// Check if this error is transient and the call may be retried.
    ///
    /// Returns true for:
    /// - HTTP 408 (Request Timeout)
    /// - HTTP 429 (Too Many Requests / Rate Limit)
    /// - HTTP 500 (Internal Server Error)
    /// - HTTP 502 (Bad Gateway)
    /// - HTTP 503 (Service Unavailable)
    /// - HTTP 504 (Gateway Timeout)
    /// - Transport failures and timeouts
    ///
    /// # Examples
    ///
    /// ```
    /// use imgagent_error::GenerationErrorKind;
    ///
    /// let throttled = GenerationErrorKind::Http {
    ///     status_code: 429,
    ///     message: "Throttling".to_string(),
    /// };
    /// assert!(throttled.is_transient());
    ///
    /// let bad_request = GenerationErrorKind::Http {
    ///     status_code: 400,
    ///     message: "InvalidParameter".to_string(),
    /// };
    /// assert!(!bad_request.is_transient());
    /// ```
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationErrorKind::Http { status_code, .. } => {
                matches!(status_code, 408 | 429 | 500 | 502 | 503 | 504)
            }
            GenerationErrorKind::Transport(_) | GenerationErrorKind::Timeout(_) => true,
            GenerationErrorKind::TaskFailed(_)
            | GenerationErrorKind::Malformed(_)
            | GenerationErrorKind::ContentRejected(_)
            | GenerationErrorKind::Auth(_) => false,
        }
    }
}

/// Generation service error with source location tracking.
///
/// # Examples
///
/// ```
/// use imgagent_error::{GenerationError, GenerationErrorKind};
///
/// let err = GenerationError::new(GenerationErrorKind::Timeout("image task".to_string()));
/// assert!(err.is_transient());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Generation Error: {} at line {} in {}", kind, line, file)]
pub struct GenerationError {
    /// The kind of error that occurred
    pub kind: GenerationErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl GenerationError {
    /// Create a new GenerationError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: GenerationErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Check if this error is transient and the call may be retried.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}
