//! Top-level error wrapper types.

use crate::{
    ConfigError, GenerationError, LeaseError, StageError, StatusError, StoreError,
};

/// Every error the pipeline can surface to a caller.
///
/// # Examples
///
/// ```
/// use imgagent_error::{ConfigError, ImgAgentError};
///
/// let err: ImgAgentError = ConfigError::new("missing redis address").into();
/// assert!(format!("{}", err).contains("Config Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum ImgAgentErrorKind {
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// Document store error
    #[from(StoreError)]
    Store(StoreError),
    /// Lease backend error
    #[from(LeaseError)]
    Lease(LeaseError),
    /// Generation service error
    #[from(GenerationError)]
    Generation(GenerationError),
    /// Stage execution error
    #[from(StageError)]
    Stage(StageError),
    /// Illegal status transition
    #[from(StatusError)]
    Status(StatusError),
}

/// ImgAgent error with kind discrimination.
///
/// # Examples
///
/// ```
/// use imgagent_error::{ImgAgentResult, StatusError};
///
/// fn advance() -> ImgAgentResult<()> {
///     Err(StatusError::new("imgReady", "uploaded"))?
/// }
///
/// match advance() {
///     Ok(_) => println!("Success"),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("ImgAgent Error: {}", _0)]
pub struct ImgAgentError(Box<ImgAgentErrorKind>);

impl ImgAgentError {
    /// Create a new error from a kind.
    pub fn new(kind: ImgAgentErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &ImgAgentErrorKind {
        &self.0
    }
}

// Generic From implementation for any type that converts to ImgAgentErrorKind
impl<T> From<T> for ImgAgentError
where
    T: Into<ImgAgentErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for imgagent operations.
pub type ImgAgentResult<T> = std::result::Result<T, ImgAgentError>;
