//! Stage execution error types.

use crate::{GenerationError, LeaseError, StatusError, StoreError};

/// Why a stage execution did not commit.
#[derive(Debug, Clone, derive_more::Display, derive_more::From)]
pub enum StageErrorKind {
    /// Generation service call failed
    #[display("{}", _0)]
    #[from(GenerationError)]
    Generation(GenerationError),
    /// Document store call failed
    #[display("{}", _0)]
    #[from(StoreError)]
    Store(StoreError),
    /// Lease backend failed while checking ownership
    #[display("{}", _0)]
    #[from(LeaseError)]
    Lease(LeaseError),
    /// Stage requested a forbidden status change
    #[display("{}", _0)]
    #[from(StatusError)]
    Status(StatusError),
    /// Lease expired or was taken over before the commit
    #[display("Lease lost for document {}", _0)]
    LeaseLost(String),
    /// Execution exceeded the per-execution deadline
    #[display("Stage execution exceeded deadline of {}ms", _0)]
    DeadlineExceeded(u64),
    /// Execution aborted by shutdown
    #[display("Stage execution cancelled")]
    Cancelled,
    /// Document has nothing this stage can work on
    #[display("Document {} is not ready for {}: {}", document_id, stage, reason)]
    NotReady {
        /// Document id
        document_id: String,
        /// Stage name
        stage: String,
        /// What is missing
        reason: String,
    },
}

impl StageErrorKind {
    /// Whether retrying the same stage later may succeed.
    ///
    /// Store and lease errors count as transient; a stage that failed for
    /// infrastructure reasons is always worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            StageErrorKind::Generation(e) => e.is_transient(),
            StageErrorKind::Store(_)
            | StageErrorKind::Lease(_)
            | StageErrorKind::LeaseLost(_)
            | StageErrorKind::DeadlineExceeded(_)
            | StageErrorKind::Cancelled => true,
            StageErrorKind::Status(_) | StageErrorKind::NotReady { .. } => false,
        }
    }
}

/// Stage execution error with source location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Stage Error: {} at line {} in {}", kind, line, file)]
pub struct StageError {
    /// The kind of error that occurred
    pub kind: StageErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl StageError {
    /// Create a new StageError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: StageErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Whether retrying the same stage later may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Whether the failure came from losing (or being unable to prove) lease ownership.
    pub fn is_lease_lost(&self) -> bool {
        matches!(self.kind, StageErrorKind::LeaseLost(_))
    }
}

impl From<GenerationError> for StageError {
    #[track_caller]
    fn from(err: GenerationError) -> Self {
        StageError::new(StageErrorKind::Generation(err))
    }
}

impl From<StoreError> for StageError {
    #[track_caller]
    fn from(err: StoreError) -> Self {
        StageError::new(StageErrorKind::Store(err))
    }
}

impl From<LeaseError> for StageError {
    #[track_caller]
    fn from(err: LeaseError) -> Self {
        StageError::new(StageErrorKind::Lease(err))
    }
}

impl From<StatusError> for StageError {
    #[track_caller]
    fn from(err: StatusError) -> Self {
        StageError::new(StageErrorKind::Status(err))
    }
}
