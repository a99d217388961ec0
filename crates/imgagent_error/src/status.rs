//! Document status transition errors.

/// An attempted status change that the pipeline state machine forbids.
///
/// This is a programming error: stage code asked for a transition that skips,
/// regresses, or leaves a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("Illegal status transition {} -> {} at line {} in {}", from, to, line, file)]
pub struct StatusError {
    /// Status the document was in
    pub from: String,
    /// Status that was requested
    pub to: String,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl StatusError {
    /// Create a new illegal transition error.
    #[track_caller]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            from: from.into(),
            to: to.into(),
            line: location.line(),
            file: location.file(),
        }
    }
}
