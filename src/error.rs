use thiserror::Error;

/// Why a live request was cancelled before it could settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// A newer request under the same operation key replaced this one.
    Superseded,
    /// The owning session was torn down.
    TornDown,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Superseded => write!(f, "superseded"),
            Self::TornDown => write!(f, "torn-down"),
        }
    }
}

/// Workflow error taxonomy.
///
/// `Validation` is bad operator input and never advances the step machine.
/// `Cancelled` is internal bookkeeping and must never be surfaced.
/// `Operation` is a collaborator failure: surfaced, clears the loading flag,
/// does not advance the step machine.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),

    #[error("request cancelled ({0})")]
    Cancelled(CancelReason),

    #[error("{0}")]
    Operation(String),
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
