use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};
use sf_core::error::{CoreError, CoreReason};

// ---------------------------------------------------------------------------
// Runtime boundary errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum RuntimeReason {
    #[error("workflow bootstrap error")]
    Bootstrap,
    #[error("workflow shutdown error")]
    Shutdown,
    #[error("{0}")]
    Core(CoreReason),
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for RuntimeReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::Bootstrap => 2001,
            Self::Shutdown => 2002,
            Self::Core(c) => c.error_code(),
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type RuntimeError = StructError<RuntimeReason>;
pub type RuntimeResult<T> = Result<T, RuntimeError>;

// ---------------------------------------------------------------------------
// StepError — per-step failure taxonomy
// ---------------------------------------------------------------------------

/// Failure taxonomy of a single step's drive loop.
///
/// The driver's per-step envelope converts these into the step's terminal
/// status: `Cancelled` becomes CANCELLED, everything else FAILED. Errors
/// never cross step boundaries; downstream steps observe only termination
/// tokens and the terminal status.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// Structural misuse of a step (e.g. a second input port on a scatter).
    #[error("workflow definition error: {0}")]
    Definition(String),
    /// A runtime precondition failed (e.g. a null job descriptor).
    #[error("workflow execution error: {0}")]
    Execution(String),
    /// The failure manager declined to recover a failed job.
    #[error("failure handling declined: {0}")]
    FailureHandling(String),
    /// The step's cancellation token fired at a suspension point.
    #[error("step cancelled")]
    Cancelled,
    /// A generic workflow error, logged without its chain.
    #[error("{0}")]
    Workflow(String),
    /// Anything else, logged with its full chain.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StepResult<T> = Result<T, StepError>;

impl From<CoreError> for StepError {
    fn from(err: CoreError) -> Self {
        StepError::Workflow(err.to_string())
    }
}
