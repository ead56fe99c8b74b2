//! Control signals a callable can raise instead of returning a value.

use crate::error::WorkflowError;
use std::fmt;

/// Request to halt the current workflow run.
///
/// The run stops before the next step and the workflow's abort handler
/// decides what the run returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Abort {
    reason: Option<String>,
}

impl Abort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn because(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "aborted: {}", reason),
            None => write!(f, "aborted"),
        }
    }
}

/// Why a callable stopped without producing a value.
///
/// `?` converts a [`WorkflowError`] into `Interrupt::Error`, so contract
/// violations inside a unit body propagate without ceremony.
///
/// ```
/// use marx_core::{Abort, Interrupt, Value};
///
/// fn check(user: &str) -> Result<Value, Interrupt> {
///     match user {
///         "" => Err(Interrupt::Skip),
///         "mallory" => Err(Abort::because("blocked user").into()),
///         _ => Ok(Value::Null),
///     }
/// }
///
/// assert!(matches!(check(""), Err(Interrupt::Skip)));
/// assert!(matches!(check("mallory"), Err(Interrupt::Abort(_))));
/// ```
#[derive(Debug)]
pub enum Interrupt {
    /// Leave the current step; effects already applied are kept.
    Skip,
    /// Halt the run and defer to the abort handler.
    Abort(Abort),
    /// Fail the run through the error handler.
    Error(WorkflowError),
}

impl Interrupt {
    /// Wraps an error raised by user code.
    pub fn unhandled(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Interrupt::Error(WorkflowError::unhandled(error))
    }
}

impl From<WorkflowError> for Interrupt {
    fn from(error: WorkflowError) -> Self {
        Interrupt::Error(error)
    }
}

impl From<Abort> for Interrupt {
    fn from(abort: Abort) -> Self {
        Interrupt::Abort(abort)
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::Skip => write!(f, "skipped"),
            Interrupt::Abort(abort) => write!(f, "{}", abort),
            Interrupt::Error(error) => write!(f, "{}", error),
        }
    }
}
