//! Workflow error types.

use crate::value::{TypeSet, ValueType};
use thiserror::Error;

/// Errors raised while binding, invoking or mapping a step.
///
/// Contract violations (`MissingArgument`, `TypeMismatch`,
/// `InvalidContextAssignment`, ...) surface where they happen and travel
/// through the workflow's error handler like any other error. Errors raised
/// by user code are carried unchanged in [`WorkflowError::Unhandled`].
///
/// ```
/// use marx_core::WorkflowError;
///
/// fn describe(error: &WorkflowError) -> String {
///     match error {
///         WorkflowError::MissingArgument { unit, argument } => {
///             format!("{} needs {}", unit, argument)
///         }
///         WorkflowError::TypeMismatch { name, expected, .. } => {
///             format!("{} must be {}", name, expected)
///         }
///         other => other.to_string(),
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WorkflowError {
    /// A required parameter had no value and no default.
    #[error("Missing argument '{argument}' for '{unit}'")]
    MissingArgument {
        /// The unit (or mapping) that needed the argument.
        unit: String,
        /// The parameter name.
        argument: String,
    },

    /// A call received a keyword its signature does not declare.
    #[error("Unexpected argument '{argument}' for '{unit}'")]
    UnexpectedArgument {
        /// The unit that rejected the argument.
        unit: String,
        /// The offending keyword.
        argument: String,
    },

    /// An argument or result value is outside its declared type set.
    #[error("Type mismatch for '{name}' in '{owner}': expected {expected}, found {found}")]
    TypeMismatch {
        /// The unit owning the argument or result field.
        owner: String,
        /// The argument or result field name.
        name: String,
        /// The declared type set.
        expected: TypeSet,
        /// The type of the rejected value.
        found: ValueType,
    },

    /// A context field assignment is outside the field's declared type set.
    #[error("Invalid assignment to context field '{field}': expected {expected}, found {found}")]
    InvalidContextAssignment {
        /// The context field.
        field: String,
        /// The declared type set.
        expected: TypeSet,
        /// The type of the rejected value.
        found: ValueType,
    },

    /// A field is neither declared nor set.
    #[error("Unknown field '{field}' on '{owner}'")]
    UnknownField {
        /// The schema or unit that was asked for the field.
        owner: String,
        /// The field name.
        field: String,
    },

    /// A result mapping looked up a key the raw result does not have.
    #[error("Result has no key '{key}'")]
    MissingResultKey {
        /// The key that failed.
        key: String,
    },

    /// A name could not be resolved in a registry.
    #[error("Callable not found: {0}")]
    NotFound(String),

    /// A unit asked for the context without declaring it in its signature.
    #[error("Context is not available to '{0}'")]
    ContextUnavailable(String),

    /// Any other error raised by a step's wrapped callable.
    #[error(transparent)]
    Unhandled(Box<dyn std::error::Error + Send + Sync>),
}

impl WorkflowError {
    /// Wraps an error raised by user code.
    pub fn unhandled(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        WorkflowError::Unhandled(Box::new(error))
    }

    /// Returns the wrapped user error if it is an `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            WorkflowError::Unhandled(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, Error)]
    #[error("permission denied: {0}")]
    struct PermissionDenied(String);

    #[derive(Debug, Error)]
    #[error("lookup failed")]
    struct Lookup {
        #[source]
        source: std::fmt::Error,
    }

    #[test]
    fn test_error_display() {
        let error = WorkflowError::MissingArgument {
            unit: "MakePie".to_string(),
            argument: "maker".to_string(),
        };
        assert_eq!(error.to_string(), "Missing argument 'maker' for 'MakePie'");

        let error = WorkflowError::TypeMismatch {
            owner: "MakePie".to_string(),
            name: "pie".to_string(),
            expected: TypeSet::from(ValueType::Str),
            found: ValueType::Int,
        };
        assert_eq!(
            error.to_string(),
            "Type mismatch for 'pie' in 'MakePie': expected str, found int"
        );
    }

    #[test]
    fn test_unhandled_preserves_kind_and_message() {
        let error = WorkflowError::unhandled(PermissionDenied("throw_pie".to_string()));
        assert_eq!(error.to_string(), "permission denied: throw_pie");
        assert!(error.downcast_ref::<PermissionDenied>().is_some());
        assert!(error.downcast_ref::<Lookup>().is_none());
    }

    #[test]
    fn test_unhandled_preserves_source_chain() {
        let error = WorkflowError::unhandled(Lookup {
            source: std::fmt::Error,
        });
        assert_eq!(error.to_string(), "lookup failed");
        assert!(error.source().is_some());
    }
}
