// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for Stratus operations
#[derive(Error, Debug, Diagnostic)]
pub enum StratusError {
    /// Malformed operator/value combination
    #[error("Invalid requirement for key '{key}': {reason}")]
    #[diagnostic(
        code(stratus::invalid_requirement),
        help("In/NotIn need at least one value, Exists/DoesNotExist take none, Gt/Lt take exactly one integer")
    )]
    InvalidRequirement {
        #[allow(unused)]
        key: String,
        #[allow(unused)]
        reason: String,
    },

    /// Unparseable resource quantity
    #[error("Malformed quantity for resource '{resource}': '{value}' ({reason})")]
    #[diagnostic(
        code(stratus::malformed_quantity),
        help("Use Kubernetes quantity notation, e.g. '500m', '2', '256Mi', '1G' or '1e3'")
    )]
    MalformedQuantity {
        #[allow(unused)]
        resource: String,
        #[allow(unused)]
        value: String,
        #[allow(unused)]
        reason: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(stratus::serialization_error),
        help("Ensure the input is valid JSON or YAML")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for Stratus operations
pub type Result<T> = std::result::Result<T, StratusError>;

impl StratusError {
    /// Create an InvalidRequirement error
    pub fn invalid_requirement(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRequirement {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a MalformedQuantity error
    pub fn malformed_quantity(
        resource: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedQuantity {
            resource: resource.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }
}
