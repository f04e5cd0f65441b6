// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use stratus_core::StratusError;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// A daemon pod could not be turned into a workload descriptor
    #[error("Invalid daemon {name}: {source}")]
    #[diagnostic(
        code(scheduler::invalid_daemon),
        help("Check the pod's node affinity and node selector expressions")
    )]
    InvalidDaemon {
        name: String,
        #[source]
        source: StratusError,
    },

    /// Two templates in one pass share an identity
    #[error("Duplicate node claim template: {id}")]
    #[diagnostic(
        code(scheduler::duplicate_template),
        help("Every template in a scheduling pass needs a distinct id")
    )]
    DuplicateTemplate { id: String },

    /// A daemon's resource request could not be parsed
    #[error("Daemon {daemon} has a malformed resource request: {source}")]
    #[diagnostic(
        code(scheduler::malformed_quantity),
        help("Fix the daemon's resource requests, or use the SkipDaemon policy to leave it out of the overhead")
    )]
    MalformedQuantity {
        daemon: String,
        #[source]
        source: StratusError,
    },

    /// Core error
    #[error("Core error: {0}")]
    #[diagnostic(
        code(scheduler::core_error),
        help("Check the node pool's labels and requirements")
    )]
    CoreError(#[from] StratusError),
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create an InvalidDaemon error
    pub fn invalid_daemon(name: impl Into<String>, source: StratusError) -> Self {
        Self::InvalidDaemon {
            name: name.into(),
            source,
        }
    }

    /// Create a DuplicateTemplate error
    pub fn duplicate_template(id: impl Into<String>) -> Self {
        Self::DuplicateTemplate { id: id.into() }
    }

    /// Create a MalformedQuantity error
    pub fn malformed_quantity(daemon: impl Into<String>, source: StratusError) -> Self {
        Self::MalformedQuantity {
            daemon: daemon.into(),
            source,
        }
    }
}
