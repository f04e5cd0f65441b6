//! Stratus Scheduler - Daemon overhead estimation for node claim templates
//!
//! This crate provides:
//! - Taint and toleration matching
//! - Required node affinity evaluation
//! - Daemon workload effective requests
//! - Filter predicates (taints, node selectors, node affinity)
//! - Per-template daemon overhead aggregation

pub mod affinity;
pub mod daemon;
pub mod error;
pub mod filter;
pub mod overhead;
pub mod taints;
pub mod template;
pub mod types;

// Re-export commonly used types
pub use affinity::{NodeAffinity, SelectorTerm};
pub use daemon::DaemonWorkload;
pub use error::{Result, SchedulerError};
pub use filter::FilterPredicate;
pub use overhead::{
    compute_overhead, MalformedQuantityPolicy, Overhead, OverheadCalculator, OverheadConfig,
};
pub use taints::SoftTaintPolicy;
pub use template::NodeClaimTemplate;
pub use types::FilterResult;
