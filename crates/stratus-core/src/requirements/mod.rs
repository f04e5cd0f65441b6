//! Requirement algebra over partially specified node labels

pub mod requirement;
pub mod set;

pub use requirement::{Operator, Requirement};
pub use set::{KeyConstraint, RequirementSet};
