//! Required node affinity evaluated against partially specified nodes.
//!
//! A concrete scheduler checks affinity against a node's actual labels. A
//! node claim template has no labels yet, only requirements, so a term is
//! satisfied when every one of its expressions *could* hold on some node the
//! template may become.

use k8s_openapi::api::core::v1 as corev1;
use stratus_core::{Requirement, RequirementSet, Result};

/// A conjunction of match expressions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorTerm {
    expressions: Vec<Requirement>,
}

impl SelectorTerm {
    pub fn new(expressions: Vec<Requirement>) -> Self {
        Self { expressions }
    }

    /// Convert a k8s-openapi term. Field selectors are kept under their field path.
    pub fn from_k8s(term: &corev1::NodeSelectorTerm) -> Result<Self> {
        let expressions = term
            .match_expressions
            .iter()
            .flatten()
            .chain(term.match_fields.iter().flatten())
            .map(Requirement::from_node_selector_requirement)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { expressions })
    }

    pub fn expressions(&self) -> &[Requirement] {
        &self.expressions
    }

    /// First expression that cannot hold under `requirements`
    pub fn first_conflict(&self, requirements: &RequirementSet) -> Option<&Requirement> {
        self.expressions
            .iter()
            .find(|expr| !requirements.compatible(expr))
    }

    /// All expressions compatible. A term without expressions is satisfied
    /// vacuously, unlike Kubernetes where an empty term selects nothing.
    pub fn is_satisfied_by(&self, requirements: &RequirementSet) -> bool {
        self.first_conflict(requirements).is_none()
    }
}

/// A disjunction of selector terms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeAffinity {
    terms: Vec<SelectorTerm>,
}

impl NodeAffinity {
    pub fn new(terms: Vec<SelectorTerm>) -> Self {
        Self { terms }
    }

    pub fn from_node_selector(selector: &corev1::NodeSelector) -> Result<Self> {
        let terms = selector
            .node_selector_terms
            .iter()
            .map(SelectorTerm::from_k8s)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { terms })
    }

    /// The required-during-scheduling affinity of a pod, if it has one.
    /// Preferred terms only influence scoring and are ignored here.
    pub fn from_pod_spec(spec: &corev1::PodSpec) -> Result<Option<Self>> {
        spec.affinity
            .as_ref()
            .and_then(|affinity| affinity.node_affinity.as_ref())
            .and_then(|node_affinity| {
                node_affinity
                    .required_during_scheduling_ignored_during_execution
                    .as_ref()
            })
            .map(Self::from_node_selector)
            .transpose()
    }

    pub fn terms(&self) -> &[SelectorTerm] {
        &self.terms
    }

    /// Index of the first term satisfied by `requirements`, short-circuiting
    /// in declaration order
    pub fn first_satisfying_term(&self, requirements: &RequirementSet) -> Option<usize> {
        self.terms
            .iter()
            .position(|term| term.is_satisfied_by(requirements))
    }

    /// An affinity without terms places no constraint
    pub fn is_satisfied_by(&self, requirements: &RequirementSet) -> bool {
        self.terms.is_empty() || self.first_satisfying_term(requirements).is_some()
    }
}

/// Whether a workload with `affinity` could land on a node described by `requirements`
pub fn satisfies(requirements: &RequirementSet, affinity: Option<&NodeAffinity>) -> bool {
    affinity.is_none_or(|affinity| affinity.is_satisfied_by(requirements))
}
