use k8s_openapi::api::core::v1::{NodeSelectorRequirement, Taint};
use std::collections::BTreeMap;
use crate::Result;
use stratus_core::{Operator, Requirement, RequirementSet, TemplateId};

/// Label carrying the node pool a node was provisioned from
pub const NODE_POOL_LABEL: &str = "karpenter.sh/nodepool";

/// A candidate node shape for one scheduling pass.
///
/// Built by the outer scheduler when it enumerates node shapes, never mutated
/// afterwards and dropped at the end of the pass.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeClaimTemplate {
    id: TemplateId,
    requirements: RequirementSet,
    taints: Vec<Taint>,
}

impl NodeClaimTemplate {
    pub fn new(
        id: impl Into<TemplateId>,
        requirements: RequirementSet,
        taints: Vec<Taint>,
    ) -> Self {
        Self {
            id: id.into(),
            requirements,
            taints,
        }
    }

    /// Build the template a node pool describes: its labels pinned as `In`
    /// requirements, its requirements intersected in, and the pool label itself.
    pub fn from_node_pool(
        name: &str,
        labels: &BTreeMap<String, String>,
        requirements: &[NodeSelectorRequirement],
        taints: Vec<Taint>,
    ) -> Result<Self> {
        let mut set = RequirementSet::from_labels(labels)?;
        set.add_all(&RequirementSet::from_node_selector_requirements(requirements)?);
        set.add(Requirement::new(NODE_POOL_LABEL, Operator::In, [name])?);

        Ok(Self::new(name, set, taints))
    }

    pub fn id(&self) -> &TemplateId {
        &self.id
    }

    pub fn requirements(&self) -> &RequirementSet {
        &self.requirements
    }

    pub fn taints(&self) -> &[Taint] {
        &self.taints
    }
}
