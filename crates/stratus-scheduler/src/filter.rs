use crate::affinity::satisfies;
use crate::daemon::DaemonWorkload;
use crate::taints::{untolerated, SoftTaintPolicy};
use crate::template::NodeClaimTemplate;
use crate::types::FilterResult;

/// Filter predicate trait
pub trait FilterPredicate: Send + Sync {
    /// Decide whether the daemon would land on a node built from the template
    fn filter(&self, template: &NodeClaimTemplate, daemon: &DaemonWorkload) -> FilterResult;

    /// Name of the filter
    fn name(&self) -> &str;
}

/// Filter for taints and tolerations
pub struct TaintToleration {
    policy: SoftTaintPolicy,
}

impl TaintToleration {
    pub fn new(policy: SoftTaintPolicy) -> Self {
        Self { policy }
    }
}

impl FilterPredicate for TaintToleration {
    fn filter(&self, template: &NodeClaimTemplate, daemon: &DaemonWorkload) -> FilterResult {
        let daemon_name = daemon.name().to_string();

        match untolerated(template.taints(), daemon.tolerations(), self.policy) {
            Some(taint) => FilterResult::fail(
                daemon_name,
                format!(
                    "Daemon does not tolerate taint: {}={}:{}",
                    taint.key,
                    taint.value.as_deref().unwrap_or_default(),
                    taint.effect
                ),
            ),
            None => FilterResult::pass(daemon_name),
        }
    }

    fn name(&self) -> &str {
        "TaintToleration"
    }
}

/// Filter for the daemon's node selector labels
pub struct NodeSelectorMatch;

impl FilterPredicate for NodeSelectorMatch {
    fn filter(&self, template: &NodeClaimTemplate, daemon: &DaemonWorkload) -> FilterResult {
        let daemon_name = daemon.name().to_string();

        // Every selector label must be possible on the template
        for requirement in daemon.node_selector().iter() {
            if !template.requirements().compatible(requirement) {
                return FilterResult::fail(
                    daemon_name,
                    format!(
                        "Node selector mismatch: {} against {}",
                        requirement,
                        template.requirements().get(requirement.key())
                    ),
                );
            }
        }

        FilterResult::pass(daemon_name)
    }

    fn name(&self) -> &str {
        "NodeSelectorMatch"
    }
}

/// Filter for required node affinity
pub struct NodeAffinityMatch;

impl FilterPredicate for NodeAffinityMatch {
    fn filter(&self, template: &NodeClaimTemplate, daemon: &DaemonWorkload) -> FilterResult {
        let daemon_name = daemon.name().to_string();

        if satisfies(template.requirements(), daemon.node_affinity()) {
            return FilterResult::pass(daemon_name);
        }

        FilterResult::fail(
            daemon_name,
            format!(
                "No node affinity term is compatible with {}",
                template.requirements()
            ),
        )
    }

    fn name(&self) -> &str {
        "NodeAffinityMatch"
    }
}

/// Get default filter predicates
pub fn default_filters(policy: SoftTaintPolicy) -> Vec<Box<dyn FilterPredicate>> {
    vec![
        Box::new(TaintToleration::new(policy)),
        Box::new(NodeSelectorMatch),
        Box::new(NodeAffinityMatch),
    ]
}
