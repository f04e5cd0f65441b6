use k8s_openapi::api::core::v1::{NodeSelectorRequirement, Pod, Taint};
use miette::miette;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use stratus_scheduler::{DaemonWorkload, MalformedQuantityPolicy, NodeClaimTemplate};
use tracing::{info, warn};

/// Templates and daemon pods captured from a cluster
#[derive(Debug, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub templates: Vec<TemplateSpec>,
    #[serde(default)]
    pub daemons: Vec<Pod>,
}

/// A node pool as it appears in a snapshot
#[derive(Debug, Deserialize)]
pub struct TemplateSpec {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub requirements: Vec<NodeSelectorRequirement>,
    #[serde(default)]
    pub taints: Vec<Taint>,
}

impl Snapshot {
    /// Load a snapshot, as JSON when the file ends in `.json` and YAML otherwise
    pub fn load(path: &Path) -> miette::Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| miette!("Failed to read snapshot '{}': {}", path.display(), e))?;

        let snapshot: Snapshot = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => stratus_core::from_json(&data)?,
            _ => stratus_core::from_yaml(&data)?,
        };

        info!(
            "Loaded snapshot {} with {} templates and {} daemons",
            path.display(),
            snapshot.templates.len(),
            snapshot.daemons.len()
        );

        Ok(snapshot)
    }

    pub fn templates(&self) -> miette::Result<Vec<NodeClaimTemplate>> {
        self.templates
            .iter()
            .map(|t| {
                NodeClaimTemplate::from_node_pool(
                    &t.name,
                    &t.labels,
                    &t.requirements,
                    t.taints.clone(),
                )
                .map_err(|e| miette!("Invalid template '{}': {}", t.name, e))
            })
            .collect()
    }

    /// Describe every daemon pod. Pods that cannot be described follow the
    /// same policy as malformed resource requests.
    pub fn daemons(&self, policy: MalformedQuantityPolicy) -> miette::Result<Vec<DaemonWorkload>> {
        let mut daemons = Vec::with_capacity(self.daemons.len());

        for pod in &self.daemons {
            match DaemonWorkload::from_pod(pod) {
                Ok(daemon) => daemons.push(daemon),
                Err(e) if policy == MalformedQuantityPolicy::SkipDaemon => {
                    warn!("Skipping daemon pod: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(daemons)
    }
}
