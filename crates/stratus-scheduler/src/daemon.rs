use crate::affinity::NodeAffinity;
use crate::{Result, SchedulerError};
use k8s_openapi::api::core::v1::{Container, Pod, Toleration};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use stratus_core::{RequirementSet, ResourceQuantities};

/// Restart policy marking an init container as a long-running sidecar
const SIDECAR_RESTART_POLICY: &str = "Always";

type ResourceList = BTreeMap<String, Quantity>;

#[derive(Debug, Clone, Default, PartialEq)]
struct InitContainer {
    requests: ResourceList,
    sidecar: bool,
}

/// A workload the daemon controller places on every eligible node.
///
/// Requests are kept as declared and parsed only when the overhead is
/// computed, so one bad quantity can be isolated to its own daemon.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DaemonWorkload {
    name: String,
    containers: Vec<ResourceList>,
    init_containers: Vec<InitContainer>,
    pod_overhead: ResourceList,
    tolerations: Vec<Toleration>,
    node_selector: RequirementSet,
    node_affinity: Option<NodeAffinity>,
}

impl DaemonWorkload {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Describe a daemon from one of its pods
    pub fn from_pod(pod: &Pod) -> Result<Self> {
        let name = pod
            .metadata
            .name
            .as_ref()
            .unwrap_or(&"unknown".to_string())
            .clone();

        let spec = match &pod.spec {
            Some(spec) => spec,
            None => return Ok(Self::new(name)),
        };

        let node_selector = match &spec.node_selector {
            Some(selector) => RequirementSet::from_labels(selector)
                .map_err(|e| SchedulerError::invalid_daemon(&name, e))?,
            None => RequirementSet::new(),
        };
        let node_affinity = NodeAffinity::from_pod_spec(spec)
            .map_err(|e| SchedulerError::invalid_daemon(&name, e))?;

        Ok(Self {
            containers: spec.containers.iter().map(requests_of).collect(),
            init_containers: spec
                .init_containers
                .iter()
                .flatten()
                .map(|c| InitContainer {
                    requests: requests_of(c),
                    sidecar: c.restart_policy.as_deref() == Some(SIDECAR_RESTART_POLICY),
                })
                .collect(),
            pod_overhead: spec.overhead.clone().unwrap_or_default(),
            tolerations: spec.tolerations.clone().unwrap_or_default(),
            node_selector,
            node_affinity,
            name,
        })
    }

    pub fn with_container<'a, I>(mut self, requests: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.containers.push(resource_list(requests));
        self
    }

    pub fn with_init_container<'a, I>(mut self, requests: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.init_containers.push(InitContainer {
            requests: resource_list(requests),
            sidecar: false,
        });
        self
    }

    pub fn with_sidecar<'a, I>(mut self, requests: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.init_containers.push(InitContainer {
            requests: resource_list(requests),
            sidecar: true,
        });
        self
    }

    pub fn with_tolerations(mut self, tolerations: Vec<Toleration>) -> Self {
        self.tolerations = tolerations;
        self
    }

    pub fn with_node_selector(mut self, node_selector: RequirementSet) -> Self {
        self.node_selector = node_selector;
        self
    }

    pub fn with_node_affinity(mut self, node_affinity: NodeAffinity) -> Self {
        self.node_affinity = Some(node_affinity);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tolerations(&self) -> &[Toleration] {
        &self.tolerations
    }

    pub fn node_selector(&self) -> &RequirementSet {
        &self.node_selector
    }

    pub fn node_affinity(&self) -> Option<&NodeAffinity> {
        self.node_affinity.as_ref()
    }

    /// Effective resource requests of one daemon pod.
    ///
    /// Regular containers and sidecars run together and are summed. Init
    /// containers run one at a time next to the sidecars started before them,
    /// so each contributes its own peak. The result is the larger of the two
    /// phases per resource, plus the pod overhead.
    pub fn requests(&self) -> stratus_core::Result<ResourceQuantities> {
        let mut running = ResourceQuantities::new();
        for requests in &self.containers {
            running += &ResourceQuantities::from_k8s_resource_map(requests)?;
        }

        let mut sidecars = ResourceQuantities::new();
        let mut init_peak = ResourceQuantities::new();
        for init in &self.init_containers {
            let requests = ResourceQuantities::from_k8s_resource_map(&init.requests)?;
            if init.sidecar {
                sidecars += &requests;
                init_peak.max_with(&sidecars);
            } else {
                init_peak.max_with(&(requests + &sidecars));
            }
        }

        let mut total = running + &sidecars;
        total.max_with(&init_peak);
        total += &ResourceQuantities::from_k8s_resource_map(&self.pod_overhead)?;
        Ok(total)
    }
}

fn requests_of(container: &Container) -> ResourceList {
    container
        .resources
        .as_ref()
        .and_then(|r| r.requests.clone())
        .unwrap_or_default()
}

fn resource_list<'a, I>(requests: I) -> ResourceList
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    requests
        .into_iter()
        .map(|(name, value)| (name.to_string(), Quantity(value.to_string())))
        .collect()
}
