//! Daemon overhead across node pools built from Kubernetes objects

use k8s_openapi::api::core::v1::{
    Affinity, Container, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm,
    Pod, PodSpec, ResourceRequirements, Taint, Toleration,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use stratus_core::TemplateId;
use stratus_scheduler::{compute_overhead, DaemonWorkload, NodeClaimTemplate};

const TAINT_KEY: &str = "example.com/no-schedule";

fn expr(key: &str, value: &str) -> NodeSelectorRequirement {
    NodeSelectorRequirement {
        key: key.to_string(),
        operator: "In".to_string(),
        values: Some(vec![value.to_string()]),
    }
}

fn pool_taint() -> Taint {
    Taint {
        key: TAINT_KEY.to_string(),
        value: Some("true".to_string()),
        effect: "PreferNoSchedule".to_string(),
        ..Default::default()
    }
}

fn daemon_pod(name: &str, cpu: &str, memory: &str, terms: Vec<(&str, &str)>) -> Pod {
    let mut pod = Pod::default();
    pod.metadata.name = Some(name.to_string());
    pod.spec = Some(PodSpec {
        containers: vec![Container {
            name: "main".to_string(),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity(cpu.to_string())),
                    ("memory".to_string(), Quantity(memory.to_string())),
                ])),
                ..Default::default()
            }),
            ..Default::default()
        }],
        tolerations: Some(vec![Toleration {
            key: Some(TAINT_KEY.to_string()),
            operator: Some("Exists".to_string()),
            ..Default::default()
        }]),
        affinity: Some(Affinity {
            node_affinity: Some(NodeAffinity {
                required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                    node_selector_terms: terms
                        .into_iter()
                        .map(|(key, value)| NodeSelectorTerm {
                            match_expressions: Some(vec![expr(key, value)]),
                            ..Default::default()
                        })
                        .collect(),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    });
    pod
}

fn templates() -> Vec<NodeClaimTemplate> {
    vec![
        NodeClaimTemplate::from_node_pool(
            "monitoring",
            &BTreeMap::new(),
            &[expr("role", "monitor"), expr("owner", "kcc")],
            vec![pool_taint()],
        )
        .unwrap(),
        NodeClaimTemplate::from_node_pool(
            "web",
            &BTreeMap::new(),
            &[expr("consumer", "ngcweb")],
            vec![pool_taint()],
        )
        .unwrap(),
    ]
}

fn daemons() -> Vec<DaemonWorkload> {
    [
        daemon_pod("daemon-pod-1", "500m", "256Mi", vec![("os", "linux"), ("role", "monitor")]),
        daemon_pod("daemon-pod-2", "100m", "32Mi", vec![("role", "monitor"), ("owner", "kcc")]),
        daemon_pod("daemon-pod-3", "200m", "64Mi", vec![("os", "linux"), ("owner", "kcs")]),
    ]
    .iter()
    .map(|pod| DaemonWorkload::from_pod(pod).unwrap())
    .collect()
}

#[test]
fn test_tolerating_daemons_count_on_every_pool() {
    let overhead = compute_overhead(&templates(), &daemons()).unwrap();

    assert_eq!(overhead.len(), 2);
    for id in ["monitoring", "web"] {
        let total = &overhead[&TemplateId::from(id)];
        assert_eq!(total.cpu_millicores(), 800, "cpu on {id}");
        assert_eq!(total.memory_bytes(), 352 * 1024 * 1024, "memory on {id}");
    }
}

#[test]
fn test_intolerant_daemon_excluded_from_tainted_pools() {
    let mut pod = daemon_pod("no-tolerations", "1", "1Gi", vec![("os", "linux")]);
    if let Some(spec) = pod.spec.as_mut() {
        spec.tolerations = None;
    }

    let mut workloads = daemons();
    workloads.push(DaemonWorkload::from_pod(&pod).unwrap());

    let overhead = compute_overhead(&templates(), &workloads).unwrap();
    assert!(overhead.values().all(|total| total.cpu_millicores() == 800));
}

#[test]
fn test_pool_name_pins_node_pool_label() {
    let mut pod = daemon_pod("web-only", "50m", "16Mi", vec![]);
    if let Some(spec) = pod.spec.as_mut() {
        spec.affinity = None;
        spec.node_selector = Some(BTreeMap::from([(
            stratus_scheduler::template::NODE_POOL_LABEL.to_string(),
            "web".to_string(),
        )]));
    }

    let daemons = [DaemonWorkload::from_pod(&pod).unwrap()];
    let overhead = compute_overhead(&templates(), &daemons).unwrap();
    assert!(overhead[&TemplateId::from("monitoring")].is_zero());
    assert_eq!(overhead[&TemplateId::from("web")].cpu_millicores(), 50);
}
