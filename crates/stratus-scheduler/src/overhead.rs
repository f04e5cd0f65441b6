use crate::daemon::DaemonWorkload;
use crate::filter::{default_filters, FilterPredicate};
use crate::taints::SoftTaintPolicy;
use crate::template::NodeClaimTemplate;
use crate::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use stratus_core::{ResourceQuantities, TemplateId};
use tracing::{debug, info, warn};

/// Overhead per template, one entry for every template evaluated
pub type Overhead = BTreeMap<TemplateId, ResourceQuantities>;

/// What to do with a daemon whose requests cannot be parsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MalformedQuantityPolicy {
    /// Leave the daemon out of every template's overhead and keep going
    #[default]
    SkipDaemon,
    /// Fail the whole computation
    Abort,
}

/// Configuration for the overhead calculator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OverheadConfig {
    /// Handling of malformed resource requests
    pub malformed_quantity: MalformedQuantityPolicy,
    /// Handling of `PreferNoSchedule` taints
    pub soft_taints: SoftTaintPolicy,
}

/// Computes how much of each node claim template daemons will consume.
///
/// Holds no state besides its configuration; a single calculator can serve
/// concurrent scheduling workers.
pub struct OverheadCalculator {
    config: OverheadConfig,
    filters: Vec<Box<dyn FilterPredicate>>,
}

impl OverheadCalculator {
    /// Create a new calculator
    pub fn new(config: OverheadConfig) -> Self {
        Self {
            filters: default_filters(config.soft_taints),
            config,
        }
    }

    pub fn config(&self) -> &OverheadConfig {
        &self.config
    }

    /// Whether `daemon` would be placed on a node built from `template`
    pub fn admits(&self, template: &NodeClaimTemplate, daemon: &DaemonWorkload) -> bool {
        for filter in &self.filters {
            let result = filter.filter(template, daemon);
            if !result.passed {
                debug!(
                    "Daemon {} filtered out of template {} by {}: {}",
                    daemon.name(),
                    template.id(),
                    filter.name(),
                    result.reason.unwrap_or_default()
                );
                return false;
            }
        }
        true
    }

    /// Daemons that would be placed on a node built from `template`
    pub fn admitted<'a>(
        &self,
        template: &NodeClaimTemplate,
        daemons: &'a [DaemonWorkload],
    ) -> Vec<&'a DaemonWorkload> {
        daemons
            .iter()
            .filter(|daemon| self.admits(template, daemon))
            .collect()
    }

    /// Sum the requests of admitted daemons for every template
    pub fn compute(
        &self,
        templates: &[NodeClaimTemplate],
        daemons: &[DaemonWorkload],
    ) -> Result<Overhead> {
        let mut seen = BTreeSet::new();
        for template in templates {
            if !seen.insert(template.id()) {
                return Err(SchedulerError::duplicate_template(template.id().as_str()));
            }
        }

        // Parse once per call rather than once per template
        let mut requests = Vec::with_capacity(daemons.len());
        for daemon in daemons {
            match daemon.requests() {
                Ok(parsed) => requests.push(Some(parsed)),
                Err(e) => match self.config.malformed_quantity {
                    MalformedQuantityPolicy::SkipDaemon => {
                        warn!("Skipping daemon {} in overhead: {}", daemon.name(), e);
                        requests.push(None);
                    }
                    MalformedQuantityPolicy::Abort => {
                        return Err(SchedulerError::malformed_quantity(daemon.name(), e));
                    }
                },
            }
        }

        let mut overhead = Overhead::new();

        for template in templates {
            if !template.requirements().is_feasible() {
                warn!(
                    "Template {} has infeasible requirements for keys: {}",
                    template.id(),
                    template
                        .requirements()
                        .infeasible_keys()
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }

            let mut total = ResourceQuantities::new();
            let mut admitted = 0usize;

            for (daemon, daemon_requests) in daemons.iter().zip(&requests) {
                let Some(daemon_requests) = daemon_requests else {
                    continue;
                };
                if self.admits(template, daemon) {
                    total += daemon_requests;
                    admitted += 1;
                }
            }

            debug!(
                "Template {} admits {} of {} daemons, overhead {}",
                template.id(),
                admitted,
                daemons.len(),
                total
            );

            overhead.insert(template.id().clone(), total);
        }

        info!(
            "Computed daemon overhead for {} templates from {} daemons",
            templates.len(),
            daemons.len()
        );

        Ok(overhead)
    }
}

impl Default for OverheadCalculator {
    fn default() -> Self {
        Self::new(OverheadConfig::default())
    }
}

/// Compute daemon overhead with the default configuration
pub fn compute_overhead(
    templates: &[NodeClaimTemplate],
    daemons: &[DaemonWorkload],
) -> Result<Overhead> {
    OverheadCalculator::default().compute(templates, daemons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affinity::{NodeAffinity, SelectorTerm};
    use k8s_openapi::api::core::v1::{Taint, Toleration};
    use stratus_core::{Operator, Requirement, RequirementSet};

    fn req(key: &str, operator: Operator, values: &[&str]) -> Requirement {
        Requirement::new(key, operator, values.iter().copied()).unwrap()
    }

    fn template(id: &str, requirements: Vec<Requirement>, taints: Vec<Taint>) -> NodeClaimTemplate {
        NodeClaimTemplate::new(id, requirements.into_iter().collect::<RequirementSet>(), taints)
    }

    fn taint(key: &str, effect: &str) -> Taint {
        Taint {
            key: key.to_string(),
            effect: effect.to_string(),
            ..Default::default()
        }
    }

    fn affinity(terms: Vec<Vec<Requirement>>) -> NodeAffinity {
        NodeAffinity::new(terms.into_iter().map(SelectorTerm::new).collect())
    }

    fn daemon(name: &str, cpu: &str, memory: &str) -> DaemonWorkload {
        DaemonWorkload::new(name).with_container([("cpu", cpu), ("memory", memory)])
    }

    fn get<'a>(overhead: &'a Overhead, id: &str) -> &'a ResourceQuantities {
        overhead.get(&TemplateId::from(id)).unwrap()
    }

    #[test]
    fn test_unconstrained_template_admits_plain_daemon() {
        let templates = vec![template("plain", vec![], vec![])];
        let daemons = vec![daemon("agent", "500m", "256Mi")];

        let overhead = compute_overhead(&templates, &daemons).unwrap();
        let total = get(&overhead, "plain");
        assert_eq!(total.cpu_millicores(), 500);
        assert_eq!(total.memory_bytes(), 256 * 1024 * 1024);
    }

    #[test]
    fn test_taint_excludes_daemon() {
        let templates = vec![template("tainted", vec![], vec![taint("x", "NoSchedule")])];
        let daemons = vec![daemon("agent", "500m", "256Mi")];

        let overhead = compute_overhead(&templates, &daemons).unwrap();
        assert!(get(&overhead, "tainted").is_zero());
    }

    #[test]
    fn test_affinity_admits_through_first_term() {
        let templates = vec![template(
            "east",
            vec![req("zone", Operator::In, &["us-east-1"])],
            vec![],
        )];
        let daemons = vec![daemon("agent", "200m", "64Mi").with_node_affinity(affinity(vec![
            vec![req("zone", Operator::In, &["us-east-1"])],
            vec![req("zone", Operator::In, &["us-west-2"])],
        ]))];

        let overhead = compute_overhead(&templates, &daemons).unwrap();
        assert_eq!(get(&overhead, "east").cpu_millicores(), 200);
    }

    #[test]
    fn test_affinity_excludes_other_zone() {
        let templates = vec![template(
            "east",
            vec![req("zone", Operator::In, &["us-east-1"])],
            vec![],
        )];
        let daemons = vec![daemon("agent", "200m", "64Mi")
            .with_node_affinity(affinity(vec![vec![req("zone", Operator::In, &["us-west-2"])]]))];

        let overhead = compute_overhead(&templates, &daemons).unwrap();
        assert!(get(&overhead, "east").is_zero());
    }

    #[test]
    fn test_wildcard_and_direct_match() {
        let templates = vec![
            template("monitor", vec![req("role", Operator::In, &["monitor"])], vec![]),
            template("open", vec![], vec![]),
            template("web", vec![req("role", Operator::In, &["web"])], vec![]),
        ];
        let daemons = vec![daemon("exporter", "100m", "32Mi")
            .with_node_affinity(affinity(vec![vec![req("role", Operator::In, &["monitor"])]]))];

        let overhead = compute_overhead(&templates, &daemons).unwrap();
        assert_eq!(get(&overhead, "monitor").cpu_millicores(), 100);
        assert_eq!(get(&overhead, "open").cpu_millicores(), 100);
        assert!(get(&overhead, "web").is_zero());
    }

    #[test]
    fn test_multiple_containers_sum_per_resource() {
        let templates = vec![template("plain", vec![], vec![])];
        let daemons = vec![DaemonWorkload::new("agent")
            .with_container([("cpu", "100m"), ("memory", "32Mi")])
            .with_container([("cpu", "250m")])
            .with_container([("memory", "96Mi"), ("ephemeral-storage", "1Gi")])];

        let overhead = compute_overhead(&templates, &daemons).unwrap();
        let total = get(&overhead, "plain");
        assert_eq!(total.cpu_millicores(), 350);
        assert_eq!(total.memory_bytes(), 128 * 1024 * 1024);
        assert_eq!(total.milli_value("ephemeral-storage"), 1024 * 1024 * 1024 * 1000);
    }

    #[test]
    fn test_every_template_gets_an_entry() {
        let templates = vec![
            template("a", vec![], vec![taint("x", "NoSchedule")]),
            template("b", vec![], vec![taint("y", "NoExecute")]),
            template("c", vec![], vec![]),
        ];

        let overhead = compute_overhead(&templates, &[]).unwrap();
        assert_eq!(overhead.len(), 3);
        assert!(overhead.values().all(ResourceQuantities::is_zero));
    }

    #[test]
    fn test_sums_across_daemons() {
        let templates = vec![template("plain", vec![], vec![])];
        let daemons = vec![
            daemon("a", "500m", "256Mi"),
            daemon("b", "100m", "32Mi"),
            daemon("c", "200m", "64Mi"),
        ];

        let overhead = compute_overhead(&templates, &daemons).unwrap();
        assert_eq!(get(&overhead, "plain").to_string(), "{cpu=800m, memory=352Mi}");
    }

    #[test]
    fn test_adding_taint_never_adds_daemons() {
        let tolerant = Toleration {
            key: Some("a".to_string()),
            operator: Some("Exists".to_string()),
            ..Default::default()
        };
        let daemons = vec![
            daemon("plain", "100m", "1Mi"),
            daemon("tolerant", "200m", "1Mi").with_tolerations(vec![tolerant]),
        ];
        let calculator = OverheadCalculator::default();

        let mut taints = vec![];
        let mut previous = daemons.len();
        for extra in [taint("a", "NoSchedule"), taint("b", "PreferNoSchedule")] {
            taints.push(extra);
            let tainted = template("t", vec![], taints.clone());
            let admitted = calculator.admitted(&tainted, &daemons).len();
            assert!(admitted <= previous);
            previous = admitted;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn test_malformed_quantity_skips_daemon() {
        let templates = vec![template("plain", vec![], vec![])];
        let daemons = vec![
            daemon("good", "100m", "32Mi"),
            daemon("bad", "one core", "32Mi"),
        ];

        let overhead = compute_overhead(&templates, &daemons).unwrap();
        let total = get(&overhead, "plain");
        assert_eq!(total.cpu_millicores(), 100);
        assert_eq!(total.memory_bytes(), 32 * 1024 * 1024);
    }

    #[test]
    fn test_malformed_quantity_aborts() {
        let calculator = OverheadCalculator::new(OverheadConfig {
            malformed_quantity: MalformedQuantityPolicy::Abort,
            ..Default::default()
        });
        let templates = vec![template("plain", vec![], vec![])];
        let daemons = vec![daemon("good", "100m", "32Mi"), daemon("bad", "100m", "32 megs")];

        let err = calculator.compute(&templates, &daemons).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::MalformedQuantity { ref daemon, .. } if daemon == "bad"
        ));
    }

    #[test]
    fn test_huge_exponent_follows_malformed_policy() {
        let templates = vec![template("plain", vec![], vec![])];
        let daemons = vec![
            daemon("good", "100m", "32Mi"),
            daemon("bad", "1e2147483647", "32Mi"),
        ];

        let skipped = compute_overhead(&templates, &daemons).unwrap();
        assert_eq!(get(&skipped, "plain").cpu_millicores(), 100);
        assert_eq!(get(&skipped, "plain").memory_bytes(), 32 * 1024 * 1024);

        let err = OverheadCalculator::new(OverheadConfig {
            malformed_quantity: MalformedQuantityPolicy::Abort,
            ..Default::default()
        })
        .compute(&templates, &daemons)
        .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::MalformedQuantity { ref daemon, .. } if daemon == "bad"
        ));
    }

    #[test]
    fn test_duplicate_template_rejected() {
        let templates = vec![template("same", vec![], vec![]), template("same", vec![], vec![])];
        let err = compute_overhead(&templates, &[]).unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateTemplate { .. }));
    }

    #[test]
    fn test_soft_taints_config() {
        let templates = vec![template("spot", vec![], vec![taint("spot", "PreferNoSchedule")])];
        let daemons = vec![daemon("agent", "100m", "32Mi")];

        let strict = compute_overhead(&templates, &daemons).unwrap();
        assert!(get(&strict, "spot").is_zero());

        let lenient = OverheadCalculator::new(OverheadConfig {
            soft_taints: SoftTaintPolicy::Ignore,
            ..Default::default()
        })
        .compute(&templates, &daemons)
        .unwrap();
        assert_eq!(get(&lenient, "spot").cpu_millicores(), 100);
    }

    #[test]
    fn test_infeasible_template_matches_no_conflicting_daemon() {
        let templates = vec![template(
            "broken",
            vec![
                req("zone", Operator::In, &["a"]),
                req("zone", Operator::In, &["b"]),
            ],
            vec![],
        )];
        let daemons = vec![
            daemon("zonal", "100m", "1Mi")
                .with_node_affinity(affinity(vec![vec![req("zone", Operator::In, &["a"])]])),
            daemon("anywhere", "50m", "1Mi"),
        ];

        let overhead = compute_overhead(&templates, &daemons).unwrap();
        assert_eq!(get(&overhead, "broken").cpu_millicores(), 50);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: OverheadConfig =
            serde_json::from_str(r#"{"malformedQuantity":"Abort"}"#).unwrap();
        assert_eq!(config.malformed_quantity, MalformedQuantityPolicy::Abort);
        assert_eq!(config.soft_taints, SoftTaintPolicy::Enforce);
    }

    #[test]
    fn test_concurrent_invocations_agree() {
        let calculator = OverheadCalculator::default();
        let templates = vec![
            template("monitor", vec![req("role", Operator::In, &["monitor"])], vec![]),
            template("tainted", vec![], vec![taint("x", "NoSchedule")]),
        ];
        let daemons = vec![
            daemon("a", "100m", "32Mi"),
            daemon("b", "200m", "64Mi")
                .with_node_affinity(affinity(vec![vec![req("role", Operator::In, &["web"])]])),
        ];
        let expected = calculator.compute(&templates, &daemons).unwrap();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| calculator.compute(&templates, &daemons).unwrap()))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
    }
}
