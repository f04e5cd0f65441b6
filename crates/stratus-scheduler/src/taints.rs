use k8s_openapi::api::core::v1::{Taint, Toleration};
use serde::{Deserialize, Serialize};

pub const EFFECT_NO_SCHEDULE: &str = "NoSchedule";
pub const EFFECT_PREFER_NO_SCHEDULE: &str = "PreferNoSchedule";
pub const EFFECT_NO_EXECUTE: &str = "NoExecute";

/// How `PreferNoSchedule` taints count towards admission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoftTaintPolicy {
    /// A daemon must tolerate soft taints like any other
    #[default]
    Enforce,
    /// Soft taints never exclude a daemon
    Ignore,
}

/// Whether a single toleration neutralizes a single taint.
///
/// An empty toleration key matches every taint key and an empty effect
/// matches every effect. An empty operator means `Equal`.
pub fn toleration_tolerates(toleration: &Toleration, taint: &Taint) -> bool {
    let effect = toleration.effect.as_deref().unwrap_or_default();
    if !effect.is_empty() && effect != taint.effect {
        return false;
    }

    let key = toleration.key.as_deref().unwrap_or_default();
    if !key.is_empty() && key != taint.key {
        return false;
    }

    match toleration.operator.as_deref().unwrap_or_default() {
        "Exists" => true,
        "" | "Equal" => {
            toleration.value.as_deref().unwrap_or_default()
                == taint.value.as_deref().unwrap_or_default()
        }
        _ => false,
    }
}

/// First taint no toleration neutralizes, if any
pub fn untolerated<'a>(
    taints: &'a [Taint],
    tolerations: &[Toleration],
    policy: SoftTaintPolicy,
) -> Option<&'a Taint> {
    taints
        .iter()
        .filter(|taint| {
            !(policy == SoftTaintPolicy::Ignore && taint.effect == EFFECT_PREFER_NO_SCHEDULE)
        })
        .find(|taint| {
            !tolerations
                .iter()
                .any(|toleration| toleration_tolerates(toleration, taint))
        })
}

/// True iff every taint is tolerated by some toleration, soft taints included
pub fn tolerates(taints: &[Taint], tolerations: &[Toleration]) -> bool {
    untolerated(taints, tolerations, SoftTaintPolicy::Enforce).is_none()
}
