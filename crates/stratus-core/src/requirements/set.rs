use super::requirement::{Operator, Requirement};
use crate::Result;
use k8s_openapi::api::core::v1::NodeSelectorRequirement;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// What a [`RequirementSet`] knows about one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyConstraint<'a> {
    /// The set narrowed this key
    Constrained(&'a Requirement),
    /// Nothing has been said about this key; any state is still possible
    Unconstrained,
}

impl<'a> KeyConstraint<'a> {
    /// Resolve to a concrete requirement, the wildcard if unconstrained
    pub fn resolve(self, key: &str) -> Cow<'a, Requirement> {
        match self {
            KeyConstraint::Constrained(requirement) => Cow::Borrowed(requirement),
            KeyConstraint::Unconstrained => Cow::Owned(Requirement::wildcard(key)),
        }
    }
}

/// Conjunction of per-key requirements describing a partially specified node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementSet {
    requirements: BTreeMap<String, Requirement>,
}

impl RequirementSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each label `k=v` becomes `k In [v]`
    pub fn from_labels<'a, I>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut set = Self::new();
        for (key, value) in labels {
            set.add(Requirement::new(key.clone(), Operator::In, [value.clone()])?);
        }
        Ok(set)
    }

    /// Build from k8s-openapi node selector expressions, intersecting repeated keys
    pub fn from_node_selector_requirements(exprs: &[NodeSelectorRequirement]) -> Result<Self> {
        let mut set = Self::new();
        for expr in exprs {
            set.add(Requirement::from_node_selector_requirement(expr)?);
        }
        Ok(set)
    }

    /// Merge a requirement, intersecting with what is already held for its key.
    ///
    /// Narrowing only; the final state does not depend on insertion order.
    pub fn add(&mut self, requirement: Requirement) {
        let merged = match self.requirements.get(requirement.key()) {
            Some(existing) => existing.intersection(&requirement),
            None => requirement,
        };
        self.requirements.insert(merged.key().to_string(), merged);
    }

    /// Merge every requirement of `other` into this set
    pub fn add_all(&mut self, other: &RequirementSet) {
        for requirement in other.requirements.values() {
            self.add(requirement.clone());
        }
    }

    pub fn constraint(&self, key: &str) -> KeyConstraint<'_> {
        match self.requirements.get(key) {
            Some(requirement) => KeyConstraint::Constrained(requirement),
            None => KeyConstraint::Unconstrained,
        }
    }

    /// The requirement for `key`, or the wildcard when the key is unconstrained.
    ///
    /// Defaulting to the wildcard over-approximates what a template can become,
    /// so anything that could land on it is counted.
    pub fn get(&self, key: &str) -> Cow<'_, Requirement> {
        self.constraint(key).resolve(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.requirements.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.requirements.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.requirements.values()
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Whether `requirement` can hold on some node described by this set
    pub fn compatible(&self, requirement: &Requirement) -> bool {
        self.get(requirement.key()).intersects(requirement)
    }

    /// Whether every requirement of `other` can hold on some node described by this set
    pub fn compatible_with(&self, other: &RequirementSet) -> bool {
        other.iter().all(|requirement| self.compatible(requirement))
    }

    /// Compatibility with a raw node selector expression
    pub fn compatible_expression(&self, expr: &NodeSelectorRequirement) -> Result<bool> {
        let requirement = Requirement::from_node_selector_requirement(expr)?;
        Ok(self.compatible(&requirement))
    }

    /// False when some key admits no state at all
    pub fn is_feasible(&self) -> bool {
        self.requirements.values().all(|r| !r.is_infeasible())
    }

    pub fn infeasible_keys(&self) -> impl Iterator<Item = &str> {
        self.requirements
            .values()
            .filter(|r| r.is_infeasible())
            .map(Requirement::key)
    }

    /// Labels every node of this shape is guaranteed to carry
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.requirements
            .values()
            .filter(|r| r.operator() == Operator::In)
            .filter_map(|r| {
                let mut values = r.values();
                match (values.next(), values.next()) {
                    (Some(value), None) => Some((r.key().to_string(), value.to_string())),
                    _ => None,
                }
            })
            .collect()
    }
}

impl FromIterator<Requirement> for RequirementSet {
    fn from_iter<T: IntoIterator<Item = Requirement>>(iter: T) -> Self {
        let mut set = Self::new();
        for requirement in iter {
            set.add(requirement);
        }
        set
    }
}

impl fmt::Display for RequirementSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.requirements.values().map(|r| r.to_string()).collect();
        write!(f, "{{{}}}", rendered.join(", "))
    }
}
