use crate::{Result, StratusError};
use k8s_openapi::api::core::v1::NodeSelectorRequirement;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Node selector operator, spelled as on the Kubernetes wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    #[serde(rename = "Gt")]
    GreaterThan,
    #[serde(rename = "Lt")]
    LessThan,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::In => "In",
            Operator::NotIn => "NotIn",
            Operator::Exists => "Exists",
            Operator::DoesNotExist => "DoesNotExist",
            Operator::GreaterThan => "Gt",
            Operator::LessThan => "Lt",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "In" => Ok(Operator::In),
            "NotIn" => Ok(Operator::NotIn),
            "Exists" => Ok(Operator::Exists),
            "DoesNotExist" => Ok(Operator::DoesNotExist),
            "Gt" => Ok(Operator::GreaterThan),
            "Lt" => Ok(Operator::LessThan),
            other => Err(format!("unknown operator '{}'", other)),
        }
    }
}

/// Present label values a requirement permits
#[derive(Debug, Clone, PartialEq, Eq)]
enum ValueSet {
    /// Exactly these values
    Only(BTreeSet<String>),
    /// Every value except these
    AllExcept(BTreeSet<String>),
}

/// A constraint on a single node label.
///
/// A requirement is read as the set of label states it permits. A state is
/// either a present value or the label being absent altogether. `NotIn` and
/// `DoesNotExist` permit absence, the rest require the label to be set.
/// Bounds from `Gt`/`Lt` are kept alongside a co-finite value set and folded
/// into the value set as soon as it becomes finite.
///
/// Requirements are immutable values: [`Requirement::intersection`] returns a
/// new requirement. An intersection with nothing left in it is
/// [infeasible](Requirement::is_infeasible) rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    values: ValueSet,
    greater_than: Option<i64>,
    less_than: Option<i64>,
    allows_absent: bool,
}

impl Requirement {
    /// Build a requirement, validating the operator/value combination
    pub fn new<I, S>(key: impl Into<String>, operator: Operator, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        if key.is_empty() {
            return Err(StratusError::invalid_requirement(key, "key must not be empty"));
        }
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();

        let requirement = match operator {
            Operator::In | Operator::NotIn => {
                if values.is_empty() {
                    return Err(StratusError::invalid_requirement(
                        key,
                        format!("{} requires at least one value", operator),
                    ));
                }
                if operator == Operator::In {
                    Self::with(key, ValueSet::Only(values), false)
                } else {
                    Self::with(key, ValueSet::AllExcept(values), true)
                }
            }
            Operator::Exists | Operator::DoesNotExist => {
                if !values.is_empty() {
                    return Err(StratusError::invalid_requirement(
                        key,
                        format!("{} does not take values", operator),
                    ));
                }
                if operator == Operator::Exists {
                    Self::with(key, ValueSet::AllExcept(BTreeSet::new()), false)
                } else {
                    Self::with(key, ValueSet::Only(BTreeSet::new()), true)
                }
            }
            Operator::GreaterThan | Operator::LessThan => {
                let bound = single_integer(&key, operator, &values)?;
                let mut requirement =
                    Self::with(key, ValueSet::AllExcept(BTreeSet::new()), false);
                if operator == Operator::GreaterThan {
                    requirement.greater_than = Some(bound);
                } else {
                    requirement.less_than = Some(bound);
                }
                requirement.normalized()
            }
        };

        Ok(requirement)
    }

    /// Build a requirement from a k8s-openapi node selector expression
    pub fn from_node_selector_requirement(expr: &NodeSelectorRequirement) -> Result<Self> {
        let operator = expr
            .operator
            .parse::<Operator>()
            .map_err(|reason| StratusError::invalid_requirement(&expr.key, reason))?;
        Self::new(
            expr.key.clone(),
            operator,
            expr.values.iter().flatten().cloned(),
        )
    }

    /// The requirement assumed for a key a template has not constrained.
    ///
    /// Reported as `Exists`, but it also permits the label to be absent: the
    /// template has not committed to anything for this key, so any state is
    /// possible. It is the identity element of [`Requirement::intersection`].
    pub fn wildcard(key: impl Into<String>) -> Self {
        Self::with(key.into(), ValueSet::AllExcept(BTreeSet::new()), true)
    }

    fn with(key: String, values: ValueSet, allows_absent: bool) -> Self {
        Self {
            key,
            values,
            greater_than: None,
            less_than: None,
            allows_absent,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Closest operator describing this requirement
    pub fn operator(&self) -> Operator {
        match &self.values {
            ValueSet::Only(values) if values.is_empty() => Operator::DoesNotExist,
            ValueSet::Only(_) => Operator::In,
            ValueSet::AllExcept(values) if !values.is_empty() => Operator::NotIn,
            ValueSet::AllExcept(_) => {
                if self.greater_than.is_some() {
                    Operator::GreaterThan
                } else if self.less_than.is_some() {
                    Operator::LessThan
                } else {
                    Operator::Exists
                }
            }
        }
    }

    /// Included values for `In`, excluded values for `NotIn`
    pub fn values(&self) -> impl Iterator<Item = &str> {
        match &self.values {
            ValueSet::Only(values) | ValueSet::AllExcept(values) => {
                values.iter().map(String::as_str)
            }
        }
    }

    pub fn greater_than(&self) -> Option<i64> {
        self.greater_than
    }

    pub fn less_than(&self) -> Option<i64> {
        self.less_than
    }

    /// Whether a node without this label satisfies the requirement
    pub fn allows_absent(&self) -> bool {
        self.allows_absent
    }

    /// Whether this is the unconstrained wildcard for its key
    pub fn is_wildcard(&self) -> bool {
        *self == Self::wildcard(self.key.clone())
    }

    /// Whether a node carrying `value` for this key satisfies the requirement
    pub fn has(&self, value: &str) -> bool {
        let listed = match &self.values {
            ValueSet::Only(values) => values.contains(value),
            ValueSet::AllExcept(values) => !values.contains(value),
        };
        listed && self.within_bounds(value)
    }

    /// True when no node state, present or absent, satisfies the requirement
    pub fn is_infeasible(&self) -> bool {
        !self.allows_absent && matches!(&self.values, ValueSet::Only(values) if values.is_empty())
    }

    /// Narrow this requirement by another one for the same key.
    ///
    /// The result permits exactly the label states both permit. It is
    /// commutative, associative and idempotent; an empty result is returned
    /// as an infeasible requirement.
    pub fn intersection(&self, other: &Requirement) -> Requirement {
        let values = match (&self.values, &other.values) {
            (ValueSet::Only(a), ValueSet::Only(b)) => {
                ValueSet::Only(a.intersection(b).cloned().collect())
            }
            (ValueSet::Only(a), ValueSet::AllExcept(b))
            | (ValueSet::AllExcept(b), ValueSet::Only(a)) => {
                ValueSet::Only(a.difference(b).cloned().collect())
            }
            (ValueSet::AllExcept(a), ValueSet::AllExcept(b)) => {
                ValueSet::AllExcept(a.union(b).cloned().collect())
            }
        };

        Requirement {
            key: self.key.clone(),
            values,
            greater_than: max_bound(self.greater_than, other.greater_than),
            less_than: min_bound(self.less_than, other.less_than),
            allows_absent: self.allows_absent && other.allows_absent,
        }
        .normalized()
    }

    /// Whether the two requirements share at least one permissible state
    pub fn intersects(&self, other: &Requirement) -> bool {
        !self.intersection(other).is_infeasible()
    }

    /// Canonical form: finite sets carry no bounds, co-finite sets only
    /// exclude values the bounds would otherwise admit.
    fn normalized(mut self) -> Self {
        if self.greater_than.is_none() && self.less_than.is_none() {
            return self;
        }

        // Need an integer strictly inside the bounds
        let empty = match (self.greater_than, self.less_than) {
            (Some(lower), Some(upper)) => i128::from(upper) - i128::from(lower) < 2,
            (Some(lower), None) => lower == i64::MAX,
            (None, Some(upper)) => upper == i64::MIN,
            (None, None) => false,
        };
        if empty {
            self.values = ValueSet::Only(BTreeSet::new());
            self.greater_than = None;
            self.less_than = None;
            return self;
        }

        let (greater_than, less_than) = (self.greater_than, self.less_than);
        match &mut self.values {
            ValueSet::Only(values) => {
                values.retain(|v| within(v, greater_than, less_than));
                self.greater_than = None;
                self.less_than = None;
            }
            ValueSet::AllExcept(values) => {
                values.retain(|v| within(v, greater_than, less_than));
            }
        }
        self
    }

    fn within_bounds(&self, value: &str) -> bool {
        within(value, self.greater_than, self.less_than)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infeasible() {
            return write!(f, "{} <infeasible>", self.key);
        }
        if self.is_wildcard() {
            return write!(f, "{} Any", self.key);
        }

        write!(f, "{}", self.key)?;
        match &self.values {
            ValueSet::Only(values) if values.is_empty() => write!(f, " DoesNotExist")?,
            ValueSet::Only(values) => write!(f, " In {}", render_values(values))?,
            ValueSet::AllExcept(values) => {
                let bounded = self.greater_than.is_some() || self.less_than.is_some();
                if !values.is_empty() {
                    write!(f, " NotIn {}", render_values(values))?;
                } else if !bounded {
                    write!(f, " Exists")?;
                }
                if let Some(lower) = self.greater_than {
                    write!(f, " Gt {}", lower)?;
                }
                if let Some(upper) = self.less_than {
                    write!(f, " Lt {}", upper)?;
                }
            }
        }
        Ok(())
    }
}

fn render_values(values: &BTreeSet<String>) -> String {
    let joined: Vec<&str> = values.iter().map(String::as_str).collect();
    format!("[{}]", joined.join(", "))
}

fn single_integer(key: &str, operator: Operator, values: &BTreeSet<String>) -> Result<i64> {
    let mut iter = values.iter();
    match (iter.next(), iter.next()) {
        (Some(value), None) => value.parse::<i64>().map_err(|_| {
            StratusError::invalid_requirement(
                key,
                format!("{} requires an integer value, got '{}'", operator, value),
            )
        }),
        _ => Err(StratusError::invalid_requirement(
            key,
            format!("{} requires exactly one value", operator),
        )),
    }
}

fn within(value: &str, greater_than: Option<i64>, less_than: Option<i64>) -> bool {
    if greater_than.is_none() && less_than.is_none() {
        return true;
    }
    match value.parse::<i64>() {
        Ok(v) => greater_than.is_none_or(|g| v > g) && less_than.is_none_or(|l| v < l),
        Err(_) => false,
    }
}

fn max_bound(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn min_bound(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
