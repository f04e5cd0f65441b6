use crate::{Result, StratusError};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign};

/// Resources whose canonical rendering uses binary suffixes (Ki, Mi, Gi, ...)
const BINARY_RESOURCES: &[&str] = &["memory", "ephemeral-storage", "storage"];

const BINARY_SUFFIXES: &[(&str, u32)] = &[
    ("Ki", 1),
    ("Mi", 2),
    ("Gi", 3),
    ("Ti", 4),
    ("Pi", 5),
    ("Ei", 6),
];

const DECIMAL_SUFFIXES: &[(&str, i32)] = &[
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("", 0),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

/// Longest mantissa accepted before the value is considered nonsense
const MAX_MANTISSA_DIGITS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scale {
    /// Power of 1024
    Binary(u32),
    /// Power of 10
    Decimal(i32),
}

/// Parse a Kubernetes quantity string into milli-units.
///
/// `"500m"` -> 500, `"2"` -> 2000, `"1Ki"` -> 1_024_000. Fractions below one
/// milli-unit round up, matching how Kubernetes reports `MilliValue()`.
/// Negative quantities are rejected since requests cannot be negative.
pub fn parse_milli(s: &str) -> std::result::Result<i64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty quantity".to_string());
    }

    let unsigned = s.strip_prefix('+').unwrap_or(s);
    if unsigned.starts_with('-') {
        return Err("negative quantities are not allowed".to_string());
    }

    let split = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(split);

    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err("missing numeric value".to_string());
    }
    if frac_part.contains('.') {
        return Err("more than one decimal point".to_string());
    }

    let digits = format!("{}{}", int_part, frac_part);
    let digits = digits.trim_start_matches('0');
    if digits.len() > MAX_MANTISSA_DIGITS {
        return Err("too many significant digits".to_string());
    }
    let mantissa: i128 = if digits.is_empty() {
        0
    } else {
        digits.parse::<i128>().map_err(|e| e.to_string())?
    };
    let frac_len = i32::try_from(frac_part.len()).map_err(|_| "quantity overflows".to_string())?;

    let scale = parse_suffix(suffix)?;

    let milli = match scale {
        Scale::Decimal(exponent) => {
            let exponent = exponent
                .checked_add(3)
                .and_then(|e| e.checked_sub(frac_len))
                .ok_or_else(|| "quantity overflows".to_string())?;
            scale_decimal(mantissa, exponent)?
        }
        Scale::Binary(power) => {
            let factor = 1024i128
                .checked_pow(power)
                .and_then(|f| f.checked_mul(1000))
                .ok_or_else(|| "quantity overflows".to_string())?;
            let scaled = mantissa
                .checked_mul(factor)
                .ok_or_else(|| "quantity overflows".to_string())?;
            scale_decimal(scaled, -frac_len)?
        }
    };

    i64::try_from(milli).map_err(|_| "quantity overflows".to_string())
}

fn parse_suffix(suffix: &str) -> std::result::Result<Scale, String> {
    if let Some((_, power)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Ok(Scale::Binary(*power));
    }
    if let Some((_, exponent)) = DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Ok(Scale::Decimal(*exponent));
    }
    // Decimal exponent notation: 1e3, 5E-2
    if let Some(exponent) = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))
    {
        return exponent
            .parse::<i32>()
            .map(Scale::Decimal)
            .map_err(|_| format!("invalid exponent '{}'", suffix));
    }
    Err(format!("unknown suffix '{}'", suffix))
}

/// Multiply `value` by 10^exponent, rounding up when the exponent is negative.
fn scale_decimal(value: i128, exponent: i32) -> std::result::Result<i128, String> {
    if value == 0 {
        return Ok(0);
    }
    if exponent >= 0 {
        10i128
            .checked_pow(exponent as u32)
            .and_then(|factor| value.checked_mul(factor))
            .ok_or_else(|| "quantity overflows".to_string())
    } else {
        match 10i128.checked_pow(exponent.unsigned_abs()) {
            Some(divisor) => Ok((value + divisor - 1) / divisor),
            // Anything this small is a sliver of one milli-unit
            None => Ok(1),
        }
    }
}

/// Render milli-units as a canonical Kubernetes quantity string for `resource`.
pub fn format_milli(resource: &str, milli: i64) -> String {
    if milli % 1000 != 0 {
        return format!("{}m", milli);
    }

    let units = milli / 1000;
    if units > 0 && BINARY_RESOURCES.contains(&resource) {
        for (suffix, power) in BINARY_SUFFIXES.iter().rev() {
            let factor = 1024i64.pow(*power);
            if units % factor == 0 {
                return format!("{}{}", units / factor, suffix);
            }
        }
    }

    units.to_string()
}

/// Aggregate resource quantities keyed by resource name
///
/// Values are stored as exact milli-units so that summing "100m" of CPU and
/// "0.5" of CPU, or "32Mi" and "1G" of memory, never loses precision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceQuantities {
    milli: BTreeMap<String, i64>,
}

impl ResourceQuantities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a k8s-openapi resource list. Any malformed entry fails the whole list.
    pub fn from_k8s_resource_map(resources: &BTreeMap<String, Quantity>) -> Result<Self> {
        let mut quantities = Self::new();
        for (name, quantity) in resources {
            let milli = parse_milli(&quantity.0)
                .map_err(|reason| StratusError::malformed_quantity(name, &quantity.0, reason))?;
            quantities.add_milli(name, milli);
        }
        Ok(quantities)
    }

    /// Parse a plain name -> quantity string map
    pub fn from_resource_map<'a, I>(resources: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut quantities = Self::new();
        for (name, value) in resources {
            let milli = parse_milli(value)
                .map_err(|reason| StratusError::malformed_quantity(name, value, reason))?;
            quantities.add_milli(name, milli);
        }
        Ok(quantities)
    }

    /// Add `milli` units of `resource`
    pub fn add_milli(&mut self, resource: &str, milli: i64) {
        let entry = self.milli.entry(resource.to_string()).or_insert(0);
        *entry = entry.saturating_add(milli);
    }

    /// Raise every resource to at least the amount in `other`
    pub fn max_with(&mut self, other: &ResourceQuantities) {
        for (name, milli) in &other.milli {
            let entry = self.milli.entry(name.clone()).or_insert(0);
            *entry = (*entry).max(*milli);
        }
    }

    /// Milli-units of `resource`, zero if not present
    pub fn milli_value(&self, resource: &str) -> i64 {
        self.milli.get(resource).copied().unwrap_or(0)
    }

    /// CPU in millicores (1000 = 1 core)
    pub fn cpu_millicores(&self) -> i64 {
        self.milli_value("cpu")
    }

    /// Memory in bytes, rounded up
    pub fn memory_bytes(&self) -> i64 {
        let milli = self.milli_value("memory");
        milli / 1000 + i64::from(milli % 1000 != 0)
    }

    /// True when no resource has a non-zero amount
    pub fn is_zero(&self) -> bool {
        self.milli.values().all(|v| *v == 0)
    }

    /// Iterate over (resource, milli-units)
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.milli.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Convert back into a k8s-openapi resource list
    pub fn to_k8s_resource_map(&self) -> BTreeMap<String, Quantity> {
        self.milli
            .iter()
            .map(|(name, milli)| (name.clone(), Quantity(format_milli(name, *milli))))
            .collect()
    }
}

impl AddAssign<&ResourceQuantities> for ResourceQuantities {
    fn add_assign(&mut self, other: &ResourceQuantities) {
        for (name, milli) in &other.milli {
            self.add_milli(name, *milli);
        }
    }
}

impl Add<&ResourceQuantities> for ResourceQuantities {
    type Output = ResourceQuantities;

    fn add(mut self, other: &ResourceQuantities) -> Self::Output {
        self += other;
        self
    }
}

impl fmt::Display for ResourceQuantities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.milli.is_empty() {
            return write!(f, "{{}}");
        }
        let rendered: Vec<String> = self
            .milli
            .iter()
            .map(|(name, milli)| format!("{}={}", name, format_milli(name, *milli)))
            .collect();
        write!(f, "{{{}}}", rendered.join(", "))
    }
}

impl Serialize for ResourceQuantities {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_k8s_resource_map().serialize(serializer)
    }
}
