pub mod engine;

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{RelabelError, Result};

pub use engine::{RemapEngine, Validation};

/// One `old -> new` substitution of the extended classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelMapping {
    pub old_label: i32,
    pub new_label: i32,
}

impl LabelMapping {
    pub fn new(old_label: i32, new_label: i32) -> Self {
        Self {
            old_label,
            new_label,
        }
    }

    /// Coerces two textual labels, e.g. two spreadsheet cells.
    pub fn parse(old_label: &str, new_label: &str) -> Result<Self> {
        Ok(Self::new(parse_label(old_label)?, parse_label(new_label)?))
    }
}

impl fmt::Display for LabelMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.old_label, self.new_label)
    }
}

/// Accepts `OLD:NEW`, `OLD=NEW` and `OLD->NEW`.
impl FromStr for LabelMapping {
    type Err = RelabelError;

    fn from_str(s: &str) -> Result<Self> {
        let (old_label, new_label) = s
            .split_once("->")
            .or_else(|| s.split_once(':'))
            .or_else(|| s.split_once('='))
            .ok_or_else(|| RelabelError::invalid_label(s, "expected OLD:NEW"))?;
        Self::parse(old_label, new_label)
    }
}

/// Parses a label written as an integer, or as a float with no fractional
/// part (`"3.0"`), the way spreadsheet exports tend to write them.
pub fn parse_label(value: &str) -> Result<i32> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RelabelError::invalid_label(value, "empty"));
    }
    if let Ok(label) = trimmed.parse::<i32>() {
        return Ok(label);
    }

    let float: f64 = trimmed
        .parse()
        .map_err(|_| RelabelError::invalid_label(value, "not an integer"))?;
    if !float.is_finite() || float.fract() != 0.0 {
        return Err(RelabelError::invalid_label(value, "not an integer"));
    }
    if float < i32::MIN as f64 || float > i32::MAX as f64 {
        return Err(RelabelError::invalid_label(value, "outside the i32 range"));
    }
    Ok(float as i32)
}

/// Keeps only the mappings whose old label is available, in order.
pub fn retain_available(mappings: &[LabelMapping], available: &LabelSet) -> Vec<LabelMapping> {
    mappings
        .iter()
        .filter(|mapping| available.contains(mapping.old_label))
        .copied()
        .collect()
}

/// Sorted set of distinct classification values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet(BTreeSet<i32>);

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_column(column: &[i32]) -> Self {
        column.iter().copied().collect()
    }

    pub fn insert(&mut self, label: i32) -> bool {
        self.0.insert(label)
    }

    pub fn union_with(&mut self, other: &LabelSet) {
        self.0.extend(other.iter());
    }

    pub fn contains(&self, label: i32) -> bool {
        self.0.contains(&label)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<i32> for LabelSet {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.iter().map(|label| label.to_string()).collect();
        write!(f, "{}", labels.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapEntry {
    #[serde(flatten)]
    pub mapping: LabelMapping,
    pub records_changed: usize,
}

/// Per-mapping change counts, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapReport {
    pub entries: Vec<RemapEntry>,
}

impl RemapReport {
    pub fn total_changed(&self) -> usize {
        self.entries.iter().map(|entry| entry.records_changed).sum()
    }
}
