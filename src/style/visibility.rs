//! Declarative display state: visibility predicates over flags, and units.
//!
//! A layer opts into flag-driven visibility through its `metadata.visibility`:
//!
//! - `"beta"` shows the layer while the `beta` flag is set,
//! - `["all", "beta", "gamma"]` requires every listed flag,
//! - `["any", "beta", "gamma"]` or a plain list `["beta", "gamma"]` requires
//!   at least one.

use crate::domain::error::{MapError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// Named boolean switches supplied by the application. Missing keys are
/// `false`.
pub type Flags = BTreeMap<String, bool>;

/// Measurement system of unit-tagged layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Kilometres and metres. Serialized as `"metric"`.
    Metric,
    /// Miles and feet. Serialized as `"imperial"`.
    Imperial,
}

impl Units {
    /// The other measurement system.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Metric => Self::Imperial,
            Self::Imperial => Self::Metric,
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metric => f.write_str("metric"),
            Self::Imperial => f.write_str("imperial"),
        }
    }
}

/// When a flag-gated layer is displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityPredicate {
    /// Shown while the named flag is set.
    Flag(String),
    /// Shown while every listed flag is set. An empty list is always shown.
    AllOf(Vec<String>),
    /// Shown while at least one listed flag is set. An empty list is never
    /// shown.
    AnyOf(Vec<String>),
}

impl VisibilityPredicate {
    /// Parses a `metadata.visibility` value.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Style`] for values that are neither a string nor a
    /// list of strings.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::style::{Flags, VisibilityPredicate};
    /// use serde_json::json;
    ///
    /// let predicate = VisibilityPredicate::from_metadata(&json!(["all", "beta", "gamma"]))?;
    /// let mut flags = Flags::new();
    /// flags.insert("beta".to_string(), true);
    /// assert!(!predicate.evaluate(&flags));
    ///
    /// flags.insert("gamma".to_string(), true);
    /// assert!(predicate.evaluate(&flags));
    ///
    /// assert!(VisibilityPredicate::from_metadata(&json!(3)).is_err());
    /// # Ok::<(), mapweave::MapError>(())
    /// ```
    pub fn from_metadata(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::String(flag) => Ok(Self::Flag(flag.clone())),
            JsonValue::Array(items) => {
                let names = items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| {
                            MapError::Style(format!("visibility flag is not a string: {item}"))
                        })
                    })
                    .collect::<Result<Vec<String>>>()?;
                Ok(match names.split_first() {
                    Some((op, rest)) if op == "all" => Self::AllOf(rest.to_vec()),
                    Some((op, rest)) if op == "any" => Self::AnyOf(rest.to_vec()),
                    _ => Self::AnyOf(names),
                })
            }
            other => Err(MapError::Style(format!(
                "unsupported visibility predicate: {other}"
            ))),
        }
    }

    /// Whether a layer gated by this predicate is visible under `flags`.
    /// Missing flags count as `false`.
    pub fn evaluate(&self, flags: &Flags) -> bool {
        let set = |name: &String| flags.get(name).copied().unwrap_or(false);
        match self {
            Self::Flag(name) => set(name),
            Self::AllOf(names) => names.iter().all(set),
            Self::AnyOf(names) => names.iter().any(set),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flags(pairs: &[(&str, bool)]) -> Flags {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn all_of_needs_every_flag() {
        let predicate = VisibilityPredicate::from_metadata(&json!(["all", "beta", "gamma"])).unwrap();
        assert!(!predicate.evaluate(&flags(&[("beta", true)])));
        assert!(!predicate.evaluate(&flags(&[("beta", true), ("gamma", false)])));
        assert!(predicate.evaluate(&flags(&[("beta", true), ("gamma", true)])));
    }

    #[test]
    fn any_of_needs_one_flag() {
        for raw in [json!(["any", "beta", "gamma"]), json!(["beta", "gamma"])] {
            let predicate = VisibilityPredicate::from_metadata(&raw).unwrap();
            assert!(predicate.evaluate(&flags(&[("gamma", true)])));
            assert!(!predicate.evaluate(&Flags::new()));
        }
    }

    #[test]
    fn single_flag() {
        let predicate = VisibilityPredicate::from_metadata(&json!("beta")).unwrap();
        assert_eq!(predicate, VisibilityPredicate::Flag("beta".to_string()));
        assert!(predicate.evaluate(&flags(&[("beta", true)])));
    }

    #[test]
    fn malformed_metadata_is_rejected() {
        assert!(VisibilityPredicate::from_metadata(&json!(3)).is_err());
        assert!(VisibilityPredicate::from_metadata(&json!(["all", 1])).is_err());
    }

    #[test]
    fn units_parse_lowercase() {
        let units: Units = serde_json::from_value(json!("imperial")).unwrap();
        assert_eq!(units, Units::Imperial);
        assert_eq!(units.other().to_string(), "metric");
    }
}
