//! Static model to alternates mapping.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordered alternates per model identifier.
///
/// Lookups for unknown models return an empty list rather than failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FallbackTable {
    entries: HashMap<String, Vec<String>>,
}

impl Default for FallbackTable {
    fn default() -> Self {
        Self::from_entries([
            ("llama3.2:latest", vec!["deepseek-r1", "phi4:latest"]),
            ("olmo2:13b", vec!["deepseek-r1:14b", "phi4:latest"]),
            ("deepseek-r1", vec!["phi4:latest", "llama3.2:latest"]),
            ("deepseek-r1:14b", vec!["phi4:latest", "deepseek-r1"]),
            ("phi4:latest", vec!["deepseek-r1:14b", "llama3.2:latest"]),
        ])
    }
}

impl FallbackTable {
    /// Creates an empty table.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Builds a table from `(model, alternates)` pairs.
    #[must_use]
    pub fn from_entries<M, A, I>(entries: I) -> Self
    where
        M: Into<String>,
        A: Into<String>,
        I: IntoIterator<Item = (M, Vec<A>)>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(model, alts)| (model.into(), alts.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    /// Adds or replaces an entry.
    #[must_use]
    pub fn with_entry<A: Into<String>>(mut self, model: impl Into<String>, alternates: Vec<A>) -> Self {
        self.entries
            .insert(model.into(), alternates.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the alternates for a model, empty if unknown.
    #[must_use]
    pub fn alternates(&self, model: &str) -> &[String] {
        self.entries.get(model).map_or(&[], Vec::as_slice)
    }

    /// Returns true if the model has an entry (possibly empty).
    #[must_use]
    pub fn contains(&self, model: &str) -> bool {
        self.entries.contains_key(model)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rejects blank model names and blank alternates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (model, alternates) in &self.entries {
            if model.trim().is_empty() || alternates.iter().any(|a| a.trim().is_empty()) {
                return Err(ConfigError::MalformedFallbackEntry {
                    model: model.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = FallbackTable::default();
        assert_eq!(table.len(), 5);
        assert_eq!(
            table.alternates("olmo2:13b"),
            ["deepseek-r1:14b".to_string(), "phi4:latest".to_string()]
        );
    }

    #[test]
    fn test_unknown_model_has_no_alternates() {
        let table = FallbackTable::default();
        assert!(table.alternates("gpt-oss:20b").is_empty());
        assert!(!table.contains("gpt-oss:20b"));
    }

    #[test]
    fn test_empty_entry_counts_as_present() {
        let table = FallbackTable::empty().with_entry::<String>("solo:1b", vec![]);
        assert!(table.contains("solo:1b"));
        assert!(table.alternates("solo:1b").is_empty());
    }

    #[test]
    fn test_validate_blank_alternate() {
        let table = FallbackTable::empty().with_entry("m1", vec!["m2", " "]);
        assert!(matches!(
            table.validate(),
            Err(ConfigError::MalformedFallbackEntry { model }) if model == "m1"
        ));
    }

    #[test]
    fn test_json_roundtrip_shape() {
        let table: FallbackTable =
            serde_json::from_str(r#"{"m1": ["m2", "m3"], "m2": []}"#).unwrap();
        assert_eq!(table.alternates("m1"), ["m2".to_string(), "m3".to_string()]);
        assert!(table.contains("m2"));
    }
}
