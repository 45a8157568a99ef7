//! Caller-supplied workflow inputs.

use crate::utils::checksum_value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters for a workflow run.
///
/// Built once through the consuming `with_*` methods and never changed
/// afterwards, so a checksum taken at any point stays valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInputs {
    description: String,
    #[serde(default)]
    overrides: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    template: Option<String>,
}

impl WorkflowInputs {
    /// Creates inputs with a goal description.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            overrides: BTreeMap::new(),
            template: None,
        }
    }

    /// Adds a configuration override.
    #[must_use]
    pub fn with_override(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.overrides.insert(key.into(), value);
        self
    }

    /// Adds several configuration overrides.
    #[must_use]
    pub fn with_overrides<I, K>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        self.overrides
            .extend(overrides.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    /// Sets the named template.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Returns the goal description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the configuration overrides.
    #[must_use]
    pub fn overrides(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.overrides
    }

    /// Returns an override by key.
    #[must_use]
    pub fn get_override(&self, key: &str) -> Option<&serde_json::Value> {
        self.overrides.get(key)
    }

    /// Returns the template name.
    #[must_use]
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// SHA-256 over the canonical form.
    ///
    /// Keys are sorted at every depth, including inside override values,
    /// so insertion order never affects the result.
    #[must_use]
    pub fn checksum(&self) -> String {
        checksum_value(&serde_json::json!({
            "description": self.description,
            "overrides": self.overrides,
            "template": self.template,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checksum_order_independent() {
        let a = WorkflowInputs::new("build a todo app")
            .with_override("language", json!("rust"))
            .with_override("options", json!({"tests": true, "docs": false}));

        let mut nested = serde_json::Map::new();
        nested.insert("docs".into(), json!(false));
        nested.insert("tests".into(), json!(true));
        let b = WorkflowInputs::new("build a todo app").with_overrides(vec![
            ("options", serde_json::Value::Object(nested)),
            ("language", json!("rust")),
        ]);

        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_checksum_changes_with_content() {
        let base = WorkflowInputs::new("build a todo app");
        let templated = base.clone().with_template("web");
        let described = WorkflowInputs::new("build a chat app");

        assert_ne!(base.checksum(), templated.checksum());
        assert_ne!(base.checksum(), described.checksum());
    }

    #[test]
    fn test_checksum_is_stable() {
        let inputs = WorkflowInputs::new("x").with_override("k", json!(1));
        assert_eq!(inputs.checksum(), inputs.clone().checksum());
        assert_eq!(inputs.checksum().len(), 64);
    }

    #[test]
    fn test_accessors() {
        let inputs = WorkflowInputs::new("goal")
            .with_override("k", json!(1))
            .with_template("cli");
        assert_eq!(inputs.description(), "goal");
        assert_eq!(inputs.get_override("k"), Some(&json!(1)));
        assert_eq!(inputs.template(), Some("cli"));
    }
}
