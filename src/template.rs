//! Prompt templates and their typed variable model.
//!
//! A [`PromptTemplate`] is authored once (content, tags, variable
//! definitions) and executed many times against a fresh
//! [`VariableContext`]. Definitions drive both validation and
//! default-substitution in the interpolator.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The declared type of a template variable.
///
/// Determines how a value is rendered into the resolved prompt. `Url` and
/// `Text` render like `String`; `Url` additionally gets a shape check that
/// produces a non-fatal warning. `Json` is accepted as an alias when
/// deserializing authored templates and renders like `Object`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Url,
    Text,
    Json,
}

/// A single variable declaration on a template.
///
/// Immutable once the template is authored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDefinition {
    /// Variable name as it appears inside `{{...}}` tokens.
    pub name: String,

    /// Declared type, controls rendering.
    #[serde(rename = "type")]
    pub var_type: VariableType,

    /// Whether a value must be supplied at execution time.
    pub required: bool,

    /// Substituted when the variable is absent and not required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,

    /// Optional enumeration of allowed values (authoring-time hint).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl VariableDefinition {
    /// Create a definition with no default and no options.
    pub fn new(name: impl Into<String>, var_type: VariableType, required: bool) -> Self {
        Self {
            name: name.into(),
            var_type,
            required,
            default_value: None,
            options: None,
        }
    }

    /// Set a default value (builder style).
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Set the allowed-values list (builder style).
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = Some(options);
        self
    }
}

/// Variable values paired with the definitions used to validate them.
///
/// Built fresh per execution call; never persisted independently of its
/// owning step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableContext {
    /// Variable name → typed value.
    pub values: HashMap<String, Value>,

    /// The template's variable definitions.
    pub definitions: Vec<VariableDefinition>,
}

impl VariableContext {
    pub fn new(definitions: Vec<VariableDefinition>) -> Self {
        Self {
            values: HashMap::new(),
            definitions,
        }
    }

    /// Insert a value (builder style).
    pub fn insert(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Insert a value (mutation style).
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Merge a flat map of values, e.g. carry-over from a previous step.
    /// Existing entries win.
    pub fn merge_defaults(&mut self, extra: &HashMap<String, Value>) {
        for (k, v) in extra {
            self.values.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Look up the definition for a variable name.
    pub fn definition(&self, name: &str) -> Option<&VariableDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }
}

/// An authored prompt template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Stable identifier assigned by the authoring layer.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Template body with `{{name}}` tokens.
    pub content: String,

    /// Free-form tags. Tags of the shape `"<prefix>-<digits>"` place the
    /// template into a pipeline group.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Declared variables.
    #[serde(default)]
    pub variables: Vec<VariableDefinition>,
}

impl PromptTemplate {
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: content.into(),
            tags: Vec::new(),
            variables: Vec::new(),
        }
    }

    /// Add a tag (builder style).
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add a variable definition (builder style).
    pub fn with_variable(mut self, def: VariableDefinition) -> Self {
        self.variables.push(def);
        self
    }

    /// Build a context seeded with this template's definitions.
    pub fn context(&self) -> VariableContext {
        VariableContext::new(self.variables.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_variable_type_serde_lowercase() {
        let def = VariableDefinition::new("count", VariableType::Number, true);
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["type"], "number");
        assert_eq!(json["name"], "count");
        assert_eq!(json["required"], true);
    }

    #[test]
    fn test_variable_definition_roundtrip() {
        let def = VariableDefinition::new("genre", VariableType::String, false)
            .with_default(json!("thriller"))
            .with_options(vec!["thriller".into(), "comedy".into()]);
        let text = serde_json::to_string(&def).unwrap();
        let back: VariableDefinition = serde_json::from_str(&text).unwrap();
        assert_eq!(back.name, "genre");
        assert_eq!(back.default_value, Some(json!("thriller")));
        assert_eq!(back.options.unwrap().len(), 2);
    }

    #[test]
    fn test_json_alias_deserializes() {
        let def: VariableDefinition =
            serde_json::from_str(r#"{"name":"meta","type":"json","required":false}"#).unwrap();
        assert_eq!(def.var_type, VariableType::Json);
    }

    #[test]
    fn test_context_builder_and_lookup() {
        let defs = vec![VariableDefinition::new("name", VariableType::String, true)];
        let ctx = VariableContext::new(defs).insert("name", json!("John"));
        assert_eq!(ctx.get("name"), Some(&json!("John")));
        assert!(ctx.definition("name").is_some());
        assert!(ctx.definition("missing").is_none());
    }

    #[test]
    fn test_merge_defaults_does_not_overwrite() {
        let mut ctx = VariableContext::default().insert("a", json!(1));
        let mut extra = HashMap::new();
        extra.insert("a".to_string(), json!(99));
        extra.insert("b".to_string(), json!(2));
        ctx.merge_defaults(&extra);
        assert_eq!(ctx.get("a"), Some(&json!(1)));
        assert_eq!(ctx.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_template_builder() {
        let tpl = PromptTemplate::new("t1", "Scene", "Write {{scene}}")
            .with_tag("story-001")
            .with_variable(VariableDefinition::new("scene", VariableType::Text, true));
        assert_eq!(tpl.tags, vec!["story-001"]);
        assert_eq!(tpl.context().definitions.len(), 1);
    }
}
