// SPDX-License-Identifier: MIT

//! State schema definitions

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema describing the fields of a run's state
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
pub struct StateSchema {
    /// Field definitions
    #[serde(flatten)]
    pub fields: BTreeMap<String, StateFieldDef>,
}

impl StateSchema {
    /// Check a value written through `WorkflowState::update` against the
    /// declared type of a field.
    ///
    /// Fields that are not declared accept any value. Append fields accept
    /// single elements as well as arrays.
    pub fn accepts(&self, key: &str, value: &serde_json::Value) -> bool {
        match self.fields.get(key) {
            Some(def) if def.reducer == ReducerType::Append => true,
            Some(def) => def.field_type.matches(value),
            None => true,
        }
    }

    pub fn reducer(&self, key: &str) -> ReducerType {
        self.fields
            .get(key)
            .map(|def| def.reducer)
            .unwrap_or(ReducerType::Overwrite)
    }
}

/// Definition of a single state field
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
pub struct StateFieldDef {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub reducer: ReducerType,
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    /// No type constraint
    Any,
}

impl FieldType {
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match (self, value) {
            (FieldType::Any, _) | (_, Value::Null) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Number, Value::Number(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Array, Value::Array(_)) => true,
            (FieldType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

/// Reducer types for merging values into state
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReducerType {
    /// Replace the value (default)
    #[default]
    Overwrite,
    /// Append to array
    Append,
    /// Keep maximum value
    Max,
    /// Keep minimum value
    Min,
    /// Shallow merge objects
    Merge,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_schema_deserialize() {
        let yaml = r#"
            phase:
              type: string
            budget:
              type: number
              default: 0.0
            risks:
              type: array
              reducer: append
        "#;
        let schema: StateSchema = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(schema.fields.len(), 3);
        assert_eq!(schema.fields["phase"].field_type, FieldType::String);
        assert_eq!(schema.fields["budget"].default, Some(json!(0.0)));
        assert_eq!(schema.fields["risks"].reducer, ReducerType::Append);
        assert_eq!(schema.fields["phase"].reducer, ReducerType::Overwrite);
    }

    #[test]
    fn test_field_type_matching() {
        assert!(FieldType::String.matches(&json!("x")));
        assert!(!FieldType::String.matches(&json!(1)));
        assert!(FieldType::Number.matches(&json!(1.5)));
        assert!(FieldType::Object.matches(&json!({"a": 1})));
        assert!(FieldType::Any.matches(&json!([1, 2])));
        assert!(FieldType::Boolean.matches(&serde_json::Value::Null));
    }

    #[test]
    fn test_accepts_undeclared_field() {
        let schema: StateSchema = serde_yaml::from_str("count: { type: number }").unwrap();
        assert!(schema.accepts("count", &json!(3)));
        assert!(!schema.accepts("count", &json!("three")));
        assert!(schema.accepts("other", &json!("anything")));
    }

    #[test]
    fn test_append_field_accepts_elements() {
        let schema: StateSchema =
            serde_yaml::from_str("risks: { type: array, reducer: append }").unwrap();
        assert!(schema.accepts("risks", &json!("vendor delay")));
        assert!(schema.accepts("risks", &json!(["scope creep"])));
        assert_eq!(schema.reducer("risks"), ReducerType::Append);
        assert_eq!(schema.reducer("other"), ReducerType::Overwrite);
    }
}
