// SPDX-License-Identifier: MIT

//! Runtime state storage for a workflow run

use serde_json::{Map, Value};

use super::schema::{ReducerType, StateSchema};

/// The structured state shared by every step of one run.
///
/// A run owns exactly one `WorkflowState`; the engine lends it mutably to each
/// unit of work in turn, so steps write into it directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowState {
    fields: Map<String, Value>,
    schema: StateSchema,
}

impl WorkflowState {
    /// Create a state seeded with the schema's defaults
    pub fn new(schema: &StateSchema) -> Self {
        let mut fields = Map::new();
        for (name, def) in &schema.fields {
            if let Some(default) = &def.default {
                fields.insert(name.clone(), default.clone());
            }
        }

        Self {
            fields,
            schema: schema.clone(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Rebuild a state from its JSON form (e.g. a persisted snapshot).
    ///
    /// Schema defaults fill in fields missing from `value`; non-object values
    /// are stored under the `value` key.
    pub fn from_json(schema: &StateSchema, value: Value) -> Self {
        let mut state = Self::new(schema);
        match value {
            Value::Object(obj) => {
                for (k, v) in obj {
                    state.fields.insert(k, v);
                }
            }
            Value::Null => {}
            other => {
                state.fields.insert("value".to_string(), other);
            }
        }
        state
    }

    /// Update a field using the field's reducer.
    ///
    /// A value that does not match the field's declared type is logged and
    /// discarded.
    pub fn update(&mut self, key: &str, value: Value) {
        if !self.schema.accepts(key, &value) {
            log::warn!(
                "Rejected update of state field '{}': {} does not match its declared type",
                key,
                value
            );
            return;
        }
        let reducer = self.schema.reducer(key);

        match reducer {
            ReducerType::Overwrite => {
                self.fields.insert(key.to_string(), value);
            }
            ReducerType::Append => {
                let arr = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Array(vec![]));
                if let Value::Array(a) = arr {
                    match value {
                        Value::Array(new_items) => a.extend(new_items),
                        other => a.push(other),
                    }
                }
            }
            ReducerType::Max => self.keep_if(key, value, |new, cur| new > cur),
            ReducerType::Min => self.keep_if(key, value, |new, cur| new < cur),
            ReducerType::Merge => {
                let current = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Object(Map::new()));
                if let (Value::Object(current_obj), Value::Object(new_obj)) = (current, value) {
                    for (k, v) in new_obj {
                        current_obj.insert(k, v);
                    }
                }
            }
        }
    }

    fn keep_if(&mut self, key: &str, value: Value, better: impl Fn(f64, f64) -> bool) {
        let Some(new) = value.as_f64() else {
            return;
        };
        match self.fields.get(key).and_then(Value::as_f64) {
            Some(current) if !better(new, current) => {}
            _ => {
                self.fields.insert(key.to_string(), value);
            }
        }
    }

    /// Set a field, bypassing its reducer
    pub fn set(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a nested field value using dot notation (e.g., "charter.owner")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Convert state to a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
