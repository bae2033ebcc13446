//! Key-based user profile updates.
//!
//! A [`ProfilePatch`] is an ordered list of field changes for one user. The
//! store applies it atomically: either every change lands or none does.

pub mod in_memory;

pub use in_memory::InMemoryProfileStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::StoreError;

/// How a field is changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "value", rename_all = "snake_case")]
pub enum UpdateOperation {
    /// Overwrite the field.
    Set(Value),
    /// Add to a numeric field (missing counts as zero).
    Increment(Number),
    /// Push onto an array field (missing counts as empty).
    Append(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    #[serde(flatten)]
    pub operation: UpdateOperation,
}

/// Ordered field changes for a single user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub changes: Vec<FieldChange>,
}

impl ProfilePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, operation: UpdateOperation) {
        self.changes.push(FieldChange {
            field: field.into(),
            operation,
        });
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Apply every change in order to `profile`.
    ///
    /// On error `profile` is left untouched.
    pub fn apply_to(&self, profile: &mut Map<String, Value>) -> Result<(), StoreError> {
        let mut next = profile.clone();
        for change in &self.changes {
            let current = next.remove(&change.field);
            let value = match &change.operation {
                UpdateOperation::Set(value) => value.clone(),
                UpdateOperation::Increment(by) => increment(&change.field, current, by)?,
                UpdateOperation::Append(value) => append(&change.field, current, value.clone())?,
            };
            next.insert(change.field.clone(), value);
        }
        *profile = next;
        Ok(())
    }
}

fn increment(field: &str, current: Option<Value>, by: &Number) -> Result<Value, StoreError> {
    let base = match current {
        None | Some(Value::Null) => Number::from(0),
        Some(Value::Number(n)) => n,
        Some(other) => {
            return Err(StoreError::rejected(format!(
                "cannot increment non-numeric field {field}: {other}"
            )));
        }
    };

    if let (Some(a), Some(b)) = (base.as_i64(), by.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Value::from(sum));
        }
    }

    let sum = base.as_f64().unwrap_or(0.0) + by.as_f64().unwrap_or(0.0);
    Number::from_f64(sum)
        .map(Value::Number)
        .ok_or_else(|| StoreError::rejected(format!("increment of {field} is not finite")))
}

fn append(field: &str, current: Option<Value>, value: Value) -> Result<Value, StoreError> {
    match current {
        None | Some(Value::Null) => Ok(Value::Array(vec![value])),
        Some(Value::Array(mut items)) => {
            items.push(value);
            Ok(Value::Array(items))
        }
        Some(other) => Err(StoreError::rejected(format!(
            "cannot append to non-array field {field}: {other}"
        ))),
    }
}

/// Key-based profile update.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn apply_patch(&self, user_id: &str, patch: &ProfilePatch) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn profile(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn changes_apply_in_order() {
        let mut patch = ProfilePatch::new();
        patch.push("xp", UpdateOperation::Set(json!(10)));
        patch.push("xp", UpdateOperation::Increment(5.into()));
        patch.push("badges", UpdateOperation::Append(json!("streak")));
        patch.push("badges", UpdateOperation::Append(json!("quiz")));

        let mut target = profile(json!({ "name": "ada" }));
        patch.apply_to(&mut target).unwrap();

        assert_eq!(
            Value::Object(target),
            json!({ "name": "ada", "xp": 15, "badges": ["streak", "quiz"] })
        );
    }

    #[test]
    fn increment_mixes_integers_and_floats() {
        let mut patch = ProfilePatch::new();
        patch.push("score", UpdateOperation::Increment(Number::from_f64(0.5).unwrap()));

        let mut target = profile(json!({ "score": 2 }));
        patch.apply_to(&mut target).unwrap();

        assert_eq!(target["score"], json!(2.5));
    }

    #[test]
    fn type_mismatch_leaves_profile_untouched() {
        let mut patch = ProfilePatch::new();
        patch.push("level", UpdateOperation::Set(json!(3)));
        patch.push("name", UpdateOperation::Increment(1.into()));

        let mut target = profile(json!({ "name": "ada", "level": 1 }));
        let err = patch.apply_to(&mut target).unwrap_err();

        assert!(matches!(err, StoreError::Rejected(_)));
        assert_eq!(Value::Object(target), json!({ "name": "ada", "level": 1 }));
    }

    #[test]
    fn operation_serializes_with_tag() {
        let change = FieldChange {
            field: "xp".to_string(),
            operation: UpdateOperation::Increment(10.into()),
        };
        assert_eq!(
            serde_json::to_value(&change).unwrap(),
            json!({ "field": "xp", "operation": "increment", "value": 10 })
        );
    }
}
