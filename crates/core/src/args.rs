// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tagged representation of the wire `args` field.
//!
//! Clients send anything JSON here; the boundary validates it into this sum
//! type so the rest of the system never touches untyped values. Numbers and
//! booleans are rejected — the accepted shapes are absent/null, a string, a
//! sequence, or a string-keyed mapping.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Validated execution arguments.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ExecArgs {
    #[default]
    None,
    Text(String),
    List(Vec<Value>),
    Map(serde_json::Map<String, Value>),
}

impl ExecArgs {
    pub fn is_none(&self) -> bool {
        matches!(self, ExecArgs::None)
    }

    /// Validate a raw JSON value into the tagged form.
    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(ExecArgs::None),
            Value::String(s) => Ok(ExecArgs::Text(s)),
            Value::Array(items) => Ok(ExecArgs::List(items)),
            Value::Object(map) => Ok(ExecArgs::Map(map)),
            other => Err(format!(
                "args must be a string, array, or object (got {})",
                json_type_name(&other)
            )),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Serialize for ExecArgs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExecArgs::None => serializer.serialize_none(),
            ExecArgs::Text(s) => serializer.serialize_str(s),
            ExecArgs::List(items) => items.serialize(serializer),
            ExecArgs::Map(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ExecArgs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ExecArgs::from_value(value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[path = "args_tests.rs"]
mod tests;
