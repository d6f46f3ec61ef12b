//! Argument Keys
//!
//! Canonical, value-based encoding of argument lists. Two argument lists that are
//! structurally equal always produce the same key, regardless of where the values
//! live in memory. Object fields are ordered by name, so map insertion order never
//! leaks into the key.

use std::any::TypeId;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KeyError;

/// Canonicalized argument tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgsKey(String);

impl ArgsKey {
    /// Encode a contract argument.
    ///
    /// The argument is always one positional entry, whatever shape it
    /// serializes to, so `json!(1)` and `json!([1])` stay distinct. Only `()`
    /// encodes as the empty list. Non-finite floats serialize as `null`.
    pub fn from_args<A: Serialize + ?Sized + 'static>(args: &A) -> Result<Self, KeyError> {
        if TypeId::of::<A>() == TypeId::of::<()>() {
            return Ok(Self::empty());
        }
        let value = serde_json::to_value(args)?;
        Ok(Self::from_values(std::slice::from_ref(&value)))
    }

    /// Encode a positional list of already-dynamic values.
    pub fn from_values(args: &[Value]) -> Self {
        let mut encoded = String::from("[");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                encoded.push(',');
            }
            write_canonical(arg, &mut encoded);
        }
        encoded.push(']');
        ArgsKey(encoded)
    }

    /// The empty argument list.
    pub fn empty() -> Self {
        Self::from_values(&[])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Compact JSON with object fields sorted by name at every depth.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(fields) => {
            let mut sorted: Vec<(&String, &Value)> = fields.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (name, field)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

impl fmt::Display for ArgsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
