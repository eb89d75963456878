use super::ErrorKind;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// # Error Context
///
/// Structured diagnostics attached to every [`super::ClientError`]: the kind,
/// the rendered message and an ordered set of key/value fields (`endpoint`,
/// `status_code`, `timeout_secs`, `failure_count`, ...).
///
/// Serializable so it can be attached to a log record as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorContext {
    /// The error kind.
    pub kind: ErrorKind,
    /// Human readable message, identical to the error's `Display` output.
    pub message: String,
    /// Diagnostic fields, keyed by name.
    pub fields: BTreeMap<&'static str, Value>,
}

impl ErrorContext {
    pub(crate) fn new(kind: ErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            fields: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, key: &'static str, value: impl Into<Value>) {
        self.fields.insert(key, value.into());
    }

    /// Looks up a single diagnostic field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if !self.fields.is_empty() {
            let rendered: Vec<String> = self
                .fields
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => format!("{k}={s}"),
                    other => format!("{k}={other}"),
                })
                .collect();
            write!(f, " [{}]", rendered.join(", "))?;
        }
        Ok(())
    }
}
