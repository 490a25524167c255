use serde::Serialize;
use serde_json::{Map, Value};

/// Rejected request input. Carried back to the caller in the response
/// envelope; never used for scoring or validation outcomes.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct InputError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl InputError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

pub fn as_object<'a>(raw: &'a Value, what: &str) -> Result<&'a Map<String, Value>, InputError> {
    raw.as_object()
        .ok_or_else(|| InputError::bad_params(format!("{what} must be an object")))
}

/// Number or null. Strings are not coerced.
pub fn optional_number(
    obj: &Map<String, Value>,
    key: &str,
    what: &str,
) -> Result<Option<f64>, InputError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| {
            InputError::bad_params(format!("{what}.{key} must be a number or null"))
        }),
    }
}

/// String or integer identifier, trimmed. Empty strings count as absent.
pub fn optional_id(
    obj: &Map<String, Value>,
    key: &str,
    what: &str,
) -> Result<Option<String>, InputError> {
    match obj.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                Ok(None)
            } else {
                Ok(Some(t.to_string()))
            }
        }
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Some(n.to_string())),
        Some(_) => Err(InputError::bad_params(format!(
            "{what}.{key} must be a string or integer id"
        ))),
    }
}

pub fn optional_str<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    what: &str,
) -> Result<Option<&'a str>, InputError> {
    match obj.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(InputError::bad_params(format!(
            "{what}.{key} must be a string or null"
        ))),
    }
}

pub fn optional_bool(
    obj: &Map<String, Value>,
    key: &str,
    what: &str,
) -> Result<Option<bool>, InputError> {
    match obj.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(InputError::bad_params(format!(
            "{what}.{key} must be a boolean"
        ))),
    }
}
