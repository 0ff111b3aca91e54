use serde_json::Value;
use thiserror::Error;

/// Failure of a single tool invocation.
///
/// These never abort the agent loop; the dispatcher renders them as text for
/// the model to react to.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("missing required argument '{0}'")]
    MissingField(String),

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("browser: {0}")]
    Browser(String),

    #[error("fetch failed: {0}")]
    Http(String),

    #[error("spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("timed out after {0} seconds")]
    Timeout(u64),
}

impl ToolError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ToolError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ToolError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(error: reqwest::Error) -> Self {
        ToolError::Http(error.to_string())
    }
}

/// A required string argument.
pub fn required_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    match args.get(field) {
        None | Some(Value::Null) => Err(ToolError::MissingField(field.to_string())),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(ToolError::invalid(
            field,
            format!("expected a string, got {}", other),
        )),
    }
}

/// An optional string argument; non-strings are treated as absent.
pub fn optional_str<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
    args.get(field).and_then(|v| v.as_str())
}

/// A required number, also accepting numeric strings.
pub fn required_f64(args: &Value, field: &str) -> Result<f64, ToolError> {
    let value: f64 = match args.get(field) {
        None | Some(Value::Null) => return Err(ToolError::MissingField(field.to_string())),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ToolError::invalid(field, "not a finite number"))?,
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| ToolError::invalid(field, format!("'{}' is not a number", s)))?,
        Some(other) => {
            return Err(ToolError::invalid(
                field,
                format!("expected a number, got {}", other),
            ))
        }
    };

    if value.is_finite() {
        Ok(value)
    } else {
        Err(ToolError::invalid(field, "not a finite number"))
    }
}

/// A required array argument.
pub fn required_array<'a>(args: &'a Value, field: &str) -> Result<&'a Vec<Value>, ToolError> {
    match args.get(field) {
        None | Some(Value::Null) => Err(ToolError::MissingField(field.to_string())),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(ToolError::invalid(
            field,
            format!("expected an array, got {}", other),
        )),
    }
}
