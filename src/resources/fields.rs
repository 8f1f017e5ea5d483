use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use uuid::Uuid;

/// Storage kind of a writable column; drives server-side validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// `YYYY-MM-DD`
    Date,
    /// RFC 3339, or a bare date
    Timestamp,
    Uuid,
    Bool,
    Int,
    /// Free JSON object or array
    Json,
    /// Text restricted to a closed set of values
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

pub const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

impl FieldSpec {
    /// Check one incoming value against the column kind.
    ///
    /// Returns a normalized value (text trimmed) or a message suitable for a
    /// per-field error. `null` is accepted here; required-ness is checked by
    /// the caller.
    pub fn check(&self, value: &Value) -> Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match self.kind {
            FieldKind::Text => match value {
                Value::String(s) => Ok(Value::String(s.trim().to_string())),
                _ => Err("must be text".to_string()),
            },
            FieldKind::Date => {
                let s = value.as_str().ok_or("must be a date (YYYY-MM-DD)")?;
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .map(|_| Value::String(s.trim().to_string()))
                    .map_err(|_| format!("invalid date '{}', expected YYYY-MM-DD", s))
            }
            FieldKind::Timestamp => {
                let s = value.as_str().ok_or("must be a timestamp")?.trim();
                if DateTime::parse_from_rfc3339(s).is_ok() || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() {
                    Ok(Value::String(s.to_string()))
                } else {
                    Err(format!("invalid timestamp '{}'", s))
                }
            }
            FieldKind::Uuid => {
                let s = value.as_str().ok_or("must be an id")?;
                Uuid::parse_str(s.trim())
                    .map(|u| Value::String(u.to_string()))
                    .map_err(|_| format!("invalid id '{}'", s))
            }
            FieldKind::Bool => match value {
                Value::Bool(_) => Ok(value.clone()),
                _ => Err("must be true or false".to_string()),
            },
            FieldKind::Int => match value.as_i64() {
                Some(n) => Ok(Value::from(n)),
                None => Err("must be an integer".to_string()),
            },
            FieldKind::Json => match value {
                Value::Object(_) | Value::Array(_) => Ok(value.clone()),
                _ => Err("must be a JSON object".to_string()),
            },
            FieldKind::Enum(allowed) => {
                let s = value.as_str().ok_or("must be text")?.trim();
                if allowed.contains(&s) {
                    Ok(Value::String(s.to_string()))
                } else {
                    Err(format!("'{}' is not one of: {}", s, allowed.join(", ")))
                }
            }
        }
    }
}

/// Presence check used for required fields: null, missing, or blank text count as absent
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}
