use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::resources::{FieldErrors, ResourceKind, SanitizeMode};

/// Errors that can occur while turning API input into a record
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Invalid JSON format: {0}")]
    InvalidJson(String),
    #[error("Invalid fields: {0:?}")]
    Invalid(FieldErrors),
}

/// A pending write with change tracking against the stored row
#[derive(Debug, Clone)]
pub struct Record {
    kind: ResourceKind,
    /// Stored state, when it was loaded before the write
    original: Option<Map<String, Value>>,
    /// Values that will be written
    fields: Map<String, Value>,
}

impl Record {
    /// Create record from API input, keeping only recognised writable fields
    pub fn from_api_input(kind: ResourceKind, json: &Value, mode: SanitizeMode) -> Result<Self, RecordError> {
        if !json.is_object() {
            return Err(RecordError::InvalidJson("Expected JSON object".to_string()));
        }
        let fields = kind.def().sanitize(json, mode).map_err(RecordError::Invalid)?;
        Ok(Self {
            kind,
            original: None,
            fields,
        })
    }

    /// Inject the stored row (for change tracking)
    pub fn inject(&mut self, original: Map<String, Value>) -> &mut Self {
        self.original = Some(original);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a server-managed field (id, timestamps, creator)
    pub fn set_system_field(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Stamp id and timestamps for a new row, then fill resource defaults
    pub fn prepare_create(&mut self, id: Uuid, now: DateTime<Utc>) -> &mut Self {
        self.kind.def().apply_defaults(&mut self.fields);
        if !self.fields.contains_key("id") {
            self.set_system_field("id", id.to_string());
        }
        let ts = now.to_rfc3339();
        self.set_system_field("created_at", ts.clone());
        self.set_system_field("updated_at", ts)
    }

    /// Refresh `updated_at`; every update does this even when no value changed
    pub fn touch_updated_at(&mut self, now: DateTime<Utc>) -> &mut Self {
        self.set_system_field("updated_at", now.to_rfc3339())
    }

    /// Check if a specific field differs from the stored row
    pub fn changed(&self, key: &str) -> bool {
        match (&self.original, self.fields.get(key)) {
            (Some(original), Some(current)) => original.get(key) != Some(current),
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => false,
        }
    }

    /// Names of fields whose value differs from the stored row, excluding timestamps
    pub fn changed_fields(&self) -> Vec<String> {
        self.fields
            .keys()
            .filter(|k| k.as_str() != "updated_at" && k.as_str() != "created_at")
            .filter(|k| self.changed(k))
            .cloned()
            .collect()
    }

    pub fn original(&self) -> Option<&Map<String, Value>> {
        self.original.as_ref()
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}
