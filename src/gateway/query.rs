use serde_json::Value;
use std::collections::HashMap;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::filter::{filter_order::FilterOrder, FilterData};
use crate::resources::{fields::FieldKind, FieldErrors, ResourceKind};

const SORTABLE_TIMESTAMPS: &[&str] = &["created_at", "updated_at"];

/// Build listing criteria from query parameters.
///
/// `limit`, `offset` and `order` shape the page; every other parameter naming
/// a filterable column becomes an equality condition. Parameters naming
/// anything else are ignored.
pub fn list_filter(kind: ResourceKind, params: &HashMap<String, String>, api: &ApiConfig) -> Result<FilterData, ApiError> {
    let def = kind.def();
    let mut filter = FilterData::default();
    let mut errors = FieldErrors::new();

    for (key, raw) in params {
        match key.as_str() {
            "limit" => match raw.parse::<i64>() {
                Ok(n) if n > 0 => filter.limit = Some(n.min(api.max_list_limit)),
                _ => {
                    errors.insert(key.clone(), "must be a positive integer".to_string());
                }
            },
            "offset" => match raw.parse::<i64>() {
                Ok(n) if n >= 0 => filter.offset = Some(n),
                _ => {
                    errors.insert(key.clone(), "must be a non-negative integer".to_string());
                }
            },
            "order" => match FilterOrder::parse_order_string(raw) {
                Ok(order) => {
                    if let Some(bad) = order
                        .iter()
                        .find(|o| !def.is_filterable(&o.column) && !SORTABLE_TIMESTAMPS.contains(&o.column.as_str()))
                    {
                        errors.insert(key.clone(), format!("cannot order by '{}'", bad.column));
                    } else {
                        filter.order = order;
                    }
                }
                Err(e) => {
                    errors.insert(key.clone(), e.to_string());
                }
            },
            column if def.is_filterable(column) => match filter_value(kind, column, raw) {
                Ok(value) => {
                    filter.where_eq.insert(column.to_string(), value);
                }
                Err(msg) => {
                    errors.insert(key.clone(), msg);
                }
            },
            other => {
                tracing::debug!(resource = %kind, param = %other, "ignoring unknown query parameter");
            }
        }
    }

    if !errors.is_empty() {
        return Err(ApiError::validation_fields("Invalid query parameters", errors));
    }

    filter.limit = filter.limit.or(Some(api.default_list_limit.min(api.max_list_limit)));
    if filter.order.is_empty() {
        filter.order = FilterOrder::parse_order_string("created_at desc").unwrap_or_default();
    }
    Ok(filter)
}

// Ids are compared in canonical lowercase form; everything else as sent
fn filter_value(kind: ResourceKind, column: &str, raw: &str) -> Result<Value, String> {
    let is_uuid = column == "id"
        || kind.def().owner_field == Some(column)
        || kind.def().creator_field == Some(column)
        || matches!(kind.def().field(column).map(|f| f.kind), Some(FieldKind::Uuid));
    if is_uuid {
        return uuid::Uuid::parse_str(raw.trim())
            .map(|u| Value::String(u.to_string()))
            .map_err(|_| format!("invalid id '{}'", raw));
    }
    Ok(Value::String(raw.to_string()))
}
