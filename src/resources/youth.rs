use chrono::{Datelike, NaiveDate};
use serde_json::{Map, Value};

use super::ResourceKind;

/// Age in completed years on `today`.
///
/// Returns `None` for a birth date in the future.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> Option<u32> {
    if birth > today {
        return None;
    }
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

/// Shape a stored row for output.
///
/// Age is never taken from storage: any persisted `edad` is replaced by the
/// value derived from `fecha_nacimiento` as of `today`.
pub fn present(kind: ResourceKind, mut row: Map<String, Value>, today: NaiveDate) -> Map<String, Value> {
    if kind != ResourceKind::Joven {
        return row;
    }

    let edad = row
        .get("fecha_nacimiento")
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok())
        .and_then(|birth| age_on(birth, today));

    row.insert("edad".to_string(), edad.map(Value::from).unwrap_or(Value::Null));
    row
}
