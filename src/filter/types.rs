use serde_json::{Map, Value};

/// Listing criteria: equality conditions, ordering and a page window
#[derive(Debug, Clone, Default)]
pub struct FilterData {
    /// column -> value; `null` matches SQL NULL
    pub where_eq: Map<String, Value>,
    pub order: Vec<FilterOrderInfo>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl FilterData {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut where_eq = Map::new();
        where_eq.insert(column.into(), value.into());
        Self { where_eq, ..Default::default() }
    }

    pub fn and_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_eq.insert(column.into(), value.into());
        self
    }

    /// Whether an in-memory row satisfies every equality condition
    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        self.where_eq.iter().all(|(column, expected)| {
            let actual = row.get(column).unwrap_or(&Value::Null);
            match (expected, actual) {
                (Value::Null, Value::Null) => true,
                (Value::Null, _) | (_, Value::Null) => false,
                _ => as_text(expected) == as_text(actual),
            }
        })
    }
}

/// Text form used for comparisons, mirroring the `::text` cast on the SQL side
pub fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOrderInfo {
    pub column: String,
    pub sort: SortDirection,
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    /// Positional parameters, already rendered as text
    pub params: Vec<Option<String>>,
}
