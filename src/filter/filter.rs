use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{as_text, FilterData, SortDirection, SqlResult};

pub struct Filter {
    table_name: String,
    data: FilterData,
}

impl Filter {
    pub fn new(table_name: impl Into<String>) -> Result<Self, FilterError> {
        let table_name = table_name.into();
        validate_identifier(&table_name).map_err(FilterError::InvalidTableName)?;
        Ok(Self {
            table_name,
            data: FilterData::default(),
        })
    }

    pub fn assign(&mut self, data: FilterData) -> Result<&mut Self, FilterError> {
        for column in data.where_eq.keys() {
            validate_identifier(column).map_err(FilterError::InvalidColumn)?;
        }
        for info in &data.order {
            validate_identifier(&info.column).map_err(FilterError::InvalidColumn)?;
        }
        if let Some(limit) = data.limit {
            if limit < 0 { return Err(FilterError::InvalidLimit("Limit must be non-negative".to_string())); }
        }
        if let Some(offset) = data.offset {
            if offset < 0 { return Err(FilterError::InvalidOffset("Offset must be non-negative".to_string())); }
        }
        self.data = data;
        Ok(self)
    }

    /// Full listing query; each result row carries one JSON column named `row`
    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = FilterWhere::generate(&self.data.where_eq, 0)?;
        let order_clause = FilterOrder::generate(&self.data.order);
        let limit_clause = self.build_limit_clause();

        let inner = [
            format!("SELECT * FROM \"{}\"", self.table_name),
            format!("WHERE {}", where_clause),
            order_clause,
            limit_clause,
        ].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");

        Ok(SqlResult {
            query: format!("SELECT row_to_json(t) AS row FROM ({}) t", inner),
            params,
        })
    }

    /// WHERE clause alone, placeholders numbered after `starting_param_index`
    pub fn to_where_sql(&self, starting_param_index: usize) -> Result<SqlResult, FilterError> {
        let (query, params) = FilterWhere::generate(&self.data.where_eq, starting_param_index)?;
        Ok(SqlResult { query, params })
    }

    /// Same semantics as [`Filter::to_sql`], evaluated over rows held in memory
    pub fn apply(&self, rows: impl IntoIterator<Item = Map<String, Value>>) -> Vec<Map<String, Value>> {
        let mut out: Vec<_> = rows.into_iter().filter(|r| self.data.matches(r)).collect();

        if !self.data.order.is_empty() {
            out.sort_by(|a, b| {
                for info in &self.data.order {
                    let ord = compare_values(a.get(&info.column), b.get(&info.column));
                    let ord = match info.sort {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = self.data.offset.unwrap_or(0).max(0) as usize;
        let limit = self.data.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        out.into_iter().skip(offset).take(limit).collect()
    }

    fn build_limit_clause(&self) -> String {
        match (self.data.limit, self.data.offset) {
            (Some(l), Some(o)) => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!("LIMIT {}", l),
            (None, Some(o)) => format!("OFFSET {}", o),
            _ => String::new(),
        }
    }
}

/// Identifiers are interpolated into SQL, so only `[A-Za-z_][A-Za-z0-9_]*` passes
pub fn validate_identifier(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err("identifier cannot be empty".to_string());
    };
    if !(first.is_ascii_alphabetic() || first == '_') || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("invalid identifier: {}", name));
    }
    Ok(())
}

// Nulls sort last, numbers numerically, everything else by text
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => as_text(x).cmp(&as_text(y)),
    }
}
