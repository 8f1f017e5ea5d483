use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter::validate_identifier;
use super::types::as_text;

pub struct FilterWhere {
    param_values: Vec<Option<String>>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    /// Build `"col"::text = $n AND ...` for the given equality map.
    ///
    /// Placeholders are numbered after `starting_param_index`, so callers that
    /// already bound parameters can append a WHERE clause.
    pub fn generate(
        where_eq: &Map<String, Value>,
        starting_param_index: usize,
    ) -> Result<(String, Vec<Option<String>>), FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        filter_where.build(where_eq)
    }

    fn build(&mut self, where_eq: &Map<String, Value>) -> Result<(String, Vec<Option<String>>), FilterError> {
        let mut sql_conditions = vec![];
        for (column, value) in where_eq {
            validate_identifier(column).map_err(FilterError::InvalidColumn)?;
            if value.is_null() {
                sql_conditions.push(format!("\"{}\" IS NULL", column));
            } else {
                self.param_index += 1;
                self.param_values.push(Some(as_text(value)));
                sql_conditions.push(format!("\"{}\"::text = ${}", column, self.param_index));
            }
        }
        let where_clause = if sql_conditions.is_empty() { "1=1".to_string() } else { sql_conditions.join(" AND ") };
        Ok((where_clause, self.param_values.clone()))
    }
}
