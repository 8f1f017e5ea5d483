use super::error::FilterError;
use super::filter::validate_identifier;
use super::types::{FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    /// Parse `"created_at desc, apellidos"` into order entries
    pub fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() { continue; }
            let mut it = trimmed.split_whitespace();
            if let Some(col) = it.next() {
                validate_identifier(col).map_err(FilterError::InvalidColumn)?;
                let dir = it.next().unwrap_or("asc");
                let sort = if dir.eq_ignore_ascii_case("desc") { SortDirection::Desc } else { SortDirection::Asc };
                out.push(FilterOrderInfo { column: col.to_string(), sort });
            }
        }
        Ok(out)
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> String {
        if infos.is_empty() { return String::new(); }
        let parts: Vec<String> = infos
            .iter()
            .map(|i| format!("\"{}\" {}", i.column, i.sort.to_sql()))
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_directions() {
        let order = FilterOrder::parse_order_string("created_at desc, apellidos").unwrap();
        assert_eq!(order.len(), 2);
        assert_eq!(order[0].sort, SortDirection::Desc);
        assert_eq!(order[1].sort, SortDirection::Asc);
        assert_eq!(FilterOrder::generate(&order), "ORDER BY \"created_at\" DESC, \"apellidos\" ASC");
    }

    #[test]
    fn rejects_bad_column() {
        assert!(FilterOrder::parse_order_string("name; drop table x").is_err());
    }
}
