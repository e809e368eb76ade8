//! Filter for direct store text searches
//!
//! Builds the SQL predicate handed to LanceDB's `only_if`. Values are
//! embedded as string literals, so single quotes are doubled.

/// Columns matched by a text search
pub const SEARCH_COLUMNS: [&str; 3] = ["searchable_content", "summary", "processed_data"];

/// Filter criteria for a direct store search.
///
/// Unset fields apply no condition; set fields are combined with AND.
#[derive(Debug, Clone, Default)]
pub struct TextFilter {
    /// Owner of the rows
    pub user_id: Option<String>,
    /// Case-insensitive substring matched against any text column
    pub contains: Option<String>,
}

impl TextFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Match rows containing `text`; blank text matches everything
    pub fn containing(mut self, text: impl AsRef<str>) -> Self {
        let text = text.as_ref().trim();
        self.contains = (!text.is_empty()).then(|| text.to_lowercase());
        self
    }

    /// Build a SQL WHERE clause, or `None` when no condition is set
    pub fn to_sql_clause(&self) -> Option<String> {
        let mut conditions = Vec::new();

        if let Some(ref user_id) = self.user_id {
            conditions.push(format!("user_id = '{}'", escape_literal(user_id)));
        }

        if let Some(ref text) = self.contains {
            let pattern = format!("%{}%", escape_literal(text));
            let any_column = SEARCH_COLUMNS
                .iter()
                .map(|column| format!("lower({column}) LIKE '{pattern}'"))
                .collect::<Vec<_>>()
                .join(" OR ");
            conditions.push(format!("({any_column})"));
        }

        if conditions.is_empty() {
            None
        } else {
            Some(conditions.join(" AND "))
        }
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter() {
        assert!(TextFilter::new().to_sql_clause().is_none());
    }

    #[test]
    fn test_user_filter() {
        let filter = TextFilter::new().for_user("default_user");
        assert_eq!(filter.to_sql_clause().unwrap(), "user_id = 'default_user'");
    }

    #[test]
    fn test_text_filter_matches_every_column_lowercased() {
        let filter = TextFilter::new().containing("Coffee");
        assert_eq!(
            filter.to_sql_clause().unwrap(),
            "(lower(searchable_content) LIKE '%coffee%' OR lower(summary) LIKE '%coffee%' \
             OR lower(processed_data) LIKE '%coffee%')"
        );
    }

    #[test]
    fn test_combined_filter() {
        let filter = TextFilter::new().for_user("alice").containing("tea");
        let sql = filter.to_sql_clause().unwrap();
        assert!(sql.starts_with("user_id = 'alice' AND ("));
        assert!(sql.contains("lower(summary) LIKE '%tea%'"));
    }

    #[test]
    fn test_quotes_are_escaped() {
        let filter = TextFilter::new().for_user("o'brien").containing("it's");
        let sql = filter.to_sql_clause().unwrap();
        assert!(sql.contains("user_id = 'o''brien'"));
        assert!(sql.contains("LIKE '%it''s%'"));
    }

    #[test]
    fn test_blank_text_applies_no_condition() {
        let filter = TextFilter::new().containing("   ");
        assert!(filter.contains.is_none());
        assert!(filter.to_sql_clause().is_none());
    }
}
