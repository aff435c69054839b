use std::collections::HashMap;
use std::sync::Arc;

use crate::types::RowValues;

/// Column names and their lookup index, shared by every row of one result.
#[derive(Debug, Default)]
struct Columns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, index }
    }
}

/// A single-row cursor.
///
/// Values are addressed by column name or by position.
#[derive(Debug, Clone)]
pub struct DbRow {
    columns: Arc<Columns>,
    /// The values for this row, in column order
    pub values: Vec<RowValues>,
}

impl DbRow {
    /// Build a standalone row from column names and values.
    #[must_use]
    pub fn new(column_names: Vec<String>, values: Vec<RowValues>) -> Self {
        Self {
            columns: Arc::new(Columns::new(column_names)),
            values,
        }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.columns.names
    }

    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        self.columns.index.get(column_name).copied()
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }
}

/// A multi-row cursor plus the server's affected-row count.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<DbRow>,
    /// Rows reported by the command tag (for `INSERT ... RETURNING` this is the insert count)
    pub rows_affected: u64,
    columns: Arc<Columns>,
}

impl ResultSet {
    /// Create an empty result set for the given columns with preallocated row capacity.
    #[must_use]
    pub fn with_columns(column_names: Vec<String>, capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            rows_affected: 0,
            columns: Arc::new(Columns::new(column_names)),
        }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.columns.names
    }

    /// Append a row. The affected count follows the row count until a command tag overrides it.
    pub fn add_row_values(&mut self, values: Vec<RowValues>) {
        self.results.push(DbRow {
            columns: Arc::clone(&self.columns),
            values,
        });
        self.rows_affected += 1;
    }

    #[must_use]
    pub fn first(&self) -> Option<&DbRow> {
        self.results.first()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[must_use]
    pub fn into_first(self) -> Option<DbRow> {
        self.results.into_iter().next()
    }
}

/// Affected-rows summary returned by `execute`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecSummary {
    pub rows_affected: u64,
}

impl ExecSummary {
    #[must_use]
    pub fn new(rows_affected: u64) -> Self {
        Self { rows_affected }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_share_column_lookup() {
        let mut rs = ResultSet::with_columns(vec!["id".into(), "symbol".into()], 2);
        rs.add_row_values(vec![RowValues::Int(1), RowValues::from("PTT")]);
        rs.add_row_values(vec![RowValues::Int(2), RowValues::from("AOT")]);

        assert_eq!(rs.rows_affected, 2);
        assert_eq!(rs.results[1].get("symbol"), Some(&RowValues::from("AOT")));
        assert_eq!(rs.results[0].get_column_index("id"), Some(0));
        assert_eq!(rs.results[0].get("missing"), None);
    }

    #[test]
    fn first_row_of_empty_set_is_none() {
        let rs = ResultSet::with_columns(vec!["id".into()], 0);
        assert!(rs.first().is_none());
        assert!(rs.into_first().is_none());
    }
}
