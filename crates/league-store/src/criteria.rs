use rusqlite::types::Value;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone)]
enum Clause {
    Eq(&'static str, Value),
    IsNull(&'static str),
    NotNull(&'static str),
}

/// Column filters for `select` calls. Clauses are joined with AND, or with
/// OR when the caller asks to match any of them.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    clauses: Vec<Clause>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Eq(column, value.into()));
        self
    }

    pub fn eq_str(self, column: &'static str, value: &str) -> Self {
        self.eq(column, value.to_string())
    }

    pub fn is_null(mut self, column: &'static str) -> Self {
        self.clauses.push(Clause::IsNull(column));
        self
    }

    pub fn is_not_null(mut self, column: &'static str) -> Self {
        self.clauses.push(Clause::NotNull(column));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Render a WHERE fragment (leading space included, empty when there are
    /// no clauses) and its positional parameters. Columns outside `allowed`
    /// are rejected.
    pub(crate) fn to_sql(&self, allowed: &[&str], match_any: bool) -> Result<(String, Vec<Value>)> {
        if self.clauses.is_empty() {
            return Ok((String::new(), Vec::new()));
        }

        let mut parts = Vec::with_capacity(self.clauses.len());
        let mut values = Vec::new();
        for clause in &self.clauses {
            let column = match clause {
                Clause::Eq(c, _) | Clause::IsNull(c) | Clause::NotNull(c) => *c,
            };
            if !allowed.contains(&column) {
                return Err(StoreError::Validation(format!(
                    "column '{column}' cannot be used as a criterion"
                )));
            }
            match clause {
                Clause::Eq(c, v) => {
                    values.push(v.clone());
                    parts.push(format!("{c} = ?{}", values.len()));
                }
                Clause::IsNull(c) => parts.push(format!("{c} IS NULL")),
                Clause::NotNull(c) => parts.push(format!("{c} IS NOT NULL")),
            }
        }

        let joiner = if match_any { " OR " } else { " AND " };
        Ok((format!(" WHERE {}", parts.join(joiner)), values))
    }
}
