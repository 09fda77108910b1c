//! Tabular query interface for the platform instrumentation service.
//!
//! The service that answers class queries is an external collaborator; this
//! module fixes its boundary: a [`QueryEngine`] yields a loosely-typed
//! [`Table`] whose cells must be read defensively. Engine failures are
//! never fatal to a scan, a failed query is "no rows this cycle".

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Errors surfaced by the query engine.
///
/// All of them are treated as an empty result for the affected table; the
/// core never retries, the next poll cycle is the retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("query timed out after {0} ms")]
    Timeout(u64),

    #[error("unknown instrumentation class '{0}'")]
    InvalidClass(String),

    #[error("unknown instrumentation namespace '{0}'")]
    InvalidNamespace(String),

    #[error("malformed query: {0}")]
    InvalidQuery(String),
}

/// A single table cell.
///
/// The instrumentation service is loosely typed: numeric properties may
/// arrive as integers or as decimal strings, and absent properties as
/// [`Value::Empty`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Integer(i64),
    Empty,
}

/// A tabular query result addressed by row index and column name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given column set.
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row, padding or truncating to the column count.
    pub fn push_row(&mut self, mut values: Vec<Value>) {
        values.resize(self.columns.len(), Value::Empty);
        self.rows.push(values);
    }

    /// Number of result rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Raw cell access; `None` when the row or column does not exist.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(col)
    }

    /// String getter; non-string cells read as `None`.
    pub fn string(&self, row: usize, column: &str) -> Option<&str> {
        match self.value(row, column)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer getter; non-integer cells read as `None`.
    pub fn integer(&self, row: usize, column: &str) -> Option<i64> {
        match self.value(row, column)? {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Small unsigned integer getter; negative or oversized values read as
    /// `None`.
    pub fn u32(&self, row: usize, column: &str) -> Option<u32> {
        self.integer(row, column)
            .and_then(|v| u32::try_from(v).ok())
    }
}

/// The instrumentation query collaborator.
///
/// Implementations issue a structured query for the named class, restricted
/// to the given columns, and block until rows or an error are available.
/// Timeout policy belongs to the implementation, not to this core.
pub trait QueryEngine {
    fn query(&self, class: &str, columns: &[&str]) -> Result<Table, QueryError>;
}

/// Query a class, degrading any engine error to an empty table.
pub fn query_or_empty<Q: QueryEngine>(engine: &Q, class: &str, columns: &[&str]) -> Table {
    match engine.query(class, columns) {
        Ok(table) => table,
        Err(err) => {
            warn!(class = %class, error = %err, "query failed, treating as empty result this cycle");
            Table::new(columns)
        }
    }
}
