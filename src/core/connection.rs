//! Driver and pool capabilities
//!
//! The access layer talks to a database only through these traits. A
//! [`ConnectionPool`] hands out [`Connection`]s and takes them back; the bundled
//! pools live in [`crate::backends`].

use super::database_types::DatabaseType;
use super::error::Result;
use super::value::DatabaseValue;

/// What a statement produced
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    /// A result set
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<DatabaseValue>>,
    },
    /// Number of rows changed
    Affected(u64),
}

impl StatementOutcome {
    /// Affected row count, or the number of rows returned
    pub fn row_count(&self) -> u64 {
        match self {
            StatementOutcome::Rows { rows, .. } => rows.len() as u64,
            StatementOutcome::Affected(n) => *n,
        }
    }
}

/// A live driver connection.
///
/// Connections are not in autocommit mode: statements stay pending until
/// [`Connection::commit`] or [`Connection::rollback`].
pub trait Connection: Send {
    /// Execute `sql` with `%s` placeholders bound positionally to `params`
    fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<StatementOutcome>;

    /// Commit pending work
    fn commit(&mut self) -> Result<()>;

    /// Discard pending work
    fn rollback(&mut self) -> Result<()>;
}

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of connections owned by the pool
    pub size: usize,
    /// Number of idle connections
    pub available: usize,
    /// Number of connections handed out
    pub active: usize,
    /// Number of callers currently inside acquire
    pub waiting: usize,
}

/// A thread-safe source of connections.
///
/// `acquire` may block while the pool is saturated; whatever timeout the pool
/// applies surfaces as its error.
pub trait ConnectionPool: Send + Sync {
    fn database_type(&self) -> DatabaseType;

    /// Borrow a connection
    fn acquire(&self) -> Result<Box<dyn Connection>>;

    /// Return a connection obtained from [`ConnectionPool::acquire`]
    fn release(&self, conn: Box<dyn Connection>);

    fn stats(&self) -> PoolStats;
}
