//! Execution context
//!
//! A [`Session`] is one unit of work: it lazily borrows a connection from the
//! pool, counts the statements it runs, and tracks the stack of open
//! transactions. Mutating operations commit immediately when no transaction is
//! open and leave resolution to the enclosing transaction otherwise.

use super::clause::Fields;
use super::connection::{Connection, ConnectionPool, StatementOutcome};
use super::database_types::DatabaseType;
use super::error::Result;
use super::query::Query;
use super::query_builder::{Delete, Insert, InsertMany, Select, Update};
use super::record::{Executed, Rows};
use super::transaction::{Engine, Resolution, Transaction, TransactionEngine};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Per unit-of-work connection state.
///
/// Every method takes `&mut self`, so a session cannot be shared between
/// threads while in use. Create one per request or task.
pub struct Session {
    pool: Arc<dyn ConnectionPool>,
    database_type: DatabaseType,
    connection: Option<Box<dyn Connection>>,
    executed: u64,
    transactions: Vec<Engine>,
    ignore_nested_transactions: bool,
}

impl Session {
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        let database_type = pool.database_type();
        Self {
            pool,
            database_type,
            connection: None,
            executed: 0,
            transactions: Vec::new(),
            ignore_nested_transactions: false,
        }
    }

    /// Run nested transactions as no-ops instead of savepoints
    #[must_use]
    pub fn ignore_nested_transactions(mut self, ignore: bool) -> Self {
        self.ignore_nested_transactions = ignore;
        self
    }

    pub fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    /// Number of statements sent to the driver by this session
    pub fn executed_query_count(&self) -> u64 {
        self.executed
    }

    /// Number of open transactions
    pub fn transaction_depth(&self) -> usize {
        self.transactions.len()
    }

    /// Whether a pooled connection is currently held
    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    fn connection(&mut self) -> Result<&mut Box<dyn Connection>> {
        let conn = match self.connection.take() {
            Some(conn) => conn,
            None => {
                let conn = self.pool.acquire()?;
                debug!(database_type = %self.database_type, "acquired connection");
                conn
            }
        };
        Ok(self.connection.insert(conn))
    }

    /// Commit pending work and return the connection to the pool.
    ///
    /// Open transactions are forgotten. If the commit fails the connection is
    /// rolled back before it is released.
    pub fn commit(&mut self) -> Result<()> {
        self.transactions.clear();
        let Some(mut conn) = self.connection.take() else {
            return Ok(());
        };
        let result = conn.commit();
        if let Err(e) = &result {
            error!(error = %e, "commit failed, rolling back");
            if let Err(e) = conn.rollback() {
                error!(error = %e, "rollback after failed commit also failed");
            }
        }
        self.pool.release(conn);
        result
    }

    /// Commit pending work but keep the connection
    pub fn commit_pending(&mut self) -> Result<()> {
        match self.connection.as_mut() {
            Some(conn) => conn.commit(),
            None => Ok(()),
        }
    }

    /// Discard pending work and return the connection to the pool
    pub fn rollback(&mut self) -> Result<()> {
        self.transactions.clear();
        let Some(mut conn) = self.connection.take() else {
            return Ok(());
        };
        let result = conn.rollback();
        self.pool.release(conn);
        result
    }

    /// Send one statement to the driver.
    ///
    /// A driver failure first rolls back the innermost open transaction, or the
    /// whole session when none is open, then returns the failure unchanged.
    /// Failing to acquire a connection performs no rollback.
    pub fn execute_raw(&mut self, query: &Query) -> Result<StatementOutcome> {
        self.executed += 1;
        debug!(n = self.executed, sql = %query.debug_string(), "execute");
        let (text, values) = (query.text(), query.values());
        let outcome = self.connection()?.execute(&text, &values);
        if let Err(e) = &outcome {
            self.recover_from_failure(e);
        }
        outcome
    }

    fn recover_from_failure(&mut self, cause: &dyn fmt::Display) {
        let recovered = match self.transactions.len() {
            0 => self.rollback(),
            n => self.finish_transaction(n - 1, Resolution::Rollback),
        };
        if let Err(e) = recovered {
            error!(cause = %cause, error = %e, "rollback after failed statement also failed");
        }
    }

    /// Run transaction control SQL with no failure recovery
    pub(crate) fn execute_control(&mut self, sql: &str) -> Result<()> {
        self.executed += 1;
        debug!(n = self.executed, sql, "execute");
        self.connection()?.execute(sql, &[]).map(drop)
    }

    pub(crate) fn execute_savepoint_begin(&mut self, sql: &str) -> Result<()> {
        self.execute_raw(&Query::literal(sql)).map(drop)
    }

    pub(crate) fn engine_at(&self, depth: usize) -> Option<Engine> {
        self.transactions.get(depth).copied()
    }

    pub(crate) fn open_transaction(&mut self) -> Result<usize> {
        let depth = self.transactions.len();
        let nesting_disabled =
            self.ignore_nested_transactions || !self.database_type.supports_savepoints();
        let engine = Engine::select(depth, nesting_disabled);
        engine.begin(self)?;
        self.transactions.push(engine);
        debug!(depth, ?engine, "transaction opened");
        Ok(depth)
    }

    /// Resolve the transaction opened at `depth` and drop every one above it
    pub(crate) fn finish_transaction(
        &mut self,
        depth: usize,
        resolution: Resolution,
    ) -> Result<()> {
        let Some(engine) = self.engine_at(depth) else {
            return Ok(());
        };
        self.transactions.truncate(depth);
        debug!(depth, ?engine, ?resolution, "transaction resolved");
        match resolution {
            Resolution::Commit => engine.commit(self),
            Resolution::Rollback => engine.rollback(self),
        }
    }

    fn auto_commit(&mut self) -> Result<()> {
        if self.transactions.is_empty() {
            self.commit()
        } else {
            Ok(())
        }
    }

    fn last_insert_id(&mut self) -> Result<Option<i64>> {
        let Some(sql) = self.database_type.last_insert_id_sql() else {
            return Ok(None);
        };
        let id = match self.execute_raw(&Query::literal(sql))? {
            StatementOutcome::Rows { rows, .. } => rows
                .into_iter()
                .next()
                .and_then(|row| row.into_iter().next())
                .and_then(|v| v.as_long()),
            StatementOutcome::Affected(_) => None,
        };
        Ok(id)
    }

    /// Open a transaction; see [`Transaction`]
    pub fn begin_transaction(&mut self) -> Result<Transaction<'_>> {
        Transaction::begin(self)
    }

    /// Run `f` in a transaction, committing on `Ok` and rolling back on `Err`
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let mut tx = self.begin_transaction()?;
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    error!(error = %rollback_err, "transaction rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Insert one row; returns the generated id when the driver reports one
    pub fn insert(&mut self, table: &str, fields: Fields) -> Result<Option<i64>> {
        self.insert_with(Insert::new(table, fields))
    }

    pub fn insert_with(&mut self, insert: Insert) -> Result<Option<i64>> {
        let query = insert.build(self.database_type)?;
        self.execute_raw(&query)?;
        let id = self.last_insert_id()?;
        self.auto_commit()?;
        Ok(id)
    }

    /// Insert several rows with one statement.
    ///
    /// Returns the id range assuming the ids are contiguous, which only holds
    /// when no other session inserts into the table concurrently. Empty input
    /// returns an empty range without touching the pool.
    pub fn insert_many(&mut self, table: &str, rows: Vec<Fields>) -> Result<Option<Range<i64>>> {
        self.insert_many_with(InsertMany::new(table, rows))
    }

    pub fn insert_many_with(&mut self, insert: InsertMany) -> Result<Option<Range<i64>>> {
        if insert.is_empty() {
            return Ok(Some(0..0));
        }
        let query = insert.build(self.database_type)?;
        self.execute_raw(&query)?;
        let reported = self.last_insert_id()?;
        self.auto_commit()?;

        let rows = insert.len();
        Ok(reported.map(|id| {
            let first = self.database_type.first_batch_id(id, rows);
            first..first + rows as i64
        }))
    }

    /// `UPDATE table SET assignments WHERE filter`; an empty filter updates every row
    pub fn update(&mut self, table: &str, filter: Fields, assignments: Fields) -> Result<u64> {
        self.update_with(Update::new(table, assignments).filter(filter))
    }

    pub fn update_with(&mut self, update: Update) -> Result<u64> {
        let query = update.build()?;
        let outcome = self.execute_raw(&query)?;
        self.auto_commit()?;
        Ok(outcome.row_count())
    }

    /// `DELETE FROM table WHERE filter`; an empty filter deletes every row
    pub fn delete(&mut self, table: &str, filter: Fields) -> Result<u64> {
        self.delete_with(Delete::new(table).filter(filter))
    }

    pub fn delete_with(&mut self, delete: Delete) -> Result<u64> {
        let query = delete.build()?;
        let outcome = self.execute_raw(&query)?;
        self.auto_commit()?;
        Ok(outcome.row_count())
    }

    pub fn select(&mut self, select: &Select) -> Result<Rows> {
        let query = select.build()?;
        let rows = match self.execute_query(&query)? {
            Executed::Rows(rows) => rows,
            Executed::Affected(_) => Rows::empty(),
        };
        Ok(rows)
    }

    /// Execute SQL text as is, without parameters
    pub fn execute(&mut self, sql: &str) -> Result<Executed> {
        self.execute_query(&Query::literal(sql))
    }

    pub fn execute_query(&mut self, query: &Query) -> Result<Executed> {
        let outcome = self.execute_raw(query)?;
        self.auto_commit()?;
        Ok(outcome.into())
    }

    /// Execute a raw INSERT and return the generated id
    pub fn execute_insert(&mut self, sql: &str) -> Result<Option<i64>> {
        self.execute_raw(&Query::literal(sql))?;
        let id = self.last_insert_id()?;
        self.auto_commit()?;
        Ok(id)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("database_type", &self.database_type)
            .field("has_connection", &self.connection.is_some())
            .field("executed", &self.executed)
            .field("transactions", &self.transactions)
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.transactions.is_empty() {
            warn!(
                depth = self.transactions.len(),
                "session dropped with open transactions"
            );
        }
        if self.connection.is_some() {
            if let Err(e) = self.rollback() {
                error!(error = %e, "rollback on session drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::PoolStats;
    use crate::core::error::DatabaseError;
    use crate::core::value::DatabaseValue;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Journal {
        entries: Mutex<Vec<String>>,
        acquired: Mutex<usize>,
        released: Mutex<usize>,
    }

    impl Journal {
        fn entries(&self) -> Vec<String> {
            self.entries.lock().clone()
        }

        fn count(&self, entry: &str) -> usize {
            self.entries.lock().iter().filter(|e| *e == entry).count()
        }
    }

    struct FakeConnection {
        journal: Arc<Journal>,
    }

    impl Connection for FakeConnection {
        fn execute(&mut self, sql: &str, _params: &[DatabaseValue]) -> Result<StatementOutcome> {
            self.journal.entries.lock().push(sql.to_string());
            if sql.contains("broken") {
                return Err(DatabaseError::query("syntax error"));
            }
            if sql.starts_with("SELECT last_insert_id()") {
                return Ok(StatementOutcome::Rows {
                    columns: vec!["last_insert_id()".to_string()],
                    rows: vec![vec![DatabaseValue::Long(7)]],
                });
            }
            Ok(StatementOutcome::Affected(1))
        }

        fn commit(&mut self) -> Result<()> {
            self.journal.entries.lock().push("COMMIT".to_string());
            Ok(())
        }

        fn rollback(&mut self) -> Result<()> {
            self.journal.entries.lock().push("ROLLBACK".to_string());
            Ok(())
        }
    }

    struct FakePool {
        journal: Arc<Journal>,
        refuse: bool,
    }

    impl ConnectionPool for FakePool {
        fn database_type(&self) -> DatabaseType {
            DatabaseType::Mysql
        }

        fn acquire(&self) -> Result<Box<dyn Connection>> {
            if self.refuse {
                return Err(DatabaseError::pool_exhausted(1, 1));
            }
            *self.journal.acquired.lock() += 1;
            Ok(Box::new(FakeConnection {
                journal: Arc::clone(&self.journal),
            }))
        }

        fn release(&self, _conn: Box<dyn Connection>) {
            *self.journal.released.lock() += 1;
        }

        fn stats(&self) -> PoolStats {
            PoolStats::default()
        }
    }

    fn session() -> (Session, Arc<Journal>) {
        let journal = Arc::new(Journal::default());
        let pool = FakePool {
            journal: Arc::clone(&journal),
            refuse: false,
        };
        (Session::new(Arc::new(pool)), journal)
    }

    #[test]
    fn test_insert_auto_commits_and_releases() {
        let (mut session, journal) = session();
        let id = session
            .insert("users", Fields::new().with("name", "alice"))
            .unwrap();

        assert_eq!(id, Some(7));
        assert_eq!(
            journal.entries(),
            vec![
                "INSERT INTO users (name) VALUES (%s)",
                "SELECT last_insert_id()",
                "COMMIT",
            ]
        );
        assert_eq!(session.executed_query_count(), 2);
        assert!(!session.has_connection());
        assert_eq!(*journal.acquired.lock(), 1);
        assert_eq!(*journal.released.lock(), 1);
    }

    #[test]
    fn test_failure_without_transaction_rolls_back() {
        let (mut session, journal) = session();
        let err = session.execute("broken statement").unwrap_err();

        assert!(matches!(err, DatabaseError::QueryError(_)));
        assert_eq!(journal.count("ROLLBACK"), 1);
        assert_eq!(journal.count("COMMIT"), 0);
        assert!(!session.has_connection());
        assert_eq!(*journal.released.lock(), 1);
    }

    #[test]
    fn test_acquire_failure_propagates() {
        let journal = Arc::new(Journal::default());
        let pool = FakePool {
            journal: Arc::clone(&journal),
            refuse: true,
        };
        let mut session = Session::new(Arc::new(pool));

        let err = session.execute("SELECT 1").unwrap_err();
        assert!(matches!(err, DatabaseError::PoolExhausted { .. }));
        assert!(journal.entries().is_empty());
    }

    #[test]
    fn test_empty_insert_many_skips_pool() {
        let (mut session, journal) = session();
        assert_eq!(session.insert_many("users", Vec::new()).unwrap(), Some(0..0));
        assert_eq!(*journal.acquired.lock(), 0);
    }

    #[test]
    fn test_insert_many_range() {
        let (mut session, _journal) = session();
        let rows = vec![
            Fields::new().with("name", "a"),
            Fields::new().with("name", "b"),
            Fields::new().with("name", "c"),
        ];
        assert_eq!(session.insert_many("users", rows).unwrap(), Some(7..10));
    }

    #[test]
    fn test_update_inside_transaction_defers_commit() {
        let (mut session, journal) = session();
        let mut tx = session.begin_transaction().unwrap();
        let affected = tx
            .update(
                "users",
                Fields::new().with("id", 1),
                Fields::new().with("name", "bob"),
            )
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(journal.count("COMMIT"), 0);

        tx.commit().unwrap();
        assert_eq!(journal.count("COMMIT"), 1);
    }

    #[test]
    fn test_drop_rolls_back_held_connection() {
        let (mut session, journal) = session();
        session.open_transaction().unwrap();
        session.execute("DELETE FROM users").unwrap();
        drop(session);

        assert_eq!(journal.count("ROLLBACK"), 1);
        assert_eq!(journal.count("COMMIT"), 0);
        assert_eq!(*journal.released.lock(), 1);
    }
}
