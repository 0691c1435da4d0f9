//! Nested transactions
//!
//! A [`Transaction`] is a scoped handle over a [`Session`]'s transaction stack.
//! The engine is chosen once, from the stack depth at creation:
//!
//! | depth | engine | begin | commit | rollback |
//! |---|---|---|---|---|
//! | 0 | [`Engine::Real`] | commit pending work | commit, release connection | rollback, release connection |
//! | > 0 | [`Engine::Savepoint`] | `SAVEPOINT sp_N` | `RELEASE SAVEPOINT sp_N` | `ROLLBACK TO SAVEPOINT sp_N` |
//! | > 0, nesting disabled | [`Engine::NoOp`] | - | - | - |
//!
//! Resolving a transaction truncates the stack to its creation depth, so inner
//! transactions that were never resolved are discarded with it. Resolving a
//! transaction the stack has already unwound past does nothing.

use super::error::Result;
use super::session::Session;
use std::ops::{Deref, DerefMut};
use tracing::{error, warn};

/// How a transaction ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    Commit,
    Rollback,
}

/// Begin/commit/rollback actions of one transaction kind
pub trait TransactionEngine {
    fn begin(&self, session: &mut Session) -> Result<()>;

    fn commit(&self, session: &mut Session) -> Result<()>;

    fn rollback(&self, session: &mut Session) -> Result<()>;
}

/// Top-level transaction mapped onto the connection's own transaction
#[derive(Debug, Clone, Copy)]
pub struct RealEngine;

impl TransactionEngine for RealEngine {
    fn begin(&self, session: &mut Session) -> Result<()> {
        session.commit_pending()
    }

    fn commit(&self, session: &mut Session) -> Result<()> {
        session.commit()
    }

    fn rollback(&self, session: &mut Session) -> Result<()> {
        session.rollback()
    }
}

/// Nested transaction emulated with a savepoint named after its depth
#[derive(Debug, Clone, Copy)]
pub struct SavepointEngine {
    depth: usize,
}

impl SavepointEngine {
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    pub fn name(&self) -> String {
        format!("sp_{}", self.depth)
    }
}

impl TransactionEngine for SavepointEngine {
    fn begin(&self, session: &mut Session) -> Result<()> {
        session.execute_savepoint_begin(&format!("SAVEPOINT {}", self.name()))
    }

    fn commit(&self, session: &mut Session) -> Result<()> {
        let release = session.execute_control(&format!("RELEASE SAVEPOINT {}", self.name()));
        if release.is_err() {
            if let Err(e) = self.rollback(session) {
                error!(
                    savepoint = %self.name(),
                    error = %e,
                    "rollback after failed release also failed"
                );
            }
        }
        release
    }

    fn rollback(&self, session: &mut Session) -> Result<()> {
        session.execute_control(&format!("ROLLBACK TO SAVEPOINT {}", self.name()))
    }
}

/// Nested transaction that does nothing; work belongs to the enclosing transaction
#[derive(Debug, Clone, Copy)]
pub struct NoOpEngine;

impl TransactionEngine for NoOpEngine {
    fn begin(&self, _session: &mut Session) -> Result<()> {
        Ok(())
    }

    fn commit(&self, _session: &mut Session) -> Result<()> {
        Ok(())
    }

    fn rollback(&self, _session: &mut Session) -> Result<()> {
        Ok(())
    }
}

/// Engine recorded on a session's transaction stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Real,
    /// Savepoint `sp_<depth>`
    Savepoint(usize),
    NoOp,
}

impl Engine {
    /// Pick the engine for a transaction opened at `depth`
    pub fn select(depth: usize, nesting_disabled: bool) -> Engine {
        match depth {
            0 => Engine::Real,
            _ if nesting_disabled => Engine::NoOp,
            depth => Engine::Savepoint(depth),
        }
    }
}

impl TransactionEngine for Engine {
    fn begin(&self, session: &mut Session) -> Result<()> {
        match *self {
            Engine::Real => RealEngine.begin(session),
            Engine::Savepoint(depth) => SavepointEngine::new(depth).begin(session),
            Engine::NoOp => NoOpEngine.begin(session),
        }
    }

    fn commit(&self, session: &mut Session) -> Result<()> {
        match *self {
            Engine::Real => RealEngine.commit(session),
            Engine::Savepoint(depth) => SavepointEngine::new(depth).commit(session),
            Engine::NoOp => NoOpEngine.commit(session),
        }
    }

    fn rollback(&self, session: &mut Session) -> Result<()> {
        match *self {
            Engine::Real => RealEngine.rollback(session),
            Engine::Savepoint(depth) => SavepointEngine::new(depth).rollback(session),
            Engine::NoOp => NoOpEngine.rollback(session),
        }
    }
}

/// Scoped transaction over a [`Session`].
///
/// Statements and nested transactions are issued through the handle, which
/// dereferences to the session. Dropping an unresolved handle rolls it back.
///
/// ```no_run
/// # use rust_sql_pool::{Database, Fields, Result};
/// # fn run(db: &Database) -> Result<()> {
/// let mut session = db.session();
/// let mut tx = session.begin_transaction()?;
/// tx.insert("audit", Fields::new().with("event", "login"))?;
/// {
///     let mut inner = tx.begin_transaction()?; // SAVEPOINT sp_1
///     inner.update("users", Fields::new().with("id", 1), Fields::new().with("seen", true))?;
///     inner.commit()?;
/// }
/// tx.commit()?;
/// # Ok(())
/// # }
/// ```
#[must_use = "dropping a transaction rolls it back"]
pub struct Transaction<'s> {
    session: &'s mut Session,
    depth: usize,
    resolved: bool,
}

impl<'s> Transaction<'s> {
    pub(crate) fn begin(session: &'s mut Session) -> Result<Self> {
        let depth = session.open_transaction()?;
        Ok(Self {
            session,
            depth,
            resolved: false,
        })
    }

    /// Stack depth this transaction was opened at
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The engine, or `None` once the stack has unwound past this transaction
    pub fn engine(&self) -> Option<Engine> {
        self.session.engine_at(self.depth)
    }

    /// Commit this transaction and discard any unresolved inner ones
    pub fn commit(mut self) -> Result<()> {
        self.resolved = true;
        self.session.finish_transaction(self.depth, Resolution::Commit)
    }

    /// Roll back this transaction and any unresolved inner ones
    pub fn rollback(mut self) -> Result<()> {
        self.resolved = true;
        self.session.finish_transaction(self.depth, Resolution::Rollback)
    }
}

impl Deref for Transaction<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.resolved || self.session.engine_at(self.depth).is_none() {
            return;
        }
        warn!(
            depth = self.depth,
            "transaction dropped without commit or rollback, rolling back"
        );
        if let Err(e) = self
            .session
            .finish_transaction(self.depth, Resolution::Rollback)
        {
            error!(depth = self.depth, error = %e, "rollback of dropped transaction failed");
        }
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::backends::SqlitePool;
    use crate::core::clause::Fields;
    use crate::core::config::Config;
    use crate::core::database_types::DatabaseType;
    use crate::core::query_builder::Select;
    use std::sync::Arc;

    fn session() -> Session {
        let pool = SqlitePool::from_config(&Config::new(DatabaseType::Sqlite)).unwrap();
        let mut session = Session::new(Arc::new(pool));
        session
            .execute("CREATE TABLE test (id INTEGER PRIMARY KEY, value TEXT)")
            .unwrap();
        session
    }

    fn count(session: &mut Session) -> usize {
        session.select(&Select::new("test")).unwrap().len()
    }

    #[test]
    fn test_engine_selection() {
        assert_eq!(Engine::select(0, false), Engine::Real);
        assert_eq!(Engine::select(0, true), Engine::Real);
        assert_eq!(Engine::select(2, false), Engine::Savepoint(2));
        assert_eq!(Engine::select(1, true), Engine::NoOp);
        assert_eq!(SavepointEngine::new(3).name(), "sp_3");
    }

    #[test]
    fn test_transaction_commit() {
        let mut session = session();
        let mut tx = session.begin_transaction().unwrap();
        assert_eq!(tx.engine(), Some(Engine::Real));
        tx.insert("test", Fields::new().with("value", "test1")).unwrap();
        assert_eq!(tx.transaction_depth(), 1);
        tx.commit().unwrap();

        assert_eq!(session.transaction_depth(), 0);
        assert!(!session.has_connection());
        assert_eq!(count(&mut session), 1);
    }

    #[test]
    fn test_transaction_drop_rolls_back() {
        let mut session = session();
        {
            let mut tx = session.begin_transaction().unwrap();
            tx.insert("test", Fields::new().with("value", "test1")).unwrap();
        }
        assert_eq!(session.transaction_depth(), 0);
        assert_eq!(count(&mut session), 0);
    }

    #[test]
    fn test_nested_savepoint_rollback() {
        let mut session = session();
        let mut outer = session.begin_transaction().unwrap();
        outer.insert("test", Fields::new().with("value", "kept")).unwrap();
        {
            let mut inner = outer.begin_transaction().unwrap();
            assert_eq!(inner.engine(), Some(Engine::Savepoint(1)));
            inner.insert("test", Fields::new().with("value", "discarded")).unwrap();
            inner.rollback().unwrap();
        }
        outer.commit().unwrap();

        let rows = session.select(&Select::new("test")).unwrap();
        let values: Vec<String> = rows.map(|r| r["value"].as_string()).collect();
        assert_eq!(values, vec!["kept"]);
    }

    #[test]
    fn test_outer_resolution_discards_inner() {
        let mut session = session();
        let mut outer = session.begin_transaction().unwrap();
        let mut inner = outer.begin_transaction().unwrap();
        inner.insert("test", Fields::new().with("value", "x")).unwrap();
        // Resolving the outer transaction from inside unwinds both levels.
        inner.finish_transaction(0, Resolution::Rollback).unwrap();
        assert_eq!(inner.transaction_depth(), 0);
        assert_eq!(inner.engine(), None);
        inner.commit().unwrap();
        outer.commit().unwrap();

        assert_eq!(count(&mut session), 0);
    }

    #[test]
    fn test_ignore_nested_transactions() {
        let mut session = session().ignore_nested_transactions(true);
        let mut outer = session.begin_transaction().unwrap();
        let inner = outer.begin_transaction().unwrap();
        assert_eq!(inner.engine(), Some(Engine::NoOp));
        inner.rollback().unwrap();
        outer.insert("test", Fields::new().with("value", "x")).unwrap();
        outer.commit().unwrap();

        assert_eq!(count(&mut session), 1);
    }
}
