//! SQLite driver
//!
//! [`SqliteConnection`] adapts a pooled rusqlite connection to the [`Connection`]
//! capability. SQLite runs in autocommit mode by default, so the adapter opens a
//! transaction lazily before the first statement and keeps it open until
//! `commit` or `rollback`. [`SqlitePool`] pools them through r2d2_sqlite.

use crate::backends::pool::{ManagedPool, PoolConfig, PoolDriver};
use crate::core::config::Config;
use crate::core::connection::{Connection, StatementOutcome};
use crate::core::database_types::DatabaseType;
use crate::core::error::Result;
use crate::core::query::to_qmark;
use crate::core::value::DatabaseValue;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params_from_iter, Row};
use std::time::Duration;
use tracing::{info, trace};

/// How long a connection waits on a locked database file
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool of SQLite connections
pub type SqlitePool = ManagedPool<SqliteConnectionManager>;

/// SQLite connection checked out of a [`SqlitePool`]
pub struct SqliteConnection {
    conn: PooledConnection<SqliteConnectionManager>,
}

impl SqliteConnection {
    pub fn new(conn: PooledConnection<SqliteConnectionManager>) -> Self {
        Self { conn }
    }

    /// True while a transaction opened by this adapter is pending
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

/// Convert a rusqlite Row to positional values
    fn row_values(row: &Row, column_count: usize) -> rusqlite::Result<Vec<DatabaseValue>> {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let value = match row.get_ref(i)? {
                rusqlite::types::ValueRef::Null => DatabaseValue::Null,
                rusqlite::types::ValueRef::Integer(v) => DatabaseValue::Long(v),
                rusqlite::types::ValueRef::Real(v) => DatabaseValue::Double(v),
                rusqlite::types::ValueRef::Text(v) => {
                    DatabaseValue::String(String::from_utf8_lossy(v).to_string())
                }
                rusqlite::types::ValueRef::Blob(v) => DatabaseValue::Bytes(v.to_vec()),
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Convert DatabaseValue to rusqlite parameter
    fn value_to_param(value: &DatabaseValue) -> Box<dyn rusqlite::ToSql> {
        match value {
            DatabaseValue::Null => Box::new(None::<i64>),
            DatabaseValue::Bool(v) => Box::new(*v),
            DatabaseValue::Int(v) => Box::new(*v),
            DatabaseValue::Long(v) => Box::new(*v),
            DatabaseValue::Float(v) => Box::new(*v),
            DatabaseValue::Double(v) => Box::new(*v),
            DatabaseValue::String(v) => Box::new(v.clone()),
            DatabaseValue::Bytes(v) => Box::new(v.clone()),
            DatabaseValue::Timestamp(v) => Box::new(*v),
        }
    }
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<StatementOutcome> {
        let sql = to_qmark(sql);
        let rusqlite_params: Vec<Box<dyn rusqlite::ToSql>> =
            params.iter().map(Self::value_to_param).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        if self.conn.is_autocommit() {
            // Readers share the file. A writer takes the write lock up front,
            // since a deferred transaction cannot wait out a lock upgrade.
            let begin = if stmt.readonly() {
                "BEGIN"
            } else {
                "BEGIN IMMEDIATE"
            };
            trace!("{}", begin);
            self.conn.execute_batch(begin)?;
        }

        if stmt.column_count() == 0 {
            let affected = stmt.execute(params_from_iter(rusqlite_params.iter()))?;
            return Ok(StatementOutcome::Affected(affected as u64));
        }

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut rows = stmt.query(params_from_iter(rusqlite_params.iter()))?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(Self::row_values(row, columns.len())?);
        }
        Ok(StatementOutcome::Rows {
            columns,
            rows: results,
        })
    }

    fn commit(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            trace!("COMMIT");
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            trace!("ROLLBACK");
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

impl PoolDriver for SqliteConnectionManager {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn wrap(conn: PooledConnection<Self>) -> Box<dyn Connection> {
        Box::new(SqliteConnection::new(conn))
    }
}

fn init_connection(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)
}

impl ManagedPool<SqliteConnectionManager> {
    /// Build the pool for `config.database`.
    ///
    /// An empty path or `:memory:` gives a private in-memory database. Such a
    /// database lives and dies with its one connection, so the pool holds exactly
    /// one and never recycles it; concurrent sessions queue for it.
    pub fn from_config(config: &Config) -> Result<Self> {
        let path = config.connection_string();
        let pool_config = PoolConfig::new()
            .with_max_size(config.max_connections)
            .with_timeout(config.acquire_timeout_duration());

        let (manager, pool_config) = if path == ":memory:" {
            let pool_config = pool_config
                .with_max_size(1)
                .with_idle_timeout(None)
                .with_max_lifetime(None);
            (SqliteConnectionManager::memory(), pool_config)
        } else {
            (SqliteConnectionManager::file(&path), pool_config)
        };

        info!(
            path = %path,
            max_connections = pool_config.max_size,
            "creating sqlite pool"
        );
        ManagedPool::new(manager.with_init(init_connection), pool_config)
    }
}
