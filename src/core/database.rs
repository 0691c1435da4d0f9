//! Data access facade and pool registry
//!
//! [`Database`] owns one connection pool and hands out [`Session`]s. Its CRUD
//! methods are one-shot conveniences: each runs in a fresh session, so it
//! commits on its own and never joins a transaction held elsewhere.
//!
//! [`PoolRegistry`] maps a connection key (`host:port:database`) to a shared
//! `Database`, so opening the same key twice returns the same pool.

use super::clause::Fields;
use super::config::Config;
use super::connection::{ConnectionPool, PoolStats};
use super::database_types::DatabaseType;
use super::error::{DatabaseError, Result};
use super::query::Query;
use super::query_builder::{Delete, Insert, InsertMany, Select, Update};
use super::record::{Executed, Rows};
use super::session::Session;
use super::transaction::Transaction;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

struct Inner {
    pool: Arc<dyn ConnectionPool>,
    config: Config,
}

/// Handle to one pooled database; clones share the pool
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    /// Wrap a caller-supplied pool
    pub fn with_pool(pool: Arc<dyn ConnectionPool>, config: Config) -> Self {
        Self {
            inner: Arc::new(Inner { pool, config }),
        }
    }

    /// Create a pool for `config` using the built-in driver for `config.driver`
    pub fn connect(config: &Config) -> Result<Self> {
        match config.driver {
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => {
                let pool = crate::backends::SqlitePool::from_config(config)?;
                Ok(Self::with_pool(Arc::new(pool), config.clone()))
            }
            driver => Err(DatabaseError::unsupported(format!(
                "no built-in driver for {}; supply a pool with Database::with_pool",
                driver
            ))),
        }
    }

    /// The config the pool was created with
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn database_type(&self) -> DatabaseType {
        self.inner.pool.database_type()
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// Start a unit of work
    pub fn session(&self) -> Session {
        Session::new(Arc::clone(&self.inner.pool))
            .ignore_nested_transactions(self.inner.config.ignore_nested_transactions)
    }

    /// Run `f` in a transaction on a fresh session
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        self.session().transaction(f)
    }

    pub fn insert(&self, table: &str, fields: Fields) -> Result<Option<i64>> {
        self.session().insert(table, fields)
    }

    pub fn insert_with(&self, insert: Insert) -> Result<Option<i64>> {
        self.session().insert_with(insert)
    }

    pub fn insert_many(&self, table: &str, rows: Vec<Fields>) -> Result<Option<Range<i64>>> {
        self.session().insert_many(table, rows)
    }

    pub fn insert_many_with(&self, insert: InsertMany) -> Result<Option<Range<i64>>> {
        self.session().insert_many_with(insert)
    }

    pub fn update(&self, table: &str, filter: Fields, assignments: Fields) -> Result<u64> {
        self.session().update(table, filter, assignments)
    }

    pub fn update_with(&self, update: Update) -> Result<u64> {
        self.session().update_with(update)
    }

    pub fn delete(&self, table: &str, filter: Fields) -> Result<u64> {
        self.session().delete(table, filter)
    }

    pub fn delete_with(&self, delete: Delete) -> Result<u64> {
        self.session().delete_with(delete)
    }

    pub fn select(&self, select: &Select) -> Result<Rows> {
        self.session().select(select)
    }

    pub fn execute(&self, sql: &str) -> Result<Executed> {
        self.session().execute(sql)
    }

    pub fn execute_query(&self, query: &Query) -> Result<Executed> {
        self.session().execute_query(query)
    }

    pub fn execute_insert(&self, sql: &str) -> Result<Option<i64>> {
        self.session().execute_insert(sql)
    }

    /// Whether two handles share one pool
    pub fn same_pool(&self, other: &Database) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("key", &self.inner.config.key())
            .field("database_type", &self.database_type())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Databases keyed by [`Config::key`]
#[derive(Default)]
pub struct PoolRegistry {
    pools: Mutex<HashMap<String, Database>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by [`open`]
    pub fn global() -> &'static PoolRegistry {
        static GLOBAL: OnceLock<PoolRegistry> = OnceLock::new();
        GLOBAL.get_or_init(PoolRegistry::new)
    }

    /// Return the database for `config`'s key, connecting on first use.
    ///
    /// Only the first config seen for a key is used; later calls with the same
    /// key get the existing pool whatever their other settings.
    pub fn open(&self, config: &Config) -> Result<Database> {
        let key = config.key();
        let mut pools = self.pools.lock();
        if let Some(db) = pools.get(&key) {
            debug!(key = %key, "reusing registered pool");
            return Ok(db.clone());
        }
        let db = Database::connect(config)?;
        info!(key = %key, driver = %config.driver, "registered pool");
        pools.insert(key, db.clone());
        Ok(db)
    }

    pub fn get(&self, key: &str) -> Option<Database> {
        self.pools.lock().get(key).cloned()
    }

    /// Forget a pool; handles already given out keep working
    pub fn remove(&self, key: &str) -> Option<Database> {
        self.pools.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.lock().is_empty()
    }
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pools = self.pools.lock();
        f.debug_struct("PoolRegistry")
            .field("keys", &pools.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Open `config` through the process-wide [`PoolRegistry`]
pub fn open(config: &Config) -> Result<Database> {
    PoolRegistry::global().open(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_driver() {
        let config = Config::new(DatabaseType::Postgres).database("app");
        let err = Database::connect(&config).unwrap_err();
        assert!(matches!(err, DatabaseError::UnsupportedOperation(_)));

        let registry = PoolRegistry::new();
        assert!(registry.open(&config).is_err());
        assert!(registry.is_empty());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_registry_reuses_pool_per_key() {
        let registry = PoolRegistry::new();
        let config = Config::new(DatabaseType::Sqlite).database("");
        let a = registry.open(&config).unwrap();
        let b = registry.open(&config.clone().max_connections(2)).unwrap();
        assert!(a.same_pool(&b));
        assert_eq!(b.config().max_connections, config.max_connections);
        assert_eq!(registry.len(), 1);

        let other = registry
            .open(&Config::new(DatabaseType::Sqlite).host("elsewhere"))
            .unwrap();
        assert!(!a.same_pool(&other));
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(&config.key()).is_some());
        assert!(registry.get(&config.key()).is_none());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_one_shot_operations() {
        let db = Database::connect(&Config::new(DatabaseType::Sqlite)).unwrap();
        db.execute("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        let id = db.insert("items", Fields::new().with("name", "a")).unwrap();
        assert_eq!(id, Some(1));

        let rows = db.select(&Select::new("items")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(db.stats().active, 0);
    }
}
