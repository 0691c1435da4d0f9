//! r2d2-backed connection pool
//!
//! [`ManagedPool`] adapts an [`r2d2::Pool`] to the [`ConnectionPool`] capability.
//! Any r2d2 connection manager can back it once it implements [`PoolDriver`],
//! which names the dialect and wraps checked-out connections.

use crate::core::connection::{Connection, ConnectionPool, PoolStats};
use crate::core::database_types::DatabaseType;
use crate::core::error::{DatabaseError, Result};
use r2d2::{HandleError, ManageConnection, PooledConnection};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: usize,
    /// Timeout for acquiring a connection from the pool
    pub timeout: Duration,
    /// Idle connections are closed after this long; `None` keeps them open
    pub idle_timeout: Option<Duration>,
    /// Connections are replaced after this long; `None` keeps them forever
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 16,
            timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(10 * 60)),
            max_lifetime: Some(Duration::from_secs(30 * 60)),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum pool size
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set connection acquisition timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }
}

/// An r2d2 connection manager that can sit behind [`ManagedPool`]
pub trait PoolDriver: ManageConnection + Sized {
    /// Dialect spoken by the connections this manager opens
    fn database_type(&self) -> DatabaseType;

    /// Wrap a checked-out connection; dropping the wrapper returns it to the pool
    fn wrap(conn: PooledConnection<Self>) -> Box<dyn Connection>;
}

/// Routes r2d2's background connection errors to tracing
#[derive(Debug)]
struct TracingErrorHandler;

impl<E: fmt::Display> HandleError<E> for TracingErrorHandler {
    fn handle_error(&self, error: E) {
        warn!(error = %error, "pooled connection error");
    }
}

/// Bounded pool over an r2d2 connection manager.
///
/// Connections are opened on demand. When all of them are checked out,
/// `acquire` blocks until one comes back or the configured timeout elapses.
pub struct ManagedPool<M: PoolDriver> {
    pool: r2d2::Pool<M>,
    database_type: DatabaseType,
    waiting: AtomicUsize,
}

impl<M: PoolDriver> ManagedPool<M> {
    pub fn new(manager: M, config: PoolConfig) -> Result<Self> {
        let database_type = manager.database_type();
        let pool = r2d2::Pool::builder()
            .max_size(config.max_size.max(1) as u32)
            .min_idle(Some(0))
            .connection_timeout(config.timeout.max(Duration::from_millis(1)))
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .error_handler(Box::new(TracingErrorHandler))
            .build(manager)
            .map_err(|e| DatabaseError::connection(format!("failed to create pool: {}", e)))?;
        Ok(Self {
            pool,
            database_type,
            waiting: AtomicUsize::new(0),
        })
    }

    /// Check out a driver connection, waiting up to the configured timeout
    pub fn get(&self) -> Result<PooledConnection<M>> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let conn = self.pool.get();
        self.waiting.fetch_sub(1, Ordering::SeqCst);

        conn.map_err(|e| {
            let state = self.pool.state();
            let active = state.connections.saturating_sub(state.idle_connections) as usize;
            let max = self.pool.max_size() as usize;
            if active >= max {
                warn!(active, max, "timed out waiting for a pooled connection");
                DatabaseError::pool_exhausted(active, max)
            } else {
                DatabaseError::connection(e.to_string())
            }
        })
    }
}

impl<M: PoolDriver> ConnectionPool for ManagedPool<M> {
    fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    fn acquire(&self) -> Result<Box<dyn Connection>> {
        let conn = self.get()?;
        debug!(database_type = %self.database_type, "checked out pooled connection");
        Ok(M::wrap(conn))
    }

    fn release(&self, conn: Box<dyn Connection>) {
        drop(conn);
        debug!(
            idle = self.pool.state().idle_connections,
            "connection returned to pool"
        );
    }

    fn stats(&self) -> PoolStats {
        let state = self.pool.state();
        let size = state.connections as usize;
        let available = state.idle_connections as usize;
        PoolStats {
            size,
            available,
            active: size.saturating_sub(available),
            waiting: self.waiting.load(Ordering::SeqCst),
        }
    }
}

impl<M: PoolDriver> fmt::Debug for ManagedPool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedPool")
            .field("database_type", &self.database_type)
            .field("max_size", &self.pool.max_size())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::StatementOutcome;
    use crate::core::error::ErrorKind;
    use crate::core::value::DatabaseValue;
    use std::sync::Arc;
    use std::thread;

    struct NullConnection;

    struct Checked {
        _conn: PooledConnection<CountingManager>,
    }

    impl Connection for Checked {
        fn execute(&mut self, _sql: &str, _params: &[DatabaseValue]) -> Result<StatementOutcome> {
            Ok(StatementOutcome::Affected(0))
        }

        fn commit(&mut self) -> Result<()> {
            Ok(())
        }

        fn rollback(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct CountingManager {
        opened: Arc<AtomicUsize>,
        refuse: bool,
    }

    impl ManageConnection for CountingManager {
        type Connection = NullConnection;
        type Error = DatabaseError;

        fn connect(&self) -> Result<NullConnection> {
            if self.refuse {
                return Err(DatabaseError::connection("refused"));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(NullConnection)
        }

        fn is_valid(&self, _conn: &mut NullConnection) -> Result<()> {
            Ok(())
        }

        fn has_broken(&self, _conn: &mut NullConnection) -> bool {
            false
        }
    }

    impl PoolDriver for CountingManager {
        fn database_type(&self) -> DatabaseType {
            DatabaseType::None
        }

        fn wrap(conn: PooledConnection<Self>) -> Box<dyn Connection> {
            Box::new(Checked { _conn: conn })
        }
    }

    fn pool(
        manager: CountingManager,
        max_size: usize,
        timeout: Duration,
    ) -> ManagedPool<CountingManager> {
        ManagedPool::new(
            manager,
            PoolConfig::new().with_max_size(max_size).with_timeout(timeout),
        )
        .unwrap()
    }

    #[test]
    fn test_reuses_idle_connections() {
        let manager = CountingManager::default();
        let pool = pool(manager.clone(), 2, Duration::from_secs(5));
        assert_eq!(pool.stats().size, 0);

        let conn = pool.acquire().unwrap();
        assert_eq!(pool.stats().active, 1);
        pool.release(conn);
        let conn = pool.acquire().unwrap();
        pool.release(conn);

        assert_eq!(manager.opened.load(Ordering::SeqCst), 1);
        let stats = pool.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.available, 1);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.waiting, 0);
    }

    #[test]
    fn test_exhaustion_times_out() {
        let pool = pool(CountingManager::default(), 1, Duration::from_millis(20));
        let held = pool.acquire().unwrap();

        let err = pool.acquire().err().unwrap();
        assert!(matches!(err, DatabaseError::PoolExhausted { active: 1, max: 1 }));
        assert_eq!(err.kind(), ErrorKind::Resource);

        pool.release(held);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_waiter_gets_released_connection() {
        let pool = Arc::new(pool(CountingManager::default(), 1, Duration::from_secs(5)));
        let held = pool.acquire().unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.acquire().map(|conn| pool.release(conn)).is_ok())
        };
        thread::sleep(Duration::from_millis(20));
        pool.release(held);

        assert!(waiter.join().unwrap());
        assert_eq!(pool.stats().active, 0);
    }

    #[test]
    fn test_connect_failure_is_a_connection_error() {
        let manager = CountingManager {
            refuse: true,
            ..Default::default()
        };
        let pool = pool(manager, 1, Duration::from_millis(50));

        let err = pool.acquire().err().unwrap();
        assert!(matches!(err, DatabaseError::ConnectionError(_)));
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert_eq!(pool.stats().active, 0);
    }
}
