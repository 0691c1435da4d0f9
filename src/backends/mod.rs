//! Pool and driver implementations
//!
//! [`ManagedPool`] works with any r2d2 manager that implements [`PoolDriver`].
//! The SQLite driver is built with the `sqlite` feature.

pub mod pool;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use pool::{ManagedPool, PoolConfig, PoolDriver};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnection, SqlitePool};
