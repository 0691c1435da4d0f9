//! # Rust SQL Pool
//!
//! A connection-pooled SQL access layer: parameterized query composition, CRUD
//! helpers, and nested transactions over a shared pool of connections.
//!
//! ## Features
//!
//! - **Safe composition**: [`Query`] keeps SQL text and bound values apart until execution
//! - **Clause builders**: `where_clause` maps `column__op` keys to conditions
//! - **Sessions**: one connection per unit of work, acquired lazily, auto-committed
//! - **Nested transactions**: savepoints below the top level, or no-ops when disabled
//! - **Pool registry**: one shared pool per `host:port:database`
//!
//! ## Supported Databases
//!
//! | Database | Status |
//! |----------|--------|
//! | SQLite | Built in (`sqlite` feature, bundled) |
//! | Others | Implement [`ConnectionPool`] and use [`Database::with_pool`] |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_sql_pool::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let db = rust_sql_pool::open(&Config::new(DatabaseType::Sqlite).database("app.db"))?;
//!     db.execute(
//!         "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)",
//!     )?;
//!
//!     let id = db.insert("users", Fields::new().with("name", "Alice").with("age", 30))?;
//!     println!("inserted {:?}", id);
//!
//!     let adults = Select::new("users")
//!         .filter(Fields::new().with("age__gte", 18))
//!         .order_by("name")
//!         .page(1);
//!     for user in db.select(&adults)? {
//!         println!("{}", user["name"].as_string());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Working with Transactions
//!
//! ```rust,no_run
//! use rust_sql_pool::prelude::*;
//!
//! fn transfer(db: &Database) -> Result<()> {
//!     let mut session = db.session();
//!     session.transaction(|tx| {
//!         tx.update(
//!             "accounts",
//!             Fields::new().with("id", 1),
//!             Fields::new().with("balance", raw("balance - 10")),
//!         )?;
//!         tx.update(
//!             "accounts",
//!             Fields::new().with("id", 2),
//!             Fields::new().with("balance", raw("balance + 10")),
//!         )?;
//!         Ok(())
//!     })
//! }
//! ```

/// Core types: queries, builders, sessions and transactions
pub mod core;

/// Pool and driver implementations
pub mod backends;

/// Prelude for convenient imports
///
/// ```rust
/// use rust_sql_pool::prelude::*;
///
/// let q = Query::literal("SELECT * FROM users WHERE id = ").concatenated(Param::new(1));
/// assert_eq!(q.text(), "SELECT * FROM users WHERE id = %s");
/// ```
pub mod prelude {
    pub use crate::core::{
        raw, where_clause, Config, Database, DatabaseError, DatabaseType, DatabaseValue,
        Executed, Fields, InsertMode, Param, Query, Record, Result, Select, Session,
        Transaction,
    };
}

// Re-export at root level for convenience
pub use crate::core::{
    assignments, open, or_group, raw, sqlify, value_list, where_clause, Clause, Config,
    Connection, ConnectionPool, Database, DatabaseError, DatabaseRow,
    DatabaseType, DatabaseValue, Delete, Engine, ErrorKind, Executed, Fields, Fragment, Insert,
    InsertMany, InsertMode, Operand, Operator, Param, PoolRegistry, PoolStats, Query, Record,
    Result, Rows, Select, Session, StatementOutcome, Transaction, TransactionEngine, Update,
};

pub use crate::backends::{ManagedPool, PoolConfig, PoolDriver};
#[cfg(feature = "sqlite")]
pub use crate::backends::{SqliteConnection, SqlitePool};
