//! Core access layer types
//!
//! Query composition, clause and statement builders, the driver capability
//! traits, and the session/transaction lifecycle built on top of them.

pub mod clause;
pub mod config;
pub mod connection;
pub mod database;
pub mod database_types;
pub mod error;
pub mod query;
pub mod query_builder;
pub mod record;
pub mod session;
pub mod transaction;
pub mod value;

// Re-export commonly used types
pub use clause::{
    assignments, or_group, raw, value_list, where_clause, Clause, Fields, Operand, Operator,
};
pub use config::Config;
pub use connection::{Connection, ConnectionPool, PoolStats, StatementOutcome};
pub use database::{open, Database, PoolRegistry};
pub use database_types::DatabaseType;
pub use error::{DatabaseError, ErrorKind, Result};
pub use query::{Fragment, Param, Query};
pub use query_builder::{Delete, Insert, InsertMany, InsertMode, Select, Update};
pub use record::{Executed, Record, Rows};
pub use session::Session;
pub use transaction::{
    Engine, NoOpEngine, RealEngine, SavepointEngine, Transaction, TransactionEngine,
};
pub use value::{sqlify, DatabaseRow, DatabaseValue};
