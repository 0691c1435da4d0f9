//! Database type definitions
//!
//! This module defines the driver identities the access layer knows about, and the
//! SQL dialect differences the statement builders and transactions depend on.

use super::error::{DatabaseError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported database types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DatabaseType {
    /// No database type specified
    #[default]
    None = 0,
    /// PostgreSQL database
    #[serde(alias = "postgresql")]
    Postgres = 1,
    /// MySQL/MariaDB database
    #[serde(alias = "mariadb")]
    Mysql = 2,
    /// SQLite database
    #[serde(alias = "sqlite3")]
    Sqlite = 3,
}

impl DatabaseType {
    /// Convert database type to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            DatabaseType::None => "none",
            DatabaseType::Postgres => "postgres",
            DatabaseType::Mysql => "mysql",
            DatabaseType::Sqlite => "sqlite",
        }
    }

    /// Check if nested transactions can be emulated with savepoints
    pub fn supports_savepoints(&self) -> bool {
        matches!(
            self,
            DatabaseType::Postgres | DatabaseType::Mysql | DatabaseType::Sqlite
        )
    }

    /// Statement returning the identifier generated by the last insert.
    ///
    /// PostgreSQL has none that is safe for tables without a sequence
    /// (`lastval()` fails and would abort the transaction), so ids are unavailable there.
    pub fn last_insert_id_sql(&self) -> Option<&'static str> {
        match self {
            DatabaseType::Mysql => Some("SELECT last_insert_id()"),
            DatabaseType::Sqlite => Some("SELECT last_insert_rowid()"),
            DatabaseType::Postgres | DatabaseType::None => None,
        }
    }

    /// First identifier of a multi-row insert of `rows` rows.
    ///
    /// MySQL reports the id of the first row, SQLite that of the last.
    pub fn first_batch_id(&self, reported: i64, rows: usize) -> i64 {
        match self {
            DatabaseType::Sqlite => reported - rows.saturating_sub(1) as i64,
            _ => reported,
        }
    }

    /// Insert keyword for "skip rows that would violate a unique key"
    pub(crate) fn insert_ignore_keyword(&self) -> Result<&'static str> {
        match self {
            DatabaseType::Mysql => Ok("INSERT IGNORE"),
            DatabaseType::Sqlite => Ok("INSERT OR IGNORE"),
            _ => Err(DatabaseError::composition(format!(
                "INSERT_IGNORE is not supported by {}",
                self
            ))),
        }
    }

    /// Keyword introducing the assignments applied when an insert hits a duplicate key
    pub(crate) fn upsert_clause(&self) -> Result<&'static str> {
        match self {
            DatabaseType::Mysql => Ok("ON DUPLICATE KEY UPDATE"),
            DatabaseType::Sqlite => Ok("ON CONFLICT DO UPDATE SET"),
            _ => Err(DatabaseError::composition(format!(
                "on-duplicate updates are not supported by {}",
                self
            ))),
        }
    }

    /// `INSERT` of a row made only of column defaults
    pub(crate) fn default_values_insert(&self, keyword: &str, table: &str) -> String {
        match self {
            DatabaseType::Mysql => format!("{} INTO {} () VALUES ()", keyword, table),
            _ => format!("{} INTO {} DEFAULT VALUES", keyword, table),
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(DatabaseType::None),
            "postgres" | "postgresql" => Ok(DatabaseType::Postgres),
            "mysql" | "mariadb" => Ok(DatabaseType::Mysql),
            "sqlite" | "sqlite3" => Ok(DatabaseType::Sqlite),
            _ => Err(format!("Invalid database type: '{}'", s)),
        }
    }
}
