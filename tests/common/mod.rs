//! Scripted in-memory driver that records every call
//!
//! Statements are journaled as their placeholder text; commits and rollbacks as
//! `COMMIT` / `ROLLBACK`. Statements containing a configured marker fail.

#![allow(dead_code)]

use parking_lot::Mutex;
use rust_sql_pool::{
    Config, Connection, ConnectionPool, Database, DatabaseError, DatabaseType, DatabaseValue,
    PoolStats, Result, StatementOutcome,
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Execute(String, Vec<DatabaseValue>),
    Commit,
    Rollback,
}

#[derive(Default)]
pub struct Journal {
    calls: Mutex<Vec<Call>>,
    fail_on: Mutex<Option<String>>,
    acquired: Mutex<usize>,
    released: Mutex<usize>,
}

impl Journal {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Executed statement texts, in order
    pub fn statements(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Execute(sql, _) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn commits(&self) -> usize {
        self.calls.lock().iter().filter(|c| **c == Call::Commit).count()
    }

    pub fn rollbacks(&self) -> usize {
        self.calls.lock().iter().filter(|c| **c == Call::Rollback).count()
    }

    pub fn acquired(&self) -> usize {
        *self.acquired.lock()
    }

    pub fn released(&self) -> usize {
        *self.released.lock()
    }

    /// Make every statement containing `marker` fail
    pub fn fail_on(&self, marker: &str) {
        *self.fail_on.lock() = Some(marker.to_string());
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

pub struct ScriptedConnection {
    journal: Arc<Journal>,
    next_id: i64,
}

impl Connection for ScriptedConnection {
    fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> Result<StatementOutcome> {
        self.journal
            .calls
            .lock()
            .push(Call::Execute(sql.to_string(), params.to_vec()));

        if let Some(marker) = self.journal.fail_on.lock().as_deref() {
            if sql.contains(marker) {
                return Err(DatabaseError::query(format!("scripted failure: {}", sql)));
            }
        }
        if sql == "SELECT last_insert_id()" {
            return Ok(StatementOutcome::Rows {
                columns: vec!["last_insert_id()".to_string()],
                rows: vec![vec![DatabaseValue::Long(self.next_id)]],
            });
        }
        if sql.starts_with("SELECT") {
            return Ok(StatementOutcome::Rows {
                columns: vec!["id".to_string()],
                rows: vec![vec![DatabaseValue::Long(1)], vec![DatabaseValue::Long(2)]],
            });
        }
        if sql.starts_with("INSERT") {
            self.next_id += 1;
        }
        Ok(StatementOutcome::Affected(1))
    }

    fn commit(&mut self) -> Result<()> {
        self.journal.calls.lock().push(Call::Commit);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.journal.calls.lock().push(Call::Rollback);
        Ok(())
    }
}

pub struct ScriptedPool {
    journal: Arc<Journal>,
    database_type: DatabaseType,
}

impl ConnectionPool for ScriptedPool {
    fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    fn acquire(&self) -> Result<Box<dyn Connection>> {
        *self.journal.acquired.lock() += 1;
        Ok(Box::new(ScriptedConnection {
            journal: Arc::clone(&self.journal),
            next_id: 100,
        }))
    }

    fn release(&self, _conn: Box<dyn Connection>) {
        *self.journal.released.lock() += 1;
    }

    fn stats(&self) -> PoolStats {
        let acquired = self.acquired();
        let released = self.released();
        PoolStats {
            size: acquired,
            available: released,
            active: acquired - released,
            waiting: 0,
        }
    }
}

impl ScriptedPool {
    fn acquired(&self) -> usize {
        self.journal.acquired()
    }

    fn released(&self) -> usize {
        self.journal.released()
    }
}

/// A MySQL-flavored database backed by the scripted driver
pub fn scripted_database() -> (Database, Arc<Journal>) {
    scripted_database_with(DatabaseType::Mysql, Config::new(DatabaseType::Mysql))
}

pub fn scripted_database_with(
    database_type: DatabaseType,
    config: Config,
) -> (Database, Arc<Journal>) {
    let journal = Arc::new(Journal::default());
    let pool = ScriptedPool {
        journal: Arc::clone(&journal),
        database_type,
    };
    (Database::with_pool(Arc::new(pool), config), journal)
}
