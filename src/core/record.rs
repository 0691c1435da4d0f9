//! Result rows
//!
//! A [`Record`] is one row with both named and positional access. [`Rows`] holds a
//! fetched result and builds each `Record` as it is iterated.

use super::connection::StatementOutcome;
use super::error::{DatabaseError, Result};
use super::value::{DatabaseRow, DatabaseValue};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::ops::Index;
use std::sync::Arc;

/// One result row
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<DatabaseValue>,
}

impl Record {
    /// Build a record; `columns` is shared by every row of one result
    pub fn new(columns: Arc<[String]>, values: Vec<DatabaseValue>) -> Self {
        Self { columns, values }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of a column by name
    pub fn get(&self, name: &str) -> Option<&DatabaseValue> {
        self.position(name).and_then(|i| self.values.get(i))
    }

    /// Value of a column by name, or [`DatabaseError::ColumnNotFound`]
    pub fn field(&self, name: &str) -> Result<&DatabaseValue> {
        self.get(name)
            .ok_or_else(|| DatabaseError::ColumnNotFound(name.to_string()))
    }

    /// Value of a column by position
    pub fn get_index(&self, index: usize) -> Option<&DatabaseValue> {
        self.values.get(index)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[DatabaseValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(column, value)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatabaseValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Convert into a column -> value map
    pub fn into_map(self) -> DatabaseRow {
        self.columns
            .iter()
            .cloned()
            .zip(self.values)
            .collect()
    }
}

impl Index<&str> for Record {
    type Output = DatabaseValue;

    /// # Panics
    ///
    /// Panics if the column does not exist; use [`Record::get`] to check.
    fn index(&self, name: &str) -> &DatabaseValue {
        match self.get(name) {
            Some(v) => v,
            None => panic!("no column named {:?}", name),
        }
    }
}

impl Index<usize> for Record {
    type Output = DatabaseValue;

    fn index(&self, index: usize) -> &DatabaseValue {
        &self.values[index]
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// A fetched result, yielding one [`Record`] per row
#[derive(Debug, Clone)]
pub struct Rows {
    columns: Arc<[String]>,
    rows: std::vec::IntoIter<Vec<DatabaseValue>>,
}

impl Rows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<DatabaseValue>>) -> Self {
        Self {
            columns: columns.into(),
            rows: rows.into_iter(),
        }
    }

    /// A result with no columns and no rows
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The first remaining row, if any
    pub fn first(mut self) -> Option<Record> {
        self.next()
    }
}

impl Iterator for Rows {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.rows
            .next()
            .map(|values| Record::new(Arc::clone(&self.columns), values))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for Rows {}

/// Result of a raw statement
#[derive(Debug)]
pub enum Executed {
    /// The statement produced a result set
    Rows(Rows),
    /// The statement changed this many rows
    Affected(u64),
}

impl Executed {
    pub fn into_rows(self) -> Option<Rows> {
        match self {
            Executed::Rows(rows) => Some(rows),
            Executed::Affected(_) => None,
        }
    }

    pub fn affected(&self) -> Option<u64> {
        match self {
            Executed::Affected(n) => Some(*n),
            Executed::Rows(_) => None,
        }
    }
}

impl From<StatementOutcome> for Executed {
    fn from(outcome: StatementOutcome) -> Self {
        match outcome {
            StatementOutcome::Rows { columns, rows } => Executed::Rows(Rows::new(columns, rows)),
            StatementOutcome::Affected(n) => Executed::Affected(n),
        }
    }
}
