//! Statement builders
//!
//! Builders for the statements issued by the CRUD operations. Each one renders to a
//! [`Query`], so every value ends up as a bound parameter.
//!
//! ```
//! use rust_sql_pool::{Fields, Select};
//!
//! let q = Select::new("users")
//!     .fields(vec!["id", "name"])
//!     .filter(Fields::new().with("age__gt", 30))
//!     .order_by("name")
//!     .page(2)
//!     .page_size(10)
//!     .build()
//!     .unwrap();
//! assert_eq!(
//!     q.text(),
//!     "SELECT id, name FROM users WHERE age > %s ORDER BY name LIMIT 10 OFFSET 10"
//! );
//! ```

use super::clause::{assignments, Clause, Fields, Operand};
use super::database_types::DatabaseType;
use super::error::{DatabaseError, Result};
use super::query::Query;
use std::str::FromStr;

/// How an insert treats existing rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Plain INSERT
    #[default]
    Insert,
    /// REPLACE: delete a conflicting row, then insert
    Replace,
    /// Skip rows that would violate a unique key
    InsertIgnore,
}

impl InsertMode {
    fn keyword(&self, dialect: DatabaseType) -> Result<&'static str> {
        match self {
            InsertMode::Insert => Ok("INSERT"),
            InsertMode::Replace => Ok("REPLACE"),
            InsertMode::InsertIgnore => dialect.insert_ignore_keyword(),
        }
    }
}

impl FromStr for InsertMode {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(InsertMode::Insert),
            "REPLACE" => Ok(InsertMode::Replace),
            "INSERT_IGNORE" => Ok(InsertMode::InsertIgnore),
            _ => Err(DatabaseError::composition(format!(
                "unsupported insert mode: {}",
                s
            ))),
        }
    }
}

fn column_list(fields: &Fields) -> Query {
    Query::join_with(fields.keys(), ", ", Some("("), Some(")"))
}

fn row_values(fields: &Fields) -> Result<Query> {
    let mut items = Vec::with_capacity(fields.len());
    for (column, operand) in fields.iter() {
        let item = match operand {
            Operand::Value(v) => Query::param(v.clone()),
            Operand::Raw(sql) => Query::literal(sql.as_str()),
            Operand::SubQuery(sub) => Query::join_with([sub], "", Some("("), Some(")")),
            Operand::List(_) => {
                return Err(DatabaseError::composition(format!(
                    "cannot insert a value list into {}",
                    column
                )));
            }
        };
        items.push(item);
    }
    Ok(Query::join_with(items, ", ", Some("("), Some(")")))
}

fn append_upsert(q: &mut Query, dialect: DatabaseType, on_duplicate: &Fields) -> Result<()> {
    if !on_duplicate.is_empty() {
        q.push_literal(format!(" {} ", dialect.upsert_clause()?));
        q.append(assignments(on_duplicate)?);
    }
    Ok(())
}

/// Single-row INSERT builder
#[derive(Debug, Clone)]
pub struct Insert {
    table: String,
    fields: Fields,
    mode: InsertMode,
    on_duplicate: Fields,
}

impl Insert {
    /// Create an insert of one row; columns are written in sorted order
    pub fn new(table: impl Into<String>, fields: Fields) -> Self {
        Self {
            table: table.into(),
            fields,
            mode: InsertMode::default(),
            on_duplicate: Fields::new(),
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: InsertMode) -> Self {
        self.mode = mode;
        self
    }

    /// Assignments applied when the row hits a duplicate key
    #[must_use]
    pub fn on_duplicate(mut self, assignments: Fields) -> Self {
        self.on_duplicate = assignments;
        self
    }

    /// Build the statement for `dialect`
    pub fn build(&self, dialect: DatabaseType) -> Result<Query> {
        let keyword = self.mode.keyword(dialect)?;
        if self.fields.is_empty() {
            if !self.on_duplicate.is_empty() {
                return Err(DatabaseError::composition(
                    "on-duplicate assignments require at least one inserted field",
                ));
            }
            return Ok(Query::literal(
                dialect.default_values_insert(keyword, &self.table),
            ));
        }

        let mut q = Query::literal(format!("{} INTO {} ", keyword, self.table));
        q.append(column_list(&self.fields));
        q.push_literal(" VALUES ");
        q.append(row_values(&self.fields)?);
        append_upsert(&mut q, dialect, &self.on_duplicate)?;
        Ok(q)
    }
}

/// Multi-row INSERT builder
#[derive(Debug, Clone)]
pub struct InsertMany {
    table: String,
    rows: Vec<Fields>,
    mode: InsertMode,
    on_duplicate: Fields,
}

impl InsertMany {
    pub fn new(table: impl Into<String>, rows: Vec<Fields>) -> Self {
        Self {
            table: table.into(),
            rows,
            mode: InsertMode::default(),
            on_duplicate: Fields::new(),
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: InsertMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn on_duplicate(mut self, assignments: Fields) -> Self {
        self.on_duplicate = assignments;
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check that there is at least one row and every row has the same keys
    pub fn validate(&self) -> Result<()> {
        let first = self
            .rows
            .first()
            .ok_or_else(|| DatabaseError::validation("no rows to insert"))?;
        if first.is_empty() {
            return Err(DatabaseError::validation("rows have no fields"));
        }
        if self.rows.iter().any(|row| !row.keys().eq(first.keys())) {
            return Err(DatabaseError::validation(
                "not all rows have the same keys",
            ));
        }
        Ok(())
    }

    pub fn build(&self, dialect: DatabaseType) -> Result<Query> {
        self.validate()?;
        let keyword = self.mode.keyword(dialect)?;

        let mut q = Query::literal(format!("{} INTO {} ", keyword, self.table));
        q.append(column_list(&self.rows[0]));
        q.push_literal(" VALUES ");
        let mut values = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            values.push(row_values(row)?);
        }
        Query::join_into(&mut q, values, ", ", None, None);
        append_upsert(&mut q, dialect, &self.on_duplicate)?;
        Ok(q)
    }
}

/// UPDATE builder
#[derive(Debug, Clone)]
pub struct Update {
    table: String,
    assignments: Fields,
    filter: Option<Clause>,
}

impl Update {
    pub fn new(table: impl Into<String>, assignments: Fields) -> Self {
        Self {
            table: table.into(),
            assignments,
            filter: None,
        }
    }

    /// Restrict the rows updated. Without a filter every row is updated.
    #[must_use]
    pub fn filter(mut self, clause: impl Into<Clause>) -> Self {
        self.filter = Some(clause.into());
        self
    }

    pub fn build(&self) -> Result<Query> {
        let mut q = Query::literal(format!("UPDATE {} SET ", self.table));
        q.append(assignments(&self.assignments)?);
        append_filter(&mut q, self.filter.as_ref())?;
        Ok(q)
    }
}

/// DELETE builder
#[derive(Debug, Clone)]
pub struct Delete {
    table: String,
    filter: Option<Clause>,
    using: Vec<String>,
}

impl Delete {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            using: Vec::new(),
        }
    }

    /// Restrict the rows deleted. Without a filter every row is deleted.
    #[must_use]
    pub fn filter(mut self, clause: impl Into<Clause>) -> Self {
        self.filter = Some(clause.into());
        self
    }

    /// Tables referenced by the filter, rendered as `USING t1, t2`
    #[must_use]
    pub fn using<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.using = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(&self) -> Result<Query> {
        let mut q = Query::literal(format!("DELETE FROM {}", self.table));
        if !self.using.is_empty() {
            q.push_literal(format!(" USING {}", self.using.join(", ")));
        }
        append_filter(&mut q, self.filter.as_ref())?;
        Ok(q)
    }
}

fn append_filter(q: &mut Query, filter: Option<&Clause>) -> Result<()> {
    if let Some(cond) = filter.map(Clause::render_condition).transpose()?.flatten() {
        q.push_literal(" WHERE ");
        q.append(cond);
    }
    Ok(())
}

/// SELECT builder with optional pagination
#[derive(Debug, Clone)]
pub struct Select {
    tables: Vec<String>,
    fields: Clause,
    filter: Option<Clause>,
    group_by: Option<Clause>,
    having: Option<Clause>,
    order_by: Option<Clause>,
    page: u64,
    page_size: u64,
}

impl Select {
    /// Default number of rows per page
    pub const DEFAULT_PAGE_SIZE: u64 = 10;

    pub fn new(table: impl Into<String>) -> Self {
        Self {
            tables: vec![table.into()],
            fields: Clause::Literal("*".to_string()),
            filter: None,
            group_by: None,
            having: None,
            order_by: None,
            page: 0,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    /// Select from several tables, replacing the current list
    #[must_use]
    pub fn tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Selected expressions; defaults to `*`
    #[must_use]
    pub fn fields(mut self, fields: impl Into<Clause>) -> Self {
        self.fields = fields.into();
        self
    }

    #[must_use]
    pub fn filter(mut self, clause: impl Into<Clause>) -> Self {
        self.filter = Some(clause.into());
        self
    }

    #[must_use]
    pub fn group_by(mut self, clause: impl Into<Clause>) -> Self {
        self.group_by = Some(clause.into());
        self
    }

    #[must_use]
    pub fn having(mut self, clause: impl Into<Clause>) -> Self {
        self.having = Some(clause.into());
        self
    }

    #[must_use]
    pub fn order_by(mut self, clause: impl Into<Clause>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    /// 1-based page number; 0 returns every row
    #[must_use]
    pub fn page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }

    #[must_use]
    pub fn page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Build the query. Clauses are emitted in SQL order and skipped when empty.
    pub fn build(&self) -> Result<Query> {
        if self.tables.is_empty() {
            return Err(DatabaseError::composition("no table to select from"));
        }

        let mut parts: Vec<Query> = Vec::new();
        let fields = self
            .fields
            .render_list()?
            .unwrap_or_else(|| Query::literal("*"));
        parts.push(fields.prepended("SELECT "));
        parts.push(Query::literal(format!("FROM {}", self.tables.join(", "))));

        let clauses = [
            ("WHERE ", &self.filter, true),
            ("GROUP BY ", &self.group_by, false),
            ("HAVING ", &self.having, true),
            ("ORDER BY ", &self.order_by, false),
        ];
        for (keyword, clause, is_condition) in clauses {
            let rendered = match clause {
                Some(c) if is_condition => c.render_condition()?,
                Some(c) => c.render_list()?,
                None => None,
            };
            if let Some(q) = rendered {
                parts.push(q.prepended(keyword));
            }
        }

        if self.page > 0 {
            let offset = (self.page - 1).saturating_mul(self.page_size);
            parts.push(Query::literal(format!("LIMIT {}", self.page_size)));
            parts.push(Query::literal(format!("OFFSET {}", offset)));
        }

        Ok(Query::join(parts, " "))
    }
}
