//! Clause builders
//!
//! Structured inputs turned into [`Query`] fragments: `WHERE` conditions from a
//! field map with `__<op>` key suffixes, `SET` assignment lists, OR groups and
//! parenthesized value lists.
//!
//! ```
//! use rust_sql_pool::{where_clause, Fields};
//!
//! let filter = Fields::new().with("age__gte", 18).with("name", "joe");
//! let q = where_clause(&filter).unwrap().unwrap();
//! assert_eq!(q.text(), "age >= %s AND name = %s");
//! ```

use super::error::{DatabaseError, Result};
use super::query::{Param, Query};
use super::value::DatabaseValue;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Comparison operators selected by a `__<op>` key suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Gte,
    /// Equal to (=), the default
    Eq,
    /// Not equal to (!=)
    Neq,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Lte,
    /// IN set membership
    In,
    /// NOT IN
    Nin,
    /// LIKE pattern matching
    Like,
    /// REGEXP pattern matching
    Regexp,
    /// Raw SQL placed after the column, nothing bound
    Sql,
}

impl Operator {
    fn as_sql(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Eq => "=",
            Operator::Neq => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::In => "IN",
            Operator::Nin => "NOT IN",
            Operator::Like => "LIKE",
            Operator::Regexp => "REGEXP",
            Operator::Sql => "",
        }
    }

    /// Split `column__op` into the column and its operator; no suffix means `eq`
    pub fn split_key(key: &str) -> Result<(&str, Operator)> {
        match key.rsplit_once("__") {
            Some((column, op)) => Ok((column, op.parse()?)),
            None => Ok((key, Operator::Eq)),
        }
    }
}

impl FromStr for Operator {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gt" => Ok(Operator::Gt),
            "gte" => Ok(Operator::Gte),
            "eq" => Ok(Operator::Eq),
            "neq" => Ok(Operator::Neq),
            "lt" => Ok(Operator::Lt),
            "lte" => Ok(Operator::Lte),
            "in" => Ok(Operator::In),
            "nin" => Ok(Operator::Nin),
            "like" => Ok(Operator::Like),
            "regexp" => Ok(Operator::Regexp),
            "sql" => Ok(Operator::Sql),
            _ => Err(DatabaseError::composition(format!(
                "unsupported operator: {}",
                s
            ))),
        }
    }
}

/// Right-hand side of a condition or assignment
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A single bound value
    Value(DatabaseValue),
    /// A list of bound values, for `in` / `nin`
    List(Vec<DatabaseValue>),
    /// Literal SQL text, never bound
    Raw(String),
    /// A nested query, rendered in parentheses
    SubQuery(Query),
}

/// Mark text as literal SQL, e.g. `raw("hits + 1")` in an assignment
pub fn raw(sql: impl Into<String>) -> Operand {
    Operand::Raw(sql.into())
}

macro_rules! operand_from_value {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Operand {
                fn from(v: $t) -> Self {
                    Operand::Value(v.into())
                }
            }
        )*
    };
}

operand_from_value!(
    DatabaseValue,
    bool,
    i32,
    i64,
    u32,
    f32,
    f64,
    String,
    &str,
    NaiveDateTime,
    DateTime<Utc>,
);

impl<T: Into<DatabaseValue>> From<Option<T>> for Operand {
    fn from(v: Option<T>) -> Self {
        Operand::Value(v.into())
    }
}

impl<T: Into<DatabaseValue>> From<Vec<T>> for Operand {
    fn from(v: Vec<T>) -> Self {
        Operand::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<DatabaseValue>, const N: usize> From<[T; N]> for Operand {
    fn from(v: [T; N]) -> Self {
        Operand::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<Query> for Operand {
    fn from(q: Query) -> Self {
        Operand::SubQuery(q)
    }
}

/// Field map with keys kept in sorted order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, Operand>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, builder style
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Operand>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Operand> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Operand)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Operand>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

/// Tagged input for a SELECT clause position
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Literal SQL, e.g. a column list or `created DESC`
    Literal(String),
    /// A single bound value
    Bound(Param),
    /// Conditions from a field map
    Map(Fields),
    /// Several clauses; AND-joined in condition positions, comma-joined elsewhere
    Sequence(Vec<Clause>),
    /// A prebuilt query
    SubQuery(Query),
}

impl Clause {
    /// Render in a condition position (WHERE, HAVING)
    pub fn render_condition(&self) -> Result<Option<Query>> {
        self.render(" AND ")
    }

    /// Render in a list position (SELECT, FROM, GROUP BY, ORDER BY)
    pub fn render_list(&self) -> Result<Option<Query>> {
        self.render(", ")
    }

    fn render(&self, sep: &str) -> Result<Option<Query>> {
        match self {
            Clause::Literal(s) if s.is_empty() => Ok(None),
            Clause::Literal(s) => Ok(Some(Query::literal(s.as_str()))),
            Clause::Bound(p) => Ok(Some(Query::from(p.clone()))),
            Clause::Map(fields) => where_clause(fields),
            Clause::Sequence(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(q) = item.render(sep)? {
                        parts.push(q);
                    }
                }
                if parts.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Query::join(parts, sep)))
                }
            }
            Clause::SubQuery(q) if q.is_empty() => Ok(None),
            Clause::SubQuery(q) => Ok(Some(q.clone())),
        }
    }
}

impl From<&str> for Clause {
    fn from(s: &str) -> Self {
        Clause::Literal(s.to_string())
    }
}

impl From<String> for Clause {
    fn from(s: String) -> Self {
        Clause::Literal(s)
    }
}

impl From<Param> for Clause {
    fn from(p: Param) -> Self {
        Clause::Bound(p)
    }
}

impl From<Fields> for Clause {
    fn from(f: Fields) -> Self {
        Clause::Map(f)
    }
}

impl From<Query> for Clause {
    fn from(q: Query) -> Self {
        Clause::SubQuery(q)
    }
}

impl<T: Into<Clause>> From<Vec<T>> for Clause {
    fn from(items: Vec<T>) -> Self {
        Clause::Sequence(items.into_iter().map(Into::into).collect())
    }
}

fn condition(column: &str, op: Operator, operand: &Operand) -> Result<Query> {
    let mut q = Query::literal(column);
    match (op, operand) {
        (Operator::Sql, Operand::Raw(sql))
        | (Operator::Sql, Operand::Value(DatabaseValue::String(sql))) => {
            q.push_literal(format!(" {}", sql));
        }
        (Operator::Sql, _) => {
            return Err(DatabaseError::composition(format!(
                "operator sql on {} requires literal SQL text",
                column
            )));
        }
        (Operator::Eq, Operand::Value(DatabaseValue::Null)) => {
            q.push_literal(" IS NULL");
        }
        (Operator::Neq, Operand::Value(DatabaseValue::Null)) => {
            q.push_literal(" IS NOT NULL");
        }
        (Operator::In | Operator::Nin, Operand::List(values)) => {
            if values.is_empty() {
                return Err(DatabaseError::composition(format!(
                    "empty value list for {}",
                    column
                )));
            }
            q.push_literal(format!(" {} ", op.as_sql()));
            q.append(value_list(values.iter().cloned()));
        }
        (Operator::In | Operator::Nin, Operand::Value(v)) => {
            q.push_literal(format!(" {} ", op.as_sql()));
            q.append(value_list([v.clone()]));
        }
        (_, Operand::List(_)) => {
            return Err(DatabaseError::composition(format!(
                "a value list on {} requires the in or nin operator",
                column
            )));
        }
        (_, Operand::Value(v)) => {
            q.push_literal(format!(" {} ", op.as_sql()));
            q.push_param(Param::new(v.clone()));
        }
        (_, Operand::Raw(sql)) => {
            q.push_literal(format!(" {} {}", op.as_sql(), sql));
        }
        (_, Operand::SubQuery(sub)) => {
            q.push_literal(format!(" {} (", op.as_sql()));
            q.append(sub);
            q.push_literal(")");
        }
    }
    Ok(q)
}

/// AND-joined conditions for a field map, `None` when the map is empty.
///
/// Keys render in sorted order, so equal maps always produce equal SQL.
pub fn where_clause(fields: &Fields) -> Result<Option<Query>> {
    if fields.is_empty() {
        return Ok(None);
    }
    let mut parts = Vec::with_capacity(fields.len());
    for (key, operand) in fields.iter() {
        let (column, op) = Operator::split_key(key)?;
        parts.push(condition(column, op, operand)?);
    }
    Ok(Some(Query::join(parts, " AND ")))
}

/// Comma-joined `column = value` list for SET clauses.
///
/// A [`raw`] operand is written as SQL text instead of being bound.
pub fn assignments(fields: &Fields) -> Result<Query> {
    if fields.is_empty() {
        return Err(DatabaseError::composition("no fields to assign"));
    }
    let mut parts = Vec::with_capacity(fields.len());
    for (column, operand) in fields.iter() {
        let mut q = Query::literal(format!("{} = ", column));
        match operand {
            Operand::Value(v) => {
                q.push_param(Param::new(v.clone()));
            }
            Operand::Raw(sql) => {
                q.push_literal(sql.as_str());
            }
            Operand::SubQuery(sub) => {
                q.push_literal("(");
                q.append(sub);
                q.push_literal(")");
            }
            Operand::List(_) => {
                return Err(DatabaseError::composition(format!(
                    "cannot assign a value list to {}",
                    column
                )));
            }
        }
        parts.push(q);
    }
    Ok(Query::join(parts, ", "))
}

/// OR together groups of conditions, wrapped in parentheses
pub fn or_group<I, C>(groups: I) -> Result<Option<Query>>
where
    I: IntoIterator<Item = C>,
    C: Into<Clause>,
{
    let mut parts = Vec::new();
    for group in groups {
        if let Some(q) = group.into().render_condition()? {
            parts.push(q);
        }
    }
    if parts.is_empty() {
        return Ok(None);
    }
    Ok(Some(Query::join_with(parts, " OR ", Some("("), Some(")"))))
}

/// `(%s, %s, ...)` with one bound parameter per value
pub fn value_list<I, V>(values: I) -> Query
where
    I: IntoIterator<Item = V>,
    V: Into<DatabaseValue>,
{
    Query::join_with(
        values.into_iter().map(|v| Param::new(v)),
        ", ",
        Some("("),
        Some(")"),
    )
}
