//! Parameterized query composition
//!
//! A [`Query`] is an ordered list of [`Fragment`]s: literal SQL text and bound
//! [`Param`]s. Values never enter the SQL text; [`Query::text`] renders one `%s`
//! marker per parameter and [`Query::values`] returns the values in the same order.
//!
//! ```
//! use rust_sql_pool::{Param, Query};
//!
//! let mut q = Query::literal("SELECT * FROM users WHERE id = ");
//! q.push_param(Param::new(7));
//! q.append(" AND name LIKE 'a%'");
//!
//! assert_eq!(q.text(), "SELECT * FROM users WHERE id = %s AND name LIKE 'a%%'");
//! assert_eq!(q.debug_string(), "SELECT * FROM users WHERE id = 7 AND name LIKE 'a%'");
//! ```

use super::value::{sqlify, DatabaseValue};
use std::borrow::Cow;
use std::fmt;

/// Positional marker rendered for every bound parameter
pub const PLACEHOLDER: &str = "%s";

/// One bound scalar value
#[derive(Debug, Clone, PartialEq)]
pub struct Param(DatabaseValue);

impl Param {
    /// Bind a value
    pub fn new(value: impl Into<DatabaseValue>) -> Self {
        Param(value.into())
    }

    /// The bound value
    pub fn value(&self) -> &DatabaseValue {
        &self.0
    }

    pub fn into_value(self) -> DatabaseValue {
        self.0
    }

    /// The marker this parameter renders as
    pub fn marker(&self) -> &'static str {
        PLACEHOLDER
    }
}

/// An atomic piece of a query
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// Literal SQL text, stored unescaped
    Literal(String),
    /// A bound parameter
    Param(Param),
}

/// Composable SQL statement with bound parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    fragments: Vec<Fragment>,
}

impl Query {
    /// Create an empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// A query consisting of a single literal
    pub fn literal(text: impl Into<String>) -> Self {
        let mut q = Self::new();
        q.push_literal(text);
        q
    }

    /// A query consisting of a single bound parameter
    pub fn param(value: impl Into<DatabaseValue>) -> Self {
        let mut q = Self::new();
        q.push_param(Param::new(value));
        q
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// True if the query has no fragments or only empty literals
    pub fn is_empty(&self) -> bool {
        self.fragments.iter().all(|f| match f {
            Fragment::Literal(s) => s.is_empty(),
            Fragment::Param(_) => false,
        })
    }

    pub fn push_literal(&mut self, text: impl Into<String>) -> &mut Self {
        let text = text.into();
        if !text.is_empty() {
            self.fragments.push(Fragment::Literal(text));
        }
        self
    }

    pub fn push_param(&mut self, param: Param) -> &mut Self {
        self.fragments.push(Fragment::Param(param));
        self
    }

    /// Append another query (or text, or parameter) in place
    pub fn append(&mut self, other: impl Into<Query>) -> &mut Self {
        self.fragments.extend(other.into().fragments);
        self
    }

    /// A new query with `other` appended, leaving `self` untouched
    pub fn concatenated(&self, other: impl Into<Query>) -> Query {
        let mut q = self.clone();
        q.append(other);
        q
    }

    /// A new query with `other` placed in front, leaving `self` untouched
    pub fn prepended(&self, other: impl Into<Query>) -> Query {
        let mut q = other.into();
        q.fragments.extend(self.fragments.iter().cloned());
        q
    }

    /// Join items with `sep` into a new query
    pub fn join<I, T>(items: I, sep: &str) -> Query
    where
        I: IntoIterator<Item = T>,
        T: Into<Query>,
    {
        Self::join_with(items, sep, None, None)
    }

    /// Join items with `sep`, wrapping the result in `prefix` and `suffix`
    pub fn join_with<I, T>(
        items: I,
        sep: &str,
        prefix: Option<&str>,
        suffix: Option<&str>,
    ) -> Query
    where
        I: IntoIterator<Item = T>,
        T: Into<Query>,
    {
        let mut target = Query::new();
        Self::join_into(&mut target, items, sep, prefix, suffix);
        target
    }

    /// Join items into an existing query
    pub fn join_into<I, T>(
        target: &mut Query,
        items: I,
        sep: &str,
        prefix: Option<&str>,
        suffix: Option<&str>,
    ) where
        I: IntoIterator<Item = T>,
        T: Into<Query>,
    {
        if let Some(prefix) = prefix {
            target.push_literal(prefix);
        }
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                target.push_literal(sep);
            }
            target.append(item);
        }
        if let Some(suffix) = suffix {
            target.push_literal(suffix);
        }
    }

    /// Render the statement text with a `%s` marker per parameter.
    ///
    /// A lone `%` in literal text is doubled; an existing `%%` is kept.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Literal(s) => out.push_str(&escape_literal(s)),
                Fragment::Param(p) => out.push_str(p.marker()),
            }
        }
        out
    }

    /// Bound values in placeholder order
    pub fn values(&self) -> Vec<DatabaseValue> {
        self.fragments
            .iter()
            .filter_map(|f| match f {
                Fragment::Param(p) => Some(p.value().clone()),
                Fragment::Literal(_) => None,
            })
            .collect()
    }

    pub fn placeholder_count(&self) -> usize {
        self.fragments
            .iter()
            .filter(|f| matches!(f, Fragment::Param(_)))
            .count()
    }

    /// Split into rendered text and values
    pub fn into_parts(self) -> (String, Vec<DatabaseValue>) {
        let text = self.text();
        let values = self
            .fragments
            .into_iter()
            .filter_map(|f| match f {
                Fragment::Param(p) => Some(p.into_value()),
                Fragment::Literal(_) => None,
            })
            .collect();
        (text, values)
    }

    /// Render with values inlined. For logs and error messages only, never execution.
    pub fn debug_string(&self) -> String {
        let values = self.values();
        let mut values = values.iter();
        substitute(&self.text(), || {
            values
                .next()
                .map(sqlify)
                .unwrap_or_else(|| PLACEHOLDER.to_string())
        })
        .into_owned()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.debug_string())
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::literal(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::literal(text)
    }
}

impl From<Param> for Query {
    fn from(param: Param) -> Self {
        let mut q = Query::new();
        q.push_param(param);
        q
    }
}

impl From<&Query> for Query {
    fn from(q: &Query) -> Self {
        q.clone()
    }
}

fn escape_literal(text: &str) -> Cow<'_, str> {
    if !text.contains('%') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 2);
    let mut rest = text;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        out.push_str("%%");
        let tail = &rest[pos..];
        rest = if tail.starts_with("%%") { &tail[2..] } else { &tail[1..] };
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Walk rendered text, replacing each `%s` with `param()` and each `%%` with `%`.
fn substitute<F>(text: &str, mut param: F) -> Cow<'_, str>
where
    F: FnMut() -> String,
{
    if !text.contains('%') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with("%%") {
            out.push('%');
            rest = &tail[2..];
        } else if tail.starts_with(PLACEHOLDER) {
            out.push_str(&param());
            rest = &tail[PLACEHOLDER.len()..];
        } else {
            out.push('%');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Translate rendered `%s` text to `?` positional markers.
pub fn to_qmark(text: &str) -> Cow<'_, str> {
    substitute(text, || "?".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_param() {
        let mut q = Query::literal("SELECT * FROM t WHERE a = ");
        q.push_param(Param::new(1));
        assert_eq!(q.text(), "SELECT * FROM t WHERE a = %s");
        assert_eq!(q.values(), vec![DatabaseValue::Int(1)]);
        assert_eq!(q.placeholder_count(), 1);
    }

    #[test]
    fn test_escape() {
        let q = Query::literal("LIKE 'a%'");
        assert_eq!(q.text(), "LIKE 'a%%'");
        assert_eq!(q.debug_string(), "LIKE 'a%'");

        let q = Query::literal("already %% escaped");
        assert_eq!(q.text(), "already %% escaped");
    }

    #[test]
    fn test_pure_and_mutating_composition() {
        let base = Query::literal("a");
        let joined = base.concatenated(" b");
        assert_eq!(base.text(), "a");
        assert_eq!(joined.text(), "a b");

        let front = base.prepended("x ");
        assert_eq!(front.text(), "x a");

        let mut m = Query::literal("a");
        m.append(Param::new("v"));
        assert_eq!(m.text(), "a%s");
    }

    #[test]
    fn test_join() {
        let items = vec![Query::param(1), Query::param(2), Query::param(3)];
        let q = Query::join_with(items, ", ", Some("("), Some(")"));
        assert_eq!(q.text(), "(%s, %s, %s)");
        assert_eq!(q.debug_string(), "(1, 2, 3)");

        let mut target = Query::literal("IN ");
        Query::join_into(&mut target, ["a", "b"], "|", None, None);
        assert_eq!(target.text(), "IN a|b");

        assert!(Query::join(Vec::<Query>::new(), ", ").is_empty());
    }

    #[test]
    fn test_debug_string() {
        let mut q = Query::literal("UPDATE t SET name = ");
        q.push_param(Param::new("o'neil"));
        q.append(" WHERE id = ");
        q.push_param(Param::new(DatabaseValue::Null));
        assert_eq!(
            q.debug_string(),
            "UPDATE t SET name = 'o''neil' WHERE id = NULL"
        );
        assert_eq!(q.to_string(), q.debug_string());
    }

    #[test]
    fn test_to_qmark() {
        assert_eq!(to_qmark("a = %s AND b LIKE 'x%%'"), "a = ? AND b LIKE 'x%'");
        assert!(matches!(to_qmark("SELECT 1"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_into_parts() {
        let q = Query::literal("x = ").concatenated(Param::new(5i64));
        let (text, values) = q.into_parts();
        assert_eq!(text, "x = %s");
        assert_eq!(values, vec![DatabaseValue::Long(5)]);
    }
}
