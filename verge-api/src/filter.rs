//! OData-style filter expressions.
//!
//! The API accepts a `filter` query parameter written in a small grammar:
//! `field op value` clauses joined by `and` / `or`. Nothing is parsed or
//! validated here; expressions are assembled as strings.
//!
//! ```
//! use verge_api::filter::Filter;
//!
//! let filter = Filter::new().eq("status", "running").like("name", "web*");
//! assert_eq!(filter.to_string(), "status eq 'running' and name like 'web%'");
//! ```

use std::fmt;

/// A value on the right-hand side of a filter clause.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Render the value as a filter literal.
    ///
    /// Strings are single-quoted with embedded quotes doubled. Lists render as
    /// a parenthesised, comma-separated group.
    pub fn literal(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Bool(b) => b.to_string(),
            Self::Int(n) => n.to_string(),
            Self::UInt(n) => n.to_string(),
            Self::Float(n) => n.to_string(),
            Self::Str(s) => quote(s),
            Self::List(values) => {
                let items: Vec<String> = values.iter().map(Self::literal).collect();
                format!("({})", items.join(", "))
            }
        }
    }

    fn is_wildcard(&self) -> bool {
        matches!(self, Self::Str(s) if s.contains('*') || s.contains('?'))
    }
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn wildcard_pattern(pattern: &str) -> String {
    pattern.replace('*', "%").replace('?', "_")
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for FilterValue {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for FilterValue {
    fn from(value: u32) -> Self {
        Self::UInt(value.into())
    }
}

impl From<u64> for FilterValue {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// =============================================================================
// Filter builder
// =============================================================================

/// Fluent builder for filter expressions.
///
/// Consecutive conditions are joined with an implicit `and`; call [`or`](Self::or)
/// to join the next one with `or` instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    parts: Vec<String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, field: &str, op: &str, literal: String) -> Self {
        self.join(format!("{field} {op} {literal}"))
    }

    fn join(mut self, clause: String) -> Self {
        if matches!(self.parts.last().map(String::as_str), Some(last) if last != "and" && last != "or")
        {
            self.parts.push("and".to_owned());
        }
        self.parts.push(clause);
        self
    }

    pub fn eq(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.push(field, "eq", value.into().literal())
    }

    pub fn ne(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.push(field, "ne", value.into().literal())
    }

    pub fn lt(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.push(field, "lt", value.into().literal())
    }

    pub fn gt(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.push(field, "gt", value.into().literal())
    }

    pub fn le(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.push(field, "le", value.into().literal())
    }

    pub fn ge(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.push(field, "ge", value.into().literal())
    }

    /// Substring match (`ct`).
    pub fn contains(self, field: &str, value: &str) -> Self {
        self.push(field, "ct", quote(value))
    }

    /// Pattern match; `*` and `?` become `%` and `_`.
    pub fn like(self, field: &str, pattern: &str) -> Self {
        self.push(field, "like", quote(&wildcard_pattern(pattern)))
    }

    /// Membership in a set of values.
    pub fn is_in<T: Into<FilterValue>>(self, field: &str, values: Vec<T>) -> Self {
        self.push(field, "in", FilterValue::from(values).literal())
    }

    /// Join the next condition with `or`.
    pub fn or(mut self) -> Self {
        if !self.parts.is_empty() {
            self.parts.push("or".to_owned());
        }
        self
    }

    /// Append a pre-built clause verbatim.
    pub fn raw(self, clause: impl Into<String>) -> Self {
        self.join(clause.into())
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: &[String] = match self.parts.last().map(String::as_str) {
            Some("and" | "or") => &self.parts[..self.parts.len() - 1],
            _ => &self.parts,
        };
        f.write_str(&parts.join(" "))
    }
}

impl From<Filter> for String {
    fn from(filter: Filter) -> Self {
        filter.to_string()
    }
}

/// Build an `and`-joined filter from `(field, value)` terms.
///
/// `Null` values are skipped, lists become `in`, strings containing `*` or `?`
/// become `like`, everything else is an equality.
pub fn build_filter<'a, I>(terms: I) -> String
where
    I: IntoIterator<Item = &'a (String, FilterValue)>,
{
    terms
        .into_iter()
        .filter_map(|(field, value)| term_clause(field, value))
        .collect::<Vec<_>>()
        .join(" and ")
}

pub(crate) fn term_clause(field: &str, value: &FilterValue) -> Option<String> {
    match value {
        FilterValue::Null => None,
        FilterValue::List(_) => Some(format!("{field} in {}", value.literal())),
        FilterValue::Str(s) if value.is_wildcard() => {
            Some(format!("{field} like {}", quote(&wildcard_pattern(s))))
        }
        _ => Some(format!("{field} eq {}", value.literal())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals() {
        assert_eq!(FilterValue::Null.literal(), "null");
        assert_eq!(FilterValue::from(true).literal(), "true");
        assert_eq!(FilterValue::from(42u64).literal(), "42");
        assert_eq!(FilterValue::from(-3i64).literal(), "-3");
        assert_eq!(FilterValue::from(1.5).literal(), "1.5");
        assert_eq!(FilterValue::from("it's").literal(), "'it''s'");
        assert_eq!(FilterValue::from(vec!["a", "b"]).literal(), "('a', 'b')");
        assert_eq!(FilterValue::from(None::<u64>), FilterValue::Null);
    }

    #[test]
    fn test_builder_joins_with_and() {
        let filter = Filter::new()
            .eq("status", "running")
            .gt("ram", 1024u64)
            .contains("description", "web");
        assert_eq!(
            filter.to_string(),
            "status eq 'running' and ram gt 1024 and description ct 'web'"
        );
    }

    #[test]
    fn test_builder_or_and_in() {
        let filter = Filter::new()
            .eq("type", "internal")
            .or()
            .is_in("type", vec!["external", "dmz"]);
        assert_eq!(
            filter.to_string(),
            "type eq 'internal' or type in ('external', 'dmz')"
        );
    }

    #[test]
    fn test_dangling_connector_is_dropped() {
        let filter = Filter::new().eq("a", 1i64).or();
        assert_eq!(filter.to_string(), "a eq 1");
        assert!(Filter::new().or().is_empty());
    }

    #[test]
    fn test_like_translates_wildcards() {
        let filter = Filter::new().like("name", "web-?-*");
        assert_eq!(filter.to_string(), "name like 'web-_-%'");
    }

    #[test]
    fn test_build_filter_terms() {
        let terms = vec![
            ("status".to_owned(), FilterValue::from("running")),
            ("note".to_owned(), FilterValue::Null),
            ("name".to_owned(), FilterValue::from("web*")),
            ("os_family".to_owned(), FilterValue::from(vec!["linux", "windows"])),
            ("enabled".to_owned(), FilterValue::from(true)),
        ];
        assert_eq!(
            build_filter(&terms),
            "status eq 'running' and name like 'web%' and os_family in ('linux', 'windows') and enabled eq true"
        );
    }

    #[test]
    fn test_build_filter_empty() {
        let terms: Vec<(String, FilterValue)> = vec![("x".into(), FilterValue::Null)];
        assert_eq!(build_filter(&terms), "");
    }
}
