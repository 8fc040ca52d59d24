use crate::filter::{FilterValue, term_clause};

/// Arguments of a list request.
///
/// ```
/// use verge_api::ListParams;
///
/// let params = ListParams::new()
///     .filter("ram gt 2048")
///     .term("status", "running")
///     .limit(10);
/// assert_eq!(
///     params.synthesize_filter(Some("is_snapshot eq false")).as_deref(),
///     Some("(ram gt 2048) and is_snapshot eq false and status eq 'running'")
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    filter: Option<String>,
    fields: Option<Vec<String>>,
    limit: Option<u32>,
    offset: Option<u32>,
    sort: Option<String>,
    terms: Vec<(String, FilterValue)>,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw filter expression, combined with the scope and keyword terms.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        self.filter = (!filter.trim().is_empty()).then_some(filter);
        self
    }

    /// Explicit field projection replacing the resource's default fields.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Server-side sort, e.g. `-created` or `+orderid`.
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Keyword shorthand filter: `term("name", "web*")` becomes `name like 'web%'`.
    ///
    /// `None` values are ignored.
    pub fn term(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.terms.push((field.into(), value.into()));
        self
    }

    pub fn limit_value(&self) -> Option<u32> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u32> {
        self.offset
    }

    /// Combine the explicit filter, a scope filter and the keyword terms.
    ///
    /// Clauses are joined with `and` in that order. The explicit filter is
    /// parenthesised when anything else joins it.
    pub fn synthesize_filter(&self, scope: Option<&str>) -> Option<String> {
        let scope = scope.filter(|s| !s.trim().is_empty());
        let keywords = self
            .terms
            .iter()
            .filter_map(|(field, value)| term_clause(field, value));

        let rest: Vec<String> = scope.map(str::to_owned).into_iter().chain(keywords).collect();

        let mut clauses = Vec::with_capacity(rest.len() + 1);
        if let Some(explicit) = &self.filter {
            if rest.is_empty() {
                clauses.push(explicit.clone());
            } else {
                clauses.push(format!("({explicit})"));
            }
        }
        clauses.extend(rest);

        (!clauses.is_empty()).then(|| clauses.join(" and "))
    }

    /// Query-string pairs for a request against an endpoint.
    pub(crate) fn to_query(
        &self,
        scope: Option<&str>,
        default_fields: &[&str],
        default_sort: Option<&str>,
    ) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(filter) = self.synthesize_filter(scope) {
            query.push(("filter".to_owned(), filter));
        }
        match &self.fields {
            Some(fields) => query.push(("fields".to_owned(), fields.join(","))),
            None if !default_fields.is_empty() => {
                query.push(("fields".to_owned(), default_fields.join(",")));
            }
            None => {}
        }
        if let Some(limit) = self.limit {
            query.push(("limit".to_owned(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            query.push(("offset".to_owned(), offset.to_string()));
        }
        if let Some(sort) = self.sort.as_deref().or(default_sort) {
            query.push(("sort".to_owned(), sort.to_owned()));
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_clauses_means_no_filter() {
        assert_eq!(ListParams::new().synthesize_filter(None), None);
        assert_eq!(
            ListParams::new().term("name", None::<String>).synthesize_filter(Some("")),
            None
        );
    }

    #[test]
    fn test_explicit_filter_alone_is_not_parenthesised() {
        let params = ListParams::new().filter("a eq 1 or b eq 2");
        assert_eq!(params.synthesize_filter(None).as_deref(), Some("a eq 1 or b eq 2"));
    }

    #[test]
    fn test_clause_order_is_explicit_scope_keywords() {
        let params = ListParams::new()
            .term("name", "web")
            .filter("a eq 1 or b eq 2")
            .term("enabled", true);
        assert_eq!(
            params.synthesize_filter(Some("tenant eq 5")).as_deref(),
            Some("(a eq 1 or b eq 2) and tenant eq 5 and name eq 'web' and enabled eq true")
        );
    }

    #[test]
    fn test_scope_and_keywords_without_explicit() {
        let params = ListParams::new().term("type", vec!["internal", "external"]);
        assert_eq!(
            params.synthesize_filter(Some("owner eq 'tenants/3'")).as_deref(),
            Some("owner eq 'tenants/3' and type in ('internal', 'external')")
        );
    }

    #[test]
    fn test_query_uses_defaults() {
        let query = ListParams::new().limit(5).to_query(None, &["$key", "name"], Some("+orderid"));
        assert_eq!(
            query,
            vec![
                ("fields".to_owned(), "$key,name".to_owned()),
                ("limit".to_owned(), "5".to_owned()),
                ("sort".to_owned(), "+orderid".to_owned()),
            ]
        );
    }

    #[test]
    fn test_query_explicit_fields_and_sort_win() {
        let query = ListParams::new()
            .fields(["name"])
            .sort("-created")
            .offset(20)
            .to_query(Some("machine eq 3"), &["$key"], Some("+orderid"));
        assert_eq!(
            query,
            vec![
                ("filter".to_owned(), "machine eq 3".to_owned()),
                ("fields".to_owned(), "name".to_owned()),
                ("offset".to_owned(), "20".to_owned()),
                ("sort".to_owned(), "-created".to_owned()),
            ]
        );
    }
}
