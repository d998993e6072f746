//! Query options and URL building for the REST API v2 dialect.
//!
//! Callers describe a read with [`QueryOptions`]; [`build_api_url`] turns it
//! into the operators understood by the v2 endpoints:
//!
//! | Option | Operator |
//! |---|---|
//! | filter | `q=<rsql>` |
//! | attributes + expand | `attrs=a,b,c(*)` |
//! | page size | `num=<n>` (omitted when 100) |
//! | start | `start=<n>` |
//! | sort | `sort=<column>[:<order>]` |

use std::fmt;
use std::str::FromStr;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};

use crate::error::{MolgenisError, Result};

/// Page size the server uses when `num` is absent.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Characters that would change the meaning of a query string. RSQL
/// operators (`=`, `;`, `,`, parentheses) stay readable.
const OPERATOR_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+');

fn encode(value: &str) -> String {
    utf8_percent_encode(value, OPERATOR_VALUE).to_string()
}

/// An RSQL filter expression, passed through verbatim as `q`.
///
/// Structured (list or object) filters belong to the retired v1 query syntax
/// and are rejected when converting from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Filter(String);

impl Filter {
    /// Create a filter from an RSQL expression.
    pub fn rsql(expression: impl Into<String>) -> Self {
        Self(expression.into())
    }

    /// The RSQL expression.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Filter {
    fn from(value: &str) -> Self {
        Self::rsql(value)
    }
}

impl From<String> for Filter {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl TryFrom<serde_json::Value> for Filter {
    type Error = MolgenisError;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        match value {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            Value::Bool(b) => Ok(Self(b.to_string())),
            Value::Null => Err(MolgenisError::InvalidQueryFormat("null".to_string())),
            structured @ (Value::Array(_) | Value::Object(_)) => {
                Err(MolgenisError::InvalidQueryFormat(structured.to_string()))
            }
        }
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::try_from(value).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = MolgenisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(MolgenisError::InvalidQueryFormat(format!(
                "unknown sort order '{s}'"
            ))),
        }
    }
}

/// Sort column with an optional direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub column: String,
    #[serde(default)]
    pub order: Option<SortOrder>,
}

impl Sort {
    /// Sort on a column using the server's default direction.
    pub fn by(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            order: None,
        }
    }

    /// Sort on a column in the given direction.
    pub fn with_order(column: impl Into<String>, order: SortOrder) -> Self {
        Self {
            column: column.into(),
            order: Some(order),
        }
    }

    fn operator(&self) -> Option<String> {
        if self.column.is_empty() {
            return None;
        }
        Some(match self.order {
            Some(order) => format!("sort={}:{}", encode(&self.column), order),
            None => format!("sort={}", encode(&self.column)),
        })
    }
}

/// Options for a read request.
///
/// All fields are optional. `attributes` and `expand` hold attribute names;
/// the `with_*` helpers accept comma-separated strings.
///
/// # Example
///
/// ```
/// use molgenis_client::{QueryOptions, SortOrder};
///
/// let options = QueryOptions::new()
///     .with_filter("age=gt=18")
///     .with_attributes("name,age,mother")
///     .with_expand("mother")
///     .with_sort_order("age", SortOrder::Desc)
///     .with_page_size(1000);
/// assert_eq!(options.page_size, Some(1000));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// RSQL filter.
    #[serde(default, rename = "q")]
    pub filter: Option<Filter>,
    /// Attributes to retrieve. Empty means all.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Reference attributes whose targets are returned in full.
    #[serde(default)]
    pub expand: Vec<String>,
    /// Sort column and direction.
    #[serde(default)]
    pub sort: Option<Sort>,
    /// Rows per request (`num`).
    #[serde(default, rename = "num")]
    pub page_size: Option<u32>,
    /// Zero-based index of the first row (`start`).
    #[serde(default)]
    pub start: Option<u32>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an RSQL filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set a filter from a loosely typed JSON value.
    ///
    /// `null` clears the filter.
    ///
    /// # Errors
    ///
    /// Returns [`MolgenisError::InvalidQueryFormat`] for list or object values.
    pub fn try_with_filter(mut self, filter: serde_json::Value) -> Result<Self> {
        self.filter = match filter {
            serde_json::Value::Null => None,
            value => Some(Filter::try_from(value)?),
        };
        Ok(self)
    }

    /// Add attributes from a comma-separated list.
    #[must_use]
    pub fn with_attributes(mut self, attributes: &str) -> Self {
        self.attributes.extend(split_names(Some(attributes)));
        self
    }

    /// Add expanded attributes from a comma-separated list.
    #[must_use]
    pub fn with_expand(mut self, expand: &str) -> Self {
        self.expand.extend(split_names(Some(expand)));
        self
    }

    /// Sort on a column in the server's default direction.
    #[must_use]
    pub fn with_sort(mut self, column: impl Into<String>) -> Self {
        self.sort = Some(Sort::by(column));
        self
    }

    /// Sort on a column in the given direction.
    #[must_use]
    pub fn with_sort_order(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(Sort::with_order(column, order));
        self
    }

    /// Set the number of rows per request.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Set the index of the first row.
    #[must_use]
    pub fn with_start(mut self, start: u32) -> Self {
        self.start = Some(start);
        self
    }

    /// Whether a sort column has been set.
    pub fn has_sort_column(&self) -> bool {
        self.sort.as_ref().is_some_and(|s| !s.column.is_empty())
    }

    /// Page size used by the batch loop.
    pub fn effective_page_size(&self) -> u32 {
        match self.page_size {
            Some(n) if n > 0 => n,
            _ => DEFAULT_PAGE_SIZE,
        }
    }
}

/// Split a comma-separated list of names, dropping empty entries.
pub fn split_names(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Merge attributes and expands into an `attrs` operator.
///
/// Expand-only requests get a `*` so that all other attributes are still
/// returned. Each expanded attribute is suffixed with `(*)`.
fn merge_attrs(attributes: &[String], expand: &[String]) -> Option<String> {
    let mut names: Vec<&str> = attributes.iter().map(String::as_str).collect();
    if names.is_empty() && !expand.is_empty() {
        names.push("*");
    }
    names.extend(expand.iter().map(String::as_str));

    let mut seen = std::collections::HashSet::new();
    let merged: Vec<String> = names
        .into_iter()
        .filter(|name| seen.insert(*name))
        .map(|name| {
            if expand.iter().any(|e| e == name) {
                format!("{}(*)", encode(name))
            } else {
                encode(name)
            }
        })
        .collect();

    if merged.is_empty() {
        None
    } else {
        Some(format!("attrs={}", merged.join(",")))
    }
}

/// Build a v2 API URL from a base URL and query options.
///
/// Returns `base_url` unchanged when no operator applies. Operator values
/// are percent-encoded only where they would otherwise alter the query
/// string (`#`, `&`, `+`, `%`, quotes and whitespace).
///
/// # Example
///
/// ```
/// use molgenis_client::{build_api_url, QueryOptions};
///
/// let options = QueryOptions::new().with_filter("name==Henk").with_page_size(100);
/// assert_eq!(
///     build_api_url("https://h/api/v2/Person", &options),
///     "https://h/api/v2/Person?q=name==Henk"
/// );
/// ```
pub fn build_api_url(base_url: &str, options: &QueryOptions) -> String {
    let mut operators = Vec::new();

    if let Some(filter) = options.filter.as_ref().filter(|f| !f.as_str().is_empty()) {
        operators.push(format!("q={}", encode(filter.as_str())));
    }
    if let Some(attrs) = merge_attrs(&options.attributes, &options.expand) {
        operators.push(attrs);
    }
    if let Some(num) = options
        .page_size
        .filter(|n| *n != 0 && *n != DEFAULT_PAGE_SIZE)
    {
        operators.push(format!("num={num}"));
    }
    if let Some(start) = options.start.filter(|s| *s != 0) {
        operators.push(format!("start={start}"));
    }
    if let Some(sort) = options.sort.as_ref().and_then(Sort::operator) {
        operators.push(sort);
    }

    if operators.is_empty() {
        base_url.to_string()
    } else {
        format!("{base_url}?{}", operators.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn operators(url: &str) -> Vec<String> {
        url.split_once('?')
            .map(|(_, q)| q.split('&').map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn attrs_set(ops: &[String]) -> HashSet<String> {
        ops.iter()
            .find_map(|op| op.strip_prefix("attrs="))
            .map(|v| v.split(',').map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_build_api_url_all_options() {
        let options = QueryOptions::new()
            .with_filter("x==1")
            .with_attributes("x,y")
            .with_expand("y")
            .with_page_size(1000)
            .with_start(1000)
            .with_sort_order("x", SortOrder::Desc);

        let url = build_api_url("https://h/api/test", &options);
        assert!(url.starts_with("https://h/api/test?"));

        let ops = operators(&url);
        assert_eq!(ops.len(), 5);
        assert!(ops.contains(&"q=x==1".to_string()));
        assert!(ops.contains(&"num=1000".to_string()));
        assert!(ops.contains(&"start=1000".to_string()));
        assert!(ops.contains(&"sort=x:desc".to_string()));

        let expected: HashSet<String> = ["x", "y(*)"].iter().map(|s| s.to_string()).collect();
        assert_eq!(attrs_set(&ops), expected);
    }

    #[test]
    fn test_build_api_url_no_options() {
        let url = build_api_url("https://h/api/test", &QueryOptions::default());
        assert_eq!(url, "https://h/api/test");
    }

    #[test]
    fn test_build_api_url_expand_only_and_sort_without_order() {
        let options = QueryOptions::new().with_expand("y").with_sort("x");
        let ops = operators(&build_api_url("https://h/api/test", &options));

        let expected: HashSet<String> = ["*", "y(*)"].iter().map(|s| s.to_string()).collect();
        assert_eq!(attrs_set(&ops), expected);
        assert!(ops.contains(&"sort=x".to_string()));
        assert!(!ops.iter().any(|op| op.starts_with("sort=") && op.contains(':')));
    }

    #[test]
    fn test_build_api_url_suppresses_defaults() {
        let options = QueryOptions::new().with_page_size(100).with_start(0);
        assert_eq!(build_api_url("https://h/api/test", &options), "https://h/api/test");

        let options = QueryOptions::new().with_page_size(2);
        assert_eq!(
            build_api_url("https://h/api/test", &options),
            "https://h/api/test?num=2"
        );
    }

    #[test]
    fn test_build_api_url_order_without_column_is_ignored() {
        let options = QueryOptions {
            sort: Some(Sort {
                column: String::new(),
                order: Some(SortOrder::Asc),
            }),
            ..Default::default()
        };
        assert_eq!(build_api_url("https://h/api/test", &options), "https://h/api/test");
    }

    #[test]
    fn test_build_api_url_encodes_reserved_characters() {
        let options = QueryOptions::new()
            .with_filter(r#"name=="A#1&B+C 50%";age=ge=3"#)
            .with_sort("id");
        assert_eq!(
            build_api_url("https://h/api/v2/Person", &options),
            "https://h/api/v2/Person?q=name==%22A%231%26B%2BC%2050%25%22;age=ge=3&sort=id"
        );

        let url = url::Url::parse(&build_api_url("https://h/api/v2/Person", &options)).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("q".to_string(), r#"name=="A#1&B+C 50%";age=ge=3"#.to_string()),
                ("sort".to_string(), "id".to_string()),
            ]
        );
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_build_api_url_encodes_attribute_and_sort_names() {
        let options = QueryOptions::new()
            .with_attributes("a&b")
            .with_sort_order("c#d", SortOrder::Asc);
        assert_eq!(
            build_api_url("b", &options),
            "b?attrs=a%26b&sort=c%23d:asc"
        );
    }

    #[test]
    fn test_attributes_only() {
        let options = QueryOptions::new().with_attributes("id,name,id");
        assert_eq!(
            build_api_url("b", &options),
            "b?attrs=id,name",
            "duplicate attributes are merged"
        );
    }

    #[test]
    fn test_structured_filter_is_rejected() {
        let result = QueryOptions::new().try_with_filter(serde_json::json!([{"field": "x"}]));
        assert!(matches!(result, Err(MolgenisError::InvalidQueryFormat(_))));

        let result = QueryOptions::new().try_with_filter(serde_json::json!({"x": 1}));
        assert!(matches!(result, Err(MolgenisError::InvalidQueryFormat(_))));
    }

    #[test]
    fn test_scalar_filter_values_are_accepted() {
        let options = QueryOptions::new()
            .try_with_filter(serde_json::json!("name==Henk"))
            .unwrap();
        assert_eq!(options.filter, Some(Filter::rsql("name==Henk")));

        let options = QueryOptions::new()
            .with_filter("x==1")
            .try_with_filter(serde_json::Value::Null)
            .unwrap();
        assert_eq!(options.filter, None);
    }

    #[test]
    fn test_deserialize_options_rejects_structured_filter() {
        let ok: QueryOptions =
            serde_json::from_value(serde_json::json!({"q": "x==1", "num": 10})).unwrap();
        assert_eq!(ok.page_size, Some(10));
        assert_eq!(ok.filter.as_ref().map(Filter::as_str), Some("x==1"));

        let err = serde_json::from_value::<QueryOptions>(serde_json::json!({"q": ["x", "==", 1]}));
        assert!(err.is_err());
    }

    #[test]
    fn test_split_names() {
        assert_eq!(split_names(Some("a, b,,c")), vec!["a", "b", "c"]);
        assert!(split_names(None).is_empty());
        assert!(split_names(Some("")).is_empty());
    }

    #[test]
    fn test_sort_order_from_str() {
        assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert!("sideways".parse::<SortOrder>().is_err());
    }
}
