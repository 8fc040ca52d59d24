//! Small helpers shared by the resource managers.

use serde_json::{Map, Value};
use verge_api::filter::quote;
use verge_api::{Client, Error, ResourceKey, Result};

/// Unwrap a `json!({..})` literal into the field map managers send.
pub(crate) fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Insert `value` under `field` when present.
pub(crate) fn put_opt(body: &mut Map<String, Value>, field: &str, value: Option<impl Into<Value>>) {
    if let Some(value) = value {
        body.insert(field.to_owned(), value.into());
    }
}

/// First row of a raw list response.
pub(crate) fn first_row(response: Option<Value>) -> Option<Value> {
    match response? {
        Value::Array(items) => items.into_iter().next(),
        value @ Value::Object(_) => Some(value),
        _ => None,
    }
}

/// Read an integer sent either as a number or as a numeric string.
pub(crate) fn as_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Resolve the key of a row in `endpoint` by exact name.
pub(crate) async fn key_by_name<K: ResourceKey>(
    client: &Client,
    endpoint: &str,
    name: &str,
) -> Result<K> {
    key_by_filter(client, endpoint, &format!("name eq {}", quote(name)))
        .await?
        .ok_or_else(|| Error::NotFound(format!("{endpoint} with name {name:?}")))
}

/// Resolve the key of the first row of `endpoint` matching `filter`.
pub(crate) async fn key_by_filter<K: ResourceKey>(
    client: &Client,
    endpoint: &str,
    filter: &str,
) -> Result<Option<K>> {
    let query = [
        ("filter".to_owned(), filter.to_owned()),
        ("fields".to_owned(), "$key,name".to_owned()),
        ("limit".to_owned(), "1".to_owned()),
    ];
    let row = first_row(client.get(endpoint, &query).await?);
    Ok(row.as_ref().and_then(|r| r.get("$key")).and_then(K::from_json))
}

/// Either a key or a name to be resolved against another collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOrName {
    Key(u64),
    Name(String),
}

impl KeyOrName {
    pub(crate) async fn resolve(&self, client: &Client, endpoint: &str) -> Result<u64> {
        match self {
            Self::Key(key) => Ok(*key),
            Self::Name(name) => key_by_name(client, endpoint, name).await,
        }
    }
}

impl From<u64> for KeyOrName {
    fn from(key: u64) -> Self {
        Self::Key(key)
    }
}

impl From<&str> for KeyOrName {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for KeyOrName {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Turn a `*` / `?` wildcard into a `ct` filter on the literal part, otherwise `eq`.
pub(crate) fn name_clause(name: &str) -> String {
    if name.contains('*') || name.contains('?') {
        let literal = name.replace(['*', '?'], "");
        format!("name ct {}", quote(&literal))
    } else {
        format!("name eq {}", quote(name))
    }
}
