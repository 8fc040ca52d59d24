//! The generic resource manager.
//!
//! Every API collection supports the same conventions: `filter`/`fields`/
//! `limit`/`offset`/`sort` query parameters, `GET`/`PUT`/`DELETE` on
//! `{collection}/{key}`, and non-CRUD verbs posted to an `*_actions`
//! collection. [`ResourceManager`] implements these once; resource families
//! differ only in their [`Endpoint`] and record type.

use std::marker::PhantomData;
use std::time::Duration;

use futures::{Stream, StreamExt, TryStreamExt, stream};
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::Client;
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::error::{Error, Result};
use crate::filter::quote;
use crate::key::{ResourceKey, parse_reference};
use crate::poll::{Backoff, poll_until};
use crate::query::ListParams;
use crate::record::Record;

/// How a record is fetched by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLookup {
    /// `GET {endpoint}/{key}`.
    Path,
    /// `GET {endpoint}?filter=$key eq K`.
    Filter,
}

/// Static description of one API collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub name: &'static str,
    pub default_fields: &'static [&'static str],
    pub sort: Option<&'static str>,
    /// Actions collection and the body field naming the target row.
    pub actions: Option<(&'static str, &'static str)>,
    /// Without an actions collection, verbs go to `PUT {endpoint}/{key}?action=...`.
    pub inline_actions: bool,
    pub key_lookup: KeyLookup,
}

impl Endpoint {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            default_fields: &[],
            sort: None,
            actions: None,
            inline_actions: false,
            key_lookup: KeyLookup::Path,
        }
    }

    pub const fn fields(mut self, fields: &'static [&'static str]) -> Self {
        self.default_fields = fields;
        self
    }

    pub const fn sort(mut self, sort: &'static str) -> Self {
        self.sort = Some(sort);
        self
    }

    pub const fn actions(mut self, endpoint: &'static str, key_field: &'static str) -> Self {
        self.actions = Some((endpoint, key_field));
        self
    }

    pub const fn inline_actions(mut self) -> Self {
        self.inline_actions = true;
        self
    }

    pub const fn lookup_by_filter(mut self) -> Self {
        self.key_lookup = KeyLookup::Filter;
        self
    }
}

/// Identifies a single record for [`ResourceManager::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<K> {
    Key(K),
    Name(String),
}

impl<K> Lookup<K> {
    /// Build a lookup from optional parts. The key wins when both are given.
    pub fn from_parts(key: Option<K>, name: Option<&str>) -> Result<Self> {
        match (key, name) {
            (Some(key), _) => Ok(Self::Key(key)),
            (None, Some(name)) if !name.trim().is_empty() => Ok(Self::Name(name.to_owned())),
            _ => Err(Error::InvalidArgument(
                "either a key or a name must be provided".to_owned(),
            )),
        }
    }
}

/// Clamp a requested page size into `1..=1000`, defaulting to 100.
pub fn clamp_page_size(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// CRUD, listing and action dispatch for one collection.
pub struct ResourceManager<T> {
    client: Client,
    endpoint: Endpoint,
    scope: Option<String>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for ResourceManager<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            endpoint: self.endpoint,
            scope: self.scope.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> ResourceManager<T> {
    pub fn new(client: &Client, endpoint: Endpoint) -> Self {
        Self {
            client: client.clone(),
            endpoint,
            scope: None,
            _record: PhantomData,
        }
    }

    /// A manager whose list and name lookups always include `scope`.
    pub fn scoped(client: &Client, endpoint: Endpoint, scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            ..Self::new(client, endpoint)
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Path of a single record.
    pub fn record_path(&self, key: &T::Key) -> String {
        format!("{}/{}", self.endpoint.name, key.path_segment())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// List records. An empty result is an empty vector, never an error.
    pub async fn list(&self, params: &ListParams) -> Result<Vec<T>> {
        let query = params.to_query(
            self.scope.as_deref(),
            self.endpoint.default_fields,
            self.endpoint.sort,
        );
        let response = self.client.get(self.endpoint.name, &query).await?;
        records(response)
    }

    /// Fetch every page of a listing.
    pub async fn list_all(&self, params: &ListParams, page_size: Option<u32>) -> Result<Vec<T>> {
        self.stream(params.clone(), page_size).try_collect().await
    }

    /// Page through a listing with `limit`/`offset` until a short page.
    pub fn stream(
        &self,
        params: ListParams,
        page_size: Option<u32>,
    ) -> impl Stream<Item = Result<T>> + Send + '_ {
        let size = clamp_page_size(page_size);
        let start = params.offset_value().unwrap_or(0);

        stream::try_unfold(Some(start), move |offset| {
            let params = params.clone();
            async move {
                let Some(offset) = offset else {
                    return Ok::<_, Error>(None);
                };
                let page = self.list(&params.limit(size).offset(offset)).await?;
                let next = (page.len() as u32 == size).then_some(offset + size);
                Ok(Some((stream::iter(page).map(Ok::<T, Error>), next)))
            }
        })
        .try_flatten()
    }

    /// First record matching `params`, if any.
    pub async fn find_one(&self, params: ListParams) -> Result<Option<T>> {
        Ok(self.list(&params.limit(1)).await?.into_iter().next())
    }

    /// Fetch one record by key or name.
    pub async fn get(&self, lookup: Lookup<T::Key>) -> Result<T> {
        match lookup {
            Lookup::Key(key) => self.get_by_key(&key).await,
            Lookup::Name(name) => self.get_by_name(&name).await,
        }
    }

    /// Fetch one record by key with the default fields.
    pub async fn get_by_key(&self, key: &T::Key) -> Result<T> {
        self.get_by_key_with(key, self.endpoint.default_fields).await
    }

    /// Fetch one record by key with an explicit field list.
    pub async fn get_by_key_with(&self, key: &T::Key, fields: &[&str]) -> Result<T> {
        let mut query = Vec::new();
        if !fields.is_empty() {
            query.push(("fields".to_owned(), fields.join(",")));
        }

        let response = match self.endpoint.key_lookup {
            KeyLookup::Path => self.client.get(&self.record_path(key), &query).await?,
            KeyLookup::Filter => {
                query.push((
                    "filter".to_owned(),
                    format!("$key eq {}", key.filter_literal()),
                ));
                query.push(("limit".to_owned(), "1".to_owned()));
                self.client.get(self.endpoint.name, &query).await?
            }
        };

        single(response)?.ok_or_else(|| self.not_found(&format!("key {key}")))
    }

    /// Fetch one record by exact name within the manager's scope.
    pub async fn get_by_name(&self, name: &str) -> Result<T> {
        self.find_one(ListParams::new().filter(format!("name eq {}", quote(name))))
            .await?
            .ok_or_else(|| self.not_found(&format!("name {name:?}")))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// POST a new record, then fetch it back in full.
    ///
    /// The POST response usually carries only the new key (or a `location`).
    /// The follow-up fetch is retried with backoff while the server reports
    /// the row as missing, up to the client's consistency timeout.
    pub async fn create(&self, body: Map<String, Value>) -> Result<T> {
        let fallback = body
            .get("name")
            .and_then(Value::as_str)
            .map(|name| ListParams::new().filter(format!("name eq {}", quote(name))));
        self.create_with_fallback(body, fallback).await
    }

    /// Like [`create`](Self::create), but when the response carries no key the
    /// new row is located with `fallback` (a natural key such as a tier, an
    /// IP address or a CIDR) instead of by name.
    pub async fn create_with_fallback(
        &self,
        body: Map<String, Value>,
        fallback: Option<ListParams>,
    ) -> Result<T> {
        debug!(endpoint = self.endpoint.name, "creating record");
        let response = self
            .client
            .post(self.endpoint.name, &Value::Object(body))
            .await?;

        if let Some(key) = response.as_ref().and_then(created_key::<T::Key>) {
            return self.fetch_created(&key).await;
        }

        let Some(params) = fallback else {
            return Err(Error::Api {
                status: 200,
                message: format!("{} create response carried no key", self.endpoint.name),
            });
        };
        let params = &params;
        let window = self.client.config().consistency_window();
        poll_until(window, consistency_backoff(), || async move {
            self.find_one(params.clone()).await
        })
        .await?
        .ok_or_else(|| self.not_found("the created record"))
    }

    /// Fetch a just-created record, tolerating a short visibility lag.
    pub async fn fetch_created(&self, key: &T::Key) -> Result<T> {
        let window = self.client.config().consistency_window();
        poll_until(window, consistency_backoff(), || async move {
            match self.get_by_key(key).await {
                Ok(record) => Ok(Some(record)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await?
        .ok_or_else(|| self.not_found(&format!("key {key}")))
    }

    /// Update the supplied fields only, then fetch the record.
    ///
    /// An empty field map skips the PUT and just re-fetches.
    pub async fn update(&self, key: &T::Key, fields: Map<String, Value>) -> Result<T> {
        if !fields.is_empty() {
            debug!(endpoint = self.endpoint.name, %key, "updating record");
            self.client
                .put(&self.record_path(key), &Value::Object(fields))
                .await?;
        }
        self.get_by_key(key).await
    }

    /// Delete a record.
    pub async fn delete(&self, key: &T::Key) -> Result<()> {
        debug!(endpoint = self.endpoint.name, %key, "deleting record");
        self.client.delete(&self.record_path(key)).await?;
        Ok(())
    }

    /// Invoke a non-CRUD verb through the actions collection.
    ///
    /// The body is `{<key field>: key, "action": name}` merged with `params`.
    /// Returns the raw response, often holding a task reference.
    pub async fn action(
        &self,
        key: &T::Key,
        name: &str,
        params: Map<String, Value>,
    ) -> Result<Option<Value>> {
        let Some((endpoint, field)) = self.endpoint.actions else {
            if !self.endpoint.inline_actions {
                return Err(Error::InvalidArgument(format!(
                    "{} has no actions endpoint",
                    self.endpoint.name
                )));
            }
            debug!(endpoint = self.endpoint.name, action = name, %key, "invoking inline action");
            let query = [("action".to_owned(), name.to_owned())];
            return self
                .client
                .request(
                    Method::PUT,
                    &self.record_path(key),
                    &query,
                    Some(&Value::Object(params)),
                )
                .await;
        };

        let mut body = Map::new();
        body.insert(field.to_owned(), key.to_json());
        body.insert("action".to_owned(), Value::String(name.to_owned()));
        body.extend(params);

        debug!(endpoint, action = name, %key, "invoking action");
        self.client
            .request(Method::POST, endpoint, &[], Some(&Value::Object(body)))
            .await
    }

    fn not_found(&self, what: &str) -> Error {
        Error::NotFound(format!("{} with {what}", self.endpoint.name))
    }
}

fn consistency_backoff() -> Backoff {
    Backoff::new(Duration::from_millis(100)).max(Duration::from_secs(1))
}

/// Key of a freshly created row: `$key`, else the tail of `location`.
pub fn created_key<K: ResourceKey>(response: &Value) -> Option<K> {
    if let Some(key) = response.get("$key").and_then(K::from_json) {
        return Some(key);
    }
    response
        .get("location")
        .and_then(Value::as_str)
        .and_then(|loc| parse_reference(loc.trim_end_matches('/')))
}

/// Decode a list response. `null` or no body is an empty list; a lone object
/// is a one-element list.
pub fn records<T: Record>(response: Option<Value>) -> Result<Vec<T>> {
    match response {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(Error::from))
            .collect(),
        Some(value) => Ok(vec![serde_json::from_value(value)?]),
    }
}

fn single<T: Record>(response: Option<Value>) -> Result<Option<T>> {
    let value = match response {
        Some(Value::Array(items)) => items.into_iter().next(),
        Some(value @ Value::Object(_)) => Some(value),
        _ => None,
    };
    Ok(value.map(serde_json::from_value).transpose()?)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Row {
        #[serde(rename = "$key")]
        key: u64,
        #[serde(flatten)]
        extra: Map<String, Value>,
    }

    crate::impl_record!(Row, u64);

    #[test]
    fn test_lookup_requires_an_identifier() {
        assert!(matches!(
            Lookup::<u64>::from_parts(None, None),
            Err(Error::InvalidArgument(_))
        ));
        assert!(Lookup::<u64>::from_parts(None, Some("  ")).is_err());
        assert_eq!(
            Lookup::from_parts(Some(3u64), Some("web")).unwrap(),
            Lookup::Key(3)
        );
        assert_eq!(
            Lookup::<u64>::from_parts(None, Some("web")).unwrap(),
            Lookup::Name("web".into())
        );
    }

    #[test]
    fn test_page_size_is_clamped() {
        assert_eq!(clamp_page_size(None), 100);
        assert_eq!(clamp_page_size(Some(0)), 1);
        assert_eq!(clamp_page_size(Some(5000)), 1000);
        assert_eq!(clamp_page_size(Some(250)), 250);
    }

    #[test]
    fn test_created_key_sources() {
        assert_eq!(created_key::<u64>(&json!({"$key": 17})), Some(17));
        assert_eq!(created_key::<u64>(&json!({"$key": "17"})), Some(17));
        assert_eq!(
            created_key::<u64>(&json!({"location": "/v4/vms/21"})),
            Some(21)
        );
        assert_eq!(created_key::<u64>(&json!({"ok": true})), None);
    }

    #[test]
    fn test_records_normalization() {
        let none: Vec<Row> = records(None).unwrap();
        assert!(none.is_empty());
        let null: Vec<Row> = records(Some(Value::Null)).unwrap();
        assert!(null.is_empty());

        let one: Vec<Row> = records(Some(json!({"$key": 1, "name": "a"}))).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].field("name"), Some(&json!("a")));

        let many: Vec<Row> = records(Some(json!([{"$key": 1}, {"$key": 2}]))).unwrap();
        assert_eq!(many.iter().map(Record::key).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_endpoint_builder() {
        const VMS: Endpoint = Endpoint::new("vms")
            .fields(&["$key", "name"])
            .sort("+name")
            .actions("vm_actions", "vm")
            .lookup_by_filter();
        assert_eq!(VMS.default_fields, &["$key", "name"]);
        assert_eq!(VMS.sort, Some("+name"));
        assert_eq!(VMS.actions, Some(("vm_actions", "vm")));
        assert_eq!(VMS.key_lookup, KeyLookup::Filter);
    }
}
