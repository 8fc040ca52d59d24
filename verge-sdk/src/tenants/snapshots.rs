use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;
use verge_api::record::epoch_to_datetime;
use verge_api::{Client, Endpoint, Error, ListParams, ResourceManager, Result};

use super::{TENANTS, Tenant, TenantRef};
use crate::util::{object, put_opt};

const TENANT_SNAPSHOTS: Endpoint = Endpoint::new("tenant_snapshots")
    .fields(&[
        "$key",
        "tenant",
        "name",
        "description",
        "profile",
        "period",
        "min_snapshots",
        "created",
        "expires",
    ])
    .sort("-created");

#[derive(Debug, Clone, Deserialize)]
pub struct TenantSnapshot {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub tenant: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub profile: Option<Value>,
    #[serde(default)]
    pub period: Option<Value>,
    #[serde(default)]
    pub min_snapshots: Option<u32>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub expires: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(TenantSnapshot, u64);

impl TenantSnapshot {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(epoch_to_datetime)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires.filter(|e| *e > 0).and_then(epoch_to_datetime)
    }

    pub fn never_expires(&self) -> bool {
        self.expires.unwrap_or(0) == 0
    }
}

/// Arguments of [`TenantSnapshotManager::create`].
#[derive(Debug, Clone)]
pub struct NewTenantSnapshot {
    name: String,
    description: Option<String>,
    expires_in_days: u32,
    expires_at: Option<DateTime<Utc>>,
}

impl NewTenantSnapshot {
    /// A snapshot that never expires.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            expires_in_days: 0,
            expires_at: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Expire after `days`; zero never expires.
    pub fn expires_in_days(mut self, days: u32) -> Self {
        self.expires_in_days = days;
        self
    }

    /// Expire at a fixed time. Takes precedence over a day count.
    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    fn into_body(self, tenant: u64, now: DateTime<Utc>) -> Map<String, Value> {
        let mut body = object(json!({ "tenant": tenant, "name": self.name }));
        put_opt(&mut body, "description", self.description.filter(|d| !d.is_empty()));
        let expires = match self.expires_at {
            Some(at) => Some(at.timestamp()),
            None if self.expires_in_days > 0 => {
                Some(now.timestamp() + i64::from(self.expires_in_days) * 86_400)
            }
            None => None,
        };
        put_opt(&mut body, "expires", expires);
        body
    }
}

/// Snapshots of one tenant.
#[derive(Clone)]
pub struct TenantSnapshotManager {
    inner: ResourceManager<TenantSnapshot>,
    tenant: TenantRef,
}

impl TenantSnapshotManager {
    pub fn new(client: &Client, tenant: TenantRef) -> Self {
        Self {
            inner: ResourceManager::scoped(
                client,
                TENANT_SNAPSHOTS,
                format!("tenant eq {}", tenant.key),
            ),
            tenant,
        }
    }

    /// Snapshots, newest first.
    pub async fn list(&self) -> Result<Vec<TenantSnapshot>> {
        self.inner.list(&ListParams::new()).await
    }

    pub async fn get_by_key(&self, key: u64) -> Result<TenantSnapshot> {
        self.inner.get_by_key(&key).await
    }

    pub async fn delete(&self, key: u64) -> Result<()> {
        self.inner.delete(&key).await
    }

    pub async fn create(&self, snapshot: NewTenantSnapshot) -> Result<TenantSnapshot> {
        self.tenant.ensure_not_snapshot("snapshot")?;
        self.inner
            .create(snapshot.into_body(self.tenant.key, Utc::now()))
            .await
    }

    /// Roll the tenant back to snapshot `key`. The tenant must be powered off.
    ///
    /// Everything written after the snapshot is lost.
    pub async fn restore(&self, key: u64) -> Result<Option<Value>> {
        let tenants = ResourceManager::<Tenant>::new(self.inner.client(), TENANTS);
        let tenant = tenants.get_by_key(&self.tenant.key).await?;
        if tenant.is_running() {
            return Err(Error::InvalidArgument(format!(
                "cannot restore tenant {}: it must be powered off first",
                tenant.name
            )));
        }

        info!(tenant = %tenant.name, snapshot = key, "restoring tenant snapshot");
        let params = object(json!({ "params": { "snapshot": key } }));
        tenants.action(&tenant.key, "restore", params).await
    }
}
