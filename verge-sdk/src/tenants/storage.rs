use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;
use verge_api::constants::GB;
use verge_api::record::{bytes_to_gb, epoch_to_datetime};
use verge_api::{Client, Endpoint, Error, ListParams, ResourceManager, Result};

use super::TenantRef;
use crate::util::{key_by_filter, object};

const TENANT_STORAGE: Endpoint = Endpoint::new("tenant_storage").fields(&[
    "$key",
    "tenant",
    "tier",
    "tier#tier as tier_number",
    "tier#description as tier_description",
    "provisioned",
    "used",
    "allocated",
    "used_pct",
    "last_update",
]);

/// A tenant's allocation from one storage tier. Sizes are bytes.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantStorage {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub tenant: Option<u64>,
    /// Key of the `storage_tiers` row, not the tier number.
    #[serde(default)]
    pub tier: Option<u64>,
    #[serde(default)]
    pub tier_number: Option<u8>,
    #[serde(default)]
    pub tier_description: Option<String>,
    #[serde(default)]
    pub provisioned: Option<u64>,
    #[serde(default)]
    pub used: Option<u64>,
    #[serde(default)]
    pub allocated: Option<u64>,
    #[serde(default)]
    pub used_pct: Option<u64>,
    #[serde(default)]
    pub last_update: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(TenantStorage, u64);

impl TenantStorage {
    /// Tier number, 1 through 5.
    pub fn tier(&self) -> u8 {
        self.tier_number.unwrap_or(0)
    }

    pub fn provisioned_bytes(&self) -> u64 {
        self.provisioned.unwrap_or(0)
    }

    pub fn used_bytes(&self) -> u64 {
        self.used.unwrap_or(0)
    }

    pub fn provisioned_gb(&self) -> f64 {
        bytes_to_gb(self.provisioned_bytes())
    }

    pub fn used_gb(&self) -> f64 {
        bytes_to_gb(self.used_bytes())
    }

    pub fn allocated_gb(&self) -> f64 {
        bytes_to_gb(self.allocated.unwrap_or(0))
    }

    /// Provisioned minus used, never negative.
    pub fn free_bytes(&self) -> u64 {
        self.provisioned_bytes().saturating_sub(self.used_bytes())
    }

    pub fn free_gb(&self) -> f64 {
        bytes_to_gb(self.free_bytes())
    }

    pub fn used_percent(&self) -> u64 {
        self.used_pct.unwrap_or(0)
    }

    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        self.last_update.and_then(epoch_to_datetime)
    }
}

/// Validate a tier number and a provisioned size.
fn check_allocation(tier: u8, bytes: u64) -> Result<()> {
    if !(1..=5).contains(&tier) {
        return Err(Error::InvalidArgument(format!(
            "invalid tier {tier}: valid tiers are 1-5, tier 0 is reserved for system metadata"
        )));
    }
    if bytes < GB {
        return Err(Error::InvalidArgument(
            "provisioned storage must be at least 1 GB".to_owned(),
        ));
    }
    Ok(())
}

/// Storage allocations of one tenant.
#[derive(Clone)]
pub struct TenantStorageManager {
    inner: ResourceManager<TenantStorage>,
    tenant: TenantRef,
}

impl TenantStorageManager {
    pub fn new(client: &Client, tenant: TenantRef) -> Self {
        Self {
            inner: ResourceManager::scoped(client, TENANT_STORAGE, format!("tenant eq {}", tenant.key)),
            tenant,
        }
    }

    pub async fn list(&self) -> Result<Vec<TenantStorage>> {
        self.inner.list(&ListParams::new()).await
    }

    pub async fn get_by_key(&self, key: u64) -> Result<TenantStorage> {
        self.inner.get_by_key(&key).await
    }

    /// Deleting stays allowed on a snapshot tenant.
    pub async fn delete(&self, key: u64) -> Result<()> {
        self.inner.delete(&key).await
    }

    /// The allocation from tier `tier`.
    pub async fn get_by_tier(&self, tier: u8) -> Result<TenantStorage> {
        self.list()
            .await?
            .into_iter()
            .find(|allocation| allocation.tier() == tier)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "tier {tier} storage for tenant {}",
                    self.tenant.name
                ))
            })
    }

    /// Allocate `provisioned_gb` from tier `tier`.
    pub async fn create(&self, tier: u8, provisioned_gb: u64) -> Result<TenantStorage> {
        self.create_bytes(tier, provisioned_gb.saturating_mul(GB)).await
    }

    pub async fn create_bytes(&self, tier: u8, provisioned: u64) -> Result<TenantStorage> {
        self.tenant.ensure_not_snapshot("add storage to")?;
        check_allocation(tier, provisioned)?;

        let tier_key: u64 = key_by_filter(self.inner.client(), "storage_tiers", &format!("tier eq {tier}"))
            .await?
            .ok_or_else(|| Error::NotFound(format!("storage tier {tier}")))?;

        debug!(tenant = %self.tenant.name, tier, provisioned, "allocating tenant storage");
        let body = object(json!({
            "tenant": self.tenant.key,
            "tier": tier_key,
            "provisioned": provisioned,
        }));
        let fallback = ListParams::new().term("tier", tier_key);
        self.inner.create_with_fallback(body, Some(fallback)).await
    }

    /// Resize an allocation.
    pub async fn update(&self, key: u64, provisioned: u64) -> Result<TenantStorage> {
        self.inner
            .update(&key, object(json!({ "provisioned": provisioned })))
            .await
    }

    pub async fn update_by_tier(&self, tier: u8, provisioned_gb: u64) -> Result<TenantStorage> {
        let allocation = self.get_by_tier(tier).await?;
        self.update(allocation.key, provisioned_gb.saturating_mul(GB)).await
    }

    /// Remove an allocation. Data on the tier is lost.
    pub async fn delete_by_tier(&self, tier: u8) -> Result<()> {
        let allocation = self.get_by_tier(tier).await?;
        self.inner.delete(&allocation.key).await
    }
}
