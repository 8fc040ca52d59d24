use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::{Client, Endpoint, Error, ListParams, ResourceManager, Result};

use super::TenantRef;
use crate::util::{KeyOrName, object};

const TENANT_LAYER2_VNETS: Endpoint = Endpoint::new("tenant_layer2_vnets").fields(&[
    "$key",
    "tenant",
    "tenant#name as tenant_name",
    "vnet",
    "vnet#name as network_name",
    "vnet#type as network_type",
    "enabled",
]);

/// A parent network bridged into a tenant.
#[derive(Debug, Clone, Deserialize)]
pub struct Layer2Network {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub tenant: Option<u64>,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(default)]
    pub vnet: Option<u64>,
    #[serde(default)]
    pub network_name: Option<String>,
    #[serde(default)]
    pub network_type: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(Layer2Network, u64);

impl Layer2Network {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }
}

/// Layer 2 networks of one tenant.
#[derive(Clone)]
pub struct Layer2Manager {
    inner: ResourceManager<Layer2Network>,
    tenant: TenantRef,
}

impl Layer2Manager {
    pub fn new(client: &Client, tenant: TenantRef) -> Self {
        Self {
            inner: ResourceManager::scoped(
                client,
                TENANT_LAYER2_VNETS,
                format!("tenant eq {}", tenant.key),
            ),
            tenant,
        }
    }

    pub async fn list(&self) -> Result<Vec<Layer2Network>> {
        self.inner.list(&ListParams::new()).await
    }

    pub async fn get_by_key(&self, key: u64) -> Result<Layer2Network> {
        self.inner.get_by_key(&key).await
    }

    pub async fn delete(&self, key: u64) -> Result<()> {
        self.inner.delete(&key).await
    }

    pub async fn get_by_network(&self, network: impl Into<KeyOrName>) -> Result<Layer2Network> {
        let vnet = network.into().resolve(self.inner.client(), "vnets").await?;
        self.inner
            .find_one(ListParams::new().term("vnet", vnet))
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "layer 2 network {vnet} for tenant {}",
                    self.tenant.name
                ))
            })
    }

    /// Bridge `network` into the tenant.
    pub async fn create(&self, network: impl Into<KeyOrName>, enabled: bool) -> Result<Layer2Network> {
        self.tenant.ensure_not_snapshot("assign a layer 2 network to")?;
        let vnet = network.into().resolve(self.inner.client(), "vnets").await?;
        let body = object(json!({
            "tenant": self.tenant.key,
            "vnet": vnet,
            "enabled": enabled,
        }));
        let fallback = ListParams::new().term("vnet", vnet);
        self.inner.create_with_fallback(body, Some(fallback)).await
    }

    pub async fn enable(&self, key: u64) -> Result<Layer2Network> {
        self.inner.update(&key, object(json!({ "enabled": true }))).await
    }

    pub async fn disable(&self, key: u64) -> Result<Layer2Network> {
        self.inner.update(&key, object(json!({ "enabled": false }))).await
    }

    pub async fn delete_by_network(&self, network: impl Into<KeyOrName>) -> Result<()> {
        let layer2 = self.get_by_network(network).await?;
        self.inner.delete(&layer2.key).await
    }
}
