use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::filter::quote;
use verge_api::key::parse_reference;
use verge_api::{Client, Endpoint, Error, ListParams, ResourceManager, Result};

use super::TenantRef;
use crate::util::{KeyOrName, object, put_opt};

const VNET_CIDRS: Endpoint = Endpoint::new("vnet_cidrs").fields(&[
    "$key",
    "vnet",
    "vnet#name as network_name",
    "cidr",
    "description",
    "owner",
]);

/// A CIDR block of a parent network routed to a tenant.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkBlock {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub vnet: Option<u64>,
    #[serde(default)]
    pub network_name: Option<String>,
    #[serde(default)]
    pub cidr: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(NetworkBlock, u64);

impl NetworkBlock {
    pub fn tenant_key(&self) -> Option<u64> {
        self.owner.as_deref().and_then(parse_reference)
    }

    pub fn network_address(&self) -> &str {
        self.cidr.split('/').next().unwrap_or_default()
    }

    pub fn prefix_length(&self) -> Option<u8> {
        self.cidr.split_once('/')?.1.parse().ok()
    }

    /// Addresses in the block, `2^(32 - prefix)`. Zero when the prefix is unknown.
    pub fn address_count(&self) -> u64 {
        match self.prefix_length() {
            Some(prefix @ 1..=32) => 1u64 << (32 - prefix),
            _ => 0,
        }
    }
}

/// Network blocks of one tenant.
#[derive(Clone)]
pub struct NetworkBlockManager {
    inner: ResourceManager<NetworkBlock>,
    tenant: TenantRef,
}

impl NetworkBlockManager {
    pub fn new(client: &Client, tenant: TenantRef) -> Self {
        let scope = format!("owner eq {}", quote(&tenant.owner()));
        Self {
            inner: ResourceManager::scoped(client, VNET_CIDRS, scope),
            tenant,
        }
    }

    pub async fn list(&self) -> Result<Vec<NetworkBlock>> {
        self.inner.list(&ListParams::new()).await
    }

    pub async fn get_by_key(&self, key: u64) -> Result<NetworkBlock> {
        self.inner.get_by_key(&key).await
    }

    pub async fn delete(&self, key: u64) -> Result<()> {
        self.inner.delete(&key).await
    }

    pub async fn get_by_cidr(&self, cidr: &str) -> Result<NetworkBlock> {
        self.inner
            .find_one(ListParams::new().term("cidr", cidr))
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("network block {cidr} for tenant {}", self.tenant.name))
            })
    }

    /// Route `cidr` from `network` to the tenant.
    pub async fn create(
        &self,
        cidr: &str,
        network: impl Into<KeyOrName>,
        description: Option<&str>,
    ) -> Result<NetworkBlock> {
        self.tenant.ensure_not_snapshot("assign a network block to")?;
        let vnet = network.into().resolve(self.inner.client(), "vnets").await?;
        let mut body = object(json!({
            "vnet": vnet,
            "cidr": cidr,
            "owner": self.tenant.owner(),
        }));
        put_opt(&mut body, "description", description.filter(|d| !d.is_empty()));
        let fallback = ListParams::new().term("cidr", cidr);
        self.inner.create_with_fallback(body, Some(fallback)).await
    }

    pub async fn delete_by_cidr(&self, cidr: &str) -> Result<()> {
        let block = self.get_by_cidr(cidr).await?;
        self.inner.delete(&block.key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(cidr: &str) -> NetworkBlock {
        serde_json::from_value(json!({"$key": 1, "cidr": cidr, "owner": "tenants/4"})).unwrap()
    }

    #[test]
    fn test_cidr_parts() {
        let block = block("192.168.100.0/24");
        assert_eq!(block.network_address(), "192.168.100.0");
        assert_eq!(block.prefix_length(), Some(24));
        assert_eq!(block.address_count(), 256);
        assert_eq!(block.tenant_key(), Some(4));
    }

    #[test]
    fn test_address_count_without_prefix() {
        assert_eq!(block("10.0.0.1").address_count(), 0);
        assert_eq!(block("10.0.0.1/32").address_count(), 1);
    }
}
