use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::filter::quote;
use verge_api::key::parse_reference;
use verge_api::{Client, Endpoint, Error, ListParams, ResourceManager, Result};

use super::TenantRef;
use crate::util::{KeyOrName, object, put_opt};

const VNET_ADDRESSES: Endpoint = Endpoint::new("vnet_addresses").fields(&[
    "$key",
    "vnet",
    "vnet#name as network_name",
    "ip",
    "type",
    "hostname",
    "description",
    "owner",
    "mac",
]);

/// A virtual address of a parent network handed to a tenant.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalIp {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub vnet: Option<u64>,
    #[serde(default)]
    pub network_name: Option<String>,
    #[serde(default)]
    pub ip: String,
    #[serde(rename = "type", default)]
    pub ip_type: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(ExternalIp, u64);

impl ExternalIp {
    pub fn tenant_key(&self) -> Option<u64> {
        self.owner.as_deref().and_then(parse_reference)
    }
}

/// Arguments of [`ExternalIpManager::create`].
#[derive(Debug, Clone)]
pub struct NewExternalIp {
    ip: String,
    network: KeyOrName,
    hostname: Option<String>,
    description: Option<String>,
}

impl NewExternalIp {
    /// `ip` on the parent network, by default the one named `External`.
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            network: KeyOrName::Name("External".to_owned()),
            hostname: None,
            description: None,
        }
    }

    pub fn network(mut self, network: impl Into<KeyOrName>) -> Self {
        self.network = network.into();
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// External IPs of one tenant.
#[derive(Clone)]
pub struct ExternalIpManager {
    inner: ResourceManager<ExternalIp>,
    tenant: TenantRef,
}

impl ExternalIpManager {
    pub fn new(client: &Client, tenant: TenantRef) -> Self {
        let scope = format!("owner eq {} and type eq 'virtual'", quote(&tenant.owner()));
        Self {
            inner: ResourceManager::scoped(client, VNET_ADDRESSES, scope),
            tenant,
        }
    }

    pub async fn list(&self) -> Result<Vec<ExternalIp>> {
        self.inner.list(&ListParams::new()).await
    }

    pub async fn get_by_key(&self, key: u64) -> Result<ExternalIp> {
        self.inner.get_by_key(&key).await
    }

    pub async fn delete(&self, key: u64) -> Result<()> {
        self.inner.delete(&key).await
    }

    pub async fn get_by_ip(&self, ip: &str) -> Result<ExternalIp> {
        self.inner
            .find_one(ListParams::new().term("ip", ip))
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("external IP {ip} for tenant {}", self.tenant.name))
            })
    }

    pub async fn create(&self, address: NewExternalIp) -> Result<ExternalIp> {
        self.tenant.ensure_not_snapshot("assign an external IP to")?;
        let vnet = address.network.resolve(self.inner.client(), "vnets").await?;
        let fallback = ListParams::new().term("ip", address.ip.as_str());
        let mut body = object(json!({
            "vnet": vnet,
            "ip": address.ip,
            "type": "virtual",
            "owner": self.tenant.owner(),
        }));
        put_opt(&mut body, "hostname", address.hostname);
        put_opt(&mut body, "description", address.description);
        self.inner.create_with_fallback(body, Some(fallback)).await
    }

    pub async fn delete_by_ip(&self, ip: &str) -> Result<()> {
        let address = self.get_by_ip(ip).await?;
        self.inner.delete(&address.key).await
    }
}
