use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::record::round2;
use verge_api::{Client, Endpoint, Error, ListParams, ResourceManager, Result};

use super::TenantRef;
use crate::util::{object, put_opt};

const TENANT_NODES: Endpoint = Endpoint::new("tenant_nodes").fields(&[
    "$key",
    "tenant",
    "name",
    "nodeid",
    "cpu_cores",
    "ram",
    "enabled",
    "description",
    "machine",
    "machine#status#running as running",
    "machine#status#status as status",
    "machine#status#node#$display as host_node",
    "machine#cluster as cluster",
    "machine#cluster#$display as cluster_name",
    "machine#preferred_node as preferred_node",
    "machine#preferred_node#$display as preferred_node_name",
    "machine#on_power_loss as on_power_loss",
]);

const MIN_RAM_MB: u64 = 2048;

/// A virtual node giving a tenant CPU and RAM.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantNode {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub tenant: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodeid: Option<u64>,
    #[serde(default)]
    pub cpu_cores: Option<u32>,
    /// MB.
    #[serde(default)]
    pub ram: Option<u64>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub machine: Option<u64>,
    #[serde(default)]
    pub running: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub host_node: Option<String>,
    #[serde(default)]
    pub cluster: Option<u64>,
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub preferred_node: Option<u64>,
    #[serde(default)]
    pub preferred_node_name: Option<String>,
    #[serde(default)]
    pub on_power_loss: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(TenantNode, u64);

impl TenantNode {
    pub fn ram_gb(&self) -> f64 {
        round2(self.ram.unwrap_or(0) as f64 / 1024.0)
    }

    pub fn is_running(&self) -> bool {
        self.running.unwrap_or(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }
}

/// Arguments of [`TenantNodeManager::create`].
#[derive(Debug, Clone)]
pub struct NewTenantNode {
    cpu_cores: u32,
    ram_mb: u64,
    cluster: u64,
    preferred_node: Option<u64>,
    name: Option<String>,
    description: Option<String>,
}

impl Default for NewTenantNode {
    /// 4 cores and 16 GB on cluster 1.
    fn default() -> Self {
        Self {
            cpu_cores: 4,
            ram_mb: 16_384,
            cluster: 1,
            preferred_node: None,
            name: None,
            description: None,
        }
    }
}

impl NewTenantNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cpu_cores(mut self, cores: u32) -> Self {
        self.cpu_cores = cores;
        self
    }

    pub fn ram_mb(mut self, ram_mb: u64) -> Self {
        self.ram_mb = ram_mb;
        self
    }

    pub fn ram_gb(self, ram_gb: u64) -> Self {
        self.ram_mb(ram_gb.saturating_mul(1024))
    }

    pub fn cluster(mut self, cluster: u64) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn preferred_node(mut self, node: u64) -> Self {
        self.preferred_node = Some(node);
        self
    }

    /// Generated by the server when unset.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.ram_mb < MIN_RAM_MB {
            return Err(Error::InvalidArgument(format!(
                "RAM must be at least {MIN_RAM_MB} MB"
            )));
        }
        if self.cpu_cores < 1 {
            return Err(Error::InvalidArgument(
                "CPU cores must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Nodes of one tenant.
#[derive(Clone)]
pub struct TenantNodeManager {
    inner: ResourceManager<TenantNode>,
    tenant: TenantRef,
}

impl TenantNodeManager {
    pub fn new(client: &Client, tenant: TenantRef) -> Self {
        Self {
            inner: ResourceManager::scoped(client, TENANT_NODES, format!("tenant eq {}", tenant.key)),
            tenant,
        }
    }

    pub async fn list(&self) -> Result<Vec<TenantNode>> {
        self.inner.list(&ListParams::new()).await
    }

    pub async fn get_by_key(&self, key: u64) -> Result<TenantNode> {
        self.inner.get_by_key(&key).await
    }

    pub async fn delete(&self, key: u64) -> Result<()> {
        self.inner.delete(&key).await
    }

    pub async fn create(&self, node: NewTenantNode) -> Result<TenantNode> {
        self.tenant.ensure_not_snapshot("add nodes to")?;
        node.validate()?;

        let mut body = object(json!({
            "tenant": self.tenant.key,
            "cpu_cores": node.cpu_cores,
            "ram": node.ram_mb,
            "cluster": node.cluster,
        }));
        put_opt(&mut body, "preferred_node", node.preferred_node);
        put_opt(&mut body, "description", node.description.filter(|d| !d.is_empty()));
        let fallback = node
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .map(|name| ListParams::new().term("name", name));
        put_opt(&mut body, "name", node.name.filter(|n| !n.is_empty()));
        self.inner.create_with_fallback(body, fallback).await
    }

    /// Change cores, RAM or other fields of a node.
    pub async fn update(&self, key: u64, fields: Map<String, Value>) -> Result<TenantNode> {
        self.inner.update(&key, fields).await
    }
}
