//! Physical nodes of the cluster.

use std::ops::Deref;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;
use verge_api::{Client, Endpoint, ListParams, ResourceManager, Result};

use crate::gpu::NodeGpuManager;

const NODES: Endpoint = Endpoint::new("nodes")
    .fields(&[
        "$key",
        "name",
        "description",
        "status",
        "maintenance",
        "cluster",
        "cluster#name as cluster_name",
        "machine",
        "ram",
        "cores",
        "vsan_connected",
        "running",
    ])
    .actions("node_actions", "node");

#[derive(Debug, Clone, Deserialize)]
pub struct Node {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub maintenance: Option<bool>,
    #[serde(default)]
    pub cluster: Option<u64>,
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub machine: Option<u64>,
    /// MB.
    #[serde(default)]
    pub ram: Option<u64>,
    #[serde(default)]
    pub cores: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(Node, u64);

impl Node {
    pub fn is_online(&self) -> bool {
        self.status.as_deref() == Some("online")
    }

    pub fn is_maintenance(&self) -> bool {
        self.maintenance.unwrap_or(false)
    }
}

/// Manager for `nodes`.
#[derive(Clone)]
pub struct NodeManager {
    inner: ResourceManager<Node>,
}

impl Deref for NodeManager {
    type Target = ResourceManager<Node>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl NodeManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, NODES),
        }
    }

    pub async fn list_in_cluster(&self, cluster: u64) -> Result<Vec<Node>> {
        self.inner.list(&ListParams::new().term("cluster", cluster)).await
    }

    /// Migrate workloads off a node and hold it out of scheduling.
    pub async fn enable_maintenance(&self, key: u64) -> Result<Option<Value>> {
        info!(node = key, "entering maintenance mode");
        self.inner.action(&key, "maintenance", Map::new()).await
    }

    pub async fn disable_maintenance(&self, key: u64) -> Result<Option<Value>> {
        info!(node = key, "leaving maintenance mode");
        self.inner.action(&key, "leavemaintenance", Map::new()).await
    }

    /// GPUs installed in one node.
    pub fn gpus(&self, node: u64) -> NodeGpuManager {
        NodeGpuManager::new(self.client(), Some(node))
    }
}
