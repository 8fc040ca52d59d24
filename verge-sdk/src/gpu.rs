//! GPUs: NVIDIA vGPU profiles and the GPUs installed in nodes.

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::record::epoch_to_datetime;
use verge_api::{Client, Endpoint, ListParams, ResourceManager, Result};

use crate::util::{object, put_opt};

const VGPU_PROFILES: Endpoint = Endpoint::new("nvidia_vgpu_profiles").fields(&[
    "$key",
    "name",
    "type_id",
    "device_hex",
    "num_heads",
    "frl_config",
    "framebuffer",
    "max_resolution",
    "max_instance",
    "max_instances_per_vm",
    "placement_ids",
    "location",
    "profile_type",
    "grid_license",
    "virtual_function",
    "profile_folder",
]);

const NODE_GPUS: Endpoint = Endpoint::new("node_gpus").fields(&[
    "$key",
    "name",
    "description",
    "pci_device",
    "pci_device#name as pci_device_name",
    "node",
    "node#name as node_name",
    "mode",
    "nvidia_vgpu_profile",
    "display(nvidia_vgpu_profile) as nvidia_vgpu_profile_disp",
    "max_instances",
    "count(instances) as instances_count",
    "modified",
]);

verge_api::api_enum! {
    /// Workload class of a vGPU profile.
    pub enum ProfileType {
        Applications => ("A", "Virtual Applications (vApps)"),
        Desktops => ("B", "Virtual Desktops (vPC)"),
        Compute => ("C", "AI/Machine Learning/Training (vCS or vWS)"),
        Workstations => ("Q", "Virtual Workstations (vWS)"),
    }
}

verge_api::api_enum! {
    /// How a node GPU is offered to VMs.
    pub enum GpuMode {
        None => ("none", "None"),
        Passthrough => ("gpu", "PCI Passthrough"),
        NvidiaVgpu => ("nvidia_vgpu", "NVIDIA vGPU"),
    }
}

// =============================================================================
// vGPU Profiles
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct VgpuProfile {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub type_id: Option<u64>,
    #[serde(default)]
    pub device_hex: Option<String>,
    #[serde(default)]
    pub num_heads: Option<u32>,
    #[serde(default)]
    pub framebuffer: Option<String>,
    #[serde(default)]
    pub max_resolution: Option<String>,
    #[serde(default)]
    pub max_instance: Option<u32>,
    #[serde(default)]
    pub max_instances_per_vm: Option<u32>,
    #[serde(default)]
    pub profile_type: Option<String>,
    #[serde(default)]
    pub grid_license: Option<String>,
    #[serde(default)]
    pub virtual_function: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(VgpuProfile, u64);

impl VgpuProfile {
    pub fn profile_type(&self) -> Option<ProfileType> {
        self.profile_type.as_deref().and_then(ProfileType::from_api_value)
    }

    pub fn is_virtual_function(&self) -> bool {
        self.virtual_function.unwrap_or(false)
    }
}

/// Manager for `nvidia_vgpu_profiles`. Read-only.
#[derive(Clone)]
pub struct VgpuProfileManager {
    inner: ResourceManager<VgpuProfile>,
}

impl Deref for VgpuProfileManager {
    type Target = ResourceManager<VgpuProfile>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl VgpuProfileManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, VGPU_PROFILES),
        }
    }

    pub async fn list_by_type(&self, profile_type: ProfileType) -> Result<Vec<VgpuProfile>> {
        self.inner
            .list(&ListParams::new().term("profile_type", profile_type.api_value()))
            .await
    }
}

// =============================================================================
// Node GPUs
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NodeGpu {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pci_device: Option<u64>,
    #[serde(default)]
    pub pci_device_name: Option<String>,
    #[serde(default)]
    pub node: Option<u64>,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub nvidia_vgpu_profile: Option<u64>,
    #[serde(rename = "nvidia_vgpu_profile_disp", default)]
    pub nvidia_vgpu_profile_name: Option<String>,
    #[serde(default)]
    pub max_instances: Option<u32>,
    #[serde(default)]
    pub instances_count: Option<u32>,
    #[serde(default)]
    pub modified: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(NodeGpu, u64);

impl NodeGpu {
    pub fn mode(&self) -> Option<GpuMode> {
        self.mode.as_deref().and_then(GpuMode::from_api_value)
    }

    pub fn is_passthrough(&self) -> bool {
        self.mode() == Some(GpuMode::Passthrough)
    }

    pub fn is_vgpu(&self) -> bool {
        self.mode() == Some(GpuMode::NvidiaVgpu)
    }

    /// No mode set; the GPU is not offered to VMs.
    pub fn is_disabled(&self) -> bool {
        matches!(self.mode(), None | Some(GpuMode::None))
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified.and_then(epoch_to_datetime)
    }
}

/// Manager for `node_gpus`, optionally limited to one node.
#[derive(Clone)]
pub struct NodeGpuManager {
    inner: ResourceManager<NodeGpu>,
}

impl Deref for NodeGpuManager {
    type Target = ResourceManager<NodeGpu>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl NodeGpuManager {
    pub fn new(client: &Client, node: Option<u64>) -> Self {
        let inner = match node {
            Some(node) => ResourceManager::scoped(client, NODE_GPUS, format!("node eq {node}")),
            None => ResourceManager::new(client, NODE_GPUS),
        };
        Self { inner }
    }

    /// The same manager limited to `node`.
    pub fn for_node(&self, node: u64) -> Self {
        Self::new(self.client(), Some(node))
    }

    pub async fn list_by_mode(&self, mode: GpuMode) -> Result<Vec<NodeGpu>> {
        self.inner
            .list(&ListParams::new().term("mode", mode.api_value()))
            .await
    }

    /// GPUs with any mode other than `none`.
    pub async fn list_enabled(&self) -> Result<Vec<NodeGpu>> {
        self.inner
            .list(&ListParams::new().filter("mode ne 'none'"))
            .await
    }

    /// Switch the mode of a GPU. A vGPU profile is only sent with [`GpuMode::NvidiaVgpu`].
    pub async fn set_mode(&self, key: u64, mode: GpuMode, profile: Option<u64>) -> Result<NodeGpu> {
        let mut body = object(json!({ "mode": mode }));
        if mode == GpuMode::NvidiaVgpu {
            put_opt(&mut body, "nvidia_vgpu_profile", profile);
        }
        self.inner.update(&key, body).await
    }
}
