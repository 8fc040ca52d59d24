//! Resource groups: pools of host devices (PCI, USB, GPUs) handed to VMs.

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use verge_api::record::epoch_to_datetime;
use verge_api::{Client, Endpoint, Error, ListParams, Lookup, ResourceManager, Result};

const RESOURCE_GROUPS: Endpoint = Endpoint::new("resource_groups").fields(&[
    "$key",
    "uuid",
    "name",
    "description",
    "type",
    "display(type) as type_display",
    "class",
    "display(class) as class_display",
    "enabled",
    "count(resources) as resource_count",
    "created",
    "modified",
]);

verge_api::api_enum! {
    /// Kind of host device a group pools.
    pub enum DeviceType {
        Pci => ("node_pci_devices", "PCI"),
        SriovNic => ("node_sriov_nic_devices", "SR-IOV NIC"),
        Usb => ("node_usb_devices", "USB"),
        HostGpu => ("node_host_gpu_devices", "Host GPU"),
        NvidiaVgpu => ("node_nvidia_vgpu_devices", "NVIDIA vGPU"),
    }
}

verge_api::api_enum! {
    pub enum DeviceClass {
        Gpu => ("gpu", "GPU"),
        Vgpu => ("vgpu", "vGPU"),
        Storage => ("storage", "Storage"),
        Hid => ("hid", "Human Input Device"),
        Usb => ("usb", "Generic USB Device"),
        Network => ("network", "Network"),
        Media => ("media", "Media"),
        Audio => ("audio", "Audio"),
        Fpga => ("fpga", "FPGA"),
        Pci => ("pci", "Generic PCI"),
        Unknown => ("unknown", "Unknown"),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceGroup {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub type_display: Option<String>,
    #[serde(rename = "class", default)]
    pub device_class: Option<String>,
    #[serde(default)]
    pub class_display: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub resource_count: Option<u32>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub modified: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(ResourceGroup, u64);

impl ResourceGroup {
    pub fn device_type(&self) -> Option<DeviceType> {
        self.device_type.as_deref().and_then(DeviceType::from_api_value)
    }

    pub fn device_class(&self) -> Option<DeviceClass> {
        self.device_class.as_deref().and_then(DeviceClass::from_api_value)
    }

    /// Server-rendered type name, else the known display name, else the raw value.
    pub fn device_type_display(&self) -> &str {
        display(
            self.type_display.as_deref(),
            self.device_type().map(DeviceType::display_name),
            self.device_type.as_deref(),
        )
    }

    pub fn device_class_display(&self) -> &str {
        display(
            self.class_display.as_deref(),
            self.device_class().map(DeviceClass::display_name),
            self.device_class.as_deref(),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(epoch_to_datetime)
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified.and_then(epoch_to_datetime)
    }
}

fn display<'a>(server: Option<&'a str>, known: Option<&'static str>, raw: Option<&'a str>) -> &'a str {
    server
        .filter(|s| !s.is_empty())
        .or(known)
        .or(raw)
        .unwrap_or_default()
}

/// Manager for `resource_groups`.
#[derive(Clone)]
pub struct ResourceGroupManager {
    inner: ResourceManager<ResourceGroup>,
}

impl Deref for ResourceGroupManager {
    type Target = ResourceManager<ResourceGroup>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl ResourceGroupManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, RESOURCE_GROUPS),
        }
    }

    /// Fetch by key, name or UUID; the key wins when several are given.
    pub async fn find(
        &self,
        key: Option<u64>,
        name: Option<&str>,
        uuid: Option<&str>,
    ) -> Result<ResourceGroup> {
        match (key, name, uuid) {
            (None, None, Some(uuid)) => self.get_by_uuid(uuid).await,
            (key, name, _) => self.inner.get(Lookup::from_parts(key, name)?).await,
        }
    }

    /// UUIDs are stored lower-case.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<ResourceGroup> {
        self.inner
            .find_one(ListParams::new().term("uuid", uuid.to_lowercase()))
            .await?
            .ok_or_else(|| Error::NotFound(format!("resource group with UUID {uuid:?}")))
    }

    pub async fn list_enabled(&self) -> Result<Vec<ResourceGroup>> {
        self.inner.list(&ListParams::new().term("enabled", true)).await
    }

    pub async fn list_disabled(&self) -> Result<Vec<ResourceGroup>> {
        self.inner.list(&ListParams::new().term("enabled", false)).await
    }

    pub async fn list_by_type(
        &self,
        device_type: DeviceType,
        enabled: Option<bool>,
    ) -> Result<Vec<ResourceGroup>> {
        let params = ListParams::new()
            .term("type", device_type.api_value())
            .term("enabled", enabled);
        self.inner.list(&params).await
    }

    pub async fn list_by_class(
        &self,
        device_class: DeviceClass,
        enabled: Option<bool>,
    ) -> Result<Vec<ResourceGroup>> {
        let params = ListParams::new()
            .term("class", device_class.api_value())
            .term("enabled", enabled);
        self.inner.list(&params).await
    }
}
