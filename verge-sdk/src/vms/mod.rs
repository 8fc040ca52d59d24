//! Virtual machines and their drives, NICs and snapshots.
//!
//! A VM row (`vms`) owns a *machine* row; drives, NICs and snapshots hang off
//! the machine key, not the VM key. Use [`VmManager::drives`] and friends to
//! get a manager scoped to one VM's machine.

mod drives;
mod nics;
mod snapshots;

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;
use verge_api::key::reference;
use verge_api::record::epoch_to_datetime;
use verge_api::{Client, Endpoint, Error, ListParams, ResourceManager, Result};

pub use drives::{Drive, DriveInterface, DriveManager, DriveMedia, ImportDrive, NewDrive};
pub use nics::{NewNic, Nic, NicInterface, NicManager};
pub use snapshots::{NewSnapshot, RestoreSnapshot, VmSnapshot, VmSnapshotManager};

use crate::cloudinit_files::{CloudInitFileManager, NewCloudInitFile};
use crate::tags::{TagMember, TagMemberManager};
use crate::util::{object, put_opt};

pub(crate) const VMS: Endpoint = Endpoint::new("vms")
    .fields(&[
        "$key",
        "name",
        "description",
        "enabled",
        "cpu_cores",
        "ram",
        "os_family",
        "guest_agent",
        "uefi",
        "secure_boot",
        "machine_type",
        "created",
        "modified",
        "is_snapshot",
        "machine",
        "machine#status#status as status",
        "machine#status#running as running",
        "machine#status#node as node_key",
        "machine#status#node#name as node_name",
        "machine#cluster as cluster_key",
        "machine#cluster#name as cluster_name",
        "machine#ha_group as ha_group",
        "cloudinit_datasource",
    ])
    .actions("vm_actions", "vm");

const DEFAULT_MACHINE_TYPE: &str = "pc-q35-10.0";

verge_api::api_enum! {
    /// Guest operating system family.
    pub enum OsFamily {
        Linux => ("linux", "Linux"),
        Windows => ("windows", "Windows"),
        FreeBsd => ("freebsd", "FreeBSD"),
        Other => ("other", "Other"),
    }
}

verge_api::api_enum! {
    /// How cloud-init files reach the guest.
    pub enum CloudInitDatasource {
        ConfigDrive => ("config_drive_v2", "ConfigDrive"),
        NoCloud => ("nocloud", "NoCloud"),
        Disabled => ("none", "None"),
    }
}

/// A virtual machine.
#[derive(Debug, Clone, Deserialize)]
pub struct Vm {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub cpu_cores: Option<u32>,
    /// Memory in MB.
    #[serde(default)]
    pub ram: Option<u64>,
    #[serde(default)]
    pub os_family: Option<String>,
    #[serde(default)]
    pub guest_agent: Option<bool>,
    #[serde(default)]
    pub uefi: Option<bool>,
    #[serde(default)]
    pub secure_boot: Option<bool>,
    #[serde(default)]
    pub machine_type: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub modified: Option<i64>,
    #[serde(default)]
    pub is_snapshot: Option<bool>,
    #[serde(default)]
    pub machine: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub running: Option<bool>,
    #[serde(default)]
    pub node_key: Option<u64>,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub cluster_key: Option<u64>,
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub cloudinit_datasource: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(Vm, u64);

impl Vm {
    pub fn is_running(&self) -> bool {
        self.running.unwrap_or(false)
    }

    pub fn is_snapshot(&self) -> bool {
        self.is_snapshot.unwrap_or(false)
    }

    /// Machine status, `"unknown"` when the server sent none.
    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or("unknown")
    }

    pub fn os_family(&self) -> Option<OsFamily> {
        self.os_family.as_deref().and_then(OsFamily::from_api_value)
    }

    pub fn cloudinit_datasource(&self) -> Option<CloudInitDatasource> {
        self.cloudinit_datasource
            .as_deref()
            .and_then(CloudInitDatasource::from_api_value)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(epoch_to_datetime)
    }

    /// Key of the machine row that owns drives, NICs and snapshots.
    pub fn machine_key(&self) -> Result<u64> {
        self.machine.ok_or_else(|| {
            Error::InvalidArgument(format!("VM {} has no machine", self.key))
        })
    }
}

// =============================================================================
// Creation
// =============================================================================

/// Arguments of [`VmManager::create`].
#[derive(Debug, Clone)]
pub struct NewVm {
    name: String,
    ram_mb: u64,
    cpu_cores: u32,
    description: String,
    os_family: OsFamily,
    machine_type: String,
    datasource: Option<CloudInitDatasource>,
    cloud_init: Vec<NewCloudInitFile>,
    extra: Map<String, Value>,
}

impl NewVm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ram_mb: 1024,
            cpu_cores: 1,
            description: String::new(),
            os_family: OsFamily::Linux,
            machine_type: DEFAULT_MACHINE_TYPE.to_owned(),
            datasource: None,
            cloud_init: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Memory in MB, rounded up to a multiple of 256 on create.
    pub fn ram_mb(mut self, ram_mb: u64) -> Self {
        self.ram_mb = ram_mb;
        self
    }

    pub fn cpu_cores(mut self, cores: u32) -> Self {
        self.cpu_cores = cores;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn os_family(mut self, family: OsFamily) -> Self {
        self.os_family = family;
        self
    }

    pub fn machine_type(mut self, machine_type: impl Into<String>) -> Self {
        self.machine_type = machine_type.into();
        self
    }

    pub fn cloudinit_datasource(mut self, datasource: CloudInitDatasource) -> Self {
        self.datasource = Some(datasource);
        self
    }

    /// Shorthand for a `/user-data` cloud-init file.
    pub fn user_data(self, contents: impl Into<String>) -> Self {
        self.cloud_init_file(NewCloudInitFile::new("/user-data").contents(contents))
    }

    /// Cloud-init file created right after the VM.
    ///
    /// Supplying any file defaults the datasource to
    /// [`ConfigDrive`](CloudInitDatasource::ConfigDrive).
    pub fn cloud_init_file(mut self, file: NewCloudInitFile) -> Self {
        self.cloud_init.push(file);
        self
    }

    /// Any other VM property, sent as-is.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    fn effective_datasource(&self) -> Option<CloudInitDatasource> {
        match self.datasource {
            None if !self.cloud_init.is_empty() => Some(CloudInitDatasource::ConfigDrive),
            other => other,
        }
    }

    fn into_body(self) -> Result<(Map<String, Value>, Vec<NewCloudInitFile>)> {
        let ram = normalize_ram(self.ram_mb)?;
        if ram != self.ram_mb {
            info!(requested = self.ram_mb, normalized = ram, "rounding VM memory up");
        }
        let datasource = self.effective_datasource();

        let mut body = object(json!({
            "name": self.name,
            "ram": ram,
            "cpu_cores": self.cpu_cores,
            "description": self.description,
            "os_family": self.os_family,
            "machine_type": self.machine_type,
        }));
        body.extend(self.extra);
        if let Some(datasource) = datasource.filter(|d| *d != CloudInitDatasource::Disabled) {
            body.insert("cloudinit_datasource".to_owned(), datasource.into());
        }
        Ok((body, self.cloud_init))
    }
}

/// Round a memory size in MB up to the next multiple of 256.
pub fn normalize_ram(ram_mb: u64) -> Result<u64> {
    ram_mb
        .div_ceil(256)
        .checked_mul(256)
        .ok_or_else(|| Error::Validation(format!("RAM size {ram_mb} MB is out of range")))
}

/// Arguments of [`VmManager::hotplug_drive`].
#[derive(Debug, Clone)]
pub struct HotplugDrive {
    name: String,
    size_bytes: u64,
    interface: DriveInterface,
    media: DriveMedia,
    tier: u8,
}

impl HotplugDrive {
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            interface: DriveInterface::VirtioScsi,
            media: DriveMedia::Disk,
            tier: 1,
        }
    }

    pub fn interface(mut self, interface: DriveInterface) -> Self {
        self.interface = interface;
        self
    }

    pub fn media(mut self, media: DriveMedia) -> Self {
        self.media = media;
        self
    }

    pub fn tier(mut self, tier: u8) -> Self {
        self.tier = tier;
        self
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Manager for `vms`.
#[derive(Clone)]
pub struct VmManager {
    inner: ResourceManager<Vm>,
}

impl Deref for VmManager {
    type Target = ResourceManager<Vm>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl VmManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, VMS),
        }
    }

    /// List VMs, excluding snapshot VMs.
    pub async fn list(&self, params: &ListParams) -> Result<Vec<Vm>> {
        self.inner
            .list(&params.clone().term("is_snapshot", false))
            .await
    }

    /// List VMs including the hidden VMs that back snapshots.
    pub async fn list_with_snapshots(&self, params: &ListParams) -> Result<Vec<Vm>> {
        self.inner.list(params).await
    }

    /// Running state is a joined field the server cannot filter on.
    pub async fn list_running(&self) -> Result<Vec<Vm>> {
        let vms = self.list(&ListParams::new()).await?;
        Ok(vms.into_iter().filter(Vm::is_running).collect())
    }

    pub async fn list_stopped(&self) -> Result<Vec<Vm>> {
        let vms = self.list(&ListParams::new()).await?;
        Ok(vms.into_iter().filter(|vm| !vm.is_running()).collect())
    }

    /// Create a VM, then any cloud-init files supplied with it.
    pub async fn create(&self, vm: NewVm) -> Result<Vm> {
        for file in &vm.cloud_init {
            file.check_size()?;
        }
        let (body, cloud_init) = vm.into_body()?;
        let created = self.inner.create(body).await?;

        if !cloud_init.is_empty() {
            let files = CloudInitFileManager::new(self.client());
            for file in cloud_init {
                files.create(created.key, file).await?;
            }
        }
        Ok(created)
    }

    pub fn drives(&self, vm: &Vm) -> Result<DriveManager> {
        Ok(DriveManager::new(self.client(), vm.machine_key()?))
    }

    pub fn nics(&self, vm: &Vm) -> Result<NicManager> {
        Ok(NicManager::new(self.client(), vm.machine_key()?))
    }

    pub fn snapshots(&self, vm: &Vm) -> Result<VmSnapshotManager> {
        Ok(VmSnapshotManager::new(self.client(), vm.key, vm.machine_key()?))
    }

    /// Turn cloud-init delivery on or off.
    pub async fn set_cloudinit_datasource(
        &self,
        key: u64,
        datasource: CloudInitDatasource,
    ) -> Result<Vm> {
        self.inner
            .update(&key, object(json!({ "cloudinit_datasource": datasource })))
            .await
    }

    // =========================================================================
    // Power
    // =========================================================================

    /// Power on a VM, optionally on a preferred node.
    pub async fn power_on(&self, vm: &Vm, preferred_node: Option<u64>) -> Result<Option<Value>> {
        if vm.is_snapshot() {
            return Err(Error::InvalidArgument(format!(
                "VM {} is a snapshot and cannot be powered on",
                vm.name
            )));
        }
        let params = preferred_node.map(|node| object(json!({ "preferred_node": node })));
        self.vm_action(vm.key, "poweron", params).await
    }

    /// Graceful ACPI shutdown, or an immediate kill when `force` is set.
    pub async fn power_off(&self, key: u64, force: bool) -> Result<Option<Value>> {
        let action = if force { "kill" } else { "poweroff" };
        self.vm_action(key, action, None).await
    }

    /// Hard reset.
    pub async fn reset(&self, key: u64) -> Result<Option<Value>> {
        self.vm_action(key, "reset", None).await
    }

    /// Ask the guest agent to reboot.
    pub async fn guest_reboot(&self, key: u64) -> Result<Option<Value>> {
        self.vm_action(key, "guestreset", None).await
    }

    /// Ask the guest agent to shut down.
    pub async fn guest_shutdown(&self, key: u64) -> Result<Option<Value>> {
        self.vm_action(key, "guestshutdown", None).await
    }

    /// Save memory to disk and power off.
    pub async fn hibernate(&self, key: u64) -> Result<Option<Value>> {
        self.vm_action(key, "hibernate", None).await
    }

    // =========================================================================
    // Placement And Copies
    // =========================================================================

    /// Clone a VM. The server names the copy when `name` is `None`.
    pub async fn clone_vm(
        &self,
        key: u64,
        name: Option<&str>,
        preserve_macs: bool,
    ) -> Result<Option<Value>> {
        let mut params = object(json!({ "preserve_macs": preserve_macs }));
        put_opt(&mut params, "name", name);
        self.vm_action(key, "clone", Some(params)).await
    }

    /// Move a VM to another node or cluster.
    pub async fn move_to(
        &self,
        key: u64,
        node: Option<u64>,
        cluster: Option<u64>,
    ) -> Result<Option<Value>> {
        let mut params = Map::new();
        put_opt(&mut params, "node", node);
        put_opt(&mut params, "cluster", cluster);
        self.vm_action(key, "move", (!params.is_empty()).then_some(params))
            .await
    }

    /// Live-migrate a running VM.
    pub async fn migrate(&self, key: u64, preferred_node: Option<u64>) -> Result<Option<Value>> {
        let params = preferred_node.map(|node| object(json!({ "preferred_node": node })));
        self.vm_action(key, "migrate", params).await
    }

    /// Restore from a snapshot key. Without `name` the VM itself is overwritten.
    pub async fn restore(
        &self,
        key: u64,
        snapshot: u64,
        preserve_macs: bool,
        name: Option<&str>,
    ) -> Result<Option<Value>> {
        let mut params = object(json!({ "snapshot": snapshot, "preserve_macs": preserve_macs }));
        put_opt(&mut params, "name", name);
        self.vm_action(key, "restore", Some(params)).await
    }

    // =========================================================================
    // Hotplug
    // =========================================================================

    pub async fn hotplug_drive(&self, key: u64, drive: HotplugDrive) -> Result<Option<Value>> {
        let params = object(json!({
            "name": drive.name,
            "disksize": drive.size_bytes,
            "interface": drive.interface,
            "media": drive.media,
            "preferred_tier": drive.tier.to_string(),
        }));
        self.vm_action(key, "hotplugdrive", Some(params)).await
    }

    pub async fn hotplug_nic(
        &self,
        key: u64,
        name: &str,
        network: u64,
        interface: NicInterface,
    ) -> Result<Option<Value>> {
        let params = object(json!({ "name": name, "vnet": network, "interface": interface }));
        self.vm_action(key, "hotplugnic", Some(params)).await
    }

    // =========================================================================
    // Tags
    // =========================================================================

    /// Tag memberships of a VM.
    pub async fn tags(&self, key: u64) -> Result<Vec<TagMember>> {
        TagMemberManager::all(self.client())
            .list(&ListParams::new().term("member", reference("vms", &key)))
            .await
    }

    pub async fn tag(&self, key: u64, tag: u64) -> Result<TagMember> {
        TagMemberManager::new(self.client(), tag)
            .add(crate::tags::TaggableType::Vm, key)
            .await
    }

    pub async fn untag(&self, key: u64, tag: u64) -> Result<()> {
        TagMemberManager::new(self.client(), tag)
            .remove_resource(crate::tags::TaggableType::Vm, key)
            .await
    }

    /// `vm_actions` carries arguments in a nested `params` object.
    pub(crate) async fn vm_action(
        &self,
        key: u64,
        action: &str,
        params: Option<Map<String, Value>>,
    ) -> Result<Option<Value>> {
        let mut body = Map::new();
        if let Some(params) = params {
            body.insert("params".to_owned(), Value::Object(params));
        }
        self.inner.action(&key, action, body).await
    }
}
