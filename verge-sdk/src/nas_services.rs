//! NAS services: service VMs that host NAS volumes and their CIFS/NFS shares.
//!
//! A service is a row in `vm_services` pointing at an ordinary VM. Power
//! actions go to that VM through `vm_actions`.

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;
use verge_api::record::epoch_to_datetime;
use verge_api::{Client, Endpoint, Error, ListParams, ResourceManager, Result};

use crate::nas_volumes::NasVolumeManager;
use crate::util::{KeyOrName, as_u64};
use crate::vms::VmManager;

const NAS_SERVICES: Endpoint = Endpoint::new("vm_services").fields(&[
    "$key",
    "name",
    "vm",
    "vm#name as vm_name",
    "vm#description as vm_description",
    "vm#machine#status#status as vm_status",
    "vm#machine#status#running as vm_running",
    "vm#machine#cores as vm_cores",
    "vm#machine#ram as vm_ram",
    "vm#created as created",
    "vm#modified as modified",
    "max_imports",
    "max_syncs",
    "disable_swap",
    "read_ahead_kb_default",
    "cifs",
    "nfs",
    "count(volumes) as volume_count",
]);

#[derive(Debug, Clone, Deserialize)]
pub struct NasService {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vm: Option<Value>,
    #[serde(default)]
    pub vm_name: Option<String>,
    #[serde(default)]
    pub vm_description: Option<String>,
    #[serde(default)]
    pub vm_status: Option<String>,
    #[serde(default)]
    pub vm_running: Option<bool>,
    #[serde(default)]
    pub vm_cores: Option<u32>,
    #[serde(default)]
    pub vm_ram: Option<u64>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub modified: Option<i64>,
    #[serde(default)]
    pub max_imports: Option<u32>,
    #[serde(default)]
    pub max_syncs: Option<u32>,
    #[serde(default)]
    pub disable_swap: Option<bool>,
    #[serde(default)]
    pub read_ahead_kb_default: Option<Value>,
    #[serde(default)]
    pub volume_count: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(NasService, u64);

impl NasService {
    pub fn is_running(&self) -> bool {
        self.vm_running.unwrap_or(false) || self.vm_status.as_deref() == Some("running")
    }

    /// Key of the VM backing the service.
    pub fn vm_key(&self) -> Option<u64> {
        self.vm.as_ref().and_then(as_u64)
    }

    pub fn volume_count(&self) -> u64 {
        self.volume_count.unwrap_or(0)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(epoch_to_datetime)
    }

    fn require_vm(&self) -> Result<u64> {
        self.vm_key().ok_or_else(|| {
            Error::Validation(format!("NAS service {} has no backing VM", self.name))
        })
    }
}

/// Manager for `vm_services`.
#[derive(Clone)]
pub struct NasServiceManager {
    inner: ResourceManager<NasService>,
}

impl Deref for NasServiceManager {
    type Target = ResourceManager<NasService>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl NasServiceManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, NAS_SERVICES),
        }
    }

    /// Services whose VM reports `status` (e.g. `running`, `stopped`).
    pub async fn list_by_status(&self, status: &str) -> Result<Vec<NasService>> {
        let status = status.to_lowercase();
        Ok(self
            .inner
            .list(&ListParams::new())
            .await?
            .into_iter()
            .filter(|service| service.vm_status.as_deref() == Some(status.as_str()))
            .collect())
    }

    pub async fn list_running(&self) -> Result<Vec<NasService>> {
        self.list_by_status("running").await
    }

    pub async fn list_stopped(&self) -> Result<Vec<NasService>> {
        self.list_by_status("stopped").await
    }

    /// Fetch a service by key or by name.
    pub async fn get_by_ref(&self, service: &KeyOrName) -> Result<NasService> {
        match service {
            KeyOrName::Key(key) => self.inner.get_by_key(key).await,
            KeyOrName::Name(name) => self.inner.get_by_name(name).await,
        }
    }

    /// Key of a service given by key or name. A key is returned as-is.
    pub async fn resolve_key(&self, service: &KeyOrName) -> Result<u64> {
        match service {
            KeyOrName::Key(key) => Ok(*key),
            KeyOrName::Name(_) => Ok(self.get_by_ref(service).await?.key),
        }
    }

    /// Volumes hosted by `service`.
    pub fn volumes(&self, service: &NasService) -> NasVolumeManager {
        NasVolumeManager::for_service(self.inner.client(), service.key)
    }

    pub async fn power_on(&self, key: u64) -> Result<Option<Value>> {
        let vm = self.inner.get_by_key(&key).await?.require_vm()?;
        self.vms().vm_action(vm, "poweron", None).await
    }

    /// Shut the service VM down, or kill it when `force` is set.
    pub async fn power_off(&self, key: u64, force: bool) -> Result<Option<Value>> {
        let vm = self.inner.get_by_key(&key).await?.require_vm()?;
        self.vms().power_off(vm, force).await
    }

    pub async fn restart(&self, key: u64) -> Result<Option<Value>> {
        let vm = self.inner.get_by_key(&key).await?.require_vm()?;
        self.vms().reset(vm).await
    }

    /// Remove a stopped service by deleting its VM.
    ///
    /// A service that still hosts volumes is refused unless `force` is set,
    /// in which case the volumes and their data go with it.
    pub async fn delete(&self, key: u64, force: bool) -> Result<()> {
        let service = self.inner.get_by_key(&key).await?;
        if service.is_running() {
            return Err(Error::InvalidArgument(format!(
                "cannot delete NAS service {}: power it off first",
                service.name
            )));
        }
        if service.volume_count() > 0 && !force {
            return Err(Error::InvalidArgument(format!(
                "cannot delete NAS service {}: it has {} volume(s)",
                service.name,
                service.volume_count()
            )));
        }

        info!(service = %service.name, force, "deleting NAS service");
        match service.vm_key() {
            Some(vm) => self.vms().delete(&vm).await,
            None => self.inner.delete(&key).await,
        }
    }

    fn vms(&self) -> VmManager {
        VmManager::new(self.inner.client())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn service(value: Value) -> NasService {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_running_from_either_field() {
        assert!(service(json!({"$key": 1, "vm_running": true})).is_running());
        assert!(service(json!({"$key": 1, "vm_status": "running"})).is_running());
        assert!(!service(json!({"$key": 1, "vm_status": "stopped"})).is_running());
    }

    #[test]
    fn test_vm_key_accepts_strings() {
        let nas = service(json!({"$key": 2, "name": "nas01", "vm": "14", "volume_count": 3}));
        assert_eq!(nas.vm_key(), Some(14));
        assert_eq!(nas.volume_count(), 3);
        assert!(service(json!({"$key": 2})).require_vm().is_err());
    }
}
