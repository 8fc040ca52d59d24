use std::ops::Deref;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{info, warn};
use verge_api::record::epoch_to_datetime;
use verge_api::{Client, Endpoint, Error, ListParams, ResourceManager, Result};

use super::{VMS, Vm};
use crate::tasks::{TaskManager, WaitOptions, task_key};
use crate::util::{as_u64, object};

const MACHINE_SNAPSHOTS: Endpoint = Endpoint::new("machine_snapshots")
    .fields(&[
        "$key",
        "name",
        "description",
        "created",
        "expires",
        "expires_type",
        "quiesced",
        "created_manually",
        "machine",
        "snap_machine",
        "snapshot_period",
    ])
    .sort("-created");

/// A point-in-time copy of a VM's machine.
#[derive(Debug, Clone, Deserialize)]
pub struct VmSnapshot {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub expires: Option<i64>,
    #[serde(default)]
    pub expires_type: Option<String>,
    #[serde(default)]
    pub quiesced: Option<bool>,
    #[serde(default)]
    pub created_manually: Option<bool>,
    #[serde(default)]
    pub machine: Option<u64>,
    /// Machine of the hidden VM holding the snapshot state.
    #[serde(default)]
    pub snap_machine: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(VmSnapshot, u64);

impl VmSnapshot {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(epoch_to_datetime)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires.and_then(epoch_to_datetime)
    }

    pub fn never_expires(&self) -> bool {
        self.expires_type.as_deref() == Some("never") || self.expires == Some(0)
    }

    pub fn is_quiesced(&self) -> bool {
        self.quiesced.unwrap_or(false)
    }
}

/// Arguments of [`VmSnapshotManager::create`].
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    name: Option<String>,
    retention: Duration,
    quiesce: bool,
    description: String,
}

impl Default for NewSnapshot {
    fn default() -> Self {
        Self {
            name: None,
            retention: Duration::from_secs(86_400),
            quiesce: false,
            description: String::new(),
        }
    }
}

impl NewSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults to `Snapshot-<YYYYmmdd-HHMMSS>`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// How long to keep the snapshot. Zero keeps it forever.
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Freeze guest I/O first (needs the guest agent).
    pub fn quiesce(mut self, quiesce: bool) -> Self {
        self.quiesce = quiesce;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn into_body(self, machine: u64, now: DateTime<Utc>) -> Map<String, Value> {
        let name = self
            .name
            .unwrap_or_else(|| format!("Snapshot-{}", now.format("%Y%m%d-%H%M%S")));
        let mut body = object(json!({
            "machine": machine,
            "name": name,
            "created_manually": true,
            "quiesce": self.quiesce,
        }));
        if !self.retention.is_zero() {
            body.insert(
                "expires".to_owned(),
                (now.timestamp() + self.retention.as_secs() as i64).into(),
            );
        }
        if !self.description.is_empty() {
            body.insert("description".to_owned(), self.description.into());
        }
        body
    }
}

/// How [`VmSnapshotManager::restore`] brings a snapshot back.
#[derive(Debug, Clone, Default)]
pub struct RestoreSnapshot {
    name: Option<String>,
    replace_original: bool,
    power_on: bool,
}

impl RestoreSnapshot {
    /// Restore as a new VM, named `"<snapshot> restored"` unless renamed.
    pub fn as_clone() -> Self {
        Self::default()
    }

    /// Revert the original VM. It must be powered off.
    pub fn in_place() -> Self {
        Self {
            replace_original: true,
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Power the result on once the restore task finishes.
    pub fn power_on(mut self, power_on: bool) -> Self {
        self.power_on = power_on;
        self
    }
}

/// Manager for the snapshots of one VM.
#[derive(Clone)]
pub struct VmSnapshotManager {
    inner: ResourceManager<VmSnapshot>,
    vm: u64,
    machine: u64,
}

impl Deref for VmSnapshotManager {
    type Target = ResourceManager<VmSnapshot>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl VmSnapshotManager {
    pub fn new(client: &Client, vm: u64, machine: u64) -> Self {
        Self {
            inner: ResourceManager::scoped(
                client,
                MACHINE_SNAPSHOTS,
                format!("machine eq {machine}"),
            ),
            vm,
            machine,
        }
    }

    pub async fn create(&self, snapshot: NewSnapshot) -> Result<VmSnapshot> {
        self.inner
            .create(snapshot.into_body(self.machine, Utc::now()))
            .await
    }

    /// Restore a snapshot in place or as a new VM.
    ///
    /// Returns the raw response of the restore or clone action.
    pub async fn restore(&self, key: u64, how: RestoreSnapshot) -> Result<Option<Value>> {
        let snapshot = self.inner.get_by_key(&key).await?;
        let snap_machine = snapshot.snap_machine.ok_or_else(|| {
            Error::InvalidArgument(format!("snapshot {key} has no snapshot machine"))
        })?;

        let vms = ResourceManager::<Vm>::new(self.client(), VMS);
        let snap_vm = vms
            .list(
                &ListParams::new()
                    .term("machine", snap_machine)
                    .fields(["$key", "name", "machine", "is_snapshot"]),
            )
            .await?
            .into_iter()
            .find(Vm::is_snapshot)
            .ok_or_else(|| {
                Error::NotFound(format!("snapshot VM for machine {snap_machine}"))
            })?;

        let (action, params, target) = if how.replace_original {
            if vms.get_by_key(&self.vm).await?.is_running() {
                return Err(Error::InvalidArgument(
                    "VM must be powered off for an in-place restore".to_owned(),
                ));
            }
            ("restore", Map::new(), Some(self.vm))
        } else {
            let name = how
                .name
                .clone()
                .unwrap_or_else(|| format!("{} restored", snapshot.name));
            ("clone", object(json!({ "params": { "name": name } })), None)
        };

        info!(snapshot = key, action, "restoring VM snapshot");
        let response = vms.action(&snap_vm.key, action, params).await?;

        if how.power_on {
            let target = target.or_else(|| cloned_vm_key(response.as_ref()));
            if let Some(target) = target {
                if let Some(task) = task_key(response.as_ref()) {
                    TaskManager::new(self.client())
                        .wait(task, WaitOptions::default())
                        .await?;
                }
                vms.action(&target, "poweron", Map::new()).await?;
            } else {
                warn!(snapshot = key, "restore response carried no VM key, skipping power on");
            }
        }
        Ok(response)
    }
}

fn cloned_vm_key(response: Option<&Value>) -> Option<u64> {
    let response = response?;
    response
        .get("$key")
        .or_else(|| response.get("key"))
        .and_then(as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_default_name_and_expiry() {
        let body = NewSnapshot::new().into_body(7, now());
        assert_eq!(body["name"], "Snapshot-20231114-221320");
        assert_eq!(body["expires"], 1_700_086_400i64);
        assert_eq!(body["machine"], 7);
        assert_eq!(body["created_manually"], true);
    }

    #[test]
    fn test_zero_retention_never_expires() {
        let body = NewSnapshot::new()
            .name("keep")
            .retention(Duration::ZERO)
            .into_body(7, now());
        assert_eq!(body["name"], "keep");
        assert!(!body.contains_key("expires"));
    }

    #[test]
    fn test_never_expires_flags() {
        let snap: VmSnapshot =
            serde_json::from_value(json!({"$key": 1, "expires_type": "never"})).unwrap();
        assert!(snap.never_expires());
        let snap: VmSnapshot = serde_json::from_value(json!({"$key": 1, "expires": 0})).unwrap();
        assert!(snap.never_expires());
        assert_eq!(snap.expires_at(), None);
    }

    #[test]
    fn test_cloned_vm_key() {
        assert_eq!(cloned_vm_key(Some(&json!({"$key": 31}))), Some(31));
        assert_eq!(cloned_vm_key(Some(&json!({"key": "32"}))), Some(32));
        assert_eq!(cloned_vm_key(None), None);
    }
}
