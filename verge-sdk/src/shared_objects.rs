//! VMs shared from the parent system with tenants.
//!
//! Sharing snapshots the VM's machine and offers the snapshot to the
//! recipient's inbox, from where the tenant imports its own copy.

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{error, info};
use uuid::Uuid;
use verge_api::key::{parse_reference, reference};
use verge_api::manager::created_key;
use verge_api::record::epoch_to_datetime;
use verge_api::{
    Client, Compensation, Endpoint, Error, ListParams, Lookup, ResourceManager, Result,
};

use crate::util::{KeyOrName, object, put_opt};
use crate::vms::{VMS, Vm};

const SHARED_OBJECTS: Endpoint = Endpoint::new("shared_objects")
    .fields(&[
        "$key",
        "recipient",
        "recipient#name as recipient_name",
        "type",
        "name",
        "description",
        "created",
        "inbox",
        "snapshot",
        "id",
    ])
    .actions("shared_object_actions", "shared_object")
    .lookup_by_filter();

const MACHINE_SNAPSHOTS: &str = "machine_snapshots";

#[derive(Debug, Clone, Deserialize)]
pub struct SharedObject {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Recipient tenant key.
    #[serde(default)]
    pub recipient: Option<u64>,
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(rename = "type", default)]
    pub object_type: Option<String>,
    /// Shared object reference, e.g. `vms/12`.
    #[serde(rename = "id", default)]
    pub object_id: Option<String>,
    /// `machine_snapshots/<key>`.
    #[serde(default)]
    pub snapshot: Option<String>,
    #[serde(default)]
    pub inbox: Option<bool>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(SharedObject, u64);

impl SharedObject {
    pub fn object_type(&self) -> &str {
        self.object_type.as_deref().unwrap_or("vm")
    }

    pub fn snapshot_key(&self) -> Option<u64> {
        self.snapshot.as_deref().and_then(parse_reference)
    }

    /// Waiting in the recipient's inbox for import.
    pub fn is_inbox(&self) -> bool {
        self.inbox.unwrap_or(false)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(epoch_to_datetime)
    }
}

/// Arguments of [`SharedObjectManager::create`].
#[derive(Debug, Clone)]
pub struct ShareVm {
    tenant: u64,
    vm: KeyOrName,
    name: Option<String>,
    description: Option<String>,
    snapshot_name: Option<String>,
}

impl ShareVm {
    pub fn new(tenant: u64, vm: impl Into<KeyOrName>) -> Self {
        Self {
            tenant,
            vm: vm.into(),
            name: None,
            description: None,
            snapshot_name: None,
        }
    }

    /// Defaults to the VM name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Defaults to `share-<name>-<random suffix>`.
    pub fn snapshot_name(mut self, name: impl Into<String>) -> Self {
        self.snapshot_name = Some(name.into());
        self
    }
}

/// Manager for `shared_objects`.
#[derive(Clone)]
pub struct SharedObjectManager {
    inner: ResourceManager<SharedObject>,
}

impl Deref for SharedObjectManager {
    type Target = ResourceManager<SharedObject>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl SharedObjectManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, SHARED_OBJECTS),
        }
    }

    /// Shares filtered by recipient, exact name and inbox state.
    pub async fn list_filtered(
        &self,
        tenant: Option<u64>,
        name: Option<&str>,
        inbox_only: bool,
    ) -> Result<Vec<SharedObject>> {
        let params = ListParams::new()
            .term("recipient", tenant)
            .term("name", name)
            .term("inbox", inbox_only.then_some(true));
        self.inner.list(&params).await
    }

    pub async fn list_for_tenant(&self, tenant: u64, inbox_only: bool) -> Result<Vec<SharedObject>> {
        self.list_filtered(Some(tenant), None, inbox_only).await
    }

    /// Fetch by key, or by name within a recipient tenant.
    ///
    /// Share names are only unique per recipient; a name without a tenant is
    /// refused with [`Error::InvalidArgument`].
    pub async fn get(&self, lookup: Lookup<u64>, tenant: Option<u64>) -> Result<SharedObject> {
        match lookup {
            Lookup::Key(key) => self.inner.get_by_key(&key).await,
            Lookup::Name(name) => {
                let tenant = tenant.ok_or_else(|| {
                    Error::InvalidArgument("a tenant is required when looking up by name".to_owned())
                })?;
                self.list_filtered(Some(tenant), Some(&name), false)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        Error::NotFound(format!("shared object {name:?} for tenant {tenant}"))
                    })
            }
        }
    }

    /// Share a VM with a tenant.
    ///
    /// A never-expiring snapshot of the VM's machine is taken first. If the
    /// share itself cannot be created, the snapshot is deleted again.
    pub async fn create(&self, share: ShareVm) -> Result<SharedObject> {
        let vms = ResourceManager::<Vm>::new(self.client(), VMS);
        let vm = match &share.vm {
            KeyOrName::Key(key) => vms.get_by_key(key).await?,
            KeyOrName::Name(name) => vms
                .find_one(ListParams::new().term("name", name.as_str()).term("is_snapshot", false))
                .await?
                .ok_or_else(|| Error::NotFound(format!("VM {name:?}")))?,
        };
        let machine = vm
            .machine
            .ok_or_else(|| Error::Validation(format!("VM {} has no machine", vm.key)))?;

        let name = share.name.unwrap_or_else(|| vm.name.clone());
        let snapshot_name = share
            .snapshot_name
            .unwrap_or_else(|| format!("share-{name}-{}", &Uuid::new_v4().simple().to_string()[..8]));

        info!(vm = vm.key, tenant = share.tenant, %snapshot_name, "snapshotting VM for share");
        let response = self
            .client()
            .post(
                MACHINE_SNAPSHOTS,
                &json!({
                    "machine": machine,
                    "name": snapshot_name,
                    "expires_type": "never",
                    "created_manually": true,
                }),
            )
            .await?;
        let snapshot: u64 = response
            .as_ref()
            .and_then(created_key)
            .ok_or_else(|| Error::Validation("machine snapshot created without a key".to_owned()))?;
        let guard = Compensation::new(self.client(), reference(MACHINE_SNAPSHOTS, &snapshot));

        let mut body = object(json!({
            "recipient": share.tenant,
            "type": "vm",
            "name": name,
            "snapshot": guard.path(),
        }));
        put_opt(&mut body, "description", share.description.filter(|d| !d.is_empty()));
        let fallback = ListParams::new()
            .term("recipient", share.tenant)
            .term("name", name.as_str());

        let created = self.inner.create_with_fallback(body, Some(fallback)).await;
        match created {
            Ok(shared) => {
                guard.commit();
                Ok(shared)
            }
            Err(e) => {
                error!(snapshot, error = %e, "share failed, removing snapshot");
                if let Err(cleanup) = guard.rollback().await {
                    error!(snapshot, error = %cleanup, "could not remove share snapshot");
                }
                Err(e)
            }
        }
    }

    /// Import a shared VM into the recipient tenant. Runs asynchronously.
    pub async fn import(&self, key: u64) -> Result<Option<Value>> {
        self.inner.action(&key, "import", Map::new()).await
    }

    /// Re-snapshot the shared VM.
    pub async fn refresh(&self, key: u64) -> Result<Option<Value>> {
        self.inner.action(&key, "refresh", Map::new()).await
    }
}
