//! Tenants and the resources scoped to them.
//!
//! A tenant is a nested VergeOS system with its own storage allocations,
//! addresses, networks, nodes and snapshots. Each of those lives in its own
//! collection filtered by the tenant key; [`TenantManager`] hands out the
//! scoped managers.
//!
//! Tenant snapshots appear in the `tenants` collection with `is_snapshot`
//! set. They are hidden from listings by default, and every power action or
//! sub-resource create on one is refused before a request is sent.

mod external_ips;
mod layer2;
mod network_blocks;
mod nodes;
mod snapshots;
mod storage;

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::key::reference;
use verge_api::record::epoch_to_datetime;
use verge_api::{Client, Endpoint, Error, ListParams, ResourceManager, Result};

pub use external_ips::{ExternalIp, ExternalIpManager, NewExternalIp};
pub use layer2::{Layer2Manager, Layer2Network};
pub use network_blocks::{NetworkBlock, NetworkBlockManager};
pub use nodes::{NewTenantNode, TenantNode, TenantNodeManager};
pub use snapshots::{NewTenantSnapshot, TenantSnapshot, TenantSnapshotManager};
pub use storage::{TenantStorage, TenantStorageManager};

use crate::util::{key_by_name, object, put_opt};

const TENANTS: Endpoint = Endpoint::new("tenants")
    .fields(&[
        "$key",
        "name",
        "description",
        "url",
        "uuid",
        "created",
        "creator",
        "is_snapshot",
        "isolate",
        "note",
        "expose_cloud_snapshots",
        "allow_branding",
        "status#status as status",
        "status#running as running",
        "status#starting as starting",
        "status#stopping as stopping",
        "status#migrating as migrating",
        "status#started as started_ts",
        "status#stopped as stopped_ts",
        "status#state as state",
        "vnet",
        "vnet#name as network_name",
        "ui_address",
        "ui_address#ip as ui_address_ip",
    ])
    .actions("tenant_actions", "tenant");

#[derive(Debug, Clone, Deserialize)]
pub struct Tenant {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub is_snapshot: Option<bool>,
    #[serde(default)]
    pub isolate: Option<bool>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub expose_cloud_snapshots: Option<bool>,
    #[serde(default)]
    pub allow_branding: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub running: Option<bool>,
    #[serde(default)]
    pub starting: Option<bool>,
    #[serde(default)]
    pub stopping: Option<bool>,
    #[serde(default)]
    pub migrating: Option<bool>,
    #[serde(default)]
    pub started_ts: Option<i64>,
    #[serde(default)]
    pub stopped_ts: Option<i64>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub vnet: Option<u64>,
    #[serde(default)]
    pub network_name: Option<String>,
    #[serde(default)]
    pub ui_address_ip: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(Tenant, u64);

impl Tenant {
    pub fn is_running(&self) -> bool {
        self.running.unwrap_or(false)
    }

    pub fn is_starting(&self) -> bool {
        self.starting.unwrap_or(false)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.unwrap_or(false)
    }

    pub fn is_migrating(&self) -> bool {
        self.migrating.unwrap_or(false)
    }

    pub fn is_snapshot(&self) -> bool {
        self.is_snapshot.unwrap_or(false)
    }

    pub fn is_isolated(&self) -> bool {
        self.isolate.unwrap_or(false)
    }

    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or("unknown")
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(epoch_to_datetime)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_ts.and_then(epoch_to_datetime)
    }
}

/// The parts of a tenant its scoped managers need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRef {
    pub key: u64,
    pub name: String,
    pub is_snapshot: bool,
}

impl TenantRef {
    /// Refuse `what` on a tenant snapshot.
    pub(crate) fn ensure_not_snapshot(&self, what: &str) -> Result<()> {
        if self.is_snapshot {
            return Err(Error::InvalidArgument(format!(
                "Cannot {what} a tenant snapshot ({})",
                self.name
            )));
        }
        Ok(())
    }

    /// `tenants/<key>`, the owner reference used by address and CIDR rows.
    pub(crate) fn owner(&self) -> String {
        reference("tenants", &self.key)
    }
}

impl From<&Tenant> for TenantRef {
    fn from(tenant: &Tenant) -> Self {
        Self {
            key: tenant.key,
            name: tenant.name.clone(),
            is_snapshot: tenant.is_snapshot(),
        }
    }
}

/// Arguments of [`TenantManager::create`].
#[derive(Debug, Clone)]
pub struct NewTenant {
    name: String,
    password: Option<String>,
    description: Option<String>,
    url: Option<String>,
    note: Option<String>,
    expose_cloud_snapshots: bool,
    allow_branding: bool,
    require_password_change: bool,
}

impl NewTenant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: None,
            description: None,
            url: None,
            note: None,
            expose_cloud_snapshots: true,
            allow_branding: false,
            require_password_change: false,
        }
    }

    /// Password of the tenant's admin user; the server generates one otherwise.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn expose_cloud_snapshots(mut self, expose: bool) -> Self {
        self.expose_cloud_snapshots = expose;
        self
    }

    pub fn allow_branding(mut self, allow: bool) -> Self {
        self.allow_branding = allow;
        self
    }

    pub fn require_password_change(mut self, require: bool) -> Self {
        self.require_password_change = require;
        self
    }

    fn into_body(self) -> Map<String, Value> {
        let mut body = object(json!({
            "name": self.name,
            "expose_cloud_snapshots": self.expose_cloud_snapshots,
        }));
        put_opt(&mut body, "password", self.password.filter(|p| !p.is_empty()));
        put_opt(&mut body, "description", self.description.filter(|d| !d.is_empty()));
        put_opt(&mut body, "url", self.url.filter(|u| !u.is_empty()));
        put_opt(&mut body, "note", self.note.filter(|n| !n.is_empty()));
        if self.allow_branding {
            body.insert("allow_branding".to_owned(), true.into());
        }
        if self.require_password_change {
            body.insert("change_password".to_owned(), true.into());
        }
        body
    }
}

/// Options of [`TenantManager::clone_tenant`].
#[derive(Debug, Clone, Default)]
pub struct TenantClone {
    pub name: Option<String>,
    pub no_network: bool,
    pub no_storage: bool,
    pub no_nodes: bool,
}

impl TenantClone {
    fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        put_opt(&mut params, "name", self.name.clone());
        for (field, set) in [
            ("no_vnet", self.no_network),
            ("no_storage", self.no_storage),
            ("no_nodes", self.no_nodes),
        ] {
            if set {
                params.insert(field.to_owned(), true.into());
            }
        }
        params
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Manager for `tenants`.
#[derive(Clone)]
pub struct TenantManager {
    inner: ResourceManager<Tenant>,
}

impl Deref for TenantManager {
    type Target = ResourceManager<Tenant>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl TenantManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, TENANTS),
        }
    }

    /// List tenants, excluding snapshots.
    pub async fn list(&self, params: &ListParams) -> Result<Vec<Tenant>> {
        self.inner
            .list(&params.clone().term("is_snapshot", false))
            .await
    }

    pub async fn list_with_snapshots(&self, params: &ListParams) -> Result<Vec<Tenant>> {
        self.inner.list(params).await
    }

    pub async fn list_running(&self) -> Result<Vec<Tenant>> {
        let tenants = self.list(&ListParams::new()).await?;
        Ok(tenants.into_iter().filter(Tenant::is_running).collect())
    }

    /// Neither running nor on the way up.
    pub async fn list_stopped(&self) -> Result<Vec<Tenant>> {
        let tenants = self.list(&ListParams::new()).await?;
        Ok(tenants
            .into_iter()
            .filter(|t| !t.is_running() && !t.is_starting())
            .collect())
    }

    pub async fn list_by_status(&self, status: &str) -> Result<Vec<Tenant>> {
        let tenants = self.list(&ListParams::new()).await?;
        Ok(tenants.into_iter().filter(|t| t.status() == status).collect())
    }

    /// Create a tenant. It starts powered off.
    pub async fn create(&self, tenant: NewTenant) -> Result<Tenant> {
        self.inner.create(tenant.into_body()).await
    }

    // =========================================================================
    // Power
    // =========================================================================

    pub async fn power_on(&self, tenant: &Tenant, preferred_node: Option<u64>) -> Result<Option<Value>> {
        TenantRef::from(tenant).ensure_not_snapshot("power on")?;
        let params = preferred_node.map(|node| object(json!({ "preferred_node": node })));
        self.tenant_action(tenant.key, "poweron", params).await
    }

    pub async fn power_off(&self, tenant: &Tenant) -> Result<Option<Value>> {
        TenantRef::from(tenant).ensure_not_snapshot("power off")?;
        self.tenant_action(tenant.key, "poweroff", None).await
    }

    pub async fn reset(&self, tenant: &Tenant) -> Result<Option<Value>> {
        TenantRef::from(tenant).ensure_not_snapshot("reset")?;
        self.tenant_action(tenant.key, "reset", None).await
    }

    /// Copy a tenant. Snapshots are restored, not cloned.
    pub async fn clone_tenant(&self, tenant: &Tenant, options: TenantClone) -> Result<Option<Value>> {
        TenantRef::from(tenant).ensure_not_snapshot("clone")?;
        let params = options.params();
        self.tenant_action(tenant.key, "clone", (!params.is_empty()).then_some(params))
            .await
    }

    // =========================================================================
    // Isolation And Sharing
    // =========================================================================

    /// Cut a tenant off from its networks.
    pub async fn enable_isolation(&self, tenant: &Tenant) -> Result<Option<Value>> {
        TenantRef::from(tenant).ensure_not_snapshot("isolate")?;
        if tenant.is_isolated() {
            return Err(Error::InvalidArgument(format!(
                "tenant {} is already isolated",
                tenant.name
            )));
        }
        self.tenant_action(tenant.key, "isolateon", None).await
    }

    pub async fn disable_isolation(&self, tenant: &Tenant) -> Result<Option<Value>> {
        TenantRef::from(tenant).ensure_not_snapshot("change isolation of")?;
        if !tenant.is_isolated() {
            return Err(Error::InvalidArgument(format!(
                "tenant {} is not isolated",
                tenant.name
            )));
        }
        self.tenant_action(tenant.key, "isolateoff", None).await
    }

    /// Share a file from the parent's media catalog with the tenant.
    pub async fn give_file(&self, tenant: &Tenant, file: u64) -> Result<Option<Value>> {
        TenantRef::from(tenant).ensure_not_snapshot("send a file to")?;
        self.tenant_action(tenant.key, "give_file", Some(object(json!({ "file": file }))))
            .await
    }

    /// Publish the tenant UI on `ip`, a virtual address of `network_name`
    /// (usually `"External"`).
    pub async fn set_ui_ip(&self, tenant: &Tenant, ip: &str, network_name: &str) -> Result<Option<Value>> {
        let tenant = TenantRef::from(tenant);
        tenant.ensure_not_snapshot("set the UI address of")?;
        let vnet: u64 = key_by_name(self.client(), "vnets", network_name).await?;
        let body = json!({
            "vnet": vnet,
            "type": "virtual",
            "ip": ip,
            "owner": tenant.owner(),
        });
        self.client().post("vnet_addresses", &body).await
    }

    // =========================================================================
    // Scoped Managers
    // =========================================================================

    pub fn storage(&self, tenant: &Tenant) -> TenantStorageManager {
        TenantStorageManager::new(self.client(), tenant.into())
    }

    pub fn external_ips(&self, tenant: &Tenant) -> ExternalIpManager {
        ExternalIpManager::new(self.client(), tenant.into())
    }

    pub fn network_blocks(&self, tenant: &Tenant) -> NetworkBlockManager {
        NetworkBlockManager::new(self.client(), tenant.into())
    }

    pub fn layer2_networks(&self, tenant: &Tenant) -> Layer2Manager {
        Layer2Manager::new(self.client(), tenant.into())
    }

    pub fn snapshots(&self, tenant: &Tenant) -> TenantSnapshotManager {
        TenantSnapshotManager::new(self.client(), tenant.into())
    }

    pub fn nodes(&self, tenant: &Tenant) -> TenantNodeManager {
        TenantNodeManager::new(self.client(), tenant.into())
    }

    /// `tenant_actions` carries arguments in a nested `params` object.
    async fn tenant_action(
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tenant_body() {
        let body = NewTenant::new("acme").into_body();
        assert_eq!(
            Value::Object(body),
            json!({"name": "acme", "expose_cloud_snapshots": true})
        );

        let body = NewTenant::new("acme")
            .password("s3cret")
            .allow_branding(true)
            .require_password_change(true)
            .description("")
            .into_body();
        assert_eq!(body["password"], "s3cret");
        assert_eq!(body["allow_branding"], true);
        assert_eq!(body["change_password"], true);
        assert!(!body.contains_key("description"));
    }

    #[test]
    fn test_clone_params_only_carry_set_flags() {
        assert!(TenantClone::default().params().is_empty());
        let params = TenantClone {
            name: Some("copy".into()),
            no_network: true,
            ..TenantClone::default()
        }
        .params();
        assert_eq!(Value::Object(params), json!({"name": "copy", "no_vnet": true}));
    }

    #[test]
    fn test_snapshot_ref_refuses_writes() {
        let tenant = TenantRef {
            key: 3,
            name: "acme-snap".into(),
            is_snapshot: true,
        };
        assert!(matches!(
            tenant.ensure_not_snapshot("add storage to"),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(tenant.owner(), "tenants/3");
    }
}
