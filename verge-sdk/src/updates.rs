//! System updates: sources, branches, packages and the settings singleton.
//!
//! The usual flow is refresh, download, install, then apply (which reboots
//! nodes one at a time). Each step returns the raw action response, usually a
//! task reference to wait on.

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;
use verge_api::record::epoch_to_datetime;
use verge_api::{Client, Endpoint, Error, ListParams, Record, ResourceManager, Result};

use crate::util::{as_u64, object, put_opt};

const UPDATE_SOURCES: Endpoint = Endpoint::new("update_sources")
    .fields(&[
        "$key",
        "name",
        "description",
        "url",
        "user",
        "last_updated",
        "last_refreshed",
        "enabled",
    ])
    .actions("update_actions", "source");

const UPDATE_SOURCE_STATUS: Endpoint = Endpoint::new("update_source_status").fields(&[
    "$key",
    "source",
    "source#name as source_display",
    "status",
    "info",
    "nodes_updated",
    "last_update",
]);

const UPDATE_BRANCHES: Endpoint =
    Endpoint::new("update_branches").fields(&["$key", "name", "description", "created"]);

const UPDATE_PACKAGES: Endpoint = Endpoint::new("update_packages").fields(&[
    "$key",
    "name",
    "description",
    "version",
    "branch",
    "branch#name as branch_display",
    "type",
    "optional",
    "created",
    "modified",
]);

const UPDATE_SETTINGS: Endpoint = Endpoint::new("update_settings").fields(&[
    "$key",
    "name",
    "source",
    "source#name as source_display",
    "branch",
    "branch#name as branch_display",
    "branch#description as branch_description",
    "auto_refresh",
    "auto_update",
    "auto_reboot",
    "update_time",
    "max_vsan_usage",
    "warm_reboot",
    "multi_cluster_update",
    "snapshot_cloud_on_update",
    "snapshot_cloud_expire_seconds",
    "installed",
    "reboot_required",
    "applying_updates",
    "applying_updates_force",
    "release_notes_url",
    "anonymize_statistics",
]);

/// The settings table holds exactly one row.
const SETTINGS_KEY: u64 = 1;

// =============================================================================
// Sources
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSource {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub last_updated: Option<i64>,
    #[serde(default)]
    pub last_refreshed: Option<i64>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(UpdateSource, u64);

impl UpdateSource {
    /// Sources are enabled unless the server says otherwise.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        self.last_updated.and_then(epoch_to_datetime)
    }

    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed.and_then(epoch_to_datetime)
    }
}

/// Operational state of one source.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSourceStatus {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub source: Option<Value>,
    #[serde(default)]
    pub source_display: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub nodes_updated: Option<u32>,
    #[serde(default)]
    pub last_update: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(UpdateSourceStatus, u64);

impl UpdateSourceStatus {
    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or("unknown")
    }

    pub fn is_idle(&self) -> bool {
        self.status() == "idle"
    }

    /// Refreshing, downloading, installing or applying.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.status(),
            "refreshing" | "downloading" | "installing" | "applying"
        )
    }

    pub fn is_error(&self) -> bool {
        self.status() == "error"
    }
}

/// Arguments of [`UpdateSourceManager::create`].
#[derive(Debug, Clone)]
pub struct NewUpdateSource {
    name: String,
    url: String,
    description: Option<String>,
    user: Option<String>,
    password: Option<String>,
    enabled: bool,
}

impl NewUpdateSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            description: None,
            user: None,
            password: None,
            enabled: true,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Manager for `update_sources`.
#[derive(Clone)]
pub struct UpdateSourceManager {
    inner: ResourceManager<UpdateSource>,
}

impl Deref for UpdateSourceManager {
    type Target = ResourceManager<UpdateSource>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl UpdateSourceManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, UPDATE_SOURCES),
        }
    }

    pub async fn create(&self, source: NewUpdateSource) -> Result<UpdateSource> {
        let mut body = object(json!({
            "name": source.name,
            "url": source.url,
            "enabled": source.enabled,
        }));
        put_opt(&mut body, "description", source.description);
        put_opt(&mut body, "user", source.user);
        put_opt(&mut body, "password", source.password);
        self.inner.create(body).await
    }

    pub async fn get_status(&self, source: u64) -> Result<UpdateSourceStatus> {
        ResourceManager::<UpdateSourceStatus>::new(self.client(), UPDATE_SOURCE_STATUS)
            .find_one(ListParams::new().term("source", source))
            .await?
            .ok_or_else(|| Error::NotFound(format!("status for update source {source}")))
    }

    /// Check the source for new packages.
    pub async fn refresh(&self, source: u64) -> Result<Option<Value>> {
        self.source_action(source, "refresh").await
    }

    pub async fn download(&self, source: u64) -> Result<Option<Value>> {
        self.source_action(source, "download").await
    }

    pub async fn install(&self, source: u64) -> Result<Option<Value>> {
        self.source_action(source, "install").await
    }

    /// Reboot nodes into the installed packages.
    pub async fn apply(&self, source: u64) -> Result<Option<Value>> {
        self.source_action(source, "apply").await
    }

    async fn source_action(&self, source: u64, action: &str) -> Result<Option<Value>> {
        info!(source, action, "update source action");
        self.inner.action(&source, action, Map::new()).await
    }
}

// =============================================================================
// Branches
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateBranch {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(UpdateBranch, u64);

/// Manager for `update_branches`. Read-only; branches come from the source.
#[derive(Clone)]
pub struct UpdateBranchManager {
    inner: ResourceManager<UpdateBranch>,
}

impl Deref for UpdateBranchManager {
    type Target = ResourceManager<UpdateBranch>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl UpdateBranchManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, UPDATE_BRANCHES),
        }
    }
}

// =============================================================================
// Packages
// =============================================================================

/// An installed or available package. Packages are keyed by name.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePackage {
    #[serde(rename = "$key", default)]
    raw_key: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub branch: Option<Value>,
    #[serde(default)]
    pub branch_display: Option<String>,
    #[serde(rename = "type", default)]
    pub package_type: Option<String>,
    #[serde(default)]
    pub optional: Option<bool>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub modified: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for UpdatePackage {
    type Key = String;

    /// `$key` when sent, else the name.
    fn key(&self) -> String {
        self.raw_key.clone().unwrap_or_else(|| self.name.clone())
    }

    fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

impl UpdatePackage {
    pub fn branch_key(&self) -> Option<u64> {
        self.branch.as_ref().and_then(as_u64)
    }

    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }
}

/// Manager for `update_packages`. Read-only.
#[derive(Clone)]
pub struct UpdatePackageManager {
    inner: ResourceManager<UpdatePackage>,
}

impl Deref for UpdatePackageManager {
    type Target = ResourceManager<UpdatePackage>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl UpdatePackageManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, UPDATE_PACKAGES),
        }
    }

    pub async fn list_for_branch(&self, branch: u64) -> Result<Vec<UpdatePackage>> {
        self.inner.list(&ListParams::new().term("branch", branch)).await
    }
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSettings {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub source: Option<Value>,
    #[serde(default)]
    pub source_display: Option<String>,
    #[serde(default)]
    pub branch: Option<Value>,
    #[serde(default)]
    pub branch_display: Option<String>,
    #[serde(default)]
    pub auto_refresh: Option<bool>,
    #[serde(default)]
    pub auto_update: Option<bool>,
    #[serde(default)]
    pub auto_reboot: Option<bool>,
    /// `HH:MM`.
    #[serde(default)]
    pub update_time: Option<String>,
    #[serde(default)]
    pub max_vsan_usage: Option<u8>,
    #[serde(default)]
    pub installed: Option<bool>,
    #[serde(default)]
    pub reboot_required: Option<bool>,
    #[serde(default)]
    pub applying_updates: Option<bool>,
    #[serde(default)]
    pub release_notes_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(UpdateSettings, u64);

impl UpdateSettings {
    pub fn source_key(&self) -> Option<u64> {
        self.source.as_ref().and_then(as_u64)
    }

    pub fn branch_key(&self) -> Option<u64> {
        self.branch.as_ref().and_then(as_u64)
    }

    pub fn is_auto_refresh(&self) -> bool {
        self.auto_refresh.unwrap_or(true)
    }

    pub fn is_auto_update(&self) -> bool {
        self.auto_update.unwrap_or(false)
    }

    pub fn is_reboot_required(&self) -> bool {
        self.reboot_required.unwrap_or(false)
    }

    pub fn is_applying_updates(&self) -> bool {
        self.applying_updates.unwrap_or(false)
    }
}

/// Changes applied by [`UpdateSettingsManager::update`].
#[derive(Debug, Clone, Default)]
pub struct UpdateSettingsChanges {
    fields: Map<String, Value>,
}

impl UpdateSettingsChanges {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_owned(), value.into());
        self
    }

    pub fn source(self, source: u64) -> Self {
        self.set("source", source)
    }

    pub fn branch(self, branch: u64) -> Self {
        self.set("branch", branch)
    }

    pub fn auto_refresh(self, on: bool) -> Self {
        self.set("auto_refresh", on)
    }

    pub fn auto_update(self, on: bool) -> Self {
        self.set("auto_update", on)
    }

    pub fn auto_reboot(self, on: bool) -> Self {
        self.set("auto_reboot", on)
    }

    /// `HH:MM`.
    pub fn update_time(self, time: impl Into<String>) -> Self {
        self.set("update_time", time.into())
    }

    /// Percent, 10 to 100.
    pub fn max_vsan_usage(self, percent: u8) -> Self {
        self.set("max_vsan_usage", percent)
    }

    pub fn warm_reboot(self, on: bool) -> Self {
        self.set("warm_reboot", on)
    }

    pub fn snapshot_cloud_on_update(self, on: bool) -> Self {
        self.set("snapshot_cloud_on_update", on)
    }
}

/// Manager for the `update_settings` singleton.
#[derive(Clone)]
pub struct UpdateSettingsManager {
    inner: ResourceManager<UpdateSettings>,
}

impl Deref for UpdateSettingsManager {
    type Target = ResourceManager<UpdateSettings>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl UpdateSettingsManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, UPDATE_SETTINGS),
        }
    }

    pub async fn get(&self) -> Result<UpdateSettings> {
        self.inner.get_by_key(&SETTINGS_KEY).await
    }

    pub async fn update(&self, changes: UpdateSettingsChanges) -> Result<UpdateSettings> {
        self.inner.update(&SETTINGS_KEY, changes.fields).await
    }

    /// Refresh the configured source.
    pub async fn check(&self) -> Result<Option<Value>> {
        self.source_action("refresh", Map::new()).await
    }

    pub async fn download(&self) -> Result<Option<Value>> {
        self.source_action("download", Map::new()).await
    }

    pub async fn install(&self) -> Result<Option<Value>> {
        self.source_action("install", Map::new()).await
    }

    /// Download, install and roll the reboots. `force` lets workloads that
    /// cannot migrate be restarted.
    pub async fn update_all(&self, force: bool) -> Result<Option<Value>> {
        self.source_action("all", object(json!({ "force": force })))
            .await
    }

    async fn source_action(&self, action: &str, params: Map<String, Value>) -> Result<Option<Value>> {
        let source = self.get().await?.source_key().ok_or_else(|| {
            Error::InvalidArgument("no update source configured in settings".to_owned())
        })?;
        info!(source, action, "update action");
        ResourceManager::<UpdateSource>::new(self.client(), UPDATE_SOURCES)
            .action(&source, action, params)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_key_falls_back_to_name() {
        let package: UpdatePackage =
            serde_json::from_value(json!({"name": "yb-system", "version": "4.13.1"})).unwrap();
        assert_eq!(package.key(), "yb-system");

        let keyed: UpdatePackage =
            serde_json::from_value(json!({"$key": "yb-os", "name": "ignored"})).unwrap();
        assert_eq!(keyed.key(), "yb-os");
    }

    #[test]
    fn test_source_status_busy() {
        let status: UpdateSourceStatus =
            serde_json::from_value(json!({"$key": 1, "status": "downloading"})).unwrap();
        assert!(status.is_busy());
        assert!(!status.is_idle());
    }

    #[test]
    fn test_settings_changes() {
        let changes = UpdateSettingsChanges::new().branch(4).auto_update(true);
        assert_eq!(Value::Object(changes.fields), json!({"branch": 4, "auto_update": true}));
    }

    #[test]
    fn test_settings_source_key() {
        let settings: UpdateSettings =
            serde_json::from_value(json!({"$key": 1, "source": "2"})).unwrap();
        assert_eq!(settings.source_key(), Some(2));
        assert!(settings.is_auto_refresh());
    }
}
