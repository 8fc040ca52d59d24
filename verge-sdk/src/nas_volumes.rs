//! NAS volumes: filesystems hosted by a NAS service.
//!
//! Volumes are keyed by 40-character hex strings and fetched by filter.
//! Sizes are sent in bytes (`maxsize`) and taken in whole GB.

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;
use verge_api::constants::GB;
use verge_api::filter::quote;
use verge_api::record::{bytes_to_gb, epoch_to_datetime};
use verge_api::{Client, Endpoint, Error, ListParams, ResourceManager, Result};

use crate::nas_services::NasServiceManager;
use crate::util::{KeyOrName, as_u64, object, put_opt};

const NAS_VOLUMES: Endpoint = Endpoint::new("volumes")
    .fields(&[
        "$key",
        "name",
        "description",
        "enabled",
        "created",
        "modified",
        "maxsize",
        "preferred_tier",
        "fs_type",
        "read_only",
        "discard",
        "owner_user",
        "owner_group",
        "encrypt",
        "automount_snapshots",
        "is_snapshot",
        "service",
        "service#$display as service_display",
        "snapshot_profile",
        "status#status as mount_status",
        "status#mounted as mounted",
        "drive#media_source#used_bytes as used_bytes",
        "drive#media_source#filesize as allocated_bytes",
    ])
    .lookup_by_filter()
    .inline_actions();

/// Largest volume the API accepts, in GB.
pub const MAX_VOLUME_GB: u64 = 524_288;

#[derive(Debug, Clone, Deserialize)]
pub struct NasVolume {
    #[serde(rename = "$key")]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub modified: Option<i64>,
    #[serde(default)]
    pub maxsize: Option<u64>,
    #[serde(default)]
    pub preferred_tier: Option<Value>,
    #[serde(default)]
    pub fs_type: Option<String>,
    #[serde(default)]
    pub read_only: Option<bool>,
    #[serde(default)]
    pub discard: Option<bool>,
    #[serde(default)]
    pub owner_user: Option<String>,
    #[serde(default)]
    pub owner_group: Option<String>,
    #[serde(default)]
    pub encrypt: Option<bool>,
    #[serde(default)]
    pub automount_snapshots: Option<bool>,
    #[serde(default)]
    pub is_snapshot: Option<bool>,
    #[serde(default)]
    pub service: Option<Value>,
    #[serde(default)]
    pub service_display: Option<String>,
    #[serde(default)]
    pub snapshot_profile: Option<Value>,
    #[serde(default)]
    pub mount_status: Option<String>,
    #[serde(default)]
    pub mounted: Option<bool>,
    #[serde(default)]
    pub used_bytes: Option<u64>,
    #[serde(default)]
    pub allocated_bytes: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(NasVolume, String);

impl NasVolume {
    pub fn max_size_gb(&self) -> f64 {
        bytes_to_gb(self.maxsize.unwrap_or(0))
    }

    pub fn used_gb(&self) -> f64 {
        bytes_to_gb(self.used_bytes.unwrap_or(0))
    }

    pub fn allocated_gb(&self) -> f64 {
        bytes_to_gb(self.allocated_bytes.unwrap_or(0))
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.unwrap_or(false) || self.mount_status.as_deref() == Some("mounted")
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    pub fn service_key(&self) -> Option<u64> {
        self.service.as_ref().and_then(as_u64)
    }

    pub fn tier(&self) -> Option<u64> {
        self.preferred_tier.as_ref().and_then(as_u64)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(epoch_to_datetime)
    }
}

/// Arguments of [`NasVolumeManager::create`].
#[derive(Debug, Clone)]
pub struct NewNasVolume {
    name: String,
    size_gb: u64,
    service: Option<KeyOrName>,
    tier: Option<u8>,
    description: Option<String>,
    read_only: bool,
    discard: bool,
    owner_user: Option<String>,
    owner_group: Option<String>,
    snapshot_profile: Option<u64>,
    enabled: bool,
}

impl NewNasVolume {
    pub fn new(name: impl Into<String>, size_gb: u64) -> Self {
        Self {
            name: name.into(),
            size_gb,
            service: None,
            tier: None,
            description: None,
            read_only: false,
            discard: true,
            owner_user: None,
            owner_group: None,
            snapshot_profile: None,
            enabled: true,
        }
    }

    /// Hosting service. Not needed on a manager from [`NasServiceManager::volumes`].
    pub fn service(mut self, service: impl Into<KeyOrName>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn tier(mut self, tier: u8) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn discard(mut self, discard: bool) -> Self {
        self.discard = discard;
        self
    }

    pub fn owner(mut self, user: impl Into<String>, group: impl Into<String>) -> Self {
        self.owner_user = Some(user.into());
        self.owner_group = Some(group.into());
        self
    }

    pub fn snapshot_profile(mut self, profile: u64) -> Self {
        self.snapshot_profile = Some(profile);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Changes applied by [`NasVolumeManager::update`]. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct NasVolumeUpdate {
    description: Option<String>,
    size_gb: Option<u64>,
    tier: Option<u8>,
    enabled: Option<bool>,
    read_only: Option<bool>,
    discard: Option<bool>,
    automount_snapshots: Option<bool>,
}

impl NasVolumeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Grow or shrink the volume.
    pub fn size_gb(mut self, size_gb: u64) -> Self {
        self.size_gb = Some(size_gb);
        self
    }

    pub fn tier(mut self, tier: u8) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    pub fn discard(mut self, discard: bool) -> Self {
        self.discard = Some(discard);
        self
    }

    pub fn automount_snapshots(mut self, automount: bool) -> Self {
        self.automount_snapshots = Some(automount);
        self
    }
}

/// Size in GB as bytes, within 1 GB and [`MAX_VOLUME_GB`].
fn volume_bytes(size_gb: u64) -> Result<u64> {
    if !(1..=MAX_VOLUME_GB).contains(&size_gb) {
        return Err(Error::Validation(format!(
            "volume size must be between 1 and {MAX_VOLUME_GB} GB, got {size_gb}"
        )));
    }
    size_gb
        .checked_mul(GB)
        .ok_or_else(|| Error::Validation(format!("volume size {size_gb} GB is out of range")))
}

/// Manager for `volumes`, optionally limited to one NAS service.
#[derive(Clone)]
pub struct NasVolumeManager {
    inner: ResourceManager<NasVolume>,
    service: Option<u64>,
}

impl Deref for NasVolumeManager {
    type Target = ResourceManager<NasVolume>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl NasVolumeManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, NAS_VOLUMES),
            service: None,
        }
    }

    pub fn for_service(client: &Client, service: u64) -> Self {
        Self {
            inner: ResourceManager::scoped(client, NAS_VOLUMES, format!("service eq {service}")),
            service: Some(service),
        }
    }

    /// Volumes of one service, optionally filtered by enabled state.
    pub async fn list_for_service(
        &self,
        service: impl Into<KeyOrName>,
        enabled: Option<bool>,
    ) -> Result<Vec<NasVolume>> {
        let service = self.services().resolve_key(&service.into()).await?;
        let params = ListParams::new()
            .term("service", service)
            .term("enabled", enabled);
        self.inner.list(&params).await
    }

    pub async fn create(&self, volume: NewNasVolume) -> Result<NasVolume> {
        let maxsize = volume_bytes(volume.size_gb)?;
        let service = match (&volume.service, self.service) {
            (Some(service), _) => self.services().resolve_key(service).await?,
            (None, Some(scoped)) => scoped,
            (None, None) => {
                return Err(Error::InvalidArgument(
                    "a NAS service is required to create a volume".to_owned(),
                ));
            }
        };

        let mut body = object(json!({
            "name": &volume.name,
            "service": service,
            "maxsize": maxsize,
            "enabled": volume.enabled,
            "discard": volume.discard,
        }));
        put_opt(&mut body, "preferred_tier", volume.tier.map(|t| t.to_string()));
        put_opt(&mut body, "description", volume.description);
        if volume.read_only {
            body.insert("read_only".to_owned(), true.into());
        }
        put_opt(&mut body, "owner_user", volume.owner_user);
        put_opt(&mut body, "owner_group", volume.owner_group);
        put_opt(&mut body, "snapshot_profile", volume.snapshot_profile);

        debug!(name = %volume.name, service, maxsize, "creating NAS volume");
        let fallback = ListParams::new().filter(format!(
            "service eq {service} and name eq {}",
            quote(&volume.name)
        ));
        self.inner.create_with_fallback(body, Some(fallback)).await
    }

    pub async fn update(&self, key: &str, changes: NasVolumeUpdate) -> Result<NasVolume> {
        let mut body = Map::new();
        put_opt(&mut body, "description", changes.description);
        put_opt(&mut body, "maxsize", changes.size_gb.map(volume_bytes).transpose()?);
        put_opt(&mut body, "preferred_tier", changes.tier.map(|t| t.to_string()));
        put_opt(&mut body, "enabled", changes.enabled);
        put_opt(&mut body, "read_only", changes.read_only);
        put_opt(&mut body, "discard", changes.discard);
        put_opt(&mut body, "automount_snapshots", changes.automount_snapshots);
        self.inner.update(&key.to_owned(), body).await
    }

    pub async fn enable(&self, key: &str) -> Result<NasVolume> {
        self.update(key, NasVolumeUpdate::new().enabled(true)).await
    }

    pub async fn disable(&self, key: &str) -> Result<NasVolume> {
        self.update(key, NasVolumeUpdate::new().enabled(false)).await
    }

    /// Reset a volume stuck in an error state.
    pub async fn reset(&self, key: &str) -> Result<Option<Value>> {
        self.inner.action(&key.to_owned(), "reset", Map::new()).await
    }

    fn services(&self) -> NasServiceManager {
        NasServiceManager::new(self.inner.client())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_sizes() {
        let volume: NasVolume = serde_json::from_value(json!({
            "$key": "8f73f8bcc9c9f1aaba32f733bfc295acaf548554",
            "name": "FileShare",
            "maxsize": 500 * GB,
            "used_bytes": GB / 4,
            "service": "2",
            "mount_status": "mounted"
        }))
        .unwrap();
        assert_eq!(volume.max_size_gb(), 500.0);
        assert_eq!(volume.used_gb(), 0.25);
        assert_eq!(volume.service_key(), Some(2));
        assert!(volume.is_mounted());
    }

    #[test]
    fn test_volume_bytes_bounds() {
        assert_eq!(volume_bytes(1).unwrap(), GB);
        assert!(matches!(volume_bytes(0), Err(Error::Validation(_))));
        assert!(matches!(volume_bytes(MAX_VOLUME_GB + 1), Err(Error::Validation(_))));
    }
}
