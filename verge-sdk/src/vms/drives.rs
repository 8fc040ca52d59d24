use std::ops::Deref;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::constants::GB;
use verge_api::record::bytes_to_gb;
use verge_api::{Client, Endpoint, Error, ListParams, ResourceManager, Result};

use crate::util::{KeyOrName, as_u64, object, put_opt};

const MACHINE_DRIVES: Endpoint = Endpoint::new("machine_drives")
    .fields(&[
        "$key",
        "name",
        "orderid",
        "interface",
        "media",
        "description",
        "enabled",
        "serial",
        "preferred_tier",
        "readonly",
        "disksize",
        "used_bytes",
        "media_source",
        "machine",
        "status#status as status",
        "status#display(status) as status_display",
        "media_source#name as media_file",
        "media_source#allocated_bytes as allocated_bytes",
    ])
    .sort("+orderid");

verge_api::api_enum! {
    /// Bus a drive is attached to.
    pub enum DriveInterface {
        Virtio => ("virtio", "Virtio (Legacy)"),
        Ide => ("ide", "IDE"),
        Ahci => ("ahci", "SATA (AHCI)"),
        Nvme => ("nvme", "NVMe"),
        VirtioScsi => ("virtio-scsi", "Virtio-SCSI"),
        VirtioScsiDedicated => ("virtio-scsi-dedicated", "Virtio-SCSI (Dedicated)"),
        LsiScsi => ("lsi53c895a", "LSI SCSI"),
        MegaSas => ("megasas", "LSI MegaRAID SAS"),
        MegaSasGen2 => ("megasas-gen2", "LSI MegaRAID SAS 2"),
        Usb => ("usb", "USB"),
    }
}

verge_api::api_enum! {
    /// What a drive holds.
    pub enum DriveMedia {
        Cdrom => ("cdrom", "CD-ROM"),
        Disk => ("disk", "Disk"),
        EfiDisk => ("efidisk", "EFI Disk"),
        Import => ("import", "Import Disk"),
        NinePassthrough => ("9p", "Pass-Through (9P)"),
        Directory => ("dir", "Pass-Through (Directory)"),
        Clone => ("clone", "Clone Disk"),
        NonPersistent => ("nonpersistent", "Non-Persistent"),
    }
}

/// A drive attached to a VM's machine.
#[derive(Debug, Clone, Deserialize)]
pub struct Drive {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub orderid: Option<i64>,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub media: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub serial: Option<String>,
    /// Sent as a string by some releases and a number by others.
    #[serde(default)]
    pub preferred_tier: Option<Value>,
    #[serde(default)]
    pub readonly: Option<bool>,
    #[serde(default)]
    pub disksize: Option<u64>,
    #[serde(default)]
    pub used_bytes: Option<u64>,
    #[serde(default)]
    pub allocated_bytes: Option<u64>,
    #[serde(default)]
    pub media_source: Option<u64>,
    #[serde(default)]
    pub media_file: Option<String>,
    #[serde(default)]
    pub machine: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_display: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(Drive, u64);

impl Drive {
    /// Provisioned size, falling back to the media file's allocation.
    pub fn size_gb(&self) -> f64 {
        bytes_to_gb(self.disksize.or(self.allocated_bytes).unwrap_or(0))
    }

    pub fn used_gb(&self) -> f64 {
        bytes_to_gb(self.used_bytes.unwrap_or(0))
    }

    pub fn interface(&self) -> Option<DriveInterface> {
        self.interface.as_deref().and_then(DriveInterface::from_api_value)
    }

    pub fn media(&self) -> Option<DriveMedia> {
        self.media.as_deref().and_then(DriveMedia::from_api_value)
    }

    /// Friendly interface name, or the raw value when unrecognised.
    pub fn interface_display(&self) -> String {
        match self.interface() {
            Some(interface) => interface.display_name().to_owned(),
            None => self.interface.clone().unwrap_or_default(),
        }
    }

    pub fn tier(&self) -> Option<u64> {
        self.preferred_tier.as_ref().and_then(as_u64)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly.unwrap_or(false)
    }
}

/// Arguments of [`DriveManager::create`].
#[derive(Debug, Clone)]
pub struct NewDrive {
    media: DriveMedia,
    size_gb: Option<u64>,
    name: Option<String>,
    interface: DriveInterface,
    tier: Option<u8>,
    description: String,
    readonly: bool,
    enabled: bool,
    media_source: Option<KeyOrName>,
}

impl NewDrive {
    pub fn new(media: DriveMedia) -> Self {
        Self {
            media,
            size_gb: None,
            name: None,
            interface: DriveInterface::VirtioScsi,
            tier: None,
            description: String::new(),
            readonly: false,
            enabled: true,
            media_source: None,
        }
    }

    /// A blank disk of `size_gb` gigabytes.
    pub fn disk(size_gb: u64) -> Self {
        Self::new(DriveMedia::Disk).size_gb(size_gb)
    }

    /// A CD-ROM backed by a media file, given by key or name.
    pub fn cdrom(source: impl Into<KeyOrName>) -> Self {
        Self::new(DriveMedia::Cdrom)
            .interface(DriveInterface::Ahci)
            .media_source(source)
    }

    pub fn size_gb(mut self, size_gb: u64) -> Self {
        self.size_gb = Some(size_gb);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn interface(mut self, interface: DriveInterface) -> Self {
        self.interface = interface;
        self
    }

    pub fn tier(mut self, tier: u8) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn media_source(mut self, source: impl Into<KeyOrName>) -> Self {
        self.media_source = Some(source.into());
        self
    }
}

/// Arguments of [`DriveManager::import_drive`].
#[derive(Debug, Clone)]
pub struct ImportDrive {
    file: KeyOrName,
    name: Option<String>,
    interface: DriveInterface,
    tier: Option<u8>,
    preserve_drive_format: bool,
    enabled: bool,
}

impl ImportDrive {
    /// Import a disk image already uploaded to the media catalog.
    pub fn new(file: impl Into<KeyOrName>) -> Self {
        Self {
            file: file.into(),
            name: None,
            interface: DriveInterface::VirtioScsi,
            tier: None,
            preserve_drive_format: false,
            enabled: true,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn interface(mut self, interface: DriveInterface) -> Self {
        self.interface = interface;
        self
    }

    pub fn tier(mut self, tier: u8) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Keep the image format instead of converting to raw.
    pub fn preserve_drive_format(mut self, preserve: bool) -> Self {
        self.preserve_drive_format = preserve;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Manager for the drives of one machine.
#[derive(Clone)]
pub struct DriveManager {
    inner: ResourceManager<Drive>,
    machine: u64,
}

impl Deref for DriveManager {
    type Target = ResourceManager<Drive>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DriveManager {
    pub fn new(client: &Client, machine: u64) -> Self {
        Self {
            inner: ResourceManager::scoped(client, MACHINE_DRIVES, format!("machine eq {machine}")),
            machine,
        }
    }

    pub fn machine(&self) -> u64 {
        self.machine
    }

    pub async fn list_by_media(&self, media: DriveMedia) -> Result<Vec<Drive>> {
        self.inner
            .list(&ListParams::new().term("media", media.api_value()))
            .await
    }

    /// Add a drive. Disk media needs a size.
    pub async fn create(&self, drive: NewDrive) -> Result<Drive> {
        if drive.media == DriveMedia::Disk && drive.size_gb.is_none() {
            return Err(Error::InvalidArgument(
                "a size is required for disk media".to_owned(),
            ));
        }

        let disksize = drive
            .size_gb
            .map(|gb| {
                gb.checked_mul(GB)
                    .ok_or_else(|| Error::Validation(format!("drive size {gb} GB is out of range")))
            })
            .transpose()?;

        let mut body = object(json!({
            "machine": self.machine,
            "interface": drive.interface,
            "media": drive.media,
            "enabled": drive.enabled,
        }));
        put_opt(&mut body, "name", drive.name);
        put_opt(&mut body, "disksize", disksize);
        put_opt(&mut body, "preferred_tier", drive.tier.map(|t| t.to_string()));
        if !drive.description.is_empty() {
            body.insert("description".to_owned(), drive.description.into());
        }
        if drive.readonly {
            body.insert("readonly".to_owned(), true.into());
        }
        if let Some(source) = &drive.media_source {
            let key = source.resolve(self.client(), "files").await?;
            body.insert("media_source".to_owned(), key.into());
        }

        self.inner.create(body).await
    }

    /// Create a drive by importing a disk image file.
    pub async fn import_drive(&self, import: ImportDrive) -> Result<Drive> {
        let file = import.file.resolve(self.client(), "files").await?;

        let mut body = object(json!({
            "machine": self.machine,
            "interface": import.interface,
            "media": DriveMedia::Import,
            "media_source": file,
            "enabled": import.enabled,
            "preserve_drive_format": import.preserve_drive_format,
        }));
        put_opt(&mut body, "name", import.name);
        put_opt(&mut body, "preferred_tier", import.tier.map(|t| t.to_string()));

        self.inner.create(body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(value: Value) -> Drive {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_size_falls_back_to_allocated_bytes() {
        assert_eq!(drive(json!({"$key": 1, "disksize": 50 * GB})).size_gb(), 50.0);
        assert_eq!(
            drive(json!({"$key": 2, "disksize": null, "allocated_bytes": GB / 2})).size_gb(),
            0.5
        );
        assert_eq!(drive(json!({"$key": 3})).size_gb(), 0.0);
    }

    #[test]
    fn test_tier_accepts_string_or_number() {
        assert_eq!(drive(json!({"$key": 1, "preferred_tier": "3"})).tier(), Some(3));
        assert_eq!(drive(json!({"$key": 1, "preferred_tier": 2})).tier(), Some(2));
    }

    #[test]
    fn test_interface_display_keeps_unknown_values() {
        assert_eq!(
            drive(json!({"$key": 1, "interface": "virtio-scsi"})).interface_display(),
            "Virtio-SCSI"
        );
        assert_eq!(
            drive(json!({"$key": 1, "interface": "floppy"})).interface_display(),
            "floppy"
        );
    }
}
