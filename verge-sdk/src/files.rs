//! The media catalog: ISOs and disk images.
//!
//! Uploads create the catalog entry first and then stream the contents in
//! chunks. If any chunk fails the half-written entry is deleted again.

use std::ops::Deref;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::fs;
use tracing::{error, info};
use verge_api::manager::created_key;
use verge_api::record::{bytes_to_gb, epoch_to_datetime};
use verge_api::transfer::{Progress, download_to, upload_chunks};
use verge_api::{Client, Compensation, Endpoint, Error, ListParams, ResourceManager, Result};

use crate::util::{as_u64, object, put_opt};

const FILES: Endpoint = Endpoint::new("files").fields(&[
    "$key",
    "name",
    "type",
    "description",
    "filesize",
    "allocated_bytes",
    "used_bytes",
    "preferred_tier",
    "modified",
    "creator",
]);

verge_api::api_enum! {
    pub enum FileType {
        Iso => ("iso", "ISO"),
        Img => ("img", "IMG (Raw Disk Image)"),
        Qcow => ("qcow", "QCOW (Legacy QEMU)"),
        Qcow2 => ("qcow2", "QCOW2 (QEMU, Xen)"),
        Qed => ("qed", "QED (KVM)"),
        Raw => ("raw", "Raw (Binary Disc Image)"),
        Vdi => ("vdi", "VDI (VirtualBox)"),
        Vhd => ("vhd", "VHD/VPC (Legacy Hyper-V)"),
        Vhdx => ("vhdx", "VHDX (Hyper-V)"),
        Vmdk => ("vmdk", "VMDK (VMware)"),
        Ova => ("ova", "OVA (VMware, VirtualBox)"),
        Ovf => ("ovf", "OVF (VMware, VirtualBox)"),
        Vmx => ("vmx", "VMX (VMware)"),
        Ybvm => ("ybvm", "Verge.io Virtual Machine"),
        Nvram => ("nvram", "NVRAM"),
        Zip => ("zip", "ZIP"),
    }
}

/// An entry in the media catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct File {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub allocated_bytes: Option<u64>,
    #[serde(default)]
    pub used_bytes: Option<u64>,
    #[serde(default)]
    pub preferred_tier: Option<Value>,
    #[serde(default)]
    pub modified: Option<i64>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(File, u64);

impl File {
    pub fn file_type(&self) -> Option<FileType> {
        self.file_type.as_deref().and_then(FileType::from_api_value)
    }

    /// Human readable type; unknown types are shown as sent.
    pub fn type_display(&self) -> &str {
        match self.file_type() {
            Some(file_type) => file_type.display_name(),
            None => self.file_type.as_deref().unwrap_or_default(),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.filesize.unwrap_or(0)
    }

    pub fn size_gb(&self) -> f64 {
        bytes_to_gb(self.size_bytes())
    }

    pub fn used_gb(&self) -> f64 {
        bytes_to_gb(self.used_bytes.unwrap_or(0))
    }

    pub fn allocated_gb(&self) -> f64 {
        bytes_to_gb(self.allocated_bytes.unwrap_or(0))
    }

    pub fn preferred_tier(&self) -> Option<u64> {
        self.preferred_tier.as_ref().and_then(as_u64)
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified.and_then(epoch_to_datetime)
    }
}

/// Options of [`FileManager::upload`].
#[derive(Default)]
pub struct Upload<'a> {
    /// Catalog name; the local file name by default.
    pub name: Option<String>,
    pub description: Option<String>,
    pub tier: Option<u8>,
    /// Called with `(bytes sent, total)` after each chunk.
    pub progress: Option<Progress<'a>>,
}

/// Manager for `files`.
#[derive(Clone)]
pub struct FileManager {
    inner: ResourceManager<File>,
}

impl Deref for FileManager {
    type Target = ResourceManager<File>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl FileManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, FILES),
        }
    }

    /// Files of any of `types`. Filtered client-side.
    pub async fn list_by_type(&self, types: &[FileType]) -> Result<Vec<File>> {
        let files = self.inner.list(&ListParams::new()).await?;
        Ok(files
            .into_iter()
            .filter(|f| f.file_type().is_some_and(|t| types.contains(&t)))
            .collect())
    }

    /// Upload a local file into the catalog.
    pub async fn upload(&self, path: &Path, options: Upload<'_>) -> Result<File> {
        let metadata = fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(Error::Validation(format!("not a file: {}", path.display())));
        }
        let total = metadata.len();
        let name = match options.name {
            Some(name) => name,
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::InvalidArgument(format!("no file name in {}", path.display())))?,
        };

        info!(path = %path.display(), total, %name, "uploading file");
        let mut body = object(json!({
            "name": name,
            "allocated_bytes": total.to_string(),
        }));
        put_opt(&mut body, "description", options.description.filter(|d| !d.is_empty()));
        put_opt(&mut body, "preferred_tier", options.tier.map(|t| t.to_string()));

        let response = self.client().post(FILES.name, &Value::Object(body)).await?;
        let key: u64 = response
            .as_ref()
            .and_then(created_key)
            .ok_or_else(|| Error::Validation("could not determine the new file key".to_owned()))?;

        let entry = Compensation::new(self.client(), self.record_path(&key));
        let mut reader = fs::File::open(path).await?;
        let uploaded =
            upload_chunks(self.client(), entry.path(), &mut reader, total, options.progress).await;
        match uploaded {
            Ok(_) => entry.commit(),
            Err(e) => {
                error!(file = key, error = %e, "upload failed, removing partial entry");
                if let Err(cleanup) = entry.rollback().await {
                    error!(file = key, error = %cleanup, "could not remove partial entry");
                }
                return Err(e);
            }
        }

        self.inner.get_by_key(&key).await
    }

    /// Download a file to `destination`, a directory or a full path.
    ///
    /// Returns the path written. An existing file is only replaced when
    /// `overwrite` is set.
    pub async fn download(&self, key: u64, destination: &Path, overwrite: bool) -> Result<PathBuf> {
        let file = self.inner.get_by_key(&key).await?;
        let output = if fs::metadata(destination).await.is_ok_and(|m| m.is_dir()) {
            destination.join(&file.name)
        } else {
            destination.to_path_buf()
        };
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let query = [
            ("download".to_owned(), "1".to_owned()),
            ("asname".to_owned(), file.name.clone()),
        ];
        download_to(self.client(), &self.record_path(&key), &query, &output, overwrite).await?;
        Ok(output)
    }
}
