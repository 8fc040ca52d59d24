//! Cloud-init files attached to VMs.
//!
//! Files are owned by a VM through an `owner` reference (`vms/<key>`). The
//! server never returns contents in a listing; use
//! [`CloudInitFileManager::get_content`] to read them back.

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::constants::CLOUDINIT_MAX_SIZE;
use verge_api::filter::quote;
use verge_api::key::{parse_reference, reference};
use verge_api::record::epoch_to_datetime;
use verge_api::transfer::download_bytes;
use verge_api::{Client, Endpoint, Error, ListParams, Lookup, ResourceManager, Result};

use crate::util::{name_clause, object, put_opt};

const CLOUDINIT_FILES: Endpoint = Endpoint::new("cloudinit_files").fields(&[
    "$key",
    "name",
    "owner",
    "filesize",
    "allocated_bytes",
    "used_bytes",
    "modified",
    "render",
    "contains_variables",
    "creator",
]);

verge_api::api_enum! {
    /// How the server processes a file before handing it to the guest.
    pub enum RenderType {
        No => ("no", "No"),
        Variables => ("variables", "Variables"),
        Jinja2 => ("jinja2", "Jinja2"),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudInitFile {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    /// `vms/<key>`.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub allocated_bytes: Option<u64>,
    #[serde(default)]
    pub used_bytes: Option<u64>,
    #[serde(default)]
    pub modified: Option<i64>,
    #[serde(default)]
    pub render: Option<String>,
    #[serde(default)]
    pub contains_variables: Option<bool>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(CloudInitFile, u64);

impl CloudInitFile {
    pub fn vm_key(&self) -> Option<u64> {
        self.owner.as_deref().and_then(parse_reference)
    }

    pub fn render(&self) -> Option<RenderType> {
        self.render.as_deref().and_then(RenderType::from_api_value)
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified.and_then(epoch_to_datetime)
    }
}

fn check_contents(contents: Option<&str>) -> Result<()> {
    match contents {
        Some(contents) if contents.len() > CLOUDINIT_MAX_SIZE => Err(Error::Validation(format!(
            "contents exceed the maximum of {CLOUDINIT_MAX_SIZE} bytes ({} bytes)",
            contents.len()
        ))),
        _ => Ok(()),
    }
}

/// Arguments of [`CloudInitFileManager::create`].
#[derive(Debug, Clone)]
pub struct NewCloudInitFile {
    name: String,
    contents: Option<String>,
    render: RenderType,
}

impl NewCloudInitFile {
    /// Usually `/user-data`, `/meta-data` or `/network-config`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: None,
            render: RenderType::No,
        }
    }

    pub fn contents(mut self, contents: impl Into<String>) -> Self {
        self.contents = Some(contents.into());
        self
    }

    pub fn render(mut self, render: RenderType) -> Self {
        self.render = render;
        self
    }

    pub(crate) fn check_size(&self) -> Result<()> {
        check_contents(self.contents.as_deref())
    }
}

/// Changes applied by [`CloudInitFileManager::update`].
#[derive(Debug, Clone, Default)]
pub struct CloudInitFileUpdate {
    pub name: Option<String>,
    pub contents: Option<String>,
    pub render: Option<RenderType>,
}

/// Manager for `cloudinit_files`.
#[derive(Clone)]
pub struct CloudInitFileManager {
    inner: ResourceManager<CloudInitFile>,
}

impl Deref for CloudInitFileManager {
    type Target = ResourceManager<CloudInitFile>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl CloudInitFileManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, CLOUDINIT_FILES),
        }
    }

    /// Files filtered by owning VM, name (`*` wildcards allowed) and render type.
    pub async fn search(
        &self,
        vm: Option<u64>,
        name: Option<&str>,
        render: Option<RenderType>,
    ) -> Result<Vec<CloudInitFile>> {
        let mut params = ListParams::new()
            .term("owner", vm.map(|key| reference("vms", &key)))
            .term("render", render.map(RenderType::api_value));
        if let Some(name) = name {
            params = params.filter(name_clause(name));
        }
        self.inner.list(&params).await
    }

    pub async fn list_for_vm(&self, vm: u64) -> Result<Vec<CloudInitFile>> {
        self.search(Some(vm), None, None).await
    }

    /// Fetch by key, or by name within a VM. Names are only unique per VM.
    pub async fn get(&self, lookup: Lookup<u64>, vm: Option<u64>) -> Result<CloudInitFile> {
        match lookup {
            Lookup::Key(key) => self.inner.get_by_key(&key).await,
            Lookup::Name(name) => {
                let vm = vm.ok_or_else(|| {
                    Error::InvalidArgument("a VM is required to look up a file by name".to_owned())
                })?;
                self.inner
                    .find_one(owned_by(vm, &name))
                    .await?
                    .ok_or_else(|| {
                        Error::NotFound(format!("cloud-init file {name:?} for VM {vm}"))
                    })
            }
        }
    }

    /// Attach a new file to a VM.
    pub async fn create(&self, vm: u64, file: NewCloudInitFile) -> Result<CloudInitFile> {
        file.check_size()?;
        let fallback = owned_by(vm, &file.name);
        let mut body = object(json!({
            "name": file.name,
            "owner": reference("vms", &vm),
            "render": file.render,
        }));
        put_opt(&mut body, "contents", file.contents);
        self.inner.create_with_fallback(body, Some(fallback)).await
    }

    pub async fn update(&self, key: u64, changes: CloudInitFileUpdate) -> Result<CloudInitFile> {
        check_contents(changes.contents.as_deref())?;
        let mut body = Map::new();
        put_opt(&mut body, "name", changes.name);
        put_opt(&mut body, "contents", changes.contents);
        put_opt(&mut body, "render", changes.render);
        self.inner.update(&key, body).await
    }

    /// Download the raw file contents.
    pub async fn get_content(&self, key: u64) -> Result<String> {
        let query = [("download".to_owned(), "1".to_owned())];
        let bytes = download_bytes(self.client(), &self.record_path(&key), &query).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn owned_by(vm: u64, name: &str) -> ListParams {
    ListParams::new().filter(format!(
        "owner eq {} and name eq {}",
        quote(&reference("vms", &vm)),
        quote(name)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_type_round_trip() {
        for render in RenderType::ALL {
            assert_eq!(RenderType::parse(render.display_name()).unwrap(), *render);
        }
        assert_eq!(RenderType::parse("JINJA2").unwrap(), RenderType::Jinja2);
    }

    #[test]
    fn test_contents_size_limit() {
        let at_limit = "x".repeat(CLOUDINIT_MAX_SIZE);
        assert!(NewCloudInitFile::new("/user-data").contents(at_limit).check_size().is_ok());

        let over = "x".repeat(CLOUDINIT_MAX_SIZE + 1);
        let err = NewCloudInitFile::new("/user-data")
            .contents(over)
            .check_size()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_vm_key_from_owner() {
        let file: CloudInitFile =
            serde_json::from_value(json!({"$key": 1, "name": "/user-data", "owner": "vms/12"}))
                .unwrap();
        assert_eq!(file.vm_key(), Some(12));
    }
}
