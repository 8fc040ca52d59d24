//! Local users of NAS services, used for CIFS/SMB authentication.
//!
//! Unlike most collections, `vm_service_users` is keyed by 40-character hex
//! strings ([`NasUserKey`]) and records are fetched by filter, not by path.

use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::filter::quote;
use verge_api::record::epoch_to_datetime;
use verge_api::{Client, Endpoint, Error, ListParams, Lookup, NasUserKey, ResourceManager, Result};

use crate::nas_services::NasServiceManager;
use crate::util::{KeyOrName, as_u64, key_by_filter, object, put_opt};

const NAS_USERS: Endpoint = Endpoint::new("vm_service_users")
    .fields(&[
        "$key",
        "name",
        "enabled",
        "displayname",
        "description",
        "home_share",
        "display(home_share) as home_share_display",
        "home_drive",
        "created",
        "service",
        "service#$display as service_display",
        "service#name as service_name",
        "status#status as status_value",
        "status#status_info as status_info",
        "status#user_sid as user_sid",
        "status#group_sid as group_sid",
        "status#user_id as user_id",
        "status#group_id as group_id",
    ])
    .lookup_by_filter();

const CIFS_SHARES: &str = "volume_cifs_shares";

#[derive(Debug, Clone, Deserialize)]
pub struct NasUser {
    #[serde(rename = "$key")]
    pub key: NasUserKey,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub displayname: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub home_share: Option<Value>,
    #[serde(default)]
    pub home_share_display: Option<String>,
    #[serde(default)]
    pub home_drive: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub service: Option<Value>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub service_display: Option<String>,
    #[serde(default)]
    pub status_value: Option<String>,
    #[serde(default)]
    pub status_info: Option<String>,
    #[serde(default)]
    pub user_sid: Option<String>,
    #[serde(default)]
    pub group_sid: Option<String>,
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default)]
    pub group_id: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(NasUser, NasUserKey);

impl NasUser {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    pub fn service_key(&self) -> Option<u64> {
        self.service.as_ref().and_then(as_u64)
    }

    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref().or(self.service_display.as_deref())
    }

    pub fn home_share_key(&self) -> Option<u64> {
        self.home_share.as_ref().and_then(as_u64)
    }

    pub fn user_id(&self) -> Option<u64> {
        self.user_id.as_ref().and_then(as_u64)
    }

    pub fn group_id(&self) -> Option<u64> {
        self.group_id.as_ref().and_then(as_u64)
    }

    /// `Enabled`, `Disabled` or `Error`; unknown states pass through.
    pub fn status_display(&self) -> &str {
        match self.status_value.as_deref() {
            Some("online") => "Enabled",
            Some("offline") => "Disabled",
            Some("error") => "Error",
            Some(other) if !other.is_empty() => other,
            _ => "Unknown",
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(epoch_to_datetime)
    }
}

/// Arguments of [`NasUserManager::create`].
#[derive(Debug, Clone)]
pub struct NewNasUser {
    service: KeyOrName,
    name: String,
    password: String,
    displayname: Option<String>,
    description: Option<String>,
    home_share: Option<KeyOrName>,
    home_drive: Option<String>,
    enabled: bool,
}

impl NewNasUser {
    pub fn new(
        service: impl Into<KeyOrName>,
        name: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            name: name.into(),
            password: password.into(),
            displayname: None,
            description: None,
            home_share: None,
            home_drive: None,
            enabled: true,
        }
    }

    pub fn displayname(mut self, displayname: impl Into<String>) -> Self {
        self.displayname = Some(displayname.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// CIFS share on the same NAS service, by key or name.
    pub fn home_share(mut self, share: impl Into<KeyOrName>) -> Self {
        self.home_share = Some(share.into());
        self
    }

    /// Drive letter, e.g. `h`. Sent upper-case.
    pub fn home_drive(mut self, drive: impl Into<String>) -> Self {
        self.home_drive = Some(drive.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Changes applied by [`NasUserManager::update`]. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct NasUserUpdate {
    password: Option<String>,
    displayname: Option<String>,
    description: Option<String>,
    home_share: Option<Option<KeyOrName>>,
    home_drive: Option<String>,
    enabled: Option<bool>,
}

impl NasUserUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn displayname(mut self, displayname: impl Into<String>) -> Self {
        self.displayname = Some(displayname.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn home_share(mut self, share: impl Into<KeyOrName>) -> Self {
        self.home_share = Some(Some(share.into()));
        self
    }

    pub fn clear_home_share(mut self) -> Self {
        self.home_share = Some(None);
        self
    }

    /// An empty string clears the drive letter.
    pub fn home_drive(mut self, drive: impl Into<String>) -> Self {
        self.home_drive = Some(drive.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }
}

/// Manager for `vm_service_users`.
#[derive(Clone)]
pub struct NasUserManager {
    inner: ResourceManager<NasUser>,
}

impl Deref for NasUserManager {
    type Target = ResourceManager<NasUser>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl NasUserManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, NAS_USERS),
        }
    }

    /// Users of one NAS service, optionally filtered by enabled state.
    pub async fn list_for_service(
        &self,
        service: impl Into<KeyOrName>,
        enabled: Option<bool>,
    ) -> Result<Vec<NasUser>> {
        let service = self.service_key(&service.into()).await?;
        let params = ListParams::new()
            .term("service", service)
            .term("enabled", enabled);
        self.inner.list(&params).await
    }

    /// Fetch by key, or by name within `service`.
    ///
    /// User names are only unique per service, so a name lookup without a
    /// service is refused with [`Error::InvalidArgument`].
    pub async fn get(
        &self,
        lookup: Lookup<NasUserKey>,
        service: Option<KeyOrName>,
    ) -> Result<NasUser> {
        match lookup {
            Lookup::Key(key) => self.inner.get_by_key(&key).await,
            Lookup::Name(name) => {
                let service = service.ok_or_else(|| {
                    Error::InvalidArgument("service is required when looking up by name".to_owned())
                })?;
                let service = self.service_key(&service).await?;
                self.inner
                    .find_one(name_on_service(service, &name))
                    .await?
                    .ok_or_else(|| {
                        Error::NotFound(format!("NAS user {name:?} on service {service}"))
                    })
            }
        }
    }

    pub async fn get_by_name(&self, name: &str, service: Option<KeyOrName>) -> Result<NasUser> {
        self.get(Lookup::Name(name.to_owned()), service).await
    }

    pub async fn create(&self, user: NewNasUser) -> Result<NasUser> {
        let service = self.service_key(&user.service).await?;
        let mut body = object(json!({
            "service": service,
            "name": user.name,
            "password": user.password,
            "enabled": user.enabled,
        }));
        put_opt(&mut body, "displayname", user.displayname.filter(|s| !s.is_empty()));
        put_opt(&mut body, "description", user.description.filter(|s| !s.is_empty()));
        if let Some(share) = &user.home_share {
            body.insert("home_share".to_owned(), self.share_key(share, service).await?.into());
        }
        put_opt(
            &mut body,
            "home_drive",
            user.home_drive.filter(|s| !s.is_empty()).map(|d| d.to_uppercase()),
        );

        let fallback = name_on_service(service, &user.name);
        self.inner.create_with_fallback(body, Some(fallback)).await
    }

    pub async fn update(&self, key: &NasUserKey, changes: NasUserUpdate) -> Result<NasUser> {
        let mut body = Map::new();
        put_opt(&mut body, "password", changes.password);
        put_opt(&mut body, "displayname", changes.displayname);
        put_opt(&mut body, "description", changes.description);
        match changes.home_share {
            Some(Some(share)) => {
                let user = self.inner.get_by_key(key).await?;
                let service = user.service_key().ok_or_else(|| {
                    Error::Validation(format!("NAS user {key} has no service"))
                })?;
                body.insert("home_share".to_owned(), self.share_key(&share, service).await?.into());
            }
            Some(None) => {
                body.insert("home_share".to_owned(), Value::Null);
            }
            None => {}
        }
        put_opt(&mut body, "home_drive", changes.home_drive.map(|d| d.to_uppercase()));
        put_opt(&mut body, "enabled", changes.enabled);
        self.inner.update(key, body).await
    }

    pub async fn enable(&self, key: &NasUserKey) -> Result<NasUser> {
        self.update(key, NasUserUpdate::new().enabled(true)).await
    }

    pub async fn disable(&self, key: &NasUserKey) -> Result<NasUser> {
        self.update(key, NasUserUpdate::new().enabled(false)).await
    }

    async fn service_key(&self, service: &KeyOrName) -> Result<u64> {
        NasServiceManager::new(self.client()).resolve_key(service).await
    }

    async fn share_key(&self, share: &KeyOrName, service: u64) -> Result<u64> {
        match share {
            KeyOrName::Key(key) => Ok(*key),
            KeyOrName::Name(name) => {
                let filter = format!("volume#service eq {service} and name eq {}", quote(name));
                key_by_filter(self.client(), CIFS_SHARES, &filter)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("CIFS share {name:?} on service {service}")))
            }
        }
    }
}

fn name_on_service(service: u64, name: &str) -> ListParams {
    ListParams::new().filter(format!("service eq {service} and name eq {}", quote(name)))
}
