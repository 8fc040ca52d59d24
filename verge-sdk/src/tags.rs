//! Tags, tag categories and tag memberships.
//!
//! A category decides which resource types its tags may be applied to. A
//! membership row links one tag to one resource through a `member`
//! reference such as `vms/12`.

use std::ops::Deref;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::filter::quote;
use verge_api::key::reference;
use verge_api::{Client, Endpoint, Error, ListParams, ResourceManager, Result};

use crate::util::{object, put_opt};

const TAGS: Endpoint = Endpoint::new("tags").fields(&[
    "$key",
    "name",
    "description",
    "category",
    "category#name as category_name",
    "created",
    "modified",
]);

const TAG_CATEGORIES: Endpoint = Endpoint::new("tag_categories").fields(&[
    "$key",
    "name",
    "description",
    "single_tag_selection",
    "taggable_vms",
    "taggable_vnets",
    "taggable_volumes",
    "taggable_vnet_rules",
    "taggable_vmware_containers",
    "taggable_users",
    "taggable_tenant_nodes",
    "taggable_sites",
    "taggable_nodes",
    "taggable_groups",
    "taggable_clusters",
    "taggable_tenants",
    "created",
    "modified",
]);

const TAG_MEMBERS: Endpoint = Endpoint::new("tag_members").fields(&[
    "$key",
    "tag",
    "tag#name as tag_name",
    "tag#category#name as category_name",
    "member",
]);

verge_api::api_enum! {
    /// Resource types a tag can be applied to. The API value is the collection name.
    pub enum TaggableType {
        Vm => ("vms", "Virtual Machine"),
        Network => ("vnets", "Network"),
        Volume => ("volumes", "Volume"),
        NetworkRule => ("vnet_rules", "Network Rule"),
        VmwareContainer => ("vmware_containers", "VMware Container"),
        User => ("users", "User"),
        TenantNode => ("tenant_nodes", "Tenant Node"),
        Site => ("sites", "Site"),
        Node => ("nodes", "Node"),
        Group => ("groups", "Group"),
        Cluster => ("clusters", "Cluster"),
        Tenant => ("tenants", "Tenant"),
    }
}

impl TaggableType {
    /// The category flag that enables tagging this type.
    pub fn category_flag(self) -> &'static str {
        match self {
            Self::Vm => "taggable_vms",
            Self::Network => "taggable_vnets",
            Self::Volume => "taggable_volumes",
            Self::NetworkRule => "taggable_vnet_rules",
            Self::VmwareContainer => "taggable_vmware_containers",
            Self::User => "taggable_users",
            Self::TenantNode => "taggable_tenant_nodes",
            Self::Site => "taggable_sites",
            Self::Node => "taggable_nodes",
            Self::Group => "taggable_groups",
            Self::Cluster => "taggable_clusters",
            Self::Tenant => "taggable_tenants",
        }
    }
}

// =============================================================================
// Categories
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TagCategory {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub single_tag_selection: Option<bool>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub modified: Option<i64>,
    /// The `taggable_*` flags and anything else the server sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(TagCategory, u64);

impl TagCategory {
    /// Only one tag of this category may be applied to a resource.
    pub fn is_single_tag_selection(&self) -> bool {
        self.single_tag_selection.unwrap_or(false)
    }

    pub fn is_taggable(&self, resource: TaggableType) -> bool {
        self.extra
            .get(resource.category_flag())
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Every resource type this category's tags may be applied to.
    pub fn taggable_types(&self) -> Vec<TaggableType> {
        TaggableType::ALL
            .iter()
            .copied()
            .filter(|t| self.is_taggable(*t))
            .collect()
    }
}

/// Arguments of [`TagCategoryManager::create`].
#[derive(Debug, Clone)]
pub struct NewTagCategory {
    name: String,
    description: Option<String>,
    single_tag_selection: bool,
    taggable: Vec<TaggableType>,
}

impl NewTagCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            single_tag_selection: false,
            taggable: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn single_tag_selection(mut self, single: bool) -> Self {
        self.single_tag_selection = single;
        self
    }

    /// Allow tagging `resource`. May be called repeatedly.
    pub fn taggable(mut self, resource: TaggableType) -> Self {
        if !self.taggable.contains(&resource) {
            self.taggable.push(resource);
        }
        self
    }

    fn into_body(self) -> Map<String, Value> {
        let mut body = object(json!({ "name": self.name }));
        put_opt(&mut body, "description", self.description.filter(|d| !d.is_empty()));
        if self.single_tag_selection {
            body.insert("single_tag_selection".to_owned(), true.into());
        }
        for resource in self.taggable {
            body.insert(resource.category_flag().to_owned(), true.into());
        }
        body
    }
}

/// Manager for `tag_categories`.
#[derive(Clone)]
pub struct TagCategoryManager {
    inner: ResourceManager<TagCategory>,
}

impl Deref for TagCategoryManager {
    type Target = ResourceManager<TagCategory>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl TagCategoryManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, TAG_CATEGORIES),
        }
    }

    pub async fn create(&self, category: NewTagCategory) -> Result<TagCategory> {
        self.inner.create(category.into_body()).await
    }

    /// Set or clear individual taggable flags.
    pub async fn set_taggable(
        &self,
        key: u64,
        changes: &[(TaggableType, bool)],
    ) -> Result<TagCategory> {
        let body = changes
            .iter()
            .map(|(resource, on)| (resource.category_flag().to_owned(), Value::Bool(*on)))
            .collect();
        self.inner.update(&key, body).await
    }

    /// Tags belonging to a category.
    pub async fn tags(&self, key: u64) -> Result<Vec<Tag>> {
        TagManager::new(self.client()).list_in_category(key).await
    }
}

// =============================================================================
// Tags
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<u64>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub modified: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(Tag, u64);

/// Manager for `tags`.
#[derive(Clone)]
pub struct TagManager {
    inner: ResourceManager<Tag>,
}

impl Deref for TagManager {
    type Target = ResourceManager<Tag>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl TagManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, TAGS),
        }
    }

    pub async fn list_in_category(&self, category: u64) -> Result<Vec<Tag>> {
        self.inner
            .list(&ListParams::new().term("category", category))
            .await
    }

    /// Tag names are unique per category only.
    pub async fn get_in_category(&self, name: &str, category: u64) -> Result<Tag> {
        self.inner
            .find_one(ListParams::new().term("name", name).term("category", category))
            .await?
            .ok_or_else(|| Error::NotFound(format!("tag {name:?} in category {category}")))
    }

    pub async fn create(
        &self,
        name: &str,
        category: u64,
        description: Option<&str>,
    ) -> Result<Tag> {
        let mut body = object(json!({ "name": name, "category": category }));
        put_opt(&mut body, "description", description.filter(|d| !d.is_empty()));
        let fallback = ListParams::new().term("name", name).term("category", category);
        self.inner.create_with_fallback(body, Some(fallback)).await
    }

    pub async fn update(
        &self,
        key: u64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Tag> {
        let mut body = Map::new();
        put_opt(&mut body, "name", name);
        put_opt(&mut body, "description", description);
        self.inner.update(&key, body).await
    }

    /// Memberships of one tag.
    pub fn members(&self, tag: u64) -> TagMemberManager {
        TagMemberManager::new(self.client(), tag)
    }
}

// =============================================================================
// Members
// =============================================================================

/// One resource carrying one tag.
#[derive(Debug, Clone, Deserialize)]
pub struct TagMember {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub tag: Option<u64>,
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    /// `<collection>/<key>`.
    #[serde(default)]
    pub member: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(TagMember, u64);

impl TagMember {
    pub fn resource_type(&self) -> Option<TaggableType> {
        let (collection, _) = self.member.split_once('/')?;
        TaggableType::from_api_value(collection)
    }

    pub fn resource_key(&self) -> Option<u64> {
        self.member.split_once('/')?.1.parse().ok()
    }
}

/// Manager for `tag_members`, usually scoped to one tag.
#[derive(Clone)]
pub struct TagMemberManager {
    inner: ResourceManager<TagMember>,
    tag: Option<u64>,
}

impl Deref for TagMemberManager {
    type Target = ResourceManager<TagMember>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl TagMemberManager {
    pub fn new(client: &Client, tag: u64) -> Self {
        Self {
            inner: ResourceManager::scoped(client, TAG_MEMBERS, format!("tag eq {tag}")),
            tag: Some(tag),
        }
    }

    /// Memberships across every tag.
    pub fn all(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, TAG_MEMBERS),
            tag: None,
        }
    }

    /// Members of one resource type, by `member` prefix.
    pub async fn list_by_type(&self, resource: TaggableType) -> Result<Vec<TagMember>> {
        let prefix = format!("{}/", resource.api_value());
        self.inner
            .list(&ListParams::new().filter(format!("member bw {}", quote(&prefix))))
            .await
    }

    /// Apply the tag to a resource.
    pub async fn add(&self, resource: TaggableType, key: u64) -> Result<TagMember> {
        let tag = self.tag()?;
        let member = reference(resource.api_value(), &key);
        let fallback = ListParams::new().term("member", member.as_str());
        let body = object(json!({ "tag": tag, "member": member }));
        self.inner.create_with_fallback(body, Some(fallback)).await
    }

    /// Delete a membership row.
    pub async fn remove(&self, membership: u64) -> Result<()> {
        self.inner.delete(&membership).await
    }

    /// Take the tag off a resource.
    pub async fn remove_resource(&self, resource: TaggableType, key: u64) -> Result<()> {
        self.tag()?;
        let member = reference(resource.api_value(), &key);
        let row = self
            .inner
            .find_one(ListParams::new().term("member", member.as_str()))
            .await?
            .ok_or_else(|| Error::NotFound(format!("tag membership for {member}")))?;
        self.inner.delete(&row.key).await
    }

    fn tag(&self) -> Result<u64> {
        self.tag.ok_or_else(|| {
            Error::InvalidArgument("membership changes need a tag-scoped manager".to_owned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_reference_parts() {
        let member: TagMember =
            serde_json::from_value(json!({"$key": 9, "tag": 2, "member": "vnets/14"})).unwrap();
        assert_eq!(member.resource_type(), Some(TaggableType::Network));
        assert_eq!(member.resource_key(), Some(14));
    }

    #[test]
    fn test_category_flags() {
        let body = NewTagCategory::new("Environment")
            .taggable(TaggableType::Vm)
            .taggable(TaggableType::Network)
            .single_tag_selection(true)
            .into_body();
        assert_eq!(body["taggable_vms"], true);
        assert_eq!(body["taggable_vnets"], true);
        assert_eq!(body["single_tag_selection"], true);
        assert!(!body.contains_key("taggable_tenants"));

        let category: TagCategory =
            serde_json::from_value(json!({"$key": 1, "name": "Env", "taggable_tenants": true}))
                .unwrap();
        assert_eq!(category.taggable_types(), vec![TaggableType::Tenant]);
    }

    #[test]
    fn test_taggable_type_parse() {
        assert_eq!(TaggableType::parse("Virtual Machine").unwrap(), TaggableType::Vm);
        assert_eq!(TaggableType::parse("vnet_rules").unwrap(), TaggableType::NetworkRule);
    }
}
