//! Virtual networks and their firewall rules.

mod rules;

use std::ops::Deref;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::{Client, Endpoint, ListParams, ResourceManager, Result};

pub use rules::{
    NetworkRule, NewRule, RuleAction, RuleDirection, RuleInterface, RuleManager, RulePin,
    RuleProtocol,
};

use crate::util::{object, put_opt};

const VNETS: Endpoint = Endpoint::new("vnets")
    .fields(&[
        "$key",
        "name",
        "description",
        "type",
        "enabled",
        "network",
        "ipaddress",
        "dhcp_enabled",
        "powerstate",
        "need_restart",
        "need_fw_apply",
        "machine",
    ])
    .actions("vnet_actions", "vnet");

verge_api::api_enum! {
    pub enum NetworkType {
        Internal => ("internal", "Internal"),
        External => ("external", "External"),
        Dmz => ("dmz", "DMZ"),
        Core => ("core", "Core"),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Network {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub network_type: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Address block in CIDR notation.
    #[serde(default)]
    pub network: Option<String>,
    /// Router address.
    #[serde(default)]
    pub ipaddress: Option<String>,
    #[serde(default)]
    pub dhcp_enabled: Option<bool>,
    #[serde(default)]
    pub powerstate: Option<bool>,
    #[serde(default)]
    pub need_restart: Option<bool>,
    #[serde(default)]
    pub need_fw_apply: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(Network, u64);

impl Network {
    pub fn network_type(&self) -> Option<NetworkType> {
        self.network_type.as_deref().and_then(NetworkType::from_api_value)
    }

    pub fn is_running(&self) -> bool {
        self.powerstate.unwrap_or(false)
    }

    pub fn needs_restart(&self) -> bool {
        self.need_restart.unwrap_or(false)
    }

    /// Rules were edited but not yet applied.
    pub fn needs_rule_apply(&self) -> bool {
        self.need_fw_apply.unwrap_or(false)
    }
}

/// Arguments of [`NetworkManager::create`].
#[derive(Debug, Clone)]
pub struct NewNetwork {
    name: String,
    network_type: NetworkType,
    network_address: Option<String>,
    ip_address: Option<String>,
    dhcp_enabled: bool,
    description: String,
}

impl NewNetwork {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network_type: NetworkType::Internal,
            network_address: None,
            ip_address: None,
            dhcp_enabled: false,
            description: String::new(),
        }
    }

    pub fn network_type(mut self, network_type: NetworkType) -> Self {
        self.network_type = network_type;
        self
    }

    /// Address block, e.g. `10.0.0.0/24`.
    pub fn cidr(mut self, cidr: impl Into<String>) -> Self {
        self.network_address = Some(cidr.into());
        self
    }

    /// Router address inside the block.
    pub fn router_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn dhcp(mut self, enabled: bool) -> Self {
        self.dhcp_enabled = enabled;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Manager for `vnets`.
#[derive(Clone)]
pub struct NetworkManager {
    inner: ResourceManager<Network>,
}

impl Deref for NetworkManager {
    type Target = ResourceManager<Network>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl NetworkManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, VNETS),
        }
    }

    pub async fn list_internal(&self) -> Result<Vec<Network>> {
        self.list_by_type(NetworkType::Internal).await
    }

    pub async fn list_external(&self) -> Result<Vec<Network>> {
        self.list_by_type(NetworkType::External).await
    }

    pub async fn list_by_type(&self, network_type: NetworkType) -> Result<Vec<Network>> {
        self.inner
            .list(&ListParams::new().term("type", network_type.api_value()))
            .await
    }

    pub async fn list_running(&self) -> Result<Vec<Network>> {
        self.inner.list(&ListParams::new().term("powerstate", true)).await
    }

    pub async fn create(&self, network: NewNetwork) -> Result<Network> {
        let mut body = object(json!({
            "name": network.name,
            "type": network.network_type,
            "dhcp_enabled": network.dhcp_enabled,
            "description": network.description,
        }));
        put_opt(&mut body, "network", network.network_address);
        put_opt(&mut body, "ipaddress", network.ip_address);
        self.inner.create(body).await
    }

    /// Firewall rules of one network.
    pub fn rules(&self, network: u64) -> RuleManager {
        RuleManager::new(self.client(), network)
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Start the network, applying firewall rules unless told otherwise.
    pub async fn power_on(&self, key: u64, apply_rules: bool) -> Result<Option<Value>> {
        self.vnet_action(key, "poweron", Some(apply_rules)).await
    }

    pub async fn power_off(&self, key: u64) -> Result<Option<Value>> {
        self.vnet_action(key, "poweroff", None).await
    }

    pub async fn reset(&self, key: u64, apply_rules: bool) -> Result<Option<Value>> {
        self.vnet_action(key, "reset", Some(apply_rules)).await
    }

    /// Activate pending firewall rule changes.
    pub async fn apply_rules(&self, key: u64) -> Result<Option<Value>> {
        self.vnet_action(key, "apply", None).await
    }

    pub async fn apply_dns(&self, key: u64) -> Result<Option<Value>> {
        self.vnet_action(key, "applydns", None).await
    }

    async fn vnet_action(&self, key: u64, action: &str, apply: Option<bool>) -> Result<Option<Value>> {
        let body = match apply {
            Some(apply) => object(json!({ "params": { "apply": apply } })),
            None => Map::new(),
        };
        self.inner.action(&key, action, body).await
    }
}
