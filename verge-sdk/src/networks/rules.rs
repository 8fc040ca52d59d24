use std::ops::Deref;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::{Client, Endpoint, Error, ListParams, ResourceManager, Result};

use crate::util::{object, put_opt};

const VNET_RULES: Endpoint = Endpoint::new("vnet_rules")
    .fields(&[
        "$key",
        "vnet",
        "vnet#name as vnet_name",
        "name",
        "description",
        "enabled",
        "orderid",
        "pin",
        "direction",
        "action",
        "protocol",
        "interface",
        "source_ip",
        "source_ports",
        "destination_ip",
        "destination_ports",
        "target_ip",
        "target_ports",
        "ct_state",
        "statistics",
        "log",
        "trace",
        "throttle",
        "drop_throttle",
        "packets",
        "bytes",
        "system_rule",
        "modified",
    ])
    .sort("+orderid");

verge_api::api_enum! {
    pub enum RuleDirection {
        Incoming => ("incoming", "Incoming"),
        Outgoing => ("outgoing", "Outgoing"),
    }
}

verge_api::api_enum! {
    pub enum RuleAction {
        Accept => ("accept", "Accept"),
        Drop => ("drop", "Drop"),
        Reject => ("reject", "Reject"),
        Translate => ("translate", "Translate"),
        Route => ("route", "Route"),
    }
}

verge_api::api_enum! {
    pub enum RuleProtocol {
        Tcp => ("tcp", "TCP"),
        Udp => ("udp", "UDP"),
        TcpUdp => ("tcpudp", "TCP/UDP"),
        Icmp => ("icmp", "ICMP"),
        Any => ("any", "Any"),
    }
}

verge_api::api_enum! {
    pub enum RuleInterface {
        Auto => ("auto", "Auto"),
        Router => ("router", "Router"),
        Dmz => ("dmz", "DMZ"),
        Wireguard => ("wireguard", "WireGuard"),
        Any => ("any", "Any"),
    }
}

verge_api::api_enum! {
    pub enum RulePin {
        Top => ("top", "Top"),
        Bottom => ("bottom", "Bottom"),
    }
}

/// A firewall rule of one network.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkRule {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub vnet: Option<u64>,
    #[serde(default)]
    pub vnet_name: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub orderid: Option<i64>,
    #[serde(default)]
    pub pin: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub source_ip: Option<String>,
    #[serde(default)]
    pub source_ports: Option<String>,
    #[serde(default)]
    pub destination_ip: Option<String>,
    #[serde(default)]
    pub destination_ports: Option<String>,
    #[serde(default)]
    pub target_ip: Option<String>,
    #[serde(default)]
    pub target_ports: Option<String>,
    #[serde(default)]
    pub statistics: Option<bool>,
    #[serde(default)]
    pub log: Option<bool>,
    #[serde(default)]
    pub packets: Option<u64>,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub system_rule: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(NetworkRule, u64);

impl NetworkRule {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    /// Rules the system maintains itself; never editable.
    pub fn is_system_rule(&self) -> bool {
        self.system_rule.unwrap_or(false)
    }

    pub fn direction(&self) -> Option<RuleDirection> {
        self.direction.as_deref().and_then(RuleDirection::from_api_value)
    }

    pub fn action(&self) -> Option<RuleAction> {
        self.action.as_deref().and_then(RuleAction::from_api_value)
    }

    pub fn protocol(&self) -> Option<RuleProtocol> {
        self.protocol.as_deref().and_then(RuleProtocol::from_api_value)
    }

    pub fn interface(&self) -> Option<RuleInterface> {
        self.interface.as_deref().and_then(RuleInterface::from_api_value)
    }
}

/// Arguments of [`RuleManager::create`].
#[derive(Debug, Clone)]
pub struct NewRule {
    name: String,
    direction: RuleDirection,
    action: RuleAction,
    protocol: RuleProtocol,
    interface: RuleInterface,
    enabled: bool,
    log: bool,
    statistics: bool,
    pin: Option<RulePin>,
    order: Option<i64>,
    optional: Map<String, Value>,
}

impl NewRule {
    /// An enabled incoming accept rule for any protocol on the auto interface.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: RuleDirection::Incoming,
            action: RuleAction::Accept,
            protocol: RuleProtocol::Any,
            interface: RuleInterface::Auto,
            enabled: true,
            log: false,
            statistics: false,
            pin: None,
            order: None,
            optional: Map::new(),
        }
    }

    pub fn direction(mut self, direction: RuleDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn action(mut self, action: RuleAction) -> Self {
        self.action = action;
        self
    }

    pub fn protocol(mut self, protocol: RuleProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn interface(mut self, interface: RuleInterface) -> Self {
        self.interface = interface;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn statistics(mut self, statistics: bool) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn pin(mut self, pin: RulePin) -> Self {
        self.pin = Some(pin);
        self
    }

    pub fn order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    /// IP, CIDR, or a keyword such as `vnetself`.
    pub fn source_ip(self, ip: impl Into<String>) -> Self {
        self.text("source_ip", ip.into())
    }

    /// Ports such as `80`, `80,443` or `1024-65535`.
    pub fn source_ports(self, ports: impl Into<String>) -> Self {
        self.text("source_ports", ports.into())
    }

    pub fn destination_ip(self, ip: impl Into<String>) -> Self {
        self.text("destination_ip", ip.into())
    }

    pub fn destination_ports(self, ports: impl Into<String>) -> Self {
        self.text("destination_ports", ports.into())
    }

    /// Target of a translate or route action.
    pub fn target_ip(self, ip: impl Into<String>) -> Self {
        self.text("target_ip", ip.into())
    }

    pub fn target_ports(self, ports: impl Into<String>) -> Self {
        self.text("target_ports", ports.into())
    }

    pub fn description(self, description: impl Into<String>) -> Self {
        self.text("description", description.into())
    }

    fn text(mut self, field: &str, value: String) -> Self {
        if !value.is_empty() {
            self.optional.insert(field.to_owned(), value.into());
        }
        self
    }
}

/// Manager for the rules of one network.
///
/// Rule changes take effect once the network's rules are applied.
#[derive(Clone)]
pub struct RuleManager {
    inner: ResourceManager<NetworkRule>,
    network: u64,
}

impl Deref for RuleManager {
    type Target = ResourceManager<NetworkRule>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl RuleManager {
    pub fn new(client: &Client, network: u64) -> Self {
        Self {
            inner: ResourceManager::scoped(client, VNET_RULES, format!("vnet eq {network}")),
            network,
        }
    }

    pub async fn create(&self, rule: NewRule) -> Result<NetworkRule> {
        let mut body = object(json!({
            "vnet": self.network,
            "name": rule.name,
            "direction": rule.direction,
            "action": rule.action,
            "protocol": rule.protocol,
            "interface": rule.interface,
            "enabled": rule.enabled,
            "log": rule.log,
            "statistics": rule.statistics,
        }));
        body.extend(rule.optional);
        put_opt(&mut body, "pin", rule.pin);
        put_opt(&mut body, "orderid", rule.order);
        self.inner.create(body).await
    }

    /// Update a rule. System rules are refused before any write.
    pub async fn update(&self, key: u64, fields: Map<String, Value>) -> Result<NetworkRule> {
        self.editable(key, "modify").await?;
        self.inner.update(&key, fields).await
    }

    /// Delete a rule. System rules are refused.
    pub async fn delete(&self, key: u64) -> Result<()> {
        self.editable(key, "delete").await?;
        self.inner.delete(&key).await
    }

    pub async fn enable(&self, key: u64) -> Result<NetworkRule> {
        self.update(key, object(json!({ "enabled": true }))).await
    }

    pub async fn disable(&self, key: u64) -> Result<NetworkRule> {
        self.update(key, object(json!({ "enabled": false }))).await
    }

    pub async fn list_incoming(&self) -> Result<Vec<NetworkRule>> {
        self.list_where("direction", RuleDirection::Incoming.api_value()).await
    }

    pub async fn list_outgoing(&self) -> Result<Vec<NetworkRule>> {
        self.list_where("direction", RuleDirection::Outgoing.api_value()).await
    }

    pub async fn list_enabled(&self) -> Result<Vec<NetworkRule>> {
        self.list_where("enabled", true).await
    }

    pub async fn list_disabled(&self) -> Result<Vec<NetworkRule>> {
        self.list_where("enabled", false).await
    }

    async fn list_where(
        &self,
        field: &str,
        value: impl Into<verge_api::FilterValue>,
    ) -> Result<Vec<NetworkRule>> {
        self.inner.list(&ListParams::new().term(field, value)).await
    }

    async fn editable(&self, key: u64, verb: &str) -> Result<()> {
        if self.inner.get_by_key(&key).await?.is_system_rule() {
            return Err(Error::Validation(format!("Cannot {verb} system rule")));
        }
        Ok(())
    }
}
