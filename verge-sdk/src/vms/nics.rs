use std::ops::Deref;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::{Client, Endpoint, ResourceManager, Result};

use crate::util::{KeyOrName, object, put_opt};

const MACHINE_NICS: Endpoint = Endpoint::new("machine_nics")
    .fields(&[
        "$key",
        "name",
        "orderid",
        "interface",
        "description",
        "enabled",
        "macaddress",
        "ipaddress",
        "vnet",
        "machine",
        "status#status as status",
        "status#display(status) as status_display",
        "status#speed as speed",
        "vnet#$key as vnet_key",
        "vnet#name as vnet_name",
        "vnet#machine#status#status as vnet_status",
        "stats#rx_bytes as rx_bytes",
        "stats#tx_bytes as tx_bytes",
        "stats#rxbps as rxbps",
        "stats#txbps as txbps",
    ])
    .sort("+orderid");

verge_api::api_enum! {
    /// Emulated network adapter.
    pub enum NicInterface {
        Virtio => ("virtio", "Virtio"),
        E1000 => ("e1000", "Intel e1000"),
        E1000e => ("e1000e", "Intel e1000e"),
        Rtl8139 => ("rtl8139", "Realtek 8139"),
        Pcnet => ("pcnet", "AMD PCnet"),
        Igb => ("igb", "Intel 82576"),
        Vmxnet3 => ("vmxnet3", "VMware Paravirt v3"),
        Direct => ("direct", "Direct"),
    }
}

/// A network adapter attached to a VM's machine.
#[derive(Debug, Clone, Deserialize)]
pub struct Nic {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub orderid: Option<i64>,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub macaddress: Option<String>,
    #[serde(default)]
    pub ipaddress: Option<String>,
    #[serde(default)]
    pub vnet: Option<u64>,
    #[serde(default)]
    pub vnet_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub rx_bytes: Option<u64>,
    #[serde(default)]
    pub tx_bytes: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(Nic, u64);

impl Nic {
    pub fn interface(&self) -> Option<NicInterface> {
        self.interface.as_deref().and_then(NicInterface::from_api_value)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn mac_address(&self) -> Option<&str> {
        self.macaddress.as_deref()
    }

    pub fn network_name(&self) -> Option<&str> {
        self.vnet_name.as_deref()
    }
}

/// Arguments of [`NicManager::create`].
#[derive(Debug, Clone)]
pub struct NewNic {
    name: Option<String>,
    network: Option<KeyOrName>,
    interface: NicInterface,
    mac_address: Option<String>,
    ip_address: Option<String>,
    description: String,
    enabled: bool,
}

impl Default for NewNic {
    fn default() -> Self {
        Self {
            name: None,
            network: None,
            interface: NicInterface::Virtio,
            mac_address: None,
            ip_address: None,
            description: String::new(),
            enabled: true,
        }
    }
}

impl NewNic {
    /// A NIC on `network`, given by key or name.
    pub fn new(network: impl Into<KeyOrName>) -> Self {
        Self {
            network: Some(network.into()),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn interface(mut self, interface: NicInterface) -> Self {
        self.interface = interface;
        self
    }

    /// `xx:xx:xx:xx:xx:xx`; sent lower-cased.
    pub fn mac_address(mut self, mac: impl Into<String>) -> Self {
        self.mac_address = Some(mac.into());
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Manager for the NICs of one machine.
#[derive(Clone)]
pub struct NicManager {
    inner: ResourceManager<Nic>,
    machine: u64,
}

impl Deref for NicManager {
    type Target = ResourceManager<Nic>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl NicManager {
    pub fn new(client: &Client, machine: u64) -> Self {
        Self {
            inner: ResourceManager::scoped(client, MACHINE_NICS, format!("machine eq {machine}")),
            machine,
        }
    }

    pub async fn create(&self, nic: NewNic) -> Result<Nic> {
        let mut body = object(json!({
            "machine": self.machine,
            "interface": nic.interface,
            "enabled": nic.enabled,
        }));
        put_opt(&mut body, "name", nic.name);
        if let Some(network) = &nic.network {
            let vnet = network.resolve(self.client(), "vnets").await?;
            body.insert("vnet".to_owned(), vnet.into());
        }
        put_opt(&mut body, "macaddress", nic.mac_address.map(|m| m.to_lowercase()));
        put_opt(&mut body, "ipaddress", nic.ip_address);
        if !nic.description.is_empty() {
            body.insert("description".to_owned(), nic.description.into());
        }

        self.inner.create(body).await
    }
}
