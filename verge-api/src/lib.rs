//! Low-level client for the VergeOS REST API.
//!
//! This crate owns the transport and the conventions every collection shares:
//!
//! - [`Client`]: authenticated session, retries, raw upload/download
//! - [`ClientConfig`]: connection settings, optionally from `VERGE_*` variables
//! - [`ResourceManager`]: list/get/create/update/delete/action for one collection
//! - [`filter`]: OData-style filter expressions
//! - [`poll_until`] and [`Compensation`]: bounded waits and cleanup of
//!   intermediate resources
//!
//! # Quick Start
//!
//! ```no_run
//! use serde::Deserialize;
//! use serde_json::{Map, Value};
//! use verge_api::{Client, ClientConfig, Endpoint, ListParams, ResourceManager};
//!
//! #[derive(Debug, Deserialize)]
//! struct Network {
//!     #[serde(rename = "$key")]
//!     key: u64,
//!     name: String,
//!     #[serde(flatten)]
//!     extra: Map<String, Value>,
//! }
//! verge_api::impl_record!(Network, u64);
//!
//! const VNETS: Endpoint = Endpoint::new("vnets").fields(&["$key", "name", "type"]);
//!
//! # async fn example() -> verge_api::Result<()> {
//! let client = Client::new(ClientConfig::new("verge.example.com").token("secret"))?;
//! client.connect().await?;
//!
//! let vnets = ResourceManager::<Network>::new(&client, VNETS);
//! for net in vnets.list(&ListParams::new().term("type", "internal")).await? {
//!     println!("{} {}", net.key, net.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod enums;
pub mod error;
pub mod filter;
pub mod key;
pub mod manager;
pub mod poll;
pub mod query;
pub mod record;
pub mod transfer;

pub use client::{Client, Query, SystemInfo};
pub use config::{ClientConfig, Credentials};
pub use error::{Error, Result};
pub use filter::{Filter, FilterValue, build_filter};
pub use key::{NasUserKey, ResourceKey};
pub use manager::{Endpoint, KeyLookup, Lookup, ResourceManager};
pub use poll::{Backoff, Compensation, poll_until};
pub use query::ListParams;
pub use record::Record;

/// Re-exported for [`Client::request`].
pub use reqwest::Method;

#[doc(hidden)]
pub mod __private {
    pub use serde::de::Error as DeError;
    pub use serde::{Deserialize, Deserializer, Serialize, Serializer};
    pub use serde_json::{Map, Value};
}
