//! Rust client for the VergeOS virtualization REST API.
//!
//! This crate provides two modules:
//!
//! - [`api`]: session, configuration, errors, filters and the generic
//!   resource manager every resource family is built on
//! - [`sdk`]: one manager per resource family, reached through
//!   [`sdk::VergeClient`]
//!
//! # Quick Start
//!
//! ```no_run
//! use vergeos::sdk::{ClientConfig, ListParams, VergeClient};
//!
//! # async fn example() -> vergeos::sdk::Result<()> {
//! // VERGE_HOST, VERGE_TOKEN or VERGE_USERNAME/VERGE_PASSWORD, ...
//! let verge = VergeClient::connect(ClientConfig::from_env()?).await?;
//!
//! for vm in verge.vms().list(&ListParams::new()).await? {
//!     println!("{} running={}", vm.name, vm.is_running());
//! }
//!
//! let tenant = verge.tenants().get_by_name("customer-a").await?;
//! verge.tenants().power_on(&tenant, None).await?;
//! # Ok(())
//! # }
//! ```

/// Low-level client.
///
/// Use this for endpoints the managers do not cover, or to build a manager
/// for one with [`api::ResourceManager`] and an [`api::Endpoint`].
pub use verge_api as api;

/// Resource managers.
///
/// - [`sdk::VergeClient`]: root handle with one accessor per manager
/// - [`sdk::vms`], [`sdk::tenants`], [`sdk::networks`]: compute, tenancy and networking
/// - [`sdk::files`]: media catalog with chunked upload
/// - [`sdk::tasks`]: waiting on background work
pub use verge_sdk as sdk;
