//! Resource managers for a VergeOS system.
//!
//! This crate wraps the low-level [`verge_api`] client with one manager per
//! resource family. Managers are cheap handles obtained from [`VergeClient`];
//! every call is a fresh request and nothing is cached.
//!
//! # Quick Start
//!
//! ```no_run
//! use verge_sdk::{ClientConfig, VergeClient};
//! use verge_sdk::vms::NewVm;
//!
//! # async fn example() -> verge_sdk::Result<()> {
//! let verge = VergeClient::connect(
//!     ClientConfig::new("verge.example.com").basic_auth("admin", "secret"),
//! )
//! .await?;
//!
//! // Create a VM and give it a 50 GB disk
//! let vm = verge
//!     .vms()
//!     .create(NewVm::new("web-01").cpu_cores(2).ram_mb(8192))
//!     .await?;
//! verge
//!     .vms()
//!     .drives(&vm)?
//!     .create(verge_sdk::vms::NewDrive::disk(50).tier(1))
//!     .await?;
//!
//! // Power it on and wait for the task, if the server returned one
//! let response = verge.vms().power_on(&vm, None).await?;
//! if let Some(task) = verge_sdk::tasks::task_key(response.as_ref()) {
//!     verge.tasks().wait(task, Default::default()).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Tenants
//!
//! ```no_run
//! # async fn example(verge: verge_sdk::VergeClient) -> verge_sdk::Result<()> {
//! let tenant = verge.tenants().get_by_name("customer-a").await?;
//! let storage = verge.tenants().storage(&tenant);
//! for allocation in storage.list().await? {
//!     println!("tier {}: {} GB free", allocation.tier(), allocation.free_gb());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod util;

pub mod cloudinit_files;
pub mod files;
pub mod gpu;
pub mod nas_services;
pub mod nas_users;
pub mod nas_volumes;
pub mod networks;
pub mod nodes;
pub mod resource_groups;
pub mod shared_objects;
pub mod tags;
pub mod task_schedule_triggers;
pub mod task_schedules;
pub mod tasks;
pub mod tenants;
pub mod updates;
pub mod vms;

pub use client::VergeClient;
pub use util::KeyOrName;
pub use verge_api::{
    Client, ClientConfig, Credentials, Error, Filter, ListParams, Lookup, NasUserKey, Record,
    Result, SystemInfo,
};
