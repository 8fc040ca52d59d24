//! Protocol constants shared by the transport and the resource managers.

use std::time::Duration;

/// Path prefix of the REST API on every VergeOS host.
pub const API_PREFIX: &str = "api/v4";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_TOTAL: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);
pub const RETRY_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// How long a create-then-fetch keeps re-polling a row the server has not surfaced yet.
pub const DEFAULT_CONSISTENCY_TIMEOUT: Duration = Duration::from_secs(5);

pub const TASK_WAIT_TIMEOUT: Duration = Duration::from_secs(300);
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const POLL_INTERVAL_FAST: Duration = Duration::from_millis(500);

pub const UPLOAD_CHUNK_SIZE: usize = 262_144;
pub const UPLOAD_CHUNK_TIMEOUT: Duration = Duration::from_secs(120);

/// Largest cloud-init payload the server accepts.
pub const CLOUDINIT_MAX_SIZE: usize = 65_536;

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 1000;

pub const GB: u64 = 1_073_741_824;

/// Fields requested when validating a session.
pub const SYSTEM_FIELDS: &str = "$key,yb_version,os_version,cloud_name";
