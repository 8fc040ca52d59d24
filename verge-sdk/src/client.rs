use verge_api::{Client, ClientConfig, Result, SystemInfo};

use crate::cloudinit_files::CloudInitFileManager;
use crate::files::FileManager;
use crate::gpu::{NodeGpuManager, VgpuProfileManager};
use crate::nas_services::NasServiceManager;
use crate::nas_users::NasUserManager;
use crate::nas_volumes::NasVolumeManager;
use crate::networks::NetworkManager;
use crate::nodes::NodeManager;
use crate::resource_groups::ResourceGroupManager;
use crate::shared_objects::SharedObjectManager;
use crate::tags::{TagCategoryManager, TagManager};
use crate::task_schedule_triggers::TaskScheduleTriggerManager;
use crate::task_schedules::TaskScheduleManager;
use crate::tasks::TaskManager;
use crate::tenants::TenantManager;
use crate::updates::{UpdateBranchManager, UpdatePackageManager, UpdateSettingsManager, UpdateSourceManager};
use crate::vms::VmManager;

/// Entry point to a VergeOS system.
///
/// Wraps a connected [`Client`] and hands out one manager per resource
/// family. Managers borrow nothing; each holds a clone of the shared client.
#[derive(Debug, Clone)]
pub struct VergeClient {
    client: Client,
}

impl VergeClient {
    /// Wrap a client without connecting. Requests fail with
    /// [`Error::NotConnected`](verge_api::Error::NotConnected) until
    /// [`connect`](Client::connect) succeeds on it.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            client: Client::new(config)?,
        })
    }

    /// Build a client and validate the session.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let verge = Self::new(config)?;
        verge.client.connect().await?;
        Ok(verge)
    }

    /// Connect using `VERGE_*` environment variables.
    pub async fn from_env() -> Result<Self> {
        Ok(Self {
            client: Client::from_env().await?,
        })
    }

    /// The underlying transport.
    pub fn api(&self) -> &Client {
        &self.client
    }

    /// Version details recorded at connect time.
    pub async fn system_info(&self) -> Option<SystemInfo> {
        self.client.system_info().await
    }

    pub async fn is_connected(&self) -> bool {
        self.client.is_connected().await
    }

    pub async fn disconnect(&self) {
        self.client.disconnect().await;
    }

    // =========================================================================
    // Compute
    // =========================================================================

    pub fn vms(&self) -> VmManager {
        VmManager::new(&self.client)
    }

    pub fn nodes(&self) -> NodeManager {
        NodeManager::new(&self.client)
    }

    pub fn vgpu_profiles(&self) -> VgpuProfileManager {
        VgpuProfileManager::new(&self.client)
    }

    /// GPUs on every node. Use [`NodeGpuManager::for_node`] to narrow to one.
    pub fn node_gpus(&self) -> NodeGpuManager {
        NodeGpuManager::new(&self.client, None)
    }

    pub fn resource_groups(&self) -> ResourceGroupManager {
        ResourceGroupManager::new(&self.client)
    }

    pub fn cloudinit_files(&self) -> CloudInitFileManager {
        CloudInitFileManager::new(&self.client)
    }

    pub fn shared_objects(&self) -> SharedObjectManager {
        SharedObjectManager::new(&self.client)
    }

    // =========================================================================
    // Networking And Tenancy
    // =========================================================================

    pub fn networks(&self) -> NetworkManager {
        NetworkManager::new(&self.client)
    }

    pub fn tenants(&self) -> TenantManager {
        TenantManager::new(&self.client)
    }

    // =========================================================================
    // Storage
    // =========================================================================

    pub fn files(&self) -> FileManager {
        FileManager::new(&self.client)
    }

    pub fn nas_services(&self) -> NasServiceManager {
        NasServiceManager::new(&self.client)
    }

    /// Volumes across all NAS services.
    pub fn nas_volumes(&self) -> NasVolumeManager {
        NasVolumeManager::new(&self.client)
    }

    pub fn nas_users(&self) -> NasUserManager {
        NasUserManager::new(&self.client)
    }

    // =========================================================================
    // Organization
    // =========================================================================

    pub fn tags(&self) -> TagManager {
        TagManager::new(&self.client)
    }

    pub fn tag_categories(&self) -> TagCategoryManager {
        TagCategoryManager::new(&self.client)
    }

    // =========================================================================
    // Automation
    // =========================================================================

    pub fn tasks(&self) -> TaskManager {
        TaskManager::new(&self.client)
    }

    pub fn task_schedules(&self) -> TaskScheduleManager {
        TaskScheduleManager::new(&self.client)
    }

    pub fn task_schedule_triggers(&self) -> TaskScheduleTriggerManager {
        TaskScheduleTriggerManager::new(&self.client, None, None)
    }

    // =========================================================================
    // System Updates
    // =========================================================================

    pub fn update_sources(&self) -> UpdateSourceManager {
        UpdateSourceManager::new(&self.client)
    }

    pub fn update_branches(&self) -> UpdateBranchManager {
        UpdateBranchManager::new(&self.client)
    }

    pub fn update_packages(&self) -> UpdatePackageManager {
        UpdatePackageManager::new(&self.client)
    }

    pub fn update_settings(&self) -> UpdateSettingsManager {
        UpdateSettingsManager::new(&self.client)
    }
}

impl From<Client> for VergeClient {
    fn from(client: Client) -> Self {
        Self { client }
    }
}
