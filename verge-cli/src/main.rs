use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vergeos::sdk::files::{FileType, Upload};
use vergeos::sdk::resource_groups::DeviceClass;
use vergeos::sdk::tasks::WaitOptions;
use vergeos::sdk::tenants::Tenant;
use vergeos::sdk::vms::{NewVm, Vm};
use vergeos::sdk::{ClientConfig, Error, ListParams, Lookup, Result, VergeClient};

#[derive(Debug, Parser)]
#[command(
    name = "verge",
    version,
    about = "Command-line utilities for managing a VergeOS system"
)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Log request details to stderr (`-vv` for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the `VERGE_*` environment variables.
#[derive(Debug, Clone, Args)]
struct ConnectionArgs {
    /// VergeOS host name or URL.
    #[arg(long, global = true)]
    host: Option<String>,

    /// API token; takes precedence over username and password.
    #[arg(long, global = true)]
    token: Option<String>,

    #[arg(long, global = true)]
    username: Option<String>,

    #[arg(long, global = true)]
    password: Option<String>,

    /// Skip TLS certificate verification.
    #[arg(long, global = true, default_value_t = false)]
    insecure: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Connect and print version information.
    System,
    /// Virtual machines.
    #[command(subcommand)]
    Vms(VmCommand),
    /// Tenants and their storage.
    #[command(subcommand)]
    Tenants(TenantCommand),
    /// Media catalog files.
    #[command(subcommand)]
    Files(FileCommand),
    /// Background tasks.
    #[command(subcommand)]
    Tasks(TaskCommand),
    /// Device resource groups.
    #[command(subcommand)]
    ResourceGroups(ResourceGroupCommand),
}

#[derive(Debug, Subcommand)]
enum VmCommand {
    /// List VMs, excluding snapshots.
    List {
        /// Only running VMs.
        #[arg(long, conflicts_with = "stopped")]
        running: bool,
        /// Only stopped VMs.
        #[arg(long)]
        stopped: bool,
    },
    /// Show one VM by key or name.
    Get { vm: String },
    /// Power a VM on.
    Start {
        vm: String,
        /// Preferred node key.
        #[arg(long)]
        node: Option<u64>,
    },
    /// Power a VM off.
    Stop {
        vm: String,
        /// Kill instead of a graceful shutdown.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Create a VM.
    Create {
        name: String,
        /// Memory in MB; rounded up to a multiple of 256.
        #[arg(long, default_value_t = 1024)]
        ram: u64,
        #[arg(long, default_value_t = 1)]
        cpus: u32,
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum TenantCommand {
    /// List tenants, excluding snapshots.
    List,
    /// Show a tenant's storage allocations.
    Storage { tenant: String },
}

#[derive(Debug, Subcommand)]
enum FileCommand {
    /// List catalog files.
    List {
        /// Only files of this type (repeatable), e.g. `iso`.
        #[arg(long = "type")]
        types: Vec<String>,
    },
    /// Upload a local file.
    Upload {
        path: PathBuf,
        /// Catalog name; the local file name by default.
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Preferred storage tier (1-5).
        #[arg(long)]
        tier: Option<u8>,
    },
    /// Download a file into a directory or to a path.
    Download {
        key: u64,
        destination: PathBuf,
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
}

#[derive(Debug, Subcommand)]
enum TaskCommand {
    /// Wait for a task to finish.
    Wait {
        key: u64,
        /// Seconds to wait; 0 waits forever.
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },
}

#[derive(Debug, Subcommand)]
enum ResourceGroupCommand {
    /// List resource groups.
    List {
        /// Only groups of this device class, e.g. `gpu`.
        #[arg(long)]
        class: Option<String>,
        /// Only enabled groups.
        #[arg(long, default_value_t = false)]
        enabled: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli.connection)?;
    debug!(host = config.host(), "connecting");
    let verge = VergeClient::connect(config).await?;

    match cli.command {
        Commands::System => system(&verge).await,
        Commands::Vms(command) => vms(&verge, command).await,
        Commands::Tenants(command) => tenants(&verge, command).await,
        Commands::Files(command) => files(&verge, command).await,
        Commands::Tasks(command) => tasks(&verge, command).await,
        Commands::ResourceGroups(command) => resource_groups(&verge, command).await,
    }
}

/// Environment configuration with command-line flags layered on top.
fn build_config(args: &ConnectionArgs) -> Result<ClientConfig> {
    let config = ClientConfig::from_lookup(|name| {
        let flag = match name {
            "VERGE_HOST" => args.host.clone(),
            "VERGE_TOKEN" => args.token.clone(),
            "VERGE_USERNAME" => args.username.clone(),
            "VERGE_PASSWORD" => args.password.clone(),
            "VERGE_VERIFY_SSL" if args.insecure => Some("false".to_owned()),
            _ => None,
        };
        flag.or_else(|| std::env::var(name).ok())
    })?;
    Ok(config)
}

async fn system(verge: &VergeClient) -> Result<()> {
    let info = verge.api().system_info().await.ok_or(Error::NotConnected)?;
    println!("connected=true");
    println!("host={}", verge.api().config().host());
    println!("version={}", info.version.as_deref().unwrap_or("unknown"));
    println!("os_version={}", info.os_version.as_deref().unwrap_or("unknown"));
    println!("cloud_name={}", info.cloud_name.as_deref().unwrap_or(""));
    Ok(())
}

async fn vms(verge: &VergeClient, command: VmCommand) -> Result<()> {
    let manager = verge.vms();
    match command {
        VmCommand::List { running, stopped } => {
            let vms = if running {
                manager.list_running().await?
            } else if stopped {
                manager.list_stopped().await?
            } else {
                manager.list(&ListParams::new()).await?
            };
            for vm in &vms {
                print_vm_line(vm);
            }
            println!("count={}", vms.len());
        }
        VmCommand::Get { vm } => {
            let vm = manager.get(lookup(&vm)).await?;
            println!("key={}", vm.key);
            println!("name={}", vm.name);
            println!("status={}", vm.status.as_deref().unwrap_or("unknown"));
            println!("cpu_cores={}", vm.cpu_cores.unwrap_or(0));
            println!("ram_mb={}", vm.ram.unwrap_or(0));
            println!("node={}", vm.node_name.as_deref().unwrap_or(""));
            println!("is_snapshot={}", vm.is_snapshot());
        }
        VmCommand::Start { vm, node } => {
            let vm = manager.get(lookup(&vm)).await?;
            manager.power_on(&vm, node).await?;
            println!("key={}", vm.key);
            println!("power_on=requested");
        }
        VmCommand::Stop { vm, force } => {
            let vm = manager.get(lookup(&vm)).await?;
            manager.power_off(vm.key, force).await?;
            println!("key={}", vm.key);
            println!("power_off=requested");
        }
        VmCommand::Create {
            name,
            ram,
            cpus,
            description,
        } => {
            let mut new_vm = NewVm::new(name).ram_mb(ram).cpu_cores(cpus);
            if let Some(description) = description {
                new_vm = new_vm.description(description);
            }
            let vm = manager.create(new_vm).await?;
            println!("key={}", vm.key);
            println!("name={}", vm.name);
            println!("ram_mb={}", vm.ram.unwrap_or(ram));
        }
    }
    Ok(())
}

async fn tenants(verge: &VergeClient, command: TenantCommand) -> Result<()> {
    let manager = verge.tenants();
    match command {
        TenantCommand::List => {
            let tenants = manager.list(&ListParams::new()).await?;
            for tenant in &tenants {
                print_tenant_line(tenant);
            }
            println!("count={}", tenants.len());
        }
        TenantCommand::Storage { tenant } => {
            let tenant = manager.get(lookup(&tenant)).await?;
            for tier in manager.storage(&tenant).list().await? {
                println!(
                    "tier={} provisioned_gb={:.2} used_gb={:.2} free_gb={:.2} used_pct={}",
                    tier.tier(),
                    tier.provisioned_gb(),
                    tier.used_gb(),
                    tier.free_gb(),
                    tier.used_percent()
                );
            }
        }
    }
    Ok(())
}

async fn files(verge: &VergeClient, command: FileCommand) -> Result<()> {
    let manager = verge.files();
    match command {
        FileCommand::List { types } => {
            let files = if types.is_empty() {
                manager.list(&ListParams::new()).await?
            } else {
                let types = types
                    .iter()
                    .map(|t| FileType::parse(t))
                    .collect::<Result<Vec<_>>>()?;
                manager.list_by_type(&types).await?
            };
            for file in &files {
                println!(
                    "key={} name={} type={} size={}",
                    file.key,
                    file.name,
                    file.file_type.as_deref().unwrap_or(""),
                    file.filesize.unwrap_or(0)
                );
            }
            println!("count={}", files.len());
        }
        FileCommand::Upload {
            path,
            name,
            description,
            tier,
        } => {
            let options = Upload {
                name,
                description,
                tier,
                progress: None,
            };
            let file = manager.upload(&path, options).await?;
            println!("key={}", file.key);
            println!("name={}", file.name);
            println!("size={}", file.filesize.unwrap_or(0));
        }
        FileCommand::Download {
            key,
            destination,
            overwrite,
        } => {
            let written = manager.download(key, &destination, overwrite).await?;
            println!("path={}", written.display());
        }
    }
    Ok(())
}

async fn tasks(verge: &VergeClient, command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::Wait { key, timeout } => {
            let options = WaitOptions::default().timeout(Duration::from_secs(timeout));
            let task = verge.tasks().wait(key, options).await?;
            println!("key={}", task.key);
            println!("status={}", task.status.as_deref().unwrap_or("unknown"));
        }
    }
    Ok(())
}

async fn resource_groups(verge: &VergeClient, command: ResourceGroupCommand) -> Result<()> {
    match command {
        ResourceGroupCommand::List { class, enabled } => {
            let manager = verge.resource_groups();
            let enabled = enabled.then_some(true);
            let groups = match class {
                Some(class) => manager.list_by_class(DeviceClass::parse(&class)?, enabled).await?,
                None => {
                    manager
                        .list(&ListParams::new().term("enabled", enabled))
                        .await?
                }
            };
            for group in &groups {
                println!(
                    "key={} name={} type={} class={} enabled={}",
                    group.key,
                    group.name,
                    group.device_type_display(),
                    group.device_class_display(),
                    group.is_enabled()
                );
            }
            println!("count={}", groups.len());
        }
    }
    Ok(())
}

/// A numeric argument is a key, anything else a name.
fn lookup(arg: &str) -> Lookup<u64> {
    match arg.parse() {
        Ok(key) => Lookup::Key(key),
        Err(_) => Lookup::Name(arg.to_owned()),
    }
}

fn print_vm_line(vm: &Vm) {
    println!(
        "key={} name={} status={} cpu_cores={} ram_mb={}",
        vm.key,
        vm.name,
        vm.status.as_deref().unwrap_or("unknown"),
        vm.cpu_cores.unwrap_or(0),
        vm.ram.unwrap_or(0)
    );
}

fn print_tenant_line(tenant: &Tenant) {
    println!(
        "key={} name={} state={} running={}",
        tenant.key,
        tenant.name,
        tenant.state.as_deref().unwrap_or("unknown"),
        tenant.is_running()
    );
}
