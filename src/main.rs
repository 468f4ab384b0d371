//! The `vqd` multi-tool binary: broker, worker manager, query client,
//! management client and credential-store administration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vqd::client::QueryClient;
use vqd::config::AppConfig;
use vqd::db;
use vqd::models::NewEndpoint;
use vqd::protocol::TaskRequest;
use vqd::proxy::Proxy;
use vqd::worker::{RestClientFactory, run_manager};

#[derive(Parser)]
#[command(name = "vqd", about = "Distributed read-only query proxy for VMware vSphere")]
struct Cli {
    /// Path to the configuration file; `vqd.toml` is picked up from the
    /// working directory when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the broker.
    Proxy,
    /// Run the worker manager.
    Worker {
        /// Worker task count, overriding the configuration.
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Send one task request and print the reply.
    Query(QueryArgs),
    /// Talk to a process's management endpoint.
    Manage {
        /// Management endpoint to connect to.
        #[arg(long, default_value = "tcp://localhost:9999")]
        endpoint: String,
        /// Management method.
        #[command(subcommand)]
        action: ManageAction,
    },
    /// Administer the credential store.
    Endpoint {
        #[command(subcommand)]
        action: EndpointAction,
    },
}

#[derive(Subcommand)]
enum ManageAction {
    /// Request process status.
    Status,
    /// Request an orderly shutdown.
    Shutdown,
}

#[derive(Args)]
struct QueryArgs {
    /// Broker frontend endpoint.
    #[arg(long, default_value = "tcp://localhost:10123")]
    server: String,
    /// Task name, e.g. `host.discover`.
    #[arg(long)]
    method: String,
    /// Target vSphere endpoint host name.
    #[arg(long)]
    vsphere_host: String,
    /// Target object name (or datastore URL).
    #[arg(long)]
    name: Option<String>,
    /// Property paths to collect.
    #[arg(long, value_delimiter = ',')]
    properties: Option<Vec<String>>,
    /// Task-specific disambiguator, e.g. a guest disk mount path.
    #[arg(long)]
    key: Option<String>,
    /// In-guest username for `vm.process.get`.
    #[arg(long)]
    guest_username: Option<String>,
    /// In-guest password for `vm.process.get`.
    #[arg(long)]
    guest_password: Option<String>,
    /// Performance counter in `group.name.unit.rollup` form.
    #[arg(long)]
    counter_name: Option<String>,
    /// Historical performance interval name.
    #[arg(long)]
    perf_interval: Option<String>,
    /// Maximum number of performance samples.
    #[arg(long)]
    max_sample: Option<u32>,
    /// Performance metric device instance.
    #[arg(long)]
    instance: Option<String>,
    /// Formatter to post-process the reply with.
    #[arg(long)]
    helper: Option<String>,
    /// Per-attempt timeout in milliseconds.
    #[arg(long, default_value_t = 3000)]
    timeout: u64,
    /// Number of attempts before giving up.
    #[arg(long, default_value_t = 3)]
    retries: u32,
}

#[derive(Subcommand)]
enum EndpointAction {
    /// Register or update an endpoint.
    Add {
        /// Endpoint host name.
        #[arg(long)]
        host: String,
        /// Username for the upstream session.
        #[arg(long)]
        user: String,
        /// Password for the upstream session.
        #[arg(long)]
        password: String,
        /// Register the endpoint enabled.
        #[arg(long)]
        enabled: bool,
    },
    /// Enable an endpoint.
    Enable {
        /// Endpoint host name.
        #[arg(long)]
        host: String,
    },
    /// Disable an endpoint.
    Disable {
        /// Endpoint host name.
        #[arg(long)]
        host: String,
    },
    /// Remove an endpoint.
    Remove {
        /// Endpoint host name.
        #[arg(long)]
        host: String,
    },
    /// List registered endpoints.
    List,
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let Ok(mut term) = signal(SignalKind::terminate()) else {
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Arm a shutdown channel that trips on SIGTERM or ctrl-c.
fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    let signal_tx = tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = signal_tx.send(true);
    });
    (tx, rx)
}

fn request_from_args(args: &QueryArgs) -> TaskRequest {
    TaskRequest {
        method: Some(args.method.clone()),
        hostname: Some(args.vsphere_host.clone()),
        name: args.name.clone(),
        properties: args.properties.clone(),
        key: args.key.clone(),
        username: args.guest_username.clone(),
        password: args.guest_password.clone(),
        counter_name: args.counter_name.clone(),
        perf_interval: args.perf_interval.clone(),
        max_sample: args.max_sample,
        instance: args.instance.clone(),
        helper: args.helper.clone(),
    }
}

async fn run_query(args: QueryArgs) -> Result<()> {
    let payload = serde_json::to_string(&request_from_args(&args))?;
    let client = QueryClient::new(args.server.as_str())
        .with_timeout(Duration::from_millis(args.timeout))
        .with_retries(args.retries);
    let reply = client.run(&payload).await;
    println!("{reply}");
    Ok(())
}

async fn run_manage(endpoint: String, action: ManageAction) -> Result<()> {
    let method = match action {
        ManageAction::Status => "status",
        ManageAction::Shutdown => "shutdown",
    };
    let payload = json!({ "method": method }).to_string();
    let reply = QueryClient::new(endpoint.as_str()).run(&payload).await;
    println!("{reply}");
    Ok(())
}

async fn run_endpoint(db_path: &str, action: EndpointAction) -> Result<()> {
    let mut conn = db::establish(db_path).await?;
    db::run_migrations(&mut conn).await?;

    match action {
        EndpointAction::Add {
            host,
            user,
            password,
            enabled,
        } => {
            let new = NewEndpoint {
                host: &host,
                user: &user,
                pwd: &password,
                enabled: i32::from(enabled),
            };
            db::add_update_endpoint(&mut conn, &new).await?;
            println!("Endpoint {host} registered");
        }
        EndpointAction::Enable { host } => {
            db::set_endpoint_enabled(&mut conn, &host, true).await?;
            println!("Endpoint {host} enabled");
        }
        EndpointAction::Disable { host } => {
            db::set_endpoint_enabled(&mut conn, &host, false).await?;
            println!("Endpoint {host} disabled");
        }
        EndpointAction::Remove { host } => {
            db::remove_endpoint(&mut conn, &host).await?;
            println!("Endpoint {host} removed");
        }
        EndpointAction::List => {
            for endpoint in db::get_endpoints(&mut conn, false).await? {
                let state = if endpoint.is_enabled() {
                    "enabled"
                } else {
                    "disabled"
                };
                println!("{}\t{}\t{state}", endpoint.host, endpoint.user);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Proxy => {
            let proxy = Proxy::bind(config.proxy).await?;
            let (tx, rx) = shutdown_channel();
            proxy.run(tx, rx).await;
        }
        Commands::Worker { concurrency } => {
            let mut worker_config = config.worker;
            if concurrency.is_some() {
                worker_config.concurrency = concurrency;
            }
            let (tx, rx) = shutdown_channel();
            run_manager(worker_config, Arc::new(RestClientFactory), tx, rx).await?;
        }
        Commands::Query(args) => run_query(args).await?,
        Commands::Manage { endpoint, action } => run_manage(endpoint, action).await?,
        Commands::Endpoint { action } => run_endpoint(&config.worker.db, action).await?,
    }
    Ok(())
}
