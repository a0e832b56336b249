use clap::{Args, Parser, Subcommand};
use imagecompat_client::{
    init_kube_client, KubeFeatureGroupStore, KubePodLister, PeriodicResync,
    RegistryArtifactClient, TokioClock,
};
use imagecompat_extender::{AppState, Config as ExtenderConfig, ExtenderServer};
use imagecompat_scheduler::{
    default_registry, FeatureGroupCache, GroupLifecycle, Handle, ImageCompatibilityArgs,
    NamespaceDiscovery, DEFAULT_NAMESPACE, PLUGIN_NAME,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "imagecompat",
    about = "Image compatibility filter for the Kubernetes scheduler"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler extender
    Serve {
        /// Address to listen on
        #[arg(long, env = "IMAGECOMPAT_BIND", default_value = "0.0.0.0:8888")]
        bind: String,
        /// Deadline of one scheduling cycle, in seconds
        #[arg(long, env = "IMAGECOMPAT_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
        request_timeout_secs: u64,
        #[command(flatten)]
        plugin: PluginOpts,
    },
    /// Inspect NodeFeatureGroups managed by the filter
    Groups {
        #[command(subcommand)]
        command: GroupsCommand,
        #[command(flatten)]
        plugin: PluginOpts,
    },
    /// Print the namespace the feature matcher runs in
    Discover {
        /// Path to a kubeconfig file; in-cluster config is used when unset
        #[arg(long, env = "IMAGECOMPAT_KUBECONFIG")]
        kubeconfig: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum GroupsCommand {
    /// List managed groups and the nodes they match
    List,
    /// Delete a group created by the filter; unlabelled groups are refused
    Delete {
        /// Name of the NodeFeatureGroup
        name: String,
    },
}

/// Plugin arguments, layered over the optional config file
#[derive(Args, Debug, Default)]
struct PluginOpts {
    /// YAML file with ImageCompatibilityArgs
    #[arg(long, env = "IMAGECOMPAT_CONFIG")]
    config: Option<PathBuf>,
    /// Path to a kubeconfig file; in-cluster config is used when unset
    #[arg(long, env = "IMAGECOMPAT_KUBECONFIG")]
    kubeconfig: Option<PathBuf>,
    /// Fetch compatibility artifacts over plain HTTP
    #[arg(long, env = "IMAGECOMPAT_PLAIN_HTTP")]
    plain_http: bool,
    /// Namespace for NodeFeatureGroups; discovered when unset
    #[arg(long, env = "IMAGECOMPAT_NAMESPACE")]
    namespace: Option<String>,
    /// Pause between status polls, in milliseconds
    #[arg(long, env = "IMAGECOMPAT_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,
    /// Upper bound on waiting for group status, in milliseconds
    #[arg(long, env = "IMAGECOMPAT_MAX_WAIT_MS")]
    max_wait_ms: Option<u64>,
}

impl PluginOpts {
    /// Load the config file (if any) and apply flag overrides on top
    fn load(&self) -> miette::Result<ImageCompatibilityArgs> {
        let base = match &self.config {
            Some(path) => ImageCompatibilityArgs::from_file(path)?,
            None => ImageCompatibilityArgs::default(),
        };
        let args = self.apply(base);
        args.validate()?;
        Ok(args)
    }

    fn apply(&self, mut args: ImageCompatibilityArgs) -> ImageCompatibilityArgs {
        if self.plain_http {
            args.plain_http = true;
        }
        if let Some(namespace) = &self.namespace {
            args.namespace = Some(namespace.clone());
        }
        if let Some(ms) = self.poll_interval_ms {
            args.poll_interval_ms = ms;
        }
        if let Some(ms) = self.max_wait_ms {
            args.max_wait_ms = ms;
        }
        args
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            request_timeout_secs,
            plugin,
        } => run_serve(&bind, request_timeout_secs, &plugin).await,
        Commands::Groups { command, plugin } => run_groups(command, &plugin).await,
        Commands::Discover { kubeconfig } => run_discover(kubeconfig.as_deref()).await,
    }
}

/// Run the extender until ctrl-c
async fn run_serve(
    bind: &str,
    request_timeout_secs: u64,
    opts: &PluginOpts,
) -> miette::Result<()> {
    info!("Starting imagecompat scheduler extender");

    let args = opts.load()?;
    let listen_addr = bind
        .parse()
        .map_err(|e| miette::miette!("Invalid bind address '{}': {}", bind, e))?;

    let handle = create_handle(opts.kubeconfig.as_deref()).await?;
    let plugin_args = serde_json::to_value(&args)
        .map_err(|e| miette::miette!("Failed to encode plugin arguments: {}", e))?;
    let plugin = default_registry()?.build(PLUGIN_NAME, Some(&plugin_args), &handle)?;

    info!(
        "{} configured: plainHttp={}, namespace={}, pollInterval={:?}, maxWait={:?}",
        PLUGIN_NAME,
        args.plain_http,
        args.namespace.as_deref().unwrap_or("<discover>"),
        args.poll_interval(),
        args.max_wait()
    );

    let state = AppState::new(vec![plugin], handle.cache.clone())
        .with_request_timeout(Duration::from_secs(request_timeout_secs));
    let server = ExtenderServer::new(ExtenderConfig { listen_addr }, Arc::new(state));

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Shutting down gracefully...");
        })
        .await
        .map_err(|e| miette::miette!("Extender server error: {}", e))?;

    info!("Shutdown complete");
    Ok(())
}

async fn run_groups(command: GroupsCommand, opts: &PluginOpts) -> miette::Result<()> {
    let args = opts.load()?;
    let client = init_kube_client(opts.kubeconfig.as_deref()).await?;
    let namespace = match args.namespace {
        Some(namespace) => namespace,
        None => discover_namespace(client.clone()).await?,
    };
    let lifecycle = GroupLifecycle::new(Arc::new(KubeFeatureGroupStore::new(client)));

    match command {
        GroupsCommand::List => {
            let groups = lifecycle.list_groups(&namespace).await?;
            if groups.is_empty() {
                println!("No managed NodeFeatureGroups in {}", namespace);
            }
            for group in groups {
                let name = group.group_name().unwrap_or("<unnamed>");
                match group.matched_nodes() {
                    Some(nodes) => println!(
                        "{}/{}\t{}",
                        namespace,
                        name,
                        nodes.into_iter().collect::<Vec<_>>().join(",")
                    ),
                    None => println!("{}/{}\t<pending>", namespace, name),
                }
            }
        }
        GroupsCommand::Delete { name } => {
            lifecycle.delete_group(&namespace, &name).await?;
            println!("Deleted {}/{}", namespace, name);
        }
    }

    Ok(())
}

async fn run_discover(kubeconfig: Option<&Path>) -> miette::Result<()> {
    let client = init_kube_client(kubeconfig).await?;
    println!("{}", discover_namespace(client).await?);
    Ok(())
}

async fn discover_namespace(client: kube::Client) -> miette::Result<String> {
    let discovery = NamespaceDiscovery::new(Arc::new(KubePodLister::new(client)));
    match discovery.discover().await? {
        Some(namespace) => Ok(namespace),
        None => {
            warn!(
                "Feature matcher not found, using default namespace {}",
                DEFAULT_NAMESPACE
            );
            Ok(DEFAULT_NAMESPACE.to_string())
        }
    }
}

/// Wire the plugin's collaborators against the cluster
async fn create_handle(kubeconfig: Option<&Path>) -> miette::Result<Handle> {
    let client = init_kube_client(kubeconfig).await?;

    Ok(Handle {
        artifacts: Arc::new(RegistryArtifactClient::new()),
        store: Arc::new(KubeFeatureGroupStore::new(client.clone())),
        pods: Arc::new(KubePodLister::new(client)),
        trigger: Arc::new(PeriodicResync),
        clock: Arc::new(TokioClock),
        cache: Arc::new(FeatureGroupCache::new()),
    })
}
