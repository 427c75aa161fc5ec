use agent_config::{AppConfig, LoggingConfig, SourceConfig};
use agent_core::{Registry, ResourceLister, SourceDriver, Worker};
use agent_nats_sink::{NatsConfig, NatsResourceLister, NatsSinkFactory};
use agent_redis_source::{RedisConnection, RedisConnectionFactory, RedisStreamMonitorFactory};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agent")]
#[command(about = "Resource polling agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every configured source until interrupted
    Start {
        /// Path to configuration directory
        #[arg(short, long, default_value = "config")]
        config_dir: String,

        /// Run a single round per source, then exit
        #[arg(long)]
        once: bool,
    },

    /// Validate configuration files
    Validate {
        /// Path to configuration directory
        #[arg(short, long, default_value = "config")]
        config_dir: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config_dir, once } => {
            // Load app config from files and environment variables
            let app_config = AppConfig::load(&config_dir)?;
            init_tracing(&app_config.logging)?;

            info!("Starting agent with config directory: {}", config_dir);

            let transport = transport_config(&app_config)?;
            let registry = registry(&transport);
            info!("Available sources: {:?}", registry.list_sources());
            info!("Available sinks: {:?}", registry.list_sinks());

            let lister: Arc<dyn ResourceLister> = Arc::new(NatsResourceLister::new(transport));
            let token = CancellationToken::new();

            let mut workers = Vec::new();
            for (name, source) in &app_config.sources {
                let worker = Worker::new(
                    name.clone(),
                    registry.get_source(&source.kind)?,
                    source.processor.clone(),
                    registry.get_sink(&source.sink)?,
                    lister.clone(),
                )
                .with_interval(app_config.agent.interval())
                .with_cancellation(token.clone());
                workers.push(Arc::new(worker));
            }
            info!("Loaded {} source(s)", workers.len());

            if once {
                for worker in &workers {
                    let summary = worker.process().await;
                    info!(
                        "[{}] round finished: {}/{} resources over {} prefix(es), {} failed",
                        worker.name(),
                        summary.succeeded,
                        summary.total,
                        summary.prefixes,
                        summary.failed_prefixes.len()
                    );
                }
                return Ok(());
            }

            let mut tasks = JoinSet::new();
            for worker in workers {
                tasks.spawn(async move { worker.run().await });
            }

            info!("Agent started successfully");

            // Wait for every worker or shutdown signal
            tokio::select! {
                _ = async { while tasks.join_next().await.is_some() {} } => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down agent, finishing resources in flight...");
                    token.cancel();
                }
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!("Worker task failed: {}", e);
                }
            }
            info!("Agent stopped");
        }

        Commands::Validate { config_dir } => {
            let app_config = AppConfig::load(&config_dir)?;
            let registry = registry(&transport_config(&app_config)?);

            println!("✓ Configuration is valid");
            println!("\n📦 Sources: {}", app_config.sources.len());
            for (name, source) in &app_config.sources {
                println!("{}", describe(name, source));
                for prefix in source.processor.resource_uri_prefixes() {
                    println!("    {}", prefix);
                }

                // Validate references
                match registry
                    .get_source(&source.kind)
                    .and_then(|_| registry.get_sink(&source.sink))
                {
                    Ok(_) => println!("    ✓ References valid"),
                    Err(e) => println!("    ✗ Error: {}", e),
                }
            }
        }
    }

    Ok(())
}

fn describe(name: &str, source: &SourceConfig) -> String {
    let prefixes: Vec<&str> = source.processor.resource_uri_prefixes().collect();
    format!(
        "  • {} ({} → {}, {} prefix(es), {:?} x{})",
        name,
        source.kind,
        source.sink,
        prefixes.len(),
        source.processor.parallel_type,
        source.processor.parallel_size
    )
}

/// Fmt subscriber at the configured level, `RUST_LOG` wins when set
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

fn transport_config(app_config: &AppConfig) -> anyhow::Result<NatsConfig> {
    if app_config.transport.is_null() {
        return Ok(NatsConfig::default());
    }
    Ok(serde_json::from_value(app_config.transport.clone())?)
}

fn registry(transport: &NatsConfig) -> Registry {
    let mut registry = Registry::new();

    registry.register_source(Arc::new(SourceDriver::<RedisConnection>::new(
        Arc::new(RedisConnectionFactory),
        Arc::new(RedisStreamMonitorFactory),
    )));
    registry.register_sink(Arc::new(NatsSinkFactory::new(transport.clone())));

    registry
}
