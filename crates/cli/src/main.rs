mod config_commands;
mod webhook_commands;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    topicbridge_common::types::UserId,
    topicbridge_config::{BridgeConfig, StorageBackend, StorageConfig},
    topicbridge_gateway::{GatewayState, start_gateway},
    topicbridge_relay::MessagingGateway,
    topicbridge_store::{KeyValueStore, MemoryKvStore, SqliteKvStore},
    topicbridge_telegram::{BotApi, TelegramGateway},
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

/// Default database file name inside the data directory.
const DB_FILE: &str = "topicbridge.db";

#[derive(Parser)]
#[command(
    name = "topicbridge",
    version,
    about = "Topicbridge: private chats relayed into per-user forum threads"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (skips discovery of topicbridge.{toml,yaml,yml,json}).
    #[arg(long, short, global = true, env = "TOPICBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server (default when no subcommand is provided).
    Serve,
    /// Flush or discard stale media-group buffers once, then exit.
    Sweep,
    /// Webhook registration with Telegram.
    Webhook {
        #[command(subcommand)]
        action: webhook_commands::WebhookAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load the explicit config file, or discover one in the standard locations.
fn load_config(path: Option<&Path>) -> anyhow::Result<BridgeConfig> {
    match path {
        Some(path) => {
            let mut config = topicbridge_config::load_config(path)?;
            topicbridge_config::apply_env_overrides(&mut config);
            Ok(config)
        },
        None => Ok(topicbridge_config::discover_and_load()),
    }
}

async fn open_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match config.backend {
        StorageBackend::Memory => {
            warn!("using in-memory storage, thread records are lost on restart");
            Ok(Arc::new(MemoryKvStore::new()))
        },
        StorageBackend::Sqlite => {
            let path = config
                .path
                .clone()
                .unwrap_or_else(|| topicbridge_config::data_dir().join(DB_FILE));
            let store = SqliteKvStore::open(&path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            info!(path = %path.display(), "storage ready");
            Ok(Arc::new(store))
        },
    }
}

/// Build the relay with the Bot API as its outbound gateway.
async fn build_state(config: &BridgeConfig, bot_id: Option<UserId>) -> anyhow::Result<GatewayState> {
    let store = open_store(&config.storage).await?;
    let api = BotApi::new(&config.telegram.api_base, config.telegram.token.clone())?;
    let gateway: Arc<dyn MessagingGateway> = Arc::new(TelegramGateway::new(api));
    GatewayState::build(config, store, gateway, bot_id)
}

/// Refuse to start on configuration errors; warnings are only logged.
fn ensure_runnable(config: &BridgeConfig) -> anyhow::Result<()> {
    let result = topicbridge_config::validate(config, None);
    for d in &result.diagnostics {
        match d.severity {
            topicbridge_config::Severity::Error => error!(path = %d.path, "{}", d.message),
            topicbridge_config::Severity::Warning => warn!(path = %d.path, "{}", d.message),
            topicbridge_config::Severity::Info => {},
        }
    }
    if result.has_errors() {
        anyhow::bail!("configuration has errors, run `topicbridge config check` for details");
    }
    Ok(())
}

async fn serve(
    config: BridgeConfig,
    bind: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    ensure_runnable(&config)?;

    let bot_id = match config.telegram.bot_id {
        Some(id) => Some(UserId(id)),
        None => {
            let bot = topicbridge_telegram::connect(&config.telegram)?;
            match topicbridge_telegram::resolve_bot_id(&bot).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(error = %e, "could not resolve bot identity, relying on the sender bot flag");
                    None
                },
            }
        },
    };

    let state = Arc::new(build_state(&config, bot_id).await?);
    let bind = bind.unwrap_or(config.server.bind);
    let port = port.unwrap_or(config.server.port);
    start_gateway(
        state,
        &bind,
        port,
        Duration::from_secs(config.server.drain_timeout_secs),
        shutdown_signal(),
    )
    .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn sweep(config: BridgeConfig) -> anyhow::Result<()> {
    ensure_runnable(&config)?;
    if config.storage.backend == StorageBackend::Memory {
        warn!("in-memory storage holds no buffers from other processes");
    }

    let state = build_state(&config, config.telegram.bot_id.map(UserId)).await?;
    let report = state.relay.aggregator().sweep().await?;
    println!(
        "Flushed {} media group(s), discarded {}.",
        report.flushed, report.discarded
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "topicbridge starting");

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        // Default: serve when no subcommand is provided
        None | Some(Commands::Serve) => serve(config, cli.bind, cli.port).await,
        Some(Commands::Sweep) => sweep(config).await,
        Some(Commands::Webhook { action }) => webhook_commands::handle_webhook(action, &config).await,
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, &config, cli.config.as_deref())
        },
    }
}
