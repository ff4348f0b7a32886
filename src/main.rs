//! WolfHA - Active/Standby Failover Arbitration
//!
//! Runs one member of a failover group: keep-alive transport,
//! failover state machine and status API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfha::api::HttpServer;
use wolfha::backup::BackupManager;
use wolfha::config::WolfHaConfig;
use wolfha::error::{Error, Result};
use wolfha::network::{EventHandler, UdpTransport};

/// WolfHA - Active/Standby Failover Arbitration
#[derive(Parser)]
#[command(name = "wolfha")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolfha.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the failover node
    Start,

    /// Check node status
    Status {
        /// Node API address to query
        #[arg(short, long, default_value = "localhost:8090")]
        address: String,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfha.toml")]
        output: PathBuf,

        /// Node ID
        #[arg(long, default_value = "node-1")]
        node_id: String,
    },

    /// Validate configuration file
    Validate,

    /// Show node information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let config = WolfHaConfig::from_file(&cli.config).map_err(|e| {
                eprintln!("Failed to load configuration from {:?}: {}", cli.config, e);
                e
            })?;
            let level = cli.log_level.unwrap_or_else(|| config.logging.level.clone());
            init_logging(&level, &config.logging.format);
            run_start(config).await
        }
        Commands::Status { address } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), "pretty");
            run_status(address).await
        }
        Commands::Init { output, node_id } => run_init(output, node_id),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Start the failover node
async fn run_start(config: WolfHaConfig) -> Result<()> {
    tracing::info!("Starting WolfHA node {}", config.node.id);

    if config.backup.members.is_empty() {
        tracing::warn!("No backup members configured, this node will promote itself after the timeout");
    }

    let transport = match UdpTransport::bind(&config.socket_address()).await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to start keep-alive transport: {}", e);
            return Err(e);
        }
    };

    let (outbound_tx, outbound_rx) = UdpTransport::channel();
    let manager = Arc::new(BackupManager::new(&config.backup, outbound_tx));

    let sender_handle = transport.spawn_sender(outbound_rx);
    let handler: Arc<dyn EventHandler> = Arc::clone(&manager) as Arc<dyn EventHandler>;
    let receiver_handle = transport.spawn_receiver(handler);

    let scheduler_handle = manager.start();

    let http_server = HttpServer::new(config.api.clone(), config.node.id.clone(), Arc::clone(&manager));
    let http_server_handle = tokio::spawn(async move {
        if let Err(e) = http_server.start().await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Received shutdown signal (status was {})", manager.status());

    // Cleanup
    scheduler_handle.abort();
    receiver_handle.abort();
    sender_handle.abort();
    http_server_handle.abort();

    tracing::info!("WolfHA shutdown complete");
    Ok(())
}

/// Check node status
async fn run_status(address: String) -> Result<()> {
    let url = format!("http://{}/status", address);

    match reqwest::get(&url).await {
        Ok(response) => {
            let status: serde_json::Value = response
                .json()
                .await
                .map_err(|e| Error::Network(e.to_string()))?;
            let pretty = serde_json::to_string_pretty(&status)
                .map_err(|e| Error::Internal(e.to_string()))?;
            println!("{}", pretty);
            Ok(())
        }
        Err(e) => {
            eprintln!("Failed to get status: {}", e);
            Err(Error::Network(e.to_string()))
        }
    }
}

/// Initialize configuration file
fn run_init(output: PathBuf, node_id: String) -> Result<()> {
    let config_content = format!(r#"# WolfHA Configuration
# Generated configuration file

[node]
id = "{node_id}"
bind_address = "0.0.0.0"

[backup]
# Hosts in the failover group (IP addresses, no port)
members = []
# members = ["10.0.0.2", "10.0.0.3"]
port = 10001
# Higher priority wins when two nodes both claim ACTIVE
priority = 0
keepalive_timeout_ms = 3000

[api]
enabled = true
bind_address = "0.0.0.0:8090"
cors_enabled = false

[logging]
level = "info"
format = "pretty"
"#);

    std::fs::write(&output, config_content)?;
    println!("Configuration written to {:?}", output);
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfHaConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Node ID: {}", config.node.id);
            println!("  Keep-alive Socket: {}", config.socket_address());
            println!("  Members: {}", config.backup.members.len());
            println!("  Priority: {}", config.backup.priority);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show node information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = WolfHaConfig::from_file(&config_path)?;

    println!("WolfHA Node Information");
    println!("=======================");
    println!();
    println!("Node ID:          {}", config.node.id);
    println!("Keep-alive:       {}", config.socket_address());
    println!();
    println!("Failover Group:");
    println!("  Members:        {:?}", config.backup.members);
    println!("  Port:           {}", config.backup.port);
    println!("  Priority:       {}", config.backup.priority);
    println!("  Timeout:        {} ms", config.backup.keepalive_timeout_ms);
    println!();
    println!("API:");
    println!("  Enabled:        {}", config.api.enabled);
    println!("  Address:        {}", config.api.bind_address);

    Ok(())
}
