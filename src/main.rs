//! bucketgate - Virtual Bucket Resolution Layer
//!
//! Command line front end: configuration tooling, one-shot request
//! resolution and the control-plane stub.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bucketgate::addressing::AddressingMode;
use bucketgate::api::ControlPlaneServer;
use bucketgate::auth::key_id_from_authorization;
use bucketgate::config::{GatewayConfig, PolicyKind};
use bucketgate::error::{Error, Result};
use bucketgate::resolver::Resolver;
use bucketgate::rewrite::RequestRouter;

/// bucketgate - Virtual Bucket Resolution Layer
#[derive(Parser)]
#[command(name = "bucketgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "bucketgate.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides logging.level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log format (pretty, json); overrides logging.format
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "bucketgate.toml")]
        output: PathBuf,

        /// Base host for virtual-hosted addressing
        #[arg(long, default_value = "storage.example.com")]
        base_host: String,
    },

    /// Validate configuration file
    Validate,

    /// Show resolver information
    Info,

    /// Resolve one request and print the backend location as JSON
    Resolve {
        /// Request Host header
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Request path, e.g. /bucket/key
        #[arg(long)]
        path: String,

        /// Addressing mode (path, virtual-hosted); configured default if omitted
        #[arg(long)]
        mode: Option<AddressingMode>,

        /// Access key id of the caller
        #[arg(long)]
        key_id: Option<String>,

        /// Authorization header to take the key id from
        #[arg(long)]
        authorization: Option<String>,
    },

    /// Serve the control-plane stub
    ControlPlane {
        /// Address to listen on (overrides api.bind_address)
        #[arg(short, long)]
        listen: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; the config file may not exist yet (init)
    let logging = GatewayConfig::from_file(&cli.config)
        .map(|c| c.logging)
        .unwrap_or_default();
    init_logging(
        cli.log_level.as_deref().unwrap_or(&logging.level),
        cli.log_format.as_deref().unwrap_or(&logging.format),
    );

    match cli.command {
        Commands::Init { output, base_host } => run_init(output, base_host),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
        Commands::Resolve {
            host,
            path,
            mode,
            key_id,
            authorization,
        } => run_resolve(cli.config, host, path, mode, key_id, authorization).await,
        Commands::ControlPlane { listen } => run_control_plane(cli.config, listen).await,
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);

    if format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Generate a configuration file
fn run_init(output: PathBuf, base_host: String) -> Result<()> {
    let config_content = format!(
        r#"# bucketgate Configuration
# Generated configuration file

[addressing]
base_host = "{base_host}"
default_mode = "path"

[cache]
ttl_secs = 60
capacity = 10000
shards = 16

[resolver]
# default | per-tenant | static | control-plane
policy = "default"
default_prefix = "example"
timeout_ms = 2000
# fixed_time_ms = 1700000000000
# tenant_template = "namespaces/user_{{key_id}}"
# endpoint = "http://localhost:8888"

# [[resolver.rules]]
# bucket = "testbucket"
# prefix = "tenants/acme"
# key_id = "AKIDEXAMPLE"

[retry]
max_attempts = 3
initial_backoff_ms = 50
max_backoff_ms = 1000

[backend]
base_url = "http://localhost:9000"
bucket = "bucketgate-data"
path_style = true

[api]
bind_address = "0.0.0.0:8888"
cors_enabled = false

[logging]
level = "info"
format = "pretty"
"#
    );

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to choose a namespace policy and backend.");
    println!(
        "Then try: bucketgate --config {} resolve --path /testbucket/hello.txt",
        output.display()
    );

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match GatewayConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Base Host: {}", config.addressing.base_host);
            println!("  Default Mode: {}", config.addressing.default_mode);
            println!("  Policy: {}", config.resolver.policy);
            println!("  Cache TTL: {} s", config.cache.ttl_secs);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show resolver information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = GatewayConfig::from_file(&config_path)?;

    println!("bucketgate Information");
    println!("======================");
    println!();
    println!("Addressing:");
    println!("  Base Host:      {}", config.addressing.base_host);
    println!("  Default Mode:   {}", config.addressing.default_mode);
    println!();
    println!("Resolver:");
    println!("  Policy:         {}", config.resolver.policy);
    match config.resolver.policy {
        PolicyKind::Default => {
            println!("  Prefix:         {}", config.resolver.default_prefix);
            if let Some(time_ms) = config.resolver.fixed_time_ms {
                println!("  Fixed Time:     {} ms", time_ms);
            }
        }
        PolicyKind::PerTenant => {
            println!("  Template:       {}", config.resolver.tenant_template);
        }
        PolicyKind::Static => {
            println!("  Rules:          {}", config.resolver.rules.len());
        }
        PolicyKind::ControlPlane => {
            println!(
                "  Endpoint:       {}",
                config.resolver.endpoint.as_deref().unwrap_or("(none)")
            );
        }
    }
    println!("  Timeout:        {} ms", config.resolver.timeout_ms);
    println!("  Attempts:       {}", config.retry.max_attempts);
    println!();
    println!("Cache:");
    println!("  TTL:            {} s", config.cache.ttl_secs);
    println!("  Capacity:       {}", config.cache.capacity);
    println!("  Shards:         {}", config.cache.shards);
    println!();
    println!("Backend:");
    println!("  URL:            {}", config.backend.base_url);
    println!("  Bucket:         {}", config.backend.bucket);
    println!("  Path Style:     {}", config.backend.path_style);

    Ok(())
}

/// Resolve a single request
async fn run_resolve(
    config_path: PathBuf,
    host: String,
    path: String,
    mode: Option<AddressingMode>,
    key_id: Option<String>,
    authorization: Option<String>,
) -> Result<()> {
    let config = GatewayConfig::from_file(&config_path)?;
    let router = RequestRouter::from_config(&config)?;

    let key_id = key_id.or_else(|| authorization.as_deref().and_then(key_id_from_authorization));

    let routed = router
        .route(&host, &path, mode, key_id.as_deref(), Utc::now())
        .await
        .map_err(|e| {
            eprintln!("✗ {} ({})", e, e.kind().s3_code());
            e
        })?;

    let json = serde_json::to_string_pretty(&routed)
        .map_err(|e| Error::Internal(format!("failed to encode result: {}", e)))?;
    println!("{}", json);

    Ok(())
}

/// Run the control-plane stub
async fn run_control_plane(config_path: PathBuf, listen: Option<String>) -> Result<()> {
    let mut config = GatewayConfig::from_file(&config_path)?;

    if config.resolver.policy == PolicyKind::ControlPlane {
        return Err(Error::Config(
            "the control-plane stub cannot itself use the control-plane policy".into(),
        ));
    }

    if let Some(listen) = listen {
        config.api.bind_address = listen;
    }

    let policy = Resolver::policy_from_config(&config.resolver)?;
    tracing::info!(policy = policy.name(), "starting control-plane stub");

    let server = ControlPlaneServer::new(config.api.clone(), policy);

    tokio::select! {
        result = server.start() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}
