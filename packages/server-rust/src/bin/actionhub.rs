//! `actionhub` -- serves the sample services over HTTP, the `WebSocket`
//! channel and the query protocol.

use std::sync::Arc;
use std::time::Duration;

use actionhub_server::demo;
use actionhub_server::network::{ConnectionConfig, NetworkConfig, NetworkModule};
use actionhub_server::service::{CompositeObserver, ServerConfig};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "actionhub", version, about)]
struct Args {
    #[arg(long, env = "ACTIONHUB_HOST", default_value = "0.0.0.0")]
    host: String,
    #[arg(long, env = "ACTIONHUB_PORT", default_value_t = 8080)]
    port: u16,
    /// Allowed CORS origins; `*` allows any.
    #[arg(
        long,
        env = "ACTIONHUB_CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "*"
    )]
    cors_origins: Vec<String>,
    #[arg(long, env = "ACTIONHUB_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,
    #[arg(long, env = "ACTIONHUB_MAX_BODY_BYTES", default_value_t = 1024 * 1024)]
    max_body_bytes: usize,
    /// Outbound frame buffer per channel connection.
    #[arg(long, env = "ACTIONHUB_CHANNEL_CAPACITY", default_value_t = 256)]
    channel_capacity: usize,
    /// Inbound calls allowed in flight before new ones are shed.
    #[arg(long, env = "ACTIONHUB_MAX_CONCURRENCY", default_value_t = 1000)]
    max_concurrency: u32,
    #[arg(long, env = "ACTIONHUB_ADMIN_ROLE", default_value = "admin")]
    admin_role: String,
    /// Emit logs as JSON lines.
    #[arg(long, env = "ACTIONHUB_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            connection: ConnectionConfig {
                outbound_channel_capacity: self.channel_capacity,
                ..ConnectionConfig::default()
            },
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_body_bytes: self.max_body_bytes,
        }
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            admin_role: self.admin_role.clone(),
            max_concurrent_invocations: self.max_concurrency,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let services = Arc::new(demo::registry()?);
    info!(services = services.len(), "services loaded");

    let mut module = NetworkModule::new(
        args.network_config(),
        &args.server_config(),
        services,
        CompositeObserver::default(),
    );
    let port = module.start().await?;
    info!(port, "actionhub listening");

    module
        .serve(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await
}
