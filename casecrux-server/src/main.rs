use anyhow::{Context, Result};
use casecrux::api::ApiServer;
use casecrux::cache::ResponseCache;
use casecrux::upstream::MlClient;
use casecrux::Config;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "casecrux-server")]
#[command(about = "CaseCrux caching gateway for the legal summarization service")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "casecrux.toml")]
    config: String,

    /// Host to bind to (overrides server.bind_addr)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides server.bind_addr)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

fn init_tracing(config: &Config) {
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::new(&config.observability.log_level));

    if config.observability.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Combine the configured bind address with any CLI overrides
fn bind_addr(configured: &str, host: Option<&str>, port: Option<u16>) -> String {
    let (default_host, default_port) = configured.rsplit_once(':').unwrap_or((configured, "5000"));
    let host = host.unwrap_or(default_host);
    match port {
        Some(port) => format!("{}:{}", host, port),
        None => format!("{}:{}", host, default_port),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load_or_create(std::path::Path::new(&args.config))
        .with_context(|| format!("loading config from {}", args.config))?;
    init_tracing(&config);

    tracing::info!("Config file: {}", args.config);
    tracing::info!(
        "Environment: {}, ML service: {} (from {:?})",
        config.upstream.environment.as_str(),
        config.upstream.url,
        config.upstream.url_source
    );

    let cache = ResponseCache::connect(&config.cache).await;
    if !cache.is_available() {
        tracing::warn!("Response cache disabled, requests go straight to the ML service");
    }

    let ml = MlClient::new(&config.upstream)?;
    let addr = bind_addr(&config.server.bind_addr, args.host.as_deref(), args.port);

    let mut server = ApiServer::new(config.server.clone(), cache, ml);
    if config.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("installing Prometheus recorder")?;
        server = server.with_metrics(handle);
    }

    tracing::info!("Starting CaseCrux server on {}", addr);
    server.serve(&addr).await?;

    Ok(())
}
