//! Crossbar HTTP server entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;

use crossbar::provider::Provider;
use crossbar::{
    CacheConfig, Config, Gateway, HttpProvider, HttpProviderConfig, LimiterConfig, QuotaConfig,
    StaticKeyAuth,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!(
        r#"
 ██████╗██████╗  ██████╗ ███████╗███████╗██████╗  █████╗ ██████╗
██╔════╝██╔══██╗██╔═══██╗██╔════╝██╔════╝██╔══██╗██╔══██╗██╔══██╗
██║     ██████╔╝██║   ██║███████╗███████╗██████╔╝███████║██████╔╝
██║     ██╔══██╗██║   ██║╚════██║╚════██║██╔══██╗██╔══██║██╔══██╗
╚██████╗██║  ██║╚██████╔╝███████║███████║██████╔╝██║  ██║██║  ██║
 ╚═════╝╚═╝  ╚═╝ ╚═════╝ ╚══════╝╚══════╝╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝

        ONE FRONTEND. MANY MODELS.
                                        AGPL-3.0
"#
    );

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate()?;
    let addr: SocketAddr = config.socket_addr().parse()?;

    tracing::info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        upstream = %config.upstream_url,
        models = config.models.len(),
        "Crossbar starting"
    );

    let provider: Arc<dyn Provider> = Arc::new(HttpProvider::new(HttpProviderConfig {
        base_url: config.upstream_url.clone(),
        base_path: config.upstream_base_path.clone(),
        api_key: config.upstream_api_key.clone(),
        ..HttpProviderConfig::default()
    })?);

    let mut builder = Gateway::builder()
        .cache(CacheConfig {
            enabled: true,
            max_items: config.cache_max_items,
            max_bytes: config.cache_max_bytes,
            ttl: config.cache_ttl,
        })
        .limiter(LimiterConfig {
            enabled: config.rate_rps > 0.0,
            rps: config.rate_rps,
            burst: config.rate_burst,
        })
        .quota(QuotaConfig {
            enabled: config.quota_limit > 0,
            default_quota: config.quota_limit,
            period: config.quota_period,
        });
    for model in &config.models {
        builder = builder.model(model.clone(), provider.clone());
    }
    if !config.api_keys.is_empty() {
        let auth = StaticKeyAuth::from_pairs(&config.api_keys);
        tracing::info!(keys = auth.len(), "client API-key auth enabled");
        builder = builder.auth_hook(Arc::new(auth));
    }

    let gateway = builder.build();
    gateway.start_maintenance();

    let app = crossbar::server::router(gateway.clone());

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    gateway.close();
    tracing::info!("Crossbar shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
