use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use concierge_apply::config::{AppConfig, GatewayConfig};
use concierge_apply::wizard::{
    HttpGateway, LoggingGateway, SessionRegistry, SubmissionGateway, membership_catalog,
    wizard_routes,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to read configuration")?;

    // Initialize tracing: stderr always, plus daily files when a log dir is set.
    let (file_layer, _log_guard) = match config.log_dir {
        Some(ref dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log dir {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "concierge-apply.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    eprintln!("🛎️  Concierge Apply v{}", env!("CARGO_PKG_VERSION"));

    let catalog = Arc::new(membership_catalog().context("Built-in step catalog is invalid")?);
    eprintln!("   Steps: {}", catalog.len());

    let gateway: Arc<dyn SubmissionGateway> = match config.gateway {
        GatewayConfig::Logging { latency } => {
            eprintln!("   Gateway: logging (simulated latency {:?})", latency);
            Arc::new(LoggingGateway::new(latency))
        }
        GatewayConfig::Http { ref url, ref token } => {
            eprintln!("   Gateway: {}", url);
            Arc::new(HttpGateway::new(url.clone(), token.clone()))
        }
    };

    eprintln!(
        "   Teardown: {:?} after success, submit timeout {:?}, blank policy {:?}",
        config.controller.teardown_delay,
        config.controller.submit_timeout,
        config.controller.blank_policy
    );

    let registry = SessionRegistry::new(catalog, gateway, config.controller.clone());

    let cors = match config.cors_origin {
        Some(ref origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<HeaderValue>()
                    .with_context(|| format!("Invalid CORS origin: {origin}"))?,
            )
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    let app = wizard_routes(Arc::clone(&registry)).layer(cors);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    eprintln!("   API: http://0.0.0.0:{}/api/applications", config.port);
    eprintln!("   Replay WS: ws://0.0.0.0:{}/ws/replay\n", config.port);
    tracing::info!(port = config.port, "Concierge Apply server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let closed = registry.close_all().await;
    tracing::info!(closed, "Shutdown complete");

    Ok(())
}
