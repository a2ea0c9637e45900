use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;
use axum::http::{HeaderValue, Method, header};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use tarsy_domain::config::CorsConfig;
use tarsy_service::cli::{Cli, Command, ConfigCommand, load_config, run_doctor, validate_or_bail};
use tarsy_service::{bootstrap, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = load_config()?;
            run_server(config).await
        }
        Some(Command::Doctor) => {
            let (config, config_path) = load_config()?;
            let passed = run_doctor(&config, &config_path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = load_config()?;
            let issues = config.validate();
            for issue in &issues {
                println!("{issue}");
            }
            println!("{config_path}: {} issue(s)", issues.len());
            if issues.iter().any(|i| i.severity == tarsy_domain::config::ConfigSeverity::Error) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = load_config()?;
            println!("{}", toml::to_string_pretty(&config).context("serializing config")?);
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tarsy_service=debug")))
        .json()
        .init();
}

async fn run_server(config: tarsy_domain::config::Config) -> anyhow::Result<()> {
    tracing::info!("tarsy starting");

    validate_or_bail(&config).context("configuration invalid")?;

    let shutdown_grace_secs = config.sessions.shutdown_grace_secs;
    let host = config.server.host.clone();
    let port = config.server.port;
    let cors_layer = build_cors_layer(&config.server.cors);

    let max_concurrent =
        std::env::var("TARSY_MAX_CONCURRENT_REQUESTS").ok().and_then(|v| v.parse::<usize>().ok()).unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    let governor_layer = config.server.rate_limit.as_ref().map(|rl| {
        use tower_governor::GovernorLayer;
        use tower_governor::governor::GovernorConfigBuilder;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second.into())
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");

        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );
        GovernorLayer { config: Arc::new(gov_config) }
    });
    if governor_layer.is_none() {
        tracing::info!("per-IP rate limiting disabled (no [server.rate_limit] in config)");
    }

    let state = bootstrap::build_app_state(config).await.context("building application state")?;

    let router = routes::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));
    let app = if let Some(gov) = governor_layer { router.layer(gov) } else { router };

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "tarsy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone(), shutdown_grace_secs))
        .await
        .context("axum server error")?;

    Ok(())
}

/// Waits for SIGINT/SIGTERM, flips `shutdown_in_progress` (new alert/chat
/// submissions start getting rejected per spec.md §5), then gives
/// in-flight session tasks `shutdown_grace_secs` to finish on their own
/// before returning and letting axum drop the listener.
async fn shutdown_signal(state: tarsy_service::AppState, grace_secs: u64) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!(grace_secs, "shutdown signal received, draining in-flight sessions");
    state.shutdown_in_progress.store(true, Ordering::Relaxed);
    tokio::time::sleep(std::time::Duration::from_secs(grace_secs)).await;
    tracing::info!("shutdown grace period elapsed");
}

/// Builds a [`CorsLayer`] from the configured allowed origins. Origins
/// may end in `:*` to match any port on that host; a single `"*"` entry
/// allows everything.
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str.strip_prefix(prefix.as_str()).map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit())).unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_wildcard_star_is_permissive() {
        let cors = CorsConfig { allowed_origins: vec!["*".into()] };
        let _layer = build_cors_layer(&cors);
    }

    #[test]
    fn cors_exact_and_wildcard_port_entries_build() {
        let cors = CorsConfig { allowed_origins: vec!["http://localhost:*".into(), "https://dashboard.example.com".into()] };
        let _layer = build_cors_layer(&cors);
    }
}
