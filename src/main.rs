use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use polyglot_relay::api::{build_router, AppState};
use polyglot_relay::config::{load_dotenv, AppConfig};
use polyglot_relay::ocr::TesseractCli;
use polyglot_relay::providers::build_http_client;

/// Command-line overrides; everything else comes from the environment.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Host interface to bind (overrides `HOST`).
    #[arg(long)]
    host: Option<String>,
    /// TCP port to bind (overrides `PORT`).
    #[arg(long)]
    port: Option<u16>,
    /// Dotenv file to load instead of looking for `.env`.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    // Before the subscriber, so `RUST_LOG` may come from the file.
    load_dotenv(cli.env_file.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "polyglot_relay=info,tower_http=info".into()),
        )
        .compact()
        .init();

    let mut cfg = AppConfig::from_env()?;
    if let Some(host) = cli.host {
        cfg.host = host;
    }
    if let Some(port) = cli.port {
        cfg.port = port;
    }

    let http = build_http_client(&cfg)?;
    let ocr = Arc::new(TesseractCli::new(cfg.tesseract_bin.clone()));
    let state = Arc::new(AppState::new(cfg.clone(), http, ocr));

    let app = build_router(state);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        host = %cfg.host,
        port = cfg.port,
        chat_configured = cfg.google_api_key.is_some(),
        hf_configured = cfg.hf_token.is_some(),
        sign_server = cfg.sign_server_url.is_some(),
        translation_hosts = cfg.libretranslate_urls.len(),
        "starting polyglot-relay"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
