use clap::Parser;
use dotenvy::dotenv;
use fileup::config::ServerConfig;
use fileup::services::worker::SessionMonitor;
use fileup::{AppState, create_app};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Folder where uploaded files are stored
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Folder where processed JSON files are stored
    #[arg(long)]
    jsondir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fileup=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Configuration: flags override the environment
    let mut config = ServerConfig::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = args.dir {
        config.upload_dir = dir;
    }
    if let Some(jsondir) = args.jsondir {
        config.processed_json_dir = jsondir;
    }

    info!(
        "🚀 Starting fileup: uploads={}, processed={}, max size={}MB",
        config.upload_dir.display(),
        config.processed_json_dir.display(),
        config.max_file_size / 1024 / 1024
    );

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    tokio::fs::create_dir_all(&config.processed_json_dir).await?;

    // 3. Shutdown plumbing
    let shutdown = CancellationToken::new();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let state = AppState::new(config.clone(), shutdown.clone());

    // 4. Stale session monitor
    let monitor = SessionMonitor::new(
        state.upload_service.registry().clone(),
        config.stale_session_age,
        shutdown_rx,
    );
    let monitor_handle = tokio::spawn(monitor.run());

    // 5. HTTP server
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let address = config.address();
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!("✅ Server listening on {}", address);
    info!("📖 Swagger UI documentation: http://{}/swagger-ui", address);

    let server_shutdown = shutdown.clone();
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // In-flight uploads stop at their next chunk boundary.
            server_shutdown.cancel();
            let _ = shutdown_tx.send(true);
        })
        .await
    {
        error!("❌ Server runtime error: {}", e);
    }

    let _ = monitor_handle.await;

    info!("👋 fileup exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
