use clap::Parser;
use gnmi_exporter::{app, config, AppState, Supervisor};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

/// Streaming telemetry adapter bridging gNMI devices to a Prometheus-style
/// scrape endpoint.
#[derive(Parser, Debug)]
#[command(name = "gnmi-exporter")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// Enable verbose (debug-level) logging.
    #[arg(long)]
    dbg: bool,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.dbg { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_env_filter(filter).init();

    let cfg = match config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            tracing::error!(error = %err, config = %cli.config, "failed to load configuration");
            return std::process::ExitCode::FAILURE;
        }
    };

    let addr: std::net::SocketAddr = format!("{}:{}", cfg.global.listen_address, cfg.global.listen_port)
        .parse()
        .expect("listen_address/listen_port must form a valid socket address");

    let supervisor = Supervisor::start(cfg).await;
    let state = AppState {
        collector: supervisor.collector.clone(),
    };
    let router = app(state);

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind metrics listener");
            return std::process::ExitCode::FAILURE;
        }
    };
    tracing::info!(%addr, "serving /metrics");

    let serve_result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    supervisor.shutdown().await;

    if let Err(err) = serve_result {
        tracing::error!(error = %err, "http server exited with error");
        return std::process::ExitCode::FAILURE;
    }

    std::process::ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sig.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
