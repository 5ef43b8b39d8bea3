//! Core library for the gNMI telemetry adapter. Wires together the
//! per-device session engine (C3), the data-model plugin framework (C2),
//! the scrape-driven collector (C4), and the HTTP `/metrics` endpoint.

pub mod collector;
pub mod config;
pub mod error;
pub mod gnmi;
pub mod model;
pub mod path;
pub mod plugin;
pub mod session;
pub mod watchdog;

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<collector::Collector>,
}

/// Builds the axum `Router` exposing the scrape endpoint. Kept separate
/// from `Supervisor` so tests can exercise it against a hand-built
/// `Collector` without starting any sessions.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.collector.collect().await;
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

/// C5: instantiates one collector plus one session per configured device.
/// Exclusively owns both for the lifetime of the process.
pub struct Supervisor {
    pub collector: Arc<collector::Collector>,
    sessions: Vec<Arc<session::Session>>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Supervisor {
    pub async fn start(cfg: config::AppConfig) -> Self {
        let collector = Arc::new(collector::Collector::new(
            cfg.global.instance_name.clone(),
            cfg.global.metric_prefix.clone(),
            cfg.devices.len(),
        ));

        let mut sessions = Vec::with_capacity(cfg.devices.len());
        let mut handles = Vec::with_capacity(cfg.devices.len());
        for device in cfg.devices {
            let plugins = plugin::build_plugins(
                &device.plugins,
                &device.dev_name,
                &cfg.global.instance_name,
                &cfg.global.metric_prefix,
            );
            for p in &plugins {
                collector.register_plugin(p.clone()).await;
            }
            let session = Arc::new(session::Session::new(device, plugins));
            let task_session = session.clone();
            handles.push(tokio::spawn(async move { task_session.run().await }));
            sessions.push(session);
        }

        Supervisor {
            collector,
            sessions,
            handles,
        }
    }

    /// Graceful shutdown: unregister plugins, close each session (which
    /// joins its worker tasks), then return once every session task has
    /// exited.
    pub async fn shutdown(self) {
        self.collector.unregister_all().await;
        for session in &self.sessions {
            session.close();
        }
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
