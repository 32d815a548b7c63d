// ABOUTME: Server state shared by the HTTP surface and the session lifecycle
// ABOUTME: Loads plugins, creates the platform backend and serves until shutdown

use crate::config::Config;
use crate::http::{self, HttpState};
use crate::plugins::{self, builtin::BuiltinContext};
use anyhow::{Context, Result};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use relaybot_core::{
    metrics, Dispatcher, Heartbeat, LifecycleController, LoadReport, PluginRegistry, SessionStore,
    TracingObserver,
};
use relaybot_platform::PlatformRegistry;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Everything the running agent needs. Cheap to clone.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub registry: Arc<PluginRegistry>,
    pub controller: LifecycleController,
    pub metrics: PrometheusHandle,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("config", &self.config)
            .field("commands", &self.registry.commands().names())
            .field("event_handlers", &self.registry.events().names())
            .field("sessions", &self.controller.store().len())
            .finish()
    }
}

impl ServerState {
    /// Initialize all server components from validated config.
    ///
    /// Plugin load failures are logged and do not abort startup. An unknown
    /// platform backend or an invalid heartbeat schedule does.
    pub fn initialize(config: Config, platforms: &PlatformRegistry) -> Result<Self> {
        let started = Instant::now();
        let metrics = metrics::init_metrics()?;

        let report = load_plugins(&config, started);
        let registry = Arc::new(report.registry);

        let platform = platforms
            .create(&config.platform.backend, &config.platform.settings)
            .with_context(|| {
                format!(
                    "Failed to create platform backend '{}' (available: {})",
                    config.platform.backend,
                    platforms.available().join(", ")
                )
            })?;
        tracing::info!(backend = %config.platform.backend, "Platform backend initialized");

        let heartbeat = Heartbeat::from_config(&config.heartbeat, started)?;
        match &heartbeat {
            Some(hb) => tracing::info!(
                destination = %hb.destination_id(),
                schedule = %config.heartbeat.schedule,
                timezone = %config.heartbeat.timezone,
                "Heartbeat configured"
            ),
            None => tracing::info!("Heartbeat disabled"),
        }

        let dispatcher = Dispatcher::new(Arc::clone(&registry), config.dispatch.handler_timeout());
        let controller = LifecycleController::new(
            platform,
            SessionStore::new(),
            dispatcher,
            heartbeat,
            config.login.connect_timeout(),
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            controller,
            metrics,
        })
    }

    /// HTTP router over this state
    pub fn router(&self) -> Router {
        let state = HttpState {
            controller: self.controller.clone(),
            registry: Arc::clone(&self.registry),
            metrics: self.metrics.clone(),
        };
        http::router(state, &self.config.server.public_dir)
    }

    /// Serve HTTP until `shutdown` fires, then log out every session
    pub async fn serve(&self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        tracing::info!(addr = %addr, "Starting HTTP server");

        let signal = shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await?;

        tracing::info!("HTTP server stopped, closing sessions");
        self.controller.store().shutdown_all().await;
        Ok(())
    }
}

/// Load configured plugins, logging the outcome
pub fn load_plugins(config: &Config, started: Instant) -> LoadReport {
    let context = BuiltinContext { started };
    plugins::load(&config.plugins, context, &TracingObserver)
}
