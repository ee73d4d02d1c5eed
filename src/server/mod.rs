//! Dashboard HTTP server

mod router;

pub use router::{AppState, create_router};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::config::Config;
use crate::jobs::{AnalysisService, Submitter, backend_from_config};
use crate::monitor::{BaselineStore, Monitor};
use crate::storage::{AnalysisArchive, TokenFeedReader};
use crate::{Error, Result, market, storage};

/// Everything built from a [`Config`]; shared by the server and the CLI
pub struct Services {
    /// Overlap feed reader
    pub reader: TokenFeedReader,
    /// Token monitor
    pub monitor: Arc<Monitor>,
    /// Analysis submission and history
    pub analyses: Arc<AnalysisService>,
}

impl Services {
    /// Build the clients and services named by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if a configured client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = storage::from_config(&config.storage)?;
        match &store {
            Some(s) => info!(store = s.name(), bucket = %config.storage.bucket, "Object storage configured"),
            None => warn!("Object storage not configured, serving sample data"),
        }

        let market = market::from_config(&config.market)?;
        if market.is_none() {
            warn!("Market data disabled, token freshness checks are skipped");
        }

        let backend = backend_from_config(&config.backend)?;
        if backend.is_none() {
            warn!("Analysis backend not configured, submissions will be rejected");
        }

        let reader = TokenFeedReader::new(
            store.clone(),
            config.storage.overlap_file.clone(),
            config.storage.max_records,
            config.storage.sample_fallback,
        );
        let archive = AnalysisArchive::new(
            store,
            config.storage.analyses_folder.clone(),
            config.storage.list_limit,
        );

        let baselines = BaselineStore::load(
            PathBuf::from(&config.monitor.baseline_path),
            config.monitor.eviction_misses,
        );
        let monitor = Arc::new(Monitor::new(
            reader.clone(),
            market.clone(),
            baselines,
            &config.monitor,
        ));

        let submitter = Submitter::new(market, backend, &config.jobs);
        let analyses = Arc::new(AnalysisService::new(submitter, &config.jobs, archive));

        Ok(Self {
            reader,
            monitor,
            analyses,
        })
    }
}

/// Dashboard server
pub struct Server {
    config: Config,
    services: Services,
}

impl Server {
    /// Create a new server
    ///
    /// # Errors
    ///
    /// See [`Services::from_config`].
    pub fn new(config: Config) -> Result<Self> {
        let services = Services::from_config(&config)?;
        Ok(Self { config, services })
    }

    /// Run until Ctrl+C or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

        let background = self.config.server.monitor_enabled;
        let monitor_task = if background {
            let monitor = Arc::clone(&self.services.monitor);
            Some(tokio::spawn(monitor.run(shutdown_tx.subscribe())))
        } else {
            None
        };

        let state = Arc::new(AppState {
            reader: self.services.reader.clone(),
            monitor: Arc::clone(&self.services.monitor),
            monitor_background: background,
            analyses: Arc::clone(&self.services.analyses),
        });
        let app = create_router(state);

        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("ALPHA DASH v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(
            interval = ?self.config.monitor.refresh_interval,
            background,
            "Token monitor"
        );
        info!(
            enabled = self.services.analyses.is_enabled(),
            max_tokens = self.config.jobs.max_tokens,
            "Trader ROI analysis"
        );
        info!("============================================================");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Stopping background tasks...");
        if let Some(task) = monitor_task {
            let _ = task.await;
        }
        self.services.analyses.shutdown().await;

        Ok(())
    }
}

/// Wait for Ctrl+C or SIGTERM, then notify subscribers
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
