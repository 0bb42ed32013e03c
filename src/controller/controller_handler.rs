use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};

use crate::configuration::config::Config;
use crate::configuration::types::SessionBackend;
use crate::error_handling::types::*;
use crate::imaging::transform::ImagingTransform;
use crate::pipeline::controller::{PipelineController, ReapReport};
use crate::session_management::file_store::FileSessionStore;
use crate::session_management::memory_store::MemorySessionStore;
use crate::session_management::redis_store::RedisSessionStore;
use crate::session_management::session_store::SessionStore;
use crate::storage::file_storage::FileArtifactStore;
use crate::web_interface::web_server::WebServer;

/// Wires configuration, stores and the HTTP server together.
pub struct Controller {
    pub config: Config,
    pipeline: Arc<PipelineController>,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        config.validate()?;

        let ttl = config.session_ttl();
        let sessions: Arc<dyn SessionStore> = match config.session.backend {
            SessionBackend::Memory => Arc::new(MemorySessionStore::new(ttl)),
            SessionBackend::File => {
                Arc::new(FileSessionStore::new(&config.storage.session_dir, ttl)?)
            }
            SessionBackend::Redis => {
                let store = RedisSessionStore::new(
                    &config.session.redis_host,
                    config.session.redis_port,
                    ttl,
                )?;
                store.ping()?;
                Arc::new(store)
            }
        };
        let artifacts = Arc::new(FileArtifactStore::new(&config.storage.artifact_dir)?);

        let mut pipeline =
            PipelineController::new(sessions, artifacts, Arc::new(ImagingTransform::new()));
        if config.session.serialize_transforms {
            pipeline = pipeline.with_serialized_transforms();
        }

        info!(
            "Sessions: {:?} backend, ttl {}s; artifacts in {}",
            config.session.backend,
            config.session.ttl_secs,
            config.storage.artifact_dir.display()
        );
        if pipeline.serializes_transforms() {
            info!("Transforms are serialized per session");
        }

        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
        })
    }

    pub fn pipeline(&self) -> Arc<PipelineController> {
        self.pipeline.clone()
    }

    /// Starts the expiry sweep and serves HTTP until the server stops.
    pub async fn run(&mut self) -> Result<(), ControllerError> {
        let period = Duration::from_secs(self.config.session.reaper_interval_secs);
        let reaper = tokio::spawn(reaper_loop(self.pipeline.clone(), period));

        let addr = self.config.socket_addr()?;
        let server = WebServer::new(
            self.pipeline.clone(),
            addr,
            self.config.server.max_upload_bytes,
        );
        let result = server.start().await;

        reaper.abort();
        result.map_err(ControllerError::from)
    }
}

async fn reaper_loop(pipeline: Arc<PipelineController>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(e) = reap(pipeline.clone()).await {
            error!("Session sweep failed: {}", e);
        }
    }
}

/// Runs one sweep over expired sessions on the blocking pool.
pub async fn reap(pipeline: Arc<PipelineController>) -> Result<ReapReport, ControllerError> {
    let report = tokio::task::spawn_blocking(move || pipeline.reap_expired(Utc::now()))
        .await
        .map_err(|e| ControllerError::TaskFailed(format!("session sweep: {}", e)))??;

    if report.expired > 0 {
        info!("Retired {} expired session(s)", report.expired);
    } else {
        debug!("No expired sessions");
    }
    for path in &report.undeleted {
        warn!("Could not delete artifact {} of expired session", path.display());
    }
    Ok(report)
}
