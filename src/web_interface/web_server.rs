use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use log::{error, info};

use super::routes::routes;
use crate::error_handling::types::WebError;
use crate::pipeline::controller::PipelineController;

/// HTTP front end of the pipeline
pub struct WebServer {
    pipeline: Arc<PipelineController>,
    addr: SocketAddr,
    max_upload_bytes: u64,
}

impl WebServer {
    pub fn new(pipeline: Arc<PipelineController>, addr: SocketAddr, max_upload_bytes: u64) -> Self {
        Self {
            pipeline,
            addr,
            max_upload_bytes,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serves the API until the process is stopped.
    pub async fn start(&self) -> Result<(), WebError> {
        // warp panics on a failed bind, so try the address first
        TcpListener::bind(self.addr).map_err(|e| {
            error!("Unable to bind {}: {}", self.addr, e);
            WebError::BindFailed(format!("{}: {}", self.addr, e))
        })?;

        info!("HTTP API listening on http://{}", self.addr);
        warp::serve(routes(self.pipeline.clone(), self.max_upload_bytes))
            .run(self.addr)
            .await;

        Ok(())
    }
}
