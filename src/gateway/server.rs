//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::{Services, create_router};
use crate::clock::SystemClock;
use crate::config::Config;
use crate::{Error, Result};

/// CRM gateway server
pub struct Gateway {
    config: Config,
    services: Services,
}

impl Gateway {
    /// Validate configuration and build all components
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let services = Services::build(&config, Arc::new(SystemClock)).await?;
        Ok(Self { config, services })
    }

    /// Shared components
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Run the gateway until Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.server.host, self.config.server.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address: {e}")))?;

        let state = self.services.app_state(&self.config.auth);
        let app = create_router(state, self.config.server.request_timeout);

        let listener = TcpListener::bind(addr).await?;

        info!(host = %self.config.server.host, port = self.config.server.port, "Listening");
        info!(
            store = ?self.config.store.backend,
            list_ttl_secs = self.config.list_cache.ttl.as_secs(),
            single_flight = self.config.oauth.single_flight,
            "Cache configuration"
        );
        if !self.config.auth.enabled {
            warn!("AUTHENTICATION disabled - gateway is open to all requests");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
}
