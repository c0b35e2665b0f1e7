//! Binds the listener, serves the router and drains on shutdown.

use std::future::Future;
use std::time::Duration;

use axum::Router;
use ferrule_core::error::FrameworkError;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{info, warn};

use crate::engine::Engine;

pub struct Launcher {
    name: String,
    addr: String,
    router: Router,
    shutdown_timeout: Duration,
}

impl Launcher {
    pub fn new(name: impl Into<String>, addr: impl Into<String>, router: Router) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            router,
            shutdown_timeout: Duration::from_secs(10),
        }
    }

    /// Uses the engine's configured address, project name and shutdown timeout.
    pub fn from_engine(engine: Engine) -> Self {
        let config = engine.config();
        let name = config.project_name.clone();
        let addr = config.addr();
        let timeout = Duration::from_secs(config.shutdown_timeout);
        Self::new(name, addr, engine.into_router()).shutdown_timeout(timeout)
    }

    /// Upper bound on draining in-flight requests once shutdown starts.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), FrameworkError> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|source| FrameworkError::Bind {
                addr: self.addr.clone(),
                source,
            })?;
        self.serve(listener, shutdown).await
    }

    /// Serves on an already bound listener.
    ///
    /// On `shutdown` the listener stops accepting and in-flight requests get
    /// `shutdown_timeout` to finish; whatever is left is then aborted.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), FrameworkError> {
        let Self {
            name,
            addr,
            router,
            shutdown_timeout,
        } = self;
        let local = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or(addr);
        info!(server = %name, addr = %local, "server started");

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = stop_rx.wait_for(|stop| *stop).await;
        });
        let mut handle = tokio::spawn(async move { server.await });

        tokio::select! {
            result = &mut handle => {
                warn!(server = %name, "server exited before shutdown was requested");
                return flatten(result);
            }
            () = shutdown => {}
        }

        info!(server = %name, "shutting down, draining in-flight requests");
        let _ = stop_tx.send(true);
        match tokio::time::timeout(shutdown_timeout, &mut handle).await {
            Ok(result) => {
                flatten(result)?;
                info!(server = %name, "server stopped");
                Ok(())
            }
            Err(_) => {
                warn!(
                    server = %name,
                    timeout_secs = shutdown_timeout.as_secs_f64(),
                    "graceful shutdown timed out, closing remaining connections"
                );
                handle.abort();
                Ok(())
            }
        }
    }
}

fn flatten(result: Result<std::io::Result<()>, JoinError>) -> Result<(), FrameworkError> {
    result
        .map_err(|e| FrameworkError::Join(e.to_string()))?
        .map_err(FrameworkError::Serve)
}
