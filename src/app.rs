//! Application assembly: config overrides, engine wiring and serving.

use std::path::Path;
use std::sync::Arc;

use ferrule_core::config::Config;
use ferrule_core::lifecycle::signal::{SignalHandler, wait_for_shutdown};
use ferrule_core::metrics::MetricsRecorder;
use ferrule_core::sink::TracingNotifySink;
use ferrule_server::{Engine, Launcher};

use crate::cli::RunArgs;
use crate::routes;

/// Loads the config file and applies CLI overrides.
///
/// A missing file falls back to defaults; the flag reports whether the file
/// was found. An unreadable or invalid file is an error.
pub fn load_config(args: &RunArgs) -> anyhow::Result<(Config, bool)> {
    let loaded = Path::new(&args.config).exists();
    let mut config = if loaded {
        Config::load(&args.config)?
    } else {
        Config::default()
    };

    if let Some(ref host) = args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(env) = args.env {
        config.env = env;
    }
    if let Some(ref level) = args.log_level {
        config.log_level = level.clone();
    }
    if let Some(timeout) = args.shutdown_timeout {
        config.shutdown_timeout = timeout;
    }
    config.validate()?;

    Ok((config, loaded))
}

pub struct Application {
    engine: Engine,
}

impl Application {
    pub fn build(config: Config) -> Self {
        tracing::info!(
            project = %config.project_name,
            env = %config.env,
            rate_limit = config.rate_limit.enabled,
            metrics = config.enable_metrics,
            cors = config.enable_cors,
            "building engine"
        );

        let recorder = Arc::new(MetricsRecorder::new());
        let mut engine = Engine::builder(config)
            .alert_sink(TracingNotifySink)
            .metrics_recorder(recorder)
            .build();
        routes::register(&mut engine);

        Self { engine }
    }

    /// Serve until SIGTERM/Ctrl+C, then drain.
    pub async fn serve(self) -> anyhow::Result<()> {
        let (signal_handler, shutdown_rx) = SignalHandler::new();
        tokio::spawn(signal_handler.run());

        Launcher::from_engine(self.engine)
            .run(wait_for_shutdown(shutdown_rx))
            .await?;

        tracing::info!("Server shut down.");
        Ok(())
    }
}
