//! `gpuwatch-agent` -- GPU telemetry daemon.
//!
//! Samples every local GPU through NVML (or a remote stats endpoint),
//! classifies each metric, tracks alerts, and logs the consolidated view
//! after every cycle. Stops cleanly on Ctrl-C.
//!
//! # Environment variables
//!
//! | Variable             | Required | Default               | Description                              |
//! |----------------------|----------|-----------------------|------------------------------------------|
//! | `POLL_INTERVAL_MS`   | no       | `1000`                | Milliseconds between sampling cycles     |
//! | `THRESHOLDS_FILE`    | no       | --                    | JSON threshold table overriding defaults |
//! | `METRICS_SOURCE_URL` | no       | --                    | Poll this stats endpoint instead of NVML |
//! | `RUST_LOG`           | no       | `gpuwatch_agent=info` | Log filter                               |

use std::sync::Arc;

use gpuwatch_agent::collector::NvmlSource;
use gpuwatch_agent::config::AgentConfig;
use gpuwatch_agent::engine::Engine;
use gpuwatch_agent::source::{HttpSource, SnapshotSource};
use gpuwatch_core::hardware::monitor::MonitorView;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gpuwatch_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let source: Arc<dyn SnapshotSource> = match &config.source_url {
        Some(url) => {
            let http = HttpSource::new(url.as_str()).unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to build HTTP client");
                std::process::exit(1);
            });
            tracing::info!(url = %http.url(), "Using remote stats endpoint");
            Arc::new(http)
        }
        None => {
            let nvml = NvmlSource::new();
            tracing::info!(gpu_count = nvml.gpu_count(), "GPU detection complete");
            Arc::new(nvml)
        }
    };

    tracing::info!(
        interval_ms = config.monitor.poll_interval_ms,
        custom_thresholds = config.monitor.threshold_table.is_some(),
        "Starting gpuwatch-agent",
    );

    let mut engine = Engine::new(config.monitor, source).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Engine rejected configuration");
        std::process::exit(1);
    });

    engine.start();

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    };
    engine.watch_until(shutdown, log_view).await;

    engine.stop().await;
}

fn log_view(view: &MonitorView) {
    let present = view.gpus.iter().filter(|g| g.present).count();
    let open_alerts = view.open_alerts().count();

    match &view.last_error {
        Some(error) => tracing::warn!(
            cycle = view.cycle,
            error = %error,
            last_success_at = ?view.last_success_at,
            "Cycle failed; showing last good view",
        ),
        None => tracing::info!(
            cycle = view.cycle,
            gpus = present,
            open_alerts,
            alerts = view.alerts.len(),
            "View updated",
        ),
    }

    for gpu in &view.gpus {
        tracing::debug!(
            gpu_index = gpu.reading.gpu_index,
            name = %gpu.reading.name,
            present = gpu.present,
            temperature = gpu.reading.temperature_celsius,
            peak_temperature = gpu.peak_temperature,
            temperature_rate = gpu.temperature_rate,
            "GPU state",
        );
    }
}
