//! Prometheus exporter and metric descriptions.
//!
//! Counters emitted by the crate:
//! - `taskgate_errors_total{code,category}`
//! - `taskgate_authz_decisions_total{check,outcome}`
//! - `taskgate_audit_writes_total{result}`

use std::net::SocketAddr;

use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Deserialize;

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether the Prometheus exporter is installed
    #[serde(default)]
    pub enabled: bool,

    /// Address the scrape endpoint listens on
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:9090".to_string()
}

/// Install the Prometheus exporter when enabled. Returns whether it was.
pub fn init_metrics(config: &MetricsConfig) -> anyhow::Result<bool> {
    if !config.enabled {
        return Ok(false);
    }

    let listen: SocketAddr = config.listen.parse()?;
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()?;
    register_metric_descriptions();

    tracing::info!(listen = %listen, "Prometheus exporter installed");
    Ok(true)
}

fn register_metric_descriptions() {
    describe_counter!("taskgate_errors_total", "Errors returned to callers, by code");
    describe_counter!(
        "taskgate_authz_decisions_total",
        "Authorization decisions, by check and outcome"
    );
    describe_counter!("taskgate_audit_writes_total", "Audit entry writes, by result");
}
