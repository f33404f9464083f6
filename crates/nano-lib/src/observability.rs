//! Observability infrastructure for cn
//!
//! Provides:
//! - Tracing subscriber setup (plain or JSON, always on stderr)
//! - Structured lifecycle events through [`ClusterLogger`]

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the default level, which is `warn`, or `debug`
/// when `verbose` is set.
pub fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
    };

    // A second init in the same process (tests) keeps the first subscriber.
    let _ = result;
}

/// Structured logger for cluster lifecycle transitions.
#[derive(Debug, Clone)]
pub struct ClusterLogger {
    host: String,
}

impl Default for ClusterLogger {
    fn default() -> Self {
        Self::new(std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()))
    }
}

impl ClusterLogger {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Log a fresh container creation
    pub fn log_created(&self, cluster: &str, image: &str, memory_bytes: i64, cpu_count: i64) {
        info!(
            event = "cluster_created",
            host = %self.host,
            cluster = %cluster,
            image = %image,
            memory_bytes = memory_bytes,
            cpu_count = cpu_count,
            "Created cluster container"
        );
    }

    /// Log the restart of an exited container
    pub fn log_resumed(&self, cluster: &str) {
        info!(
            event = "cluster_resumed",
            host = %self.host,
            cluster = %cluster,
            "Resumed cluster container"
        );
    }

    pub fn log_stopped(&self, cluster: &str) {
        info!(
            event = "cluster_stopped",
            host = %self.host,
            cluster = %cluster,
            "Stopped cluster container"
        );
    }

    pub fn log_purged(&self, cluster: &str, data_removed: bool, image_removed: bool) {
        info!(
            event = "cluster_purged",
            host = %self.host,
            cluster = %cluster,
            data_removed = data_removed,
            image_removed = image_removed,
            "Purged cluster"
        );
    }

    /// Log a cluster that passed both readiness phases
    pub fn log_ready(&self, cluster: &str, s3_endpoint: &str) {
        info!(
            event = "cluster_ready",
            host = %self.host,
            cluster = %cluster,
            s3_endpoint = %s3_endpoint,
            "Cluster is ready"
        );
    }

    pub fn log_readiness_timeout(&self, cluster: &str, phase: &str) {
        warn!(
            event = "readiness_timeout",
            host = %self.host,
            cluster = %cluster,
            phase = %phase,
            "Cluster did not become ready in time"
        );
    }
}
