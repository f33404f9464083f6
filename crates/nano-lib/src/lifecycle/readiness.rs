//! Readiness waits
//!
//! A started container is not a ready cluster. Two fixed-cadence polls run
//! back to back: the container log must show the bootstrap success marker,
//! then the published S3 endpoint must answer HTTP.

use crate::engine::ContainerEngine;
use crate::error::{NanoError, Result};
use crate::identity::ClusterIdentity;
use crate::relay;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::time::Duration;
use tracing::debug;

/// Literal the demo container logs once bootstrap completed.
pub const SUCCESS_MARKER: &str = "SUCCESS";

/// Bounds of the readiness polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// How long to wait for the success marker (default: 60 seconds)
    pub log_timeout: Duration,
    /// How long to wait for the S3 endpoint (default: 20 seconds)
    pub endpoint_timeout: Duration,
    /// Delay between two polls (default: 1 second)
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            log_timeout: Duration::from_secs(60),
            endpoint_timeout: Duration::from_secs(20),
            interval: Duration::from_secs(1),
        }
    }
}

impl ReadinessPolicy {
    fn attempts(&self, timeout: Duration) -> u128 {
        (timeout.as_millis() / self.interval.as_millis().max(1)).max(1)
    }
}

/// Answers whether an HTTP endpoint accepts requests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EndpointProbe: Send + Sync {
    async fn reachable(&self, url: &str) -> bool;
}

/// Probes with a real HTTP GET; any response counts.
#[derive(Debug, Clone)]
pub struct HttpEndpointProbe {
    client: reqwest::Client,
}

impl HttpEndpointProbe {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EndpointProbe for HttpEndpointProbe {
    async fn reachable(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => response.bytes().await.is_ok(),
            Err(e) => {
                debug!(url = %url, error = %e, "Endpoint not reachable yet");
                false
            }
        }
    }
}

/// Poll stdout logs for [`SUCCESS_MARKER`].
///
/// On timeout the error carries stdout and stderr logs.
pub async fn wait_for_health(
    engine: &dyn ContainerEngine,
    identity: &ClusterIdentity,
    policy: &ReadinessPolicy,
) -> Result<()> {
    let name = identity.canonical_name();
    for _ in 0..policy.attempts(policy.log_timeout) {
        if engine.logs(name, false).await?.contains(SUCCESS_MARKER) {
            return Ok(());
        }
        tokio::time::sleep(policy.interval).await;
    }

    let logs = engine.logs(name, true).await?;
    Err(NanoError::readiness_timeout(
        identity.short_name(),
        format!("Health check of container {}", name),
        logs,
    ))
}

/// Poll the S3 endpoint until it answers.
///
/// On timeout the error carries the object gateway log, if any.
pub async fn wait_for_endpoint(
    engine: &dyn ContainerEngine,
    probe: &dyn EndpointProbe,
    identity: &ClusterIdentity,
    url: &str,
    policy: &ReadinessPolicy,
) -> Result<()> {
    for _ in 0..policy.attempts(policy.endpoint_timeout) {
        if probe.reachable(url).await {
            return Ok(());
        }
        tokio::time::sleep(policy.interval).await;
    }

    let logs = rgw_log(engine, identity).await?;
    Err(NanoError::readiness_timeout(
        identity.short_name(),
        format!("S3 endpoint check on {}", url),
        logs,
    ))
}

/// Object gateway log of the cluster; empty when the file does not exist.
pub async fn rgw_log(engine: &dyn ContainerEngine, identity: &ClusterIdentity) -> Result<String> {
    let output = relay::exec(engine, identity, &["cat".to_string(), identity.rgw_log_path()]).await?;
    if output.contains("No such file or directory") {
        return Ok(String::new());
    }
    Ok(output)
}
