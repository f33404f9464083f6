//! Subcommand handlers

pub mod cluster;
pub mod flavors;
pub mod image;
pub mod s3;

use anyhow::{Context, Result};
use nano_lib::{ClusterManager, ContainerEngine, DockerEngine};
use std::sync::Arc;

use crate::output::TerminalProgress;

/// Environment variable selecting the image registry.
pub const REGISTRY_ENV: &str = "CN_REGISTRY";

/// Value of `CN_REGISTRY`, if set and non-empty.
pub fn registry() -> Option<String> {
    std::env::var(REGISTRY_ENV).ok().filter(|v| !v.is_empty())
}

/// Connect to the local container engine.
pub fn engine() -> Result<Arc<dyn ContainerEngine>> {
    let engine = DockerEngine::connect().context("Failed to connect to the Docker daemon")?;
    Ok(Arc::new(engine))
}

/// Cluster manager printing its progress on the terminal.
pub fn manager() -> Result<ClusterManager> {
    Ok(ClusterManager::builder(engine()?)
        .progress(Arc::new(TerminalProgress))
        .build()?)
}
