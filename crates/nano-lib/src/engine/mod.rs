//! Container engine capability
//!
//! The orchestrator only talks to the engine through [`ContainerEngine`].
//! [`docker::DockerEngine`] is the production implementation; tests use the
//! generated `MockContainerEngine`.

pub mod docker;

pub use docker::{classify_start_error, DockerEngine};

use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
#[cfg(test)]
use mockall::automock;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncWrite;

/// A container as reported by the engine's list call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSummary {
    /// Names as reported by the engine, usually with a leading `/`.
    pub names: Vec<String>,
    /// Engine state string: `created`, `running`, `exited`, ...
    pub state: String,
    /// Human readable status line.
    pub status: String,
    /// Image reference the container was created from.
    pub image: String,
    /// Image id the container was created from.
    pub image_id: String,
}

impl ContainerSummary {
    /// Whether one of the container's names is exactly `name`.
    pub fn has_name(&self, name: &str) -> bool {
        self.names
            .iter()
            .any(|candidate| candidate.trim_start_matches('/') == name)
    }
}

/// A published port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
}

/// Everything needed to create a cluster container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateSpec {
    pub name: String,
    pub image: String,
    pub hostname: String,
    pub env: Vec<String>,
    /// Anonymous volumes (container paths).
    pub volumes: Vec<String>,
    /// `host:container` bind mounts. The first one is always the work dir.
    pub binds: Vec<String>,
    pub ports: Vec<PortMapping>,
    pub memory_bytes: i64,
    pub cpu_count: i64,
    pub privileged: bool,
}

/// What the orchestrator needs to know about an existing container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerDetails {
    pub image: String,
    pub env: Vec<String>,
    pub binds: Vec<String>,
}

impl ContainerDetails {
    /// Value of an environment variable recorded at creation.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env.iter().find_map(|entry| {
            entry
                .split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }

    /// Host side of the first bind mount.
    pub fn work_directory(&self) -> Option<&str> {
        self.binds
            .first()
            .and_then(|bind| bind.split(':').next())
    }
}

/// Image metadata used by the listing commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageDetails {
    pub repo_tags: Vec<String>,
    pub repo_digests: Vec<String>,
    pub created: String,
    /// The `RELEASE` label, if the image carries one.
    pub release: Option<String>,
}

/// Result of an image pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullOutcome {
    /// Last status line the engine reported.
    pub last_status: Option<String>,
}

/// Output stream of an attached exec session.
pub type ExecOutputStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Input side of an attached exec session.
pub type ExecInput = Pin<Box<dyn AsyncWrite + Send>>;

/// An interactive exec session with a TTY.
pub struct AttachedExec {
    pub exec_id: String,
    pub output: ExecOutputStream,
    pub input: ExecInput,
}

impl std::fmt::Debug for AttachedExec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedExec")
            .field("exec_id", &self.exec_id)
            .finish_non_exhaustive()
    }
}

/// Capabilities the cluster orchestrator needs from a container engine.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// List containers; `all` includes stopped ones.
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>>;

    /// Create a container and return its id.
    async fn create_container(&self, spec: &CreateSpec) -> Result<String>;

    async fn start_container(&self, name: &str) -> Result<()>;

    /// Stop, killing after `grace`.
    async fn stop_container(&self, name: &str, grace: Duration) -> Result<()>;

    async fn restart_container(&self, name: &str, grace: Duration) -> Result<()>;

    /// Force remove, optionally with anonymous volumes.
    async fn remove_container(&self, name: &str, remove_volumes: bool) -> Result<()>;

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails>;

    /// `None` when the image is not present locally.
    async fn inspect_image(&self, image: &str) -> Result<Option<ImageDetails>>;

    async fn pull_image(&self, image: &str) -> Result<PullOutcome>;

    /// Force remove an image.
    async fn remove_image(&self, image: &str) -> Result<()>;

    /// Container logs; stdout only unless `include_stderr`.
    async fn logs(&self, name: &str, include_stderr: bool) -> Result<String>;

    /// Run a command and return everything it wrote to stdout and stderr.
    async fn exec(&self, name: &str, argv: Vec<String>) -> Result<String>;

    /// Start a command with a TTY and stdin attached.
    async fn exec_interactive(&self, name: &str, argv: Vec<String>) -> Result<AttachedExec>;

    async fn resize_exec(&self, exec_id: &str, cols: u16, rows: u16) -> Result<()>;
}
