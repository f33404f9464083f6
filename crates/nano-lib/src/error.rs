//! Error types for cluster operations.
//!
//! Every fallible call in the library returns [`NanoError`]. The binary maps
//! errors to process exit codes through [`NanoError::exit_code`], which keeps
//! the "cluster does not exist" and "cluster is not running" preconditions
//! out of the failure path.

use thiserror::Error;

/// Result type for library operations.
pub type Result<T> = std::result::Result<T, NanoError>;

/// Errors that can occur while managing a cluster.
#[derive(Debug, Error)]
pub enum NanoError {
    /// The cluster has no container at all.
    #[error("Cluster {0} does not exist yet.")]
    ClusterAbsent(String),

    /// The cluster container exists but is created or exited.
    #[error("Cluster {0} is not running.")]
    ClusterNotRunning(String),

    /// A key required by the resolved flavor is missing.
    #[error("{key} value in flavor {flavor} doesn't exist")]
    ConfigurationMissing {
        /// The flavor being resolved.
        flavor: String,
        /// The missing key.
        key: String,
    },

    /// The requested flavor is not defined anywhere.
    #[error("flavor {0} doesn't exist")]
    UnknownFlavor(String),

    /// A human readable byte quantity could not be parsed.
    #[error("Wrong unit passed: {value}. Please refer to https://en.wikipedia.org/wiki/Byte. ({reason})")]
    InvalidSize {
        /// The offending input.
        value: String,
        /// Why parsing failed.
        reason: String,
    },

    /// A safety check on user supplied input failed.
    #[error("{0}")]
    Validation(String),

    /// The whole port range is in use.
    #[error("Unable to find a port between {start} and {end} for the {service} endpoint.")]
    NoPortAvailable {
        /// Service name, e.g. "S3" or "UI".
        service: String,
        /// First port of the range.
        start: u16,
        /// Last port of the range (inclusive).
        end: u16,
    },

    /// The work directory is not shared with the engine's VM.
    #[error(
        "It looks like you need to use the --work-dir option.\n\
         This typically happens when Docker is not running natively (e.g: Docker for Mac/Windows).\n\
         The path {path} is not shared from the host and is not known to Docker.\n\
         You can configure shared paths from Docker -> Preferences... -> File Sharing.\n\
         Alternatively, use the --work-dir option to point to an already shared directory."
    )]
    MountNotShared {
        /// The host path that could not be mounted.
        path: String,
    },

    /// The daemon inside the container never became ready.
    #[error("{phase} for cluster {cluster} timed out. Please open an issue at: https://github.com/ceph/cn with the logs above.")]
    ReadinessTimeout {
        /// Cluster short name.
        cluster: String,
        /// Which wait phase expired.
        phase: String,
        /// Logs captured when the wait gave up.
        logs: String,
    },

    /// A destructive operation was invoked without its confirmation flag.
    #[error("Purge option is too dangerous please set the right flag (--yes-i-am-sure).")]
    ConfirmationRequired,

    /// Output from the container did not have the expected shape.
    #[error("unexpected output from {source_name}: {reason}")]
    Parse {
        /// What produced the output.
        source_name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A host tool could not be run or failed.
    #[error("{tool}: {reason}")]
    HostTool {
        /// The binary that was invoked.
        tool: String,
        /// The failure description.
        reason: String,
    },

    /// Container engine API error.
    #[error("Docker API error: {0}")]
    Engine(#[from] bollard::errors::Error),

    /// Configuration source error.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NanoError {
    /// Creates a configuration missing error.
    pub fn configuration_missing(flavor: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ConfigurationMissing {
            flavor: flavor.into(),
            key: key.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Creates an invalid size error.
    pub fn invalid_size(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSize {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Creates a readiness timeout error.
    pub fn readiness_timeout(
        cluster: impl Into<String>,
        phase: impl Into<String>,
        logs: impl Into<String>,
    ) -> Self {
        Self::ReadinessTimeout {
            cluster: cluster.into(),
            phase: phase.into(),
            logs: logs.into(),
        }
    }

    /// Creates an unexpected output error.
    pub fn parse(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a host tool error.
    pub fn host_tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HostTool {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for the benign "nothing to do" preconditions.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::ClusterAbsent(_) | Self::ClusterNotRunning(_))
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        if self.is_precondition() {
            0
        } else {
            1
        }
    }

    /// Logs captured alongside the error, if any.
    pub fn captured_logs(&self) -> Option<&str> {
        match self {
            Self::ReadinessTimeout { logs, .. } => Some(logs),
            _ => None,
        }
    }
}
