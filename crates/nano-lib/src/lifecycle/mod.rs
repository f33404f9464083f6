//! Cluster lifecycle orchestration
//!
//! [`ClusterManager`] drives one cluster container through
//! `Absent -> Running -> Exited -> Running -> Absent`. Every decision is
//! taken from a fresh engine query; nothing is remembered between calls.
//!
//! Two invocations on the same cluster are not synchronized: the leftover
//! removal, the "already running" check and port allocation are all
//! check-then-act against external state.

mod info;
pub mod readiness;

pub use info::{parse_user_details, ui_endpoint, ClusterInfo, USER_DETAILS_PATH};
pub use readiness::{EndpointProbe, HttpEndpointProbe, ReadinessPolicy};

use crate::config::NanoConfig;
use crate::context::ExecutionContext;
use crate::engine::{classify_start_error, ContainerEngine, CreateSpec, PortMapping};
use crate::error::{NanoError, Result};
use crate::identity::ClusterIdentity;
use crate::observability::ClusterLogger;
use crate::ports::{self, PortProbe, TcpPortProbe, RGW_PORTS, UI_PORTS};
use crate::prober::{self, ContainerState};
use crate::relay;
use crate::storage::{self, FileKind, HostProbe, StorageBinding, SystemHost};
use crate::net;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Grace period before a stopping container is killed.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Container side of the work directory bind.
pub const CONTAINER_WORK_DIR: &str = "/tmp/";

/// UID of the S3 user the demo container creates.
const DEMO_UID: &str = "nano";

/// Receives the user-facing progress lines of long operations.
pub trait ProgressReporter: Send + Sync {
    fn progress(&self, message: &str);
}

/// Prints progress lines on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleProgress;

impl ProgressReporter for ConsoleProgress {
    fn progress(&self, message: &str) {
        println!("{}", message);
    }
}

/// How `start` got the cluster running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Created,
    Resumed,
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    pub outcome: StartOutcome,
    pub info: ClusterInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
}

/// What a purge removed besides the container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PurgeReport {
    /// Backing directory that was deleted.
    pub data_removed: Option<PathBuf>,
    /// Image that was deleted.
    pub image_removed: Option<String>,
}

/// Result of `cn image update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageUpdate {
    Downloaded,
    UpToDate,
    /// The engine reported something else, or nothing.
    Unknown(Option<String>),
}

impl ImageUpdate {
    fn from_status(image: &str, status: Option<String>) -> Self {
        match status {
            Some(s) if s.contains(&format!("Downloaded newer image for {}", image)) => {
                Self::Downloaded
            }
            Some(s) if s.contains(&format!("Image is up to date for {}", image)) => Self::UpToDate,
            other => Self::Unknown(other),
        }
    }
}

/// One row of `cn cluster ls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterListing {
    pub name: String,
    pub status: String,
    pub image: String,
    pub image_release: String,
    pub image_created: String,
}

const IMAGE_MISSING: &str = "image is not present, did you remove it?";
const RELEASE_UNKNOWN: &str = "unknown image release, are you running an official image?";

/// Builder for [`ClusterManager`]; every host-facing collaborator defaults
/// to the real implementation.
pub struct ClusterManagerBuilder {
    engine: Arc<dyn ContainerEngine>,
    host: Option<Arc<dyn HostProbe>>,
    ports: Option<Arc<dyn PortProbe>>,
    endpoint: Option<Arc<dyn EndpointProbe>>,
    policy: ReadinessPolicy,
    advertised_ip: Option<Ipv4Addr>,
    logger: ClusterLogger,
    progress: Arc<dyn ProgressReporter>,
}

impl ClusterManagerBuilder {
    pub fn host_probe(mut self, host: Arc<dyn HostProbe>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn port_probe(mut self, ports: Arc<dyn PortProbe>) -> Self {
        self.ports = Some(ports);
        self
    }

    pub fn endpoint_probe(mut self, endpoint: Arc<dyn EndpointProbe>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn readiness_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Address shown in endpoints; discovered from the interfaces otherwise.
    pub fn advertised_ip(mut self, ip: Ipv4Addr) -> Self {
        self.advertised_ip = Some(ip);
        self
    }

    pub fn logger(mut self, logger: ClusterLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn build(self) -> Result<ClusterManager> {
        let endpoint = match self.endpoint {
            Some(endpoint) => endpoint,
            None => Arc::new(HttpEndpointProbe::new()?),
        };

        Ok(ClusterManager {
            engine: self.engine,
            host: self.host.unwrap_or_else(|| Arc::new(SystemHost)),
            ports: self
                .ports
                .unwrap_or_else(|| Arc::new(TcpPortProbe::default())),
            endpoint,
            policy: self.policy,
            advertised_ip: self.advertised_ip,
            logger: self.logger,
            progress: self.progress,
        })
    }
}

/// Runs lifecycle operations against one container engine.
pub struct ClusterManager {
    engine: Arc<dyn ContainerEngine>,
    host: Arc<dyn HostProbe>,
    ports: Arc<dyn PortProbe>,
    endpoint: Arc<dyn EndpointProbe>,
    policy: ReadinessPolicy,
    advertised_ip: Option<Ipv4Addr>,
    logger: ClusterLogger,
    progress: Arc<dyn ProgressReporter>,
}

impl ClusterManager {
    pub fn builder(engine: Arc<dyn ContainerEngine>) -> ClusterManagerBuilder {
        ClusterManagerBuilder {
            engine,
            host: None,
            ports: None,
            endpoint: None,
            policy: ReadinessPolicy::default(),
            advertised_ip: None,
            logger: ClusterLogger::default(),
            progress: Arc::new(ConsoleProgress),
        }
    }

    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }

    fn say(&self, message: impl AsRef<str>) {
        self.progress.progress(message.as_ref());
    }

    fn ip(&self) -> Result<Ipv4Addr> {
        match self.advertised_ip {
            Some(ip) => Ok(ip),
            None => net::preferred_ipv4(),
        }
    }

    /// Bring the cluster to `Running` and wait until it serves S3.
    ///
    /// A leftover `Created` container from a failed run is removed first.
    pub async fn start(
        &self,
        identity: &ClusterIdentity,
        ctx: &ExecutionContext,
        config: &NanoConfig,
    ) -> Result<StartReport> {
        let name = identity.canonical_name();
        let mut state = prober::status(self.engine.as_ref(), identity).await?;

        if state == ContainerState::Created {
            debug!(cluster = %identity, "Removing leftover container");
            self.engine.remove_container(name, true).await?;
            state = ContainerState::Absent;
        }

        let outcome = match state {
            ContainerState::Running => {
                self.say(format!("Cluster {} is already running!", identity));
                StartOutcome::AlreadyRunning
            }
            ContainerState::Exited => {
                self.say(format!("Starting cluster {}...", identity));
                self.engine.start_container(name).await?;
                self.logger.log_resumed(identity.short_name());
                StartOutcome::Resumed
            }
            ContainerState::Absent | ContainerState::Created => {
                self.create(identity, ctx, config).await?;
                StartOutcome::Created
            }
        };

        let info = self.wait_until_ready(identity).await?;
        Ok(StartReport { outcome, info })
    }

    async fn create(
        &self,
        identity: &ClusterIdentity,
        ctx: &ExecutionContext,
        config: &NanoConfig,
    ) -> Result<()> {
        let profile = ctx.effective_profile(config)?;
        let image = ctx.effective_image(config);

        self.ensure_image(&image).await?;

        let probe = self.ports.clone();
        let (rgw_port, ui_port) = blocking(move || {
            let rgw = ports::allocate(probe.as_ref(), "S3", RGW_PORTS)?;
            let ui = ports::allocate(probe.as_ref(), "UI", UI_PORTS)?;
            Ok((rgw, ui))
        })
        .await?;

        let binding = if profile.data.is_empty() {
            StorageBinding::default()
        } else {
            let host = self.host.clone();
            let data = PathBuf::from(&profile.data);
            let size = profile.size.clone();
            blocking(move || {
                let descriptor = storage::classify(host.as_ref(), &data)?;
                storage::validate(&descriptor)?;
                storage::prepare(host.as_ref(), &descriptor, &size)
            })
            .await?
        };

        let ip = self.ip()?;
        let mut env = vec![
            format!("RGW_CIVETWEB_PORT={}", rgw_port),
            format!("SREE_PORT={}", ui_port),
            format!("EXPOSED_IP={}", ip),
            "DEBUG=verbose".to_string(),
            format!("CEPH_DEMO_UID={}", DEMO_UID),
            "MON_IP=127.0.0.1".to_string(),
            "CEPH_PUBLIC_NETWORK=0.0.0.0/0".to_string(),
            "CEPH_DAEMON=demo".to_string(),
            "DEMO_DAEMONS=mon,mgr,osd,rgw".to_string(),
            "SREE_VERSION=v0.1".to_string(),
        ];
        env.extend(binding.env);
        if let Some(fragment) = profile.ceph_conf_fragment() {
            env.push(format!("EXTRA_CEPH_CONF={}", fragment));
        }

        let mut binds = vec![format!("{}:{}", profile.work_directory, CONTAINER_WORK_DIR)];
        binds.extend(binding.binds);

        let spec = CreateSpec {
            name: identity.canonical_name().to_string(),
            image: image.clone(),
            hostname: identity.hostname(),
            env,
            volumes: vec!["/etc/ceph".to_string(), "/var/lib/ceph".to_string()],
            binds,
            ports: [rgw_port, ui_port]
                .into_iter()
                .map(|port| PortMapping {
                    host_ip: "0.0.0.0".to_string(),
                    host_port: port,
                    container_port: port,
                })
                .collect(),
            memory_bytes: profile.memory_bytes,
            cpu_count: profile.cpu_count,
            privileged: profile.privileged || binding.privileged,
        };

        self.say(format!(
            "Running cluster {} ({} Memory / {} CPU) ...",
            identity, profile.memory_size, profile.cpu_count
        ));

        self.engine
            .create_container(&spec)
            .await
            .map_err(|e| classify_start_error(e, &profile.work_directory))?;
        self.engine
            .start_container(&spec.name)
            .await
            .map_err(|e| classify_start_error(e, &profile.work_directory))?;

        self.logger
            .log_created(identity.short_name(), &image, spec.memory_bytes, spec.cpu_count);
        Ok(())
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.engine.inspect_image(image).await?.is_some() {
            return Ok(());
        }
        self.say(format!(
            "The container image ({}) is not present, pulling it. \nThis operation can take a few minutes.",
            image
        ));
        self.engine.pull_image(image).await?;
        Ok(())
    }

    /// Wait for both readiness phases, then gather connection details.
    pub async fn wait_until_ready(&self, identity: &ClusterIdentity) -> Result<ClusterInfo> {
        let engine = self.engine.as_ref();
        let details = engine.inspect_container(identity.canonical_name()).await?;
        let rgw_port = details
            .env_value("RGW_CIVETWEB_PORT")
            .ok_or_else(|| NanoError::parse("container environment", "RGW_CIVETWEB_PORT is not set"))?;
        let ip = self.ip()?;
        let s3_endpoint = format!("http://{}:{}", ip, rgw_port);

        let waited = async {
            readiness::wait_for_health(engine, identity, &self.policy).await?;
            readiness::wait_for_endpoint(
                engine,
                self.endpoint.as_ref(),
                identity,
                &s3_endpoint,
                &self.policy,
            )
            .await
        }
        .await;
        if let Err(NanoError::ReadinessTimeout { phase, .. }) = &waited {
            self.logger.log_readiness_timeout(identity.short_name(), phase);
        }
        waited?;

        let user_details = relay::exec(engine, identity, &["cat", USER_DETAILS_PATH]).await?;
        let (access_key, secret_key) = parse_user_details(&user_details)?;
        let health = relay::exec(engine, identity, &["ceph", "health"]).await?;

        self.logger.log_ready(identity.short_name(), &s3_endpoint);
        Ok(ClusterInfo {
            cluster: identity.short_name().to_string(),
            health: health.trim().to_string(),
            work_directory: details.work_directory().unwrap_or_default().to_string(),
            access_key,
            secret_key,
            ui_endpoint: ui_endpoint(&ip.to_string(), details.env_value("SREE_PORT")),
            s3_endpoint,
        })
    }

    /// Stop a running cluster; exited clusters are left alone.
    pub async fn stop(&self, identity: &ClusterIdentity) -> Result<StopOutcome> {
        match prober::status(self.engine.as_ref(), identity).await? {
            ContainerState::Exited => {
                self.say(format!("Cluster {} is already stopped.", identity));
                Ok(StopOutcome::AlreadyStopped)
            }
            ContainerState::Absent => Err(NanoError::ClusterAbsent(identity.to_string())),
            ContainerState::Created => Err(NanoError::ClusterNotRunning(identity.to_string())),
            ContainerState::Running => {
                self.say(format!("Stopping cluster {}...", identity));
                self.engine
                    .stop_container(identity.canonical_name(), STOP_GRACE)
                    .await?;
                self.logger.log_stopped(identity.short_name());
                Ok(StopOutcome::Stopped)
            }
        }
    }

    pub async fn restart(&self, identity: &ClusterIdentity) -> Result<ClusterInfo> {
        prober::require_exists(self.engine.as_ref(), identity).await?;
        self.say(format!("Restarting cluster {}...", identity));
        self.engine
            .restart_container(identity.canonical_name(), STOP_GRACE)
            .await?;
        self.wait_until_ready(identity).await
    }

    /// Connection details of a running cluster.
    pub async fn status(&self, identity: &ClusterIdentity) -> Result<ClusterInfo> {
        prober::require_running(self.engine.as_ref(), identity).await?;
        self.wait_until_ready(identity).await
    }

    /// Remove the container, its backing directory and optionally its image.
    ///
    /// Refuses to touch anything unless `confirmed`. A backing directory
    /// that cannot be deleted is reported and skipped.
    pub async fn purge(
        &self,
        identity: &ClusterIdentity,
        confirmed: bool,
        delete_image: bool,
    ) -> Result<PurgeReport> {
        if !confirmed {
            return Err(NanoError::ConfirmationRequired);
        }
        prober::require_exists(self.engine.as_ref(), identity).await?;

        self.say(format!("Purging cluster {}...", identity));
        let name = identity.canonical_name();
        let details = self.engine.inspect_container(name).await?;
        self.engine.remove_container(name, true).await?;

        let mut report = PurgeReport::default();
        if let Some(data) = details.env_value("OSD_PATH") {
            report.data_removed = self.remove_backing_directory(Path::new(data));
        }

        if delete_image {
            self.say(format!("Removing container image {}...", details.image));
            match self.engine.remove_image(&details.image).await {
                Ok(()) => report.image_removed = Some(details.image.clone()),
                Err(e) => warn!(image = %details.image, error = %e, "Failed to remove image"),
            }
        }

        self.logger.log_purged(
            identity.short_name(),
            report.data_removed.is_some(),
            report.image_removed.is_some(),
        );
        Ok(report)
    }

    fn remove_backing_directory(&self, path: &Path) -> Option<PathBuf> {
        if path == Path::new("/dev") {
            return None;
        }
        match self.host.file_kind(path) {
            Ok(FileKind::Directory) => {}
            Ok(_) => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot inspect backing store");
                return None;
            }
        }

        match std::fs::remove_dir_all(path) {
            Ok(()) => Some(path.to_path_buf()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove backing directory");
                self.say(format!(
                    "Something went wrong while removing {}.\nYou need to purge the directory manually, next time run me as 'root' to avoid that.",
                    path.display()
                ));
                None
            }
        }
    }

    /// Object gateway log of the cluster.
    pub async fn logs(&self, identity: &ClusterIdentity) -> Result<String> {
        prober::require_exists(self.engine.as_ref(), identity).await?;
        readiness::rgw_log(self.engine.as_ref(), identity).await
    }

    /// Every cluster container with its image metadata.
    pub async fn list(&self) -> Result<Vec<ClusterListing>> {
        let mut rows = Vec::new();
        for (identity, summary) in prober::list_clusters(self.engine.as_ref()).await? {
            let image_id = summary
                .image_id
                .strip_prefix("sha256:")
                .unwrap_or(&summary.image_id);

            let (image, image_release, image_created) =
                match self.engine.inspect_image(image_id).await? {
                    Some(details) => {
                        let image = details
                            .repo_tags
                            .first()
                            .cloned()
                            .unwrap_or_else(|| details.repo_digests.concat());
                        let release = details
                            .release
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| RELEASE_UNKNOWN.to_string());
                        (image, release, details.created)
                    }
                    None => (
                        IMAGE_MISSING.to_string(),
                        IMAGE_MISSING.to_string(),
                        IMAGE_MISSING.to_string(),
                    ),
                };

            rows.push(ClusterListing {
                name: identity.short_name().to_string(),
                status: summary.state,
                image,
                image_release,
                image_created,
            });
        }
        Ok(rows)
    }

    /// Interactive bash inside a running cluster.
    pub async fn enter(&self, identity: &ClusterIdentity) -> Result<()> {
        prober::require_running(self.engine.as_ref(), identity).await?;
        relay::enter(self.engine.clone(), identity).await
    }

    /// Pull `image` again and report whether anything changed.
    pub async fn update_image(&self, image: &str) -> Result<ImageUpdate> {
        let outcome = self.engine.pull_image(image).await?;
        Ok(ImageUpdate::from_status(image, outcome.last_status))
    }
}

pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| NanoError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}
