//! Docker implementation of [`ContainerEngine`] via bollard

use super::{
    AttachedExec, ContainerDetails, ContainerEngine, ContainerSummary, CreateSpec, ImageDetails,
    PullOutcome,
};
use crate::error::{NanoError, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, RestartContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, RemoveImageOptions};
use bollard::service::{HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Engine backed by the local Docker daemon.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using `DOCKER_HOST` or the platform's default socket.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn log_bytes(output: LogOutput) -> Vec<u8> {
    match output {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::Console { message }
        | LogOutput::StdIn { message } => message.to_vec(),
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                names: c.names.unwrap_or_default(),
                state: c.state.unwrap_or_default(),
                status: c.status.unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                image_id: c.image_id.unwrap_or_default(),
            })
            .collect())
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<String> {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .ports
            .iter()
            .map(|p| (format!("{}/tcp", p.container_port), HashMap::new()))
            .collect();

        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
            .ports
            .iter()
            .map(|p| {
                let binding = PortBinding {
                    host_ip: Some(p.host_ip.clone()),
                    host_port: Some(p.host_port.to_string()),
                };
                (format!("{}/tcp", p.container_port), Some(vec![binding]))
            })
            .collect();

        let volumes: HashMap<String, HashMap<(), ()>> = spec
            .volumes
            .iter()
            .map(|v| (v.clone(), HashMap::new()))
            .collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds: Some(spec.binds.clone()),
            memory: Some(spec.memory_bytes),
            nano_cpus: Some(spec.cpu_count * 1_000_000_000),
            privileged: Some(spec.privileged),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            hostname: Some(spec.hostname.clone()),
            env: Some(spec.env.clone()),
            exposed_ports: Some(exposed_ports),
            volumes: Some(volumes),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;
        debug!(container = %spec.name, id = %response.id, "Created container");
        Ok(response.id)
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, name: &str, grace: Duration) -> Result<()> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        self.docker.stop_container(name, Some(options)).await?;
        Ok(())
    }

    async fn restart_container(&self, name: &str, grace: Duration) -> Result<()> {
        let options = RestartContainerOptions {
            t: grace.as_secs() as isize,
        };
        self.docker.restart_container(name, Some(options)).await?;
        Ok(())
    }

    async fn remove_container(&self, name: &str, remove_volumes: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: remove_volumes,
            ..Default::default()
        };
        self.docker.remove_container(name, Some(options)).await?;
        Ok(())
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails> {
        let inspect = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await?;

        let config = inspect.config.unwrap_or_default();
        let binds = inspect
            .host_config
            .and_then(|hc| hc.binds)
            .unwrap_or_default();

        Ok(ContainerDetails {
            image: config.image.unwrap_or_default(),
            env: config.env.unwrap_or_default(),
            binds,
        })
    }

    async fn inspect_image(&self, image: &str) -> Result<Option<ImageDetails>> {
        match self.docker.inspect_image(image).await {
            Ok(inspect) => {
                let release = inspect
                    .config
                    .as_ref()
                    .and_then(|c| c.labels.as_ref())
                    .or_else(|| {
                        inspect
                            .container_config
                            .as_ref()
                            .and_then(|c| c.labels.as_ref())
                    })
                    .and_then(|labels| labels.get("RELEASE"))
                    .filter(|release| !release.is_empty())
                    .cloned();

                Ok(Some(ImageDetails {
                    repo_tags: inspect.repo_tags.unwrap_or_default(),
                    repo_digests: inspect.repo_digests.unwrap_or_default(),
                    created: inspect.created.unwrap_or_default(),
                    release,
                }))
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<PullOutcome> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        let mut outcome = PullOutcome::default();

        while let Some(result) = stream.next().await {
            let info = result?;
            if let Some(status) = info.status {
                debug!(image = %image, status = %status, "Pull progress");
                outcome.last_status = Some(status);
            }
        }

        Ok(outcome)
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };
        self.docker.remove_image(image, Some(options), None).await?;
        Ok(())
    }

    async fn logs(&self, name: &str, include_stderr: bool) -> Result<String> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: include_stderr,
            ..Default::default()
        };

        let mut stream = self.docker.logs(name, Some(options));
        let mut output = String::new();

        while let Some(result) = stream.next().await {
            output.push_str(&result?.to_string());
        }

        Ok(output)
    }

    async fn exec(&self, name: &str, argv: Vec<String>) -> Result<String> {
        debug!(container = %name, cmd = ?argv, "Executing command");

        let exec_options = CreateExecOptions {
            cmd: Some(argv),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self.docker.create_exec(name, exec_options).await?;
        let start_result = self.docker.start_exec(&exec.id, None).await?;

        let mut output = Vec::new();
        if let StartExecResults::Attached { output: mut stream, .. } = start_result {
            while let Some(chunk) = stream.next().await {
                output.extend(log_bytes(chunk?));
            }
        }

        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    async fn exec_interactive(&self, name: &str, argv: Vec<String>) -> Result<AttachedExec> {
        let exec_options = CreateExecOptions {
            cmd: Some(argv),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(true),
            ..Default::default()
        };

        let exec = self.docker.create_exec(name, exec_options).await?;
        let start_options = StartExecOptions {
            detach: false,
            tty: true,
            ..Default::default()
        };

        match self.docker.start_exec(&exec.id, Some(start_options)).await? {
            StartExecResults::Attached { output, input } => Ok(AttachedExec {
                exec_id: exec.id,
                output: Box::pin(output.map(|chunk| chunk.map(log_bytes).map_err(NanoError::from))),
                input,
            }),
            StartExecResults::Detached => Err(NanoError::parse(
                "exec session",
                "engine returned a detached session",
            )),
        }
    }

    async fn resize_exec(&self, exec_id: &str, cols: u16, rows: u16) -> Result<()> {
        let options = ResizeExecOptions {
            height: rows,
            width: cols,
        };
        self.docker.resize_exec(exec_id, options).await?;
        Ok(())
    }
}

/// Turn a container start failure into an actionable error.
///
/// Docker Desktop rejects bind mounts of paths that are not shared with its
/// VM. The daemon reports this as a plain server error, so beyond the status
/// code the only signal is the "Mounts denied" wording of the message. This
/// is a heuristic tied to Docker's current text.
pub fn classify_start_error(error: NanoError, work_dir: &str) -> NanoError {
    match error {
        NanoError::Engine(bollard::errors::Error::DockerResponseServerError {
            status_code,
            ref message,
        }) if status_code >= 400 && message.contains("Mounts denied") => {
            NanoError::MountNotShared {
                path: work_dir.to_string(),
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error(status_code: u16, message: &str) -> NanoError {
        NanoError::Engine(bollard::errors::Error::DockerResponseServerError {
            status_code,
            message: message.to_string(),
        })
    }

    #[test]
    fn test_mounts_denied_is_rewritten() {
        let err = classify_start_error(
            server_error(
                500,
                "Mounts denied: The path /usr/share/ceph-nano is not shared from OS X",
            ),
            "/usr/share/ceph-nano",
        );
        match err {
            NanoError::MountNotShared { path } => assert_eq!(path, "/usr/share/ceph-nano"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err = classify_start_error(server_error(500, "no space left on device"), "/w");
        assert!(matches!(err, NanoError::Engine(_)));

        let err = classify_start_error(NanoError::ConfirmationRequired, "/w");
        assert!(matches!(err, NanoError::ConfirmationRequired));
    }

    #[test]
    fn test_log_bytes_keeps_both_streams() {
        let out = log_bytes(LogOutput::StdOut {
            message: "out".into(),
        });
        let err = log_bytes(LogOutput::StdErr {
            message: "err".into(),
        });
        assert_eq!(out, b"out");
        assert_eq!(err, b"err");
    }
}
