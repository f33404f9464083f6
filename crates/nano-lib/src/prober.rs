//! Container state probing and precondition guards
//!
//! State is never cached: every call asks the engine again.

use crate::engine::{ContainerEngine, ContainerSummary};
use crate::error::{NanoError, Result};
use crate::identity::ClusterIdentity;
use std::fmt;

/// Lifecycle state of a cluster container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Absent,
    Created,
    Exited,
    Running,
}

impl ContainerState {
    /// Map an engine state string to a cluster state.
    pub fn from_engine_state(state: &str) -> Self {
        match state {
            "running" | "restarting" | "paused" => Self::Running,
            "exited" | "dead" => Self::Exited,
            "created" => Self::Created,
            _ => Self::Absent,
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Created => "created",
            Self::Exited => "exited",
            Self::Running => "running",
        };
        f.write_str(s)
    }
}

/// Current state of the cluster, from one list call.
pub async fn status(engine: &dyn ContainerEngine, identity: &ClusterIdentity) -> Result<ContainerState> {
    let containers = engine.list_containers(true).await?;
    Ok(state_of(&containers, identity.canonical_name()))
}

fn state_of(containers: &[ContainerSummary], canonical_name: &str) -> ContainerState {
    containers
        .iter()
        .find(|c| c.has_name(canonical_name))
        .map(|c| ContainerState::from_engine_state(&c.state))
        .unwrap_or(ContainerState::Absent)
}

/// Fail with a precondition when the cluster has no container.
pub async fn require_exists(engine: &dyn ContainerEngine, identity: &ClusterIdentity) -> Result<ContainerState> {
    match status(engine, identity).await? {
        ContainerState::Absent => Err(NanoError::ClusterAbsent(identity.short_name().to_string())),
        state => Ok(state),
    }
}

/// Fail with a precondition unless the cluster is running.
///
/// Callers check existence first, so an absent cluster reports as absent.
pub async fn require_running(engine: &dyn ContainerEngine, identity: &ClusterIdentity) -> Result<()> {
    match status(engine, identity).await? {
        ContainerState::Running => Ok(()),
        ContainerState::Absent => Err(NanoError::ClusterAbsent(identity.short_name().to_string())),
        ContainerState::Created | ContainerState::Exited => Err(NanoError::ClusterNotRunning(
            identity.short_name().to_string(),
        )),
    }
}

/// Every container carrying the cluster prefix.
pub async fn list_clusters(engine: &dyn ContainerEngine) -> Result<Vec<(ClusterIdentity, ContainerSummary)>> {
    let containers = engine.list_containers(true).await?;
    Ok(containers
        .into_iter()
        .filter_map(|c| {
            c.names
                .iter()
                .find_map(|name| ClusterIdentity::from_container_name(name))
                .map(|identity| (identity, c.clone()))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockContainerEngine;
    use mockall::predicate::eq;

    fn summary(name: &str, state: &str) -> ContainerSummary {
        ContainerSummary {
            names: vec![format!("/{}", name)],
            state: state.to_string(),
            ..Default::default()
        }
    }

    fn engine_with(containers: Vec<ContainerSummary>) -> MockContainerEngine {
        let mut engine = MockContainerEngine::new();
        engine
            .expect_list_containers()
            .with(eq(true))
            .returning(move |_| Ok(containers.clone()));
        engine
    }

    #[test]
    fn test_engine_state_mapping() {
        assert_eq!(ContainerState::from_engine_state("running"), ContainerState::Running);
        assert_eq!(ContainerState::from_engine_state("paused"), ContainerState::Running);
        assert_eq!(ContainerState::from_engine_state("exited"), ContainerState::Exited);
        assert_eq!(ContainerState::from_engine_state("dead"), ContainerState::Exited);
        assert_eq!(ContainerState::from_engine_state("created"), ContainerState::Created);
        assert_eq!(ContainerState::from_engine_state("removing"), ContainerState::Absent);
    }

    #[tokio::test]
    async fn test_status_queries_engine_once() {
        let mut engine = MockContainerEngine::new();
        engine
            .expect_list_containers()
            .times(1)
            .returning(|_| Ok(vec![summary("ceph-nano-alpha", "exited")]));

        let state = status(&engine, &ClusterIdentity::new("alpha")).await.unwrap();
        assert_eq!(state, ContainerState::Exited);
    }

    #[tokio::test]
    async fn test_status_ignores_other_clusters() {
        let engine = engine_with(vec![
            summary("ceph-nano-alphabet", "running"),
            summary("postgres", "running"),
        ]);
        let state = status(&engine, &ClusterIdentity::new("alpha")).await.unwrap();
        assert_eq!(state, ContainerState::Absent);
    }

    #[tokio::test]
    async fn test_require_exists() {
        let engine = engine_with(vec![summary("ceph-nano-alpha", "created")]);
        assert_eq!(
            require_exists(&engine, &ClusterIdentity::new("alpha")).await.unwrap(),
            ContainerState::Created
        );

        let err = require_exists(&engine, &ClusterIdentity::new("beta"))
            .await
            .unwrap_err();
        assert!(matches!(err, NanoError::ClusterAbsent(ref name) if name == "beta"));
        assert_eq!(err.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_require_running() {
        let engine = engine_with(vec![
            summary("ceph-nano-up", "running"),
            summary("ceph-nano-down", "exited"),
            summary("ceph-nano-new", "created"),
        ]);

        tokio_test::assert_ok!(require_running(&engine, &ClusterIdentity::new("up")).await);
        for name in ["down", "new"] {
            let err = require_running(&engine, &ClusterIdentity::new(name))
                .await
                .unwrap_err();
            assert!(matches!(err, NanoError::ClusterNotRunning(_)));
            assert_eq!(err.to_string(), format!("Cluster {} is not running.", name));
        }
    }

    #[tokio::test]
    async fn test_list_clusters_filters_prefix() {
        let engine = engine_with(vec![
            summary("ceph-nano-alpha", "running"),
            summary("redis", "running"),
            summary("ceph-nano-beta", "exited"),
        ]);

        let clusters = list_clusters(&engine).await.unwrap();
        let names: Vec<_> = clusters.iter().map(|(id, _)| id.short_name().to_string()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }
}
