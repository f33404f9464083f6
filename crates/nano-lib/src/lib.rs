//! Core library for cn, the Ceph Nano cluster manager
//!
//! This crate provides the core functionality for:
//! - Flavor and image configuration with defaulting
//! - Cluster lifecycle on a container engine, with readiness waits
//! - Backing store validation and host port allocation
//! - Running commands and S3 operations inside a cluster
//! - Typed errors and structured logging

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod ports;
pub mod prober;
pub mod relay;
pub mod s3;
pub mod storage;
pub mod units;

pub use config::{ClusterProfile, NanoConfig};
pub use context::ExecutionContext;
pub use engine::{ContainerEngine, DockerEngine};
pub use error::{NanoError, Result};
pub use identity::ClusterIdentity;
pub use lifecycle::{ClusterInfo, ClusterManager, ProgressReporter};
pub use observability::{init_tracing, ClusterLogger};
pub use prober::ContainerState;
pub use s3::{GetMode, S3Relay};
