//! Cluster naming.

use std::fmt;

/// Prefix carried by every container this tool manages.
pub const CONTAINER_PREFIX: &str = "ceph-nano-";

/// Suffix appended to the canonical name to form the container hostname.
pub const HOSTNAME_SUFFIX: &str = "-faa32aebf00b";

/// A cluster's user facing name and the container name derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterIdentity {
    short_name: String,
    canonical_name: String,
}

impl ClusterIdentity {
    /// Build an identity from the name the user typed.
    pub fn new(short_name: impl Into<String>) -> Self {
        let short_name = short_name.into();
        let canonical_name = format!("{}{}", CONTAINER_PREFIX, short_name);
        Self {
            short_name,
            canonical_name,
        }
    }

    /// Recover an identity from a container name as reported by the engine.
    ///
    /// The engine reports names with a leading `/`. Returns `None` for
    /// containers that do not carry the prefix.
    pub fn from_container_name(name: &str) -> Option<Self> {
        let name = name.trim_start_matches('/');
        name.strip_prefix(CONTAINER_PREFIX)
            .filter(|short| !short.is_empty())
            .map(Self::new)
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    /// Hostname given to the container.
    pub fn hostname(&self) -> String {
        format!("{}{}", self.canonical_name, HOSTNAME_SUFFIX)
    }

    /// Path of the object gateway log inside the container.
    pub fn rgw_log_path(&self) -> String {
        format!("/var/log/ceph/client.rgw.{}.log", self.hostname())
    }
}

impl fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_derivation() {
        let id = ClusterIdentity::new("alpha");
        assert_eq!(id.short_name(), "alpha");
        assert_eq!(id.canonical_name(), "ceph-nano-alpha");
        assert_eq!(id.hostname(), "ceph-nano-alpha-faa32aebf00b");
        assert_eq!(
            id.rgw_log_path(),
            "/var/log/ceph/client.rgw.ceph-nano-alpha-faa32aebf00b.log"
        );
        assert_eq!(id.to_string(), "alpha");
    }

    #[test]
    fn test_from_container_name() {
        let id = ClusterIdentity::from_container_name("/ceph-nano-beta").unwrap();
        assert_eq!(id.short_name(), "beta");
        assert!(ClusterIdentity::from_container_name("/postgres").is_none());
        assert!(ClusterIdentity::from_container_name("/ceph-nano-").is_none());
    }
}
