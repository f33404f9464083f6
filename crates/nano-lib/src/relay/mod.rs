//! Running commands inside a cluster container
//!
//! Captured output is stripped down to printable ASCII and newlines before
//! it reaches the terminal; the container's tools emit control sequences
//! that would otherwise garble the display.

mod interactive;

pub use interactive::{enter, RawModeGuard, TerminalSize};

use crate::engine::ContainerEngine;
use crate::error::Result;
use crate::identity::ClusterIdentity;

/// Keep printable ASCII and newlines, drop everything else.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| (' '..='~').contains(c) || *c == '\n')
        .collect()
}

/// Run `argv` in the cluster container and return its sanitized output.
pub async fn exec<S: AsRef<str>>(
    engine: &dyn ContainerEngine,
    identity: &ClusterIdentity,
    argv: &[S],
) -> Result<String> {
    let argv = argv.iter().map(|arg| arg.as_ref().to_string()).collect();
    let raw = engine.exec(identity.canonical_name(), argv).await?;
    Ok(sanitize(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockContainerEngine;
    use mockall::predicate::eq;

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize("HEALTH_OK\n"), "HEALTH_OK\n");
        assert_eq!(sanitize("\u{1b}[1mbold\u{1b}[0m\r\n"), "[1mbold[0m\n");
        assert_eq!(sanitize("\u{1}\u{0}\u{0}\u{0}\u{0}\u{0}\u{0}\u{9}HEALTH_OK"), "HEALTH_OK");
        assert_eq!(sanitize("caf\u{e9}\ttab"), "caftab");
    }

    #[tokio::test]
    async fn test_exec_targets_canonical_name() {
        let mut engine = MockContainerEngine::new();
        engine
            .expect_exec()
            .with(
                eq("ceph-nano-alpha"),
                eq(vec!["ceph".to_string(), "health".to_string()]),
            )
            .times(1)
            .returning(|_, _| Ok("\u{1}\u{0}\u{0}\u{0}\u{0}\u{0}\u{0}\u{a}HEALTH_OK\n".into()));

        let out = exec(&engine, &ClusterIdentity::new("alpha"), &["ceph", "health"])
            .await
            .unwrap();
        assert_eq!(out, "\nHEALTH_OK\n");
    }
}
