//! Configuration file discovery for the CLI

use anyhow::{bail, Context, Result};
use nano_lib::NanoConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Base name of the configuration file.
const CONFIG_NAME: &str = "cn";

/// Extensions tried in every search directory, in order.
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

/// Directories searched for a configuration file, first hit wins.
pub fn search_directories() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from("/etc/cn")];
    if let Some(home) = dirs_next::home_dir() {
        dirs.push(home.join(".cn"));
    }
    dirs.push(PathBuf::from("."));
    dirs
}

/// First `cn.<ext>` found in `dirs`.
pub fn discover(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| {
            CONFIG_EXTENSIONS
                .iter()
                .map(move |ext| dir.join(format!("{}.{}", CONFIG_NAME, ext)))
        })
        .find(|candidate| candidate.is_file())
}

/// Load the built-in configuration plus the user file, if any.
///
/// An explicit `--config` path must exist.
pub fn load(explicit: Option<&Path>) -> Result<NanoConfig> {
    let user_file = match explicit {
        Some(path) => {
            if !path.is_file() {
                bail!("Config file {} does not exist", path.display());
            }
            Some(path.to_path_buf())
        }
        None => discover(&search_directories()),
    };

    debug!(config_file = ?user_file, "Loading configuration");
    NanoConfig::load(user_file.as_deref()).with_context(|| match &user_file {
        Some(path) => format!("Failed to load config file {}", path.display()),
        None => "Failed to load built-in configuration".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_prefers_first_directory() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("cn.yaml"), "flavors: {}\n").unwrap();
        std::fs::write(second.path().join("cn.toml"), "").unwrap();

        let found = discover(&[first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(found, Some(first.path().join("cn.yaml")));
    }

    #[test]
    fn test_discover_extension_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cn.json"), "{}").unwrap();
        std::fs::write(dir.path().join("cn.toml"), "").unwrap();

        let found = discover(&[dir.path().to_path_buf()]);
        assert_eq!(found, Some(dir.path().join("cn.toml")));
    }

    #[test]
    fn test_discover_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(discover(&[dir.path().to_path_buf()]), None);
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        assert!(load(Some(Path::new("/nonexistent/cn.toml"))).is_err());
    }

    #[test]
    fn test_explicit_file_layers_on_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cn.toml");
        std::fs::write(&path, "[flavors.tiny]\nmemory_size = \"256MB\"\n").unwrap();

        let config = load(Some(&path)).unwrap();
        assert!(config.flavors.contains_key("tiny"));
        assert!(config.flavors.contains_key("huge"));
    }
}
