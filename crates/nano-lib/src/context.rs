//! Per-invocation options
//!
//! Everything the user passed on the command line for one run, threaded
//! explicitly into the components instead of living in globals.

use crate::config::{default_image, ClusterProfile, NanoConfig, DEFAULT_WORK_DIRECTORY};
use crate::error::Result;

/// Options parsed from the command line for a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Flavor to resolve.
    pub flavor: String,
    /// `--image`; empty or equal to the default image means "not given".
    pub image: String,
    /// `--data`: backing directory or block device.
    pub data: String,
    /// `--size`: backing store size.
    pub size: String,
    /// `--work-dir`; equal to the default means "not given".
    pub work_dir: String,
    /// `--privileged`.
    pub privileged: bool,
    /// `--debug` for in-container commands.
    pub debug: bool,
    /// Value of `CN_REGISTRY`, if set.
    pub registry: Option<String>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            flavor: "default".to_string(),
            image: String::new(),
            data: String::new(),
            size: String::new(),
            work_dir: DEFAULT_WORK_DIRECTORY.to_string(),
            privileged: false,
            debug: false,
            registry: None,
        }
    }
}

impl ExecutionContext {
    /// Image the cluster should run.
    pub fn effective_image(&self, config: &NanoConfig) -> String {
        let builtin = default_image(self.registry.as_deref());
        let requested = if self.image.is_empty() || self.image == builtin {
            builtin
        } else {
            self.image.as_str()
        };
        config.resolve_image(requested)
    }

    /// Resolve the flavor and apply command line overrides for this run only.
    pub fn effective_profile(&self, config: &NanoConfig) -> Result<ClusterProfile> {
        let mut profile = config.resolve(&self.flavor)?;

        if !self.data.is_empty() {
            profile.data = self.data.clone();
        }
        if !self.size.is_empty() {
            profile.size = self.size.clone();
        }
        if !self.work_dir.is_empty() && self.work_dir != DEFAULT_WORK_DIRECTORY {
            profile.work_directory = self.work_dir.clone();
        }
        if self.privileged {
            profile.privileged = true;
        }

        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_IMAGE, REDHAT_IMAGE};

    const USER_CONFIG: &str = r#"
[flavors.custom]
use_default = false
memory_size = "1GB"
cpu_count = 2
privileged = false
data = "/dev/sdb1"
size = "20GB"
work_directory = "/tmp/nano/"

[images.complex]
image_name = "this.url.is.complex/cool/for-a-test"
"#;

    fn user_config() -> NanoConfig {
        NanoConfig::from_document(USER_CONFIG, config::FileFormat::Toml).unwrap()
    }

    #[test]
    fn test_defaults_keep_profile_values() {
        let cfg = user_config();
        let ctx = ExecutionContext {
            flavor: "custom".into(),
            ..Default::default()
        };
        let profile = ctx.effective_profile(&cfg).unwrap();
        assert_eq!(profile.data, "/dev/sdb1");
        assert_eq!(profile.size, "20GB");
        assert_eq!(profile.work_directory, "/tmp/nano/");
        assert!(!profile.privileged);
    }

    #[test]
    fn test_flags_override_profile() {
        let cfg = user_config();
        let ctx = ExecutionContext {
            flavor: "custom".into(),
            data: "/dev/nawak".into(),
            size: "1M".into(),
            work_dir: "/tmp/nawak".into(),
            privileged: true,
            ..Default::default()
        };
        let profile = ctx.effective_profile(&cfg).unwrap();
        assert_eq!(profile.data, "/dev/nawak");
        assert_eq!(profile.size, "1M");
        assert_eq!(profile.work_directory, "/tmp/nawak");
        assert!(profile.privileged);
    }

    #[test]
    fn test_default_work_dir_flag_is_not_an_override() {
        let cfg = user_config();
        let ctx = ExecutionContext {
            flavor: "custom".into(),
            work_dir: DEFAULT_WORK_DIRECTORY.into(),
            ..Default::default()
        };
        assert_eq!(ctx.effective_profile(&cfg).unwrap().work_directory, "/tmp/nano/");
    }

    #[test]
    fn test_effective_image() {
        let cfg = user_config();

        let ctx = ExecutionContext::default();
        assert_eq!(ctx.effective_image(&cfg), DEFAULT_IMAGE);

        let ctx = ExecutionContext {
            image: "complex".into(),
            ..Default::default()
        };
        assert_eq!(ctx.effective_image(&cfg), "this.url.is.complex/cool/for-a-test");

        let ctx = ExecutionContext {
            image: "nawak".into(),
            ..Default::default()
        };
        assert_eq!(ctx.effective_image(&cfg), "nawak");

        let ctx = ExecutionContext {
            registry: Some("redhat".into()),
            ..Default::default()
        };
        assert_eq!(ctx.effective_image(&cfg), REDHAT_IMAGE);
    }
}
