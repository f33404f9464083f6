//! Configuration loading and flavor resolution
//!
//! Built-in flavors and image aliases are compiled in as a TOML document and
//! form the lowest layer of a `config::Config`. An optional user file is
//! layered on top, then a single merge pass materializes the `default`
//! flavor into every flavor that inherits from it.

mod flavor;
mod image;

pub use flavor::{ClusterProfile, FlavorSpec, DEFAULT_FLAVOR};
pub use image::{default_image, ImageSpec, DEFAULT_IMAGE, REDHAT_IMAGE};

use crate::error::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Default work directory shared with the container.
pub const DEFAULT_WORK_DIRECTORY: &str = "/usr/share/ceph-nano";

/// Built-in configuration, always loaded first.
const BUILTIN_CONFIG: &str = r#"
[flavors.default]
use_default = true
memory_size = "512MB"
cpu_count = 1
privileged = false
data = ""
size = ""
work_directory = "/usr/share/ceph-nano"

[flavors.medium]
memory_size = "768MB"

[flavors.large]
memory_size = "1GB"

[flavors.huge]
memory_size = "4GB"
cpu_count = 2

[images.default]
use_default = true
image_name = "ceph/daemon"

[images.mimic]
image_name = "ceph/daemon:latest-mimic"

[images.luminous]
image_name = "ceph/daemon:latest-luminous"

[images.redhat]
image_name = "registry.access.redhat.com/rhceph/rhceph-3-rhel7"
"#;

/// Resolved configuration: every known flavor and image alias.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NanoConfig {
    #[serde(default)]
    pub flavors: BTreeMap<String, FlavorSpec>,
    #[serde(default)]
    pub images: BTreeMap<String, ImageSpec>,
}

impl NanoConfig {
    /// Built-in configuration only.
    pub fn builtin() -> Result<Self> {
        Self::load(None)
    }

    /// Load the built-in configuration, optionally overlaid with a user file.
    ///
    /// The file format is picked from the extension (toml, yaml, yml, json).
    pub fn load(user_file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(config::File::from_str(
            BUILTIN_CONFIG,
            config::FileFormat::Toml,
        ));

        if let Some(path) = user_file {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let mut loaded: NanoConfig = builder.build()?.try_deserialize()?;
        loaded.merge_flavors_with_default();
        Ok(loaded)
    }

    /// Parse a configuration document, layered over the built-ins.
    pub fn from_document(document: &str, format: config::FileFormat) -> Result<Self> {
        let mut loaded: NanoConfig = config::Config::builder()
            .add_source(config::File::from_str(BUILTIN_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from_str(document, format))
            .build()?
            .try_deserialize()?;
        loaded.merge_flavors_with_default();
        Ok(loaded)
    }

    /// Copy every attribute of the `default` flavor into each inheriting
    /// flavor that does not set it. Running this twice changes nothing.
    pub fn merge_flavors_with_default(&mut self) {
        let Some(default) = self.flavors.get(DEFAULT_FLAVOR).cloned() else {
            return;
        };
        let inherit_default = default.use_default.unwrap_or(false);

        for (name, spec) in self.flavors.iter_mut() {
            if name == DEFAULT_FLAVOR {
                continue;
            }
            if !spec.use_default.unwrap_or(inherit_default) {
                continue;
            }
            spec.inherit_from(&default);
        }
    }

    /// Whether the flavor inherits from `default`.
    ///
    /// A flavor that does not say falls back to the `default` flavor's own
    /// `use_default`, which is read directly to avoid recursing.
    pub fn use_default(&self, flavor: &str) -> Result<bool> {
        flavor::use_default(self, flavor)
    }

    /// Resolve a flavor into a complete profile.
    pub fn resolve(&self, flavor: &str) -> Result<ClusterProfile> {
        flavor::resolve(self, flavor)
    }

    /// Image name registered under an alias.
    pub fn image_for_alias(&self, alias: &str) -> Option<&str> {
        self.images.get(alias).and_then(|spec| spec.image_name.as_deref())
    }

    /// Resolve what the user asked for into an image reference.
    pub fn resolve_image(&self, requested: &str) -> String {
        image::resolve(self, requested)
    }

    /// Aliases shown to users (everything but `default`).
    pub fn aliases(&self) -> Vec<(&str, &str)> {
        self.images
            .iter()
            .filter(|(alias, _)| alias.as_str() != DEFAULT_FLAVOR)
            .filter_map(|(alias, spec)| {
                spec.image_name
                    .as_deref()
                    .map(|image| (alias.as_str(), image))
            })
            .collect()
    }
}
