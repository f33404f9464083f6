//! Image aliases

use super::NanoConfig;
use serde::{Deserialize, Serialize};

/// Image used when nothing else is asked for.
pub const DEFAULT_IMAGE: &str = "ceph/daemon";

/// Image used by default when `CN_REGISTRY=redhat`.
pub const REDHAT_IMAGE: &str = "registry.access.redhat.com/rhceph/rhceph-3-rhel7";

/// An image alias entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
}

/// Default image for this environment, honoring `CN_REGISTRY`.
pub fn default_image(registry: Option<&str>) -> &'static str {
    match registry {
        Some("redhat") => REDHAT_IMAGE,
        _ => DEFAULT_IMAGE,
    }
}

/// An alias maps to its image name; anything else is used verbatim.
pub(super) fn resolve(config: &NanoConfig, requested: &str) -> String {
    config
        .image_for_alias(requested)
        .map(str::to_string)
        .unwrap_or_else(|| requested.to_string())
}
