//! Flavors: named resource profiles for a cluster

use super::NanoConfig;
use crate::error::{NanoError, Result};
use crate::units;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the flavor every other flavor may inherit from.
pub const DEFAULT_FLAVOR: &str = "default";

/// A flavor as written in configuration. Every attribute is optional until
/// resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlavorSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_directory: Option<String>,
    /// Daemon options, rendered into the container's ceph.conf.
    #[serde(
        default,
        rename = "ceph.conf",
        skip_serializing_if = "Option::is_none"
    )]
    pub ceph_conf: Option<BTreeMap<String, serde_json::Value>>,
    /// Keys this tool does not interpret; kept so inheritance carries them.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FlavorSpec {
    /// Fill every unset attribute from `parent`.
    pub(crate) fn inherit_from(&mut self, parent: &FlavorSpec) {
        fill(&mut self.use_default, &parent.use_default);
        fill(&mut self.memory_size, &parent.memory_size);
        fill(&mut self.cpu_count, &parent.cpu_count);
        fill(&mut self.privileged, &parent.privileged);
        fill(&mut self.data, &parent.data);
        fill(&mut self.size, &parent.size);
        fill(&mut self.work_directory, &parent.work_directory);
        fill(&mut self.ceph_conf, &parent.ceph_conf);
        for (key, value) in &parent.extra {
            self.extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, parent: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(parent);
    }
}

/// A fully resolved flavor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterProfile {
    pub name: String,
    pub memory_size: String,
    pub memory_bytes: i64,
    pub cpu_count: i64,
    pub privileged: bool,
    pub data: String,
    pub size: String,
    pub work_directory: String,
    #[serde(rename = "ceph.conf")]
    pub ceph_conf: BTreeMap<String, serde_json::Value>,
}

impl ClusterProfile {
    /// Render daemon options as an ini `[global]` section.
    ///
    /// Returns `None` when there is nothing to add.
    pub fn ceph_conf_fragment(&self) -> Option<String> {
        if self.ceph_conf.is_empty() {
            return None;
        }
        let mut fragment = String::from("[global]\n");
        for (key, value) in &self.ceph_conf {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            fragment.push_str(&format!("{} = {}\n", key, rendered));
        }
        Some(fragment)
    }
}

pub(super) fn use_default(config: &NanoConfig, flavor: &str) -> Result<bool> {
    if let Some(value) = config.flavors.get(flavor).and_then(|spec| spec.use_default) {
        return Ok(value);
    }
    config
        .flavors
        .get(DEFAULT_FLAVOR)
        .and_then(|spec| spec.use_default)
        .ok_or_else(|| NanoError::configuration_missing(flavor, "use_default"))
}

/// Look an attribute up on `flavor`, falling back to `default` when the
/// flavor inherits.
fn lookup<T: Clone>(
    config: &NanoConfig,
    flavor: &str,
    key: &str,
    get: impl Fn(&FlavorSpec) -> Option<T>,
) -> Result<T> {
    if let Some(value) = config.flavors.get(flavor).and_then(&get) {
        return Ok(value);
    }
    if flavor != DEFAULT_FLAVOR && use_default(config, flavor)? {
        if let Some(value) = config.flavors.get(DEFAULT_FLAVOR).and_then(&get) {
            return Ok(value);
        }
    }
    Err(NanoError::configuration_missing(flavor, key))
}

pub(super) fn resolve(config: &NanoConfig, flavor: &str) -> Result<ClusterProfile> {
    if !config.flavors.contains_key(flavor) {
        return Err(NanoError::UnknownFlavor(flavor.to_string()));
    }

    let memory_size = lookup(config, flavor, "memory_size", |s| s.memory_size.clone())?;
    let memory_bytes = units::parse_bytes(&memory_size)?;
    let memory_bytes = i64::try_from(memory_bytes)
        .map_err(|_| NanoError::invalid_size(&memory_size, "value out of range"))?;

    let cpu_count = lookup(config, flavor, "cpu_count", |s| s.cpu_count)?;
    let privileged = lookup(config, flavor, "privileged", |s| s.privileged)?;
    let data = lookup(config, flavor, "data", |s| s.data.clone())?;
    let size = lookup(config, flavor, "size", |s| s.size.clone())?;
    let work_directory = lookup(config, flavor, "work_directory", |s| {
        s.work_directory.clone()
    })?;

    let mut ceph_conf = BTreeMap::new();
    if use_default(config, flavor)? {
        if let Some(defaults) = config
            .flavors
            .get(DEFAULT_FLAVOR)
            .and_then(|s| s.ceph_conf.as_ref())
        {
            ceph_conf.extend(defaults.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
    if let Some(own) = config.flavors.get(flavor).and_then(|s| s.ceph_conf.as_ref()) {
        ceph_conf.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    Ok(ClusterProfile {
        name: flavor.to_string(),
        memory_size,
        memory_bytes,
        cpu_count,
        privileged,
        data,
        size,
        work_directory,
        ceph_conf,
    })
}
