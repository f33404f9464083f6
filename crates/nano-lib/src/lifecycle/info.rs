//! Connection details of a ready cluster

use crate::error::{NanoError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// File inside the container holding the S3 user created at bootstrap.
pub const USER_DETAILS_PATH: &str = "/nano_user_details";

/// What a user needs to talk to a running cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterInfo {
    pub cluster: String,
    /// Output of `ceph health`, trimmed.
    pub health: String,
    pub work_directory: String,
    pub access_key: String,
    pub secret_key: String,
    pub s3_endpoint: String,
    /// Only set when the container recorded a numeric UI port.
    pub ui_endpoint: Option<String>,
}

impl fmt::Display for ClusterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "{} is the Ceph status", self.health)?;
        writeln!(f, "Your working directory is: {}", self.work_directory)?;
        writeln!(f, "S3 access key is: {}", self.access_key)?;
        writeln!(f, "S3 secret key is: {}", self.secret_key)?;
        writeln!(f, "S3 object server address is: {}", self.s3_endpoint)?;
        if let Some(ui) = &self.ui_endpoint {
            writeln!(f, "Ceph Nano browser address is: {}", ui)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct UserDetails {
    keys: Vec<UserKey>,
}

#[derive(Debug, Deserialize)]
struct UserKey {
    access_key: String,
    secret_key: String,
}

/// Extract `(access_key, secret_key)` from `cat /nano_user_details` output.
///
/// The file may be preceded by noise; the JSON document starts at the first
/// `{`.
pub fn parse_user_details(output: &str) -> Result<(String, String)> {
    let start = output
        .find('{')
        .ok_or_else(|| NanoError::parse(USER_DETAILS_PATH, "no JSON document found"))?;

    let details: UserDetails = serde_json::from_str(output[start..].trim_end())?;
    let key = details
        .keys
        .into_iter()
        .next()
        .ok_or_else(|| NanoError::parse(USER_DETAILS_PATH, "user has no S3 keys"))?;

    Ok((key.access_key, key.secret_key))
}

/// UI endpoint for a recorded `SREE_PORT` value, if it is a port number.
pub fn ui_endpoint(ip: &str, recorded_port: Option<&str>) -> Option<String> {
    recorded_port
        .and_then(|port| port.parse::<u16>().ok())
        .map(|port| format!("http://{}:{}", ip, port))
}
