//! Environment (stack) domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of a deployment environment
///
/// Each environment is a separate bucket in the provisioning system.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment(String);

impl Environment {
    /// Shared infrastructure (registry, database cluster)
    pub const COMMON: &'static str = "common";
    /// Environment every successful build is deployed to
    pub const LATEST: &'static str = "latest";
    /// Environment that receives what `latest` is running
    pub const STAGE: &'static str = "stage";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn common() -> Self {
        Self::new(Self::COMMON)
    }

    pub fn latest() -> Self {
        Self::new(Self::LATEST)
    }

    pub fn stage() -> Self {
        Self::new(Self::STAGE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Order in which environments must be destroyed
    ///
    /// `stage` and `latest` reference resources owned by `common`.
    pub fn teardown_order() -> [Environment; 3] {
        [Self::stage(), Self::latest(), Self::common()]
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Environment {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Environment {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Well-known config and output keys
pub mod keys {
    /// Container tag deployed to an environment (config and output)
    pub const DOCKER_TAG: &str = "dockerTag";
    /// Public URL of the deployed application (output)
    pub const LIVE_URL: &str = "LiveUrl";
    /// Registry endpoint (output of `common`)
    pub const REGISTRY_URL: &str = "registry-url";
    /// Database cluster id (output of `common`)
    pub const DB_CLUSTER_ID: &str = "db-cluster-id";
}

/// Config values pushed into an environment on apply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigOverrides(BTreeMap<String, String>);

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// Outputs published by an environment after apply
pub type StackOutputs = BTreeMap<String, serde_json::Value>;
