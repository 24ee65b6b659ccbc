//! CLI configuration
//!
//! Repository layout and naming used by the workflow targets. Values come
//! from command-line flags with environment fallbacks (see `main.rs`);
//! relative paths resolve against the repository root.

use anyhow::Context;
use std::path::{Path, PathBuf};

/// Image name used when none is configured
pub const DEFAULT_APP_NAME: &str = "rigo-questions-app";

/// Shipyard configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Repository root; commands run here
    pub root: PathBuf,

    /// Container image name, without registry or tag
    pub app_name: String,

    /// Directory holding the infrastructure program
    pub infrastructure_dir: PathBuf,

    /// Output directory of `dotnet publish`
    pub publish_dir: PathBuf,

    /// Web project that gets published and receives user secrets
    pub web_project: PathBuf,

    /// Running on a CI server
    pub ci: bool,

    /// Log the output of external commands at info level
    pub echo_output: bool,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            app_name: DEFAULT_APP_NAME.to_string(),
            infrastructure_dir: PathBuf::from("infrastructure"),
            publish_dir: PathBuf::from("publish"),
            web_project: PathBuf::from("src/QuestionsApp.Web"),
            ci: false,
            echo_output: false,
        }
    }

    /// Detects CI from the `CI` environment variable
    pub fn with_ci_from_env(mut self) -> Self {
        self.ci = std::env::var("CI")
            .map(|v| !v.is_empty() && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(false);
        self
    }

    pub fn publish_path(&self) -> PathBuf {
        self.root.join(&self.publish_dir)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.root.is_dir() {
            anyhow::bail!("root '{}' is not a directory", self.root.display());
        }

        if self.app_name.is_empty() {
            anyhow::bail!("app_name cannot be empty");
        }

        // Docker repository names are lowercase
        let valid_name = self
            .app_name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
        if !valid_name {
            anyhow::bail!(
                "app_name '{}' must contain only lowercase letters, digits, '.', '_' or '-'",
                self.app_name
            );
        }

        for (name, path) in [
            ("infrastructure_dir", &self.infrastructure_dir),
            ("publish_dir", &self.publish_dir),
            ("web_project", &self.web_project),
        ] {
            if path.as_os_str().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
        }

        if is_same_dir(&self.root, &self.publish_path()) {
            anyhow::bail!("publish_dir cannot be the repository root");
        }

        Ok(())
    }

    /// Canonical root, so logs and commands show an absolute path
    pub fn canonicalize_root(mut self) -> anyhow::Result<Self> {
        self.root = self
            .root
            .canonicalize()
            .with_context(|| format!("Failed to resolve root '{}'", self.root.display()))?;
        Ok(self)
    }
}

fn is_same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(".")
    }
}
