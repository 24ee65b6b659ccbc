//! Tag command handler

use anyhow::{Context, Result};
use shipyard_core::ArtifactTag;
use shipyard_runner::SystemCommandRunner;

use crate::config::Config;
use crate::report::UsageError;
use crate::workflow;

/// Print a fresh artifact tag for `commit`, or for the checked out commit
pub async fn handle_tag(commit: Option<String>, config: &Config) -> Result<()> {
    let commit = match commit.filter(|c| !c.is_empty()) {
        Some(commit) => commit,
        None => workflow::detect_commit(&SystemCommandRunner::new(), &config.root)
            .await
            .ok_or_else(|| UsageError("No --commit given and no git commit checked out".into()))?,
    };

    let tag = ArtifactTag::for_commit(&commit).context("Failed to create artifact tag")?;
    println!("{}", tag);
    Ok(())
}
