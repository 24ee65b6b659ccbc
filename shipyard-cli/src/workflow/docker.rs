//! Container image targets

use async_trait::async_trait;
use shipyard_core::ArtifactTag;
use shipyard_core::domain::environment::keys;
use shipyard_runner::{CommandSpec, TargetBody, TargetContext, TargetOutputs};
use std::path::{Path, PathBuf};
use tracing::info;

use super::{params, targets};

/// Output key of the local image reference
pub const IMAGE: &str = "image";

/// Output key of the image reference in the registry
pub const REMOTE_IMAGE: &str = "remoteImage";

fn docker(ctx: &TargetContext<'_>) -> CommandSpec {
    CommandSpec::new("docker").cwd(ctx.root())
}

/// Builds the published output into an image under a fresh tag
pub struct Containerize {
    app_name: String,
    publish_dir: PathBuf,
}

impl Containerize {
    pub fn new(app_name: &str, publish_dir: &Path) -> Self {
        Self {
            app_name: app_name.to_string(),
            publish_dir: publish_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl TargetBody for Containerize {
    async fn execute(&self, ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
        let commit = ctx.require(params::COMMIT)?;
        let tag = ArtifactTag::for_commit(commit)?;
        let image = tag.image_ref(&self.app_name);

        let mut build = docker(ctx)
            .arg("build")
            .arg(ctx.root().join(&self.publish_dir).to_string_lossy())
            .args(["--build-arg".to_string(), format!("build_tag={}", tag)])
            .args(["--tag", image.as_str()]);

        let mut outputs = TargetOutputs::from([
            (keys::DOCKER_TAG.to_string(), tag.to_string()),
            (IMAGE.to_string(), image.clone()),
        ]);

        // Without a registry the image stays local
        if let Some(registry) = ctx.param(params::REGISTRY_URL) {
            let remote = format!("{}/{}", registry.trim_end_matches('/'), image);
            build = build.args(["--tag", remote.as_str()]);
            outputs.insert(REMOTE_IMAGE.to_string(), remote);
        }

        ctx.run(build).await?;

        info!("Docker image tag {}", tag);
        Ok(outputs)
    }
}

/// Pushes the image built in this run to the registry
pub struct Push {
    app_name: String,
}

impl Push {
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
        }
    }
}

#[async_trait]
impl TargetBody for Push {
    async fn execute(&self, ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
        let registry = ctx.require(params::REGISTRY_URL)?.trim_end_matches('/');
        let credential = ctx.require(params::REGISTRY_CREDENTIAL)?;
        let tag = ctx.require_output(targets::CONTAINERIZE, keys::DOCKER_TAG)?;
        let remote = format!("{}/{}:{}", registry, self.app_name, tag);

        ctx.run(
            docker(ctx)
                .args(["login", registry, "--username", credential, "--password-stdin"])
                .stdin(credential),
        )
        .await?;

        // Tags are never reused; refuse to overwrite one already pushed
        let existing = ctx
            .run_unchecked(docker(ctx).args(["manifest", "inspect", remote.as_str()]))
            .await?;
        if existing.success() {
            anyhow::bail!("Image {} already exists in the registry", ctx.redactor().redact(&remote));
        }

        ctx.run(docker(ctx).args(["push", remote.as_str()])).await?;

        info!("Pushed {}", ctx.redactor().redact(&remote));
        Ok(TargetOutputs::from([(REMOTE_IMAGE.to_string(), remote)]))
    }
}
