//! Environment deployment targets
//!
//! `deploy-latest` applies the tag built in this run. `promote-to-stage`
//! never builds: it reads the tag `latest` is running and applies that same
//! tag to `stage`.

use anyhow::Context;
use async_trait::async_trait;
use shipyard_core::ArtifactTag;
use shipyard_core::domain::environment::{ConfigOverrides, Environment, keys};
use shipyard_runner::{TargetBody, TargetContext, TargetOutputs};
use shipyard_stack::{StackProvider, StackStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::targets;

/// Selects `env`, applies `overrides` and reports what is now live
async fn deploy(
    stack: &dyn StackStore,
    env: &Environment,
    overrides: &ConfigOverrides,
) -> anyhow::Result<TargetOutputs> {
    stack.select_or_create(env).await?;
    stack.apply(overrides).await?;

    let mut outputs: TargetOutputs = overrides
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    match stack.get_output(env, keys::LIVE_URL).await {
        Ok(url) => {
            info!("'{}' is live at {}", env, url);
            outputs.insert(keys::LIVE_URL.to_string(), url);
        }
        Err(e) if e.is_not_found() => debug!("'{}' publishes no {}", env, keys::LIVE_URL),
        Err(e) => warn!("Could not read {} of '{}': {}", keys::LIVE_URL, env, e),
    }

    Ok(outputs)
}

/// Deploys this run's image to `latest`
pub struct DeployLatest {
    stacks: Arc<dyn StackProvider>,
}

impl DeployLatest {
    pub fn new(stacks: Arc<dyn StackProvider>) -> Self {
        Self { stacks }
    }
}

#[async_trait]
impl TargetBody for DeployLatest {
    async fn execute(&self, ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
        let tag = ctx.require_output(targets::CONTAINERIZE, keys::DOCKER_TAG)?;
        let stack = self.stacks.connect(ctx)?;

        info!("Deploying {} to '{}'", tag, Environment::LATEST);
        deploy(
            stack.as_ref(),
            &Environment::latest(),
            &ConfigOverrides::new().with(keys::DOCKER_TAG, tag),
        )
        .await
    }
}

/// Deploys the tag `latest` is running to `stage`
pub struct PromoteToStage {
    stacks: Arc<dyn StackProvider>,
}

impl PromoteToStage {
    pub fn new(stacks: Arc<dyn StackProvider>) -> Self {
        Self { stacks }
    }
}

#[async_trait]
impl TargetBody for PromoteToStage {
    async fn execute(&self, ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
        let stack = self.stacks.connect(ctx)?;
        let latest = Environment::latest();

        stack.select_or_create(&latest).await?;
        let tag = match stack.get_output(&latest, keys::DOCKER_TAG).await {
            Ok(tag) => tag,
            Err(e) if e.is_not_found() => {
                return Err(anyhow::Error::new(e)
                    .context("Nothing to promote: 'latest' has never been deployed"));
            }
            Err(e) => return Err(e).context("Failed to read the tag deployed to 'latest'"),
        };

        if let Err(e) = ArtifactTag::parse(&tag) {
            warn!("Tag '{}' on 'latest' has an unexpected format: {}", tag, e);
        }

        info!("Promoting {} from '{}' to '{}'", tag, latest, Environment::STAGE);
        deploy(
            stack.as_ref(),
            &Environment::stage(),
            &ConfigOverrides::new().with(keys::DOCKER_TAG, tag),
        )
        .await
    }
}

/// Provisions the shared infrastructure
pub struct DeployCommon {
    stacks: Arc<dyn StackProvider>,
}

impl DeployCommon {
    pub fn new(stacks: Arc<dyn StackProvider>) -> Self {
        Self { stacks }
    }
}

#[async_trait]
impl TargetBody for DeployCommon {
    async fn execute(&self, ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
        let stack = self.stacks.connect(ctx)?;
        let common = Environment::common();

        stack.select_or_create(&common).await?;
        stack.apply(&ConfigOverrides::new()).await?;

        let mut outputs = TargetOutputs::new();
        for key in [keys::REGISTRY_URL, keys::DB_CLUSTER_ID] {
            match stack.get_output(&common, key).await {
                Ok(value) => {
                    outputs.insert(key.to_string(), value);
                }
                Err(e) => debug!("'{}' output {} unavailable: {}", common, key, e),
            }
        }
        Ok(outputs)
    }
}

/// Tears down one environment
///
/// Ordering between environments comes from the target graph, not from here.
pub struct Destroy {
    env: Environment,
    stacks: Arc<dyn StackProvider>,
}

impl Destroy {
    pub fn new(env: Environment, stacks: Arc<dyn StackProvider>) -> Self {
        Self { env, stacks }
    }
}

#[async_trait]
impl TargetBody for Destroy {
    async fn execute(&self, ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
        let stack = self.stacks.connect(ctx)?;
        stack.destroy(&self.env).await?;
        info!("Destroyed '{}'", self.env);
        Ok(TargetOutputs::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_runner::{BuildContext, Parameters};
    use shipyard_stack::{MemoryStackStore, StackError, StackOperation};
    use std::collections::BTreeMap;

    use crate::dry_run::RecordingRunner;

    fn build_context() -> BuildContext {
        BuildContext::new(".", Parameters::default(), Arc::new(RecordingRunner::new()))
    }

    #[tokio::test]
    async fn test_deploy_reports_live_url() {
        let stacks = MemoryStackStore::new().with_output(
            &Environment::stage(),
            keys::LIVE_URL,
            "https://stage.example.com",
        );
        let outputs = deploy(
            &stacks,
            &Environment::stage(),
            &ConfigOverrides::new().with(keys::DOCKER_TAG, "24.01.02.abcdef1-421"),
        )
        .await
        .unwrap();

        assert_eq!(outputs[keys::DOCKER_TAG], "24.01.02.abcdef1-421");
        assert_eq!(outputs[keys::LIVE_URL], "https://stage.example.com");
    }

    #[tokio::test]
    async fn test_deploy_latest_requires_containerize_output() {
        let stacks = MemoryStackStore::new();
        let build = build_context();
        let outputs = BTreeMap::new();
        let ctx = TargetContext::new(&build, targets::DEPLOY_LATEST, &outputs);

        let err = DeployLatest::new(Arc::new(stacks.clone()))
            .execute(&ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("containerize"));
        assert!(stacks.calls().is_empty());
    }

    #[tokio::test]
    async fn test_promote_stage_failure_is_bucket_operation() {
        let stacks = MemoryStackStore::new()
            .with_output(&Environment::latest(), keys::DOCKER_TAG, "24.01.02.abcdef1-421")
            .fail_on(&Environment::stage(), StackOperation::Apply);
        let build = build_context();
        let outputs = BTreeMap::new();
        let ctx = TargetContext::new(&build, targets::PROMOTE_TO_STAGE, &outputs);

        let err = PromoteToStage::new(Arc::new(stacks))
            .execute(&ctx)
            .await
            .unwrap_err();
        let stack_err = err.downcast_ref::<StackError>().unwrap();
        assert!(matches!(
            stack_err,
            StackError::Operation { bucket, operation: StackOperation::Apply, .. } if bucket == "stage"
        ));
    }

    #[tokio::test]
    async fn test_deploy_common_collects_outputs() {
        let stacks = MemoryStackStore::new()
            .with_output(&Environment::common(), keys::REGISTRY_URL, "registry.example.com/acme")
            .with_output(&Environment::common(), keys::DB_CLUSTER_ID, "db-123");
        let build = build_context();
        let outputs = BTreeMap::new();
        let ctx = TargetContext::new(&build, targets::DEPLOY_COMMON, &outputs);

        let produced = DeployCommon::new(Arc::new(stacks.clone()))
            .execute(&ctx)
            .await
            .unwrap();

        assert_eq!(produced[keys::REGISTRY_URL], "registry.example.com/acme");
        assert_eq!(produced[keys::DB_CLUSTER_ID], "db-123");
        assert_eq!(
            stacks.applies_to(&Environment::common()),
            vec![ConfigOverrides::new()]
        );
    }
}
