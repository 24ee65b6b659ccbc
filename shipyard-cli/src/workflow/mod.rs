//! Build and deployment workflow
//!
//! The concrete targets and parameters of the application:
//! - `dotnet`: local database setup, clean, restore, compile, test, publish
//! - `docker`: image build with a fresh artifact tag, registry push
//! - `deploy`: applying, promoting and destroying environment stacks
//!
//! Everything is registered as data up front; the executor decides what runs.

mod deploy;
mod docker;
mod dotnet;

use shipyard_core::PlanError;
use shipyard_core::domain::environment::Environment;
use shipyard_core::domain::parameter::{ParameterCatalog, ParameterDefinition, ParameterGroup};
use shipyard_core::domain::target::TargetDefinition;
use shipyard_runner::{CommandRunner, CommandSpec, Redactor, Target, TargetRegistry};
use shipyard_stack::StackProvider;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;

/// Parameter names
pub mod params {
    pub const CONFIGURATION: &str = "configuration";
    pub const COMMIT: &str = "commit";
    pub const REGISTRY_URL: &str = "registry-url";
    pub const REGISTRY_TOKEN: &str = "registry-token";
    pub const DIGITALOCEAN_TOKEN: &str = "digitalocean-token";
    /// Group: first of `registry-token`, `digitalocean-token`
    pub const REGISTRY_CREDENTIAL: &str = "registry-credential";
}

/// Target names
pub mod targets {
    pub const INIT_LOCAL_DB: &str = "init-local-db";
    pub const CLEAN: &str = "clean";
    pub const RESTORE: &str = "restore";
    pub const COMPILE: &str = "compile";
    pub const TEST: &str = "test";
    pub const PUBLISH: &str = "publish";
    pub const CONTAINERIZE: &str = "containerize";
    pub const PUSH: &str = "push";
    pub const DEPLOY_LATEST: &str = "deploy-latest";
    pub const PROMOTE_TO_STAGE: &str = "promote-to-stage";
    pub const DEPLOY_COMMON: &str = "deploy-common";
    pub const DESTROY_STAGE: &str = "destroy-stage";
    pub const DESTROY_LATEST: &str = "destroy-latest";
    pub const DESTROY_COMMON: &str = "destroy-common";
    pub const DESTROY_ALL: &str = "destroy-all";
}

/// Declares every parameter the workflow targets can require
///
/// # Arguments
/// * `ci` - Running on a CI server; selects the default configuration
/// * `commit` - Commit of the working tree, when known
pub fn catalog(ci: bool, commit: Option<&str>) -> ParameterCatalog {
    let mut catalog = ParameterCatalog::new();

    catalog.add(
        ParameterDefinition::new(params::CONFIGURATION)
            .with_description("Build configuration, 'Debug' locally or 'Release' on CI")
            .with_default(if ci { "Release" } else { "Debug" }),
    );

    let mut commit_param = ParameterDefinition::new(params::COMMIT)
        .with_description("Commit hash the image is built from");
    if let Some(commit) = commit {
        commit_param = commit_param.with_default(commit);
    }
    catalog.add(commit_param);

    catalog.add(
        ParameterDefinition::new(params::REGISTRY_URL)
            .with_description("Container registry host, without the https:// prefix")
            .secret(),
    );
    catalog.add(
        ParameterDefinition::new(params::REGISTRY_TOKEN)
            .with_description("Token used to log in to the container registry")
            .secret()
            .promptable(),
    );
    catalog.add(
        ParameterDefinition::new(params::DIGITALOCEAN_TOKEN)
            .with_description("DigitalOcean API token for provisioning")
            .secret()
            .promptable(),
    );
    catalog.add_group(
        ParameterGroup::new(
            params::REGISTRY_CREDENTIAL,
            [params::REGISTRY_TOKEN, params::DIGITALOCEAN_TOKEN],
        )
        .with_description("Registry login credential"),
    );

    catalog
}

/// Registers every workflow target
///
/// # Arguments
/// * `config` - Repository layout and image name
/// * `stacks` - Opens the environment stack store for deploy targets
pub fn registry(
    config: &Config,
    stacks: Arc<dyn StackProvider>,
) -> Result<TargetRegistry, PlanError> {
    use targets::*;

    let mut registry = TargetRegistry::new();
    registry.register_all([
        Target::new(
            TargetDefinition::new(INIT_LOCAL_DB)
                .with_description("Create the local database password and store it as a user secret"),
            dotnet::InitLocalDb::new(&config.web_project),
        ),
        Target::new(
            TargetDefinition::new(CLEAN)
                .with_description("Clean build outputs and the publish directory")
                .runs_before([RESTORE]),
            dotnet::Clean::new(&config.publish_dir),
        ),
        Target::new(
            TargetDefinition::new(RESTORE).with_description("Restore NuGet packages"),
            dotnet::Restore,
        ),
        Target::new(
            TargetDefinition::new(COMPILE)
                .with_description("Build the solution")
                .depends_on([RESTORE])
                .requires([params::CONFIGURATION]),
            dotnet::Compile,
        ),
        Target::new(
            TargetDefinition::new(TEST)
                .with_description("Run the test suite")
                .depends_on([COMPILE])
                .requires([params::CONFIGURATION]),
            dotnet::Test,
        ),
        Target::new(
            TargetDefinition::new(PUBLISH)
                .with_description("Publish the web project in Release configuration")
                .depends_on([CLEAN, RESTORE, TEST]),
            dotnet::Publish::new(&config.web_project, &config.publish_dir),
        ),
        Target::new(
            TargetDefinition::new(CONTAINERIZE)
                .with_description("Build the container image under a fresh tag")
                .depends_on([PUBLISH])
                .requires([params::COMMIT])
                .uses([params::REGISTRY_URL]),
            docker::Containerize::new(&config.app_name, &config.publish_dir),
        ),
        Target::new(
            TargetDefinition::new(PUSH)
                .with_description("Push the image to the container registry")
                .depends_on([CONTAINERIZE])
                .requires([params::REGISTRY_URL, params::REGISTRY_CREDENTIAL]),
            docker::Push::new(&config.app_name),
        ),
        Target::new(
            TargetDefinition::new(DEPLOY_LATEST)
                .with_description("Deploy the image built by this run to 'latest'")
                .depends_on([PUSH])
                .requires([params::DIGITALOCEAN_TOKEN]),
            deploy::DeployLatest::new(stacks.clone()),
        ),
        Target::new(
            TargetDefinition::new(PROMOTE_TO_STAGE)
                .with_description("Deploy the tag 'latest' is running to 'stage'")
                .requires([params::DIGITALOCEAN_TOKEN]),
            deploy::PromoteToStage::new(stacks.clone()),
        ),
        Target::new(
            TargetDefinition::new(DEPLOY_COMMON)
                .with_description("Provision shared infrastructure (registry, database cluster)")
                .requires([params::DIGITALOCEAN_TOKEN]),
            deploy::DeployCommon::new(stacks.clone()),
        ),
        Target::new(
            TargetDefinition::new(DESTROY_STAGE)
                .with_description("Destroy the 'stage' environment")
                .runs_before([DESTROY_LATEST])
                .requires([params::DIGITALOCEAN_TOKEN]),
            deploy::Destroy::new(Environment::stage(), stacks.clone()),
        ),
        Target::new(
            TargetDefinition::new(DESTROY_LATEST)
                .with_description("Destroy the 'latest' environment")
                .runs_before([DESTROY_COMMON])
                .requires([params::DIGITALOCEAN_TOKEN]),
            deploy::Destroy::new(Environment::latest(), stacks.clone()),
        ),
        Target::new(
            TargetDefinition::new(DESTROY_COMMON)
                .with_description("Destroy the shared 'common' environment")
                .requires([params::DIGITALOCEAN_TOKEN]),
            deploy::Destroy::new(Environment::common(), stacks),
        ),
        Target::aggregate(
            TargetDefinition::new(DESTROY_ALL)
                .with_description("Destroy every environment: stage, latest, then common")
                .depends_on([DESTROY_COMMON, DESTROY_LATEST, DESTROY_STAGE]),
        ),
    ])?;

    Ok(registry)
}

/// Commit checked out in `root`, from `git rev-parse HEAD`
pub async fn detect_commit(runner: &dyn CommandRunner, root: &Path) -> Option<String> {
    let spec = CommandSpec::new("git").args(["rev-parse", "HEAD"]).cwd(root);
    match runner.run(&spec, &Redactor::none()).await {
        Ok(output) if output.success() => {
            let commit = output.stdout.trim().to_string();
            (!commit.is_empty()).then_some(commit)
        }
        Ok(output) => {
            debug!("git rev-parse failed: {}", output.stderr.trim());
            None
        }
        Err(e) => {
            debug!("git not available: {}", e);
            None
        }
    }
}
