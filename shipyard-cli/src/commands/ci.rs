//! CI command handler
//!
//! Prints a GitHub Actions workflow that runs a target on every pull
//! request, importing the secrets the target's plan reads.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use shipyard_core::domain::parameter::{ParameterCatalog, Requirement};
use shipyard_runner::Executor;
use shipyard_stack::MemoryStackStore;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::workflow::{self, targets};

const RUNNER_IMAGE: &str = "ubuntu-latest";

#[derive(Args, Debug)]
pub struct CiArgs {
    /// Target the workflow runs
    #[arg(default_value = targets::DEPLOY_LATEST)]
    pub target: String,

    /// Workflow name
    #[arg(long, default_value = "PR-DeployToLatest")]
    pub name: String,

    /// How the workflow invokes shipyard
    #[arg(long, default_value = "shipyard")]
    pub command: String,
}

#[derive(Debug, Serialize)]
struct GithubWorkflow {
    name: String,
    on: Vec<String>,
    jobs: BTreeMap<String, Job>,
}

#[derive(Debug, Serialize)]
struct Job {
    name: String,
    #[serde(rename = "runs-on")]
    runs_on: String,
    steps: Vec<Step>,
}

#[derive(Debug, Default, Serialize)]
struct Step {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uses: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    run: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
}

/// Handle the ci command
pub fn handle_ci(args: CiArgs, config: &Config) -> Result<()> {
    let executor = Executor::new(workflow::registry(config, Arc::new(MemoryStackStore::new()))?);
    let catalog = workflow::catalog(true, None);

    let secrets = plan_secrets(&executor, &catalog, &args.target)?;
    let yaml = render(&args, &secrets)?;
    print!("{}", yaml);
    Ok(())
}

/// Environment names of every secret the plan for `target` reads
fn plan_secrets(executor: &Executor, catalog: &ParameterCatalog, target: &str) -> Result<Vec<String>> {
    let plan = executor.plan(target)?;

    let mut secrets = Vec::new();
    for name in plan.targets() {
        let Some(definition) = executor.registry().definition(name) else {
            continue;
        };
        for declared in definition.requires.iter().chain(&definition.uses) {
            let parameters = match catalog.requirement(declared) {
                Some(Requirement::Parameter(parameter)) => vec![parameter],
                Some(Requirement::Group(group)) => group
                    .members
                    .iter()
                    .filter_map(|member| catalog.parameter(member))
                    .collect(),
                None => Vec::new(),
            };
            for parameter in parameters.into_iter().filter(|p| p.secret) {
                let env = parameter.env_var();
                if !secrets.contains(&env) {
                    secrets.push(env);
                }
            }
        }
    }

    Ok(secrets)
}

fn render(args: &CiArgs, secrets: &[String]) -> Result<String> {
    let run = Step {
        name: Some(format!("Run '{}'", args.target)),
        run: Some(format!("{} run {} --no-prompt", args.command, args.target)),
        env: secrets
            .iter()
            .map(|s| (s.clone(), format!("${{{{ secrets.{} }}}}", s)))
            .collect(),
        ..Default::default()
    };
    let checkout = Step {
        uses: Some("actions/checkout@v4".to_string()),
        ..Default::default()
    };

    let workflow = GithubWorkflow {
        name: args.name.clone(),
        on: vec!["pull_request".to_string()],
        jobs: BTreeMap::from([(
            RUNNER_IMAGE.to_string(),
            Job {
                name: RUNNER_IMAGE.to_string(),
                runs_on: RUNNER_IMAGE.to_string(),
                steps: vec![checkout, run],
            },
        )]),
    };

    serde_yaml_ng::to_string(&workflow).context("Failed to render workflow")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml_ng::Value;

    fn args(target: &str) -> CiArgs {
        CiArgs {
            target: target.to_string(),
            name: "PR-DeployToLatest".to_string(),
            command: "shipyard".to_string(),
        }
    }

    fn executor() -> Executor {
        let config = Config::new(".");
        Executor::new(workflow::registry(&config, Arc::new(MemoryStackStore::new())).unwrap())
    }

    #[test]
    fn test_deploy_latest_imports_registry_and_cloud_secrets() {
        let catalog = workflow::catalog(true, None);
        let secrets = plan_secrets(&executor(), &catalog, targets::DEPLOY_LATEST).unwrap();
        assert_eq!(
            secrets,
            vec!["REGISTRY_URL", "REGISTRY_TOKEN", "DIGITALOCEAN_TOKEN"]
        );
    }

    #[test]
    fn test_build_only_target_imports_nothing() {
        let catalog = workflow::catalog(true, None);
        let secrets = plan_secrets(&executor(), &catalog, targets::TEST).unwrap();
        assert!(secrets.is_empty());
    }

    #[test]
    fn test_unknown_target() {
        let catalog = workflow::catalog(true, None);
        assert!(plan_secrets(&executor(), &catalog, "nope").is_err());
    }

    #[test]
    fn test_render_workflow() {
        let secrets = vec!["REGISTRY_URL".to_string(), "DIGITALOCEAN_TOKEN".to_string()];
        let yaml = render(&args(targets::DEPLOY_LATEST), &secrets).unwrap();
        let doc: Value = serde_yaml_ng::from_str(&yaml).unwrap();

        assert_eq!(doc["name"].as_str(), Some("PR-DeployToLatest"));
        assert_eq!(doc["on"][0].as_str(), Some("pull_request"));

        let job = &doc["jobs"]["ubuntu-latest"];
        assert_eq!(job["runs-on"].as_str(), Some("ubuntu-latest"));
        assert_eq!(job["steps"][0]["uses"].as_str(), Some("actions/checkout@v4"));

        let step = &job["steps"][1];
        assert_eq!(
            step["run"].as_str(),
            Some("shipyard run deploy-latest --no-prompt")
        );
        assert_eq!(
            step["env"]["DIGITALOCEAN_TOKEN"].as_str(),
            Some("${{ secrets.DIGITALOCEAN_TOKEN }}")
        );
        assert_eq!(
            step["env"]["REGISTRY_URL"].as_str(),
            Some("${{ secrets.REGISTRY_URL }}")
        );
    }
}
