//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod ci;
mod list;
mod plan;
mod run;
mod tag;

pub use ci::CiArgs;
pub use plan::PlanArgs;
pub use run::RunArgs;

use anyhow::Result;
use clap::{Args, Subcommand};
use shipyard_core::domain::parameter::{ParameterCatalog, env_var_name};
use shipyard_runner::resolver::TerminalPrompter;
use shipyard_runner::{ParameterResolver, SystemCommandRunner};

use crate::config::Config;
use crate::report::UsageError;
use crate::workflow;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a target after its dependencies
    Run(RunArgs),
    /// Show what a target would run and which parameters resolve
    Plan(PlanArgs),
    /// List targets and parameters
    List,
    /// Print a fresh artifact tag
    Tag {
        /// Commit hash; defaults to the checked out commit
        #[arg(long, env = "COMMIT")]
        commit: Option<String>,
    },
    /// Print a GitHub Actions workflow that runs a target on pull requests
    Ci(CiArgs),
}

/// Parameter values given on the command line
#[derive(Args, Debug, Default)]
pub struct ParamArgs {
    /// Parameter as name=value (e.g. -p configuration=Release)
    #[arg(short = 'p', long = "param", value_parser = parse_key_val)]
    param: Vec<(String, String)>,

    /// Parameters as --name=value, after all other options
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "--NAME=VALUE"
    )]
    rest: Vec<String>,
}

impl ParamArgs {
    /// All explicit parameter values, `-p` first
    pub fn into_pairs(self) -> Result<Vec<(String, String)>> {
        let mut pairs = self.param;
        pairs.extend(parse_parameter_flags(&self.rest)?);
        Ok(pairs)
    }
}

/// Parse a single key=value pair
fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Parse `--name=value` and `--name value` parameter flags
fn parse_parameter_flags(args: &[String]) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let Some(flag) = arg.strip_prefix("--") else {
            anyhow::bail!("Unexpected argument '{}'; parameters are passed as --name=value", arg);
        };

        match flag.split_once('=') {
            Some((name, value)) => pairs.push((name.to_string(), value.to_string())),
            None => match iter.next() {
                Some(value) if !value.starts_with("--") => {
                    pairs.push((flag.to_string(), value.clone()))
                }
                _ => anyhow::bail!(
                    "Parameter '--{}' needs a value; put options before --name=value parameters",
                    flag
                ),
            },
        }
    }

    Ok(pairs)
}

/// Rejects explicit values for parameters nobody declares
fn check_parameter_names(catalog: &ParameterCatalog, pairs: &[(String, String)]) -> Result<()> {
    for (name, _) in pairs {
        let key = env_var_name(name);
        if !catalog.parameters().any(|p| p.env_var() == key) {
            anyhow::bail!("Unknown parameter '{}'; see `shipyard list`", name);
        }
    }
    Ok(())
}

/// Builds the parameter resolver for a run
///
/// # Arguments
/// * `config` - CLI configuration
/// * `params` - Explicit values from the command line
/// * `prompt` - Allow interactive prompts when attended
async fn resolver(config: &Config, params: ParamArgs, prompt: bool) -> Result<ParameterResolver> {
    let commit = workflow::detect_commit(&SystemCommandRunner::new(), &config.root).await;
    let catalog = workflow::catalog(config.ci, commit.as_deref());

    let pairs = params
        .into_pairs()
        .and_then(|pairs| check_parameter_names(&catalog, &pairs).map(|_| pairs))
        .map_err(|e| UsageError(e.to_string()))?;

    let mut resolver = ParameterResolver::new(catalog).with_arguments(pairs);
    if prompt && TerminalPrompter::is_attended() {
        resolver = resolver.with_prompter(TerminalPrompter);
    }
    Ok(resolver)
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run(args) => run::handle_run(args, config).await,
        Commands::Plan(args) => plan::handle_plan(args, config).await,
        Commands::List => list::handle_list(config),
        Commands::Tag { commit } => tag::handle_tag(commit, config).await,
        Commands::Ci(args) => ci::handle_ci(args, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("registry-url=r.example.com/a=b").unwrap(),
            ("registry-url".to_string(), "r.example.com/a=b".to_string())
        );
        assert!(parse_key_val("commit").is_err());
    }

    #[test]
    fn test_parse_parameter_flags() {
        let pairs = parse_parameter_flags(&strings(&[
            "--configuration=Release",
            "--commit",
            "abcdef1",
            "--registry-url=",
        ]))
        .unwrap();
        assert_eq!(
            pairs,
            vec![
                ("configuration".to_string(), "Release".to_string()),
                ("commit".to_string(), "abcdef1".to_string()),
                ("registry-url".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_parse_parameter_flags_errors() {
        assert!(parse_parameter_flags(&strings(&["commit=abc"])).is_err());
        assert!(parse_parameter_flags(&strings(&["--commit"])).is_err());
        assert!(parse_parameter_flags(&strings(&["--commit", "--json"])).is_err());
    }

    #[test]
    fn test_check_parameter_names() {
        let catalog = workflow::catalog(false, None);
        let ok = vec![
            ("digitalocean_token".to_string(), "t".to_string()),
            ("REGISTRY-URL".to_string(), "r".to_string()),
        ];
        assert!(check_parameter_names(&catalog, &ok).is_ok());

        let typo = vec![("comit".to_string(), "abc".to_string())];
        assert!(check_parameter_names(&catalog, &typo).is_err());

        // Groups resolve through their members
        let group = vec![("registry-credential".to_string(), "c".to_string())];
        assert!(check_parameter_names(&catalog, &group).is_err());
    }
}
