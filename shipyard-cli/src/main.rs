//! Shipyard CLI
//!
//! Builds, containerizes and deploys the application by running named
//! targets in dependency order.
//!
//! Architecture:
//! - Configuration: repository layout from flags or environment
//! - Workflow: the concrete targets and parameters
//! - Commands: run, plan, list, tag and ci
//! - Report: human or JSON output and exit codes

mod commands;
mod config;
mod dry_run;
mod report;
mod workflow;

use clap::{ArgAction, Parser};
use commands::{Commands, handle_command};
use config::{Config, DEFAULT_APP_NAME};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "shipyard", version)]
#[command(about = "Build and deployment orchestration", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv); also echoes command output
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Repository root
    #[arg(long, env = "SHIPYARD_ROOT", default_value = ".")]
    root: PathBuf,

    /// Container image name
    #[arg(long, env = "SHIPYARD_APP_NAME", default_value = DEFAULT_APP_NAME)]
    app_name: String,

    /// Infrastructure program directory, relative to the root
    #[arg(long, env = "SHIPYARD_INFRASTRUCTURE_DIR", default_value = "infrastructure")]
    infrastructure_dir: PathBuf,

    /// Publish output directory, relative to the root
    #[arg(long, env = "SHIPYARD_PUBLISH_DIR", default_value = "publish")]
    publish_dir: PathBuf,

    /// Web project to publish, relative to the root
    #[arg(long, env = "SHIPYARD_WEB_PROJECT", default_value = "src/QuestionsApp.Web")]
    web_project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }

    fn config(&self) -> anyhow::Result<Config> {
        let mut config = Config::new(&self.root).with_ci_from_env();
        config.app_name = self.app_name.clone();
        config.infrastructure_dir = self.infrastructure_dir.clone();
        config.publish_dir = self.publish_dir.clone();
        config.web_project = self.web_project.clone();
        config.echo_output = self.verbose > 0;

        config.validate()?;
        config.canonicalize_root()
    }
}

fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { report::EXIT_USAGE } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    init_logging(cli.log_level());

    let config = match cli.config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {:#}", err);
            return ExitCode::from(report::EXIT_USAGE);
        }
    };
    debug!("Configuration: {:?}", config);

    match handle_command(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report::print_error(&err);
            ExitCode::from(report::exit_code(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_parses_parameters_after_target() {
        let cli = Cli::try_parse_from([
            "shipyard",
            "-v",
            "run",
            "--dry-run",
            "-p",
            "commit=abcdef1",
            "push",
            "--registry-url=registry.example.com/acme",
            "--configuration",
            "Release",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.target, "push");
        assert!(args.dry_run);
        assert_eq!(
            args.params.into_pairs().unwrap(),
            vec![
                ("commit".to_string(), "abcdef1".to_string()),
                (
                    "registry-url".to_string(),
                    "registry.example.com/acme".to_string()
                ),
                ("configuration".to_string(), "Release".to_string()),
            ]
        );
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["shipyard", "-q", "-v", "list"]).is_err());
    }

    #[test]
    fn test_log_level() {
        let cli = Cli::try_parse_from(["shipyard", "-vv", "list"]).unwrap();
        assert_eq!(cli.log_level(), "trace");
        let cli = Cli::try_parse_from(["shipyard", "--quiet", "list"]).unwrap();
        assert_eq!(cli.log_level(), "warn");
    }
}
