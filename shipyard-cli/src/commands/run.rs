//! Run command handler

use anyhow::Result;
use clap::Args;
use colored::*;
use shipyard_runner::{BuildContext, CommandRunner, Executor, Redactor, SystemCommandRunner};
use shipyard_stack::{MemoryStackStore, PulumiProvider, StackProvider};
use std::sync::Arc;
use tracing::debug;

use super::ParamArgs;
use crate::config::Config;
use crate::dry_run::RecordingRunner;
use crate::report;
use crate::workflow;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Target to run
    pub target: String,

    /// Fail on missing parameters instead of asking for them
    #[arg(long)]
    pub no_prompt: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Record commands and stack operations without executing them
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub params: ParamArgs,
}

/// Handle the run command
///
/// Resolves every parameter of the plan, then executes it. The report is
/// printed whether the run succeeds or not.
pub async fn handle_run(args: RunArgs, config: &Config) -> Result<()> {
    let resolver = super::resolver(config, args.params, !args.no_prompt).await?;

    let recorder = args.dry_run.then(|| Arc::new(RecordingRunner::dry_run()));
    let runner: Arc<dyn CommandRunner> = match &recorder {
        Some(recorder) => recorder.clone(),
        None => Arc::new(SystemCommandRunner::new().with_echo(config.echo_output)),
    };
    let stacks: Arc<dyn StackProvider> = if args.dry_run {
        Arc::new(MemoryStackStore::new())
    } else {
        Arc::new(PulumiProvider::new(&config.infrastructure_dir))
    };

    let executor = Executor::new(workflow::registry(config, stacks)?);
    let prepared = executor.prepare(&args.target, &resolver)?;
    for (name, source, value) in prepared.parameters.summary() {
        debug!("{} = {} ({})", name, value, source);
    }

    let ctx = BuildContext::new(config.root.clone(), prepared.parameters, runner);
    let result = executor.execute(&prepared.plan, &ctx).await;

    let report = match &result {
        Ok(report) => Some(report),
        Err(err) => err.report(),
    };
    if let Some(report) = report {
        if args.json {
            report::print_json(report)?;
        } else {
            if let Some(recorder) = &recorder {
                print_recorded(recorder, ctx.redactor());
            }
            report::print_report(report);
        }
    }

    result.map(|_| ()).map_err(Into::into)
}

/// Print the command lines a dry run would have executed
fn print_recorded(recorder: &RecordingRunner, redactor: &Redactor) {
    let lines = recorder.lines();
    if lines.is_empty() {
        return;
    }
    println!("{}", "Commands that would run:".bold());
    for line in lines {
        println!("  {} {}", "$".dimmed(), redactor.redact(&line));
    }
}
