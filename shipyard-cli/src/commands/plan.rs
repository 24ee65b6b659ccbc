//! Plan command handler
//!
//! Shows the targets a run would execute, in order, and how each required
//! parameter resolves. Never prompts and never runs anything.

use anyhow::Result;
use clap::Args;
use colored::*;
use shipyard_runner::Executor;
use shipyard_stack::MemoryStackStore;
use std::sync::Arc;

use super::ParamArgs;
use crate::config::Config;
use crate::workflow;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Target to plan
    pub target: String,

    #[command(flatten)]
    pub params: ParamArgs,
}

/// Handle the plan command
pub async fn handle_plan(args: PlanArgs, config: &Config) -> Result<()> {
    let resolver = super::resolver(config, args.params, false).await?;
    let executor = Executor::new(workflow::registry(config, Arc::new(MemoryStackStore::new()))?);

    let plan = executor.plan(&args.target)?;
    println!(
        "{}",
        format!("Plan for '{}' ({} target(s)):", plan.requested(), plan.len()).bold()
    );
    println!();
    for (i, name) in plan.targets().iter().enumerate() {
        let Some(definition) = executor.registry().definition(name) else {
            continue;
        };
        println!("  {} {}", format!("{:>2}.", i + 1).dimmed(), name.cyan());
        if let Some(description) = &definition.description {
            println!("      {}", description.dimmed());
        }
        if !definition.requires.is_empty() {
            println!("      Requires: {}", definition.requires.join(", "));
        }
    }
    println!();

    // Reports every missing value at once
    let prepared = executor.prepare(&args.target, &resolver)?;
    let summary = prepared.parameters.summary();
    if summary.is_empty() {
        println!("{}", "No parameters required.".dimmed());
    } else {
        println!("{}", "Parameters:".bold());
        for (name, source, value) in summary {
            println!("  {} = {} {}", name, value, format!("({})", source).dimmed());
        }
    }

    Ok(())
}
