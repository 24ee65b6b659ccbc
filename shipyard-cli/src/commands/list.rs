//! List command handler

use anyhow::Result;
use colored::*;
use shipyard_core::domain::parameter::ParameterDefinition;
use shipyard_stack::MemoryStackStore;
use std::sync::Arc;

use crate::config::Config;
use crate::workflow;

/// Print every target and every parameter
pub fn handle_list(config: &Config) -> Result<()> {
    let registry = workflow::registry(config, Arc::new(MemoryStackStore::new()))?;

    println!("{}", "Targets:".bold());
    for target in registry.graph().targets() {
        println!("  {} {}", "▸".cyan(), target.name.bold());
        if let Some(description) = &target.description {
            println!("    {}", description.dimmed());
        }
        if !target.depends_on.is_empty() {
            println!("    Depends on:  {}", target.depends_on.join(", "));
        }
        if !target.runs_before.is_empty() {
            println!("    Runs before: {}", target.runs_before.join(", "));
        }
        if !target.requires.is_empty() {
            println!("    Requires:    {}", target.requires.join(", "));
        }
        if !target.uses.is_empty() {
            println!("    Uses:        {}", target.uses.join(", "));
        }
    }

    let catalog = workflow::catalog(config.ci, None);

    println!();
    println!("{}", "Parameters:".bold());
    for parameter in catalog.parameters() {
        println!(
            "  {} {} {}",
            "▸".cyan(),
            format!("--{}", parameter.name).bold(),
            parameter.env_var().dimmed()
        );
        if let Some(description) = &parameter.description {
            println!("    {}", description.dimmed());
        }
        let traits = traits(parameter);
        if !traits.is_empty() {
            println!("    {}", traits.join(", ").yellow());
        }
    }

    let groups: Vec<_> = catalog.groups().collect();
    if !groups.is_empty() {
        println!();
        println!("{}", "Parameter groups:".bold());
        for group in groups {
            println!(
                "  {} {}: first of {}",
                "▸".cyan(),
                group.name.bold(),
                group.members.join(", ")
            );
        }
    }

    Ok(())
}

fn traits(parameter: &ParameterDefinition) -> Vec<String> {
    let mut traits = Vec::new();
    if parameter.secret {
        traits.push("secret".to_string());
    }
    if parameter.nullable {
        traits.push("optional".to_string());
    }
    if parameter.promptable {
        traits.push("prompted when attended".to_string());
    }
    if let Some(default) = &parameter.default {
        traits.push(format!("default: {}", default));
    }
    traits
}
