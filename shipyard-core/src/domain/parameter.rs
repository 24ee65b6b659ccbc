//! Parameter domain types
//!
//! Parameters are the external values a build needs: build configuration,
//! registry URL, API tokens. Targets declare them by name; the runner
//! resolves every declared name once, before the first target body runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Definition of a single parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub description: Option<String>,
    /// Value must never be logged or echoed
    pub secret: bool,
    /// Absent or empty is acceptable
    pub nullable: bool,
    /// May be asked for interactively when running attended
    pub promptable: bool,
    #[serde(default)]
    pub default: Option<String>,
}

impl ParameterDefinition {
    /// Create a required, non-secret parameter
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            secret: false,
            nullable: false,
            promptable: false,
            default: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn promptable(mut self) -> Self {
        self.promptable = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Environment variable consulted for this parameter
    ///
    /// `registry-url` becomes `REGISTRY_URL`.
    pub fn env_var(&self) -> String {
        env_var_name(&self.name)
    }
}

/// Converts a parameter name to its environment variable name
pub fn env_var_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '-' | '.' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// A set of alternative parameters, tried in order
///
/// Resolves to the first member whose value is present and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterGroup {
    pub name: String,
    pub description: Option<String>,
    /// Member parameter names in precedence order
    pub members: Vec<String>,
}

impl ParameterGroup {
    pub fn new<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            description: None,
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterSource {
    Argument,
    Environment,
    Prompt,
    Default,
}

impl std::fmt::Display for ParameterSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParameterSource::Argument => "argument",
            ParameterSource::Environment => "environment",
            ParameterSource::Prompt => "prompt",
            ParameterSource::Default => "default",
        };
        write!(f, "{}", s)
    }
}

/// A name a target can require
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement<'a> {
    Parameter(&'a ParameterDefinition),
    Group(&'a ParameterGroup),
}

/// All parameters and groups known to a build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterCatalog {
    parameters: BTreeMap<String, ParameterDefinition>,
    groups: BTreeMap<String, ParameterGroup>,
}

impl ParameterCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, replacing any previous definition with the same name
    pub fn add(&mut self, parameter: ParameterDefinition) {
        self.parameters.insert(parameter.name.clone(), parameter);
    }

    /// Add a group of alternative parameters
    pub fn add_group(&mut self, group: ParameterGroup) {
        self.groups.insert(group.name.clone(), group);
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.get(name)
    }

    pub fn group(&self, name: &str) -> Option<&ParameterGroup> {
        self.groups.get(name)
    }

    /// Look up a name a target requires; parameters shadow groups
    pub fn requirement(&self, name: &str) -> Option<Requirement<'_>> {
        self.parameters
            .get(name)
            .map(Requirement::Parameter)
            .or_else(|| self.groups.get(name).map(Requirement::Group))
    }

    pub fn parameters(&self) -> impl Iterator<Item = &ParameterDefinition> {
        self.parameters.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &ParameterGroup> {
        self.groups.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("registry-url"), "REGISTRY_URL");
        assert_eq!(env_var_name("DigitalOcean_Token"), "DIGITALOCEAN_TOKEN");
        assert_eq!(env_var_name("commit"), "COMMIT");
    }

    #[test]
    fn test_parameter_builder() {
        let param = ParameterDefinition::new("registry-url")
            .with_description("Docker registry host")
            .secret()
            .nullable();

        assert!(param.secret);
        assert!(param.nullable);
        assert!(!param.promptable);
        assert_eq!(param.default, None);
        assert_eq!(param.env_var(), "REGISTRY_URL");
    }

    #[test]
    fn test_catalog_requirement_lookup() {
        let mut catalog = ParameterCatalog::new();
        catalog.add(ParameterDefinition::new("registry-token").secret());
        catalog.add_group(ParameterGroup::new(
            "registry-credential",
            ["registry-token", "digitalocean-token"],
        ));

        assert!(matches!(
            catalog.requirement("registry-token"),
            Some(Requirement::Parameter(p)) if p.secret
        ));
        assert!(matches!(
            catalog.requirement("registry-credential"),
            Some(Requirement::Group(g)) if g.members.len() == 2
        ));
        assert!(catalog.requirement("missing").is_none());
    }
}
