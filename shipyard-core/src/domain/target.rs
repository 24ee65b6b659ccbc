//! Target domain types

use serde::{Deserialize, Serialize};

/// Static definition of a build target
///
/// The body of a target lives in the runner; this is the part the planner
/// needs: identity, ordering edges and the parameters it requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDefinition {
    pub name: String,
    pub description: Option<String>,
    /// Targets that must complete successfully before this one runs
    pub depends_on: Vec<String>,
    /// Targets this one must run before, when both are planned
    pub runs_before: Vec<String>,
    /// Parameter or parameter-group names resolved before the run starts
    pub requires: Vec<String>,
    /// Names read when a value is available; never reported missing
    #[serde(default)]
    pub uses: Vec<String>,
}

impl TargetDefinition {
    /// Create a definition with no edges and no requirements
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            depends_on: Vec::new(),
            runs_before: Vec::new(),
            requires: Vec::new(),
            uses: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add prerequisite targets
    pub fn depends_on<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(targets.into_iter().map(Into::into));
        self
    }

    /// Add ordering constraints
    pub fn runs_before<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runs_before.extend(targets.into_iter().map(Into::into));
        self
    }

    /// Add required parameters or parameter groups
    pub fn requires<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(parameters.into_iter().map(Into::into));
        self
    }

    /// Add parameters read only when they have a value
    pub fn uses<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uses.extend(parameters.into_iter().map(Into::into));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates_edges() {
        let def = TargetDefinition::new("publish")
            .with_description("Publish the web project")
            .depends_on(["clean", "restore"])
            .depends_on(["test"])
            .runs_before(["containerize"])
            .requires(["configuration"])
            .uses(["registry-url"]);

        assert_eq!(def.name, "publish");
        assert_eq!(def.depends_on, vec!["clean", "restore", "test"]);
        assert_eq!(def.runs_before, vec!["containerize"]);
        assert_eq!(def.requires, vec!["configuration"]);
        assert_eq!(def.uses, vec!["registry-url"]);
        assert_eq!(def.description.as_deref(), Some("Publish the web project"));
    }
}
