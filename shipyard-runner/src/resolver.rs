//! Parameter and secret resolution
//!
//! Resolves the parameters declared by planned targets before any target
//! runs. Sources are tried in order, first non-empty value wins:
//! 1. Explicit invocation arguments (`--registry-url=...`)
//! 2. Environment variables (`REGISTRY_URL`)
//! 3. Interactive prompt, when attended and the parameter allows it
//! 4. The declared default
//!
//! Resolution happens in one batch so that a run never starts only to find
//! out halfway through that a credential is missing.

use is_terminal::IsTerminal;
use serde::Serialize;
use shipyard_core::domain::parameter::{
    ParameterCatalog, ParameterDefinition, ParameterSource, Requirement, env_var_name,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::redact::{MASK, Redactor};

/// Provides environment variables
///
/// Abstracted so tests can resolve against a fixed map instead of the
/// process environment.
pub trait VarProvider: Send + Sync {
    /// Get a variable by name
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads the real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl VarProvider for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl VarProvider for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// Asks the operator for a parameter value
pub trait Prompter: Send + Sync {
    /// Returns `None` when no value was entered
    fn prompt(&self, parameter: &ParameterDefinition) -> std::io::Result<Option<String>>;
}

/// Prompts on the terminal; secrets are read without echo
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    /// Whether someone is at the terminal to answer
    pub fn is_attended() -> bool {
        std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
    }
}

impl Prompter for TerminalPrompter {
    fn prompt(&self, parameter: &ParameterDefinition) -> std::io::Result<Option<String>> {
        if !Self::is_attended() {
            return Ok(None);
        }

        let label = match &parameter.description {
            Some(desc) => format!("{} ({})", parameter.name, desc),
            None => parameter.name.clone(),
        };

        let value = if parameter.secret {
            dialoguer::Password::new()
                .with_prompt(label)
                .allow_empty_password(true)
                .interact()
        } else {
            dialoguer::Input::<String>::new()
                .with_prompt(label)
                .allow_empty(true)
                .interact_text()
        }
        .map_err(|e| std::io::Error::other(e.to_string()))?;

        Ok(non_empty(value))
    }
}

/// A parameter (or group) no source could supply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingParameter {
    pub name: String,
    /// Planned targets that declared it
    pub required_by: Vec<String>,
    /// Alternatives tried, for groups
    pub alternatives: Vec<String>,
}

impl fmt::Display for MissingParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alternatives.is_empty() {
            write!(f, "'{}' (--{} or {})", self.name, self.name, env_var_name(&self.name))?;
        } else {
            write!(f, "'{}' (one of: {})", self.name, self.alternatives.join(", "))?;
        }
        write!(f, " required by {}", self.required_by.join(", "))
    }
}

/// Errors resolving parameters
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A target requires a name that is neither a parameter nor a group
    #[error("Target '{target}' requires unknown parameter '{name}'")]
    UnknownParameter { name: String, target: String },

    /// One or more required values could not be resolved
    #[error("Missing required parameter(s): {}", .0.iter().map(|m| m.to_string()).collect::<Vec<_>>().join("; "))]
    Missing(Vec<MissingParameter>),

    /// The interactive prompt failed
    #[error("Failed to prompt for '{name}': {source}")]
    Prompt {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// One resolved value
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedValue {
    pub value: String,
    pub secret: bool,
    pub source: ParameterSource,
}

impl fmt::Debug for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = if self.secret { MASK } else { self.value.as_str() };
        f.debug_struct("ResolvedValue")
            .field("value", &value)
            .field("secret", &self.secret)
            .field("source", &self.source)
            .finish()
    }
}

/// Immutable set of resolved parameters for one run
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    values: BTreeMap<String, ResolvedValue>,
}

impl Parameters {
    /// Value of a parameter or group, if resolved
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|v| v.value.as_str())
    }

    /// Value of a parameter the calling target declared as required
    pub fn require(&self, name: &str) -> anyhow::Result<&str> {
        self.get(name).ok_or_else(|| {
            anyhow::anyhow!(
                "Parameter '{}' is not available; is it declared in the target's requirements?",
                name
            )
        })
    }

    pub fn source(&self, name: &str) -> Option<ParameterSource> {
        self.values.get(name).map(|v| v.source)
    }

    pub fn is_secret(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|v| v.secret)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Redactor masking every secret value in this set
    pub fn redactor(&self) -> Redactor {
        Redactor::new(
            self.values
                .values()
                .filter(|v| v.secret)
                .map(|v| v.value.clone()),
        )
    }

    /// Name, source and display value of each entry, secrets masked
    pub fn summary(&self) -> Vec<(String, ParameterSource, String)> {
        self.values
            .iter()
            .map(|(name, v)| {
                let shown = if v.secret {
                    MASK.to_string()
                } else {
                    v.value.clone()
                };
                (name.clone(), v.source, shown)
            })
            .collect()
    }

    fn insert(&mut self, name: &str, value: ResolvedValue) {
        self.values.insert(name.to_string(), value);
    }
}

/// A name declared by planned targets
struct Declared<'a> {
    name: &'a str,
    /// First target that declared it
    first: &'a str,
    /// Targets that require it; empty when only used
    required_by: Vec<String>,
}

/// Resolves parameters from arguments, environment, prompt and defaults
pub struct ParameterResolver {
    catalog: ParameterCatalog,
    /// Keyed by normalized (environment style) name
    arguments: HashMap<String, String>,
    env: Box<dyn VarProvider>,
    prompter: Option<Box<dyn Prompter>>,
}

impl ParameterResolver {
    /// Creates a resolver reading the process environment, without prompting
    pub fn new(catalog: ParameterCatalog) -> Self {
        Self {
            catalog,
            arguments: HashMap::new(),
            env: Box::new(ProcessEnv),
            prompter: None,
        }
    }

    /// Explicit values from the command line
    ///
    /// Names match case-insensitively and `-`/`_` are interchangeable.
    pub fn with_arguments<I, K, V>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        self.arguments
            .extend(arguments.into_iter().map(|(k, v)| (env_var_name(k.as_ref()), v.into())));
        self
    }

    pub fn with_env(mut self, env: impl VarProvider + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    pub fn with_prompter(mut self, prompter: impl Prompter + 'static) -> Self {
        self.prompter = Some(Box::new(prompter));
        self
    }

    pub fn catalog(&self) -> &ParameterCatalog {
        &self.catalog
    }

    /// Resolve a single parameter
    ///
    /// # Returns
    /// `None` when no source supplies a non-empty value
    pub fn resolve(&self, parameter: &ParameterDefinition) -> Result<Option<ResolvedValue>, ResolveError> {
        if let Some(found) = self.resolve_unprompted(parameter) {
            return Ok(Some(found));
        }
        if let Some(found) = self.prompt(parameter)? {
            return Ok(Some(found));
        }
        Ok(self.default_for(parameter))
    }

    /// Resolve every requirement of the given targets in one batch
    ///
    /// # Arguments
    /// * `requirements` - `(requirement name, declaring target)` pairs
    ///
    /// # Returns
    /// All resolved values, or every missing non-nullable requirement at once
    pub fn resolve_all<'a, I>(&self, requirements: I) -> Result<Parameters, ResolveError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.resolve_plan(requirements, std::iter::empty::<(&str, &str)>())
    }

    /// Resolve required and optionally used names in one batch
    ///
    /// A name is reported missing only when some target requires it; names
    /// that are only used resolve when a source has a value.
    ///
    /// # Arguments
    /// * `required` - `(name, declaring target)` pairs that must resolve
    /// * `used` - `(name, declaring target)` pairs read when present
    pub fn resolve_plan<'a, R, U>(&self, required: R, used: U) -> Result<Parameters, ResolveError>
    where
        R: IntoIterator<Item = (&'a str, &'a str)>,
        U: IntoIterator<Item = (&'a str, &'a str)>,
    {
        // Preserve first-seen order so error messages follow the plan
        let mut declared: Vec<Declared<'a>> = Vec::new();
        let strict = required.into_iter().map(|(n, t)| (n, t, true));
        let optional = used.into_iter().map(|(n, t)| (n, t, false));
        for (name, target, is_required) in strict.chain(optional) {
            let index = match declared.iter().position(|d| d.name == name) {
                Some(index) => index,
                None => {
                    declared.push(Declared {
                        name,
                        first: target,
                        required_by: Vec::new(),
                    });
                    declared.len() - 1
                }
            };
            if is_required {
                declared[index].required_by.push(target.to_string());
            }
        }

        let mut planned = Vec::with_capacity(declared.len());
        for (index, declared) in declared.into_iter().enumerate() {
            let requirement = self.catalog.requirement(declared.name).ok_or_else(|| {
                ResolveError::UnknownParameter {
                    name: declared.name.to_string(),
                    target: declared.first.to_string(),
                }
            })?;
            planned.push((index, declared, requirement));
        }
        // Parameters before groups, so a group reuses a member already resolved
        planned.sort_by_key(|(_, _, requirement)| matches!(requirement, Requirement::Group(_)));

        let mut parameters = Parameters::default();
        let mut missing = Vec::new();

        for (index, declared, requirement) in planned {
            let Declared {
                name,
                first,
                required_by: targets,
            } = declared;
            let required = !targets.is_empty();

            match requirement {
                Requirement::Parameter(parameter) => {
                    if parameters.get(name).is_some() {
                        continue;
                    }
                    match self.resolve_declared(parameter, required)? {
                        Some(value) => {
                            debug!("Resolved parameter '{}' from {}", name, value.source);
                            parameters.insert(name, value);
                        }
                        None if parameter.nullable || !required => {
                            debug!("Parameter '{}' is unset (optional)", name);
                        }
                        None => missing.push((
                            index,
                            MissingParameter {
                                name: name.to_string(),
                                required_by: targets,
                                alternatives: Vec::new(),
                            },
                        )),
                    }
                }
                Requirement::Group(group) => {
                    let members = group
                        .members
                        .iter()
                        .map(|member| {
                            self.catalog.parameter(member).ok_or_else(|| {
                                ResolveError::UnknownParameter {
                                    name: member.clone(),
                                    target: first.to_string(),
                                }
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?;

                    match self.resolve_group(&members, &parameters, required)? {
                        Some((member, value)) => {
                            debug!(
                                "Resolved group '{}' using '{}' from {}",
                                name, member, value.source
                            );
                            if parameters.get(member).is_none() {
                                parameters.insert(member, value.clone());
                            }
                            parameters.insert(name, value);
                        }
                        None if !required => {
                            debug!("Group '{}' is unset (optional)", name);
                        }
                        None => missing.push((
                            index,
                            MissingParameter {
                                name: name.to_string(),
                                required_by: targets,
                                alternatives: group.members.clone(),
                            },
                        )),
                    }
                }
            }
        }

        if !missing.is_empty() {
            missing.sort_by_key(|(index, _)| *index);
            return Err(ResolveError::Missing(
                missing.into_iter().map(|(_, missing)| missing).collect(),
            ));
        }

        Ok(parameters)
    }

    /// Optional names never prompt
    fn resolve_declared(
        &self,
        parameter: &ParameterDefinition,
        required: bool,
    ) -> Result<Option<ResolvedValue>, ResolveError> {
        if required {
            return self.resolve(parameter);
        }
        Ok(self
            .resolve_unprompted(parameter)
            .or_else(|| self.default_for(parameter)))
    }

    /// First member with a value; prompting only once no member has one
    ///
    /// Members already resolved for this run count as having a value and
    /// are never resolved again.
    fn resolve_group<'p>(
        &self,
        members: &[&'p ParameterDefinition],
        resolved: &Parameters,
        required: bool,
    ) -> Result<Option<(&'p str, ResolvedValue)>, ResolveError> {
        for member in members {
            let cached = resolved.values.get(&member.name).cloned();
            if let Some(value) = cached.or_else(|| self.resolve_unprompted(member)) {
                return Ok(Some((member.name.as_str(), value)));
            }
        }
        if required {
            for member in members {
                if let Some(value) = self.prompt(member)? {
                    return Ok(Some((member.name.as_str(), value)));
                }
            }
        }
        for member in members {
            if let Some(value) = self.default_for(member) {
                return Ok(Some((member.name.as_str(), value)));
            }
        }
        Ok(None)
    }

    fn resolve_unprompted(&self, parameter: &ParameterDefinition) -> Option<ResolvedValue> {
        let resolved = |value: String, source| ResolvedValue {
            value,
            secret: parameter.secret,
            source,
        };

        let key = parameter.env_var();
        if let Some(value) = self.arguments.get(&key).cloned().and_then(non_empty) {
            return Some(resolved(value, ParameterSource::Argument));
        }

        let from_env = self
            .env
            .get(&key)
            .and_then(non_empty)
            .or_else(|| self.env.get(&parameter.name).and_then(non_empty));
        from_env.map(|value| resolved(value, ParameterSource::Environment))
    }

    fn prompt(&self, parameter: &ParameterDefinition) -> Result<Option<ResolvedValue>, ResolveError> {
        let Some(prompter) = self.prompter.as_ref().filter(|_| parameter.promptable) else {
            return Ok(None);
        };

        let value = prompter
            .prompt(parameter)
            .map_err(|source| ResolveError::Prompt {
                name: parameter.name.clone(),
                source,
            })?;

        Ok(value.and_then(non_empty).map(|value| ResolvedValue {
            value,
            secret: parameter.secret,
            source: ParameterSource::Prompt,
        }))
    }

    fn default_for(&self, parameter: &ParameterDefinition) -> Option<ResolvedValue> {
        parameter
            .default
            .clone()
            .and_then(non_empty)
            .map(|value| ResolvedValue {
                value,
                secret: parameter.secret,
                source: ParameterSource::Default,
            })
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
