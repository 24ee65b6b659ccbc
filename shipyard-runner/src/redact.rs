//! Secret redaction
//!
//! Every string that may reach a log line or an error message passes
//! through a [`Redactor`] first.

use std::sync::Arc;

/// Replacement text for secret values
pub const MASK: &str = "****";

/// Replaces known secret values with [`MASK`]
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    /// Longest first, so a secret containing another is masked whole
    secrets: Arc<Vec<String>>,
}

impl Redactor {
    /// Creates a redactor that masks nothing
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a redactor for the given secret values
    ///
    /// Empty values are ignored.
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.is_empty())
            .collect();
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();

        Self {
            secrets: Arc::new(secrets),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Returns `text` with every secret masked
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in self.secrets.iter() {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), MASK);
            }
        }
        out
    }

    /// Redacts and joins a command line for display
    pub fn command_line(&self, program: &str, args: &[String]) -> String {
        let mut line = self.redact(program);
        for arg in args {
            line.push(' ');
            line.push_str(&self.redact(arg));
        }
        line
    }
}
