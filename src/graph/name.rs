// src/graph/name.rs

//! Structured task identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a node in the task graph.
///
/// The kind plus the discriminating fields identify a task both for display
/// and for addressing its persisted incremental state, so two tasks in the
/// same workspace must not share a full name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskName {
    /// Task kind, e.g. "compile", "link", "copy", "graph".
    pub kind: String,
    pub name: String,
    /// Build environment discriminator (e.g. "darwin-x86_64"), if any.
    pub environment: Option<String>,
    /// Build variant discriminator (e.g. "debug", "release"), if any.
    pub variant: Option<String>,
}

impl TaskName {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            environment: None,
            variant: None,
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Stable identity string used to address persisted state across
    /// sessions.
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)?;
        if let Some(env) = &self.environment {
            write!(f, ":{env}")?;
        }
        if let Some(variant) = &self.variant {
            write!(f, ":{variant}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_discriminators_in_order() {
        let name = TaskName::new("compile", "parser")
            .with_environment("linux-x86_64")
            .with_variant("release");
        assert_eq!(name.to_string(), "compile:parser:linux-x86_64:release");
        assert_eq!(name.storage_key(), name.to_string());
    }

    #[test]
    fn bare_name_has_no_trailing_separators() {
        assert_eq!(TaskName::new("copy", "assets").to_string(), "copy:assets");
    }
}
