//! Source tracking for configuration values.

use serde::{Deserialize, Serialize};

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Built-in default.
    Default,
    /// Process environment.
    Environment,
    /// Command-line flag.
    CommandLine,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Environment => write!(f, "environment"),
            Self::CommandLine => write!(f, "command line"),
        }
    }
}

/// A value paired with the place it was resolved from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
    /// Name of the environment variable, when the value came from one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
}

impl<T> Sourced<T> {
    pub fn default_value(value: T) -> Self {
        Self {
            value,
            source: ConfigSource::Default,
            env_var: None,
        }
    }

    pub fn from_env(value: T, env_var: impl Into<String>) -> Self {
        Self {
            value,
            source: ConfigSource::Environment,
            env_var: Some(env_var.into()),
        }
    }

    /// Replace the value with a command-line override when one was given.
    #[must_use]
    pub fn override_with(self, cli: Option<T>) -> Self {
        match cli {
            Some(value) => Self {
                value,
                source: ConfigSource::CommandLine,
                env_var: None,
            },
            None => self,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_with_none_keeps_source() {
        let sourced = Sourced::from_env(5u64, "PCOV_X");
        let kept = sourced.override_with(None);
        assert_eq!(kept.value, 5);
        assert_eq!(kept.source, ConfigSource::Environment);
        assert_eq!(kept.env_var.as_deref(), Some("PCOV_X"));
    }

    #[test]
    fn test_override_with_cli_value() {
        let sourced = Sourced::default_value("a".to_string());
        let overridden = sourced.override_with(Some("b".to_string()));
        assert_eq!(overridden.value, "b");
        assert_eq!(overridden.source, ConfigSource::CommandLine);
        assert!(overridden.env_var.is_none());
    }
}
