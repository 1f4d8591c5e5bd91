//! Typed reads of `PCOV_*` environment variables.
//!
//! A bad value never aborts startup: the parser falls back to the default,
//! remembers an [`EnvError`], and the binaries log every collected error once
//! logging is up.

use super::source::Sourced;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("{var}={value:?} is not valid, expected {expected}")]
    Invalid {
        var: String,
        value: String,
        expected: String,
    },

    #[error("{var}={value} is outside {min}..={max}")]
    OutOfRange {
        var: String,
        value: u64,
        min: u64,
        max: u64,
    },
}

/// Reads variables under one prefix and collects every rejected value.
#[derive(Debug)]
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvParser {
    pub fn new() -> Self {
        Self::with_prefix("PCOV_")
    }

    /// Parser for variables outside the `PCOV_` namespace; pass `""` for bare names.
    pub fn with_prefix(prefix: &'static str) -> Self {
        Self {
            prefix,
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    /// Full variable name and its value, if set.
    fn lookup(&self, name: &str) -> (String, Option<String>) {
        let var = format!("{}{}", self.prefix, name);
        let value = env::var(&var).ok();
        (var, value)
    }

    fn reject(&mut self, var: String, value: String, expected: impl Into<String>) {
        self.errors.push(EnvError::Invalid {
            var,
            value,
            expected: expected.into(),
        });
    }

    /// String that must not be empty. File names and line prefixes are
    /// meaningless when empty, so an empty value is rejected.
    pub fn get_non_empty_string(&mut self, name: &str, default: &str) -> Sourced<String> {
        match self.lookup(name) {
            (var, Some(value)) if value.is_empty() => {
                self.reject(var, value, "a non-empty string");
                Sourced::default_value(default.to_string())
            }
            (var, Some(value)) => Sourced::from_env(value, var),
            (_, None) => Sourced::default_value(default.to_string()),
        }
    }

    /// `1/true/yes/on` or `0/false/no/off`, case-insensitive. Empty means false.
    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        let (var, Some(value)) = self.lookup(name) else {
            return Sourced::default_value(default);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Sourced::from_env(true, var),
            "0" | "false" | "no" | "off" | "" => Sourced::from_env(false, var),
            _ => {
                self.reject(var, value, "a boolean");
                Sourced::default_value(default)
            }
        }
    }

    pub fn get_u64_range(&mut self, name: &str, default: u64, min: u64, max: u64) -> Sourced<u64> {
        let (var, Some(value)) = self.lookup(name) else {
            return Sourced::default_value(default);
        };
        match value.trim().parse::<u64>() {
            Ok(n) if (min..=max).contains(&n) => Sourced::from_env(n, var),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var,
                    value: n,
                    min,
                    max,
                });
                Sourced::default_value(default)
            }
            Err(_) => {
                self.reject(var, value, "an unsigned integer");
                Sourced::default_value(default)
            }
        }
    }

    /// Path with a leading `~/` expanded to the home directory.
    pub fn get_path(&mut self, name: &str, default: &str) -> Sourced<PathBuf> {
        match self.lookup(name) {
            (var, Some(value)) if !value.is_empty() => {
                Sourced::from_env(expand_home(&value), var)
            }
            _ => Sourced::default_value(expand_home(default)),
        }
    }

    /// Lowercased value that must be one of `choices`.
    pub fn get_choice(&mut self, name: &str, default: &str, choices: &[&str]) -> Sourced<String> {
        let (var, Some(value)) = self.lookup(name) else {
            return Sourced::default_value(default.to_string());
        };
        let normalized = value.trim().to_ascii_lowercase();
        if choices.contains(&normalized.as_str()) {
            Sourced::from_env(normalized, var)
        } else {
            self.reject(var, value, choices.join("|"));
            Sourced::default_value(default.to_string())
        }
    }

    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        self.get_choice(name, default, LOG_LEVELS)
    }

    /// Like [`Self::get_optional_string`], with `~/` expanded.
    pub fn get_optional_path(&mut self, name: &str) -> Sourced<Option<PathBuf>> {
        match self.lookup(name) {
            (var, Some(value)) if !value.is_empty() => {
                Sourced::from_env(Some(expand_home(&value)), var)
            }
            (var, Some(_)) => Sourced::from_env(None, var),
            (_, None) => Sourced::default_value(None),
        }
    }

    /// `None` when unset or empty.
    pub fn get_optional_string(&mut self, name: &str) -> Sourced<Option<String>> {
        match self.lookup(name) {
            (var, Some(value)) => Sourced::from_env(Some(value).filter(|v| !v.is_empty()), var),
            (_, None) => Sourced::default_value(None),
        }
    }
}

fn expand_home(value: &str) -> PathBuf {
    match (value.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(value),
    }
}
