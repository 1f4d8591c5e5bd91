//! Logging bootstrap for the `pcov` and `pcovd` binaries.

use crate::config::CoverageSettings;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    /// Write to stderr instead of stdout (keeps stdout clean for CLI output).
    pub stderr: bool,
    /// Optional log file, written in addition to the console.
    pub file: Option<PathBuf>,
}

impl LogConfig {
    /// Console logging as configured by `PCOV_LOG_LEVEL`, `PCOV_LOG_FORMAT`
    /// and `PCOV_LOG_FILE`. `RUST_LOG` still wins when present.
    pub fn from_settings(settings: &CoverageSettings) -> Self {
        Self {
            level: settings.log_level.value.clone(),
            format: LogFormat::parse(&settings.log_format.value),
            stderr: false,
            file: settings.log_file.value.clone(),
        }
    }

    #[must_use]
    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"))
        })
    }
}

/// Flush guards for the non-blocking writers. Keep alive until exit.
#[must_use = "dropping the guards stops log output"]
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

type BoxedSubscriber = Box<dyn tracing::Subscriber + Send + Sync>;

/// Install the global `tracing` subscriber.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<LoggingGuards> {
    let (subscriber, guards) = build_subscriber(config)?;
    subscriber.try_init()?;
    Ok(guards)
}

fn build_subscriber(config: &LogConfig) -> anyhow::Result<(BoxedSubscriber, LoggingGuards)> {
    let mut guards = Vec::new();

    let (console, console_guard) = if config.stderr {
        tracing_appender::non_blocking(std::io::stderr())
    } else {
        tracing_appender::non_blocking(std::io::stdout())
    };
    guards.push(console_guard);

    let file_writer = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path.file_name().ok_or_else(|| {
                anyhow::anyhow!("log file path has no file name: {}", path.display())
            })?;
            std::fs::create_dir_all(&dir)?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            guards.push(guard);
            Some(writer)
        }
        None => None,
    };

    let file_layer =
        file_writer.map(|writer| fmt::layer().json().with_writer(writer).with_ansi(false));
    let registry = tracing_subscriber::registry()
        .with(config.filter())
        .with(file_layer);

    let subscriber: BoxedSubscriber = match config.format {
        LogFormat::Json => Box::new(
            registry.with(fmt::layer().json().with_writer(console).with_target(true)),
        ),
        LogFormat::Pretty => {
            Box::new(registry.with(fmt::layer().with_writer(console).with_target(true)))
        }
    };

    Ok((subscriber, LoggingGuards { _guards: guards }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = LogConfig {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            stderr: false,
            file: None,
        }
        .with_stderr()
        .with_level("debug")
        .with_format(LogFormat::Json);

        assert!(config.stderr);
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    #[allow(unsafe_code)]
    fn test_from_settings_uses_resolved_values() {
        let _guard = crate::config::env_test_lock();
        // SAFETY: Tests are serialized via env_test_lock
        unsafe {
            std::env::set_var("PCOV_LOG_LEVEL", "WARN");
            std::env::set_var("PCOV_LOG_FORMAT", "json");
            std::env::set_var("PCOV_LOG_FILE", "/var/log/pcov/pcovd.log");
        }
        let (settings, errors) = CoverageSettings::from_env();
        // SAFETY: as above
        unsafe {
            std::env::remove_var("PCOV_LOG_LEVEL");
            std::env::remove_var("PCOV_LOG_FORMAT");
            std::env::remove_var("PCOV_LOG_FILE");
        }

        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        let config = LogConfig::from_settings(&settings);
        assert_eq!(config.level, "warn");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(
            config.file.as_deref(),
            Some(std::path::Path::new("/var/log/pcov/pcovd.log"))
        );
        assert!(!config.stderr);
    }

    #[test]
    fn test_file_layer_with_either_console_format() {
        for format in [LogFormat::Pretty, LogFormat::Json] {
            let tmp = tempfile::TempDir::new().unwrap();
            let path = tmp.path().join("logs").join("pcovd.log");
            let config = LogConfig {
                level: "info".to_string(),
                format,
                stderr: true,
                file: Some(path.clone()),
            };

            let (subscriber, guards) = build_subscriber(&config).unwrap();
            tracing::subscriber::with_default(subscriber, || {
                tracing::error!(coverage = "50%", "Reconciled");
            });
            drop(guards);

            let written = std::fs::read_to_string(&path).unwrap();
            let line: serde_json::Value =
                serde_json::from_str(written.lines().next().unwrap()).unwrap();
            assert_eq!(line["fields"]["message"], "Reconciled", "{format:?}");
            assert_eq!(line["fields"]["coverage"], "50%");
        }
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Pretty);
    }
}
