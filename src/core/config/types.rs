use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(super) project: ProjectSettings,
    pub(super) review: ReviewSettings,
    pub(super) runtime: RuntimeSettings,
    pub(super) telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub(crate) struct ProjectSettings {
    /// Generation-time configuration file (ordering table, layout, roster).
    pub(crate) config_file: PathBuf,
    /// Directory holding the scan working tree and the emitted answer key.
    pub(crate) output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub(crate) struct ReviewSettings {
    /// External command used to display page images during review.
    pub(crate) viewer_command: String,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
    pub(crate) strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }

    pub(super) fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("missing required file for {field}: {path}")]
    MissingFile { field: &'static str, path: String },
}
