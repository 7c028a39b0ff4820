use std::path::PathBuf;

use super::parsing::{env_optional, env_or_default, parse_bool, parse_environment};
use super::types::{
    ConfigError, ProjectSettings, ReviewSettings, RuntimeSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let environment =
            parse_environment(env_optional("OMRSCAN_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("OMRSCAN_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let config_file = PathBuf::from(env_or_default("OMRSCAN_CONFIG", "exam.config.json"));
        let output_dir = PathBuf::from(env_or_default("OMRSCAN_OUTPUT_DIR", "out"));

        let viewer_command = env_or_default("OMRSCAN_VIEWER", "feh");

        let log_level = env_or_default("OMRSCAN_LOG_LEVEL", "info");
        let json = env_optional("OMRSCAN_LOG_JSON")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);

        let settings = Self {
            project: ProjectSettings { config_file, output_dir },
            review: ReviewSettings { viewer_command },
            runtime: RuntimeSettings { environment, strict_config },
            telemetry: TelemetrySettings { log_level, json },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn project(&self) -> &ProjectSettings {
        &self.project
    }

    pub(crate) fn review(&self) -> &ReviewSettings {
        &self.review
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.review.viewer_command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "OMRSCAN_VIEWER",
                value: String::from("<empty>"),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if !self.project.config_file.is_file() {
            return Err(ConfigError::MissingFile {
                field: "OMRSCAN_CONFIG",
                path: self.project.config_file.display().to_string(),
            });
        }

        Ok(())
    }
}
