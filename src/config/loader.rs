//! Configuration Loader
//!
//! Layers compiled defaults, an optional TOML file and `RESILIENT_OPS_*`
//! environment variables through the `config` crate, then validates the result.

use super::ControllerConfig;
use crate::constants::env;
use crate::error::ControllerResult;
use config::{Config, Environment, File, Map};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Builder for one configuration load
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_source: Option<Map<String, String>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader reading `config/resilient-ops.toml` (if present) and the process environment
    pub fn new() -> Self {
        Self {
            file: Some(PathBuf::from(env::DEFAULT_CONFIG_PATH)),
            env_source: None,
        }
    }

    /// Read an explicit TOML file instead of the default location
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Skip the file layer entirely
    pub fn without_file(mut self) -> Self {
        self.file = None;
        self
    }

    /// Read variables from `vars` instead of the process environment.
    ///
    /// Keys keep their full `RESILIENT_OPS_` prefixed form.
    pub fn with_env_source(mut self, vars: Map<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Merge every layer, deserialize and validate
    pub fn load(&self) -> ControllerResult<ControllerConfig> {
        let mut builder = Config::builder();

        if let Some(path) = &self.file {
            debug!(path = %path.display(), exists = path.exists(), "Adding configuration file layer");
            builder = builder.add_source(File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix(env::PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(self.env_source.clone()),
        );

        let config: ControllerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        crate::logging::log_config_loaded(&config, self.file.as_deref());
        Ok(config)
    }
}
