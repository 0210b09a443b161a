//! Application configuration. [Application](crate::application::Application) uses
//! [ApplicationConfig] to configure itself and registers it as the `applicationConfig` unit, so it
//! can also be injected into any other unit.
//!
//! By default, the config is created with opinionated default values, which can then be overwritten
//! by environment variables prefixed with `UNITWIRE_` or the `unitwire.json` file.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::error::Error;
use std::sync::Arc;
use unitwire_di::instance::ErrorPtr;

const CONFIG_ENV_PREFIX: &str = "UNITWIRE";

/// Name of the default config file.
pub const CONFIG_FILE: &str = "unitwire.json";

/// Name of the unit holding the [ApplicationConfig].
pub const APPLICATION_CONFIG: &str = "applicationConfig";

pub(crate) fn convert_error<E: Error + Send + Sync + 'static>(error: E) -> ErrorPtr {
    Arc::new(error) as ErrorPtr
}

/// Framework configuration.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApplicationConfig {
    /// Should a default tracing logger be installed in the scope of the application.
    pub install_tracing_logger: bool,
    /// Should a warning be logged when a factory unit is called without a context.
    pub warn_on_missing_factory_context: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            install_tracing_logger: true,
            warn_on_missing_factory_context: true,
        }
    }
}

impl From<OptionalApplicationConfig> for ApplicationConfig {
    fn from(value: OptionalApplicationConfig) -> Self {
        let default = Self::default();
        Self {
            install_tracing_logger: value
                .install_tracing_logger
                .unwrap_or(default.install_tracing_logger),
            warn_on_missing_factory_context: value
                .warn_on_missing_factory_context
                .unwrap_or(default.warn_on_missing_factory_context),
        }
    }
}

impl ApplicationConfig {
    /// Loads the config from [CONFIG_FILE], if present, overlaid by `UNITWIRE_` environment
    /// variables.
    pub fn init_from_environment() -> Result<Self, ErrorPtr> {
        Self::init_from_file(CONFIG_FILE).map_err(convert_error)
    }

    fn init_from_file(file_name: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(file_name).required(false))
            .add_source(Environment::with_prefix(CONFIG_ENV_PREFIX))
            .build()
            .and_then(|config| config.try_deserialize::<OptionalApplicationConfig>())
            .map(|config| config.into())
    }
}

#[derive(Deserialize)]
struct OptionalApplicationConfig {
    install_tracing_logger: Option<bool>,
    warn_on_missing_factory_context: Option<bool>,
}

#[cfg(test)]
mod tests {
    use crate::config::{ApplicationConfig, OptionalApplicationConfig};
    use std::env;

    #[test]
    fn should_fill_missing_values_with_defaults() {
        let config: ApplicationConfig = OptionalApplicationConfig {
            install_tracing_logger: Some(false),
            warn_on_missing_factory_context: None,
        }
        .into();

        assert!(!config.install_tracing_logger);
        assert!(config.warn_on_missing_factory_context);
    }

    // single test, since the process environment is shared between tests
    #[test]
    fn should_overlay_environment_variables() {
        let config = ApplicationConfig::init_from_file("missing-unitwire-config.json").unwrap();
        assert_eq!(config, ApplicationConfig::default());

        env::set_var("UNITWIRE_INSTALL_TRACING_LOGGER", "false");
        let config = ApplicationConfig::init_from_file("missing-unitwire-config.json");
        env::remove_var("UNITWIRE_INSTALL_TRACING_LOGGER");

        let config = config.unwrap();
        assert!(!config.install_tracing_logger);
        assert!(config.warn_on_missing_factory_context);
    }
}
