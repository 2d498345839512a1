use std::path::Path;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory containing configuration files relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Base configuration file loaded for all environments.
const BASE_CONFIG_FILE: &str = "base.yaml";

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
///
/// Example: `APP_DIFF__PARALLEL_DIFFS_COUNT` sets the `diff.parallel_diffs_count` field.
const ENV_SEPARATOR: &str = "__";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to determine the configuration directory: {0}")]
    Directory(#[source] std::io::Error),

    #[error("failed to detect the running environment: {0}")]
    Environment(#[source] std::io::Error),

    #[error("failed to build the configuration: {0}")]
    Config(#[from] config::ConfigError),
}

/// Loads hierarchical configuration from `./configuration` and the environment.
///
/// Loads configuration in this order:
/// 1. `configuration/base.yaml`
/// 2. `configuration/{environment}.yaml`, if present
/// 3. environment variable overrides prefixed with `APP`
///
/// The environment is detected through `APP_ENVIRONMENT`.
pub fn load_config<T>() -> Result<T, LoadError>
where
    T: DeserializeOwned,
{
    let base_path = std::env::current_dir().map_err(LoadError::Directory)?;
    let environment = Environment::load().map_err(LoadError::Environment)?;

    load_config_from(&base_path.join(CONFIGURATION_DIR), environment)
}

/// Loads hierarchical configuration from an explicit directory and environment.
///
/// Same layering as [`load_config`].
pub fn load_config_from<T>(directory: &Path, environment: Environment) -> Result<T, LoadError>
where
    T: DeserializeOwned,
{
    let environment_filename = format!("{environment}.yaml");

    let environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true);

    let settings = config::Config::builder()
        .add_source(config::File::from(directory.join(BASE_CONFIG_FILE)))
        .add_source(config::File::from(directory.join(environment_filename)).required(false))
        // E.g. `APP_DIFF__REMOTE_ACTION_TIMEOUT_MS=5000` sets `diff.remote_action_timeout_ms`.
        .add_source(environment_source)
        .build()?;

    Ok(settings.try_deserialize::<T>()?)
}
