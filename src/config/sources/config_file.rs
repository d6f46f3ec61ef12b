//! Config file source: an explicit TOML (or any format `config` recognizes) file.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::Path;
use tracing::debug;

/// Add the config file at `path` to the builder. Building fails if it is missing.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    debug!(config_path = %path.display(), "Loading configuration file");
    Ok(builder.add_source(File::from(path).required(true)))
}
