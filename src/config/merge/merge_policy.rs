//! Merge rules: defaults, override order, conflict handling.
//!
//! Sources are layered lowest to highest: these defaults, then the config file,
//! then environment variables. A later source wins field by field.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("contract.event", "update")?
        .set_default("contract.client_only", false)?
        .set_default("contract.site", "client")?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stdout")?
        .set_default("logging.color", true)
}
