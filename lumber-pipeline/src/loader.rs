//! Config file loading with environment expansion.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::params::Config;

static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env reference pattern compiles")
});

/// A config file: the pipeline's node list under a `pipeline` key.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    pipeline: Config,
}

/// Replace `${NAME}` references with the environment's values.
///
/// Unset variables expand to the empty string.
#[must_use]
pub fn expand_env(text: &str) -> String {
    ENV_REFERENCE
        .replace_all(text, |captures: &regex::Captures<'_>| {
            std::env::var(&captures[1]).unwrap_or_default()
        })
        .into_owned()
}

/// Parse a pipeline configuration from YAML text.
pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let expanded = expand_env(text);
    let file: ConfigFile = serde_yaml::from_str(&expanded)?;
    Ok(file.pipeline)
}

/// Load a pipeline configuration from a file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    parse_config(&text)
}
