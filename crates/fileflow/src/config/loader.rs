use std::path::Path;

use crate::config::schema::Options;
use crate::error::ConfigError;

/// On-disk encodings accepted for an options file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "json" => Ok(ConfigFormat::Json),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Reads run options from a `.json`, `.yaml` or `.yml` file.
///
/// Only parsing happens here; call [`crate::config::validate`] (or let the
/// planner do it) to check the values.
pub fn load_options<P: AsRef<Path>>(path: P) -> Result<Options, ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_options_from_str(&content, format)
}

pub fn load_options_from_str(content: &str, format: ConfigFormat) -> Result<Options, ConfigError> {
    let options = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    };
    Ok(options)
}
