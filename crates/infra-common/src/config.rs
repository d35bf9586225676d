//! Layered configuration loading
//!
//! Sources, lowest precedence first: the type's `Default`, an optional TOML
//! file, then environment variables named `<PREFIX>__SECTION__KEY`.

use crate::errors::types::{Error, Result};
use config::{Config, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{debug, info};

/// Separator between nested keys in environment variable names
pub const ENV_SEPARATOR: &str = "__";

/// Load `T` from an optional TOML file plus environment overrides.
///
/// A missing file is not an error: the defaults (and environment) apply.
pub fn load_config<T>(path: Option<&Path>, env_prefix: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let mut builder = Config::builder();

    if let Some(path) = path {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        } else {
            debug!("Configuration file {} not found, using defaults", path.display());
        }
    }

    builder = builder.add_source(
        Environment::with_prefix(env_prefix)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize::<T>().map_err(Error::from)
}

/// Parse `T` from a TOML string
pub fn from_toml_str<T>(text: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    Config::builder()
        .add_source(File::from_str(text, FileFormat::Toml))
        .build()?
        .try_deserialize::<T>()
        .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        retries: u32,
        name: String,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                retries: 3,
                name: "default".to_string(),
            }
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let loaded: Sample =
            load_config(Some(Path::new("/nonexistent/telephony.toml")), "SAMPLE_MISSING").unwrap();
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "retries = 7").unwrap();

        let loaded: Sample = load_config(Some(file.path()), "SAMPLE_FILE").unwrap();
        assert_eq!(loaded.retries, 7);
        assert_eq!(loaded.name, "default");
    }

    #[test]
    fn test_from_toml_str() {
        let loaded: Sample = from_toml_str("name = \"modem\"").unwrap();
        assert_eq!(loaded.name, "modem");
        assert_eq!(loaded.retries, 3);
    }
}
