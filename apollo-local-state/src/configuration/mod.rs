//! Logic for loading configuration in to an object model
use std::num::NonZeroUsize;
use std::str::FromStr;

use derivative::Derivative;
use displaydoc::Display;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;


/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_yaml::Error),
}

/// The configuration of the local state handler.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or parsed from YAML with [`FromStr`].
#[derive(Clone, Derivative, Deserialize, Serialize, JsonSchema, Default, PartialEq, Eq)]
#[derivative(Debug)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Bounds of the per-document caches.
    #[serde(default)]
    pub(crate) cache: Cache,

    /// Developer warnings logged during resolution.
    #[serde(default)]
    pub(crate) warnings: Warnings,
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder(visibility = "pub")]
    pub fn new(cache: Option<Cache>, warnings: Option<Warnings>) -> Result<Self, ConfigurationError> {
        let configuration = Self {
            cache: cache.unwrap_or_default(),
            warnings: warnings.unwrap_or_default(),
        };
        configuration.validate()?;
        Ok(configuration)
    }

    /// Checks values that the types alone cannot rule out.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.cache.query_split.limit == 0 {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid cache configuration",
                error: "cache.query_split.limit must be greater than 0".to_string(),
            });
        }
        if self.cache.traverse.limit == 0 {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid cache configuration",
                error: "cache.traverse.limit must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// The JSON schema of the configuration file.
    pub fn schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Configuration)).unwrap_or_default()
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn warnings(&self) -> &Warnings {
        &self.warnings
    }

    pub(crate) fn query_split_limit(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.cache.query_split.limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub(crate) fn traverse_limit(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.cache.traverse.limit).unwrap_or(NonZeroUsize::MIN)
    }
}

impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_configuration(s)
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Cache {
    /// Split of queries into their local and server parts, per document.
    #[serde(default)]
    pub query_split: CacheLimit,

    /// Selections requiring local resolution, per document.
    #[serde(default)]
    pub traverse: CacheLimit,
}

/// Bound of an in memory cache.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CacheLimit {
    /// Number of documents kept. Defaults to 512.
    #[serde(default = "default_cache_limit")]
    pub limit: usize,
}

impl Default for CacheLimit {
    fn default() -> Self {
        Self {
            limit: default_cache_limit(),
        }
    }
}

fn default_cache_limit() -> usize {
    512
}

/// Toggles for developer warnings.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Warnings {
    /// Warn when a local field has neither a resolver nor parent data.
    #[serde(default = "default_true")]
    pub missing_resolver: bool,

    /// Warn when a resolver returns no value.
    #[serde(default = "default_true")]
    pub undefined_result: bool,
}

impl Default for Warnings {
    fn default() -> Self {
        Self {
            missing_resolver: true,
            undefined_result: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Parse and validate a YAML configuration. An empty document yields the defaults.
pub(crate) fn validate_configuration(raw_yaml: &str) -> Result<Configuration, ConfigurationError> {
    let configuration: Configuration = if raw_yaml.trim().is_empty() {
        Configuration::default()
    } else {
        serde_yaml::from_str(raw_yaml).map_err(ConfigurationError::DeserializeConfigError)?
    };
    configuration.validate()?;
    Ok(configuration)
}
