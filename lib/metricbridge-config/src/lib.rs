//! Primitives for working with typed and untyped configuration data.
#![deny(warnings)]
#![deny(missing_docs)]

use std::{borrow::Cow, collections::HashSet, path::Path, sync::Arc};

use figment::{
    error::Kind,
    providers::{Env, Format as _, Json, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use tracing::debug;

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// Requested field was missing from the configuration.
    #[snafu(display("Missing field '{}' in configuration. {}", field, help_text))]
    MissingField {
        /// Help text describing how to set the missing field.
        help_text: String,

        /// Name of the missing field.
        field: Cow<'static, str>,
    },

    /// Requested field's data type was not the expected data type.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Name of the invalid field.
        ///
        /// This is a period-separated path to the field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// Generic configuration error.
    #[snafu(display("Failed to query configuration: {}", source))]
    Generic {
        /// Error source.
        source: figment::Error,
    },
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
enum LookupSource {
    /// The configuration key is looked up in a form suitable for environment variables.
    Environment { prefix: String },
}

impl LookupSource {
    fn transform_key(&self, key: &str) -> String {
        match self {
            // The prefix is already uppercased with a trailing underscore, which happens when the provider for reading
            // from the environment is configured.
            LookupSource::Environment { prefix } => format!("{}{}", prefix, key.replace('.', "_").to_uppercase()),
        }
    }
}

/// A configuration loader that can pull from various sources.
///
/// This loader wraps a lower-level library, `figment`, to expose a simpler and focused API for loading configuration
/// data and querying it. Sources have an implicit priority based on the order in which they are added: sources added
/// later take precedence over sources added prior.
///
/// # Supported sources
///
/// - YAML file
/// - JSON file
/// - environment variables (must be prefixed; see [`from_environment`][Self::from_environment])
/// - serialized in-memory values (primarily for defaults and tests)
#[derive(Default)]
pub struct ConfigurationLoader {
    figment: Figment,
    lookup_sources: HashSet<LookupSource>,
}

impl ConfigurationLoader {
    /// Loads the given YAML configuration file.
    ///
    /// Missing or invalid files surface as errors when the configuration is queried.
    pub fn from_yaml<P>(mut self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        self.figment = self.figment.admerge(Yaml::file_exact(path));
        self
    }

    /// Loads the given JSON configuration file.
    ///
    /// Missing or invalid files surface as errors when the configuration is queried.
    pub fn from_json<P>(mut self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        self.figment = self.figment.admerge(Json::file_exact(path));
        self
    }

    /// Loads configuration from environment variables with the given prefix.
    ///
    /// The prefix, if not already, is uppercased and given a trailing underscore. For example, with a prefix of
    /// `my_app`, an environment variable of `MY_APP_URL` maps to the configuration key `url`.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, an error is returned.
    pub fn from_environment(mut self, prefix: &str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        let prefix = format!("{}_", prefix.to_uppercase());
        self.figment = self.figment.admerge(Env::prefixed(&prefix));
        self.lookup_sources.insert(LookupSource::Environment { prefix });
        Ok(self)
    }

    /// Loads configuration from the given serializable value.
    ///
    /// Useful for injecting programmatic defaults, or for constructing configuration in tests.
    pub fn from_serialized<T>(mut self, value: T) -> Self
    where
        T: Serialize,
    {
        self.figment = self.figment.admerge(Serialized::defaults(value));
        self
    }

    /// Consumes the loader, returning a generic configuration object.
    pub fn into_generic(self) -> GenericConfiguration {
        debug!("Configuration sources resolved.");

        GenericConfiguration {
            inner: Arc::new(Inner {
                figment: self.figment,
                lookup_sources: self.lookup_sources,
            }),
        }
    }
}

struct Inner {
    figment: Figment,
    lookup_sources: HashSet<LookupSource>,
}

/// Generic configuration.
///
/// Values can be queried by key ([`get_typed`][Self::get_typed], [`try_get_typed`][Self::try_get_typed]), or the
/// entire configuration can be deserialized at once ([`as_typed`][Self::as_typed]). Keys are period-separated paths,
/// where each period represents a nested lookup.
#[derive(Clone)]
pub struct GenericConfiguration {
    inner: Arc<Inner>,
}

impl GenericConfiguration {
    fn get<'a, T>(&self, key: &str) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        match self.inner.figment.extract_inner(key) {
            Ok(value) => Ok(value),
            Err(e) => {
                if matches!(e.kind, Kind::MissingField(_)) {
                    // The key may use nested notation -- `foo.bar` -- while only being present in the environment,
                    // where nested separators are flattened to underscores. Retry in that form before giving up.
                    let fallback_key = key.replace('.', "_");
                    self.inner
                        .figment
                        .extract_inner(&fallback_key)
                        .map_err(|fallback_e| self.from_figment_error(fallback_e))
                } else {
                    Err(self.from_figment_error(e))
                }
            }
        }
    }

    /// Gets a configuration value by key.
    ///
    /// # Errors
    ///
    /// If the key does not exist, or the value could not be deserialized into `T`, an error is returned.
    pub fn get_typed<'a, T>(&self, key: &str) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        self.get(key)
    }

    /// Gets a configuration value by key, if it exists.
    ///
    /// If the key exists in the configuration, and can be deserialized, `Ok(Some(value))` is returned. If the key
    /// does not exist, `Ok(None)` is returned.
    ///
    /// # Errors
    ///
    /// If the value could not be deserialized into `T`, an error is returned.
    pub fn try_get_typed<'a, T>(&self, key: &str) -> Result<Option<T>, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigurationError::MissingField { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Attempts to deserialize the entire configuration as `T`.
    ///
    /// # Errors
    ///
    /// If the configuration could not be deserialized into `T`, an error is returned.
    pub fn as_typed<'a, T>(&self) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        self.inner.figment.extract().map_err(|e| self.from_figment_error(e))
    }

    fn from_figment_error(&self, e: figment::Error) -> ConfigurationError {
        match e.kind {
            Kind::MissingField(field) => {
                let field = field.to_string();
                let mut valid_keys = self
                    .inner
                    .lookup_sources
                    .iter()
                    .map(|source| source.transform_key(&field))
                    .collect::<Vec<_>>();
                valid_keys.sort();

                let help_text = if valid_keys.is_empty() {
                    "Try setting it in the configuration file.".to_string()
                } else {
                    format!("Try setting any of the following environment variables: {}", valid_keys.join(", "))
                };

                ConfigurationError::MissingField {
                    help_text,
                    field: field.into(),
                }
            }
            Kind::InvalidType(actual_ty, expected_ty) => ConfigurationError::InvalidFieldType {
                field: e.path.join("."),
                expected_ty,
                actual_ty: actual_ty.to_string(),
            },
            _ => ConfigurationError::Generic { source: e },
        }
    }
}
