//! Configuration loading via `ortho-config`.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::selector::{InstanceConstraint, SelectError};
use crate::storage::{DEFAULT_STREAM_VERSION, unsigned_index_path};

/// Name of the configuration file mentioned in validation messages.
pub const CONFIG_FILE: &str = "stratus.toml";

/// Scaleway credentials and scoping used by the network adapter.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SCW",
    discovery(
        app_name = "stratus",
        env_var = "STRATUS_CONFIG_PATH",
        config_file_name = "stratus.toml",
        dotfile_name = ".stratus.toml",
        project_file_name = "stratus.toml"
    )
)]
pub struct ScalewayConfig {
    /// Secret key used for authentication. This value is required.
    pub secret_key: String,
    /// Organisation identifier used by some Scaleway endpoints.
    pub default_organization_id: Option<String>,
    /// Project that owns created security groups.
    pub default_project_id: String,
    /// Availability zone groups live in. Defaults to `fr-par-1`.
    #[ortho_config(default = "fr-par-1".to_owned())]
    pub default_zone: String,
}

/// Placement defaults: where the catalog lives and what to ask it for.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "STRATUS",
    discovery(
        app_name = "stratus",
        env_var = "STRATUS_CONFIG_PATH",
        config_file_name = "stratus.toml",
        dotfile_name = ".stratus.toml",
        project_file_name = "stratus.toml"
    )
)]
pub struct PlacementConfig {
    /// Directory holding published catalog documents.
    #[ortho_config(default = "simplestreams".to_owned())]
    pub catalog_dir: String,
    /// Region images must live in.
    pub region: String,
    /// OS series requested when the caller names none.
    #[ortho_config(default = "noble".to_owned())]
    pub default_series: String,
    /// Architecture requested when the caller names none.
    #[ortho_config(default = "amd64".to_owned())]
    pub default_architecture: String,
    /// Name of the group every machine joins.
    #[ortho_config(default = "stratus-global".to_owned())]
    pub global_group: String,
    /// Controller API port opened in the global group.
    #[ortho_config(default = 17070)]
    pub api_port: u16,
    /// Stream version of published catalogs.
    #[ortho_config(default = "v1".to_owned())]
    pub stream_version: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            section,
        }
    }

    fn require(&self, value: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to [{}] in {CONFIG_FILE}",
                self.description, self.env_var, self.toml_key, self.section
            )));
        }
        Ok(())
    }
}

impl ScalewayConfig {
    /// Loads configuration from defaults, configuration files, environment
    /// variables and CLI flags, in increasing order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("stratus")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks that required fields are present. Messages name the
    /// environment variable and the configuration key to set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        FieldMetadata::new(
            "Scaleway API secret key",
            "SCW_SECRET_KEY",
            "secret_key",
            "scaleway",
        )
        .require(&self.secret_key)?;
        FieldMetadata::new(
            "Scaleway project ID",
            "SCW_DEFAULT_PROJECT_ID",
            "default_project_id",
            "scaleway",
        )
        .require(&self.default_project_id)?;
        FieldMetadata::new(
            "availability zone",
            "SCW_DEFAULT_ZONE",
            "default_zone",
            "scaleway",
        )
        .require(&self.default_zone)
    }
}

impl PlacementConfig {
    /// Loads configuration from defaults, configuration files, environment
    /// variables and CLI flags, in increasing order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("stratus")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks that required fields are present and the API port is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for empty fields or
    /// [`ConfigError::Invalid`] for a zero API port.
    pub fn validate(&self) -> Result<(), ConfigError> {
        FieldMetadata::new(
            "catalog directory",
            "STRATUS_CATALOG_DIR",
            "catalog_dir",
            "placement",
        )
        .require(&self.catalog_dir)?;
        FieldMetadata::new("region", "STRATUS_REGION", "region", "placement")
            .require(&self.region)?;
        FieldMetadata::new(
            "default series",
            "STRATUS_DEFAULT_SERIES",
            "default_series",
            "placement",
        )
        .require(&self.default_series)?;
        FieldMetadata::new(
            "default architecture",
            "STRATUS_DEFAULT_ARCHITECTURE",
            "default_architecture",
            "placement",
        )
        .require(&self.default_architecture)?;
        FieldMetadata::new(
            "global security group name",
            "STRATUS_GLOBAL_GROUP",
            "global_group",
            "placement",
        )
        .require(&self.global_group)?;
        FieldMetadata::new(
            "stream version",
            "STRATUS_STREAM_VERSION",
            "stream_version",
            "placement",
        )
        .require(&self.stream_version)?;
        if self.api_port == 0 {
            return Err(ConfigError::Invalid(format!(
                "api_port must be between 1 and 65535: set STRATUS_API_PORT or api_port in {CONFIG_FILE}"
            )));
        }
        Ok(())
    }

    /// Catalog directory as a UTF-8 path.
    #[must_use]
    pub fn catalog_root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.catalog_dir.trim())
    }

    /// Store path of the unsigned version 1 index.
    #[must_use]
    pub fn index_path(&self) -> String {
        let version = self.stream_version.trim();
        if version.is_empty() {
            unsigned_index_path(DEFAULT_STREAM_VERSION, 1)
        } else {
            unsigned_index_path(version, 1)
        }
    }

    /// Builds the constraint for the configured series, architecture and
    /// region with no resource requirements.
    ///
    /// # Errors
    ///
    /// Returns the [`PlacementConfig::validate`] error for an incomplete
    /// configuration, or [`ConfigError::Invalid`] when the constraint cannot
    /// be built.
    pub fn constraint(&self) -> Result<InstanceConstraint, ConfigError> {
        self.validate()?;
        InstanceConstraint::builder()
            .series(&self.default_series)
            .architecture(&self.default_architecture)
            .region(&self.region)
            .build()
            .map_err(ConfigError::from)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

impl From<SelectError> for ConfigError {
    fn from(value: SelectError) -> Self {
        Self::Invalid(value.to_string())
    }
}
