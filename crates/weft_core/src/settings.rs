//! Serialization settings stamped onto every registered resource.

use crate::error::{CoreError, CoreResult};
use crate::id::{Identifier, ResourceType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for one registration run
///
/// `project`, `domain` and `version` are copied into every [`Identifier`]
/// produced during the run. The remaining fields fill in optional parts of
/// tasks and launch plans that the author left unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerializationSettings {
    /// Target project
    #[serde(default)]
    pub project: String,
    /// Target domain
    #[serde(default)]
    pub domain: String,
    /// Registration version
    #[serde(default)]
    pub version: String,
    /// Container image for tasks that do not name one
    #[serde(default)]
    pub image: Option<String>,
    /// Environment merged under every task container's own environment
    #[serde(default)]
    pub env: IndexMap<String, String>,
    /// Role assumed by launch plans that carry no auth role
    #[serde(default)]
    pub default_auth_role: Option<DefaultAuthRole>,
    /// Output location prefix for launch plans that carry none
    #[serde(default)]
    pub raw_output_prefix: Option<String>,
}

/// Launch plan role defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultAuthRole {
    /// IAM-style role
    #[serde(default)]
    pub assumable_iam_role: Option<String>,
    /// Kubernetes service account
    #[serde(default)]
    pub kubernetes_service_account: Option<String>,
}

/// Values that take precedence over a settings file
///
/// Filled from command-line flags or the `WEFT_PROJECT`, `WEFT_DOMAIN`,
/// `WEFT_VERSION` and `WEFT_IMAGE` environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    /// Project
    pub project: Option<String>,
    /// Domain
    pub domain: Option<String>,
    /// Version
    pub version: Option<String>,
    /// Default image
    pub image: Option<String>,
}

impl SerializationSettings {
    /// Create settings with the required fields
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        domain: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            domain: domain.into(),
            version: version.into(),
            image: None,
            env: IndexMap::new(),
            default_auth_role: None,
            raw_output_prefix: None,
        }
    }

    /// Set the default container image
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Add a default environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the default launch plan role
    #[must_use]
    pub fn with_default_auth_role(mut self, role: DefaultAuthRole) -> Self {
        self.default_auth_role = Some(role);
        self
    }

    /// Set the default raw output prefix
    #[must_use]
    pub fn with_raw_output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.raw_output_prefix = Some(prefix.into());
        self
    }

    /// Parse and validate settings from TOML
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or a required field is empty
    pub fn from_toml_str(s: &str) -> CoreResult<Self> {
        let settings: Self = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load and validate settings from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or fails validation
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let settings = Self::read(path.as_ref())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Layer `overrides` over an optional settings file, then validate
    ///
    /// The file may leave out fields the overrides supply.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or if a required
    /// field is still empty afterwards
    pub fn resolve(path: Option<&Path>, overrides: &SettingsOverrides) -> CoreResult<Self> {
        let base = match path {
            Some(path) => Self::read(path)?,
            None => Self::new("", "", ""),
        };
        let settings = base.with_overrides(overrides);
        settings.validate()?;
        Ok(settings)
    }

    /// Replace every field `overrides` sets
    #[must_use]
    pub fn with_overrides(mut self, overrides: &SettingsOverrides) -> Self {
        if let Some(project) = &overrides.project {
            self.project.clone_from(project);
        }
        if let Some(domain) = &overrides.domain {
            self.domain.clone_from(domain);
        }
        if let Some(version) = &overrides.version {
            self.version.clone_from(version);
        }
        if let Some(image) = &overrides.image {
            self.image = Some(image.clone());
        }
        self
    }

    fn read(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Check required fields
    ///
    /// # Errors
    ///
    /// Returns error naming the first empty required field
    pub fn validate(&self) -> CoreResult<()> {
        for (field, value) in [
            ("project", &self.project),
            ("domain", &self.domain),
            ("version", &self.version),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::Validation {
                    field: field.to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Build the identifier of a resource registered under these settings
    #[must_use]
    pub fn identifier(&self, resource_type: ResourceType, name: &str) -> Identifier {
        Identifier::new(
            resource_type,
            self.project.as_str(),
            self.domain.as_str(),
            name,
            self.version.as_str(),
        )
    }
}
