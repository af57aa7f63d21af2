//! User-settable configuration of an actor output.

use serde::{Deserialize, Serialize};

use crate::container::{ContainerKind, WriteConfig};
use crate::error::ConfigurationError;

/// Placeholder file name asking for a generated name.
pub const AUTO_FILENAME: &str = "auto";

/// Configuration of one actor output.
///
/// Every field has a default, so configs can be deserialized from partial
/// JSON documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorOutputConfig {
    /// Output name, unique within the owning actor.
    pub name: String,
    /// Name of the owning actor (required).
    pub belongs_to: Option<String>,
    /// Type name of the owning actor, used for generated file names.
    pub actor_type: String,
    /// Registered name of the container class wrapping the data.
    pub data_container_class: String,
    /// File name relative to the simulation output directory, or `"auto"`.
    pub output_filename: String,
    /// Should the data be written to disk at the end of the simulation?
    pub write_to_disk: bool,
    /// Keep data in memory after `close()`? Otherwise it only lives on disk.
    pub keep_data_in_memory: bool,
    /// Keep the data of each run after it has ended?
    pub keep_data_per_run: bool,
    /// Merge each run into the running aggregate when it ends?
    pub auto_merge: bool,
    /// Is this output computed at all?
    pub active: bool,
    /// Can the owning actor switch this output off?
    pub can_be_deactivated: bool,
    /// Per-item overrides of the container class write configuration.
    pub write_config: WriteConfig,
}

impl Default for ActorOutputConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            belongs_to: None,
            actor_type: "Actor".to_string(),
            data_container_class: ContainerKind::SingleImage.class_name().to_string(),
            output_filename: AUTO_FILENAME.to_string(),
            write_to_disk: true,
            keep_data_in_memory: true,
            keep_data_per_run: false,
            auto_merge: true,
            active: true,
            can_be_deactivated: true,
            write_config: WriteConfig::default(),
        }
    }
}

impl ActorOutputConfig {
    /// Default configuration for output `name` of actor `belongs_to`.
    pub fn new(name: impl Into<String>, belongs_to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            belongs_to: Some(belongs_to.into()),
            ..Self::default()
        }
    }

    /// Preset for ROOT outputs: runs are kept, never merged in memory.
    pub fn root(name: impl Into<String>, belongs_to: impl Into<String>) -> Self {
        Self {
            keep_data_per_run: true,
            auto_merge: false,
            ..Self::new(name, belongs_to)
        }
    }

    /// Parse a configuration from JSON.
    ///
    /// # Errors
    /// `InvalidField` if the document is not a valid configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json).map_err(|e| ConfigurationError::InvalidField {
            output: "<unparsed>".to_string(),
            field: "config",
            reason: e.to_string(),
        })
    }

    #[must_use]
    pub fn actor_type(mut self, actor_type: impl Into<String>) -> Self {
        self.actor_type = actor_type.into();
        self
    }

    #[must_use]
    pub fn data_container_class(mut self, class: impl Into<String>) -> Self {
        self.data_container_class = class.into();
        self
    }

    #[must_use]
    pub fn output_filename(mut self, filename: impl Into<String>) -> Self {
        self.output_filename = filename.into();
        self
    }

    #[must_use]
    pub fn write_to_disk(mut self, write_to_disk: bool) -> Self {
        self.write_to_disk = write_to_disk;
        self
    }

    #[must_use]
    pub fn keep_data_in_memory(mut self, keep: bool) -> Self {
        self.keep_data_in_memory = keep;
        self
    }

    #[must_use]
    pub fn keep_data_per_run(mut self, keep: bool) -> Self {
        self.keep_data_per_run = keep;
        self
    }

    #[must_use]
    pub fn auto_merge(mut self, auto_merge: bool) -> Self {
        self.auto_merge = auto_merge;
        self
    }

    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    #[must_use]
    pub fn can_be_deactivated(mut self, can_be_deactivated: bool) -> Self {
        self.can_be_deactivated = can_be_deactivated;
        self
    }

    #[must_use]
    pub fn with_write_config(mut self, write_config: WriteConfig) -> Self {
        self.write_config = write_config;
        self
    }

    /// True when finished runs are neither kept nor merged.
    #[must_use]
    pub const fn discards_unmerged_runs(&self) -> bool {
        !self.keep_data_per_run && !self.auto_merge
    }

    /// Validate the configuration.
    ///
    /// A configuration that discards runs without merging them is accepted
    /// but logged as a warning.
    ///
    /// # Errors
    /// `EmptyOutputName`, `MissingOwner` or `MissingOutputPath`.
    pub fn validate(self) -> Result<Self, ConfigurationError> {
        let actor = match self.belongs_to.as_deref().map(str::trim) {
            Some(actor) if !actor.is_empty() => actor.to_string(),
            _ => {
                return Err(ConfigurationError::MissingOwner {
                    output: self.name.clone(),
                })
            }
        };

        if self.name.trim().is_empty() {
            return Err(ConfigurationError::EmptyOutputName { actor });
        }

        if self.write_to_disk && self.output_filename.trim().is_empty() {
            return Err(ConfigurationError::MissingOutputPath {
                output: self.name.clone(),
                actor,
            });
        }

        if self.discards_unmerged_runs() {
            tracing::warn!(
                output = %self.name,
                actor = %actor,
                "keep_data_per_run and auto_merge are both disabled: data of finished runs will be discarded"
            );
        }

        Ok(self)
    }
}
