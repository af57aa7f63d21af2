//! Lookup of outputs by owning actor and name.
//!
//! Containers store an [`OutputKey`] instead of a reference to their output;
//! the registry resolves the key back to the output when a container needs
//! its path.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::container::DataItemContainer;
use crate::error::{ConfigurationError, OutputResult};
use crate::item::ItemId;
use crate::selector::{IntoSelector, RunIndex};

use super::ActorOutput;

/// Identity of an output: owning actor plus output name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputKey {
    pub actor: String,
    pub output: String,
}

impl OutputKey {
    pub fn new(actor: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            output: output.into(),
        }
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.actor, self.output)
    }
}

/// Every output of a simulation, keyed by [`OutputKey`].
#[derive(Debug, Default)]
pub struct ActorOutputRegistry {
    outputs: BTreeMap<OutputKey, ActorOutput>,
}

impl ActorOutputRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an output.
    ///
    /// # Errors
    /// `DuplicateOutput` if the actor already has an output of that name.
    pub fn insert(&mut self, output: ActorOutput) -> Result<&mut ActorOutput, ConfigurationError> {
        match self.outputs.entry(output.key().clone()) {
            Entry::Occupied(entry) => Err(ConfigurationError::DuplicateOutput {
                actor: entry.key().actor.clone(),
                output: entry.key().output.clone(),
            }),
            Entry::Vacant(entry) => Ok(entry.insert(output)),
        }
    }

    #[must_use]
    pub fn get(&self, key: &OutputKey) -> Option<&ActorOutput> {
        self.outputs.get(key)
    }

    pub fn get_mut(&mut self, key: &OutputKey) -> Option<&mut ActorOutput> {
        self.outputs.get_mut(key)
    }

    /// Outputs owned by `actor`, ordered by name.
    pub fn outputs_of<'a>(&'a self, actor: &'a str) -> impl Iterator<Item = &'a ActorOutput> + 'a {
        self.outputs
            .iter()
            .filter(move |(key, _)| key.actor == actor)
            .map(|(_, output)| output)
    }

    /// The output a container belongs to.
    ///
    /// # Errors
    /// `OrphanContainer` if the container was never stored in an output,
    /// `UnknownOwner` if its owner is not registered here.
    pub fn owner_of(&self, container: &DataItemContainer) -> Result<&ActorOutput, ConfigurationError> {
        let key = container.owner().ok_or_else(|| ConfigurationError::OrphanContainer {
            class: container.kind().to_string(),
        })?;
        self.outputs.get(key).ok_or_else(|| ConfigurationError::UnknownOwner {
            owner: key.to_string(),
        })
    }

    /// Path of a container's data, resolved through its owning output.
    ///
    /// # Errors
    /// `OrphanContainer`, `UnknownOwner`, or the errors of
    /// [`ActorOutput::get_output_path`].
    pub fn output_path_for(
        &self,
        container: &DataItemContainer,
        which: impl IntoSelector,
        item: Option<&ItemId>,
    ) -> OutputResult<PathBuf> {
        self.owner_of(container)?.get_output_path(which, item)
    }

    /// Call `initialize` on every output.
    ///
    /// # Errors
    /// The first initialization error.
    pub fn initialize_all(&self) -> OutputResult<()> {
        self.outputs.values().try_for_each(ActorOutput::initialize)
    }

    /// Call `end_of_run` on every output.
    ///
    /// # Errors
    /// The first error; outputs after it are not finalized.
    pub fn end_of_run(&mut self, run: RunIndex) -> OutputResult<()> {
        self.outputs.values_mut().try_for_each(|output| output.end_of_run(run))
    }

    /// Call `end_of_simulation` on every output, returning every written path.
    ///
    /// # Errors
    /// The first error.
    pub fn end_of_simulation(&mut self) -> OutputResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        for output in self.outputs.values_mut() {
            written.extend(output.end_of_simulation()?);
        }
        Ok(written)
    }

    /// Call `close` on every output.
    pub fn close(&mut self) {
        self.outputs.values_mut().for_each(ActorOutput::close);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutputKey, &ActorOutput)> {
        self.outputs.iter()
    }
}
