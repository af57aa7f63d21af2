//! Actor outputs: per-run storage, merging, retention and file naming.
//!
//! An [`ActorOutput`] owns the data of one named output of one actor. The
//! engine drives it through a fixed sequence of hooks:
//!
//! ```text
//! initialize()
//! for each run:  store_data(run, ..) / merge_into_run(run, ..)  ->  end_of_run(run)
//! end_of_simulation()
//! close()
//! ```
//!
//! Per run index the state moves `absent -> stored -> merged-and-dropped |
//! retained | retained-and-merged`, depending on `auto_merge` and
//! `keep_data_per_run`. Outputs are not internally synchronized; the engine
//! guarantees a single writer.

mod config;
mod image;
mod registry;

pub use config::{ActorOutputConfig, AUTO_FILENAME};
pub use registry::{ActorOutputRegistry, OutputKey};

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::container::{write_planned, ContainerKind, ContainerRegistry, DataItemContainer, ItemData, WriteConfig};
use crate::error::{ConfigurationError, DataItemError, OutputError, OutputResult, StateError};
use crate::image::Image;
use crate::item::{DataItem, ItemId};
use crate::path::{insert_suffix_before_extension, OutputPathResolver};
use crate::selector::{run_suffix, DataIdentifier, IntoSelector, RunIndex, Selector};

/// The output variants, differing in merge strategy and file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputVariant {
    /// Images merged in memory by their container class.
    Image,
    /// ROOT-style tables; merging would append, which is not implemented.
    Root,
    /// Images allocated and merged by the engine; only paths are resolved here.
    EngineImage,
}

impl OutputVariant {
    /// Extension of generated file names.
    #[must_use]
    pub const fn default_suffix(self) -> &'static str {
        match self {
            Self::Image | Self::EngineImage => "mhd",
            Self::Root => "root",
        }
    }
}

/// Raw data handed to [`ActorOutput::store_data`].
///
/// Images and items count as one sample; use [`RawData::sampled`] when the
/// data already accumulates several.
#[derive(Debug, Clone)]
pub enum RawData {
    /// One image per slot of the container class.
    Images(Vec<Image>),
    /// An item of the container class's shape.
    Item(DataItem),
    /// Images accumulated over `number_of_samples` samples.
    Sampled {
        images: Vec<Image>,
        number_of_samples: u64,
    },
    /// An already wrapped container of the output's class; its sample count
    /// is kept.
    Container(DataItemContainer),
}

impl RawData {
    #[must_use]
    pub fn sampled(images: impl Into<Vec<Image>>, number_of_samples: u64) -> Self {
        Self::Sampled {
            images: images.into(),
            number_of_samples,
        }
    }
}

impl From<Image> for RawData {
    fn from(image: Image) -> Self {
        Self::Images(vec![image])
    }
}

impl From<Vec<Image>> for RawData {
    fn from(images: Vec<Image>) -> Self {
        Self::Images(images)
    }
}

impl From<DataItem> for RawData {
    fn from(item: DataItem) -> Self {
        Self::Item(item)
    }
}

impl From<DataItemContainer> for RawData {
    fn from(container: DataItemContainer) -> Self {
        Self::Container(container)
    }
}

/// One named output of one actor.
pub struct ActorOutput {
    key: OutputKey,
    variant: OutputVariant,
    kind: ContainerKind,
    config: ActorOutputConfig,
    write_config: WriteConfig,
    resolver: Arc<dyn OutputPathResolver>,
    output_filename: OnceLock<PathBuf>,
    data_per_run: BTreeMap<RunIndex, DataItemContainer>,
    merged_data: Option<DataItemContainer>,
    finalized_runs: BTreeSet<RunIndex>,
    released: bool,
}

impl std::fmt::Debug for ActorOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorOutput")
            .field("key", &self.key)
            .field("variant", &self.variant)
            .field("kind", &self.kind)
            .field("runs", &self.data_per_run.keys().collect::<Vec<_>>())
            .field("has_merged_data", &self.merged_data.is_some())
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl ActorOutput {
    /// Create an output of the given variant.
    ///
    /// # Errors
    /// Fatal configuration errors: invalid config, unknown container class,
    /// write-config overrides naming items the class does not have.
    pub fn new(
        variant: OutputVariant,
        config: ActorOutputConfig,
        containers: &ContainerRegistry,
        resolver: Arc<dyn OutputPathResolver>,
    ) -> OutputResult<Self> {
        let config = config.validate()?;
        let kind = containers.resolve(&config.data_container_class)?;
        let mut write_config = kind.default_write_config();
        write_config
            .apply(&config.write_config)
            .map_err(|e| ConfigurationError::InvalidField {
                output: config.name.clone(),
                field: "write_config",
                reason: e.to_string(),
            })?;

        // validate() guarantees an owner.
        let actor = config.belongs_to.clone().unwrap_or_default();
        let key = OutputKey::new(actor, config.name.clone());

        Ok(Self {
            key,
            variant,
            kind,
            config,
            write_config,
            resolver,
            output_filename: OnceLock::new(),
            data_per_run: BTreeMap::new(),
            merged_data: None,
            finalized_runs: BTreeSet::new(),
            released: false,
        })
    }

    /// An image output merged in memory.
    ///
    /// # Errors
    /// See [`ActorOutput::new`].
    pub fn image(
        config: ActorOutputConfig,
        containers: &ContainerRegistry,
        resolver: Arc<dyn OutputPathResolver>,
    ) -> OutputResult<Self> {
        Self::new(OutputVariant::Image, config, containers, resolver)
    }

    /// A ROOT output.
    ///
    /// # Errors
    /// See [`ActorOutput::new`].
    pub fn root(
        config: ActorOutputConfig,
        containers: &ContainerRegistry,
        resolver: Arc<dyn OutputPathResolver>,
    ) -> OutputResult<Self> {
        Self::new(OutputVariant::Root, config, containers, resolver)
    }

    /// An image output whose data is owned by the engine.
    ///
    /// # Errors
    /// See [`ActorOutput::new`].
    pub fn engine_image(
        config: ActorOutputConfig,
        containers: &ContainerRegistry,
        resolver: Arc<dyn OutputPathResolver>,
    ) -> OutputResult<Self> {
        Self::new(OutputVariant::EngineImage, config, containers, resolver)
    }

    #[must_use]
    pub const fn key(&self) -> &OutputKey {
        &self.key
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.key.output
    }

    /// Name of the owning actor.
    #[must_use]
    pub fn belongs_to(&self) -> &str {
        &self.key.actor
    }

    #[must_use]
    pub const fn variant(&self) -> OutputVariant {
        self.variant
    }

    #[must_use]
    pub const fn container_kind(&self) -> ContainerKind {
        self.kind
    }

    #[must_use]
    pub const fn config(&self) -> &ActorOutputConfig {
        &self.config
    }

    #[must_use]
    pub const fn write_config(&self) -> &WriteConfig {
        &self.write_config
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.config.active
    }

    /// Switch the output on or off.
    ///
    /// Outputs that cannot be deactivated stay active; the attempt is logged.
    pub fn set_active(&mut self, active: bool) {
        if !active && !self.config.can_be_deactivated {
            tracing::warn!(
                output = %self.key.output,
                actor = %self.key.actor,
                "this output cannot be deactivated; it stays active"
            );
            return;
        }
        self.config.active = active;
    }

    /// Number of runs currently held in memory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data_per_run.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data_per_run.is_empty()
    }

    /// Per-run data currently held in memory.
    #[must_use]
    pub const fn data_per_run(&self) -> &BTreeMap<RunIndex, DataItemContainer> {
        &self.data_per_run
    }

    /// The running aggregate, if any run has been merged.
    #[must_use]
    pub const fn merged_data(&self) -> Option<&DataItemContainer> {
        self.merged_data.as_ref()
    }

    /// True if `run` has been finalized by `end_of_run`.
    #[must_use]
    pub fn is_run_finalized(&self, run: RunIndex) -> bool {
        self.finalized_runs.contains(&run)
    }

    /// True once `close()` released the in-memory data.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.released
    }

    fn selector(&self, which: impl IntoSelector, operation: &'static str) -> Result<Selector, ConfigurationError> {
        which.into_selector().map_err(|e| match e {
            ConfigurationError::InvalidSelector { token } => ConfigurationError::UnknownSelector {
                token,
                operation,
                output: self.key.output.clone(),
                actor: self.key.actor.clone(),
            },
            other => other,
        })
    }

    fn identifier(&self, which: impl IntoSelector, operation: &'static str) -> Result<DataIdentifier, ConfigurationError> {
        let selector = self.selector(which, operation)?;
        selector
            .as_identifier()
            .ok_or_else(|| self.not_allowed(selector, operation))
    }

    fn not_allowed(&self, selector: Selector, operation: &'static str) -> ConfigurationError {
        ConfigurationError::SelectorNotAllowed {
            selector: selector.to_string(),
            operation,
            output: self.key.output.clone(),
            actor: self.key.actor.clone(),
        }
    }

    fn contract_violation(&self, operation: &'static str) -> OutputError {
        ConfigurationError::ContractViolation {
            output: self.key.output.clone(),
            actor: self.key.actor.clone(),
            operation,
        }
        .into()
    }

    fn root_merge_not_implemented(&self) -> OutputError {
        OutputError::NotImplemented {
            feature: "appending ROOT files",
            output: self.key.output.clone(),
            actor: self.key.actor.clone(),
        }
    }

    fn ensure_not_engine_owned(&self, operation: &'static str) -> OutputResult<()> {
        if self.variant == OutputVariant::EngineImage {
            return Err(self.contract_violation(operation));
        }
        Ok(())
    }

    fn ensure_in_memory(&self) -> Result<(), StateError> {
        if self.released {
            return Err(StateError::DataReleased {
                output: self.key.output.clone(),
            });
        }
        Ok(())
    }

    fn ensure_open_run(&self, run: RunIndex) -> Result<(), StateError> {
        if self.finalized_runs.contains(&run) {
            return Err(StateError::RunFinalized {
                output: self.key.output.clone(),
                run,
            });
        }
        Ok(())
    }

    /// Resolve the output file name once, before the first run.
    ///
    /// # Errors
    /// `MissingOutputPath` if writing is requested without a file name.
    pub fn initialize(&self) -> OutputResult<()> {
        if self.config.write_to_disk && self.output_filename().as_os_str().is_empty() {
            return Err(ConfigurationError::MissingOutputPath {
                output: self.key.output.clone(),
                actor: self.key.actor.clone(),
            }
            .into());
        }
        tracing::debug!(
            output = %self.key.output,
            actor = %self.key.actor,
            filename = %self.output_filename().display(),
            "initialized actor output"
        );
        Ok(())
    }

    /// The configured file name, generated on first use when set to `"auto"`:
    /// `{name}_from_{actor_type}_{actor}.{suffix}`.
    pub fn output_filename(&self) -> &Path {
        self.output_filename.get_or_init(|| {
            if self.config.output_filename == AUTO_FILENAME {
                PathBuf::from(format!(
                    "{}_from_{}_{}.{}",
                    self.key.output,
                    self.config.actor_type,
                    self.key.actor,
                    self.variant.default_suffix()
                ))
            } else {
                PathBuf::from(&self.config.output_filename)
            }
        })
    }

    /// Path of the data addressed by `which` (`"merged"` or a run index),
    /// optionally narrowed to one item.
    ///
    /// Composition: base file name, then `_runNNNN` for a run, then the item
    /// suffix from the write configuration; the extension is kept.
    ///
    /// # Errors
    /// Fatal configuration error for any other selector.
    pub fn get_output_path(&self, which: impl IntoSelector, item: Option<&ItemId>) -> OutputResult<PathBuf> {
        let id = self.identifier(which, "get_output_path")?;
        Ok(self.output_path_for(id, item))
    }

    fn output_path_for(&self, id: DataIdentifier, item: Option<&ItemId>) -> PathBuf {
        let base = self.resolver.get_output_path(self.output_filename());
        let path = match id {
            DataIdentifier::Merged => base,
            DataIdentifier::Run(run) => insert_suffix_before_extension(&base, Some(&run_suffix(run))),
        };
        match item {
            Some(item) => insert_suffix_before_extension(&path, self.kind.item_suffix(&self.write_config, item)),
            None => path,
        }
    }

    fn with_samples(mut container: DataItemContainer, number_of_samples: u64) -> DataItemContainer {
        container.set_number_of_samples(number_of_samples);
        container
    }

    fn wrap(&self, data: RawData) -> Result<DataItemContainer, DataItemError> {
        let mut container = match data {
            RawData::Images(images) => Self::with_samples(DataItemContainer::from_images(self.kind, images)?, 1),
            RawData::Item(item) => Self::with_samples(DataItemContainer::from_item(self.kind, item)?, 1),
            RawData::Sampled {
                images,
                number_of_samples,
            } => Self::with_samples(DataItemContainer::from_images(self.kind, images)?, number_of_samples),
            RawData::Container(container) => {
                if container.kind() != self.kind {
                    return Err(DataItemError::KindMismatch {
                        expected: self.kind.to_string(),
                        actual: container.kind().to_string(),
                    });
                }
                container
            }
        };
        container.set_owner(self.key.clone());
        container.set_write_config(self.write_config.clone());
        Ok(container)
    }

    /// Store data for a run or as the merged data.
    ///
    /// Storing into a run that already holds data replaces it and logs a
    /// warning; use [`merge_into_run`](Self::merge_into_run) to accumulate.
    ///
    /// # Errors
    /// - fatal: invalid selector, `all`/`all_runs`, engine-owned output
    /// - `RunFinalized` once `end_of_run` has been called for the run
    /// - `DataReleased` after `close()`
    /// - shape errors if the data does not fit the container class
    pub fn store_data(&mut self, which: impl IntoSelector, data: impl Into<RawData>) -> OutputResult<()> {
        let id = self.identifier(which, "store_data")?;
        self.ensure_not_engine_owned("store_data")?;
        self.ensure_in_memory()?;
        let container = self.wrap(data.into())?;

        match id {
            DataIdentifier::Merged => {
                if self.merged_data.is_some() {
                    tracing::warn!(
                        output = %self.key.output,
                        actor = %self.key.actor,
                        "overwriting existing merged data"
                    );
                }
                self.merged_data = Some(container);
            }
            DataIdentifier::Run(run) => {
                self.ensure_open_run(run)?;
                if self.data_per_run.insert(run, container).is_some() {
                    tracing::warn!(
                        output = %self.key.output,
                        actor = %self.key.actor,
                        run,
                        "overwriting data already stored for this run; use merge_into_run to accumulate"
                    );
                }
            }
        }
        Ok(())
    }

    /// Accumulate data into a run, storing it if the run is still empty.
    ///
    /// # Errors
    /// As [`store_data`](Self::store_data), plus merge errors; on a merge
    /// error the stored run is unchanged.
    pub fn merge_into_run(&mut self, run: RunIndex, data: impl Into<RawData>) -> OutputResult<()> {
        self.ensure_not_engine_owned("merge_into_run")?;
        self.ensure_in_memory()?;
        self.ensure_open_run(run)?;
        let container = self.wrap(data.into())?;
        if let Some(existing) = self.data_per_run.get_mut(&run).filter(|c| !c.is_empty()) {
            existing.inplace_merge_with(&container)?;
        } else {
            self.data_per_run.insert(run, container);
        }
        Ok(())
    }

    /// Fold the data of `run` into the merged data.
    ///
    /// The run's container is moved when it will not be retained, cloned
    /// otherwise. On error the run data is left in place.
    fn fold_run_into_merged(&mut self, run: RunIndex) -> OutputResult<()> {
        match self.variant {
            OutputVariant::Root => return Err(self.root_merge_not_implemented()),
            OutputVariant::EngineImage => return Err(self.contract_violation("merge")),
            OutputVariant::Image => {}
        }
        let Some(data) = self.data_per_run.get(&run).filter(|c| !c.is_empty()) else {
            return Ok(());
        };
        match self.merged_data.as_mut() {
            Some(merged) => merged.inplace_merge_with(data)?,
            None if self.config.keep_data_per_run => self.merged_data = Some(data.clone()),
            None => self.merged_data = self.data_per_run.remove(&run),
        }
        Ok(())
    }

    /// Finalize a run: merge it if `auto_merge`, then drop it unless
    /// `keep_data_per_run`.
    ///
    /// Inactive outputs ignore the call. Engine-owned outputs only record
    /// the run as finalized.
    ///
    /// # Errors
    /// - `RunFinalized` if the run was already finalized
    /// - merge errors (shape, `NotImplemented` for ROOT outputs)
    pub fn end_of_run(&mut self, run: RunIndex) -> OutputResult<()> {
        if !self.config.active {
            return Ok(());
        }
        self.ensure_open_run(run)?;

        if self.variant != OutputVariant::EngineImage {
            if self.config.auto_merge {
                self.fold_run_into_merged(run)?;
            }

            if !self.config.keep_data_per_run {
                let dropped = self.data_per_run.remove(&run);
                if dropped.is_some() && !self.config.auto_merge {
                    tracing::warn!(
                        output = %self.key.output,
                        actor = %self.key.actor,
                        run,
                        "run data dropped without being merged (keep_data_per_run and auto_merge are disabled)"
                    );
                }
            }
        }

        self.finalized_runs.insert(run);
        tracing::debug!(output = %self.key.output, actor = %self.key.actor, run, "end of run");
        Ok(())
    }

    /// Rebuild the merged data from every run held in memory.
    ///
    /// # Errors
    /// Fatal for engine-owned outputs, `NotImplemented` for ROOT outputs,
    /// merge errors otherwise. The previous merged data is kept on error.
    pub fn merge_data_from_runs(&mut self) -> OutputResult<()> {
        self.ensure_not_engine_owned("merge_data_from_runs")?;
        self.ensure_in_memory()?;
        if self.variant == OutputVariant::Root {
            return Err(self.root_merge_not_implemented());
        }

        let mut runs = self.data_per_run.values().filter(|c| !c.is_empty());
        let Some(first) = runs.next() else {
            return Ok(());
        };
        let mut merged = first.clone();
        for data in runs {
            merged.inplace_merge_with(data)?;
        }
        self.merged_data = Some(merged);
        Ok(())
    }

    /// Write everything that is configured to be written.
    ///
    /// Engine-owned and inactive outputs write nothing here.
    ///
    /// # Errors
    /// Write errors.
    pub fn end_of_simulation(&mut self) -> OutputResult<Vec<PathBuf>> {
        if !self.config.active || self.variant == OutputVariant::EngineImage {
            return Ok(Vec::new());
        }
        self.write_data_if_requested(Selector::All)
    }

    /// Write data if the output and at least one item are configured to be
    /// written.
    ///
    /// # Errors
    /// See [`write_data`](Self::write_data).
    pub fn write_data_if_requested(&self, which: impl IntoSelector) -> OutputResult<Vec<PathBuf>> {
        let selector = self.selector(which, "write_data")?;
        if self.config.write_to_disk && self.write_config.any_write_to_disk() {
            self.write_data(selector)
        } else {
            Ok(Vec::new())
        }
    }

    /// Write the addressed data to disk, returning the written paths.
    ///
    /// `all` and `all_runs` write whatever is held; `merged` and a run index
    /// require the data to exist.
    ///
    /// Every file is resolved before the first one is written, so a derived
    /// item that cannot be computed leaves the disk unchanged.
    ///
    /// # Errors
    /// - fatal: invalid selector, engine-owned output
    /// - `DataReleased`, `RunNotFound`, `NoMergedData`
    /// - shape or storage errors from writing
    pub fn write_data(&self, which: impl IntoSelector) -> OutputResult<Vec<PathBuf>> {
        let selector = self.selector(which, "write_data")?;
        self.ensure_not_engine_owned("write_data")?;
        self.ensure_in_memory()?;

        let mut planned = Vec::new();
        for (id, container) in self.collect_data_with_identifiers(selector)? {
            if container.is_empty() {
                continue;
            }
            planned.extend(container.plan_write(&self.output_path_for(id, None), None)?);
        }
        let written = write_planned(&planned)?;
        tracing::debug!(
            output = %self.key.output,
            actor = %self.key.actor,
            files = written.len(),
            "wrote actor output"
        );
        Ok(written)
    }

    /// Read data previously written for `which` back from disk.
    ///
    /// Works after `close()`; the in-memory state is not modified.
    ///
    /// # Errors
    /// Fatal for invalid selectors, storage errors for missing files.
    pub fn load_data(&self, which: impl IntoSelector) -> OutputResult<DataItemContainer> {
        let id = self.identifier(which, "load_data")?;
        let mut container =
            DataItemContainer::load(self.kind, &self.output_path_for(id, None), self.write_config.clone())?;
        container.set_owner(self.key.clone());
        Ok(container)
    }

    /// The container addressed by `which` (`"merged"` or a run index).
    ///
    /// # Errors
    /// Fatal for other selectors; `DataReleased`, `RunNotFound` or
    /// `NoMergedData` if nothing is held.
    pub fn get_container(&self, which: impl IntoSelector) -> OutputResult<&DataItemContainer> {
        let id = self.identifier(which, "get_data")?;
        self.ensure_in_memory()?;
        self.container(id).map_err(Into::into)
    }

    fn container(&self, id: DataIdentifier) -> Result<&DataItemContainer, StateError> {
        match id {
            DataIdentifier::Merged => self.merged_data.as_ref().ok_or_else(|| StateError::NoMergedData {
                output: self.key.output.clone(),
            }),
            DataIdentifier::Run(run) => self.data_per_run.get(&run).ok_or_else(|| StateError::RunNotFound {
                output: self.key.output.clone(),
                run,
            }),
        }
    }

    /// Data of `which`: the whole item, or one stored or derived item.
    ///
    /// # Errors
    /// As [`get_container`](Self::get_container), plus item errors.
    pub fn get_data(&self, which: impl IntoSelector, item: Option<&ItemId>) -> OutputResult<ItemData<'_>> {
        let container = self.get_container(which)?;
        Ok(container.get_data(item)?)
    }

    /// Containers addressed by `which`; `all` lists the runs, then the
    /// merged data. Data not held is skipped for `all`/`all_runs`.
    ///
    /// # Errors
    /// Fatal for invalid selectors; `DataReleased` after `close()`;
    /// `RunNotFound`/`NoMergedData` for a single missing target.
    pub fn collect_data(&self, which: impl IntoSelector) -> OutputResult<Vec<&DataItemContainer>> {
        let selector = self.selector(which, "collect_data")?;
        Ok(self
            .collect_data_with_identifiers(selector)?
            .into_iter()
            .map(|(_, c)| c)
            .collect())
    }

    /// Like [`collect_data`](Self::collect_data), paired with identifiers.
    ///
    /// # Errors
    /// See [`collect_data`](Self::collect_data).
    pub fn collect_data_with_identifiers(
        &self,
        which: impl IntoSelector,
    ) -> OutputResult<Vec<(DataIdentifier, &DataItemContainer)>> {
        let selector = self.selector(which, "collect_data")?;
        self.ensure_in_memory()?;

        let runs = self
            .data_per_run
            .iter()
            .map(|(run, c)| (DataIdentifier::Run(*run), c));
        let merged = self.merged_data.iter().map(|c| (DataIdentifier::Merged, c));

        Ok(match selector {
            Selector::AllRuns => runs.collect(),
            Selector::All => runs.chain(merged).collect(),
            Selector::Merged => vec![(DataIdentifier::Merged, self.container(DataIdentifier::Merged)?)],
            Selector::Run(run) => {
                let id = DataIdentifier::Run(run);
                vec![(id, self.container(id)?)]
            }
        })
    }

    pub(crate) fn collect_data_mut(&mut self, selector: Selector) -> OutputResult<Vec<&mut DataItemContainer>> {
        self.ensure_in_memory()?;
        let output = self.key.output.clone();
        Ok(match selector {
            Selector::AllRuns => self.data_per_run.values_mut().collect(),
            Selector::All => self
                .data_per_run
                .values_mut()
                .chain(self.merged_data.as_mut())
                .collect(),
            Selector::Merged => vec![self
                .merged_data
                .as_mut()
                .ok_or(StateError::NoMergedData { output })?],
            Selector::Run(run) => vec![self
                .data_per_run
                .get_mut(&run)
                .ok_or(StateError::RunNotFound { output, run })?],
        })
    }

    /// Convenience access to the data of the first run.
    ///
    /// Logs a warning when more than one run is held.
    ///
    /// # Errors
    /// `DataReleased` after `close()`, `RunNotFound` if no run is held.
    pub fn data(&self) -> OutputResult<&DataItemContainer> {
        self.ensure_in_memory()?;
        if self.data_per_run.len() > 1 {
            tracing::warn!(
                output = %self.key.output,
                actor = %self.key.actor,
                runs = self.data_per_run.len(),
                "data() returns the first run only; use get_data(run, ..) or get_data(\"merged\", ..)"
            );
        }
        self.data_per_run
            .values()
            .next()
            .ok_or_else(|| {
                StateError::RunNotFound {
                    output: self.key.output.clone(),
                    run: 0,
                }
                .into()
            })
    }

    /// Enable or disable persisting one item, for held and future data.
    ///
    /// # Errors
    /// `UnknownItem` if the container class has no such item.
    pub fn set_write_to_disk(&mut self, item: &str, write_to_disk: bool) -> OutputResult<()> {
        self.write_config.set_write_to_disk(item, write_to_disk)?;
        self.sync_write_config();
        Ok(())
    }

    /// Change the file name suffix of one item, for held and future data.
    ///
    /// # Errors
    /// `UnknownItem` if the container class has no such item.
    pub fn set_item_suffix(&mut self, item: &str, suffix: Option<String>) -> OutputResult<()> {
        self.write_config.set_suffix(item, suffix)?;
        self.sync_write_config();
        Ok(())
    }

    fn sync_write_config(&mut self) {
        let config = self.write_config.clone();
        for container in self.data_per_run.values_mut().chain(self.merged_data.as_mut()) {
            container.set_write_config(config.clone());
        }
    }

    /// Release in-memory data unless `keep_data_in_memory` is set.
    ///
    /// Irreversible: later reads fail with `DataReleased`; data written to
    /// disk can still be read with [`load_data`](Self::load_data).
    pub fn close(&mut self) {
        if self.config.keep_data_in_memory {
            return;
        }
        self.data_per_run.clear();
        self.merged_data = None;
        self.released = true;
        tracing::debug!(output = %self.key.output, actor = %self.key.actor, "released in-memory data");
    }
}
