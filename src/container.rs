//! Data item containers.
//!
//! A container wraps one [`DataItem`] with provenance metadata, a write
//! configuration naming each item on disk, and a non-owning key of the
//! output it belongs to. The container class decides the item shape, how
//! two containers merge, and which items are persisted by default.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigurationError, DataItemError, OutputResult};
use crate::image::{Image, ImageProperties};
use crate::item::{DataItem, ItemId, ItemShape};
use crate::output::OutputKey;
use crate::path::insert_suffix_before_extension;
use crate::storage::{self, FileHeader};

/// How two containers of the same class are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// Slot-by-slot sum.
    Sum,
    /// Sample-weighted mean: `(a*n_a + b*n_b) / (n_a + n_b)`.
    WeightedMean,
}

/// The closed set of container classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerKind {
    /// One summed image (e.g. deposited energy).
    SingleImage,
    /// One image holding a mean value per voxel.
    SingleMeanImage,
    /// Sum and sum of squares, from which mean and variance are derived.
    SingleImageWithVariance,
    /// Numerator and denominator, both summed.
    QuotientImage,
    /// Numerator and denominator holding mean values.
    QuotientMeanImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerItem {
    Slot(usize),
    Quotient,
    Mean,
    Variance,
}

#[derive(Debug, Clone, Copy)]
struct ItemSpec {
    name: &'static str,
    item: ContainerItem,
    suffix: Option<&'static str>,
    write_to_disk: bool,
}

const SINGLE_ITEMS: &[ItemSpec] = &[ItemSpec {
    name: "image",
    item: ContainerItem::Slot(0),
    suffix: None,
    write_to_disk: true,
}];

const VARIANCE_ITEMS: &[ItemSpec] = &[
    ItemSpec {
        name: "value",
        item: ContainerItem::Slot(0),
        suffix: None,
        write_to_disk: true,
    },
    ItemSpec {
        name: "squared",
        item: ContainerItem::Slot(1),
        suffix: Some("squared"),
        write_to_disk: false,
    },
    ItemSpec {
        name: "mean",
        item: ContainerItem::Mean,
        suffix: Some("mean"),
        write_to_disk: false,
    },
    ItemSpec {
        name: "variance",
        item: ContainerItem::Variance,
        suffix: Some("variance"),
        write_to_disk: true,
    },
];

const QUOTIENT_ITEMS: &[ItemSpec] = &[
    ItemSpec {
        name: "numerator",
        item: ContainerItem::Slot(0),
        suffix: Some("numerator"),
        write_to_disk: true,
    },
    ItemSpec {
        name: "denominator",
        item: ContainerItem::Slot(1),
        suffix: Some("denominator"),
        write_to_disk: true,
    },
    ItemSpec {
        name: "quotient",
        item: ContainerItem::Quotient,
        suffix: Some("quotient"),
        write_to_disk: false,
    },
];

impl ContainerKind {
    /// Every container class, in registration order.
    pub const ALL: [Self; 5] = [
        Self::SingleImage,
        Self::SingleMeanImage,
        Self::SingleImageWithVariance,
        Self::QuotientImage,
        Self::QuotientMeanImage,
    ];

    /// Name under which the class is registered.
    #[must_use]
    pub const fn class_name(self) -> &'static str {
        match self {
            Self::SingleImage => "SingleImage",
            Self::SingleMeanImage => "SingleMeanImage",
            Self::SingleImageWithVariance => "SingleImageWithVariance",
            Self::QuotientImage => "QuotientImage",
            Self::QuotientMeanImage => "QuotientMeanImage",
        }
    }

    /// Shape of the wrapped data item.
    #[must_use]
    pub const fn shape(self) -> ItemShape {
        match self {
            Self::SingleImage | Self::SingleMeanImage => ItemShape::Scalar,
            Self::SingleImageWithVariance => ItemShape::Tuple(2),
            Self::QuotientImage | Self::QuotientMeanImage => ItemShape::Quotient,
        }
    }

    #[must_use]
    pub const fn merge_rule(self) -> MergeRule {
        match self {
            Self::SingleMeanImage | Self::QuotientMeanImage => MergeRule::WeightedMean,
            Self::SingleImage | Self::SingleImageWithVariance | Self::QuotientImage => MergeRule::Sum,
        }
    }

    const fn items(self) -> &'static [ItemSpec] {
        match self {
            Self::SingleImage | Self::SingleMeanImage => SINGLE_ITEMS,
            Self::SingleImageWithVariance => VARIANCE_ITEMS,
            Self::QuotientImage | Self::QuotientMeanImage => QUOTIENT_ITEMS,
        }
    }

    /// Names of the items this class exposes, slots first.
    pub fn item_names(self) -> impl Iterator<Item = &'static str> {
        self.items().iter().map(|spec| spec.name)
    }

    fn spec(self, item: &ItemId) -> Option<&'static ItemSpec> {
        let items = self.items();
        match item {
            ItemId::Index(i) => items.iter().find(|s| s.item == ContainerItem::Slot(*i)),
            ItemId::Name(name) => items.iter().find(|s| s.name == name.as_str()),
        }
    }

    /// File name suffix registered for `item` in `write_config`.
    ///
    /// Unknown items and out-of-range indices have no suffix.
    #[must_use]
    pub fn item_suffix<'a>(self, write_config: &'a WriteConfig, item: &ItemId) -> Option<&'a str> {
        let spec = self.spec(item)?;
        write_config.get(spec.name)?.suffix.as_deref()
    }

    /// The canonical write configuration of this class.
    #[must_use]
    pub fn default_write_config(self) -> WriteConfig {
        WriteConfig(
            self.items()
                .iter()
                .map(|spec| {
                    (
                        spec.name.to_string(),
                        ItemWriteConfig {
                            suffix: spec.suffix.map(str::to_string),
                            write_to_disk: spec.write_to_disk,
                        },
                    )
                })
                .collect(),
        )
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

/// How one item is named on disk and whether it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemWriteConfig {
    /// Inserted before the file extension; `None` writes to the base path.
    pub suffix: Option<String>,
    pub write_to_disk: bool,
}

/// Per-item persistence policy of a container, keyed by item name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriteConfig(BTreeMap<String, ItemWriteConfig>);

impl WriteConfig {
    #[must_use]
    pub fn get(&self, item: &str) -> Option<&ItemWriteConfig> {
        self.0.get(item)
    }

    /// True if at least one item is persisted.
    #[must_use]
    pub fn any_write_to_disk(&self) -> bool {
        self.0.values().any(|c| c.write_to_disk)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ItemWriteConfig)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn entry_mut(&mut self, item: &str) -> Result<&mut ItemWriteConfig, DataItemError> {
        self.0.get_mut(item).ok_or_else(|| DataItemError::UnknownItem {
            item: item.to_string(),
            shape: "write config".to_string(),
        })
    }

    /// Enable or disable persisting `item`.
    ///
    /// # Errors
    /// `UnknownItem` if the table has no such item.
    pub fn set_write_to_disk(&mut self, item: &str, write_to_disk: bool) -> Result<(), DataItemError> {
        self.entry_mut(item)?.write_to_disk = write_to_disk;
        Ok(())
    }

    /// Change the file name suffix of `item`.
    ///
    /// # Errors
    /// `UnknownItem` if the table has no such item.
    pub fn set_suffix(&mut self, item: &str, suffix: Option<String>) -> Result<(), DataItemError> {
        self.entry_mut(item)?.suffix = suffix;
        Ok(())
    }

    /// Overlay `overrides` onto this table; unknown items are rejected.
    ///
    /// # Errors
    /// `UnknownItem` for the first override naming an item not in the table.
    pub fn apply(&mut self, overrides: &Self) -> Result<(), DataItemError> {
        for (item, cfg) in &overrides.0 {
            *self.entry_mut(item)? = cfg.clone();
        }
        Ok(())
    }
}

/// A borrowed view of container data returned by `get_data`.
#[derive(Debug, Clone)]
pub enum ItemData<'a> {
    /// The whole wrapped item.
    Item(&'a DataItem),
    /// One stored or derived image.
    Image(Cow<'a, Image>),
}

impl<'a> ItemData<'a> {
    #[must_use]
    pub fn as_item(&self) -> Option<&'a DataItem> {
        match self {
            Self::Item(item) => Some(item),
            Self::Image(_) => None,
        }
    }

    #[must_use]
    pub fn into_image(self) -> Option<Cow<'a, Image>> {
        match self {
            Self::Image(image) => Some(image),
            Self::Item(_) => None,
        }
    }
}

/// One data item plus metadata and write configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DataItemContainer {
    kind: ContainerKind,
    item: DataItem,
    owner: Option<OutputKey>,
    metadata: Map<String, Value>,
    write_config: WriteConfig,
    number_of_samples: u64,
}

impl DataItemContainer {
    /// Create an empty container of the given class.
    #[must_use]
    pub fn new(kind: ContainerKind) -> Self {
        Self {
            kind,
            item: DataItem::new(kind.shape()),
            owner: None,
            metadata: Map::new(),
            write_config: kind.default_write_config(),
            number_of_samples: 0,
        }
    }

    /// Create a container holding `images`, one per slot.
    ///
    /// # Errors
    /// `IncompatibleShape` if the image count differs from the class arity.
    pub fn from_images(kind: ContainerKind, images: Vec<Image>) -> Result<Self, DataItemError> {
        let mut container = Self::new(kind);
        container.item.set_payload(images)?;
        Ok(container)
    }

    /// Wrap an existing item.
    ///
    /// # Errors
    /// `IncompatibleShape` if the item's shape does not match the class.
    pub fn from_item(kind: ContainerKind, item: DataItem) -> Result<Self, DataItemError> {
        if item.shape() != kind.shape() {
            return Err(DataItemError::IncompatibleShape {
                expected: kind.shape().arity(),
                actual: item.arity(),
            });
        }
        let mut container = Self::new(kind);
        container.item = item;
        Ok(container)
    }

    #[must_use]
    pub const fn kind(&self) -> ContainerKind {
        self.kind
    }

    #[must_use]
    pub const fn item(&self) -> &DataItem {
        &self.item
    }

    pub fn item_mut(&mut self) -> &mut DataItem {
        &mut self.item
    }

    /// True while the wrapped item has no payload.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.item.is_unset()
    }

    /// Key of the output this container belongs to.
    #[must_use]
    pub const fn owner(&self) -> Option<&OutputKey> {
        self.owner.as_ref()
    }

    pub fn set_owner(&mut self, owner: OutputKey) {
        self.owner = Some(owner);
    }

    #[must_use]
    pub const fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Shallow-merge `entries` into the metadata, overwriting existing keys.
    pub fn update_meta_data(&mut self, entries: Map<String, Value>) {
        self.metadata.extend(entries);
    }

    #[must_use]
    pub const fn write_config(&self) -> &WriteConfig {
        &self.write_config
    }

    pub fn write_config_mut(&mut self) -> &mut WriteConfig {
        &mut self.write_config
    }

    pub fn set_write_config(&mut self, write_config: WriteConfig) {
        self.write_config = write_config;
    }

    #[must_use]
    pub const fn number_of_samples(&self) -> u64 {
        self.number_of_samples
    }

    pub fn set_number_of_samples(&mut self, number_of_samples: u64) {
        self.number_of_samples = number_of_samples;
    }

    /// Merge `other` into this container.
    ///
    /// Only the data and the sample count are merged; metadata is left as is.
    ///
    /// # Errors
    /// `KindMismatch`, `EmptyPayload`, `IncompatibleShape`, `ShapeMismatch`
    /// or `NoSamples`; on error `self` is unchanged.
    pub fn inplace_merge_with(&mut self, other: &Self) -> Result<(), DataItemError> {
        if self.kind != other.kind {
            return Err(DataItemError::KindMismatch {
                expected: self.kind.to_string(),
                actual: other.kind.to_string(),
            });
        }
        self.item.check_compatible(&other.item)?;

        let total = self.number_of_samples + other.number_of_samples;
        match self.kind.merge_rule() {
            MergeRule::Sum => {
                self.item.accumulate(&other.item)?;
            }
            MergeRule::WeightedMean => {
                if total == 0 {
                    return Err(DataItemError::NoSamples);
                }
                #[allow(clippy::cast_precision_loss)]
                let (ours, theirs) = (
                    self.number_of_samples as f64 / total as f64,
                    other.number_of_samples as f64 / total as f64,
                );
                let mut weighted = other.item.clone();
                weighted.scale(theirs)?;
                self.item.scale(ours)?;
                self.item.accumulate(&weighted)?;
            }
        }
        self.number_of_samples = total;
        Ok(())
    }

    /// Returns the whole item (`None`) or one stored or derived item.
    ///
    /// # Errors
    /// `UnknownItem`, `EmptyPayload`, or `NoSamples` for mean/variance of an
    /// empty accumulation.
    pub fn get_data(&self, item: Option<&ItemId>) -> Result<ItemData<'_>, DataItemError> {
        let Some(id) = item else {
            return Ok(ItemData::Item(&self.item));
        };
        let spec = self.kind.spec(id).ok_or_else(|| DataItemError::UnknownItem {
            item: id.to_string(),
            shape: self.kind.to_string(),
        })?;
        self.resolve(spec.item).map(ItemData::Image)
    }

    fn resolve(&self, item: ContainerItem) -> Result<Cow<'_, Image>, DataItemError> {
        match item {
            ContainerItem::Slot(i) => self.item.slot(i).map(Cow::Borrowed),
            ContainerItem::Quotient => self.item.quotient().map(Cow::Owned),
            ContainerItem::Mean => self.mean().map(Cow::Owned),
            ContainerItem::Variance => self.variance().map(Cow::Owned),
        }
    }

    fn samples_as_divisor(&self) -> Result<f64, DataItemError> {
        if self.number_of_samples == 0 {
            return Err(DataItemError::NoSamples);
        }
        #[allow(clippy::cast_precision_loss)]
        Ok(self.number_of_samples as f64)
    }

    fn mean(&self) -> Result<Image, DataItemError> {
        let n = self.samples_as_divisor()?;
        Ok(self.item.slot(0)?.map(|v| v / n))
    }

    /// Per-voxel variance `E[x²] - E[x]²`, clamped at zero.
    fn variance(&self) -> Result<Image, DataItemError> {
        let n = self.samples_as_divisor()?;
        let mean = self.mean()?;
        let squared_mean = self.item.slot(1)?.map(|v| v / n);
        let mean_squared = mean.multiply(&mean)?;
        let mut variance = squared_mean.subtract(&mean_squared)?;
        for v in variance.values_mut() {
            if *v < 0.0 {
                *v = 0.0;
            }
        }
        Ok(variance)
    }

    /// File name suffix registered for `item`.
    ///
    /// Unknown items and out-of-range indices have no suffix.
    #[must_use]
    pub fn suffix_for(&self, item: &ItemId) -> Option<&str> {
        self.kind.item_suffix(&self.write_config, item)
    }

    /// Path of `item` below `base`, or `base` itself for unknown items.
    #[must_use]
    pub fn output_path_for_item(&self, base: &Path, item: &ItemId) -> PathBuf {
        insert_suffix_before_extension(base, self.suffix_for(item))
    }

    /// True if at least one item is configured to be persisted.
    #[must_use]
    pub fn any_write_to_disk(&self) -> bool {
        self.write_config.any_write_to_disk()
    }

    /// Write the container below `base`.
    ///
    /// With no selector every item whose `write_to_disk` flag is set is
    /// written to its suffixed path. A recognized selector writes exactly
    /// that item, regardless of its flag. An unrecognized selector has no
    /// suffix and behaves like no selector.
    ///
    /// Derived items are computed before the first file is touched, so a
    /// failing item leaves the disk unchanged.
    ///
    /// # Errors
    /// `EmptyPayload` if unset, derived-item failures, `Storage` on I/O.
    pub fn write(&self, base: &Path, item: Option<&ItemId>) -> OutputResult<Vec<PathBuf>> {
        let pending = self.plan_write(base, item)?;
        write_planned(&pending)
    }

    /// Resolve every file [`write`](Self::write) would produce, without
    /// touching the disk.
    pub(crate) fn plan_write(&self, base: &Path, item: Option<&ItemId>) -> Result<Vec<PlannedFile<'_>>, DataItemError> {
        if self.is_empty() {
            return Err(DataItemError::EmptyPayload);
        }

        let selected: Vec<&ItemSpec> = match item.and_then(|id| self.kind.spec(id)) {
            Some(spec) => vec![spec],
            None => self
                .kind
                .items()
                .iter()
                .filter(|spec| self.write_config.get(spec.name).is_some_and(|c| c.write_to_disk))
                .collect(),
        };

        selected
            .into_iter()
            .map(|spec| {
                let suffix = self.write_config.get(spec.name).and_then(|c| c.suffix.as_deref());
                Ok(PlannedFile {
                    path: insert_suffix_before_extension(base, suffix),
                    header: FileHeader::new(
                        spec.name,
                        self.kind.class_name(),
                        self.number_of_samples,
                        self.metadata.clone(),
                    ),
                    image: self.resolve(spec.item)?,
                })
            })
            .collect()
    }

    /// Read a container of class `kind` previously written below `base`.
    ///
    /// Every slot must have been written; derived items are recomputed.
    ///
    /// # Errors
    /// `Storage` if a slot file is missing or corrupt.
    pub fn load(kind: ContainerKind, base: &Path, write_config: WriteConfig) -> OutputResult<Self> {
        let mut images = Vec::with_capacity(kind.shape().arity());
        let mut first_header = None;
        for spec in kind.items() {
            if !matches!(spec.item, ContainerItem::Slot(_)) {
                continue;
            }
            let suffix = write_config.get(spec.name).and_then(|c| c.suffix.as_deref());
            let stored = storage::read_image_file(&insert_suffix_before_extension(base, suffix))?;
            first_header.get_or_insert(stored.header);
            images.push(stored.image);
        }

        let mut container = Self::from_images(kind, images)?;
        container.write_config = write_config;
        if let Some(header) = first_header {
            container.metadata = header.metadata;
            container.number_of_samples = header.number_of_samples;
        }
        Ok(container)
    }

    /// Allocate every slot as an image of `properties` filled with
    /// `fill_value`, replacing any existing payload.
    ///
    /// # Errors
    /// `IncompatibleShape` if the images do not fit the class shape; the
    /// previous payload is kept.
    pub fn create_empty_image(&mut self, properties: ImageProperties, fill_value: f64) -> Result<(), DataItemError> {
        let shape = self.kind.shape();
        let image = Image::filled(properties.size, properties.spacing, properties.origin, fill_value);
        self.item = DataItem::with_payload(shape, vec![image; shape.arity()])?;
        Ok(())
    }

    /// Set spacing and/or origin on every slot. No-op while empty.
    pub fn set_image_properties(&mut self, spacing: Option<[f64; 3]>, origin: Option<[f64; 3]>) {
        let arity = self.item.arity();
        for i in 0..arity {
            if let Ok(image) = self.item.slot_mut(i) {
                if let Some(spacing) = spacing {
                    image.set_spacing(spacing);
                }
                if let Some(origin) = origin {
                    image.set_origin(origin);
                }
            }
        }
    }

    /// Spatial metadata of the first slot, if populated.
    #[must_use]
    pub fn image_properties(&self) -> Option<ImageProperties> {
        self.item.slot(0).ok().map(Image::properties)
    }
}

/// One file resolved by [`DataItemContainer::plan_write`].
#[derive(Debug)]
pub(crate) struct PlannedFile<'a> {
    pub(crate) path: PathBuf,
    pub(crate) header: FileHeader,
    pub(crate) image: Cow<'a, Image>,
}

/// Write planned files in order, returning their paths.
pub(crate) fn write_planned(files: &[PlannedFile<'_>]) -> OutputResult<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        storage::write_image_file(&file.path, &file.header, &file.image)?;
        tracing::debug!(path = %file.path.display(), item = %file.header.item, "wrote output item");
        written.push(file.path.clone());
    }
    Ok(written)
}

/// Container classes available by name.
///
/// Built once at startup and handed to whoever constructs outputs.
#[derive(Debug, Clone)]
pub struct ContainerRegistry {
    classes: BTreeMap<String, ContainerKind>,
}

impl ContainerRegistry {
    /// A registry with no classes.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            classes: BTreeMap::new(),
        }
    }

    /// A registry holding every built-in class under its class name.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for kind in ContainerKind::ALL {
            registry.register(kind.class_name(), kind);
        }
        registry
    }

    /// Register `kind` under `name` (e.g. an alias), replacing any entry.
    pub fn register(&mut self, name: impl Into<String>, kind: ContainerKind) {
        self.classes.insert(name.into(), kind);
    }

    /// Look up a class by name.
    ///
    /// # Errors
    /// `UnknownContainerClass` if nothing is registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<ContainerKind, ConfigurationError> {
        self.classes
            .get(name)
            .copied()
            .ok_or_else(|| ConfigurationError::UnknownContainerClass {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }
}

impl Default for ContainerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(values: &[f64]) -> Image {
        Image::from_vec(values.to_vec())
    }

    fn quotient(num: f64, den: f64) -> DataItemContainer {
        DataItemContainer::from_images(ContainerKind::QuotientImage, vec![img(&[num]), img(&[den])]).unwrap()
    }

    #[test]
    fn test_default_write_config_for_quotient() {
        let cfg = ContainerKind::QuotientImage.default_write_config();
        assert!(cfg.get("numerator").unwrap().write_to_disk);
        assert!(cfg.get("denominator").unwrap().write_to_disk);
        assert!(!cfg.get("quotient").unwrap().write_to_disk);
        assert_eq!(cfg.get("quotient").unwrap().suffix.as_deref(), Some("quotient"));
    }

    #[test]
    fn test_from_images_checks_arity() {
        let err = DataItemContainer::from_images(ContainerKind::SingleImage, vec![img(&[1.0]), img(&[1.0])])
            .unwrap_err();
        assert_eq!(err, DataItemError::IncompatibleShape { expected: 1, actual: 2 });
    }

    #[test]
    fn test_sum_merge_keeps_metadata() {
        let mut a = DataItemContainer::from_images(ContainerKind::SingleImage, vec![img(&[1.0, 1.0])]).unwrap();
        let mut b = DataItemContainer::from_images(ContainerKind::SingleImage, vec![img(&[3.0, 3.0])]).unwrap();
        let mut meta = Map::new();
        meta.insert("run".into(), Value::from(0));
        a.update_meta_data(meta);
        let mut other_meta = Map::new();
        other_meta.insert("run".into(), Value::from(1));
        b.update_meta_data(other_meta);

        a.inplace_merge_with(&b).unwrap();
        assert_eq!(a.item().slot(0).unwrap().values(), &[4.0, 4.0]);
        assert_eq!(a.metadata().get("run"), Some(&Value::from(0)));
    }

    #[test]
    fn test_merge_rejects_other_kind() {
        let mut a = DataItemContainer::from_images(ContainerKind::SingleImage, vec![img(&[1.0])]).unwrap();
        let b = DataItemContainer::from_images(ContainerKind::SingleMeanImage, vec![img(&[1.0])]).unwrap();
        assert!(matches!(a.inplace_merge_with(&b), Err(DataItemError::KindMismatch { .. })));
    }

    #[test]
    fn test_merge_into_empty_container_fails() {
        let mut a = DataItemContainer::new(ContainerKind::SingleImage);
        let b = DataItemContainer::from_images(ContainerKind::SingleImage, vec![img(&[1.0])]).unwrap();
        assert_eq!(a.inplace_merge_with(&b), Err(DataItemError::EmptyPayload));
    }

    #[test]
    fn test_weighted_mean_merge() {
        let mut a = DataItemContainer::from_images(ContainerKind::SingleMeanImage, vec![img(&[2.0])]).unwrap();
        a.set_number_of_samples(1);
        let mut b = DataItemContainer::from_images(ContainerKind::SingleMeanImage, vec![img(&[6.0])]).unwrap();
        b.set_number_of_samples(3);

        a.inplace_merge_with(&b).unwrap();
        assert_eq!(a.item().slot(0).unwrap().values(), &[5.0]);
        assert_eq!(a.number_of_samples(), 4);
    }

    #[test]
    fn test_weighted_mean_without_samples() {
        let mut a = DataItemContainer::from_images(ContainerKind::QuotientMeanImage, vec![img(&[1.0]), img(&[1.0])])
            .unwrap();
        let b = a.clone();
        assert_eq!(a.inplace_merge_with(&b), Err(DataItemError::NoSamples));
        assert_eq!(a.item().slot(0).unwrap().values(), &[1.0]);
    }

    #[test]
    fn test_variance_items() {
        // Samples 1, 3 -> sum 4, sum of squares 10, mean 2, variance 1.
        let mut c = DataItemContainer::from_images(
            ContainerKind::SingleImageWithVariance,
            vec![img(&[4.0]), img(&[10.0])],
        )
        .unwrap();
        c.set_number_of_samples(2);
        let mean = c.get_data(Some(&"mean".into())).unwrap().into_image().unwrap();
        assert_eq!(mean.values(), &[2.0]);
        let var = c.get_data(Some(&"variance".into())).unwrap().into_image().unwrap();
        assert_eq!(var.values(), &[1.0]);
    }

    #[test]
    fn test_variance_without_samples() {
        let c = DataItemContainer::from_images(ContainerKind::SingleImageWithVariance, vec![img(&[1.0]), img(&[1.0])])
            .unwrap();
        assert_eq!(c.get_data(Some(&"variance".into())).unwrap_err(), DataItemError::NoSamples);
    }

    #[test]
    fn test_get_data_quotient() {
        let c = quotient(6.0, 2.0);
        let q = c.get_data(Some(&"quotient".into())).unwrap().into_image().unwrap();
        assert_eq!(q.values(), &[3.0]);
        let whole = c.get_data(None).unwrap();
        assert_eq!(whole.as_item().unwrap().arity(), 2);
        assert!(matches!(
            c.get_data(Some(&"variance".into())),
            Err(DataItemError::UnknownItem { .. })
        ));
    }

    #[test]
    fn test_suffix_lookup() {
        let c = quotient(1.0, 1.0);
        assert_eq!(c.suffix_for(&"numerator".into()), Some("numerator"));
        assert_eq!(c.suffix_for(&1.into()), Some("denominator"));
        assert_eq!(c.suffix_for(&5.into()), None);
        assert_eq!(c.suffix_for(&"bogus".into()), None);
        assert_eq!(
            c.output_path_for_item(Path::new("r.mhd"), &"bogus".into()),
            PathBuf::from("r.mhd")
        );
    }

    #[test]
    fn test_write_honours_write_config() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("ratio.mhd");
        let mut c = quotient(6.0, 2.0);
        c.write_config_mut().set_write_to_disk("denominator", false).unwrap();
        c.write_config_mut().set_write_to_disk("quotient", true).unwrap();

        let written = c.write(&base, None).unwrap();
        assert_eq!(
            written,
            vec![dir.path().join("ratio_numerator.mhd"), dir.path().join("ratio_quotient.mhd")]
        );
    }

    #[test]
    fn test_write_explicit_item_ignores_flag() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("ratio.mhd");
        let c = quotient(6.0, 2.0);
        let written = c.write(&base, Some(&"quotient".into())).unwrap();
        assert_eq!(written, vec![dir.path().join("ratio_quotient.mhd")]);
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("ratio.mhd");
        let mut c = quotient(6.0, 2.0);
        let mut meta = Map::new();
        meta.insert("threshold".into(), Value::from(0.7));
        c.update_meta_data(meta);
        c.write(&base, None).unwrap();

        let loaded =
            DataItemContainer::load(ContainerKind::QuotientImage, &base, ContainerKind::QuotientImage.default_write_config())
                .unwrap();
        assert_eq!(loaded.item(), c.item());
        assert_eq!(loaded.metadata().get("threshold"), Some(&Value::from(0.7)));
    }

    #[test]
    fn test_failed_derived_item_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let c = DataItemContainer::from_images(ContainerKind::SingleImageWithVariance, vec![img(&[4.0]), img(&[10.0])])
            .unwrap();
        let err = c.write(&dir.path().join("v.mhd"), None).unwrap_err();
        assert!(err.is_data_item());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_empty_container_fails() {
        let dir = tempfile::tempdir().unwrap();
        let c = DataItemContainer::new(ContainerKind::SingleImage);
        let err = c.write(&dir.path().join("x.mhd"), None).unwrap_err();
        assert!(err.is_data_item());
    }

    #[test]
    fn test_create_empty_and_properties() {
        let mut c = DataItemContainer::new(ContainerKind::QuotientImage);
        assert!(c.image_properties().is_none());
        c.set_image_properties(Some([9.0; 3]), None);
        assert!(c.is_empty());

        let props = ImageProperties {
            size: [2, 2, 2],
            spacing: [1.0; 3],
            origin: [0.0; 3],
        };
        c.create_empty_image(props, 0.0).unwrap();
        assert!(!c.is_empty());
        c.set_image_properties(Some([2.5; 3]), Some([-1.0, 0.0, 1.0]));
        let p = c.image_properties().unwrap();
        assert_eq!(p.spacing, [2.5; 3]);
        assert_eq!(p.origin, [-1.0, 0.0, 1.0]);
        assert_eq!(c.item().slot(1).unwrap().spacing(), [2.5; 3]);
    }

    #[test]
    fn test_write_config_overrides() {
        let mut cfg = ContainerKind::SingleImageWithVariance.default_write_config();
        let mut overrides = WriteConfig::default();
        overrides.0.insert(
            "squared".into(),
            ItemWriteConfig {
                suffix: Some("sq".into()),
                write_to_disk: true,
            },
        );
        cfg.apply(&overrides).unwrap();
        assert_eq!(cfg.get("squared").unwrap().suffix.as_deref(), Some("sq"));

        assert!(cfg.set_write_to_disk("bogus", true).is_err());
    }

    #[test]
    fn test_registry() {
        let registry = ContainerRegistry::with_defaults();
        assert_eq!(registry.resolve("QuotientImage").unwrap(), ContainerKind::QuotientImage);
        assert!(matches!(
            registry.resolve("NoSuchClass"),
            Err(ConfigurationError::UnknownContainerClass { .. })
        ));
        assert_eq!(registry.names().count(), ContainerKind::ALL.len());

        let mut custom = ContainerRegistry::empty();
        custom.register("Edep", ContainerKind::SingleImage);
        assert_eq!(custom.resolve("Edep").unwrap(), ContainerKind::SingleImage);
        assert!(custom.resolve("SingleImage").is_err());
    }
}
