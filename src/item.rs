//! Mergeable data items.
//!
//! A [`DataItem`] is a fixed-arity tuple of image slots tagged with an
//! [`ItemShape`]. The payload is either fully unset or fully populated, so
//! the "all slots set together" rule holds by construction.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DataItemError, OutputResult};
use crate::image::Image;
use crate::path::insert_suffix_before_extension;
use crate::storage;

/// Shape of a data item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemShape {
    /// A single image.
    Scalar,
    /// A tuple of `n` images summed slot by slot.
    Tuple(usize),
    /// A numerator/denominator pair with a derived quotient.
    Quotient,
}

impl ItemShape {
    /// Number of slots in the payload.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Tuple(n) => n,
            Self::Quotient => 2,
        }
    }

    /// Default file name suffix of an item, if it has one.
    ///
    /// Unrecognized names and out-of-range indices have no suffix.
    #[must_use]
    pub fn default_suffix(self, item: &ItemId) -> Option<String> {
        match (self, self.item_ref(item)?) {
            (Self::Scalar, _) => None,
            (Self::Tuple(_), ItemRef::Slot(i)) => Some(format!("item_{i}")),
            (Self::Quotient, ItemRef::Slot(0)) => Some("numerator".to_string()),
            (Self::Quotient, ItemRef::Slot(_)) => Some("denominator".to_string()),
            (_, ItemRef::Quotient) => Some("quotient".to_string()),
        }
    }

    pub(crate) fn item_ref(self, item: &ItemId) -> Option<ItemRef> {
        match item {
            ItemId::Index(i) if *i < self.arity() => Some(ItemRef::Slot(*i)),
            ItemId::Index(_) => None,
            ItemId::Name(name) => match (self, name.as_str()) {
                (Self::Quotient, "numerator") => Some(ItemRef::Slot(0)),
                (Self::Quotient, "denominator") => Some(ItemRef::Slot(1)),
                (Self::Quotient, "quotient") => Some(ItemRef::Quotient),
                (Self::Tuple(n), other) => other
                    .strip_prefix("item_")
                    .and_then(|i| i.parse::<usize>().ok())
                    .filter(|i| *i < n)
                    .map(ItemRef::Slot),
                _ => None,
            },
        }
    }
}

impl fmt::Display for ItemShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Tuple(n) => write!(f, "tuple({n})"),
            Self::Quotient => write!(f, "quotient"),
        }
    }
}

/// Names one item inside a data item or container: a slot index or a name
/// such as `"numerator"` or `"quotient"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Index(usize),
    Name(String),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

impl From<usize> for ItemId {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for ItemId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ItemId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemRef {
    Slot(usize),
    Quotient,
}

/// A fixed-arity tuple of images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    shape: ItemShape,
    payload: Option<Vec<Image>>,
}

impl DataItem {
    /// Create an unset item of the given shape.
    #[must_use]
    pub const fn new(shape: ItemShape) -> Self {
        Self {
            shape,
            payload: None,
        }
    }

    /// Create a populated item.
    ///
    /// # Errors
    /// Returns `IncompatibleShape` if the number of images differs from the
    /// shape's arity.
    pub fn with_payload(shape: ItemShape, payload: Vec<Image>) -> Result<Self, DataItemError> {
        let mut item = Self::new(shape);
        item.set_payload(payload)?;
        Ok(item)
    }

    /// A single-image item.
    #[must_use]
    pub fn scalar(image: Image) -> Self {
        Self {
            shape: ItemShape::Scalar,
            payload: Some(vec![image]),
        }
    }

    /// A numerator/denominator item.
    #[must_use]
    pub fn quotient_pair(numerator: Image, denominator: Image) -> Self {
        Self {
            shape: ItemShape::Quotient,
            payload: Some(vec![numerator, denominator]),
        }
    }

    #[must_use]
    pub const fn shape(&self) -> ItemShape {
        self.shape
    }

    #[must_use]
    pub const fn arity(&self) -> usize {
        self.shape.arity()
    }

    /// True while no payload has been set.
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        self.payload.is_none()
    }

    /// Replace the whole payload.
    ///
    /// # Errors
    /// Returns `IncompatibleShape` if the number of images differs from the
    /// arity; the previous payload is kept.
    pub fn set_payload(&mut self, payload: Vec<Image>) -> Result<(), DataItemError> {
        if payload.len() != self.arity() {
            return Err(DataItemError::IncompatibleShape {
                expected: self.arity(),
                actual: payload.len(),
            });
        }
        self.payload = Some(payload);
        Ok(())
    }

    /// Drop the payload, returning the item to the unset state.
    pub fn clear_payload(&mut self) -> Option<Vec<Image>> {
        self.payload.take()
    }

    /// The payload slots, if set.
    #[must_use]
    pub fn payload(&self) -> Option<&[Image]> {
        self.payload.as_deref()
    }

    fn slots(&self) -> Result<&[Image], DataItemError> {
        self.payload.as_deref().ok_or(DataItemError::EmptyPayload)
    }

    fn slots_mut(&mut self) -> Result<&mut [Image], DataItemError> {
        self.payload.as_deref_mut().ok_or(DataItemError::EmptyPayload)
    }

    /// The image in slot `index`.
    ///
    /// # Errors
    /// `EmptyPayload` if unset, `UnknownItem` if out of range.
    pub fn slot(&self, index: usize) -> Result<&Image, DataItemError> {
        let shape = self.shape;
        self.slots()?
            .get(index)
            .ok_or_else(|| DataItemError::UnknownItem {
                item: index.to_string(),
                shape: shape.to_string(),
            })
    }

    /// Mutable access to the image in slot `index`.
    ///
    /// # Errors
    /// `EmptyPayload` if unset, `UnknownItem` if out of range.
    pub fn slot_mut(&mut self, index: usize) -> Result<&mut Image, DataItemError> {
        let shape = self.shape;
        self.slots_mut()?
            .get_mut(index)
            .ok_or_else(|| DataItemError::UnknownItem {
                item: index.to_string(),
                shape: shape.to_string(),
            })
    }

    fn require_quotient(&self, item: &str) -> Result<(), DataItemError> {
        if self.shape == ItemShape::Quotient {
            Ok(())
        } else {
            Err(DataItemError::UnknownItem {
                item: item.to_string(),
                shape: self.shape.to_string(),
            })
        }
    }

    /// Numerator of a quotient item.
    ///
    /// # Errors
    /// `UnknownItem` on non-quotient shapes, `EmptyPayload` if unset.
    pub fn numerator(&self) -> Result<&Image, DataItemError> {
        self.require_quotient("numerator")?;
        self.slot(0)
    }

    /// Denominator of a quotient item.
    ///
    /// # Errors
    /// `UnknownItem` on non-quotient shapes, `EmptyPayload` if unset.
    pub fn denominator(&self) -> Result<&Image, DataItemError> {
        self.require_quotient("denominator")?;
        self.slot(1)
    }

    /// `numerator / denominator`, voxel by voxel.
    ///
    /// Zero denominators yield `inf`/`NaN` voxels rather than an error.
    ///
    /// # Errors
    /// `UnknownItem` on non-quotient shapes, `EmptyPayload` if unset.
    pub fn quotient(&self) -> Result<Image, DataItemError> {
        self.numerator()?.divide(self.denominator()?)
    }

    /// Checks that `other` can be merged into `self` without partial
    /// mutation: both set, same arity, same image sizes slot by slot.
    ///
    /// # Errors
    /// `EmptyPayload`, `IncompatibleShape` or `ShapeMismatch`.
    pub fn check_compatible(&self, other: &Self) -> Result<(), DataItemError> {
        if self.arity() != other.arity() {
            return Err(DataItemError::IncompatibleShape {
                expected: self.arity(),
                actual: other.arity(),
            });
        }
        let (ours, theirs) = (self.slots()?, other.slots()?);
        for (a, b) in ours.iter().zip(theirs) {
            if a.size() != b.size() {
                return Err(DataItemError::ShapeMismatch {
                    expected: a.size(),
                    actual: b.size(),
                });
            }
        }
        Ok(())
    }

    /// Out-of-place sum; neither operand is modified.
    ///
    /// # Errors
    /// See [`check_compatible`](Self::check_compatible).
    pub fn combine(&self, other: &Self) -> Result<Self, DataItemError> {
        self.check_compatible(other)?;
        let payload = self
            .slots()?
            .iter()
            .zip(other.slots()?)
            .map(|(a, b)| a.add(b))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            shape: self.shape,
            payload: Some(payload),
        })
    }

    /// In-place sum. Returns `self` for chaining.
    ///
    /// # Errors
    /// See [`check_compatible`](Self::check_compatible); on error `self` is
    /// unchanged.
    pub fn accumulate(&mut self, other: &Self) -> Result<&mut Self, DataItemError> {
        self.check_compatible(other)?;
        let theirs = other.slots()?;
        for (a, b) in self.slots_mut()?.iter_mut().zip(theirs) {
            a.add_assign(b)?;
        }
        Ok(self)
    }

    /// Slot-by-slot quotient.
    ///
    /// # Errors
    /// See [`check_compatible`](Self::check_compatible).
    pub fn divide(&self, other: &Self) -> Result<Self, DataItemError> {
        self.check_compatible(other)?;
        let payload = self
            .slots()?
            .iter()
            .zip(other.slots()?)
            .map(|(a, b)| a.divide(b))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            shape: self.shape,
            payload: Some(payload),
        })
    }

    /// Multiplies every slot by `factor`.
    ///
    /// # Errors
    /// `EmptyPayload` if unset.
    pub fn scale(&mut self, factor: f64) -> Result<(), DataItemError> {
        for image in self.slots_mut()? {
            image.scale(factor);
        }
        Ok(())
    }

    /// Resolve a named or indexed item to its image.
    ///
    /// # Errors
    /// `UnknownItem` if the shape has no such item, `EmptyPayload` if unset.
    pub fn get(&self, item: &ItemId) -> Result<Cow<'_, Image>, DataItemError> {
        match self.shape.item_ref(item) {
            Some(ItemRef::Slot(i)) => self.slot(i).map(Cow::Borrowed),
            Some(ItemRef::Quotient) => self.quotient().map(Cow::Owned),
            None => Err(DataItemError::UnknownItem {
                item: item.to_string(),
                shape: self.shape.to_string(),
            }),
        }
    }

    /// Write the item below `path` using the shape's default suffixes.
    ///
    /// With no selector every slot goes to its own path. With a selector
    /// only that item is written, its suffix inserted before the extension.
    /// A selector the shape does not recognize is treated as no selector:
    /// a scalar lands on the unmodified path, while multi-slot items still
    /// give each slot its default suffix so no slot overwrites another.
    ///
    /// # Errors
    /// `EmptyPayload` if unset, `Storage` on I/O failure.
    pub fn write(&self, path: &Path, item: Option<&ItemId>) -> OutputResult<Vec<PathBuf>> {
        let slots = self.slots()?;
        let selected = item.and_then(|id| self.shape.item_ref(id).map(|r| (id, r)));
        let metadata = serde_json::Map::new();
        let mut written = Vec::new();

        if let Some((id, item_ref)) = selected {
            let target = insert_suffix_before_extension(path, self.shape.default_suffix(id).as_deref());
            let image = match item_ref {
                ItemRef::Slot(i) => Cow::Borrowed(&slots[i]),
                ItemRef::Quotient => Cow::Owned(self.quotient()?),
            };
            let header = storage::FileHeader::new(id.to_string(), self.shape.to_string(), 0, metadata);
            storage::write_image_file(&target, &header, &image)?;
            written.push(target);
            return Ok(written);
        }

        for (i, image) in slots.iter().enumerate() {
            let id = ItemId::Index(i);
            let target = insert_suffix_before_extension(path, self.shape.default_suffix(&id).as_deref());
            let header = storage::FileHeader::new(id.to_string(), self.shape.to_string(), 0, metadata.clone());
            storage::write_image_file(&target, &header, image)?;
            written.push(target);
        }
        Ok(written)
    }
}
