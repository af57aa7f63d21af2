//! Voxel images: the array payload carried by data item slots.
//!
//! An image is a dense 3D array of `f64` values stored x-fastest, plus the
//! spatial metadata (spacing and origin) needed to place it in the world.
//! Arithmetic is elementwise and follows IEEE semantics: dividing by a zero
//! voxel yields `inf` or `NaN`, never an error.

use serde::{Deserialize, Serialize};

use crate::error::DataItemError;

/// Spatial metadata of an image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageProperties {
    /// Number of voxels along each axis.
    pub size: [usize; 3],
    /// Voxel spacing along each axis.
    pub spacing: [f64; 3],
    /// World position of the first voxel.
    pub origin: [f64; 3],
}

impl ImageProperties {
    /// Total number of voxels.
    #[must_use]
    pub const fn voxel_count(&self) -> usize {
        self.size[0] * self.size[1] * self.size[2]
    }
}

/// A dense 3D image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    size: [usize; 3],
    spacing: [f64; 3],
    origin: [f64; 3],
    #[serde(with = "voxel_values")]
    values: Vec<f64>,
}

/// JSON has no representation for `inf`/`NaN`, which quotients of empty
/// voxels produce; those are stored as strings.
mod voxel_values {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Voxel {
        Finite(f64),
        Special(String),
    }

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let voxels: Vec<Voxel> = values
            .iter()
            .map(|&v| {
                if v.is_finite() {
                    Voxel::Finite(v)
                } else if v.is_nan() {
                    Voxel::Special("nan".to_string())
                } else if v > 0.0 {
                    Voxel::Special("inf".to_string())
                } else {
                    Voxel::Special("-inf".to_string())
                }
            })
            .collect();
        voxels.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let voxels = Vec::<Voxel>::deserialize(deserializer)?;
        voxels
            .into_iter()
            .map(|v| match v {
                Voxel::Finite(x) => Ok(x),
                Voxel::Special(s) => match s.as_str() {
                    "nan" => Ok(f64::NAN),
                    "inf" => Ok(f64::INFINITY),
                    "-inf" => Ok(f64::NEG_INFINITY),
                    other => Err(serde::de::Error::custom(format!("invalid voxel value '{other}'"))),
                },
            })
            .collect()
    }
}

impl Image {
    /// Create an image filled with `fill_value`.
    #[must_use]
    pub fn filled(size: [usize; 3], spacing: [f64; 3], origin: [f64; 3], fill_value: f64) -> Self {
        let count = size[0] * size[1] * size[2];
        Self {
            size,
            spacing,
            origin,
            values: vec![fill_value; count],
        }
    }

    /// Create an image from existing voxel values.
    ///
    /// # Errors
    /// Returns `PayloadLength` if `values` does not match `size`.
    pub fn from_values(
        size: [usize; 3],
        spacing: [f64; 3],
        origin: [f64; 3],
        values: Vec<f64>,
    ) -> Result<Self, DataItemError> {
        let expected = size[0] * size[1] * size[2];
        if values.len() != expected {
            return Err(DataItemError::PayloadLength {
                size,
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            size,
            spacing,
            origin,
            values,
        })
    }

    /// A one-dimensional image of `values` with unit spacing.
    #[must_use]
    pub fn from_vec(values: Vec<f64>) -> Self {
        Self {
            size: [values.len(), 1, 1],
            spacing: [1.0; 3],
            origin: [0.0; 3],
            values,
        }
    }

    #[must_use]
    pub const fn size(&self) -> [usize; 3] {
        self.size
    }

    #[must_use]
    pub const fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    #[must_use]
    pub const fn origin(&self) -> [f64; 3] {
        self.origin
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Spatial metadata of this image.
    #[must_use]
    pub const fn properties(&self) -> ImageProperties {
        ImageProperties {
            size: self.size,
            spacing: self.spacing,
            origin: self.origin,
        }
    }

    pub fn set_spacing(&mut self, spacing: [f64; 3]) {
        self.spacing = spacing;
    }

    pub fn set_origin(&mut self, origin: [f64; 3]) {
        self.origin = origin;
    }

    fn check_same_size(&self, other: &Self) -> Result<(), DataItemError> {
        if self.size == other.size {
            Ok(())
        } else {
            Err(DataItemError::ShapeMismatch {
                expected: self.size,
                actual: other.size,
            })
        }
    }

    fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Result<Self, DataItemError> {
        self.check_same_size(other)?;
        let values = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Self {
            size: self.size,
            spacing: self.spacing,
            origin: self.origin,
            values,
        })
    }

    /// Elementwise sum, keeping this image's spatial metadata.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the sizes differ.
    pub fn add(&self, other: &Self) -> Result<Self, DataItemError> {
        self.zip_with(other, |a, b| a + b)
    }

    /// In-place elementwise sum.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the sizes differ; `self` is left untouched.
    pub fn add_assign(&mut self, other: &Self) -> Result<(), DataItemError> {
        self.check_same_size(other)?;
        for (a, &b) in self.values.iter_mut().zip(other.values.iter()) {
            *a += b;
        }
        Ok(())
    }

    /// Elementwise difference.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the sizes differ.
    pub fn subtract(&self, other: &Self) -> Result<Self, DataItemError> {
        self.zip_with(other, |a, b| a - b)
    }

    /// Elementwise quotient.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the sizes differ.
    pub fn divide(&self, other: &Self) -> Result<Self, DataItemError> {
        self.zip_with(other, |a, b| a / b)
    }

    /// Elementwise product.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the sizes differ.
    pub fn multiply(&self, other: &Self) -> Result<Self, DataItemError> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Multiplies every voxel by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for v in &mut self.values {
            *v *= factor;
        }
    }

    /// Applies `f` to every voxel, returning a new image.
    #[must_use]
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            size: self.size,
            spacing: self.spacing,
            origin: self.origin,
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }
}
