//! The in-memory X3P document.
//!
//! A [`Document`] owns the four records, the optional vendor extension id,
//! and the point data.  Records are plain data with validating setters;
//! the point data is only replaced through [`Document::set_data`], which
//! keeps Record3's dimension in step with the array shape.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::axes::{Axes, Axis, AxisType, DataType};
use crate::decode::{DecodeError, DecodeOptions, Decoder};
use crate::encode::{EncodeError, EncodeOptions, Encoder};
use crate::record::{
    Dimension, FeatureType, Instrument, Record1, Record2, Record3, Record4, StorageMode,
};
use crate::surface::{binary_layout, dimension_for_shape, LayoutError, SurfaceArray};
use crate::validate::Warning;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub record1:            Record1,
    /// `None` when the file has no Record2 at all.
    pub record2:            Option<Record2>,
    pub record3:            Record3,
    pub record4:            Record4,
    pub vendor_specific_id: Option<String>,
    #[serde(skip)]
    data:                   Option<SurfaceArray>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document: supported revision, Z absolute, binary storage,
    /// no Record2, no data.
    pub fn new() -> Self {
        Self {
            record1:            Record1::default(),
            record2:            None,
            record3:            Record3::default(),
            record4:            Record4::default(),
            vendor_specific_id: None,
            data:               None,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn feature_type(&self) -> Option<FeatureType> { self.record1.feature_type() }
    pub fn axes(&self) -> &Axes { &self.record1.axes }
    pub fn axes_mut(&mut self) -> &mut Axes { &mut self.record1.axes }
    pub fn dimension(&self) -> &Dimension { &self.record3.dimension }
    pub fn storage_mode(&self) -> StorageMode { self.record3.storage.mode() }

    pub fn instrument(&self) -> Option<&Instrument> {
        self.record2.as_ref().map(|r2| &r2.instrument)
    }

    pub fn data(&self) -> Option<&SurfaceArray> {
        self.data.as_ref()
    }

    /// Mutable access for masking.  The shape cannot change through this.
    pub fn data_mut(&mut self) -> Option<&mut SurfaceArray> {
        self.data.as_mut()
    }

    pub fn take_data(&mut self) -> Option<SurfaceArray> {
        self.data.take()
    }

    /// Replace the point data.  Record3's dimension is derived from the
    /// array shape and the X/Y axis types, so those must be set first.  When
    /// no axis declares a data type, CZ takes the array's.
    pub fn set_data(&mut self, data: SurfaceArray) -> Result<(), LayoutError> {
        let dimension = dimension_for_shape(
            data.shape(),
            self.storage_mode(),
            self.record1.axes.xy_types(),
            &self.record3.dimension,
        )?;
        if self.record1.axes.declared_data_types().is_empty() {
            self.record1.axes.cz.set_data_type(Some(data.data_type()));
        }
        self.record3.dimension = dimension;
        self.data = Some(data);
        Ok(())
    }

    /// Install data read from a file, trusting the file's dimension.
    pub(crate) fn attach_decoded(&mut self, data: SurfaceArray) {
        self.data = Some(data);
    }

    // ── Bytes and files ──────────────────────────────────────────────────────

    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, Vec<Warning>), DecodeError> {
        Decoder::default().decode(bytes)
    }

    pub fn from_bytes_with(bytes: &[u8], options: DecodeOptions) -> Result<(Self, Vec<Warning>), DecodeError> {
        Decoder::new(options).decode(bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        Encoder::default().encode(self)
    }

    pub fn to_bytes_with(&self, options: EncodeOptions) -> Result<Vec<u8>, EncodeError> {
        Encoder::new(options).encode(self)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, Vec<Warning>), DecodeError> {
        Self::open_with(path, DecodeOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: DecodeOptions) -> Result<(Self, Vec<Warning>), DecodeError> {
        let bytes = fs::read(path)?;
        Self::from_bytes_with(&bytes, options)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), EncodeError> {
        self.save_with(path, EncodeOptions::default())
    }

    pub fn save_with<P: AsRef<Path>>(&self, path: P, options: EncodeOptions) -> Result<(), EncodeError> {
        let bytes = self.to_bytes_with(options)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    // ── Coordinates ──────────────────────────────────────────────────────────

    /// The data as `(components, entries)` rows, X fastest.
    fn entry_rows(&self) -> Option<Cow<'_, SurfaceArray>> {
        let data = self.data.as_ref()?;
        match self.storage_mode() {
            StorageMode::Text => Some(Cow::Borrowed(data)),
            StorageMode::Binary => {
                let layout = binary_layout(self.record1.axes.xy_types(), &self.record3.dimension).ok()?;
                data.to_text_layout(&layout).ok().map(Cow::Owned)
            }
        }
    }

    /// Real-world coordinates `Q = R·P + T` of every valid point, in entry
    /// order.  Layers of a stacked matrix follow one another per entry.
    pub fn points(&self) -> Vec<[f64; 3]> {
        let Some(rows) = self.entry_rows() else {
            return Vec::new();
        };
        let axes = &self.record1.axes;
        let (components, entries) = (rows.shape()[0], rows.shape()[1]);
        let absolute = matches!(axes.xy_types(), Some((AxisType::Absolute, AxisType::Absolute)));
        let size_x = match self.record3.dimension {
            Dimension::Matrix(m) => m.size_x.max(1),
            Dimension::List(_)   => 1,
        };

        let mut out = Vec::with_capacity(rows.valid_count());
        for e in 0..entries {
            if absolute {
                for c in (0..components).step_by(3) {
                    let (Some(x), Some(y), Some(z)) =
                        (rows.get(&[c, e]), rows.get(&[c + 1, e]), rows.get(&[c + 2, e]))
                    else {
                        continue;
                    };
                    out.push(axes.transform([scaled(&axes.cx, x), scaled(&axes.cy, y), scaled(&axes.cz, z)]));
                }
            } else {
                let x = (e % size_x) as f64 * axes.cx.increment.unwrap_or(1.0);
                let y = (e / size_x) as f64 * axes.cy.increment.unwrap_or(1.0);
                for c in 0..components {
                    if let Some(z) = rows.get(&[c, e]) {
                        out.push(axes.transform([x, y, scaled(&axes.cz, z)]));
                    }
                }
            }
        }
        out
    }
}

/// Integer samples are counts of the axis increment.
#[inline]
fn scaled(axis: &Axis, v: f64) -> f64 {
    match axis.data_type() {
        Some(DataType::Int16 | DataType::Int32) => v * axis.increment.unwrap_or(1.0),
        _ => v,
    }
}
