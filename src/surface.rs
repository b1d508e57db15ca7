//! The decoded point data: a typed n-dimensional array plus a validity mask.
//!
//! # Shapes
//!
//! | Storage | XY axes | Dimension | Shape |
//! |---------|---------|-----------|-------|
//! | binary  | I, I    | SizeZ = 1 | `(SizeX, SizeY)` |
//! | binary  | I, I    | SizeZ > 1 | `(SizeZ, SizeX, SizeY)` |
//! | binary  | A, A    | SizeZ = 1 | `(SizeX, SizeY, 3)` |
//! | binary  | A, A    | SizeZ > 1 | `(SizeZ, SizeX, SizeY, 3)` |
//! | binary  | A, A    | list of N | `(N, 3)` |
//! | text    | any     | any       | `(components, entries)` |
//!
//! Mixed I/A on X and Y is rejected.  Binary payloads are little-endian,
//! row-major in the shape above.
//!
//! # Masking
//!
//! `mask[i] == true` means the sample is valid.  Masked samples carry no
//! meaningful value: they are zero-filled on write and ignored by equality.

use std::fmt;
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};
use ndarray::{ArrayD, Dimension as _, IxDyn};
use thiserror::Error;

use crate::axes::{AxisType, DataType};
use crate::record::{Dimension, MatrixDimension, StorageMode};

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("Unsupported axis combination: X is {x:?}, Y is {y:?}")]
    UnsupportedAxisCombination { x: AxisType, y: AxisType },
    #[error("X and Y axis types must be set")]
    MissingAxisType,
    #[error("Payload holds {found} bytes, shape {shape:?} of {data_type:?} needs {expected}")]
    PayloadSize { shape: Vec<usize>, data_type: DataType, expected: usize, found: usize },
    #[error("Shape {found:?} does not fit the axes ({expected})")]
    Shape { expected: String, found: Vec<usize> },
    #[error("Mask shape {mask:?} differs from value shape {values:?}")]
    MaskShape { values: Vec<usize>, mask: Vec<usize> },
}

// ── Element trait ────────────────────────────────────────────────────────────

/// A fixed-width numeric element of the point data.
pub trait Element: Copy + Default + PartialEq + fmt::Display + FromStr + 'static {
    const DATA_TYPE: DataType;

    /// True for values that encode "no measurement" on their own (NaN).
    fn is_missing(&self) -> bool { false }

    /// Parse a text component; `NaN` is accepted for floats only.
    fn parse_component(s: &str) -> Option<Self> {
        s.trim().parse().ok()
    }

    fn read_le(src: &[u8], dst: &mut [Self]);
    fn write_le(src: &[Self], dst: &mut [u8]);
    fn wrap(a: ArrayD<Self>) -> ArrayValues;
}

macro_rules! impl_element {
    ($t:ty, $dt:expr, $variant:ident, $read:ident, $write:ident, float = $float:expr) => {
        impl Element for $t {
            const DATA_TYPE: DataType = $dt;

            #[inline]
            #[allow(clippy::eq_op)]
            fn is_missing(&self) -> bool {
                $float && self != self
            }

            fn read_le(src: &[u8], dst: &mut [Self]) { LittleEndian::$read(src, dst) }
            fn write_le(src: &[Self], dst: &mut [u8]) { LittleEndian::$write(src, dst) }
            fn wrap(a: ArrayD<Self>) -> ArrayValues { ArrayValues::$variant(a) }
        }
    };
}

impl_element!(i16, DataType::Int16,   Int16,   read_i16_into, write_i16_into, float = false);
impl_element!(i32, DataType::Int32,   Int32,   read_i32_into, write_i32_into, float = false);
impl_element!(f32, DataType::Float32, Float32, read_f32_into, write_f32_into, float = true);
impl_element!(f64, DataType::Float64, Float64, read_f64_into, write_f64_into, float = true);

// ── ArrayValues ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValues {
    Int16(ArrayD<i16>),
    Int32(ArrayD<i32>),
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
}

/// Run `$body` with `$a` bound to the typed array inside `$values`.
macro_rules! with_values {
    ($values:expr, $a:ident => $body:expr) => {
        match $values {
            ArrayValues::Int16($a)   => $body,
            ArrayValues::Int32($a)   => $body,
            ArrayValues::Float32($a) => $body,
            ArrayValues::Float64($a) => $body,
        }
    };
}

impl ArrayValues {
    pub fn data_type(&self) -> DataType {
        match self {
            ArrayValues::Int16(_)   => DataType::Int16,
            ArrayValues::Int32(_)   => DataType::Int32,
            ArrayValues::Float32(_) => DataType::Float32,
            ArrayValues::Float64(_) => DataType::Float64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_values!(self, a => a.shape())
    }

    pub fn len(&self) -> usize {
        with_values!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `index` widened to `f64`.
    pub fn get_f64(&self, index: &[usize]) -> Option<f64> {
        let ix = IxDyn(index);
        match self {
            ArrayValues::Int16(a)   => a.get(ix).map(|v| f64::from(*v)),
            ArrayValues::Int32(a)   => a.get(ix).map(|v| f64::from(*v)),
            ArrayValues::Float32(a) => a.get(ix).map(|v| f64::from(*v)),
            ArrayValues::Float64(a) => a.get(ix).copied(),
        }
    }

    /// Text form of the value at `index`, shortest round-trip representation.
    pub fn format_at(&self, index: &[usize]) -> Option<String> {
        with_values!(self, a => a.get(IxDyn(index)).map(|v| v.to_string()))
    }

    /// Decode a little-endian payload into `shape`.
    pub fn from_le_bytes(data_type: DataType, shape: &[usize], bytes: &[u8]) -> Result<Self, LayoutError> {
        match data_type {
            DataType::Int16   => read_typed::<i16>(shape, bytes),
            DataType::Int32   => read_typed::<i32>(shape, bytes),
            DataType::Float32 => read_typed::<f32>(shape, bytes),
            DataType::Float64 => read_typed::<f64>(shape, bytes),
        }
    }
}

fn read_typed<T: Element>(shape: &[usize], bytes: &[u8]) -> Result<ArrayValues, LayoutError> {
    let width = T::DATA_TYPE.byte_width();
    let expected = shape
        .iter()
        .try_fold(width, |acc, &n| acc.checked_mul(n))
        .unwrap_or(usize::MAX);
    if bytes.len() != expected {
        return Err(LayoutError::PayloadSize {
            shape: shape.to_vec(),
            data_type: T::DATA_TYPE,
            expected,
            found: bytes.len(),
        });
    }
    let count = expected / width;
    let mut out = vec![T::default(); count];
    T::read_le(bytes, &mut out);
    let a = ArrayD::from_shape_vec(IxDyn(shape), out).map_err(|_| LayoutError::Shape {
        expected: format!("{count} elements"),
        found:    shape.to_vec(),
    })?;
    Ok(T::wrap(a))
}

fn write_typed<T: Element>(a: &ArrayD<T>, mask: &ArrayD<bool>) -> Vec<u8> {
    let src: Vec<T> = a
        .iter()
        .zip(mask.iter())
        .map(|(v, ok)| if *ok { *v } else { T::default() })
        .collect();
    let mut out = vec![0u8; src.len() * T::DATA_TYPE.byte_width()];
    T::write_le(&src, &mut out);
    out
}

// ── SurfaceArray ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SurfaceArray {
    values: ArrayValues,
    mask:   ArrayD<bool>,
}

impl SurfaceArray {
    /// Wrap `values` with every sample valid.
    pub fn new(values: ArrayValues) -> Self {
        let mask = ArrayD::from_elem(IxDyn(values.shape()), true);
        Self { values, mask }
    }

    pub fn from_array<T: Element>(a: ArrayD<T>) -> Self {
        Self::new(T::wrap(a))
    }

    pub fn with_mask(values: ArrayValues, mask: ArrayD<bool>) -> Result<Self, LayoutError> {
        if values.shape() != mask.shape() {
            return Err(LayoutError::MaskShape {
                values: values.shape().to_vec(),
                mask:   mask.shape().to_vec(),
            });
        }
        Ok(Self { values, mask })
    }

    pub fn values(&self) -> &ArrayValues { &self.values }
    pub fn mask(&self) -> &ArrayD<bool> { &self.mask }
    pub fn mask_mut(&mut self) -> &mut ArrayD<bool> { &mut self.mask }
    pub fn shape(&self) -> &[usize] { self.values.shape() }
    pub fn data_type(&self) -> DataType { self.values.data_type() }

    pub fn is_valid(&self, index: &[usize]) -> bool {
        self.mask.get(IxDyn(index)).copied().unwrap_or(false)
    }

    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|v| **v).count()
    }

    /// Value at `index`, or `None` when masked or out of bounds.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        if self.is_valid(index) { self.values.get_f64(index) } else { None }
    }

    /// Widened copy with NaN in masked slots, for plotting and analysis.
    pub fn to_f64_nan(&self) -> ArrayD<f64> {
        let mut out = ArrayD::from_elem(IxDyn(self.shape()), f64::NAN);
        for (ix, ok) in self.mask.indexed_iter() {
            if *ok {
                if let Some(v) = self.values.get_f64(ix.slice()) {
                    out[ix.slice()] = v;
                }
            }
        }
        out
    }

    /// Row-major little-endian payload, masked slots zero-filled.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        with_values!(&self.values, a => write_typed(a, &self.mask))
    }

    /// Per-point validity: a point is valid only if all of its components
    /// are.  With `component_axis` the trailing axis holds the components.
    pub fn point_validity(&self, component_axis: bool) -> Vec<bool> {
        let flat: Vec<bool> = self.mask.iter().copied().collect();
        let width = if component_axis { self.shape().last().copied().unwrap_or(1).max(1) } else { 1 };
        flat.chunks(width).map(|c| c.iter().all(|v| *v)).collect()
    }

    /// Spread per-point validity back over the components.
    pub fn apply_point_validity(&mut self, points: &[bool], component_axis: bool) {
        let width = if component_axis { self.shape().last().copied().unwrap_or(1).max(1) } else { 1 };
        for (i, m) in self.mask.iter_mut().enumerate() {
            *m = points.get(i / width).copied().unwrap_or(false);
        }
    }
}

impl PartialEq for SurfaceArray {
    fn eq(&self, other: &Self) -> bool {
        if self.data_type() != other.data_type()
            || self.shape() != other.shape()
            || self.mask != other.mask
        {
            return false;
        }
        self.mask.indexed_iter().all(|(ix, ok)| {
            !*ok || same_sample(self.values.get_f64(ix.slice()), other.values.get_f64(ix.slice()))
        })
    }
}

/// NaN is a legitimate valid sample, so it equals itself here.
fn same_sample(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x == y || (x.is_nan() && y.is_nan()),
        (x, y) => x == y,
    }
}

// ── Valid-points bitmap ──────────────────────────────────────────────────────

/// Pack one bit per point, least significant bit first.
pub fn pack_bits(points: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; points.len().div_ceil(8)];
    for (i, ok) in points.iter().enumerate() {
        if *ok {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

/// Unpack `count` bits; points beyond the bitmap are invalid.
pub fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| bytes.get(i / 8).is_some_and(|b| b & (1 << (i % 8)) != 0))
        .collect()
}

// ── Layout rules ─────────────────────────────────────────────────────────────

/// The array shape for a binary payload, and whether its trailing axis
/// holds (x, y, z) components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryLayout {
    pub shape:          Vec<usize>,
    pub component_axis: bool,
}

impl BinaryLayout {
    pub fn elements(&self) -> usize {
        self.shape.iter().fold(1usize, |acc, &n| acc.saturating_mul(n))
    }

    /// Axis permutation taking this layout to entry order (X fastest), and
    /// how many leading permuted axes form the per-entry components.
    fn text_permutation(&self) -> Option<(Vec<usize>, usize)> {
        match (self.shape.len(), self.component_axis) {
            (2, false) => Some((vec![1, 0], 0)),
            (3, false) => Some((vec![0, 2, 1], 1)),
            (2, true)  => Some((vec![1, 0], 1)),
            (3, true)  => Some((vec![2, 1, 0], 1)),
            (4, true)  => Some((vec![0, 3, 2, 1], 2)),
            _          => None,
        }
    }

    /// `(components, entries)` of the equivalent data list.
    pub fn text_shape(&self) -> Vec<usize> {
        let Some((perm, split)) = self.text_permutation() else {
            return vec![1, self.elements()];
        };
        let permuted: Vec<usize> = perm.iter().map(|&i| self.shape[i]).collect();
        let product = |dims: &[usize]| dims.iter().fold(1usize, |acc, &n| acc.saturating_mul(n));
        vec![product(&permuted[..split]), product(&permuted[split..])]
    }
}

fn relayout<T: Clone>(a: &ArrayD<T>, perm: &[usize], shape: &[usize]) -> Result<ArrayD<T>, LayoutError> {
    a.view()
        .permuted_axes(IxDyn(perm))
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order(IxDyn(shape))
        .map_err(|_| LayoutError::Shape {
            expected: format!("{} elements", shape.iter().product::<usize>()),
            found:    a.shape().to_vec(),
        })
}

fn unlayout<T: Clone>(a: &ArrayD<T>, perm: &[usize], permuted: &[usize]) -> Result<ArrayD<T>, LayoutError> {
    let mut inverse = vec![0; perm.len()];
    for (i, &p) in perm.iter().enumerate() {
        inverse[p] = i;
    }
    let staged = a
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order(IxDyn(permuted))
        .map_err(|_| LayoutError::Shape {
            expected: format!("{permuted:?}"),
            found:    a.shape().to_vec(),
        })?;
    Ok(staged.permuted_axes(IxDyn(&inverse)).as_standard_layout().into_owned())
}

impl SurfaceArray {
    /// Rearrange a binary-layout array into `(components, entries)` rows.
    pub fn to_text_layout(&self, layout: &BinaryLayout) -> Result<SurfaceArray, LayoutError> {
        self.check_layout(&layout.shape)?;
        let (perm, _) = layout.text_permutation().ok_or_else(|| self.shape_error(layout))?;
        let shape = layout.text_shape();
        let values = with_values!(&self.values, a => Element::wrap(relayout(a, &perm, &shape)?));
        let mask = relayout(&self.mask, &perm, &shape)?;
        SurfaceArray::with_mask(values, mask)
    }

    /// Inverse of [`SurfaceArray::to_text_layout`].
    pub fn to_binary_layout(&self, layout: &BinaryLayout) -> Result<SurfaceArray, LayoutError> {
        self.check_layout(&layout.text_shape())?;
        let (perm, _) = layout.text_permutation().ok_or_else(|| self.shape_error(layout))?;
        let permuted: Vec<usize> = perm.iter().map(|&i| layout.shape[i]).collect();
        let values = with_values!(&self.values, a => Element::wrap(unlayout(a, &perm, &permuted)?));
        let mask = unlayout(&self.mask, &perm, &permuted)?;
        SurfaceArray::with_mask(values, mask)
    }

    fn check_layout(&self, expected: &[usize]) -> Result<(), LayoutError> {
        if self.shape() == expected {
            Ok(())
        } else {
            Err(LayoutError::Shape { expected: format!("{expected:?}"), found: self.shape().to_vec() })
        }
    }

    fn shape_error(&self, layout: &BinaryLayout) -> LayoutError {
        LayoutError::Shape { expected: format!("{:?}", layout.shape), found: self.shape().to_vec() }
    }
}

pub fn binary_layout(xy: Option<(AxisType, AxisType)>, dimension: &Dimension) -> Result<BinaryLayout, LayoutError> {
    let (x, y) = xy.ok_or(LayoutError::MissingAxisType)?;
    match (x, y, dimension) {
        (AxisType::Incremental, AxisType::Incremental, Dimension::Matrix(m)) => Ok(BinaryLayout {
            shape:          if m.size_z <= 1 { vec![m.size_x, m.size_y] } else { vec![m.size_z, m.size_x, m.size_y] },
            component_axis: false,
        }),
        (AxisType::Absolute, AxisType::Absolute, Dimension::Matrix(m)) => Ok(BinaryLayout {
            shape:          if m.size_z <= 1 { vec![m.size_x, m.size_y, 3] } else { vec![m.size_z, m.size_x, m.size_y, 3] },
            component_axis: true,
        }),
        (AxisType::Absolute, AxisType::Absolute, Dimension::List(n)) => Ok(BinaryLayout {
            shape:          vec![*n, 3],
            component_axis: true,
        }),
        (AxisType::Incremental, AxisType::Incremental, Dimension::List(_)) => Err(LayoutError::Shape {
            expected: "absolute X and Y for a point list".to_owned(),
            found:    vec![dimension.points()],
        }),
        _ => Err(LayoutError::UnsupportedAxisCombination { x, y }),
    }
}

/// Components per text entry expected for `dimension`.
pub fn text_components(xy: Option<(AxisType, AxisType)>, dimension: &Dimension) -> usize {
    let per_point = match xy {
        Some((AxisType::Absolute, AxisType::Absolute)) => 3,
        _ => 1,
    };
    match dimension {
        Dimension::Matrix(m) => m.size_z.max(1).saturating_mul(per_point),
        Dimension::List(_)   => per_point,
    }
}

/// Derive Record3's dimension from an array shape.  `current` is kept when
/// it already agrees with the shape.
pub fn dimension_for_shape(
    shape:   &[usize],
    mode:    StorageMode,
    xy:      Option<(AxisType, AxisType)>,
    current: &Dimension,
) -> Result<Dimension, LayoutError> {
    if mode == StorageMode::Binary {
        let (x, y) = xy.ok_or(LayoutError::MissingAxisType)?;
        let matrix = |sx, sy, sz| Dimension::Matrix(MatrixDimension::new(sx, sy, sz));
        let dim = match (x, y, shape) {
            (AxisType::Incremental, AxisType::Incremental, [sx, sy])      => matrix(*sx, *sy, 1),
            (AxisType::Incremental, AxisType::Incremental, [sz, sx, sy])  => matrix(*sx, *sy, *sz),
            (AxisType::Absolute, AxisType::Absolute, [n, 3])              => Dimension::List(*n),
            (AxisType::Absolute, AxisType::Absolute, [sx, sy, 3])         => matrix(*sx, *sy, 1),
            (AxisType::Absolute, AxisType::Absolute, [sz, sx, sy, 3])     => matrix(*sx, *sy, *sz),
            (AxisType::Incremental, AxisType::Absolute, _)
            | (AxisType::Absolute, AxisType::Incremental, _) => {
                return Err(LayoutError::UnsupportedAxisCombination { x, y })
            }
            _ => {
                return Err(LayoutError::Shape {
                    expected: format!("binary layout for {}{} axes", x.code(), y.code()),
                    found:    shape.to_vec(),
                })
            }
        };
        return Ok(dim);
    }

    let [components, entries] = shape else {
        return Err(LayoutError::Shape {
            expected: "(components, entries) for a data list".to_owned(),
            found:    shape.to_vec(),
        });
    };
    let per_point = text_components(xy, &Dimension::List(0));
    let size_z = (components / per_point).max(1);
    Ok(match current {
        Dimension::List(_) => Dimension::List(*entries),
        Dimension::Matrix(m) if m.size_x * m.size_y == *entries => {
            Dimension::Matrix(MatrixDimension::new(m.size_x, m.size_y, size_z))
        }
        Dimension::Matrix(_) => Dimension::Matrix(MatrixDimension::new(*entries, 1, size_z)),
    })
}
