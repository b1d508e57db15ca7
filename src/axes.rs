//! Axis descriptors and the optional rotation of Record1.
//!
//! The full transformation from a stored coordinate `P` to its final
//! position `Q` is `Q = R·P + T`, with `R` the 3×3 rotation and `T` the
//! vector of axis offsets.  Without a rotation block `R` is the identity.

use serde::{Deserialize, Serialize};

use crate::validate::{check_unit_range, Warning};

// ── Enumerations ─────────────────────────────────────────────────────────────

/// How coordinates along an axis are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisType {
    /// `offset + index * increment`; nothing stored per sample.
    Incremental,
    /// Stored explicitly per sample.
    Absolute,
}

impl AxisType {
    pub fn code(self) -> &'static str {
        match self {
            AxisType::Incremental => "I",
            AxisType::Absolute    => "A",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim() {
            "I" => Some(AxisType::Incremental),
            "A" => Some(AxisType::Absolute),
            _   => None,
        }
    }
}

/// Element type of the point data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int16,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    pub fn code(self) -> &'static str {
        match self {
            DataType::Int16   => "I",
            DataType::Int32   => "L",
            DataType::Float32 => "F",
            DataType::Float64 => "D",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim() {
            "I" => Some(DataType::Int16),
            "L" => Some(DataType::Int32),
            "F" => Some(DataType::Float32),
            "D" => Some(DataType::Float64),
            _   => None,
        }
    }

    /// Width of one element in the binary payload.
    #[inline]
    pub fn byte_width(self) -> usize {
        match self {
            DataType::Int16   => 2,
            DataType::Int32   => 4,
            DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }
}

/// Which of the three coordinate axes a descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisName {
    X,
    Y,
    Z,
}

impl AxisName {
    /// Element name used in `main.xml`.
    pub fn tag(self) -> &'static str {
        match self {
            AxisName::X => "CX",
            AxisName::Y => "CY",
            AxisName::Z => "CZ",
        }
    }
}

// ── Axis ─────────────────────────────────────────────────────────────────────

/// One of CX, CY, CZ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    name:          AxisName,
    axis_type:     Option<AxisType>,
    data_type:     Option<DataType>,
    /// Metres per integer step.
    pub increment: Option<f64>,
    /// Metres.
    pub offset:    Option<f64>,
}

impl Axis {
    pub fn new(name: AxisName) -> Self {
        let axis_type = match name {
            AxisName::Z => Some(AxisType::Absolute),
            _           => None,
        };
        Self { name, axis_type, data_type: None, increment: None, offset: None }
    }

    pub fn name(&self) -> AxisName { self.name }
    pub fn axis_type(&self) -> Option<AxisType> { self.axis_type }
    pub fn data_type(&self) -> Option<DataType> { self.data_type }

    /// Set the axis type.  The Z axis is always absolute, whatever is asked.
    pub fn set_axis_type(&mut self, axis_type: AxisType) {
        self.axis_type = Some(match self.name {
            AxisName::Z => AxisType::Absolute,
            _           => axis_type,
        });
    }

    /// Set the axis type from its format code (`I` or `A`).
    pub fn set_axis_type_code(&mut self, code: &str) -> Result<(), Warning> {
        let t = AxisType::from_code(code).ok_or_else(|| {
            Warning::invalid(self.field("AxisType").as_str(), code, "expected I or A")
        })?;
        self.set_axis_type(t);
        Ok(())
    }

    pub fn set_data_type(&mut self, data_type: Option<DataType>) {
        self.data_type = data_type;
    }

    /// Set the data type from its format code (`I`, `L`, `F` or `D`).
    /// An unknown code leaves the field unset.
    pub fn set_data_type_code(&mut self, code: &str) -> Result<(), Warning> {
        match DataType::from_code(code) {
            Some(dt) => {
                self.data_type = Some(dt);
                Ok(())
            }
            None => {
                self.data_type = None;
                Err(Warning::invalid(self.field("DataType").as_str(), code, "expected I, L, F or D"))
            }
        }
    }

    /// Real coordinate of the `index`-th grid step.
    #[inline]
    pub fn coordinate(&self, index: usize) -> f64 {
        self.offset.unwrap_or(0.0) + index as f64 * self.increment.unwrap_or(1.0)
    }

    pub fn is_incremental(&self) -> bool {
        self.axis_type == Some(AxisType::Incremental)
    }

    fn field(&self, leaf: &str) -> String {
        format!("{}.{}", self.name.tag(), leaf)
    }
}

// ── Axes ─────────────────────────────────────────────────────────────────────

pub type Matrix3 = [[f64; 3]; 3];

pub const IDENTITY: Matrix3 = [
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axes {
    pub cx:   Axis,
    pub cy:   Axis,
    pub cz:   Axis,
    /// `None` means no rotation block: the identity is implied and nothing
    /// is written.
    rotation: Option<Matrix3>,
}

impl Default for Axes {
    fn default() -> Self {
        Self {
            cx:       Axis::new(AxisName::X),
            cy:       Axis::new(AxisName::Y),
            cz:       Axis::new(AxisName::Z),
            rotation: None,
        }
    }
}

impl Axes {
    pub fn axis(&self, name: AxisName) -> &Axis {
        match name {
            AxisName::X => &self.cx,
            AxisName::Y => &self.cy,
            AxisName::Z => &self.cz,
        }
    }

    pub fn axis_mut(&mut self, name: AxisName) -> &mut Axis {
        match name {
            AxisName::X => &mut self.cx,
            AxisName::Y => &mut self.cy,
            AxisName::Z => &mut self.cz,
        }
    }

    pub fn rotation(&self) -> Option<&Matrix3> {
        self.rotation.as_ref()
    }

    /// Set one rotation entry, 1-based like the `r{row}{col}` tags.
    /// The first entry set starts from the identity.
    pub fn set_rotation(&mut self, row: usize, col: usize, value: f64) -> Result<(), Warning> {
        let field = format!("Rotation.r{row}{col}");
        if !(1..=3).contains(&row) || !(1..=3).contains(&col) {
            return Err(Warning::invalid(&field, value.to_string(), "index out of 1..=3"));
        }
        check_unit_range(&field, value)?;
        self.rotation.get_or_insert(IDENTITY)[row - 1][col - 1] = value;
        Ok(())
    }

    /// Replace the whole rotation matrix, or drop it with `None`.
    pub fn set_rotation_matrix(&mut self, m: Option<Matrix3>) -> Result<(), Warning> {
        if let Some(m) = &m {
            for (r, row) in m.iter().enumerate() {
                for (c, v) in row.iter().enumerate() {
                    check_unit_range(&format!("Rotation.r{}{}", r + 1, c + 1), *v)?;
                }
            }
        }
        self.rotation = m;
        Ok(())
    }

    pub fn clear_rotation(&mut self) {
        self.rotation = None;
    }

    /// Translation vector taken from the axis offsets.
    pub fn translation(&self) -> [f64; 3] {
        [
            self.cx.offset.unwrap_or(0.0),
            self.cy.offset.unwrap_or(0.0),
            self.cz.offset.unwrap_or(0.0),
        ]
    }

    /// `Q = R·P + T`.
    pub fn transform(&self, p: [f64; 3]) -> [f64; 3] {
        let r = self.rotation.unwrap_or(IDENTITY);
        let t = self.translation();
        let mut q = [0.0; 3];
        for i in 0..3 {
            q[i] = r[i][0] * p[0] + r[i][1] * p[1] + r[i][2] * p[2] + t[i];
        }
        q
    }

    /// Distinct data types declared across the three axes, unset ones skipped.
    pub fn declared_data_types(&self) -> Vec<DataType> {
        let mut out: Vec<DataType> = Vec::with_capacity(3);
        for dt in [self.cx.data_type, self.cy.data_type, self.cz.data_type].into_iter().flatten() {
            if !out.contains(&dt) {
                out.push(dt);
            }
        }
        out
    }

    /// X and Y axis types, if both are set.
    pub fn xy_types(&self) -> Option<(AxisType, AxisType)> {
        Some((self.cx.axis_type?, self.cy.axis_type?))
    }
}

/// Split an `r{row}{col}` tag into 1-based indices.
pub fn parse_rotation_tag(tag: &str) -> Option<(usize, usize)> {
    let digits = tag.strip_prefix('r').or_else(|| tag.strip_prefix('R'))?;
    let mut chars = digits.chars();
    let row = chars.next()?.to_digit(10)? as usize;
    let col = chars.next()?.to_digit(10)? as usize;
    if chars.next().is_some() {
        return None;
    }
    Some((row, col))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_axis_is_forced_absolute() {
        let mut axes = Axes::default();
        assert_eq!(axes.cz.axis_type(), Some(AxisType::Absolute));
        axes.cz.set_axis_type_code("I").unwrap();
        assert_eq!(axes.cz.axis_type(), Some(AxisType::Absolute));
        axes.cx.set_axis_type_code("I").unwrap();
        assert_eq!(axes.cx.axis_type(), Some(AxisType::Incremental));
    }

    #[test]
    fn bad_codes_are_reported_not_stored() {
        let mut axes = Axes::default();
        assert!(axes.cx.set_axis_type_code("Q").is_err());
        assert_eq!(axes.cx.axis_type(), None);
        assert!(axes.cz.set_data_type_code("X").is_err());
        assert_eq!(axes.cz.data_type(), None);
    }

    #[test]
    fn rotation_starts_unset_and_from_identity() {
        let mut axes = Axes::default();
        assert!(axes.rotation().is_none());
        axes.set_rotation(1, 2, 0.5).unwrap();
        let r = axes.rotation().unwrap();
        assert_eq!(r[0][1], 0.5);
        assert_eq!(r[0][0], 1.0);
        assert!(axes.set_rotation(4, 1, 0.0).is_err());
        assert!(axes.set_rotation(1, 1, 2.0).is_err());
        assert_eq!(axes.rotation().unwrap()[0][0], 1.0);
    }

    #[test]
    fn transform_applies_rotation_then_offset() {
        let mut axes = Axes::default();
        axes.cx.offset = Some(10.0);
        axes.set_rotation_matrix(Some([
            [0.0, -1.0, 0.0],
            [1.0,  0.0, 0.0],
            [0.0,  0.0, 1.0],
        ])).unwrap();
        assert_eq!(axes.transform([1.0, 2.0, 3.0]), [8.0, 1.0, 3.0]);
    }

    #[test]
    fn rotation_tags() {
        assert_eq!(parse_rotation_tag("r23"), Some((2, 3)));
        assert_eq!(parse_rotation_tag("r2"), None);
        assert_eq!(parse_rotation_tag("x11"), None);
    }
}
