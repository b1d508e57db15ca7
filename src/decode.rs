//! Decoder: container bytes → [`Document`] plus warnings.
//!
//! Structural problems (missing records, unsupported layouts) are fatal and
//! surface as a specific [`DecodeError`].  Everything the format's producers
//! commonly get wrong (checksums, dates, enum spellings) is recorded as a
//! [`Warning`] and decoding carries on, unless [`Strictness::Strict`] is
//! requested.

use std::io;

use ndarray::{ArrayD, IxDyn};
use thiserror::Error;

use crate::axes::{parse_rotation_tag, Axes, Axis, AxisName, AxisType, DataType, IDENTITY};
use crate::checksum::{parse_checksum_line, verify};
use crate::container::{ContainerError, ContainerReader};
use crate::document::Document;
use crate::record::{
    ArrayStorage, DataLink, Dimension, MatrixDimension, Record1, Record2, Record3, Record4,
    is_supported_revision, CHECKSUM_FILE, MAIN_XML,
};
use crate::surface::{
    binary_layout, text_components, unpack_bits, ArrayValues, Element as Sample, LayoutError,
    SurfaceArray,
};
use crate::validate::{parse_f64, Strictness, Warning};
use crate::xml::{self, Element, XmlError};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
    #[error("main.xml: {0}")]
    Xml(#[from] XmlError),
    #[error("Malformed document: {0}")]
    MalformedDocument(String),
    #[error("Unsupported axis combination: X is {x:?}, Y is {y:?}")]
    UnsupportedAxisCombination { x: AxisType, y: AxisType },
    #[error("Axes declare different data types: {0:?}")]
    AmbiguousDataType(Vec<DataType>),
    #[error("Point data does not match its declaration: {0}")]
    Layout(LayoutError),
    #[error("Rejected in strict mode: {0}")]
    Strict(Warning),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<LayoutError> for DecodeError {
    fn from(e: LayoutError) -> Self {
        match e {
            LayoutError::UnsupportedAxisCombination { x, y } => {
                DecodeError::UnsupportedAxisCombination { x, y }
            }
            other => DecodeError::Layout(other),
        }
    }
}

/// Slots a data list may be padded to when its rows are narrower than
/// Record3 declares.
const MAX_PADDED_SLOTS: usize = 1 << 24;

fn malformed(what: impl Into<String>) -> DecodeError {
    DecodeError::MalformedDocument(what.into())
}

// ── DecodeOptions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Lenient by default: the format is externally produced.
    pub strictness: Strictness,
}

// ── Decoder ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Decoder {
    pub options: DecodeOptions,
}

/// Decode with default options.
pub fn decode(bytes: &[u8]) -> Result<(Document, Vec<Warning>), DecodeError> {
    Decoder::default().decode(bytes)
}

impl Decoder {
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<(Document, Vec<Warning>), DecodeError> {
        let mut run = Run { strictness: self.options.strictness, warnings: Vec::new() };
        let document = run.decode(bytes)?;
        Ok((document, run.warnings))
    }
}

/// State of one decode call.
struct Run {
    strictness: Strictness,
    warnings:   Vec<Warning>,
}

impl Run {
    fn warn(&mut self, w: Warning) -> Result<(), DecodeError> {
        tracing::warn!("{w}");
        if self.strictness.is_strict() {
            return Err(DecodeError::Strict(w));
        }
        self.warnings.push(w);
        Ok(())
    }

    fn check(&mut self, r: Result<(), Warning>) -> Result<(), DecodeError> {
        match r {
            Ok(())  => Ok(()),
            Err(w)  => self.warn(w),
        }
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<Document, DecodeError> {
        let mut zip = ContainerReader::new(bytes)?;
        let sum_file = zip.require(CHECKSUM_FILE)?;
        let main_xml = zip.require(MAIN_XML)?;

        let declared = parse_checksum_line(&String::from_utf8_lossy(&sum_file));
        self.check(verify(MAIN_XML, &declared, &main_xml))?;

        let root = xml::parse(&main_xml)?;
        if root.name != "ISO5436_2" {
            return Err(malformed(format!("root element is <{}>, expected <ISO5436_2>", root.name)));
        }

        let record1 = self.record1(root.child("Record1").ok_or_else(|| malformed("Record1 is missing"))?)?;
        let record2 = match root.child("Record2") {
            Some(el) => Some(self.record2(el)?),
            None     => None,
        };
        let r3 = root.child("Record3").ok_or_else(|| malformed("Record3 is missing"))?;
        let (record3, data) = self.record3(r3, &record1.axes, &mut zip)?;
        let record4 = parse_record4(root.child("Record4").ok_or_else(|| malformed("Record4 is missing"))?)?;
        let vendor_specific_id = root.child_text("VendorSpecificID").map(str::to_owned);

        tracing::debug!(
            shape = ?data.shape(),
            valid = data.valid_count(),
            warnings = self.warnings.len(),
            "decoded x3p document"
        );

        let mut doc = Document::new();
        doc.record1 = record1;
        doc.record2 = record2;
        doc.record3 = record3;
        doc.record4 = record4;
        doc.vendor_specific_id = vendor_specific_id;
        doc.attach_decoded(data);
        Ok(doc)
    }

    // ── Record1 ──────────────────────────────────────────────────────────────

    fn record1(&mut self, el: &Element) -> Result<Record1, DecodeError> {
        let mut r1 = Record1::default();

        let revision = el.child("Revision").ok_or_else(|| malformed("Record1.Revision is missing"))?;
        r1.revision = revision.text().unwrap_or_default().to_owned();
        if !is_supported_revision(&r1.revision) {
            self.warn(Warning::UnsupportedRevision(r1.revision.clone()))?;
        }

        let feature = el.child("FeatureType").ok_or_else(|| malformed("Record1.FeatureType is missing"))?;
        let code = feature.text().unwrap_or_default();
        self.check(r1.set_feature_type_code(code))?;

        let axes = el.child("Axes").ok_or_else(|| malformed("Record1.Axes is missing"))?;
        for name in [AxisName::X, AxisName::Y, AxisName::Z] {
            let ax = axes
                .child(name.tag())
                .ok_or_else(|| malformed(format!("Record1.Axes.{} is missing", name.tag())))?;
            self.axis(ax, r1.axes.axis_mut(name))?;
        }

        if let Some(rotation) = axes.child("Rotation") {
            self.rotation(rotation, &mut r1.axes)?;
        }
        Ok(r1)
    }

    fn axis(&mut self, el: &Element, axis: &mut Axis) -> Result<(), DecodeError> {
        let tag = axis.name().tag();
        let axis_type = el
            .child("AxisType")
            .ok_or_else(|| malformed(format!("{tag}.AxisType is missing")))?;
        self.check(axis.set_axis_type_code(axis_type.text().unwrap_or_default()))?;

        for child in &el.children {
            let text = child.text().unwrap_or_default();
            match child.name.as_str() {
                "DataType" => self.check(axis.set_data_type_code(text))?,
                "Increment" => match parse_f64(&format!("{tag}.Increment"), text) {
                    Ok(v)  => axis.increment = Some(v),
                    Err(w) => self.warn(w)?,
                },
                "Offset" => match parse_f64(&format!("{tag}.Offset"), text) {
                    Ok(v)  => axis.offset = Some(v),
                    Err(w) => self.warn(w)?,
                },
                _ => {}
            }
        }
        Ok(())
    }

    fn rotation(&mut self, el: &Element, axes: &mut Axes) -> Result<(), DecodeError> {
        // An empty block still marks the rotation as present.
        if el.children.is_empty() {
            self.check(axes.set_rotation_matrix(Some(IDENTITY)))?;
        }
        for entry in &el.children {
            let field = format!("Rotation.{}", entry.name);
            let Some((row, col)) = parse_rotation_tag(&entry.name) else {
                self.warn(Warning::invalid(&field, entry.name.clone(), "expected r{row}{col}"))?;
                continue;
            };
            match parse_f64(&field, entry.text().unwrap_or_default()) {
                Ok(v)  => self.check(axes.set_rotation(row, col, v))?,
                Err(w) => self.warn(w)?,
            }
        }
        Ok(())
    }

    // ── Record2 ──────────────────────────────────────────────────────────────

    fn record2(&mut self, el: &Element) -> Result<Record2, DecodeError> {
        let mut r2 = Record2::default();

        if let Some(date) = self.required_text(el, "Date")? {
            self.check(r2.set_date(&date))?;
        }
        if let Some(date) = self.required_text(el, "CalibrationDate")? {
            self.check(r2.set_calibration_date(&date))?;
        }
        r2.creator = el.find("Creator").map(|c| c.text().unwrap_or_default().to_owned());
        r2.comment = el.find("Comment").map(|c| c.text().unwrap_or_default().to_owned());

        r2.instrument.manufacturer = self.required_text(el, "Manufacturer")?;
        r2.instrument.model        = self.required_text(el, "Model")?;
        r2.instrument.serial       = self.required_text(el, "Serial")?;
        r2.instrument.version      = self.required_text(el, "Version")?;

        if let Some(t) = self.required_text(el, "Type")? {
            self.check(r2.probing_system.set_probing_type_code(&t))?;
        }
        r2.probing_system.identification = self.required_text(el, "Identification")?;
        Ok(r2)
    }

    /// Text of a descendant the schema requires.  Absence is only a warning:
    /// Record2 is metadata.
    fn required_text(&mut self, el: &Element, name: &str) -> Result<Option<String>, DecodeError> {
        match el.find(name) {
            Some(found) => Ok(Some(found.text().unwrap_or_default().to_owned())),
            None => {
                self.warn(Warning::MissingElement(format!("Record2.{name}")))?;
                Ok(None)
            }
        }
    }

    // ── Record3 ──────────────────────────────────────────────────────────────

    fn record3(
        &mut self,
        el:   &Element,
        axes: &Axes,
        zip:  &mut ContainerReader<'_>,
    ) -> Result<(Record3, SurfaceArray), DecodeError> {
        let dimension = parse_dimension(el)?;

        let (storage, data) = match (el.child("DataLink"), el.child("DataList")) {
            (Some(_), Some(_)) => return Err(malformed("Record3 holds both DataLink and DataList")),
            (None, None)       => return Err(malformed("Record3 holds neither DataLink nor DataList")),
            (Some(link), None) => {
                let (link, data) = self.data_link(link, axes, &dimension, zip)?;
                (ArrayStorage::Binary(link), data)
            }
            (None, Some(list)) => (ArrayStorage::Text, self.data_list(list, axes, &dimension)?),
        };
        Ok((Record3 { dimension, storage }, data))
    }

    fn data_link(
        &mut self,
        el:        &Element,
        axes:      &Axes,
        dimension: &Dimension,
        zip:       &mut ContainerReader<'_>,
    ) -> Result<(DataLink, SurfaceArray), DecodeError> {
        let point_data_link = el
            .child_text("PointDataLink")
            .ok_or_else(|| malformed("DataLink.PointDataLink is missing"))?
            .trim()
            .to_owned();
        let md5_point_data    = el.child_text("MD5ChecksumPointData").map(|s| s.trim().to_owned());
        let valid_points_link = el.child_text("ValidPointsLink").map(|s| s.trim().to_owned());
        let md5_valid_points  = el.child_text("MD5ChecksumValidPoints").map(|s| s.trim().to_owned());

        let payload = zip.require(&point_data_link)?;
        match &md5_point_data {
            Some(sum) => self.check(verify(&point_data_link, sum, &payload))?,
            None      => self.warn(Warning::MissingElement("DataLink.MD5ChecksumPointData".to_owned()))?,
        }

        let data_type = single_data_type(axes)?
            .ok_or_else(|| malformed("binary point data needs a DataType on at least one axis"))?;
        let layout = binary_layout(axes.xy_types(), dimension)?;
        let values = ArrayValues::from_le_bytes(data_type, &layout.shape, &payload)?;

        let data = match &valid_points_link {
            Some(path) => {
                let bits = zip.require(path)?;
                if let Some(sum) = &md5_valid_points {
                    self.check(verify(path, sum, &bits))?;
                }
                let width = if layout.component_axis { 3 } else { 1 };
                let points = unpack_bits(&bits, layout.elements() / width);
                let mut data = SurfaceArray::new(values);
                data.apply_point_validity(&points, layout.component_axis);
                data
            }
            None => SurfaceArray::new(values),
        };

        let link = DataLink { point_data_link, md5_point_data, valid_points_link, md5_valid_points };
        Ok((link, data))
    }

    fn data_list(&mut self, el: &Element, axes: &Axes, dimension: &Dimension) -> Result<SurfaceArray, DecodeError> {
        let expected = text_components(axes.xy_types(), dimension);

        let rows: Vec<Option<Vec<&str>>> = el
            .children_named("Datum")
            .map(|d| d.text().map(split_components))
            .collect();

        let found = rows.iter().flatten().map(Vec::len).max().unwrap_or(0);
        if found > expected {
            self.warn(Warning::ComponentWidening { declared: expected, found })?;
        }
        let width = expected.max(found).max(1);

        // Padding short rows out to the declared width must not allocate
        // beyond what the rows themselves could fill.
        let observed = found.saturating_mul(rows.len());
        width
            .checked_mul(rows.len())
            .filter(|&slots| slots <= observed.max(MAX_PADDED_SLOTS))
            .ok_or_else(|| {
                malformed(format!(
                    "DataList entries carry at most {found} component(s) but {expected} are declared per entry"
                ))
            })?;

        let declared_entries = dimension.entries();
        if rows.len() != declared_entries {
            self.warn(Warning::EntryCount { declared: declared_entries, found: rows.len() })?;
        }

        let data_type = single_data_type(axes)?.unwrap_or(DataType::Float64);
        let (data, bad) = match data_type {
            DataType::Int16   => collect_rows::<i16>(&rows, width),
            DataType::Int32   => collect_rows::<i32>(&rows, width),
            DataType::Float32 => collect_rows::<f32>(&rows, width),
            DataType::Float64 => collect_rows::<f64>(&rows, width),
        }?;
        if let Some((first, count)) = bad {
            self.warn(Warning::invalid(
                "DataList.Datum",
                first,
                format!("{count} component(s) are not {data_type:?} numbers and were masked"),
            ))?;
        }
        Ok(data)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn parse_record4(el: &Element) -> Result<Record4, DecodeError> {
    let file = el
        .child("ChecksumFile")
        .ok_or_else(|| malformed("Record4.ChecksumFile is missing"))?;
    Ok(Record4 { checksum_file: file.text().unwrap_or_default().to_owned() })
}

fn parse_dimension(el: &Element) -> Result<Dimension, DecodeError> {
    let size = |parent: &Element, name: &str| -> Result<usize, DecodeError> {
        let text = parent
            .child_text(name)
            .ok_or_else(|| malformed(format!("{}.{name} is missing", parent.name)))?;
        text.trim()
            .parse::<usize>()
            .map_err(|e| malformed(format!("{}.{name} = {text:?}: {e}", parent.name)))
    };

    let dimension = if let Some(m) = el.child("MatrixDimension") {
        Dimension::Matrix(MatrixDimension::new(
            size(m, "SizeX")?,
            size(m, "SizeY")?,
            size(m, "SizeZ")?,
        ))
    } else if let Some(l) = el.child("ListDimension") {
        let text = l.text().ok_or_else(|| malformed("Record3.ListDimension is empty"))?;
        let n = text
            .trim()
            .parse::<usize>()
            .map_err(|e| malformed(format!("Record3.ListDimension = {text:?}: {e}")))?;
        Dimension::List(n)
    } else {
        return Err(malformed("Record3 has neither MatrixDimension nor ListDimension"));
    };

    if dimension.payload_bound().is_none() {
        return Err(malformed(format!("Record3 dimension {dimension:?} is too large to address")));
    }
    Ok(dimension)
}

/// The one data type shared by every axis that declares one.
fn single_data_type(axes: &Axes) -> Result<Option<DataType>, DecodeError> {
    let declared = axes.declared_data_types();
    match declared.as_slice() {
        []   => Ok(None),
        [dt] => Ok(Some(*dt)),
        _    => Err(DecodeError::AmbiguousDataType(declared)),
    }
}

fn split_components(text: &str) -> Vec<&str> {
    let text = text.trim();
    let text = text.strip_suffix(';').unwrap_or(text);
    text.split(';').map(str::trim).collect()
}

/// Rows of components → `(width, rows)` array.  Missing rows, missing
/// components, and empty or `NaN` tokens become masked slots for every data
/// type.  Also returns the first unparseable
/// token and how many there were.
#[allow(clippy::type_complexity)]
fn collect_rows<T: Sample>(
    rows:  &[Option<Vec<&str>>],
    width: usize,
) -> Result<(SurfaceArray, Option<(String, usize)>), DecodeError> {
    let n = rows.len();
    let slots = width
        .checked_mul(n)
        .ok_or_else(|| malformed(format!("data list of {n} entries × {width} components")))?;
    let mut values = vec![T::default(); slots];
    let mut mask = vec![false; slots];
    let mut first_bad: Option<String> = None;
    let mut bad = 0usize;

    for (e, row) in rows.iter().enumerate() {
        let Some(components) = row else { continue };
        for (c, token) in components.iter().enumerate() {
            let slot = c * n + e;
            if token.is_empty() || token.eq_ignore_ascii_case("nan") {
                continue;
            }
            match T::parse_component(token) {
                Some(v) if !v.is_missing() => {
                    values[slot] = v;
                    mask[slot] = true;
                }
                Some(_) => {}
                None => {
                    bad += 1;
                    first_bad.get_or_insert_with(|| (*token).to_owned());
                }
            }
        }
    }

    let shape = IxDyn(&[width, n]);
    let values = ArrayD::from_shape_vec(shape.clone(), values)
        .map_err(|e| malformed(format!("data list shape: {e}")))?;
    let mask = ArrayD::from_shape_vec(shape, mask)
        .map_err(|e| malformed(format!("data list shape: {e}")))?;
    let data = SurfaceArray::with_mask(T::wrap(values), mask)?;
    Ok((data, first_bad.map(|f| (f, bad))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_split_and_trim() {
        assert_eq!(split_components("1;2 ; 3;"), vec!["1", "2", "3"]);
        assert_eq!(split_components("4.5"), vec!["4.5"]);
    }

    #[test]
    fn rows_are_transposed_and_masked() {
        let rows = vec![
            Some(vec!["1", "2"]),
            None,
            Some(vec!["5", "NaN"]),
        ];
        let (data, bad) = collect_rows::<f64>(&rows, 2).unwrap();
        assert!(bad.is_none());
        assert_eq!(data.shape(), &[2, 3]);
        assert_eq!(data.get(&[0, 0]), Some(1.0));
        assert_eq!(data.get(&[1, 0]), Some(2.0));
        assert_eq!(data.get(&[0, 1]), None);
        assert_eq!(data.get(&[1, 1]), None);
        assert_eq!(data.get(&[0, 2]), Some(5.0));
        assert_eq!(data.get(&[1, 2]), None);
    }

    #[test]
    fn nan_and_empty_tokens_mask_integers() {
        let rows = vec![Some(vec!["7", "NaN"]), Some(vec!["", "-3"]), Some(vec!["nan", "0"])];
        let (data, bad) = collect_rows::<i16>(&rows, 2).unwrap();
        assert!(bad.is_none());
        assert_eq!(data.valid_count(), 3);
        assert_eq!(data.get(&[0, 0]), Some(7.0));
        assert_eq!(data.get(&[1, 0]), None);
        assert_eq!(data.get(&[0, 1]), None);
        assert_eq!(data.get(&[1, 2]), Some(0.0));
    }

    #[test]
    fn oversized_dimension_is_malformed() {
        let xml = "<Record3><MatrixDimension><SizeX>8589934592</SizeX><SizeY>8589934592</SizeY>\
                   <SizeZ>1</SizeZ></MatrixDimension></Record3>";
        let el = xml::parse(xml.as_bytes()).unwrap();
        assert!(matches!(parse_dimension(&el), Err(DecodeError::MalformedDocument(_))));
    }

    #[test]
    fn unparseable_integers_are_counted() {
        let rows = vec![Some(vec!["7", "x"]), Some(vec!["y"])];
        let (data, bad) = collect_rows::<i32>(&rows, 2).unwrap();
        assert_eq!(bad, Some(("x".to_owned(), 2)));
        assert_eq!(data.valid_count(), 1);
    }
}
