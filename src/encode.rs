//! Encoder: [`Document`] → container bytes.
//!
//! The inverse of [`crate::decode`], with stricter checks.  By default the
//! encoder refuses documents that would produce a file other readers reject;
//! [`Strictness::Lenient`] logs those problems and writes anyway.
//!
//! Member order is fixed: `md5checksum.hex`, `main.xml`, then the binary
//! payload and valid-points bitmap when the data is stored as a DataLink.

use std::io;

use thiserror::Error;

use crate::axes::{AxisName, AxisType, Axes, DataType};
use crate::checksum::{checksum_line, md5_hex};
use crate::container::{Compression, ContainerError, ContainerWriter};
use crate::document::Document;
use crate::record::{
    ArrayStorage, DataLink, Dimension, Record1, Record2, Record4, StorageMode, CHECKSUM_FILE,
    DEFAULT_POINT_DATA_PATH, DEFAULT_VALID_POINTS_PATH, MAIN_XML, is_supported_revision,
};
use crate::surface::{binary_layout, pack_bits, text_components, LayoutError, SurfaceArray};
use crate::validate::{Strictness, Warning};
use crate::xml::{XmlError, XmlWriter};

pub const NAMESPACE: &str = "http://www.opengps.eu/2008/ISO5436_2";

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Document is incomplete: {0} is not set")]
    IncompleteDocument(String),
    #[error("Point data does not fit Record3: {0}")]
    ShapeMismatch(LayoutError),
    #[error("Unsupported axis combination: X is {x:?}, Y is {y:?}")]
    UnsupportedAxisCombination { x: AxisType, y: AxisType },
    #[error("Axes declare different data types: {0:?}")]
    AmbiguousDataType(Vec<DataType>),
    #[error("Axes declare {declared:?} but the point data is {found:?}")]
    DataTypeMismatch { declared: DataType, found: DataType },
    #[error("Refusing to write invalid document: {0}")]
    Invalid(Warning),
    #[error("main.xml: {0}")]
    Xml(#[from] XmlError),
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<LayoutError> for EncodeError {
    fn from(e: LayoutError) -> Self {
        match e {
            LayoutError::UnsupportedAxisCombination { x, y } => EncodeError::UnsupportedAxisCombination { x, y },
            other => EncodeError::ShapeMismatch(other),
        }
    }
}

// ── EncodeOptions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub strictness:        Strictness,
    /// Overrides the document's own DataLink/DataList choice.
    pub storage:           Option<StorageMode>,
    /// Member for binary point data.  `None` keeps the document's link, or
    /// `bindata/data.bin`.
    pub point_data_path:   Option<String>,
    pub valid_points_path: Option<String>,
    pub compression:       Compression,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            strictness:        Strictness::Strict,
            storage:           None,
            point_data_path:   None,
            valid_points_path: None,
            compression:       Compression::default(),
        }
    }
}

// ── Encoder ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Encoder {
    pub options: EncodeOptions,
}

/// Encode with default options.
pub fn encode(doc: &Document) -> Result<Vec<u8>, EncodeError> {
    Encoder::default().encode(doc)
}

/// Where the point data goes.
enum Payload {
    Binary {
        link:  DataLink,
        bytes: Vec<u8>,
        valid: Option<Vec<u8>>,
    },
    Text(SurfaceArray),
}

impl Encoder {
    pub fn new(options: EncodeOptions) -> Self {
        Self { options }
    }

    pub fn encode(&self, doc: &Document) -> Result<Vec<u8>, EncodeError> {
        let data = check_complete(doc)?;
        self.check_valid(doc)?;

        let axes = output_axes(&doc.record1.axes, data)?;
        let mode = self.options.storage.unwrap_or_else(|| doc.record3.storage.mode());
        let payload = self.payload(doc, &axes, data, mode)?;

        let main_xml = write_main_xml(doc, &axes, &payload)?;

        let mut zip = ContainerWriter::new(self.options.compression);
        zip.add(CHECKSUM_FILE, checksum_line(&main_xml, MAIN_XML).as_bytes())?;
        zip.add(MAIN_XML, &main_xml)?;
        if let Payload::Binary { link, bytes, valid } = &payload {
            zip.add(&link.point_data_link, bytes)?;
            if let (Some(path), Some(bits)) = (&link.valid_points_link, valid) {
                zip.add(path, bits)?;
            }
        }
        let out = zip.finish()?;

        tracing::debug!(
            main_xml = main_xml.len(),
            container = out.len(),
            ?mode,
            "encoded x3p document"
        );
        Ok(out)
    }

    /// Problems that make a file other readers would reject.  Fatal when
    /// strict, logged otherwise.
    fn check_valid(&self, doc: &Document) -> Result<(), EncodeError> {
        let mut problems = Vec::new();
        if !is_supported_revision(&doc.record1.revision) {
            problems.push(Warning::UnsupportedRevision(doc.record1.revision.clone()));
        }
        if let Some(r2) = &doc.record2 {
            problems.extend(r2.validate_dates());
            problems.extend(missing_record2_fields(r2).into_iter().map(Warning::MissingElement));
        }

        for w in problems {
            if self.options.strictness.is_strict() {
                return Err(EncodeError::Invalid(w));
            }
            tracing::warn!("writing anyway: {w}");
        }
        Ok(())
    }

    fn payload(
        &self,
        doc:  &Document,
        axes: &Axes,
        data: &SurfaceArray,
        mode: StorageMode,
    ) -> Result<Payload, EncodeError> {
        let dimension = &doc.record3.dimension;
        let source = doc.record3.storage.mode();
        let xy = axes.xy_types();
        let entries = dimension.entries();

        match mode {
            StorageMode::Binary => {
                let layout = binary_layout(xy, dimension)?;
                let data = match source {
                    StorageMode::Binary => {
                        if data.shape() != layout.shape.as_slice() {
                            return Err(EncodeError::ShapeMismatch(LayoutError::Shape {
                                expected: format!("{:?}", layout.shape),
                                found:    data.shape().to_vec(),
                            }));
                        }
                        data.clone()
                    }
                    StorageMode::Text => data.to_binary_layout(&layout)?,
                };

                let existing = match &doc.record3.storage {
                    ArrayStorage::Binary(link) => Some(link),
                    ArrayStorage::Text         => None,
                };
                let point_data_link = self
                    .options
                    .point_data_path
                    .clone()
                    .or_else(|| existing.map(|l| l.point_data_link.clone()))
                    .unwrap_or_else(|| DEFAULT_POINT_DATA_PATH.to_owned());

                let bytes = data.to_le_bytes();
                let mut link = DataLink {
                    point_data_link,
                    md5_point_data: Some(md5_hex(&bytes)),
                    valid_points_link: None,
                    md5_valid_points: None,
                };

                let valid = if data.valid_count() < data.values().len() {
                    let bits = pack_bits(&data.point_validity(layout.component_axis));
                    link.valid_points_link = Some(
                        self.options
                            .valid_points_path
                            .clone()
                            .or_else(|| existing.and_then(|l| l.valid_points_link.clone()))
                            .unwrap_or_else(|| DEFAULT_VALID_POINTS_PATH.to_owned()),
                    );
                    link.md5_valid_points = Some(md5_hex(&bits));
                    Some(bits)
                } else {
                    None
                };
                Ok(Payload::Binary { link, bytes, valid })
            }
            StorageMode::Text => {
                let rows = match source {
                    StorageMode::Text   => data.clone(),
                    StorageMode::Binary => data.to_text_layout(&binary_layout(xy, dimension)?)?,
                };
                let components = text_components(xy, dimension);
                match rows.shape() {
                    [c, e] if *c >= components && *e == entries => Ok(Payload::Text(rows)),
                    found => Err(EncodeError::ShapeMismatch(LayoutError::Shape {
                        expected: format!("({components}, {entries}) for a data list"),
                        found:    found.to_vec(),
                    })),
                }
            }
        }
    }
}

// ── Checks ───────────────────────────────────────────────────────────────────

fn check_complete(doc: &Document) -> Result<&SurfaceArray, EncodeError> {
    let incomplete = |what: &str| EncodeError::IncompleteDocument(what.to_owned());

    if doc.record1.revision.trim().is_empty() {
        return Err(incomplete("Record1.Revision"));
    }
    if doc.record1.feature_type().is_none() {
        return Err(incomplete("Record1.FeatureType"));
    }
    for name in [AxisName::X, AxisName::Y, AxisName::Z] {
        if doc.record1.axes.axis(name).axis_type().is_none() {
            return Err(EncodeError::IncompleteDocument(format!("{}.AxisType", name.tag())));
        }
    }
    if doc.record4.checksum_file.trim().is_empty() {
        return Err(incomplete("Record4.ChecksumFile"));
    }
    doc.data().ok_or_else(|| incomplete("point data"))
}

fn missing_record2_fields(r2: &Record2) -> Vec<String> {
    let mut missing = Vec::new();
    let mut need = |set: bool, name: &str| {
        if !set {
            missing.push(format!("Record2.{name}"));
        }
    };
    need(r2.date().is_some(), "Date");
    need(r2.instrument.manufacturer.is_some(), "Instrument.Manufacturer");
    need(r2.instrument.model.is_some(), "Instrument.Model");
    need(r2.instrument.serial.is_some(), "Instrument.Serial");
    need(r2.instrument.version.is_some(), "Instrument.Version");
    need(r2.calibration_date().is_some(), "CalibrationDate");
    need(r2.probing_system.probing_type().is_some(), "ProbingSystem.Type");
    need(r2.probing_system.identification.is_some(), "ProbingSystem.Identification");
    missing
}

/// The axes as written.  A reader needs a data type to size the payload,
/// so one is declared on CZ when no axis carries it.
fn output_axes(axes: &Axes, data: &SurfaceArray) -> Result<Axes, EncodeError> {
    let found = data.data_type();
    let declared = axes.declared_data_types();
    match declared.as_slice() {
        [] => {
            let mut out = axes.clone();
            out.cz.set_data_type(Some(found));
            Ok(out)
        }
        [dt] if *dt == found => Ok(axes.clone()),
        [dt] => Err(EncodeError::DataTypeMismatch { declared: *dt, found }),
        _ => Err(EncodeError::AmbiguousDataType(declared)),
    }
}

// ── main.xml ─────────────────────────────────────────────────────────────────

fn write_main_xml(doc: &Document, axes: &Axes, payload: &Payload) -> Result<Vec<u8>, EncodeError> {
    let mut w = XmlWriter::new();
    w.declaration()?;
    w.start_with_attrs("p:ISO5436_2", &[("xmlns:p", NAMESPACE)])?;

    write_record1(&mut w, &doc.record1, axes)?;
    if let Some(r2) = &doc.record2 {
        write_record2(&mut w, r2)?;
    }
    write_record3(&mut w, &doc.record3.dimension, payload)?;
    write_record4(&mut w, &doc.record4)?;
    if let Some(id) = &doc.vendor_specific_id {
        w.text_element("VendorSpecificID", id)?;
    }

    w.end("p:ISO5436_2")?;
    Ok(w.into_inner())
}

fn write_record1(w: &mut XmlWriter, r1: &Record1, axes: &Axes) -> Result<(), XmlError> {
    w.start("Record1")?;
    w.text_element("Revision", &r1.revision)?;
    if let Some(ft) = r1.feature_type() {
        w.text_element("FeatureType", ft.code())?;
    }
    w.start("Axes")?;
    for name in [AxisName::X, AxisName::Y, AxisName::Z] {
        let axis = axes.axis(name);
        w.start(name.tag())?;
        if let Some(t) = axis.axis_type() {
            w.text_element("AxisType", t.code())?;
        }
        if let Some(dt) = axis.data_type() {
            w.text_element("DataType", dt.code())?;
        }
        if let Some(v) = axis.increment {
            w.text_element("Increment", &v.to_string())?;
        }
        if let Some(v) = axis.offset {
            w.text_element("Offset", &v.to_string())?;
        }
        w.end(name.tag())?;
    }
    if let Some(r) = axes.rotation() {
        w.start("Rotation")?;
        for (i, row) in r.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                w.text_element(&format!("r{}{}", i + 1, j + 1), &v.to_string())?;
            }
        }
        w.end("Rotation")?;
    }
    w.end("Axes")?;
    w.end("Record1")
}

fn write_record2(w: &mut XmlWriter, r2: &Record2) -> Result<(), XmlError> {
    w.start("Record2")?;
    w.text_element("Date", r2.date().unwrap_or_default())?;
    if let Some(c) = &r2.creator {
        w.text_element("Creator", c)?;
    }
    w.start("Instrument")?;
    let inst = &r2.instrument;
    w.text_element("Manufacturer", inst.manufacturer.as_deref().unwrap_or_default())?;
    w.text_element("Model", inst.model.as_deref().unwrap_or_default())?;
    w.text_element("Serial", inst.serial.as_deref().unwrap_or_default())?;
    w.text_element("Version", inst.version.as_deref().unwrap_or_default())?;
    w.end("Instrument")?;
    w.text_element("CalibrationDate", r2.calibration_date().unwrap_or_default())?;
    w.start("ProbingSystem")?;
    let probing = &r2.probing_system;
    w.text_element("Type", probing.probing_type().map(|t| t.code()).unwrap_or_default())?;
    w.text_element("Identification", probing.identification.as_deref().unwrap_or_default())?;
    w.end("ProbingSystem")?;
    if let Some(c) = &r2.comment {
        w.text_element("Comment", c)?;
    }
    w.end("Record2")
}

fn write_record3(w: &mut XmlWriter, dimension: &Dimension, payload: &Payload) -> Result<(), XmlError> {
    w.start("Record3")?;
    match dimension {
        Dimension::Matrix(m) => {
            w.start("MatrixDimension")?;
            w.text_element("SizeX", &m.size_x.to_string())?;
            w.text_element("SizeY", &m.size_y.to_string())?;
            w.text_element("SizeZ", &m.size_z.to_string())?;
            w.end("MatrixDimension")?;
        }
        Dimension::List(n) => w.text_element("ListDimension", &n.to_string())?,
    }

    match payload {
        Payload::Binary { link, .. } => {
            w.start("DataLink")?;
            w.text_element("PointDataLink", &link.point_data_link)?;
            w.text_element("MD5ChecksumPointData", link.md5_point_data.as_deref().unwrap_or_default())?;
            if let (Some(path), Some(sum)) = (&link.valid_points_link, &link.md5_valid_points) {
                w.text_element("ValidPointsLink", path)?;
                w.text_element("MD5ChecksumValidPoints", sum)?;
            }
            w.end("DataLink")?;
        }
        Payload::Text(rows) => {
            w.start("DataList")?;
            for entry in datum_texts(rows) {
                match entry {
                    Some(text) => w.text_element("Datum", &text)?,
                    None       => w.empty("Datum")?,
                }
            }
            w.end("DataList")?;
        }
    }
    w.end("Record3")
}

fn write_record4(w: &mut XmlWriter, r4: &Record4) -> Result<(), XmlError> {
    w.start("Record4")?;
    w.text_element("ChecksumFile", &r4.checksum_file)?;
    w.end("Record4")
}

/// One `;`-joined string per entry of a `(components, entries)` array,
/// `None` when every component is masked.  A masked component is written
/// as `NaN` whatever the data type, so integers never read back as zero.
fn datum_texts(rows: &SurfaceArray) -> Vec<Option<String>> {
    const FILLER: &str = "NaN";
    let (components, entries) = (rows.shape()[0], rows.shape()[1]);

    (0..entries)
        .map(|e| {
            if (0..components).all(|c| !rows.is_valid(&[c, e])) {
                return None;
            }
            let parts: Vec<String> = (0..components)
                .map(|c| {
                    if rows.is_valid(&[c, e]) {
                        rows.values().format_at(&[c, e]).unwrap_or_else(|| FILLER.to_owned())
                    } else {
                        FILLER.to_owned()
                    }
                })
                .collect();
            Some(parts.join(";"))
        })
        .collect()
}
