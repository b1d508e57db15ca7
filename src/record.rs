//! Record1–Record4 of `main.xml`.
//!
//! Record1 describes the axes, Record2 the (optional) acquisition metadata,
//! Record3 the matrix dimension and where the point data lives, Record4 the
//! name of the checksum file.

use serde::{Deserialize, Serialize};

use crate::axes::Axes;
use crate::validate::{check_date, Warning};

/// The only format revision this crate writes.
pub const SUPPORTED_REVISION: &str = "ISO5436 - 2000";

/// Conventional member name for the binary point data.
pub const DEFAULT_POINT_DATA_PATH:  &str = "bindata/data.bin";
/// Conventional member name for the valid-points bitmap.
pub const DEFAULT_VALID_POINTS_PATH: &str = "bindata/valid.bin";
/// Container member holding the MD5 of `main.xml`.
pub const CHECKSUM_FILE: &str = "md5checksum.hex";

pub const MAIN_XML: &str = "main.xml";

/// True for [`SUPPORTED_REVISION`], ignoring whitespace (`"ISO5436 -2000"`
/// is common in the wild).
pub fn is_supported_revision(revision: &str) -> bool {
    let squash = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    squash(revision) == squash(SUPPORTED_REVISION)
}

// ── Record1 ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureType {
    Surface,
    Profile,
    PointCloud,
}

impl FeatureType {
    pub fn code(self) -> &'static str {
        match self {
            FeatureType::Surface    => "SUR",
            FeatureType::Profile    => "PRF",
            FeatureType::PointCloud => "PCL",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim() {
            "SUR" => Some(FeatureType::Surface),
            "PRF" => Some(FeatureType::Profile),
            "PCL" => Some(FeatureType::PointCloud),
            _     => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record1 {
    pub revision: String,
    feature_type: Option<FeatureType>,
    pub axes:     Axes,
}

impl Default for Record1 {
    fn default() -> Self {
        Self {
            revision:     SUPPORTED_REVISION.to_owned(),
            feature_type: None,
            axes:         Axes::default(),
        }
    }
}

impl Record1 {
    pub fn feature_type(&self) -> Option<FeatureType> { self.feature_type }

    pub fn set_feature_type(&mut self, feature_type: FeatureType) {
        self.feature_type = Some(feature_type);
    }

    pub fn set_feature_type_code(&mut self, code: &str) -> Result<(), Warning> {
        let ft = FeatureType::from_code(code)
            .ok_or_else(|| Warning::invalid("FeatureType", code, "expected SUR, PRF or PCL"))?;
        self.feature_type = Some(ft);
        Ok(())
    }
}

// ── Record2 ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbingType {
    NonContacting,
    Contacting,
    Software,
}

impl ProbingType {
    pub fn code(self) -> &'static str {
        match self {
            ProbingType::NonContacting => "NonContacting",
            ProbingType::Contacting    => "Contacting",
            ProbingType::Software      => "Software",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim() {
            "NonContacting" => Some(ProbingType::NonContacting),
            "Contacting"    => Some(ProbingType::Contacting),
            "Software"      => Some(ProbingType::Software),
            _               => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub manufacturer: Option<String>,
    pub model:        Option<String>,
    pub serial:       Option<String>,
    pub version:      Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbingSystem {
    probing_type:       Option<ProbingType>,
    /// Vendor identification of tip, lens, etc.
    pub identification: Option<String>,
}

impl ProbingSystem {
    pub fn probing_type(&self) -> Option<ProbingType> { self.probing_type }

    pub fn set_probing_type(&mut self, t: ProbingType) {
        self.probing_type = Some(t);
    }

    pub fn set_probing_type_code(&mut self, code: &str) -> Result<(), Warning> {
        let t = ProbingType::from_code(code).ok_or_else(|| {
            Warning::invalid("ProbingSystem.Type", code, "expected NonContacting, Contacting or Software")
        })?;
        self.probing_type = Some(t);
        Ok(())
    }
}

/// Acquisition metadata.  Absent as a whole is represented by
/// `Option<Record2>` on the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record2 {
    date:                 Option<String>,
    pub creator:          Option<String>,
    pub instrument:       Instrument,
    calibration_date:     Option<String>,
    pub probing_system:   ProbingSystem,
    pub comment:          Option<String>,
}

impl Record2 {
    pub fn date(&self) -> Option<&str> { self.date.as_deref() }
    pub fn calibration_date(&self) -> Option<&str> { self.calibration_date.as_deref() }

    /// Store the creation date.  A non-ISO-8601 value is kept verbatim and
    /// reported.
    pub fn set_date(&mut self, value: &str) -> Result<(), Warning> {
        self.date = Some(value.to_owned());
        check_date("Record2.Date", value)
    }

    pub fn set_calibration_date(&mut self, value: &str) -> Result<(), Warning> {
        self.calibration_date = Some(value.to_owned());
        check_date("Record2.CalibrationDate", value)
    }

    /// Re-run the date checks, e.g. before writing.
    pub fn validate_dates(&self) -> Vec<Warning> {
        let mut out = Vec::new();
        if let Some(d) = &self.date {
            out.extend(check_date("Record2.Date", d).err());
        }
        if let Some(d) = &self.calibration_date {
            out.extend(check_date("Record2.CalibrationDate", d).err());
        }
        out
    }
}

// ── Record3 ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixDimension {
    pub size_x: usize,
    pub size_y: usize,
    /// 1 for a single layer; more for stacked layers.
    pub size_z: usize,
}

impl MatrixDimension {
    pub fn new(size_x: usize, size_y: usize, size_z: usize) -> Self {
        Self { size_x, size_y, size_z }
    }

    /// Saturates instead of overflowing; see [`Dimension::payload_bound`].
    pub fn points(&self) -> usize {
        self.size_x.saturating_mul(self.size_y).saturating_mul(self.size_z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimension {
    Matrix(MatrixDimension),
    /// Unordered point cloud of this many points.
    List(usize),
}

impl Dimension {
    pub fn points(&self) -> usize {
        match self {
            Dimension::Matrix(m) => m.points(),
            Dimension::List(n)   => *n,
        }
    }

    /// Entries of the equivalent data list: one per X/Y position.
    pub fn entries(&self) -> usize {
        match self {
            Dimension::Matrix(m) => m.size_x.saturating_mul(m.size_y),
            Dimension::List(n)   => *n,
        }
    }

    /// Byte size of the widest payload this dimension can describe (three
    /// 8-byte components per point), or `None` if that overflows `usize`.
    pub fn payload_bound(&self) -> Option<usize> {
        let factors = match self {
            Dimension::Matrix(m) => [m.size_x, m.size_y, m.size_z.max(1), 3 * 8],
            Dimension::List(n)   => [*n, 1, 1, 3 * 8],
        };
        factors.iter().try_fold(1usize, |acc, &f| acc.checked_mul(f))
    }
}

/// Reference to binary point data inside the container.
///
/// The checksums are whatever the file declared and the valid-points link
/// follows the mask; the encoder rewrites all three, so only the point data
/// link takes part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataLink {
    pub point_data_link:   String,
    pub md5_point_data:    Option<String>,
    pub valid_points_link: Option<String>,
    pub md5_valid_points:  Option<String>,
}

impl Default for DataLink {
    fn default() -> Self {
        Self {
            point_data_link:   DEFAULT_POINT_DATA_PATH.to_owned(),
            md5_point_data:    None,
            valid_points_link: None,
            md5_valid_points:  None,
        }
    }
}

impl PartialEq for DataLink {
    fn eq(&self, other: &Self) -> bool {
        self.point_data_link == other.point_data_link
    }
}

/// Point data location: a binary member or inline `<Datum>` text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayStorage {
    Binary(DataLink),
    Text,
}

impl Default for ArrayStorage {
    fn default() -> Self {
        ArrayStorage::Binary(DataLink::default())
    }
}

/// Output selector for [`crate::encode::EncodeOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMode {
    Binary,
    Text,
}

impl StorageMode {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "binary" | "bin" | "datalink" => Some(StorageMode::Binary),
            "text" | "list" | "datalist"  => Some(StorageMode::Text),
            _                             => None,
        }
    }
}

impl ArrayStorage {
    pub fn mode(&self) -> StorageMode {
        match self {
            ArrayStorage::Binary(_) => StorageMode::Binary,
            ArrayStorage::Text      => StorageMode::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record3 {
    pub dimension: Dimension,
    pub storage:   ArrayStorage,
}

impl Default for Record3 {
    fn default() -> Self {
        Self {
            dimension: Dimension::Matrix(MatrixDimension::new(0, 0, 1)),
            storage:   ArrayStorage::default(),
        }
    }
}

// ── Record4 ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record4 {
    /// Name of the container member holding the MD5 of `main.xml`.
    pub checksum_file: String,
}

impl Default for Record4 {
    fn default() -> Self {
        Self { checksum_file: CHECKSUM_FILE.to_owned() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_spacing_is_ignored() {
        assert!(is_supported_revision("ISO5436 -2000"));
        assert!(is_supported_revision(SUPPORTED_REVISION));
        assert!(!is_supported_revision("ISO5436 - 2010"));
    }

    #[test]
    fn oversized_dimension_has_no_payload_bound() {
        let huge = Dimension::Matrix(MatrixDimension::new(usize::MAX / 2, 3, 1));
        assert_eq!(huge.payload_bound(), None);
        assert_eq!(huge.entries(), usize::MAX);
        assert_eq!(huge.points(), usize::MAX);

        let small = Dimension::Matrix(MatrixDimension::new(4, 3, 2));
        assert_eq!(small.payload_bound(), Some(4 * 3 * 2 * 24));
        assert_eq!(Dimension::List(5).payload_bound(), Some(5 * 24));
    }

    #[test]
    fn feature_codes() {
        let mut r1 = Record1::default();
        r1.set_feature_type_code("PRF").unwrap();
        assert_eq!(r1.feature_type(), Some(FeatureType::Profile));
        assert!(r1.set_feature_type_code("PLC").is_err());
        assert_eq!(r1.feature_type(), Some(FeatureType::Profile));
    }

    #[test]
    fn malformed_date_is_kept_and_reported() {
        let mut r2 = Record2::default();
        assert!(r2.set_date("14 June 2020").is_err());
        assert_eq!(r2.date(), Some("14 June 2020"));
        assert!(r2.set_calibration_date("2008-08-25T13:59:21.4+02:00").is_ok());
        assert_eq!(r2.validate_dates().len(), 1);
    }

    #[test]
    fn probing_type_codes() {
        let mut p = ProbingSystem::default();
        assert!(p.set_probing_type_code("Optical").is_err());
        assert_eq!(p.probing_type(), None);
        p.set_probing_type_code("Contacting").unwrap();
        assert_eq!(p.probing_type(), Some(ProbingType::Contacting));
    }

    #[test]
    fn data_link_equality_ignores_checksums() {
        let a = DataLink::default();
        let b = DataLink { md5_point_data: Some("00".into()), ..DataLink::default() };
        assert_eq!(a, b);
    }
}
