use ndarray::{Array2, ArrayD, IxDyn};
use proptest::prelude::*;
use tempfile::NamedTempFile;
use x3p::checksum::{checksum_line, md5_hex};
use x3p::container::{ContainerReader, ContainerWriter};
use x3p::{
    AxisType, Compression, DataType, DecodeError, DecodeOptions, Dimension, Document, EncodeError,
    EncodeOptions, FeatureType, MatrixDimension, ProbingType, Record2, StorageMode, Strictness,
    SurfaceArray, Warning,
};

// ── helpers ──────────────────────────────────────────────────────────────────

fn surface_doc(data: SurfaceArray) -> Document {
    let mut doc = Document::new();
    doc.record1.set_feature_type(FeatureType::Surface);
    doc.axes_mut().cx.set_axis_type(AxisType::Incremental);
    doc.axes_mut().cy.set_axis_type(AxisType::Incremental);
    doc.axes_mut().cx.increment = Some(1.0e-6);
    doc.axes_mut().cy.increment = Some(2.5e-6);
    doc.set_data(data).unwrap();
    doc
}

fn ramp(sx: usize, sy: usize) -> SurfaceArray {
    SurfaceArray::from_array(Array2::from_shape_fn((sx, sy), |(i, j)| (i * 100 + j) as f64).into_dyn())
}

fn members(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut r = ContainerReader::new(bytes).unwrap();
    let names = r.names();
    names
        .into_iter()
        .map(|n| {
            let data = r.require(&n).unwrap();
            (n, data)
        })
        .collect()
}

fn repack(members: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut w = ContainerWriter::new(Compression::Deflated);
    for (name, data) in members {
        w.add(name, data).unwrap();
    }
    w.finish().unwrap()
}

/// A container around hand-written `main.xml`, with a correct checksum.
fn package(xml: &str, extra: &[(&str, &[u8])]) -> Vec<u8> {
    let mut w = ContainerWriter::new(Compression::Stored);
    w.add("md5checksum.hex", checksum_line(xml.as_bytes(), "main.xml").as_bytes()).unwrap();
    w.add("main.xml", xml.as_bytes()).unwrap();
    for (name, data) in extra {
        w.add(name, data).unwrap();
    }
    w.finish().unwrap()
}

fn main_xml(x: &str, y: &str, axes_extra: &str, record3: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<p:ISO5436_2 xmlns:p="http://www.opengps.eu/2008/ISO5436_2">
  <Record1>
    <Revision>ISO5436 - 2000</Revision>
    <FeatureType>SUR</FeatureType>
    <Axes>
      <CX><AxisType>{x}</AxisType><Increment>1e-6</Increment></CX>
      <CY><AxisType>{y}</AxisType><Increment>1e-6</Increment></CY>
      <CZ><AxisType>A</AxisType>{axes_extra}</CZ>
    </Axes>
  </Record1>
  <Record3>{record3}</Record3>
  <Record4><ChecksumFile>md5checksum.hex</ChecksumFile></Record4>
</p:ISO5436_2>"#
    )
}

fn matrix(sx: usize, sy: usize, sz: usize) -> String {
    format!("<MatrixDimension><SizeX>{sx}</SizeX><SizeY>{sy}</SizeY><SizeZ>{sz}</SizeZ></MatrixDimension>")
}

fn data_link(payload: &[u8]) -> String {
    format!(
        "<DataLink><PointDataLink>bindata/data.bin</PointDataLink>\
         <MD5ChecksumPointData>{}</MD5ChecksumPointData></DataLink>",
        md5_hex(payload)
    )
}

fn f32_payload(n: usize) -> Vec<u8> {
    (0..n).flat_map(|i| (i as f32).to_le_bytes()).collect()
}

// ── round trips ──────────────────────────────────────────────────────────────

#[test]
fn test_binary_roundtrip() {
    let doc = surface_doc(ramp(5, 4));
    let bytes = doc.to_bytes().unwrap();
    let (back, warnings) = Document::from_bytes(&bytes).unwrap();
    assert!(warnings.is_empty(), "{warnings:?}");
    assert_eq!(back, doc);
    assert_eq!(back.axes().rotation(), None);
    assert_eq!(back.data().unwrap().shape(), &[5, 4]);
}

#[test]
fn test_container_members_and_checksum() {
    let doc = surface_doc(ramp(3, 3));
    let bytes = doc.to_bytes().unwrap();
    let m = members(&bytes);
    let names: Vec<&str> = m.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["md5checksum.hex", "main.xml", "bindata/data.bin"]);

    let xml = &m[1].1;
    let sum = String::from_utf8(m[0].1.clone()).unwrap();
    assert_eq!(sum, format!("{} *main.xml", md5_hex(xml)));

    let text = String::from_utf8(xml.clone()).unwrap();
    assert!(text.contains("xmlns:p=\"http://www.opengps.eu/2008/ISO5436_2\""));
    assert!(!text.contains("Rotation"));
    assert!(!text.contains("<Offset>"));
    assert!(!text.contains("Record2"));
}

#[test]
fn test_record2_and_vendor_id_roundtrip_on_disk() {
    let mut doc = surface_doc(ramp(2, 6));
    let mut r2 = Record2::default();
    r2.set_date("2024-03-01T10:00:00+01:00").unwrap();
    r2.set_calibration_date("2023-12-24T08:30:00").unwrap();
    r2.creator = Some("Lab <3>".into());
    r2.instrument.manufacturer = Some("Acme".into());
    r2.instrument.model = Some("Profiler 9".into());
    r2.instrument.serial = Some("SN-42".into());
    r2.instrument.version = Some("1.2".into());
    r2.probing_system.set_probing_type(ProbingType::NonContacting);
    r2.probing_system.identification = Some("confocal 20x".into());
    doc.record2 = Some(r2);
    doc.vendor_specific_id = Some("http://example.com/ext".into());
    doc.axes_mut().cz.offset = Some(-0.125);

    let file = NamedTempFile::new().unwrap();
    doc.save(file.path()).unwrap();
    let (back, warnings) = Document::open(file.path()).unwrap();
    assert!(warnings.is_empty(), "{warnings:?}");
    assert_eq!(back, doc);
    assert_eq!(back.instrument().and_then(|i| i.model.as_deref()), Some("Profiler 9"));
    assert_eq!(back.record2.as_ref().and_then(|r| r.comment.clone()), None);
}

#[test]
fn test_point_cloud_list_roundtrip() {
    let mut doc = Document::new();
    doc.record1.set_feature_type(FeatureType::PointCloud);
    doc.axes_mut().cx.set_axis_type(AxisType::Absolute);
    doc.axes_mut().cy.set_axis_type(AxisType::Absolute);
    let cloud = Array2::from_shape_fn((4, 3), |(p, c)| (p * 3 + c) as i32).into_dyn();
    doc.set_data(SurfaceArray::from_array(cloud)).unwrap();
    assert_eq!(doc.dimension(), &Dimension::List(4));

    let (back, _) = Document::from_bytes(&doc.to_bytes().unwrap()).unwrap();
    assert_eq!(back, doc);
    assert_eq!(back.data().unwrap().data_type(), DataType::Int32);
}

// ── rotation and axis types ──────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_rotation_roundtrips_exactly(entries in proptest::array::uniform9(-1.0f64..=1.0)) {
        let mut doc = surface_doc(ramp(2, 2));
        for (k, v) in entries.iter().enumerate() {
            doc.axes_mut().set_rotation(k / 3 + 1, k % 3 + 1, *v).unwrap();
        }
        let (back, warnings) = Document::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        prop_assert!(warnings.is_empty());
        let r = back.axes().rotation().copied().unwrap();
        for k in 0..9 {
            prop_assert_eq!(r[k / 3][k % 3].to_bits(), entries[k].to_bits());
        }
    }

    #[test]
    fn prop_z_axis_stays_absolute(incremental in any::<bool>()) {
        let mut doc = Document::new();
        let t = if incremental { AxisType::Incremental } else { AxisType::Absolute };
        doc.axes_mut().cz.set_axis_type(t);
        prop_assert_eq!(doc.axes().cz.axis_type(), Some(AxisType::Absolute));
        doc.axes_mut().cz.set_axis_type_code("I").unwrap();
        prop_assert_eq!(doc.axes().cz.axis_type(), Some(AxisType::Absolute));
    }

    #[test]
    fn prop_float32_values_survive(values in proptest::collection::vec(-1.0e6f32..1.0e6, 12)) {
        let a = ArrayD::from_shape_vec(IxDyn(&[3, 4]), values).unwrap();
        let doc = surface_doc(SurfaceArray::from_array(a));
        let (back, _) = Document::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(back, doc);
    }
}

#[test]
fn test_partial_rotation_starts_from_identity() {
    let mut doc = surface_doc(ramp(2, 2));
    doc.axes_mut().set_rotation(1, 2, 0.5).unwrap();
    assert!(doc.axes_mut().set_rotation(2, 1, 1.5).is_err());

    let (back, _) = Document::from_bytes(&doc.to_bytes().unwrap()).unwrap();
    let r = back.axes().rotation().copied().unwrap();
    assert_eq!(r, [[1.0, 0.5, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
}

// ── checksums ────────────────────────────────────────────────────────────────

#[test]
fn test_tampered_payload_warns_and_keeps_data() {
    let a = Array2::from_shape_vec((2, 2), vec![1.0f64, 2.0, 3.0, 4.0]).unwrap().into_dyn();
    let doc = surface_doc(SurfaceArray::from_array(a));
    let mut m = members(&doc.to_bytes().unwrap());
    let payload = m.iter_mut().find(|(n, _)| n == "bindata/data.bin").unwrap();
    payload.1[..8].copy_from_slice(&9.0f64.to_le_bytes());

    let (back, warnings) = Document::from_bytes(&repack(&m)).unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(matches!(&warnings[0], Warning::ChecksumMismatch { member, .. } if member == "bindata/data.bin"));
    assert_eq!(back.data().unwrap().get(&[0, 0]), Some(9.0));
    assert_eq!(back.data().unwrap().get(&[1, 1]), Some(4.0));
}

#[test]
fn test_tampered_container_checksum() {
    let doc = surface_doc(ramp(2, 3));
    let mut m = members(&doc.to_bytes().unwrap());
    m[0].1 = b"00000000000000000000000000000000 *main.xml".to_vec();
    let bytes = repack(&m);

    let (back, warnings) = Document::from_bytes(&bytes).unwrap();
    assert!(matches!(&warnings[..], [Warning::ChecksumMismatch { member, .. }] if member == "main.xml"));
    assert_eq!(back, doc);

    let strict = DecodeOptions { strictness: Strictness::Strict };
    assert!(matches!(
        Document::from_bytes_with(&bytes, strict),
        Err(DecodeError::Strict(Warning::ChecksumMismatch { .. }))
    ));
}

// ── shape selection ──────────────────────────────────────────────────────────

#[test]
fn test_stacked_incremental_layers() {
    let payload = f32_payload(3 * 4 * 2);
    let xml = main_xml("I", "I", "<DataType>F</DataType>", &(matrix(4, 2, 3) + &data_link(&payload)));
    let (doc, warnings) = Document::from_bytes(&package(&xml, &[("bindata/data.bin", &payload)])).unwrap();
    assert!(warnings.is_empty(), "{warnings:?}");
    let data = doc.data().unwrap();
    assert_eq!(data.shape(), &[3, 4, 2]);
    assert_eq!(data.get(&[1, 0, 0]), Some(8.0));
    assert_eq!(data.get(&[2, 3, 1]), Some(23.0));
}

#[test]
fn test_absolute_matrix_has_component_axis() {
    let payload = f32_payload(4 * 2 * 3);
    let xml = main_xml("A", "A", "<DataType>F</DataType>", &(matrix(4, 2, 1) + &data_link(&payload)));
    let (doc, _) = Document::from_bytes(&package(&xml, &[("bindata/data.bin", &payload)])).unwrap();
    assert_eq!(doc.data().unwrap().shape(), &[4, 2, 3]);
    assert_eq!(doc.points().len(), 8);
}

#[test]
fn test_mixed_axes_are_rejected() {
    let payload = f32_payload(4);
    let xml = main_xml("I", "A", "<DataType>F</DataType>", &(matrix(2, 2, 1) + &data_link(&payload)));
    let err = Document::from_bytes(&package(&xml, &[("bindata/data.bin", &payload)])).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::UnsupportedAxisCombination { x: AxisType::Incremental, y: AxisType::Absolute }
    ));
}

#[test]
fn test_conflicting_data_types() {
    let payload = f32_payload(4);
    let xml = main_xml("I", "I", "<DataType>D</DataType>", &(matrix(2, 2, 1) + &data_link(&payload)))
        .replace("<CX><AxisType>I</AxisType>", "<CX><AxisType>I</AxisType><DataType>F</DataType>");
    let err = Document::from_bytes(&package(&xml, &[("bindata/data.bin", &payload)])).unwrap_err();
    assert!(matches!(err, DecodeError::AmbiguousDataType(_)));
}

#[test]
fn test_short_payload_is_fatal() {
    let payload = f32_payload(3);
    let xml = main_xml("I", "I", "<DataType>F</DataType>", &(matrix(2, 2, 1) + &data_link(&payload)));
    let err = Document::from_bytes(&package(&xml, &[("bindata/data.bin", &payload)])).unwrap_err();
    assert!(matches!(err, DecodeError::Layout(_)));
}

// ── structural failures ──────────────────────────────────────────────────────

#[test]
fn test_structural_failures() {
    assert!(matches!(Document::from_bytes(b"not a zip"), Err(DecodeError::Container(_))));

    let payload = f32_payload(4);
    let xml = main_xml("I", "I", "<DataType>F</DataType>", &(matrix(2, 2, 1) + &data_link(&payload)));
    assert!(matches!(
        Document::from_bytes(&package(&xml, &[])),
        Err(DecodeError::Container(x3p::container::ContainerError::MissingMember(name))) if name == "bindata/data.bin"
    ));

    let no_record3 = xml.replace(&format!("<Record3>{}{}</Record3>", matrix(2, 2, 1), data_link(&payload)), "");
    assert!(matches!(
        Document::from_bytes(&package(&no_record3, &[])),
        Err(DecodeError::MalformedDocument(_))
    ));
}

#[test]
fn test_invalid_metadata_is_recoverable() {
    let payload = f32_payload(4);
    let xml = main_xml("I", "I", "<DataType>F</DataType>", &(matrix(2, 2, 1) + &data_link(&payload)))
        .replace("<FeatureType>SUR</FeatureType>", "<FeatureType>SURFACE</FeatureType>")
        .replace(
            "<Record3>",
            "<Record2><Date>last tuesday</Date></Record2><Record3>",
        );
    let (doc, warnings) = Document::from_bytes(&package(&xml, &[("bindata/data.bin", &payload)])).unwrap();
    assert_eq!(doc.feature_type(), None);
    assert_eq!(doc.record2.as_ref().and_then(|r| r.date()), Some("last tuesday"));
    assert!(warnings.iter().any(|w| matches!(w, Warning::InvalidValue { field, .. } if field == "FeatureType")));
    assert!(warnings.iter().any(|w| matches!(w, Warning::InvalidDate { .. })));
    assert!(warnings.iter().any(|w| matches!(w, Warning::MissingElement(e) if e == "Record2.Model")));
    assert_eq!(doc.data().unwrap().valid_count(), 4);
}

// ── text storage ─────────────────────────────────────────────────────────────

#[test]
fn test_data_list_masked_entry() {
    let list = "<DataList><Datum>1.5</Datum><Datum/><Datum>-2</Datum></DataList>";
    let xml = main_xml("I", "I", "<DataType>D</DataType>", &(matrix(3, 1, 1) + list));
    let (doc, warnings) = Document::from_bytes(&package(&xml, &[])).unwrap();
    assert!(warnings.is_empty(), "{warnings:?}");
    assert_eq!(doc.storage_mode(), StorageMode::Text);

    let data = doc.data().unwrap();
    assert_eq!(data.shape(), &[1, 3]);
    assert_eq!(data.get(&[0, 0]), Some(1.5));
    assert!(!data.is_valid(&[0, 1]));
    assert_eq!(data.get(&[0, 2]), Some(-2.0));

    let again = doc.to_bytes().unwrap();
    let m = members(&again);
    let text = String::from_utf8(m[1].1.clone()).unwrap();
    assert!(text.contains("<Datum/>"));
    assert_eq!(m.len(), 2);

    let (back, _) = Document::from_bytes(&again).unwrap();
    assert_eq!(back, doc);
}

#[test]
fn test_data_list_widens_components() {
    let list = "<DataList><Datum>1;2</Datum><Datum>3</Datum></DataList>";
    let xml = main_xml("I", "I", "", &(matrix(2, 1, 1) + list));
    let (doc, warnings) = Document::from_bytes(&package(&xml, &[])).unwrap();
    assert_eq!(warnings, vec![Warning::ComponentWidening { declared: 1, found: 2 }]);
    let data = doc.data().unwrap();
    assert_eq!(data.data_type(), DataType::Float64);
    assert_eq!(data.shape(), &[2, 2]);
    assert_eq!(data.get(&[1, 0]), Some(2.0));
    assert!(!data.is_valid(&[1, 1]));
}

#[test]
fn test_convert_binary_to_text_and_back() {
    let mut data = ramp(4, 3);
    data.mask_mut()[[2, 1]] = false;
    let doc = surface_doc(data);

    let text_opts = EncodeOptions { storage: Some(StorageMode::Text), ..EncodeOptions::default() };
    let (as_text, _) = Document::from_bytes(&doc.to_bytes_with(text_opts).unwrap()).unwrap();
    assert_eq!(as_text.storage_mode(), StorageMode::Text);
    assert_eq!(as_text.data().unwrap().shape(), &[1, 12]);
    assert_eq!(as_text.points(), doc.points());

    let bin_opts = EncodeOptions { storage: Some(StorageMode::Binary), ..EncodeOptions::default() };
    let (as_binary, _) = Document::from_bytes(&as_text.to_bytes_with(bin_opts).unwrap()).unwrap();
    assert_eq!(as_binary.data(), doc.data());
}

#[test]
fn test_masked_integers_survive_text_storage() {
    let mut data = SurfaceArray::from_array(
        ArrayD::from_shape_fn(IxDyn(&[2, 2, 2]), |ix| (ix[0] * 100 + ix[1] * 10 + ix[2]) as i32),
    );
    data.mask_mut()[[1, 0, 0]] = false;
    let doc = surface_doc(data);

    let text_opts = EncodeOptions { storage: Some(StorageMode::Text), ..EncodeOptions::default() };
    let bytes = doc.to_bytes_with(text_opts).unwrap();
    let xml = String::from_utf8(members(&bytes)[1].1.clone()).unwrap();
    assert!(xml.contains("<Datum>0;NaN</Datum>"), "{xml}");

    let (as_text, warnings) = Document::from_bytes(&bytes).unwrap();
    assert!(warnings.is_empty(), "{warnings:?}");
    let rows = as_text.data().unwrap();
    assert_eq!(rows.data_type(), DataType::Int32);
    assert_eq!(rows.valid_count(), 7);
    assert!(!rows.is_valid(&[1, 0]));

    let bin_opts = EncodeOptions { storage: Some(StorageMode::Binary), ..EncodeOptions::default() };
    let (as_binary, _) = Document::from_bytes(&as_text.to_bytes_with(bin_opts).unwrap()).unwrap();
    assert_eq!(as_binary.data(), doc.data());
}

// ── oversized declarations ───────────────────────────────────────────────────

#[test]
fn test_oversized_matrix_is_malformed() {
    let dims = "<MatrixDimension><SizeX>8589934592</SizeX><SizeY>8589934592</SizeY>\
                <SizeZ>1</SizeZ></MatrixDimension>";
    let list = "<DataList><Datum>1</Datum></DataList>";
    let xml = main_xml("I", "I", "<DataType>D</DataType>", &format!("{dims}{list}"));
    assert!(matches!(Document::from_bytes(&package(&xml, &[])), Err(DecodeError::MalformedDocument(_))));

    let payload = f32_payload(4);
    let xml = main_xml("I", "I", "<DataType>F</DataType>", &format!("{dims}{}", data_link(&payload)));
    assert!(matches!(
        Document::from_bytes(&package(&xml, &[("bindata/data.bin", &payload)])),
        Err(DecodeError::MalformedDocument(_))
    ));
}

#[test]
fn test_deep_layers_on_short_list_are_malformed() {
    let dims = "<MatrixDimension><SizeX>1</SizeX><SizeY>1</SizeY>\
                <SizeZ>1099511627776</SizeZ></MatrixDimension>";
    let list = "<DataList><Datum>1;2</Datum></DataList>";
    let xml = main_xml("I", "I", "<DataType>D</DataType>", &format!("{dims}{list}"));
    assert!(matches!(Document::from_bytes(&package(&xml, &[])), Err(DecodeError::MalformedDocument(_))));
}

// ── NaN samples ──────────────────────────────────────────────────────────────

#[test]
fn test_valid_nan_is_kept_in_binary_storage() {
    let a = ndarray::arr2(&[[1.0f64, f64::NAN], [3.0, 4.0]]).into_dyn();
    let doc = surface_doc(SurfaceArray::from_array(a.clone()));
    let bytes = doc.to_bytes().unwrap();
    assert!(!members(&bytes).iter().any(|(n, _)| n == "bindata/valid.bin"));

    let (back, warnings) = Document::from_bytes(&bytes).unwrap();
    assert!(warnings.is_empty(), "{warnings:?}");
    let decoded = back.data().unwrap();
    assert_eq!(decoded.valid_count(), 4);
    assert!(decoded.get(&[0, 1]).is_some_and(f64::is_nan));
    assert_eq!(back, doc);

    let mut partly = SurfaceArray::from_array(a);
    partly.mask_mut()[[1, 0]] = false;
    let doc = surface_doc(partly);
    let (back, _) = Document::from_bytes(&doc.to_bytes().unwrap()).unwrap();
    assert_eq!(back.data().unwrap().valid_count(), 3);
    assert!(back.data().unwrap().is_valid(&[0, 1]));
    assert_eq!(back, doc);
}

// ── masking scenario ─────────────────────────────────────────────────────────

#[test]
fn test_sine_surface_with_masked_rows() {
    let a = Array2::from_shape_fn((12, 12), |(i, j)| (i as f64 * 0.4).sin() * (j as f64 * 0.7).cos() * 1.0e-6);
    let mut data = SurfaceArray::from_array(a.clone().into_dyn());
    for i in 3..=5 {
        for j in 0..12 {
            data.mask_mut()[[i, j]] = false;
        }
    }
    let doc = surface_doc(data);
    let bytes = doc.to_bytes().unwrap();
    assert!(members(&bytes).iter().any(|(n, _)| n == "bindata/valid.bin"));

    let (back, warnings) = Document::from_bytes(&bytes).unwrap();
    assert!(warnings.is_empty(), "{warnings:?}");
    let decoded = back.data().unwrap();
    for i in 0..12 {
        for j in 0..12 {
            let masked = (3..=5).contains(&i);
            assert_eq!(decoded.is_valid(&[i, j]), !masked, "mask at ({i}, {j})");
            if !masked {
                assert_eq!(decoded.get(&[i, j]), Some(a[[i, j]]));
            }
        }
    }
    assert_eq!(back, doc);
}

// ── encoder refusals ─────────────────────────────────────────────────────────

#[test]
fn test_encoder_refusals() {
    let mut doc = Document::new();
    doc.axes_mut().cx.set_axis_type(AxisType::Incremental);
    doc.axes_mut().cy.set_axis_type(AxisType::Incremental);
    doc.set_data(ramp(2, 2)).unwrap();
    assert!(matches!(doc.to_bytes(), Err(EncodeError::IncompleteDocument(f)) if f == "Record1.FeatureType"));

    doc.record1.set_feature_type(FeatureType::Profile);
    let mut r2 = Record2::default();
    let _ = r2.set_date("someday");
    doc.record2 = Some(r2);
    assert!(matches!(doc.to_bytes(), Err(EncodeError::Invalid(Warning::InvalidDate { .. }))));

    let lenient = EncodeOptions { strictness: Strictness::Lenient, ..EncodeOptions::default() };
    let bytes = doc.to_bytes_with(lenient).unwrap();
    let (_, warnings) = Document::from_bytes(&bytes).unwrap();
    assert!(warnings.iter().any(|w| matches!(w, Warning::InvalidDate { .. })));

    doc.record3.dimension = Dimension::Matrix(MatrixDimension::new(3, 3, 1));
    assert!(matches!(
        doc.to_bytes_with(EncodeOptions { strictness: Strictness::Lenient, ..EncodeOptions::default() }),
        Err(EncodeError::ShapeMismatch(_))
    ));
}
