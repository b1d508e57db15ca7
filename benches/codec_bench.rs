use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use x3p::{AxisType, Document, EncodeOptions, FeatureType, StorageMode, SurfaceArray};

fn surface_512() -> Document {
    let a = Array2::from_shape_fn((512, 512), |(i, j)| ((i as f64) * 0.01).sin() * ((j as f64) * 0.02).cos());
    let mut data = SurfaceArray::from_array(a.into_dyn());
    for j in 0..512 {
        data.mask_mut()[[100, j]] = false;
    }
    let mut doc = Document::new();
    doc.record1.set_feature_type(FeatureType::Surface);
    doc.axes_mut().cx.set_axis_type(AxisType::Incremental);
    doc.axes_mut().cy.set_axis_type(AxisType::Incremental);
    doc.axes_mut().cx.increment = Some(1.0e-6);
    doc.axes_mut().cy.increment = Some(1.0e-6);
    doc.set_data(data).unwrap();
    doc
}

fn bench_binary(c: &mut Criterion) {
    let doc = surface_512();
    let bytes = doc.to_bytes().unwrap();

    c.bench_function("encode_512x512_binary", |b| b.iter(|| black_box(&doc).to_bytes().unwrap()));
    c.bench_function("decode_512x512_binary", |b| b.iter(|| Document::from_bytes(black_box(&bytes)).unwrap()));
}

fn bench_text(c: &mut Criterion) {
    let doc = surface_512();
    let opts = EncodeOptions { storage: Some(StorageMode::Text), ..EncodeOptions::default() };
    let bytes = doc.to_bytes_with(opts.clone()).unwrap();

    c.bench_function("encode_512x512_text", |b| {
        b.iter(|| black_box(&doc).to_bytes_with(opts.clone()).unwrap())
    });
    c.bench_function("decode_512x512_text", |b| b.iter(|| Document::from_bytes(black_box(&bytes)).unwrap()));
}

criterion_group!(benches, bench_binary, bench_text);
criterion_main!(benches);
