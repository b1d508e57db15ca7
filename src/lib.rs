//! Reader and writer for ISO 5436-2 X3P surface metrology files.
//!
//! An X3P file is a zip container holding `main.xml` (the four records),
//! `md5checksum.hex`, and optionally the binary point data.
//!
//! ```no_run
//! use x3p::Document;
//!
//! let (doc, warnings) = Document::open("surface.x3p")?;
//! for w in &warnings {
//!     eprintln!("warning: {w}");
//! }
//! if let Some(data) = doc.data() {
//!     println!("{:?} {:?}, {} valid", data.data_type(), data.shape(), data.valid_count());
//! }
//! # Ok::<(), x3p::DecodeError>(())
//! ```

pub mod axes;
pub mod batch;
pub mod checksum;
pub mod container;
pub mod decode;
pub mod document;
pub mod encode;
pub mod record;
pub mod surface;
pub mod validate;
pub mod xml;

pub use axes::{Axes, Axis, AxisName, AxisType, DataType};
pub use container::Compression;
pub use decode::{decode, DecodeError, DecodeOptions, Decoder};
pub use document::Document;
pub use encode::{encode, EncodeError, EncodeOptions, Encoder};
pub use record::{
    ArrayStorage, DataLink, Dimension, FeatureType, Instrument, MatrixDimension, ProbingSystem,
    ProbingType, Record1, Record2, Record3, Record4, StorageMode,
};
pub use surface::{ArrayValues, LayoutError, SurfaceArray};
pub use validate::{Strictness, Warning};
