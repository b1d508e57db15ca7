//! Checking many files at once.
//!
//! With the `parallel` feature files are decoded on the rayon pool; without
//! it they are decoded one after another.  Either way the reports come back
//! in input order.

use std::path::{Path, PathBuf};

use crate::decode::{DecodeError, DecodeOptions};
use crate::document::Document;
use crate::validate::Warning;

/// Outcome of decoding one file.
#[derive(Debug)]
pub struct Report {
    pub path:    PathBuf,
    pub outcome: Result<Vec<Warning>, DecodeError>,
}

impl Report {
    /// Decoded without a fatal error and without warnings.
    pub fn is_clean(&self) -> bool {
        matches!(&self.outcome, Ok(w) if w.is_empty())
    }
}

fn check_one(path: &Path, options: &DecodeOptions) -> Report {
    let outcome = Document::open_with(path, options.clone()).map(|(_, warnings)| warnings);
    Report { path: path.to_path_buf(), outcome }
}

/// Decode every file in `paths` and collect the warnings of each.
pub fn verify_all(paths: &[PathBuf], options: &DecodeOptions) -> Vec<Report> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        paths.par_iter().map(|p| check_one(p, options)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        paths.iter().map(|p| check_one(p, options)).collect()
    }
}
