//! The zip container around `main.xml` and its payload members.
//!
//! Both directions work on in-memory buffers; handles are scoped to the
//! reader/writer values and released on every return path.

use std::io::{self, Cursor, Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Not a zip archive: {0}")]
    NotAnArchive(String),
    #[error("Required member {0:?} is missing")]
    MissingMember(String),
    #[error("Zip error: {0}")]
    Zip(#[from] ZipError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Most bytes reserved up front for one member.  The declared size comes
/// from the archive header and is not trusted beyond this.
const PREALLOC_LIMIT: u64 = 1 << 26;

fn initial_capacity(declared: u64) -> usize {
    usize::try_from(declared.min(PREALLOC_LIMIT)).unwrap_or(0)
}

/// Compression applied to every member written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compression {
    Stored,
    #[default]
    Deflated,
}

impl Compression {
    fn method(self) -> CompressionMethod {
        match self {
            Compression::Stored   => CompressionMethod::Stored,
            Compression::Deflated => CompressionMethod::Deflated,
        }
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct ContainerReader<'a> {
    zip: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> ContainerReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, ContainerError> {
        let zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ContainerError::NotAnArchive(e.to_string()))?;
        Ok(Self { zip })
    }

    pub fn names(&self) -> Vec<String> {
        self.zip.file_names().map(str::to_owned).collect()
    }

    /// Read a member; `None` if absent.  Windows-style separators in `name`
    /// are tried as forward slashes too.
    pub fn member(&mut self, name: &str) -> Result<Option<Vec<u8>>, ContainerError> {
        let normalized = name.trim().replace('\\', "/");
        for candidate in [name.trim(), normalized.as_str()] {
            match self.zip.by_name(candidate) {
                Ok(mut file) => {
                    let mut buf = Vec::with_capacity(initial_capacity(file.size()));
                    file.read_to_end(&mut buf)?;
                    return Ok(Some(buf));
                }
                Err(ZipError::FileNotFound) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// Read a member that must be present.
    pub fn require(&mut self, name: &str) -> Result<Vec<u8>, ContainerError> {
        self.member(name)?
            .ok_or_else(|| ContainerError::MissingMember(name.to_owned()))
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ContainerWriter {
    zip:     ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
}

impl ContainerWriter {
    pub fn new(compression: Compression) -> Self {
        Self {
            zip:     ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default().compression_method(compression.method()),
        }
    }

    pub fn add(&mut self, name: &str, data: &[u8]) -> Result<(), ContainerError> {
        self.zip.start_file(name, self.options)?;
        self.zip.write_all(data)?;
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>, ContainerError> {
        Ok(self.zip.finish()?.into_inner())
    }
}
