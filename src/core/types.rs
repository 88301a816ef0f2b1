//! Core value types that flow through the validation pipeline.
//!
//! Uploads, decompressed content and the format/compression tags are closed
//! types so every stage matches on them exhaustively instead of re-checking
//! filename suffixes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;

/// A file received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Original filename as sent by the client.
    pub filename: String,
    /// Raw request body for the file field.
    pub body: Bytes,
}

impl UploadedFile {
    /// Create a new uploaded file.
    pub fn new(filename: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            body: body.into(),
        }
    }

    /// Compression implied by the filename.
    pub fn compression(&self) -> Compression {
        Compression::from_filename(&self.filename)
    }

    /// Model encoding implied by the filename.
    pub fn format(&self) -> ModelFormat {
        ModelFormat::from_filename(&self.filename)
    }
}

/// Decompressed upload contents.
///
/// Cloning shares the underlying buffer, and every reader starts at offset 0,
/// so the parser and the structural checker can both scan it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompressedContent {
    data: Bytes,
}

impl DecompressedContent {
    /// Wrap already-decompressed bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Borrow the full contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copy the contents into a writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.data)
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the contents are empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Compression wrapper recognized from the filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compression {
    /// No compression suffix.
    None,
    /// `.gz`
    Gzip,
    /// `.bz2`
    Bzip2,
}

impl Compression {
    /// Detect compression from a filename suffix.
    pub fn from_filename(filename: &str) -> Self {
        if filename.ends_with(".gz") {
            Compression::Gzip
        } else if filename.ends_with(".bz2") {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }

    /// The suffix this compression adds to a filename.
    pub fn suffix(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
            Compression::Bzip2 => ".bz2",
        }
    }

    /// Remove the compression suffix from a filename, if any.
    pub fn strip(filename: &str) -> &str {
        let compression = Self::from_filename(filename);
        &filename[..filename.len() - compression.suffix().len()]
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Bzip2 => write!(f, "bzip2"),
        }
    }
}

/// Model encoding selected once per upload.
///
/// Only the `.json` suffix selects JSON; anything else is attempted as SBML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFormat {
    /// COBRA JSON document.
    Json,
    /// SBML markup.
    Sbml,
}

impl ModelFormat {
    /// Pick the format from a filename, ignoring compression suffixes.
    pub fn from_filename(filename: &str) -> Self {
        if Compression::strip(filename).ends_with(".json") {
            ModelFormat::Json
        } else {
            ModelFormat::Sbml
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFormat::Json => write!(f, "JSON"),
            ModelFormat::Sbml => write!(f, "SBML"),
        }
    }
}
