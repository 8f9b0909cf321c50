//! Schematic upload value type and acceptance rules.
//!
//! The service never parses schematic binaries; the in-browser front end owns
//! the format. What the domain enforces is which uploads are worth handing to
//! a render page at all: a recognized file extension, a non-empty body, and a
//! size below the request bound.

use bytes::Bytes;
use thiserror::Error;

/// File extensions the rendering front end can load.
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["schem", "litematic"];

#[derive(Debug, Error)]
pub enum SchematicError {
    #[error("unsupported schematic format `{extension}`, supported: {supported}")]
    UnsupportedFormat {
        extension: String,
        supported: String,
    },
    #[error("schematic file is empty")]
    Empty,
    #[error("schematic is {size} bytes and exceeds the {limit}-byte upload limit")]
    TooLarge { size: u64, limit: u64 },
}

/// A schematic file as received from a caller, prior to rendering.
#[derive(Debug, Clone)]
pub struct SchematicUpload {
    pub filename: String,
    pub bytes: Bytes,
}

impl SchematicUpload {
    pub fn new(filename: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// The final extension of the uploaded filename, lowercased.
    pub fn extension(&self) -> Option<String> {
        let (stem, extension) = self.filename.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Some(extension.to_ascii_lowercase())
    }

    /// Filename without its final extension, used to name rendered output.
    pub fn stem(&self) -> &str {
        match self.filename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.filename,
        }
    }

    /// Reject uploads the front end cannot load or the service will not carry.
    pub fn validate(&self, max_bytes: u64) -> Result<(), SchematicError> {
        let extension = self.extension().unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(SchematicError::UnsupportedFormat {
                extension,
                supported: SUPPORTED_EXTENSIONS.join(", "),
            });
        }

        if self.bytes.is_empty() {
            return Err(SchematicError::Empty);
        }

        let size = self.bytes.len() as u64;
        if size > max_bytes {
            return Err(SchematicError::TooLarge {
                size,
                limit: max_bytes,
            });
        }

        Ok(())
    }
}
