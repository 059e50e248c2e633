#![forbid(unsafe_code)]

//! `.blb` framing: one uncompressed JSON header line, then the body.
//!
//! ```text
//! {"editorVersionTag":"blb-0.2.1","isCompressed":true}\n
//! <gzip(FileData JSON)>            (or plain JSON when isCompressed=false)
//! ```
//!
//! The whole file is encoded into memory, written to a sibling
//! `<name>.blb.tmp`, then renamed over the destination. A failed write
//! leaves the previous file intact.

use std::ffi::OsString;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{BlbError, FormatError, Result};
use crate::level::{EDITOR_VERSION_TAG, FileData, FileHeader};

const TARGET: &str = "blb.format";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Non-fatal findings while decoding. Loading proceeds; the caller is
/// expected to surface them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatWarning {
    /// The file was written by a different editor build.
    VersionTagMismatch { found: String, expected: String },
    /// `isCompressed` disagrees with the body bytes; the bytes won.
    CompressionFlagMismatch { header_says: bool },
}

impl fmt::Display for FormatWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionTagMismatch { found, expected } => write!(
                f,
                "file was written by editor version {found} (this is {expected})"
            ),
            Self::CompressionFlagMismatch { header_says } => write!(
                f,
                "header claims isCompressed={header_says} but the body disagrees"
            ),
        }
    }
}

/// Result of [`decode`].
#[derive(Debug, Clone)]
pub struct DecodedFile {
    pub header: FileHeader,
    pub data: FileData,
    pub warnings: Vec<FormatWarning>,
}

/// Encode a complete file image.
pub fn encode(header: &FileHeader, data: &FileData) -> Result<Vec<u8>> {
    let mut out = serde_json::to_vec(header).map_err(FormatError::InvalidHeader)?;
    out.push(b'\n');

    let body = serde_json::to_vec(data).map_err(FormatError::InvalidBody)?;
    if header.is_compressed {
        let mut encoder = GzEncoder::new(out, Compression::default());
        encoder.write_all(&body).map_err(FormatError::Compression)?;
        out = encoder.finish().map_err(FormatError::Compression)?;
    } else {
        out.extend_from_slice(&body);
    }

    tracing::trace!(
        target: TARGET,
        bytes = out.len(),
        compressed = header.is_compressed,
        "encoded file"
    );
    Ok(out)
}

/// Decode a complete file image written by this build.
pub fn decode(bytes: &[u8]) -> Result<DecodedFile> {
    decode_with_tag(bytes, EDITOR_VERSION_TAG)
}

/// Decode a complete file image, warning when the header's tag is not
/// `expected`.
///
/// Only the first `\n` separates header from body; a gzip body may contain
/// further newline bytes.
pub fn decode_with_tag(bytes: &[u8], expected: &str) -> Result<DecodedFile> {
    let split = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(FormatError::MissingSeparator)?;
    let (head, rest) = bytes.split_at(split);
    let body = &rest[1..];

    let header: FileHeader = serde_json::from_slice(head).map_err(FormatError::InvalidHeader)?;
    let mut warnings = Vec::new();

    if header.editor_version_tag != expected {
        tracing::warn!(
            target: TARGET,
            found = %header.editor_version_tag,
            expected,
            "editor version tag mismatch"
        );
        warnings.push(FormatWarning::VersionTagMismatch {
            found: header.editor_version_tag.clone(),
            expected: expected.to_string(),
        });
    }

    let looks_gzip = body.starts_with(&GZIP_MAGIC);
    if looks_gzip != header.is_compressed {
        tracing::warn!(
            target: TARGET,
            header_says = header.is_compressed,
            "compression flag disagrees with body"
        );
        warnings.push(FormatWarning::CompressionFlagMismatch {
            header_says: header.is_compressed,
        });
    }

    let data: FileData = if looks_gzip {
        let mut json = Vec::new();
        GzDecoder::new(body)
            .read_to_end(&mut json)
            .map_err(FormatError::Compression)?;
        serde_json::from_slice(&json).map_err(FormatError::InvalidBody)?
    } else {
        serde_json::from_slice(body).map_err(FormatError::InvalidBody)?
    };

    for problem in data.validate() {
        tracing::warn!(target: TARGET, %problem, "inconsistent version graph");
    }

    Ok(DecodedFile {
        header,
        data,
        warnings,
    })
}

/// Read and decode the file at `path`.
pub fn read_file(path: &Path) -> Result<DecodedFile> {
    read_file_with_tag(path, EDITOR_VERSION_TAG)
}

/// [`read_file`] for an editor that stamps `expected` into its headers.
pub fn read_file_with_tag(path: &Path, expected: &str) -> Result<DecodedFile> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => BlbError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => BlbError::Io(e),
    })?;
    decode_with_tag(&bytes, expected)
}

/// Sibling path the image is staged at before the rename.
#[must_use]
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Encode fully, write to [`staging_path`], then rename over `path`.
pub fn write_file(path: &Path, header: &FileHeader, data: &FileData) -> Result<()> {
    let bytes = encode(header, data)?;
    let staged = staging_path(path);
    if let Err(e) = std::fs::write(&staged, &bytes).and_then(|()| std::fs::rename(&staged, path)) {
        let _ = std::fs::remove_file(&staged);
        return Err(e.into());
    }
    tracing::debug!(target: TARGET, path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}
