//! Submission validation: the only way a `Document` comes into existence.
//!
//! Checks run in a fixed order (empty, size, media type) so the first
//! client-correctable problem is the one reported. Magic bytes outrank the
//! declared type; a declared type is only trusted when the content carries
//! no recognizable signature.

use std::path::Path;

use chrono::Utc;
use thiserror::Error;

use super::fingerprint::fingerprint;
use crate::models::{Document, MediaType, Submission};

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntakeError {
    #[error("Document content is empty")]
    EmptyContent,

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Document is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },

    #[error("Declared media type {declared} contradicts detected {detected}")]
    MediaTypeMismatch { declared: String, detected: String },
}

/// Validate a submission and build the immutable `Document`.
pub fn accept(submission: Submission, max_bytes: usize) -> Result<Document, IntakeError> {
    let Submission {
        content,
        filename,
        media_type,
    } = submission;

    if content.is_empty() {
        return Err(IntakeError::EmptyContent);
    }
    if content.len() > max_bytes {
        return Err(IntakeError::TooLarge {
            size: content.len(),
            max: max_bytes,
        });
    }

    let filename = sanitize_filename(&filename);
    let media_type = resolve_media_type(&content, &filename, &media_type)?;
    let fp = fingerprint(&content);

    tracing::debug!(
        fingerprint = %fp,
        media_type = %media_type,
        size = content.len(),
        "Submission accepted"
    );

    Ok(Document::new(content, fp, filename, media_type, Utc::now()))
}

fn resolve_media_type(
    content: &[u8],
    filename: &str,
    declared_raw: &str,
) -> Result<MediaType, IntakeError> {
    let declared = MediaType::parse(declared_raw);
    let sniffed = sniff_media_type(content).map(MediaType::parse);

    if declared.as_str().is_empty() || declared.as_str() == OCTET_STREAM {
        let resolved = sniffed.or_else(|| guess_from_filename(filename));
        return match resolved {
            Some(mt) if mt.is_recognized() => Ok(mt),
            Some(mt) => Err(IntakeError::UnsupportedMediaType(mt.to_string())),
            None => Err(IntakeError::UnsupportedMediaType(
                if declared.as_str().is_empty() {
                    "unknown".to_string()
                } else {
                    declared.to_string()
                },
            )),
        };
    }

    if !declared.is_recognized() {
        return Err(IntakeError::UnsupportedMediaType(declared.to_string()));
    }

    match sniffed {
        Some(detected) if detected.is_pdf() != declared.is_pdf() => {
            Err(IntakeError::MediaTypeMismatch {
                declared: declared.to_string(),
                detected: detected.to_string(),
            })
        }
        // Both images: the signature names the real subtype.
        Some(detected) => Ok(detected),
        None => Ok(declared),
    }
}

/// Detect a supported format from magic bytes (NOT file extensions).
pub fn sniff_media_type(content: &[u8]) -> Option<&'static str> {
    match content {
        // PDF: %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => Some(MediaType::PDF),
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // TIFF: little-endian (49 49 2A 00) or big-endian (4D 4D 00 2A)
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Some("image/tiff"),
        // WebP: RIFF....WEBP
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        // BMP: BM
        [b'B', b'M', ..] => Some("image/bmp"),
        _ => None,
    }
}

fn guess_from_filename(filename: &str) -> Option<MediaType> {
    mime_guess::from_path(filename)
        .first_raw()
        .map(MediaType::parse)
}

/// Sanitize a filename: strip path components, limit length.
pub fn sanitize_filename(original: &str) -> String {
    let name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");

    let clean: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0') && !c.is_control())
        .take(255)
        .collect();

    if clean.trim().is_empty() {
        "document".to_string()
    } else {
        clean
    }
}
