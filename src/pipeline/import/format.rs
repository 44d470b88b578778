use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ImportError;
use crate::models::DocumentKind;

/// Result of format detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatDetection {
    pub mime_type: String,
    pub kind: DocumentKind,
    /// For PDFs: whether the raw bytes carry text-drawing operators.
    pub has_text_layer: Option<bool>,
    pub file_size_bytes: u64,
}

pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024; // 100MB

/// Detect the document kind from magic bytes (NOT file extensions).
pub fn detect_bytes(bytes: &[u8]) -> FormatDetection {
    let header = &bytes[..bytes.len().min(8)];

    let (mime_type, kind, has_text_layer) = match header {
        // PDF: starts with %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => (
            "application/pdf",
            DocumentKind::Pdf,
            Some(pdf_has_text_markers(bytes)),
        ),
        // JPEG: starts with FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => ("image/jpeg", DocumentKind::Image, None),
        // PNG: starts with 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => ("image/png", DocumentKind::Image, None),
        // TIFF: little-endian (49 49 2A 00) or big-endian (4D 4D 00 2A)
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => {
            ("image/tiff", DocumentKind::Image, None)
        }
        // BMP: starts with "BM"
        [0x42, 0x4D, ..] => ("image/bmp", DocumentKind::Image, None),
        _ => ("application/octet-stream", DocumentKind::Unsupported, None),
    };

    FormatDetection {
        mime_type: mime_type.to_string(),
        kind,
        has_text_layer,
        file_size_bytes: bytes.len() as u64,
    }
}

/// Read a file and detect its kind. Returns the bytes so callers read once.
pub fn read_document(path: &Path) -> Result<(Vec<u8>, FormatDetection), ImportError> {
    let size = std::fs::metadata(path)?.len();
    if size > MAX_FILE_SIZE {
        return Err(ImportError::FileTooLarge {
            size_mb: size as f64 / (1024.0 * 1024.0),
            max_mb: MAX_FILE_SIZE / (1024 * 1024),
        });
    }
    if size == 0 {
        return Err(ImportError::EmptyFile);
    }

    let bytes = std::fs::read(path)?;
    let detection = detect_bytes(&bytes);
    tracing::debug!(
        path = %path.display(),
        mime = %detection.mime_type,
        kind = detection.kind.as_str(),
        "Detected document format"
    );
    Ok((bytes, detection))
}

/// Heuristic for digital vs scanned PDFs: count text operators in the
/// first 256KB of raw bytes.
fn pdf_has_text_markers(bytes: &[u8]) -> bool {
    let limit = bytes.len().min(256 * 1024);
    let content = String::from_utf8_lossy(&bytes[..limit]);

    // BT/ET = begin/end text, Tj/TJ = show text, Tf = set font
    let text_markers = ["BT", "ET", " Tj", " TJ", " Tf"];
    let marker_count: usize = text_markers
        .iter()
        .map(|m| content.matches(m).count())
        .sum();

    // >= 3 markers suggests a text layer
    marker_count >= 3
}
