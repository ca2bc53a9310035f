//! Boundary to the external image decoder.
//!
//! Format sniffing and decoding are delegated to the `image` crate; this
//! module only maps its failures onto [`UtsuruError`] and holds the upload
//! extension policy.

use std::path::Path;

use image::DynamicImage;
use tracing::debug;

use crate::error::{Result, UtsuruError};

/// File extensions accepted for upload (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// Decode raw bytes into an in-memory image.
///
/// Empty input is reported as [`UtsuruError::EmptyImage`]; anything the
/// decoder rejects as [`UtsuruError::Decode`].
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    if data.is_empty() {
        return Err(UtsuruError::EmptyImage);
    }

    let image = image::load_from_memory(data)?;
    debug!(
        width = image.width(),
        height = image.height(),
        bytes = data.len(),
        "Decoded image"
    );
    Ok(image)
}

/// Check whether a filename carries one of the supported image extensions.
pub fn is_supported_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// Check if the provided bytes appear to be a format the decoder recognises.
pub fn is_supported_format(data: &[u8]) -> bool {
    image::guess_format(data).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions_case_insensitive() {
        assert!(is_supported_extension("cat.jpg"));
        assert!(is_supported_extension("cat.JPEG"));
        assert!(is_supported_extension("holiday.photo.Png"));
        assert!(is_supported_extension("anim.gif"));
    }

    #[test]
    fn test_unsupported_extensions() {
        assert!(!is_supported_extension("notes.txt"));
        assert!(!is_supported_extension("image.webp"));
        assert!(!is_supported_extension("jpg"));
        assert!(!is_supported_extension("archive.jpg.zip"));
        assert!(!is_supported_extension(""));
    }

    #[test]
    fn test_is_supported_format() {
        // PNG magic bytes
        assert!(is_supported_format(&[
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A
        ]));

        // JPEG magic bytes
        assert!(is_supported_format(&[0xFF, 0xD8, 0xFF]));

        // Invalid
        assert!(!is_supported_format(&[0x00, 0x00, 0x00]));
    }

    #[test]
    fn test_decode_empty_input() {
        assert!(matches!(decode_image(&[]), Err(UtsuruError::EmptyImage)));
    }

    #[test]
    fn test_decode_truncated_png() {
        let truncated = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
        assert!(matches!(
            decode_image(&truncated),
            Err(UtsuruError::Decode(_))
        ));
    }
}
