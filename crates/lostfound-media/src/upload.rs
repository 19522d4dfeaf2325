//! Validation of uploaded images.
//!
//! Content is identified by magic bytes, never by the client-supplied name or
//! content type.

use lostfound_core::{defaults, Error, Result};

/// An image accepted for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    /// Sanitized original filename.
    pub filename: String,
    /// Detected MIME type.
    pub content_type: String,
    /// Detected extension (`jpg` or `png`).
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// Reject a submission carrying more images than an item may hold.
pub fn check_image_count(count: usize) -> Result<()> {
    if count > defaults::MAX_IMAGES_PER_ITEM {
        return Err(Error::InvalidInput(format!(
            "Too many images (max {})",
            defaults::MAX_IMAGES_PER_ITEM
        )));
    }
    Ok(())
}

/// Validate one uploaded image: non-empty, within the size limit, and a JPEG
/// or PNG by content.
pub fn validate_image(filename: Option<&str>, bytes: Vec<u8>) -> Result<ImageUpload> {
    if bytes.is_empty() {
        return Err(Error::InvalidInput("Empty file".to_string()));
    }
    if bytes.len() > defaults::MAX_IMAGE_BYTES {
        return Err(Error::InvalidInput("File too large (max 5 MB)".to_string()));
    }

    let kind = infer::get(&bytes)
        .filter(|k| defaults::ALLOWED_IMAGE_FORMATS.contains(&k.extension()))
        .ok_or_else(|| {
            Error::InvalidInput("Unsupported image format (allowed: jpg, jpeg, png)".to_string())
        })?;

    Ok(ImageUpload {
        filename: sanitize_filename(filename.unwrap_or_default()),
        content_type: kind.mime_type().to_string(),
        extension: kind.extension().to_string(),
        bytes,
    })
}

/// Sanitize a filename for safe forwarding.
///
/// Strips path components and replaces characters that are unsafe in
/// filenames.
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim();
    if sanitized.is_empty() {
        return "upload".to_string();
    }
    sanitized.chars().take(128).collect()
}
