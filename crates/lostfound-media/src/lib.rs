//! # lostfound-media
//!
//! Uploaded-image validation and the image host that stores accepted images.

pub mod host;
pub mod upload;

pub use host::{
    sign_params, CloudinaryConfig, CloudinaryHost, DisabledImageHost, ImageHost, StoredImage,
};
pub use upload::{check_image_count, sanitize_filename, validate_image, ImageUpload};
