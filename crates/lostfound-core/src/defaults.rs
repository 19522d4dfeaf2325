//! Centralized default constants for the lost & found service.
//!
//! Crates reference these instead of defining their own magic numbers.

// =============================================================================
// ITEMS
// =============================================================================

/// Category assigned when a submission omits one.
pub const CATEGORY: &str = "Other";

/// Moderator name recorded when the admin does not supply one.
pub const MODERATOR_NAME: &str = "Admin";

// =============================================================================
// UPLOADS
// =============================================================================

/// Maximum number of images attached to one submission.
pub const MAX_IMAGES_PER_ITEM: usize = 5;

/// Maximum size of a single uploaded image (5 MiB).
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Image formats accepted by the image host.
pub const ALLOWED_IMAGE_FORMATS: &[&str] = &["jpg", "png", "jpeg"];

/// Folder uploaded images are placed in on the image host.
pub const IMAGE_FOLDER: &str = "lost-and-found";

// =============================================================================
// AUTH
// =============================================================================

/// Lifetime of an admin or user session token (2 hours).
pub const SESSION_TTL_SECS: i64 = 2 * 60 * 60;

/// Lifetime of a one-time login code (5 minutes).
pub const OTP_TTL_SECS: i64 = 5 * 60;

/// Failed verification attempts after which an OTP is discarded.
pub const OTP_MAX_ATTEMPTS: i32 = 5;

/// Prefix of issued session tokens.
pub const SESSION_TOKEN_PREFIX: &str = "lf_at_";

/// Random characters following the session token prefix.
pub const SESSION_TOKEN_LEN: usize = 48;

/// Admin username when `ADMIN_USERNAME` is unset.
pub const ADMIN_USERNAME: &str = "admin";

/// Admin password when `ADMIN_PASSWORD` is unset.
pub const ADMIN_PASSWORD: &str = "admin123";

// =============================================================================
// MAIL
// =============================================================================

/// Display name on outbound mail.
pub const MAIL_FROM_NAME: &str = "Lost & Found";

/// SMTP relay host when `SMTP_HOST` is unset.
pub const SMTP_HOST: &str = "smtp.gmail.com";

/// SMTP submission port (STARTTLS).
pub const SMTP_PORT: u16 = 587;

// =============================================================================
// SERVER
// =============================================================================

/// HTTP listen port when `PORT` is unset.
pub const PORT: u16 = 5000;

/// Origins allowed by CORS when `ALLOWED_ORIGINS` is unset.
pub const ALLOWED_ORIGINS: &str = "http://localhost:3000,https://lostfound-api.netlify.app";

/// Interval between expired OTP/session sweeps.
pub const MAINTENANCE_INTERVAL_SECS: u64 = 10 * 60;
