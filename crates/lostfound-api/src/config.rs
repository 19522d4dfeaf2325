//! Server configuration read from the environment.

use std::str::FromStr;

use tracing::warn;

use lostfound_core::defaults;

/// Which storage backend to serve from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Runtime configuration.
///
/// Environment variables:
///   DATABASE_URL               - PostgreSQL URL (postgres backend)
///   STORE_BACKEND              - "postgres" (default) or "memory"
///   HOST / PORT                - listen address (default 0.0.0.0:5000)
///   ALLOWED_ORIGINS            - comma-separated CORS whitelist
///   ADMIN_USERNAME             - admin login (default "admin")
///   ADMIN_PASSWORD             - admin password (default "admin123")
///   SESSION_TTL_SECS           - bearer session lifetime (default 7200)
///   OTP_TTL_SECS               - login code lifetime (default 300)
///   MATCH_ON_SUBMIT            - run match notification on submission (default false)
///   SMTP_HOST / SMTP_PORT      - relay (default smtp.gmail.com:587)
///   EMAIL_USER / EMAIL_PASS    - relay credentials; unset disables delivery
///   MAIL_FROM_NAME             - sender display name
///   FIREBASE_API_KEY           - identity provider web key
///   RATE_LIMIT_ENABLED         - global rate limit on/off (default true)
///   RATE_LIMIT_REQUESTS        - requests per period (default 100)
///   RATE_LIMIT_PERIOD_SECS     - period length (default 60)
///   MAINTENANCE_INTERVAL_SECS  - expired OTP/session purge interval (default 600)
///
/// Image host credentials (`CLOUD_*`) are read by the media crate.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub store_backend: StoreBackend,
    pub host: String,
    pub port: u16,
    pub allowed_origins: String,
    pub admin_username: String,
    pub admin_password: String,
    pub session_ttl_secs: i64,
    pub otp_ttl_secs: i64,
    pub match_on_submit: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub email_user: Option<String>,
    pub email_pass: Option<String>,
    pub mail_from_name: String,
    pub firebase_api_key: Option<String>,
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_period_secs: u64,
    pub maintenance_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/lostfound".to_string(),
            store_backend: StoreBackend::Postgres,
            host: "0.0.0.0".to_string(),
            port: defaults::PORT,
            allowed_origins: defaults::ALLOWED_ORIGINS.to_string(),
            admin_username: defaults::ADMIN_USERNAME.to_string(),
            admin_password: defaults::ADMIN_PASSWORD.to_string(),
            session_ttl_secs: defaults::SESSION_TTL_SECS,
            otp_ttl_secs: defaults::OTP_TTL_SECS,
            match_on_submit: false,
            smtp_host: defaults::SMTP_HOST.to_string(),
            smtp_port: defaults::SMTP_PORT,
            email_user: None,
            email_pass: None,
            mail_from_name: defaults::MAIL_FROM_NAME.to_string(),
            firebase_api_key: None,
            rate_limit_enabled: true,
            rate_limit_requests: 100,
            rate_limit_period_secs: 60,
            maintenance_interval_secs: defaults::MAINTENANCE_INTERVAL_SECS,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset or blank values take
    /// the default; unparsable numbers fall back to the default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let d = Self::default();

        let store_backend = match get("STORE_BACKEND").as_deref().map(str::trim) {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                warn!(value = other, "Unknown STORE_BACKEND, using postgres");
                StoreBackend::Postgres
            }
        };

        Self {
            database_url: get("DATABASE_URL").unwrap_or(d.database_url),
            store_backend,
            host: get("HOST").unwrap_or(d.host),
            port: parse_or("PORT", get("PORT"), d.port),
            allowed_origins: get("ALLOWED_ORIGINS").unwrap_or(d.allowed_origins),
            admin_username: get("ADMIN_USERNAME").unwrap_or(d.admin_username),
            admin_password: get("ADMIN_PASSWORD").unwrap_or(d.admin_password),
            session_ttl_secs: parse_positive(
                "SESSION_TTL_SECS",
                get("SESSION_TTL_SECS"),
                d.session_ttl_secs,
            ),
            otp_ttl_secs: parse_positive("OTP_TTL_SECS", get("OTP_TTL_SECS"), d.otp_ttl_secs),
            match_on_submit: get("MATCH_ON_SUBMIT")
                .map(|v| is_truthy(&v))
                .unwrap_or(d.match_on_submit),
            smtp_host: get("SMTP_HOST").unwrap_or(d.smtp_host),
            smtp_port: parse_or("SMTP_PORT", get("SMTP_PORT"), d.smtp_port),
            email_user: get("EMAIL_USER"),
            email_pass: get("EMAIL_PASS"),
            mail_from_name: get("MAIL_FROM_NAME").unwrap_or(d.mail_from_name),
            firebase_api_key: get("FIREBASE_API_KEY"),
            rate_limit_enabled: get("RATE_LIMIT_ENABLED")
                .map(|v| is_truthy(&v))
                .unwrap_or(d.rate_limit_enabled),
            rate_limit_requests: parse_positive(
                "RATE_LIMIT_REQUESTS",
                get("RATE_LIMIT_REQUESTS"),
                d.rate_limit_requests,
            ),
            rate_limit_period_secs: parse_positive(
                "RATE_LIMIT_PERIOD_SECS",
                get("RATE_LIMIT_PERIOD_SECS"),
                d.rate_limit_period_secs,
            ),
            maintenance_interval_secs: parse_positive(
                "MAINTENANCE_INTERVAL_SECS",
                get("MAINTENANCE_INTERVAL_SECS"),
                d.maintenance_interval_secs,
            ),
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs)
    }

    pub fn otp_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.otp_ttl_secs)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "true" | "1")
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key = %key, value = %raw, "Invalid number, using default");
            default
        }),
    }
}

fn parse_positive<T: FromStr + PartialOrd + Default + Copy>(
    key: &str,
    raw: Option<String>,
    default: T,
) -> T {
    let value = parse_or(key, raw, default);
    if value <= T::default() {
        warn!(key = %key, "Value must be positive, using default");
        return default;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 5000);
        assert_eq!(config.store_backend, StoreBackend::Postgres);
        assert_eq!(config.admin_username, "admin");
        assert_eq!(config.session_ttl_secs, 7200);
        assert_eq!(config.otp_ttl_secs, 300);
        assert!(!config.match_on_submit);
        assert!(config.rate_limit_enabled);
        assert!(config.email_user.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("STORE_BACKEND", "memory"),
            ("MATCH_ON_SUBMIT", "true"),
            ("RATE_LIMIT_ENABLED", "0"),
            ("EMAIL_USER", "desk@example.edu"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(config.match_on_submit);
        assert!(!config.rate_limit_enabled);
        assert_eq!(config.email_user.as_deref(), Some("desk@example.edu"));
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = config_from(&[
            ("PORT", "eighty"),
            ("RATE_LIMIT_REQUESTS", "0"),
            ("SESSION_TTL_SECS", ""),
        ]);
        assert_eq!(config.port, 5000);
        assert_eq!(config.rate_limit_requests, 100);
        assert_eq!(config.session_ttl_secs, 7200);
    }

    #[test]
    fn test_negative_ttls_fall_back() {
        let config = config_from(&[("SESSION_TTL_SECS", "-60"), ("OTP_TTL_SECS", "-1")]);
        assert_eq!(config.session_ttl_secs, 7200);
        assert_eq!(config.otp_ttl_secs, 300);
    }
}
