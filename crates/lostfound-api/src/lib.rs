//! # lostfound-api
//!
//! HTTP surface of the lost & found service: routes, extractors and
//! middleware over the storage, notification and media crates.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod services;

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use governor::{Quota, RateLimiter};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use lostfound_core::defaults;
use lostfound_db::Stores;
use lostfound_media::ImageHost;
use lostfound_notify::{Mailer, MatchNotifier};

pub use auth::AdminCredentials;
pub use config::{AppConfig, StoreBackend};
pub use error::ApiError;
use services::IdentityProvider;

/// Request body ceiling: five full-size images plus form fields.
pub const MAX_BODY_BYTES: usize = defaults::MAX_IMAGES_PER_ITEM * defaults::MAX_IMAGE_BYTES + 1024 * 1024;

/// Request ID generator using UUIDv7 for time-ordered tracing.
#[derive(Clone, Copy)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

pub type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub mailer: Arc<dyn Mailer>,
    pub images: Arc<dyn ImageHost>,
    pub identity: Arc<dyn IdentityProvider>,
    pub notifier: MatchNotifier,
    pub admin: Arc<AdminCredentials>,
    pub config: Arc<AppConfig>,
    /// None when rate limiting is disabled.
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        stores: Stores,
        mailer: Arc<dyn Mailer>,
        images: Arc<dyn ImageHost>,
        identity: Arc<dyn IdentityProvider>,
    ) -> lostfound_core::Result<Self> {
        let admin = AdminCredentials::new(&config.admin_username, &config.admin_password)?;
        let notifier = MatchNotifier::new(stores.items.clone(), mailer.clone());
        let rate_limiter = build_rate_limiter(&config);

        Ok(Self {
            stores,
            mailer,
            images,
            identity,
            notifier,
            admin: Arc::new(admin),
            config: Arc::new(config),
            rate_limiter,
        })
    }
}

fn build_rate_limiter(config: &AppConfig) -> Option<Arc<GlobalRateLimiter>> {
    if !config.rate_limit_enabled {
        return None;
    }
    let burst = NonZeroU32::new(config.rate_limit_requests)?;
    let period = Duration::from_secs(config.rate_limit_period_secs) / burst.get();
    let quota = Quota::with_period(period)?.allow_burst(burst);
    Some(Arc::new(RateLimiter::direct(quota)))
}

/// Parse a comma-separated origin list. Invalid entries are skipped with a
/// warning.
pub fn parse_allowed_origins(origins: &str) -> Vec<HeaderValue> {
    origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            warn!(subsystem = "api", "Rate limit exceeded");
            return Err(ApiError::TooManyRequests);
        }
    }
    Ok(next.run(request).await)
}

async fn root() -> &'static str {
    "Lost & Found API running!"
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "message": "Route not found" })),
    )
}

/// Assemble the router with all middleware.
pub fn build_router(state: AppState) -> Router {
    use handlers::{admin, auth, items};

    let allowed_origins = parse_allowed_origins(&state.config.allowed_origins);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        // Items
        .route("/api/items", post(items::submit_item).get(items::list_items))
        .route("/api/categories", get(items::list_categories))
        .route("/api/items/:id/resolve", put(items::resolve_own_item))
        .route("/api/items/:id/claim", put(items::claim_item))
        // Admin
        .route("/api/admin/login", post(admin::login))
        .route("/api/admin/logout", post(admin::logout))
        .route("/api/admin/items", get(admin::list_all_items))
        .route("/api/admin/items/:id", delete(admin::delete_item))
        .route("/api/admin/items/:id/moderate", put(admin::moderate_item))
        .route("/api/admin/items/:id/resolve", put(admin::resolve_item))
        .route(
            "/api/admin/items/:id/found-by-security",
            put(admin::set_found_by_security),
        )
        // End-user auth
        .route("/api/auth/send-otp", post(auth::send_otp))
        .route("/api/auth/verify-otp", post(auth::verify_otp))
        .route("/api/auth/submit", post(auth::submit_report))
        .route("/api/auth/upload-profile", post(auth::upload_profile))
        .fallback(not_found)
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(allowed_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .allow_credentials(true)
                .max_age(Duration::from_secs(3600)),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
