use crate::{
    application::AccountService,
    infrastructure::{auth::AuthService, middleware::api_version_header},
    web::handlers::*,
};
use axum::{
    extract::FromRef,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub account_service: Arc<AccountService>,
    pub auth_service: Arc<AuthService>,
}

/// Version 1 of the public API, mounted under `/api/v1`.
fn api_v1() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/accounts", get(get_all_accounts).post(create_account))
        .route("/accounts/interest-rates", get(get_interest_rates))
        .route(
            "/accounts/{id}",
            get(get_account).put(update_account).delete(close_account),
        )
        .route("/accounts/{id}/interest", post(calculate_interest))
}

pub fn create_router(state: AppState, cors_allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .nest("/api/v1", api_v1())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors_allowed_origins))
                .layer(CompressionLayer::new())
                .layer(middleware::from_fn(api_version_header)),
        )
        .with_state(state)
}

/// Permissive when no origins are configured, otherwise an allow-list.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
