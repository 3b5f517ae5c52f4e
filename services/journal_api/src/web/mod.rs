pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_session;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use self::{auth::*, rest::*, state::AppState};

/// Voice notes are the largest uploads.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Builds the full application: public auth routes, guarded journal routes and Swagger UI.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("http://localhost:3000"))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Public routes (no session required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/status", get(status_handler))
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/verification-email", post(verification_email_handler))
        .route("/auth/password-reset", post(password_reset_handler));

    // Journal routes (verified session required)
    let protected_routes = Router::new()
        .route("/entries", get(list_entries_handler).post(create_entry_handler))
        .route("/entries/voice", post(create_voice_entry_handler))
        .route(
            "/entries/{id}",
            get(get_entry_handler).delete(delete_entry_handler),
        )
        .route(
            "/settings",
            get(get_settings_handler).patch(patch_settings_handler),
        )
        .route("/moods", get(list_moods_handler))
        .route("/moods/{date}", put(put_mood_handler))
        .route("/stats", get(stats_handler))
        .route("/eras", get(list_eras_handler))
        .route("/eras/generate", post(generate_eras_handler))
        .route("/eras/extend", post(extend_eras_handler))
        .route("/eras/{index}/toggle", post(toggle_era_handler))
        .route("/reports/{month}", get(monthly_report_handler))
        .route(
            "/notices",
            get(get_notice_handler).delete(dismiss_notice_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_session,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
