//! services/journal_api/src/web/auth.rs
//!
//! Authentication endpoints. Every handler delegates to the `AuthSessionMonitor`,
//! which owns the session; handlers only translate results to HTTP.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use mood_journal_core::{AuthSnapshot, IdentityError, IdentityErrorClass, RefreshOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;

use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthStatusResponse {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub is_verified: bool,
    pub is_online: bool,
    /// Whether verification is still being polled for.
    pub reconciling: bool,
}

#[derive(Serialize, ToSchema)]
pub struct RefreshResponse {
    /// One of `reconciled`, `throttled`, `offline`, `not_applicable`.
    #[schema(value_type = String)]
    pub outcome: RefreshOutcome,
    pub status: AuthStatusResponse,
}

impl AuthStatusResponse {
    fn new(snapshot: AuthSnapshot, reconciling: bool) -> Self {
        let (user_id, email) = match snapshot.user {
            Some(user) => (Some(user.user_id), Some(user.email)),
            None => (None, None),
        };
        Self {
            user_id,
            email,
            is_verified: snapshot.is_verified,
            is_online: snapshot.is_online,
            reconciling,
        }
    }
}

fn status(state: &AppState) -> AuthStatusResponse {
    AuthStatusResponse::new(state.session.snapshot(), state.session.is_reconciling())
}

/// Retryable failures are 503; fatal ones get a status matching the code.
pub(crate) fn identity_error(e: IdentityError) -> (StatusCode, String) {
    let code = match (&e, e.class()) {
        (_, IdentityErrorClass::Retryable) => StatusCode::SERVICE_UNAVAILABLE,
        (IdentityError::InvalidCredential | IdentityError::SessionExpired, _) => {
            StatusCode::UNAUTHORIZED
        }
        (IdentityError::UserNotFound, _) => StatusCode::NOT_FOUND,
        (IdentityError::EmailInUse, _) => StatusCode::CONFLICT,
        (IdentityError::WeakPassword, _) => StatusCode::BAD_REQUEST,
        (IdentityError::UserDisabled, _) => StatusCode::FORBIDDEN,
        _ => StatusCode::BAD_GATEWAY,
    };
    warn!("Identity request failed: {}", e);
    (code, e.user_message().to_string())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create an account and send the verification email
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "Account created", body = AuthStatusResponse),
        (status = 400, description = "Password too weak"),
        (status = 409, description = "Email already in use"),
        (status = 503, description = "Identity provider unreachable")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let snapshot = state
        .session
        .sign_up(&req.email, &req.password)
        .await
        .map_err(identity_error)?;
    let response = AuthStatusResponse::new(snapshot, state.session.is_reconciling());
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /auth/login - Sign in with an existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthStatusResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 503, description = "Identity provider unreachable")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<AuthStatusResponse>, (StatusCode, String)> {
    let snapshot = state
        .session
        .sign_in(&req.email, &req.password)
        .await
        .map_err(identity_error)?;
    Ok(Json(AuthStatusResponse::new(
        snapshot,
        state.session.is_reconciling(),
    )))
}

/// POST /auth/logout - Sign out; always succeeds locally
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 200, description = "Signed out", body = AuthStatusResponse))
)]
pub async fn logout_handler(State(state): State<Arc<AppState>>) -> Json<AuthStatusResponse> {
    let snapshot = state.session.sign_out().await;
    Json(AuthStatusResponse::new(snapshot, false))
}

/// GET /auth/status - The current session snapshot
#[utoipa::path(
    get,
    path = "/auth/status",
    responses((status = 200, description = "Current session", body = AuthStatusResponse))
)]
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<AuthStatusResponse> {
    Json(status(&state))
}

/// POST /auth/refresh - Re-check email verification now
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses((status = 200, description = "Refresh attempted", body = RefreshResponse))
)]
pub async fn refresh_handler(State(state): State<Arc<AppState>>) -> Json<RefreshResponse> {
    let outcome = state.session.refresh_now().await;
    Json(RefreshResponse {
        outcome,
        status: status(&state),
    })
}

/// POST /auth/verification-email - Send the verification email again
#[utoipa::path(
    post,
    path = "/auth/verification-email",
    responses(
        (status = 202, description = "Email sent"),
        (status = 401, description = "Session expired"),
        (status = 503, description = "Identity provider unreachable")
    )
)]
pub async fn verification_email_handler(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .session
        .send_verification_email()
        .await
        .map_err(identity_error)?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /auth/password-reset - Email a password reset link
#[utoipa::path(
    post,
    path = "/auth/password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 202, description = "Email sent"),
        (status = 404, description = "No account for this email"),
        (status = 503, description = "Identity provider unreachable")
    )
)]
pub async fn password_reset_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .session
        .send_password_reset(&req.email)
        .await
        .map_err(identity_error)?;
    Ok(StatusCode::ACCEPTED)
}
