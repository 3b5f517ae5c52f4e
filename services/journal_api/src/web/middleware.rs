//! services/journal_api/src/web/middleware.rs
//!
//! Session guard for the journal routes.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::web::state::AppState;

/// Rejects the request unless a verified user is signed in.
///
/// Signed out is 401; signed in with an unverified email is 403.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let snapshot = state.session.snapshot();
    if snapshot.user.is_none() {
        debug!("Rejecting {} while signed out.", req.uri().path());
        return Err((StatusCode::UNAUTHORIZED, "Sign in first.".to_string()));
    }
    if !snapshot.is_verified {
        return Err((
            StatusCode::FORBIDDEN,
            "Verify your email address to continue.".to_string(),
        ));
    }

    Ok(next.run(req).await)
}
