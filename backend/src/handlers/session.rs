//! Session helpers for the browser UI

use axum::extract::State;
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::{csrf_token, CurrentUser};
use crate::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

/// Token the UI must echo in `X-CSRF-Token` on mutating requests
pub async fn get_csrf_token(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<ApiResponse<CsrfTokenResponse>> {
    let token = csrf_token(&state.config.session.csrf_secret, current_user.0.user_id)?;
    Ok(ApiResponse::new("CSRF token issued", CsrfTokenResponse { csrf_token: token }))
}
