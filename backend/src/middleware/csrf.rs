//! CSRF protection for mutating requests
//!
//! The token is `base64(HMAC-SHA256(csrf_secret, user_id))`, so it is
//! stable for a session and needs no server-side storage.

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::AppState;

pub const CSRF_HEADER: &str = "x-csrf-token";

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str, user_id: Uuid) -> Result<HmacSha256, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("Failed to create HMAC".to_string()))?;
    mac.update(user_id.as_bytes());
    Ok(mac)
}

/// Token the UI must echo in `X-CSRF-Token`
pub fn csrf_token(secret: &str, user_id: Uuid) -> Result<String, AppError> {
    let mac = mac_for(secret, user_id)?;
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a submitted token
pub fn verify_csrf_token(secret: &str, user_id: Uuid, token: &str) -> bool {
    let Ok(submitted) = BASE64.decode(token.trim()) else {
        return false;
    };
    match mac_for(secret, user_id) {
        Ok(mac) => mac.verify_slice(&submitted).is_ok(),
        Err(_) => false,
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Rejects mutating requests without a valid token. Must run after
/// [`super::auth_middleware`].
pub async fn csrf_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if is_safe(request.method()) {
        return next.run(request).await;
    }

    let Some(user_id) = request.extensions().get::<AuthUser>().map(|u| u.user_id) else {
        return AppError::Unauthorized("Authentication required".to_string()).into_response();
    };

    let token = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok());

    match token {
        Some(token) if verify_csrf_token(&state.config.session.csrf_secret, user_id, token) => {
            next.run(request).await
        }
        _ => {
            tracing::warn!(%user_id, method = %request.method(), uri = %request.uri(), "CSRF check failed");
            AppError::InvalidCsrfToken.into_response()
        }
    }
}
