use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::error;

use crate::services::auth_service::{get_auth_token, validate_session_token};

/// Require a valid session token on every request and hand its claims to the
/// downstream handler via request extensions.
pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    // 1. Get the auth token from the request
    let token = match get_auth_token(&req) {
        Ok(token) => token,
        Err(_) => return Err(StatusCode::UNAUTHORIZED),
    };

    // 2. Validate it against the shared secret
    let claims = match validate_session_token(&token).await {
        Ok(claims) => claims,
        Err(e) => {
            error!("Token validation failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 3. Make the claims available to handlers
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
