use std::time::Duration;

use axum::http::{self};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::info;

use crate::models::Role;

/// Claims carried by a session token minted by the auth collaborator. The hub
/// only validates; it never issues tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub role: Role,
    #[serde(default)]
    pub session_id: Option<i64>,
    #[serde(default)]
    pub team_id: Option<i64>,
    pub exp: usize,
}

/// Cache of already-validated tokens, so heartbeat-frequency reconnects do
/// not re-verify the signature every time.
static CLAIMS_CACHE: OnceCell<Cache<String, SessionClaims>> = OnceCell::const_new();

/// Initialize the claims cache. Call once at application startup.
pub async fn init_claims_cache() {
    CLAIMS_CACHE
        .get_or_init(|| async {
            Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(60))
                .build()
        })
        .await;
    info!("Claims cache initialized");
}

fn get_claims_cache() -> Option<&'static Cache<String, SessionClaims>> {
    CLAIMS_CACHE.get()
}

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str =
            auth_header.to_str().map_err(|_| "Invalid Authorization header".to_string())?;
        Ok(auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).to_string())
    }
    // 2. Try to get token from cookies
    else {
        let cookie_header = req
            .headers()
            .get(http::header::COOKIE)
            .ok_or_else(|| "Missing Authorization header or Cookie".to_string())?
            .to_str()
            .map_err(|_| "Invalid Cookie header".to_string())?;

        for cookie in cookie::Cookie::split_parse(cookie_header) {
            if let Ok(c) = cookie {
                if c.name() == "auth_token" {
                    return Ok(c.value().to_string());
                }
            }
        }
        Err("auth_token cookie not found".to_string())
    }
}

/// Validate a session token and return its claims.
pub async fn validate_session_token(token: &str) -> Result<SessionClaims, String> {
    if let Some(cache) = get_claims_cache() {
        if let Some(claims) = cache.get(token).await {
            return Ok(claims);
        }
    }

    let config = crate::config::get_config();
    let secret = config.auth_jwt_secret.as_ref().ok_or_else(|| {
        "No JWT secret configured!".to_string()
    })?;

    let claims = decode_session_token(token, secret)
        .map_err(|e| format!("JWT validation failed: {}", e))?;

    if let Some(cache) = get_claims_cache() {
        cache.insert(token.to_string(), claims.clone()).await;
    }
    Ok(claims)
}

// Decode and verify a session token against the shared secret
pub fn decode_session_token(
    token: &str,
    secret: &str,
) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    Ok(decode::<SessionClaims>(token, &decoding_key, &validation)?.claims)
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::{decode_session_token, SessionClaims};
    use crate::models::Role;

    fn mint(claims: &SessionClaims, secret: &str) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))
            .expect("token should encode")
    }

    fn claims(role: Role, exp_offset: i64) -> SessionClaims {
        SessionClaims {
            sub: "team-10".to_string(),
            role,
            session_id: Some(1),
            team_id: Some(10),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        }
    }

    #[test]
    fn valid_token_round_trips_claims() {
        let token = mint(&claims(Role::Contestant, 3600), "secret");
        let decoded = decode_session_token(&token, "secret").expect("token should validate");
        assert_eq!(decoded.sub, "team-10");
        assert_eq!(decoded.role, Role::Contestant);
        assert_eq!(decoded.team_id, Some(10));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = mint(&claims(Role::Contestant, -3600), "secret");
        assert!(decode_session_token(&token, "secret").is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = mint(&claims(Role::Moderator, 3600), "secret");
        assert!(decode_session_token(&token, "other-secret").is_err());
    }
}
