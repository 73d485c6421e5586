use axum::{http::StatusCode, Json};

use crate::models::{ErrorResponse, Role};
use crate::services::auth_service::SessionClaims;

pub fn is_moderator(claims: &SessionClaims) -> bool {
    claims.role == Role::Moderator
}

/// Check that the claims belong to a moderator of the given session.
/// Tokens without a session binding are treated as event-wide moderators.
pub fn ensure_moderator(
    claims: &SessionClaims,
    session_id: i64,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if is_moderator(claims)
        && claims.session_id.map(|bound| bound == session_id).unwrap_or(true)
    {
        return Ok(());
    }

    let status = StatusCode::FORBIDDEN;
    Err((
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            status: status.to_string(),
            error: "Moderator access required".to_string(),
        }),
    ))
}

/// Check that the token permits connecting in the requested role. A moderator
/// token may join any role; everyone else only their own.
pub fn role_permitted(claims: &SessionClaims, requested: Role) -> bool {
    claims.role == requested || is_moderator(claims)
}

/// Check that the token is valid for the given session. Tokens without a
/// session binding are accepted for any session.
pub fn session_permitted(claims: &SessionClaims, session_id: i64) -> bool {
    claims.session_id.map(|bound| bound == session_id).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::{ensure_moderator, role_permitted, session_permitted};
    use crate::models::Role;
    use crate::services::auth_service::SessionClaims;

    fn claims(role: Role, session_id: Option<i64>) -> SessionClaims {
        SessionClaims { sub: "u1".to_string(), role, session_id, team_id: None, exp: 0 }
    }

    #[test]
    fn moderator_may_join_any_role_in_their_session() {
        let c = claims(Role::Moderator, Some(1));
        assert!(role_permitted(&c, Role::Display));
        assert!(role_permitted(&c, Role::Moderator));
        assert!(session_permitted(&c, 1));
        assert!(!session_permitted(&c, 2));
        assert!(ensure_moderator(&c, 1).is_ok());
        assert!(ensure_moderator(&c, 2).is_err());
    }

    #[test]
    fn contestant_is_limited_to_their_own_role() {
        let c = claims(Role::Contestant, Some(1));
        assert!(role_permitted(&c, Role::Contestant));
        assert!(!role_permitted(&c, Role::Presenter));
        assert!(ensure_moderator(&c, 1).is_err());
    }

    #[test]
    fn unbound_token_is_event_wide() {
        let c = claims(Role::Moderator, None);
        assert!(session_permitted(&c, 42));
        assert!(ensure_moderator(&c, 42).is_ok());
    }
}
