//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use slanglab_core::domain::PrincipalState;
use std::sync::Arc;
use tracing::error;

use crate::web::state::AppState;

/// Pulls the auth session ID out of the Cookie header, if present.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<&str> {
    let cookie_header = headers.get(header::COOKIE).and_then(|v| v.to_str().ok())?;
    cookie_header.split(';').find_map(|c| {
        let c = c.trim();
        c.strip_prefix("session=")
    })
}

/// Middleware that validates the auth session cookie and resolves the principal.
///
/// If valid, inserts the `Principal` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract the session ID from the cookie header
    let auth_session_id = session_id_from_headers(req.headers())
        .map(str::to_owned)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Validate auth session in database, get user_id
    let user_id = state
        .directory
        .validate_auth_session(&auth_session_id)
        .await
        .map_err(|e| {
            error!("Failed to validate auth session: {:?}", e);
            StatusCode::UNAUTHORIZED
        })?;

    // 3. Resolve the principal (role + plan)
    let principal = state.directory.get_principal(user_id).await.map_err(|e| {
        error!("Failed to resolve principal {}: {:?}", user_id, e);
        StatusCode::UNAUTHORIZED
    })?;

    // 4. Insert the principal into request extensions
    req.extensions_mut()
        .insert(PrincipalState::Authenticated(principal));

    // 5. Continue to the handler
    Ok(next.run(req).await)
}

/// Middleware for routes that admit anonymous callers (e.g. search).
///
/// Always inserts a `PrincipalState`: `Authenticated` when a valid session
/// cookie is present, `Anonymous` otherwise. A broken session cookie is
/// treated as anonymous rather than rejected.
pub async fn resolve_principal(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let principal = match session_id_from_headers(req.headers()).map(str::to_owned) {
        Some(session_id) => {
            match state.directory.validate_auth_session(&session_id).await {
                Ok(user_id) => match state.directory.get_principal(user_id).await {
                    Ok(principal) => PrincipalState::Authenticated(principal),
                    Err(e) => {
                        error!("Failed to resolve principal {}: {:?}", user_id, e);
                        PrincipalState::Anonymous
                    }
                },
                Err(_) => PrincipalState::Anonymous,
            }
        }
        None => PrincipalState::Anonymous,
    };

    req.extensions_mut().insert(principal);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_session_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc-123; lang=en"),
        );
        assert_eq!(session_id_from_headers(&headers), Some("abc-123"));
    }

    #[test]
    fn missing_cookie_yields_none() {
        let headers = HeaderMap::new();
        assert_eq!(session_id_from_headers(&headers), None);
        let mut other = HeaderMap::new();
        other.insert(header::COOKIE, HeaderValue::from_static("theme=dark"));
        assert_eq!(session_id_from_headers(&other), None);
    }
}
