use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::auth::UserIdentity;
use crate::error::ApiError;

/// Headers the upstream authentication provider sets on every request
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Middleware that requires a signed-in user and injects their [`UserIdentity`]
pub async fn identity_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = identity_from_headers(&headers).ok_or_else(|| {
        tracing::debug!("rejecting challenge request without a user id");
        ApiError::unauthorized("sign in required")
    })?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Extract the identity headers; `None` when no usable user id is present
pub fn identity_from_headers(headers: &HeaderMap) -> Option<UserIdentity> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let mut identity = UserIdentity::new(header(USER_ID_HEADER)?);
    identity.display_name = header(USER_NAME_HEADER);
    identity.email = header(USER_EMAIL_HEADER);
    Some(identity)
}

/// Extract a bearer token from the Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, String> {
    let auth_str = headers
        .get("authorization")
        .ok_or_else(|| "Missing Authorization header".to_string())?
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        Some(_) => Err("Empty bearer token".to_string()),
        None => Err("Authorization header must use Bearer token format".to_string()),
    }
}
