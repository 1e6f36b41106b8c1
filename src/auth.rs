//! Bearer token check for upload routes
//!
//! Runs in front of the pipeline; the pipeline itself never sees the token.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::state::AppState;

/// Reject requests without the configured bearer token.
///
/// A missing header or non-bearer scheme is 403, a wrong token is 401.
/// With no token configured every request passes.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = state.config().auth.api_token.as_deref() {
        check_bearer(request.headers(), expected)?;
    }
    Ok(next.run(request).await)
}

fn check_bearer(headers: &HeaderMap, expected: &str) -> Result<(), AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Forbidden)?;

    let (scheme, token) = value.split_once(' ').ok_or(AppError::Forbidden)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::Forbidden);
    }

    if !constant_time_eq(token.trim().as_bytes(), expected.as_bytes()) {
        tracing::warn!("Rejected upload with invalid API token");
        return Err(AppError::Unauthorized);
    }

    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_valid_token() {
        assert!(check_bearer(&headers("Bearer s3cret"), "s3cret").is_ok());
        assert!(check_bearer(&headers("bearer s3cret"), "s3cret").is_ok());
    }

    #[test]
    fn test_missing_header_is_forbidden() {
        let result = check_bearer(&HeaderMap::new(), "s3cret");
        assert!(matches!(result, Err(AppError::Forbidden)));
    }

    #[test]
    fn test_wrong_scheme_is_forbidden() {
        let result = check_bearer(&headers("Basic s3cret"), "s3cret");
        assert!(matches!(result, Err(AppError::Forbidden)));
    }

    #[test]
    fn test_wrong_token_is_unauthorized() {
        let result = check_bearer(&headers("Bearer nope"), "s3cret");
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }
}
