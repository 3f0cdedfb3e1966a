use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use constant_time_eq::constant_time_eq;
use tracing::warn;

use super::error::ApiError;
use super::state::AppState;

pub const TOKEN_HEADER: &str = "X-Parser-Token";

/// Rejects requests without the shared secret. A server without a configured
/// token accepts everything.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.server.api_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    if token_accepted(provided, expected) {
        Ok(next.run(request).await)
    } else {
        warn!(path = %request.uri().path(), "Rejected request with missing or wrong token");
        Err(ApiError::Unauthorized)
    }
}

fn token_accepted(provided: Option<&str>, expected: &str) -> bool {
    provided.is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_accepted() {
        assert!(token_accepted(Some("secret"), "secret"));
        assert!(!token_accepted(Some("secreT"), "secret"));
        assert!(!token_accepted(Some("secret2"), "secret"));
        assert!(!token_accepted(Some("secre"), "secret"));
        assert!(!token_accepted(Some(""), "secret"));
        assert!(!token_accepted(None, "secret"));
    }
}
