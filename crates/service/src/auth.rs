//! Bearer-token authentication middleware.
//!
//! The token is read once at startup from the env var named by
//! `TARSY_API_TOKEN_ENV` (default `TARSY_API_TOKEN`) and cached as a
//! SHA-256 digest in [`AppState`]. When unset or empty, the server logs a
//! warning and runs without auth (dev mode).

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Hash a token once at startup so later comparisons are constant-time
/// regardless of the configured token's length.
pub fn hash_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}

pub async fn require_bearer_token(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let expected_hash = match &state.api_token_hash {
        Some(h) => h,
        None => return next.run(req).await,
    };

    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    let provided_hash = Sha256::digest(provided.as_bytes());
    if !bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
        return (
            axum::http::StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({ "error": "invalid or missing API token" })),
        )
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_token_hashes_equal() {
        assert_eq!(hash_token("secret"), hash_token("secret"));
    }

    #[test]
    fn different_tokens_hash_differently() {
        assert_ne!(hash_token("secret"), hash_token("other"));
    }

    #[test]
    fn hash_is_fixed_length_regardless_of_input() {
        assert_eq!(hash_token("a").len(), hash_token("a much longer token value").len());
    }
}
