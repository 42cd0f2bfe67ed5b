//! Bearer token verification for the HTTP surface.
//!
//! Two token groups: `access_token` guards the search endpoints,
//! `admin_token` guards upload and moderation. An unset token leaves its
//! group public.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::context::AppContext;

/// Compares a provided token against the expected one in constant time, so
/// the comparison duration leaks nothing about where the tokens diverge.
///
/// Empty tokens never validate.
pub fn token_matches(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();

    if provided.is_empty() || expected.is_empty() {
        return false;
    }

    let len_match = provided.len() == expected.len();

    // XOR accumulator over the overlapping bytes; non-zero on any difference
    let mut diff: u8 = 0;
    for (a, b) in provided.iter().zip(expected.iter()) {
        diff |= a ^ b;
    }

    len_match && diff == 0
}

/// Pulls the bearer token out of the `Authorization` header.
///
/// The "Bearer" scheme is matched case-insensitively per RFC 6750.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let header = header.trim();

    if header.len() < 7 {
        return None;
    }

    let (scheme, token) = header.split_at(7);
    if !scheme.eq_ignore_ascii_case("Bearer ") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        json!({"error": "invalid or missing bearer token"}).to_string(),
    )
        .into_response()
}

fn check(headers: &HeaderMap, expected: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => bearer_token(headers)
            .map(|provided| token_matches(provided, expected))
            .unwrap_or(false),
    }
}

pub async fn require_access_token(
    State(ctx): State<Arc<AppContext>>,
    req: Request,
    next: Next,
) -> Response {
    if !check(req.headers(), ctx.config.auth.access_token.as_deref()) {
        return unauthorized();
    }
    next.run(req).await
}

pub async fn require_admin_token(
    State(ctx): State<Arc<AppContext>>,
    req: Request,
    next: Next,
) -> Response {
    if !check(req.headers(), ctx.config.auth.admin_token.as_deref()) {
        return unauthorized();
    }
    next.run(req).await
}
