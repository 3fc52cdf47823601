use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::extract::State;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::api::{chat, cors, health, models};
use crate::state::AppState;

const DEFAULT_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteMatch {
    Health,
    Models,
    ChatCompletions,
    Preflight,
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// Every response, errors included, carries the CORS headers.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    base_path: Arc<str>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path(), base_path.as_ref());
    tracing::debug!(method = %parts.method, path = parts.uri.path(), ?route, "dispatch");

    let mut response = match route {
        RouteMatch::Health => health::health_handler(State(state)).into_response(),
        RouteMatch::Models => models::handler(State(state), &parts.headers),
        RouteMatch::ChatCompletions => match read_request_body(body).await {
            Ok(body_bytes) => chat::handler(State(state), parts.headers, body_bytes).await,
            Err(response) => response,
        },
        RouteMatch::Preflight => return Ok(cors::preflight_response()),
        RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
    };

    if !response.status().is_success() {
        tracing::info!(
            method = %parts.method,
            path = parts.uri.path(),
            status = response.status().as_u16(),
            "request rejected"
        );
    }
    cors::apply_cors_headers(&mut response);
    Ok(response)
}

/// Canonicalize `server.base_path`: empty or "/" means none, otherwise a
/// leading slash and no trailing one.
#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("/{}", trimmed.trim_end_matches('/'))
    }
}

async fn read_request_body(body: Body) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, DEFAULT_BODY_LIMIT_BYTES)
        .await
        .map_err(|_| {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large (max 2MiB)",
            )
                .into_response()
        })
}

fn match_route(method: &Method, path: &str, base_path: &str) -> RouteMatch {
    let Some(path) = strip_base_path(path, base_path) else {
        return RouteMatch::NotFound;
    };

    let (allowed, matched) = match path {
        "/" => (Method::GET, RouteMatch::Health),
        "/v1/models" => (Method::GET, RouteMatch::Models),
        "/v1/chat/completions" => (Method::POST, RouteMatch::ChatCompletions),
        _ => return RouteMatch::NotFound,
    };

    if method == Method::OPTIONS {
        RouteMatch::Preflight
    } else if method == allowed {
        matched
    } else {
        RouteMatch::MethodNotAllowed
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }

    let remainder = path.strip_prefix(base_path)?;
    if remainder.is_empty() {
        Some("/")
    } else if remainder.starts_with('/') {
        Some(remainder)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_path() {
        assert_eq!(normalize_base_path(""), "");
        assert_eq!(normalize_base_path(" / "), "");
        assert_eq!(normalize_base_path("hf"), "/hf");
        assert_eq!(normalize_base_path("/hf/"), "/hf");
        assert_eq!(
            match_route(&Method::GET, "/hf/v1/models", &normalize_base_path("hf")),
            RouteMatch::Models
        );
    }

    #[test]
    fn test_match_known_routes() {
        assert_eq!(match_route(&Method::GET, "/", ""), RouteMatch::Health);
        assert_eq!(match_route(&Method::GET, "/v1/models", ""), RouteMatch::Models);
        assert_eq!(
            match_route(&Method::POST, "/v1/chat/completions", ""),
            RouteMatch::ChatCompletions
        );
    }

    #[test]
    fn test_wrong_method_and_unknown_path() {
        assert_eq!(
            match_route(&Method::GET, "/v1/chat/completions", ""),
            RouteMatch::MethodNotAllowed
        );
        assert_eq!(
            match_route(&Method::POST, "/v1/models", ""),
            RouteMatch::MethodNotAllowed
        );
        assert_eq!(match_route(&Method::GET, "/v1/other", ""), RouteMatch::NotFound);
    }

    #[test]
    fn test_options_on_known_route_is_preflight() {
        assert_eq!(
            match_route(&Method::OPTIONS, "/v1/chat/completions", ""),
            RouteMatch::Preflight
        );
        assert_eq!(match_route(&Method::OPTIONS, "/nope", ""), RouteMatch::NotFound);
    }

    #[test]
    fn test_base_path_prefix() {
        assert_eq!(
            match_route(&Method::POST, "/hf/v1/chat/completions", "/hf"),
            RouteMatch::ChatCompletions
        );
        assert_eq!(match_route(&Method::GET, "/hf", "/hf"), RouteMatch::Health);
        assert_eq!(
            match_route(&Method::POST, "/v1/chat/completions", "/hf"),
            RouteMatch::NotFound
        );
        assert_eq!(
            match_route(&Method::GET, "/hfx/v1/models", "/hf"),
            RouteMatch::NotFound
        );
    }
}
