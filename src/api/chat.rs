use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use chrono::Local;
use tracing::{info, warn};

use crate::error::RelayError;
use crate::observability::log_request_complete;
use crate::observability::token_counter::placeholder_tokens;
use crate::protocol::openai_chat::response_encoder::{encode_chat_completion, unix_secs};
use crate::protocol::openai_chat::ChatCompletionRequest;
use crate::state::AppState;
use crate::stream::{aggregate_frames, decode_frames, relay_frames, RelayContext};

/// `POST /v1/chat/completions`.
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Response {
    let request_seq = state.next_request_seq();
    match handler_inner(&state, &headers, &body, request_seq).await {
        Ok(response) => response,
        Err(err) => {
            warn!(
                request_seq,
                status = err.status().as_u16(),
                error = %err,
                "chat completion failed"
            );
            err.into_response()
        }
    }
}

async fn handler_inner(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    body: &[u8],
    request_seq: u64,
) -> Result<Response, RelayError> {
    state.authenticate(headers)?;

    let request: ChatCompletionRequest = serde_json::from_slice(body)
        .map_err(|e| RelayError::InvalidRequest(format!("Invalid request body: {e}")))?;

    let started = Instant::now();
    let stream = request.stream && !state.config.server.force_non_stream;
    let translated = state.translator.translate(&request, stream)?;

    info!(
        request_seq,
        method = "POST",
        path = "/v1/chat/completions",
        model = %translated.model,
        stream,
        "chat completion request"
    );

    let response = state
        .transport
        .send(&state.backend, translated.body, stream)
        .await?;
    info!(
        request_seq,
        backend_status = response.status().as_u16(),
        "backend accepted request"
    );

    let idle_timeout = Duration::from_secs(state.config.server.stream_idle_timeout);

    if stream {
        let frames = decode_frames(response.bytes_stream(), Some(idle_timeout));
        let ctx = RelayContext {
            model: translated.model,
            created: unix_secs(Local::now()),
            prompt_tokens: placeholder_tokens(&translated.prompt),
            started,
        };
        return Ok(sse_ok_response(Body::from_stream(relay_frames(frames, ctx))));
    }

    let frames = decode_frames(response.bytes_stream(), Some(idle_timeout));
    let aggregate = aggregate_frames(frames).await?;
    if !aggregate.saw_done {
        tracing::debug!(
            request_seq,
            frames = aggregate.frames,
            "backend stream ended without [DONE]"
        );
    }

    let completion = encode_chat_completion(
        aggregate.text,
        &translated.prompt,
        &translated.model,
        Local::now(),
    );
    log_request_complete(&translated.model, false, &completion.usage, started);
    Ok(Json(completion).into_response())
}

fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ClientAuthConfig};

    fn state() -> Arc<AppState> {
        let config = AppConfig {
            client_authentication: ClientAuthConfig {
                enabled: true,
                allowed_keys: vec!["k".into()],
            },
            ..AppConfig::default()
        };
        Arc::new(AppState::from_config(config).unwrap())
    }

    fn authorized() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer k".parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_rejects_unauthenticated_before_parsing() {
        let response = handler(
            State(state()),
            HeaderMap::new(),
            bytes::Bytes::from_static(b"not json"),
        )
        .await;
        assert_eq!(response.status(), http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let response = handler(
            State(state()),
            authorized(),
            bytes::Bytes::from_static(b"{\"messages\":"),
        )
        .await;
        assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[tokio::test]
    async fn test_missing_backend_credential_is_server_error() {
        let response = handler(
            State(state()),
            authorized(),
            bytes::Bytes::from_static(br#"{"messages":[],"model":""}"#),
        )
        .await;
        assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_sse_headers() {
        let response = sse_ok_response(Body::empty());
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(
            response.headers()[http::header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(response.headers()[http::header::CACHE_CONTROL], "no-cache");
    }
}
