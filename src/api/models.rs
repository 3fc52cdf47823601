use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::{body::Body, http::StatusCode};
use bytes::Bytes;
use serde::Serialize;

use crate::state::AppState;

/// Fixed `created` stamp for every catalog entry.
const MODEL_CREATED: u64 = 1_704_067_200;

#[derive(Serialize)]
struct ModelEntry<'a> {
    id: &'a str,
    object: &'static str,
    created: u64,
    owned_by: &'static str,
    permission: [&'static str; 1],
}

#[derive(Serialize)]
struct ModelList<'a> {
    object: &'static str,
    data: Vec<ModelEntry<'a>>,
}

/// Serialize the static model catalog once; handlers hand out clones.
#[must_use]
pub(crate) fn build_models_response_body(models: &[String]) -> Bytes {
    let list = ModelList {
        object: "list",
        data: models
            .iter()
            .map(|id| ModelEntry {
                id,
                object: "model",
                created: MODEL_CREATED,
                owned_by: "sider",
                permission: ["read"],
            })
            .collect(),
    };
    serde_json::to_vec(&list).map_or_else(
        |_| Bytes::from_static(br#"{"object":"list","data":[]}"#),
        Bytes::from,
    )
}

/// List the configured models in `OpenAI` format.
#[must_use]
pub fn handler(State(state): State<Arc<AppState>>, headers: &HeaderMap) -> Response {
    if let Err(err) = state.authenticate(headers) {
        return err.into_response();
    }

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/json"),
        )],
        Body::from(state.models_response_body()),
    )
        .into_response()
}
