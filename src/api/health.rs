use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;
use crate::transport::TransportMode;

/// Index/health handler.
/// Returns JSON with status and config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    let transport = match state.transport.mode() {
        TransportMode::Direct => "direct",
        TransportMode::Socks5 { .. } => "socks5",
    };
    Json(json!({
        "status": "sider-relay is running",
        "config": {
            "backend_url": config.backend.url,
            "backend_credential_configured": state.backend.has_credential(),
            "transport": transport,
            "client_authentication": config.client_authentication.enabled,
            "force_non_stream": config.server.force_non_stream,
            "models_count": config.models.len(),
            "log_level": config.features.log_level,
        }
    }))
}
