//! Push delivery routes.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use herald_common::error::AppError;
use herald_common::types::PushPayload;
use herald_notifier::registry::DeviceRegistry;
use herald_notifier::token::b64_to_hex;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/users/{user_id}/push", post(push_to_user))
}

/// Per-device result of a push request.
#[derive(Debug, Serialize)]
pub struct DeviceResult {
    /// Registered (base64) device token
    pub token: String,
    pub identifier: Option<u32>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PushResponse {
    pub user_id: i64,
    pub devices: Vec<DeviceResult>,
}

/// POST /api/users/:user_id/push: send a notification to every registered device.
async fn push_to_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(payload): Json<PushPayload>,
) -> Result<Json<PushResponse>, AppError> {
    let registrations = state.registry.list_for_user(user_id).await?;
    if registrations.is_empty() {
        return Err(AppError::NotFound(format!(
            "User {} has no registered devices",
            user_id
        )));
    }

    let mut devices = Vec::with_capacity(registrations.len());
    let mut hex_tokens = Vec::new();
    let mut b64_tokens = Vec::new();

    for row in registrations {
        match b64_to_hex(&row.token) {
            Ok(hex) => {
                hex_tokens.push(hex);
                b64_tokens.push(row.token);
            }
            Err(e) => devices.push(DeviceResult {
                token: row.token,
                identifier: None,
                error: Some(e.to_string()),
            }),
        }
    }

    let outcomes = state
        .dispatcher
        .dispatch(user_id, &hex_tokens, &payload)
        .await;

    for (outcome, token) in outcomes.into_iter().zip(b64_tokens) {
        let (identifier, error) = match outcome.result {
            Ok(identifier) => (Some(identifier), None),
            Err(e) => (None, Some(e.to_string())),
        };
        devices.push(DeviceResult {
            token,
            identifier,
            error,
        });
    }

    Ok(Json(PushResponse { user_id, devices }))
}
