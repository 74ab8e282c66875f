//! Pairing slot handlers.
//!
//! `POST /exchange` fills a slot, `GET /exchange/{key_id}` empties it. An
//! empty slot answers 404, which clients treat as "not yet".

use crate::error::RelayError;
use crate::server::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};

const MAX_KEY_ID_LEN: usize = 128;

#[derive(Deserialize)]
pub struct ExchangeRequest {
    pub key_id: String,
    pub encrypted_message: String, // base64
}

#[derive(Serialize)]
pub struct ExchangeResponse {
    pub encrypted_message: String, // base64
}

pub async fn post_message(
    State(state): State<AppState>,
    body: Result<Json<ExchangeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), RelayError> {
    let Json(req) = body?;
    validate_key_id(&req.key_id)?;
    if !state.limiter.check(&req.key_id) {
        return Err(RelayError::RateLimited);
    }

    base64::engine::general_purpose::STANDARD
        .decode(&req.encrypted_message)
        .map_err(|e| RelayError::BadRequest(format!("Invalid encrypted_message: {}", e)))?;

    let now = Utc::now().timestamp();
    let expires_at = now + state.slot_ttl_secs as i64;

    if !state
        .storage
        .put_slot(&req.key_id, &req.encrypted_message, now, expires_at)?
    {
        return Err(RelayError::SlotOccupied);
    }

    tracing::debug!("Stored message in slot {}", req.key_id);
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"status": "stored", "expires_at": expires_at})),
    ))
}

pub async fn fetch_message(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> Result<Json<ExchangeResponse>, RelayError> {
    validate_key_id(&key_id)?;
    if !state.limiter.check(&key_id) {
        return Err(RelayError::RateLimited);
    }

    let now = Utc::now().timestamp();
    match state.storage.take_slot(&key_id, now)? {
        Some(encrypted_message) => {
            tracing::debug!("Delivered message from slot {}", key_id);
            Ok(Json(ExchangeResponse { encrypted_message }))
        }
        None => Err(RelayError::SlotEmpty),
    }
}

fn validate_key_id(key_id: &str) -> Result<(), RelayError> {
    if key_id.is_empty() || key_id.len() > MAX_KEY_ID_LEN {
        return Err(RelayError::BadRequest(format!(
            "key_id must be 1 to {} bytes",
            MAX_KEY_ID_LEN
        )));
    }
    Ok(())
}
