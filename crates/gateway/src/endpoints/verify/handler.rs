//! /api/verify ハンドラ実装

use std::sync::Arc;

use attest_types::VerifyResponse;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;

use crate::config::GatewayState;
use crate::endpoints::parse_image_request;
use crate::error::GatewayError;
use crate::interpret;
use crate::payload;
use crate::staging::{image_extension, VERIFY_INPUT_PREFIX};

/// POST /api/verify — 埋め込まれた来歴情報を検証する。
pub async fn handle_verify(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> Result<Json<VerifyResponse>, GatewayError> {
    let request = parse_image_request(&body)?;
    let extension = image_extension(request.image_name.as_deref());
    let data = request
        .image_data
        .as_deref()
        .ok_or_else(|| GatewayError::MalformedPayload("imageDataがありません".to_string()))?;
    let decoded = payload::decode(data, payload::media_type_for_extension(&extension))?;
    tracing::debug!(media_type = %decoded.media_type, bytes = decoded.bytes.len(), "画像データをデコード");

    let backend = state.selector.acquire().await?;

    let input = state
        .staging
        .stage(VERIFY_INPUT_PREFIX, &extension, &decoded.bytes)
        .await?;
    let result = state.invoker.verify(&backend, input).await?;

    Ok(Json(interpret::interpret_verify(result)))
}
