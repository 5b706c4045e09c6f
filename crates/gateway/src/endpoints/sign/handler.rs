//! /api/sign ハンドラ実装

use std::sync::Arc;

use attest_types::SignResponse;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;

use crate::config::GatewayState;
use crate::endpoints::parse_image_request;
use crate::error::GatewayError;
use crate::interpret;
use crate::payload;
use crate::staging::{image_extension, SIGNED_OUTPUT_PREFIX, SIGN_INPUT_PREFIX};

/// POST /api/sign — 画像に来歴情報を埋め込む。
pub async fn handle_sign(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> Result<Json<SignResponse>, GatewayError> {
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
        .stage(SIGN_INPUT_PREFIX, &extension, &decoded.bytes)
        .await?;
    let output = state
        .staging
        .reserve_output(SIGNED_OUTPUT_PREFIX, &extension)
        .await?;
    let output = if state.keep_signed_output {
        output
    } else {
        output.discard_on_drop()
    };

    // outputは実行タスクを経由して戻る。途中で切断された場合はタスク側でDropされる
    let (result, output) = state.invoker.sign(&backend, input, output).await?;
    if state.keep_signed_output {
        tracing::debug!(path = %output.path().display(), "署名済み出力を保持");
    }

    let artifact = interpret::interpret_sign(result, &state.staging, &output, &extension).await?;
    Ok(Json(SignResponse {
        ok: true,
        file_name: artifact.file_name,
        data_url: artifact.data_url,
    }))
}
