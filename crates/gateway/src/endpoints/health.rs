//! # GET /health
//!
//! ヘルスチェック。バックエンドの探索や準備は行わない。

use std::sync::Arc;

use attest_types::HealthResponse;
use axum::extract::State;
use axum::Json;

use crate::config::GatewayState;

/// ヘルスチェックのメッセージ
pub const HEALTH_MESSAGE: &str = "c2pa attestation gateway";

/// GET /health — ヘルスチェック。
///
/// バックエンドが解決済みであればその種別も返す。
pub async fn handle_health(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        message: HEALTH_MESSAGE.to_string(),
        backend: state.selector.resolved_kind().map(|k| k.to_string()),
    })
}
