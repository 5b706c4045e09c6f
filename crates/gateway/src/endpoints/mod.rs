//! # Gatewayエンドポイント
//!
//! ## API エンドポイント
//! - `GET /health`, `GET /api/health` — ヘルスチェック
//! - `POST /api/sign` — 画像への来歴情報の埋め込み
//! - `POST /api/verify` — 埋め込まれた来歴情報の検証
//! - `OPTIONS *` — CORSプリフライト（204）
//!
//! 上記以外のGET（APIパスへのGETを含む）は静的ファイル（クライアントのビルド成果物）に
//! フォールバックし、それも無ければ404を返す。GET/HEAD以外は常に404。

pub mod cors;
pub mod fallback;
pub mod health;
pub mod sign;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_helpers;

#[cfg(test)]
mod tests;

pub use health::handle_health;
pub use sign::handle_sign;
pub use verify::handle_verify;

use std::path::PathBuf;
use std::sync::Arc;

use attest_types::ImageRequest;
use axum::extract::Request;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::config::GatewayState;
use crate::error::GatewayError;

/// axumルーターを構築する。
///
/// `static_dir` が与えられた場合、API以外のリクエストはそこから配信する。
/// APIパスへのメソッド違いも405ではなく同じフォールバックに回す。
pub fn router(state: Arc<GatewayState>, static_dir: Option<PathBuf>) -> Router {
    let api = Router::new()
        .route("/health", get(handle_health))
        .route("/api/health", get(handle_health))
        .route("/api/sign", post(handle_sign))
        .route("/api/verify", post(handle_verify));

    let app = match static_dir {
        Some(dir) => {
            let files = fallback::static_files(&dir);
            let serve = move |request: Request| fallback::serve_static(files.clone(), request);
            api.method_not_allowed_fallback(serve.clone()).fallback(serve)
        }
        None => api
            .method_not_allowed_fallback(fallback::handle_not_found)
            .fallback(fallback::handle_not_found),
    };

    // 外側から: トレース → CORS → パニック捕捉
    app.with_state(state)
        .layer(CatchPanicLayer::custom(fallback::panic_response))
        .layer(axum::middleware::from_fn(cors::cors))
        .layer(TraceLayer::new_for_http())
}

/// リクエストボディをパースする。
///
/// Content-Typeに依らずJSONとして読み、空ボディは `{}` とみなす。
pub(crate) fn parse_image_request(body: &[u8]) -> Result<ImageRequest, GatewayError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(ImageRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::BadRequest(format!("JSONのパースに失敗: {e}")))
}
