//! # フォールバック
//!
//! API以外のリクエストの扱いと、ハンドラ内パニックのJSONエラー化。

use std::any::Any;
use std::path::Path;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tower_http::services::{ServeDir, ServeFile};

use crate::error::GatewayError;

/// 静的ファイル配信サービス。
///
/// 存在しないパスは `index.html` を返す（クライアント側ルーティング用）。
pub fn static_files(dir: &Path) -> ServeDir<ServeFile> {
    ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")))
}

/// 静的ファイルを配信する。GET/HEAD以外は404。
pub async fn serve_static(mut files: ServeDir<ServeFile>, request: Request) -> Response {
    if !matches!(*request.method(), Method::GET | Method::HEAD) {
        return handle_not_found().await;
    }
    match files.try_call(request).await {
        Ok(response) => response.map(Body::new),
        Err(e) => GatewayError::Internal(format!("静的ファイルの読み込みに失敗: {e}")).into_response(),
    }
}

/// 静的ファイルのルートが無い場合、またはGET/HEAD以外の404。
pub async fn handle_not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}

/// パニックを汎用の500 JSONエラーに変換する。
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "不明なパニック".to_string()
    };
    GatewayError::Internal(detail).into_response()
}
