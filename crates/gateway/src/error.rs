//! # Gateway エラー型
//!
//! 全エンドポイントで共通のエラー型。ボディは常に `{ok:false, error}` のJSON。

use attest_types::ErrorResponse;
use axum::http::StatusCode;
use axum::Json;

/// Gatewayエラー型。
///
/// 検証失敗（verifyでのツール非ゼロ終了）はエラーではなく通常のレスポンスとして
/// 返すため、ここには含まれない。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 画像データが欠落している、またはBase64として不正
    #[error("不正な画像データ: {0}")]
    MalformedPayload(String),
    /// リクエストボディのJSONが不正
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// 実行バックエンドを準備できない（サンドボックスイメージのビルド失敗等）
    #[error("実行バックエンドが利用できません: {0}")]
    BackendUnavailable(String),
    /// 署名ツールが非ゼロで終了した。値はツールの診断出力そのもの
    #[error("{0}")]
    InvocationFailure(String),
    /// ツールは成功を報告したが出力ファイルを読めない
    #[error("署名済みファイルが生成されていません: {0}")]
    ArtifactMissing(String),
    /// ステージング領域のファイル操作に失敗
    #[error("一時ファイルの操作に失敗: {0}")]
    Staging(String),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl GatewayError {
    /// エラー種別に対応するHTTPステータス。
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MalformedPayload(_) | GatewayError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::BackendUnavailable(_)
            | GatewayError::InvocationFailure(_)
            | GatewayError::ArtifactMissing(_)
            | GatewayError::Staging(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "リクエスト処理に失敗");
        }
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::MalformedPayload("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::BackendUnavailable("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::ArtifactMissing("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    /// 署名失敗はツールの診断出力をそのままerrorに載せる
    #[test]
    fn test_invocation_failure_message_is_verbatim() {
        let err = GatewayError::InvocationFailure("bad manifest".into());
        assert_eq!(err.to_string(), "bad manifest");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
