//! # Attestation Gateway 共有型定義
//!
//! HTTP APIでやり取りされるJSONボディをRust構造体として提供する。
//!
//! ## エンコーディング規則
//! - フィールド名はブラウザクライアントに合わせてcamelCase
//! - 画像データはData URL（`data:<mime>;base64,<body>`）または素のBase64

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// API リクエスト
// ---------------------------------------------------------------------------

/// /api/sign, /api/verify 共通のリクエスト。
///
/// 両フィールドとも欠落を許容し、欠落時の扱いはハンドラ側で決める
/// （imageDataの欠落は不正なペイロードとして400）。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    /// 元のファイル名（拡張子の推定に使用）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    /// Data URLまたはBase64文字列
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
}

// ---------------------------------------------------------------------------
// API レスポンス
// ---------------------------------------------------------------------------

/// GET /health レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub message: String,
    /// 解決済みの実行バックエンド（"local" / "sandboxed"）。初回リクエスト前は省略
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

/// /api/sign 成功レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    /// 常にtrue
    pub ok: bool,
    /// 署名済みファイル名（`signed_<hex>.<ext>`）
    pub file_name: String,
    /// 署名済み画像のData URL
    pub data_url: String,
}

/// /api/verify レスポンス。
///
/// 検証失敗（ツールの非ゼロ終了）もHTTP 200でこの形で返す。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// ツールが正常終了したか
    pub ok: bool,
    /// 標準出力（前後の空白を除去）
    pub output: String,
    /// 標準エラー出力（前後の空白を除去）
    pub error: String,
}

/// エラーレスポンス。全てのエラーステータスで共通。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 常にfalse
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    /// エラーメッセージからレスポンスを構築する。
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}
