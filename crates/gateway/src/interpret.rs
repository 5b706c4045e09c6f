//! # Result Interpreter
//!
//! [`InvocationResult`] を各操作の結果に変換する。
//!
//! - 署名: 非ゼロ終了は [`GatewayError::InvocationFailure`]。成功時は出力ファイルを
//!   読み戻してData URLにする。成功を報告したのに出力が無い場合は
//!   [`GatewayError::ArtifactMissing`] とし、空の成果物としては扱わない。
//! - 検証: 終了コードだけで `ok` を決め、両ストリームは空白除去のみで返す。
//!   検証失敗はエラーではない。

use attest_types::VerifyResponse;

use crate::error::GatewayError;
use crate::invoker::InvocationResult;
use crate::payload;
use crate::staging::{StagedFile, StagingArea};

/// 署名失敗時に診断出力が何も無い場合のメッセージ
pub const GENERIC_SIGN_FAILURE: &str = "署名に失敗しました";

/// 署名済み成果物。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedArtifact {
    /// 出力ファイル名
    pub file_name: String,
    /// 署名済み画像のData URL
    pub data_url: String,
}

/// 署名の呼び出し結果を解釈する。
///
/// `extension` は元のファイル名の拡張子で、返却するMIMEタイプの決定に使う。
pub async fn interpret_sign(
    result: InvocationResult,
    staging: &StagingArea,
    output: &StagedFile,
    extension: &str,
) -> Result<SignedArtifact, GatewayError> {
    if !result.succeeded {
        let message = result.diagnostic().unwrap_or(GENERIC_SIGN_FAILURE);
        return Err(GatewayError::InvocationFailure(message.to_string()));
    }

    let bytes = staging.read(output).await.map_err(|e| {
        GatewayError::ArtifactMissing(format!("{}: {e}", output.path().display()))
    })?;

    Ok(SignedArtifact {
        file_name: output.file_name(),
        data_url: payload::encode(&bytes, payload::media_type_for_extension(extension)),
    })
}

/// 検証の呼び出し結果を解釈する。
pub fn interpret_verify(result: InvocationResult) -> VerifyResponse {
    VerifyResponse {
        ok: result.succeeded,
        output: result.stdout.trim().to_string(),
        error: result.stderr.trim().to_string(),
    }
}
