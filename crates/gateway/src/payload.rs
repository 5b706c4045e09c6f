//! # Payload Codec
//!
//! クライアントから受け取った画像表現（Data URLまたは素のBase64）と
//! 生バイト列の相互変換。副作用を持たない。

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use crate::error::GatewayError;

/// Base64エンジン（Standard、デコード時のパディング有無は問わない）
pub(crate) fn b64() -> GeneralPurpose {
    GeneralPurpose::new(
        &alphabet::STANDARD,
        GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
    )
}

/// デコード済みの画像ペイロード。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    /// Data URLに埋め込まれていたMIMEタイプ、なければ呼び出し側の既定値
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// 拡張子からMIMEタイプを推定する。pngのみ区別し、それ以外はjpegとして扱う。
pub fn media_type_for_extension(extension: &str) -> &'static str {
    if extension.eq_ignore_ascii_case("png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

/// 画像データをデコードする。
///
/// `data:<media-type>;base64,<body>` 形式ならその MIMEタイプを採用し、
/// そうでなければ文字列全体をBase64本体とみなして `default_media_type` を使う。
/// 本体が空、またはBase64として不正な場合は [`GatewayError::MalformedPayload`]。
pub fn decode(data: &str, default_media_type: &str) -> Result<DecodedPayload, GatewayError> {
    let (media_type, body) = match data.strip_prefix("data:") {
        Some(rest) => {
            let (header, body) = rest.split_once(',').ok_or_else(|| {
                GatewayError::MalformedPayload("Data URLに本体がありません".to_string())
            })?;
            let media_type = header.strip_suffix(";base64").ok_or_else(|| {
                GatewayError::MalformedPayload("Base64形式のData URLではありません".to_string())
            })?;
            if media_type.is_empty() {
                return Err(GatewayError::MalformedPayload(
                    "Data URLのMIMEタイプが空です".to_string(),
                ));
            }
            (media_type, body)
        }
        None => (default_media_type, data),
    };

    // 改行入りのBase64（MIME形式）を許容する
    let body: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if body.is_empty() {
        return Err(GatewayError::MalformedPayload("画像データが空です".to_string()));
    }

    let bytes = b64()
        .decode(body.as_bytes())
        .map_err(|e| GatewayError::MalformedPayload(format!("Base64デコードに失敗: {e}")))?;

    Ok(DecodedPayload {
        media_type: media_type.to_string(),
        bytes,
    })
}

/// バイト列をData URLにエンコードする。
pub fn encode(bytes: &[u8], media_type: &str) -> String {
    format!("data:{media_type};base64,{}", b64().encode(bytes))
}
