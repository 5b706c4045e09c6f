//! # Temporary File Manager
//!
//! 同時リクエストが共有するステージングディレクトリへの入力書き込み、
//! 出力パスの予約、出力の読み戻し、一時ファイルの後始末を担う。
//!
//! ## 衝突回避
//! ロックは使わない。ファイル名は64bitの乱数hexを含み、さらに `create_new` で
//! 作成するため、万一衝突しても既存ファイルを上書きせず別名で再試行する。
//!
//! ## 後始末
//! 入力ファイルは [`StagedFile`] のDropで必ず削除される（成功・失敗・パニックの
//! いずれの経路でも）。出力ファイルは既定では残し、[`StagedFile::discard_on_drop`]
//! を指定した場合のみDropで削除する。
//!
//! 削除は同期的に行う。Dropが返った時点でファイルは消えており、レスポンスより後に
//! 削除が遅れることはない。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::GatewayError;

/// 署名入力ファイルのプレフィックス
pub const SIGN_INPUT_PREFIX: &str = "in";
/// 検証入力ファイルのプレフィックス
pub const VERIFY_INPUT_PREFIX: &str = "verify";
/// 署名済み出力ファイルのプレフィックス
pub const SIGNED_OUTPUT_PREFIX: &str = "signed";

/// 拡張子が取れない場合の既定値
pub const DEFAULT_EXTENSION: &str = "jpg";

/// ファイル名に含める乱数のバイト数（hexで16文字）
const NAME_ENTROPY_BYTES: usize = 8;

/// 名前衝突時の再試行回数
const MAX_NAME_ATTEMPTS: usize = 4;

/// 一時ファイルの寿命区分。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// 呼び出し完了直後に削除される入力
    Input,
    /// レスポンスに読み戻されるまで保持される出力
    Output,
}

/// リクエストが排他的に所有する一時ファイル。
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    lifetime: Lifetime,
    /// Drop時に削除するか
    armed: bool,
}

impl StagedFile {
    fn new(path: PathBuf, lifetime: Lifetime) -> Self {
        Self {
            path,
            lifetime,
            armed: lifetime == Lifetime::Input,
        }
    }

    /// 絶対パス。
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// ディレクトリを除いたファイル名。
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Drop時に削除するよう指定する（出力を残さない場合）。
    pub fn discard_on_drop(mut self) -> Self {
        self.armed = true;
        self
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.armed {
            remove_best_effort(&self.path, self.lifetime);
        }
    }
}

fn remove_best_effort(path: &Path, lifetime: Lifetime) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), ?lifetime, "一時ファイルを削除"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), ?lifetime, error = %e, "一時ファイルの削除に失敗")
        }
    }
}

/// 元のファイル名から拡張子を取り出す。
///
/// 英数字のみ・8文字以内のものだけを採用し、小文字に正規化する。
/// それ以外（拡張子なし、パス区切りや記号を含む等）は `jpg`。
pub fn image_extension(image_name: Option<&str>) -> String {
    image_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// `<prefix>_<乱数hex>.<ext>` 形式のファイル名を生成する。
pub fn unique_name(prefix: &str, extension: &str) -> String {
    let id: [u8; NAME_ENTROPY_BYTES] = rand::random();
    format!("{prefix}_{}.{extension}", hex::encode(id))
}

/// 入力用・出力用ディレクトリの組。
#[derive(Debug, Clone)]
pub struct StagingArea {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl StagingArea {
    /// 新しいStagingAreaを作成する。ディレクトリは初回使用時に作られる。
    pub fn new(upload_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            upload_dir,
            output_dir,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 入力バイト列をステージングディレクトリに書き込む。
    pub async fn stage(
        &self,
        prefix: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<StagedFile, GatewayError> {
        let (staged, mut file) =
            create_unique(&self.upload_dir, prefix, extension, Lifetime::Input).await?;
        // 書き込み失敗時はstagedのDropで削除される
        file.write_all(bytes)
            .await
            .map_err(|e| GatewayError::Staging(format!("入力ファイルの書き込みに失敗: {e}")))?;
        file.flush()
            .await
            .map_err(|e| GatewayError::Staging(format!("入力ファイルの書き込みに失敗: {e}")))?;
        tracing::debug!(path = %staged.path().display(), bytes = bytes.len(), "入力をステージング");
        Ok(staged)
    }

    /// 出力先パスを予約する。
    ///
    /// ツールが書き込めるよう予約用の空ファイルは残さず、名前だけを確定させる。
    pub async fn reserve_output(
        &self,
        prefix: &str,
        extension: &str,
    ) -> Result<StagedFile, GatewayError> {
        let (staged, file) =
            create_unique(&self.output_dir, prefix, extension, Lifetime::Output).await?;
        drop(file);
        // 予約ファイルを消しておくことで「成功したのに出力なし」を検出できる
        tokio::fs::remove_file(staged.path())
            .await
            .map_err(|e| GatewayError::Staging(format!("出力パスの予約に失敗: {e}")))?;
        Ok(staged)
    }

    /// ツールが書き出したファイルを読み戻す。
    pub async fn read(&self, file: &StagedFile) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(file.path()).await
    }
}

async fn create_unique(
    dir: &Path,
    prefix: &str,
    extension: &str,
    lifetime: Lifetime,
) -> Result<(StagedFile, tokio::fs::File), GatewayError> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        GatewayError::Staging(format!("ディレクトリの作成に失敗 ({}): {e}", dir.display()))
    })?;

    for _ in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(unique_name(prefix, extension));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((StagedFile::new(path, lifetime), file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::warn!(path = %path.display(), "一時ファイル名が衝突、再生成します");
            }
            Err(e) => {
                return Err(GatewayError::Staging(format!(
                    "一時ファイルの作成に失敗 ({}): {e}",
                    path.display()
                )))
            }
        }
    }

    Err(GatewayError::Staging(
        "一意な一時ファイル名を確保できませんでした".to_string(),
    ))
}
