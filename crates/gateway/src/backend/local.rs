//! # ローカルバックエンド
//!
//! ホスト上のc2patoolを直接実行する。パスはホスト上の絶対パスをそのまま渡す。

use std::path::{Path, PathBuf};

use super::{AttestationBackend, BackendKind, Invocation, ToolSettings};
use crate::error::GatewayError;

/// ホスト上のc2patoolを直接実行するバックエンド。
pub struct LocalBackend {
    /// c2patoolの実行ファイル（PATH上の名前または絶対パス）
    program: String,
    settings: ToolSettings,
    /// 実行時の作業ディレクトリ（相対指定のマニフェスト等の基準）
    workdir: PathBuf,
}

impl LocalBackend {
    pub fn new(program: impl Into<String>, settings: ToolSettings, workdir: PathBuf) -> Self {
        Self {
            program: program.into(),
            settings,
            workdir,
        }
    }

    /// ホスト上でツールが使えるかを確かめる無害な呼び出し（`--help`）。
    pub fn probe_invocation(&self) -> Invocation {
        Invocation::new(&self.program)
            .arg("--help")
            .current_dir(&self.workdir)
    }
}

#[async_trait::async_trait]
impl AttestationBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn sign_invocation(&self, input: &Path, output: &Path) -> Result<Invocation, GatewayError> {
        Ok(Invocation::new(&self.program)
            .args(self.settings.sign_args(input, output))
            .current_dir(&self.workdir))
    }

    fn verify_invocation(&self, input: &Path) -> Result<Invocation, GatewayError> {
        Ok(Invocation::new(&self.program)
            .args(self.settings.verify_args(input))
            .current_dir(&self.workdir))
    }
}
