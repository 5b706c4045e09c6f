//! # 実行バックエンド抽象化
//!
//! 署名ツール（c2patool）の呼び出し方法を抽象化するトレイト。
//! バックエンドごとの違い（ホストの絶対パスか、マウント先からの相対パスか）は
//! 各実装の中に閉じ込め、呼び出し側は [`Invocation`] を実行するだけにする。
//!
//! 現在のバックエンド実装:
//! - `local` — ホスト上のc2patoolを直接実行
//! - `sandboxed` — コンテナランタイム経由でイメージ内のc2patoolを実行
//!
//! どちらを使うかは [`selector::BackendSelector`] がプロセスごとに一度だけ決める。

pub mod local;
pub mod sandboxed;
pub mod selector;

pub use local::LocalBackend;
pub use sandboxed::SandboxedBackend;
pub use selector::{BackendMode, BackendSelector};

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::GatewayError;

/// バックエンド種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// ホスト上で直接実行
    Local,
    /// コンテナ内で実行
    Sandboxed,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => f.write_str("local"),
            BackendKind::Sandboxed => f.write_str("sandboxed"),
        }
    }
}

/// 実行する外部プロセスの記述。
///
/// 組み立てと実行を分けることで、引数の組み立てをプロセスを起動せずに検証できる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
    /// タイムアウトで打ち切った後に実行する後始末の呼び出し
    pub on_timeout: Option<Box<Invocation>>,
}

impl Invocation {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            current_dir: None,
            on_timeout: None,
        }
    }

    /// `program arg1 arg2 ...` 形式のコマンド列から構築する。空ならNone。
    pub fn from_command_line<S: AsRef<OsStr>>(parts: &[S]) -> Option<Self> {
        let (program, args) = parts.split_first()?;
        Some(Self::new(program).args(args))
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn on_timeout(mut self, cleanup: Invocation) -> Self {
        self.on_timeout = Some(Box::new(cleanup));
        self
    }

    /// ログ出力用の表示文字列。
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 署名ツールに毎回渡す固定設定。
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// マニフェストJSONのパス
    pub manifest: PathBuf,
    /// トラストアンカー（PEMバンドル）のパス
    pub trust_bundle: PathBuf,
}

impl ToolSettings {
    /// 署名の引数列。
    ///
    /// `<input> -m <manifest> -o <output> -f trust --trust_anchors <bundle>`
    pub fn sign_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            input.into(),
            "-m".into(),
            self.manifest.as_os_str().to_os_string(),
            "-o".into(),
            output.into(),
            "-f".into(),
            "trust".into(),
            "--trust_anchors".into(),
            self.trust_bundle.as_os_str().to_os_string(),
        ]
    }

    /// 検証の引数列。
    ///
    /// `<input> trust --trust_anchors <bundle>`
    pub fn verify_args(&self, input: &Path) -> Vec<OsString> {
        vec![
            input.into(),
            "trust".into(),
            "--trust_anchors".into(),
            self.trust_bundle.as_os_str().to_os_string(),
        ]
    }
}

/// 実行バックエンドのトレイト。
#[async_trait::async_trait]
pub trait AttestationBackend: Send + Sync {
    /// バックエンド種別を返す。
    fn kind(&self) -> BackendKind;

    /// 呼び出し前の準備（サンドボックスイメージの確認・ビルド等）。
    ///
    /// セレクタが成功するまで高々一度ずつ呼ぶ。失敗時は次のリクエストで再試行される。
    async fn prepare(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    /// 署名呼び出しを組み立てる。`input`/`output` はホスト上の絶対パス。
    fn sign_invocation(&self, input: &Path, output: &Path) -> Result<Invocation, GatewayError>;

    /// 検証呼び出しを組み立てる。`input` はホスト上の絶対パス。
    fn verify_invocation(&self, input: &Path) -> Result<Invocation, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_command_line() {
        let inv = Invocation::from_command_line(&["sudo", "docker"]).unwrap();
        assert_eq!(inv.program, OsString::from("sudo"));
        assert_eq!(inv.args, vec![OsString::from("docker")]);
        assert!(Invocation::from_command_line::<&str>(&[]).is_none());
    }

    #[test]
    fn test_display() {
        let inv = Invocation::new("c2patool").args(["a.jpg", "trust"]);
        assert_eq!(inv.display(), "c2patool a.jpg trust");
    }

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Local.to_string(), "local");
        assert_eq!(BackendKind::Sandboxed.to_string(), "sandboxed");
    }
}
