//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::backend::{BackendMode, BackendSelector, LocalBackend, SandboxedBackend, ToolSettings};
use crate::invoker::Invoker;
use crate::staging::StagingArea;

/// 環境変数から読み込む設定。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// 待ち受けポート
    pub port: u16,
    /// 作業ディレクトリ（絶対パス）。サンドボックスにマウントされる
    pub workdir: PathBuf,
    /// 入力ファイルのステージングディレクトリ
    pub upload_dir: PathBuf,
    /// 署名済み出力の書き出し先
    pub output_dir: PathBuf,
    /// バックエンド指定
    pub mode: BackendMode,
    /// ホスト上のc2patool
    pub tool_bin: String,
    /// サンドボックスイメージのタグ
    pub docker_image: String,
    /// コンテナランタイムのコマンド列
    pub container_runtime: Vec<String>,
    /// イメージのビルドコンテキスト
    pub build_context: PathBuf,
    /// マニフェストJSONのパス
    pub manifest: PathBuf,
    /// トラストアンカーのパス
    pub trust_bundle: PathBuf,
    /// 呼び出しごとのタイムアウト
    pub invocation_timeout: Option<Duration>,
    /// 署名済み出力を調査用に残すか
    pub keep_signed_output: bool,
    /// 静的ファイル（クライアントのビルド成果物）のルート
    pub static_dir: PathBuf,
}

impl GatewayConfig {
    /// プロセスの環境変数から読み込む。
    pub fn from_env() -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().context("カレントディレクトリの取得に失敗")?;
        Self::from_lookup(cwd, |key| std::env::var(key).ok())
    }

    /// 任意のキー参照関数から読み込む。相対パスの基準は `cwd`。
    pub fn from_lookup<F>(cwd: PathBuf, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("PORTが不正です: {v}"))?,
            None => 8080,
        };

        let workdir = normalize_lexically(&match var("C2PA_WORKDIR") {
            Some(v) => cwd.join(v),
            None => cwd,
        });
        let within = |path: PathBuf| normalize_lexically(&workdir.join(path));

        let upload_dir = var("C2PA_UPLOAD_DIR")
            .map(|v| within(v.into()))
            .unwrap_or_else(|| workdir.join("uploads"));
        let output_dir = var("C2PA_OUTPUT_DIR")
            .map(|v| within(v.into()))
            .unwrap_or_else(|| workdir.clone());
        // サンドボックスからは作業ディレクトリしか見えない
        for (name, dir) in [("C2PA_UPLOAD_DIR", &upload_dir), ("C2PA_OUTPUT_DIR", &output_dir)] {
            if !dir.starts_with(&workdir) {
                bail!(
                    "{name} ({}) は作業ディレクトリ {} の内側である必要があります",
                    dir.display(),
                    workdir.display()
                );
            }
        }

        let mode = var("C2PA_MODE")
            .map(|v| v.parse::<BackendMode>())
            .transpose()
            .map_err(anyhow::Error::msg)?
            .unwrap_or(BackendMode::Auto);

        let container_runtime: Vec<String> = var("C2PA_CONTAINER_RUNTIME")
            .unwrap_or_else(|| "docker".to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let invocation_timeout = match var("C2PA_TIMEOUT_SECS") {
            Some(v) => {
                let secs: u64 = v
                    .trim()
                    .parse()
                    .with_context(|| format!("C2PA_TIMEOUT_SECSが不正です: {v}"))?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        let keep_signed_output = match var("KEEP_SIGNED_OUTPUT") {
            Some(v) => parse_bool(&v)
                .with_context(|| format!("KEEP_SIGNED_OUTPUTが不正です: {v}"))?,
            None => true,
        };

        Ok(Self {
            port,
            upload_dir,
            output_dir,
            mode,
            tool_bin: var("C2PATOOL_BIN").unwrap_or_else(|| "c2patool".to_string()),
            docker_image: var("C2PA_DOCKER_IMAGE").unwrap_or_else(|| "c2pa-demo".to_string()),
            container_runtime,
            build_context: var("C2PA_BUILD_CONTEXT")
                .map(|v| within(v.into()))
                .unwrap_or_else(|| workdir.clone()),
            manifest: PathBuf::from(var("MANIFEST_PATH").unwrap_or_else(|| "manifest.json".to_string())),
            trust_bundle: PathBuf::from(
                var("TRUST_BUNDLE_PATH").unwrap_or_else(|| "C2PA-TRUST-BUNDLE.pem".to_string()),
            ),
            invocation_timeout,
            keep_signed_output,
            static_dir: var("STATIC_DIR")
                .map(|v| within(v.into()))
                .unwrap_or_else(|| workdir.join("client").join("dist")),
            workdir,
        })
    }

    fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            manifest: self.manifest.clone(),
            trust_bundle: self.trust_bundle.clone(),
        }
    }
}

/// `.` を除き `..` を直前の要素と相殺する。ファイルシステムは参照しない。
///
/// ルートより上に出る `..` は捨てる。
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(Component::ParentDir),
            },
            other => normalized.push(other),
        }
    }
    normalized
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// 一時ファイル管理
    pub staging: StagingArea,
    /// 実行バックエンドの選択と準備
    pub selector: BackendSelector,
    /// 外部プロセスの実行
    pub invoker: Invoker,
    /// 署名済み出力を残すか
    pub keep_signed_output: bool,
}

impl GatewayState {
    /// 設定から共有状態を構築する。
    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let local = Arc::new(LocalBackend::new(
            config.tool_bin.clone(),
            config.tool_settings(),
            config.workdir.clone(),
        ));
        let sandboxed = Arc::new(
            SandboxedBackend::new(
                config.container_runtime.clone(),
                config.docker_image.clone(),
                config.tool_settings(),
                config.workdir.clone(),
                config.build_context.clone(),
            )
            .context("サンドボックスバックエンドの構築に失敗")?,
        );

        Ok(Self {
            staging: StagingArea::new(config.upload_dir.clone(), config.output_dir.clone()),
            selector: BackendSelector::new(config.mode, local, sandboxed),
            invoker: Invoker::new(config.invocation_timeout),
            keep_signed_output: config.keep_signed_output,
        })
    }
}

/// 静的ファイルのルートが存在する場合のみ返す。
pub fn existing_dir(path: &Path) -> Option<PathBuf> {
    path.is_dir().then(|| path.to_path_buf())
}
