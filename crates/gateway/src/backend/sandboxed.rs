//! # サンドボックスバックエンド
//!
//! コンテナランタイム（既定はdocker）経由で、イメージ内のc2patoolを実行する。
//!
//! 作業ディレクトリを `/app` にバインドマウントし、コンテナ内の作業ディレクトリも
//! `/app` とする。ツールに渡すパスは全てマウントルートからの相対パスに変換し、
//! ホストの絶対パスは渡さない。

use std::path::{Component, Path, PathBuf};

use super::{AttestationBackend, BackendKind, Invocation, ToolSettings};
use crate::error::GatewayError;
use crate::invoker;

/// コンテナ内のマウント先
pub const MOUNT_POINT: &str = "/app";

/// イメージ内のc2patoolコマンド名
pub const SANDBOX_TOOL: &str = "c2patool";

/// 実行コンテナ名のプレフィックス
const CONTAINER_NAME_PREFIX: &str = "c2pa-attest-";

/// コンテナ内でc2patoolを実行するバックエンド。
pub struct SandboxedBackend {
    /// コンテナランタイムのコマンド列（例: `["docker"]`, `["sudo", "docker"]`）
    runtime: Vec<String>,
    /// イメージタグ
    image: String,
    /// マウントルートからの相対パスに変換済みの固定設定
    settings: ToolSettings,
    /// マウントするホスト側ディレクトリ（絶対パス）
    workdir: PathBuf,
    /// イメージが無い場合のビルドコンテキスト
    build_context: PathBuf,
}

impl SandboxedBackend {
    /// 新しいSandboxedBackendを作成する。
    ///
    /// マニフェストとトラストバンドルはここでマウント相対パスに変換する。
    /// 作業ディレクトリの外を指している場合はコンテナから見えないためエラー。
    pub fn new(
        runtime: Vec<String>,
        image: impl Into<String>,
        settings: ToolSettings,
        workdir: PathBuf,
        build_context: PathBuf,
    ) -> Result<Self, GatewayError> {
        if runtime.is_empty() {
            return Err(GatewayError::BackendUnavailable(
                "コンテナランタイムが指定されていません".to_string(),
            ));
        }
        let settings = ToolSettings {
            manifest: mount_relative(&workdir, &settings.manifest)?,
            trust_bundle: mount_relative(&workdir, &settings.trust_bundle)?,
        };
        Ok(Self {
            runtime,
            image: image.into(),
            settings,
            workdir,
            build_context,
        })
    }

    fn runtime_invocation(&self) -> Invocation {
        // newで空でないことを確認済み
        Invocation::from_command_line(&self.runtime)
            .unwrap_or_else(|| Invocation::new("docker"))
            .current_dir(&self.workdir)
    }

    /// `run --rm --name <name> -v <workdir>:/app -w /app <image> c2patool` までの共通部分。
    ///
    /// タイムアウト時はランタイムのクライアントを終了させるだけではコンテナが残るため、
    /// 呼び出しごとにコンテナ名を付け、`<runtime> kill <name>` を後始末として登録する。
    fn run_invocation(&self) -> Invocation {
        let name = container_name();
        let mut volume = self.workdir.as_os_str().to_os_string();
        volume.push(":");
        volume.push(MOUNT_POINT);
        self.runtime_invocation()
            .args(["run", "--rm", "--name", name.as_str(), "-v"])
            .arg(volume)
            .args(["-w", MOUNT_POINT])
            .arg(&self.image)
            .arg(SANDBOX_TOOL)
            .on_timeout(self.runtime_invocation().arg("kill").arg(&name))
    }
}

/// 呼び出しごとに一意なコンテナ名。
fn container_name() -> String {
    let id: [u8; 8] = rand::random();
    format!("{CONTAINER_NAME_PREFIX}{}", hex::encode(id))
}

/// ホスト上のパスをマウントルートからの相対パスに変換する。
///
/// 相対パスは作業ディレクトリ基準とみなしてそのまま返す。
/// `..` でマウントの外に出るパスは拒否する。
pub fn mount_relative(workdir: &Path, path: &Path) -> Result<PathBuf, GatewayError> {
    let outside = || {
        GatewayError::Internal(format!(
            "{} は作業ディレクトリ {} の外にあるためコンテナから参照できません",
            path.display(),
            workdir.display()
        ))
    };
    let relative = if path.is_relative() {
        path.to_path_buf()
    } else {
        path.strip_prefix(workdir)
            .map(Path::to_path_buf)
            .map_err(|_| outside())?
    };
    if relative
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(outside());
    }
    Ok(relative)
}

#[async_trait::async_trait]
impl AttestationBackend for SandboxedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sandboxed
    }

    /// イメージの存在を確認し、無ければビルドする。
    async fn prepare(&self) -> Result<(), GatewayError> {
        let inspect = self
            .runtime_invocation()
            .args(["image", "inspect"])
            .arg(&self.image);
        if invoker::run(&inspect, None).await.succeeded {
            tracing::debug!(image = %self.image, "サンドボックスイメージは存在します");
            return Ok(());
        }

        tracing::info!(image = %self.image, context = %self.build_context.display(), "サンドボックスイメージをビルドします");
        let build = self
            .runtime_invocation()
            .args(["build", "-t"])
            .arg(&self.image)
            .arg(&self.build_context);
        let result = invoker::run(&build, None).await;
        if !result.succeeded {
            tracing::error!(image = %self.image, stderr = %result.stderr.trim(), "サンドボックスイメージのビルドに失敗");
            return Err(GatewayError::BackendUnavailable(format!(
                "イメージ {} のビルドに失敗: {}",
                self.image,
                result.diagnostic().unwrap_or("出力なし")
            )));
        }
        tracing::info!(image = %self.image, "サンドボックスイメージのビルド完了");
        Ok(())
    }

    fn sign_invocation(&self, input: &Path, output: &Path) -> Result<Invocation, GatewayError> {
        let input = mount_relative(&self.workdir, input)?;
        let output = mount_relative(&self.workdir, output)?;
        Ok(self
            .run_invocation()
            .args(self.settings.sign_args(&input, &output)))
    }

    fn verify_invocation(&self, input: &Path) -> Result<Invocation, GatewayError> {
        let input = mount_relative(&self.workdir, input)?;
        Ok(self.run_invocation().args(self.settings.verify_args(&input)))
    }
}
