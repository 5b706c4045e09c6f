//! # Attestation Invoker
//!
//! バックエンドが組み立てた呼び出しを実行し、終了状態と両出力ストリームを
//! そのまま [`InvocationResult`] として返す。終了コードの意味付けはしない。
//!
//! ## 実行モデル
//! 呼び出しは `tokio::spawn` したタスク上で実行し、リクエスト側はその完了を待つ。
//! 入力ファイルの所有権もタスクに移すため、HTTPリクエストが途中で切断されても
//! 外部プロセスは最後まで実行され、完了した時点で入力ファイルが削除される。

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{AttestationBackend, Invocation};
use crate::error::GatewayError;
use crate::staging::StagedFile;

/// 外部プロセスの実行結果。解釈前の生データ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    /// 終了コード0で終了したか
    pub succeeded: bool,
    /// 終了コード（シグナル終了・起動失敗・タイムアウト時はNone）
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl InvocationResult {
    /// プロセスを起動できなかった、またはタイムアウトした場合の結果。
    fn failed(message: String) -> Self {
        Self {
            succeeded: false,
            exit_code: None,
            stdout: String::new(),
            stderr: message,
        }
    }

    /// 診断用テキスト。空白除去後の標準エラー、なければ標準出力。
    pub fn diagnostic(&self) -> Option<&str> {
        [self.stderr.trim(), self.stdout.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
    }
}

/// タイムアウト後の後始末呼び出しに許す時間
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// 呼び出しを実行し、終了を待つ。
///
/// `timeout` を超えた場合はプロセスを終了させ、登録されていれば後始末の呼び出しを
/// 実行したうえで失敗として返す。
pub async fn run(invocation: &Invocation, timeout: Option<Duration>) -> InvocationResult {
    let limit = match execute(invocation, timeout).await {
        Ok(result) => return result,
        Err(limit) => limit,
    };

    if let Some(cleanup) = invocation.on_timeout.as_deref() {
        match execute(cleanup, Some(CLEANUP_TIMEOUT)).await {
            Ok(result) if result.succeeded => {
                tracing::debug!(command = %cleanup.display(), "タイムアウト後の後始末を実行");
            }
            Ok(result) => tracing::warn!(
                command = %cleanup.display(),
                diagnostic = result.diagnostic().unwrap_or(""),
                "タイムアウト後の後始末に失敗"
            ),
            Err(_) => tracing::warn!(command = %cleanup.display(), "タイムアウト後の後始末もタイムアウト"),
        }
    }

    InvocationResult::failed(format!(
        "{} の実行がタイムアウトしました ({}秒)",
        invocation.program.to_string_lossy(),
        limit.as_secs_f64()
    ))
}

/// プロセスを1回実行する。タイムアウトした場合は `Err(上限)`。
async fn execute(
    invocation: &Invocation,
    timeout: Option<Duration>,
) -> Result<InvocationResult, Duration> {
    let mut command = tokio::process::Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &invocation.current_dir {
        command.current_dir(dir);
    }

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Ok(InvocationResult::failed(format!(
                "{} の起動に失敗: {e}",
                invocation.program.to_string_lossy()
            )))
        }
    };

    let output = match timeout {
        // タイムアウト時はwait_with_outputのFutureごとchildが破棄され、kill_on_dropで終了する
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| limit)?,
        None => child.wait_with_output().await,
    };

    Ok(match output {
        Ok(output) => InvocationResult {
            succeeded: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        },
        Err(e) => InvocationResult::failed(format!("プロセスの待機に失敗: {e}")),
    })
}

/// 署名・検証の呼び出しを実行するInvoker。
#[derive(Debug, Clone, Default)]
pub struct Invoker {
    /// 呼び出しごとのタイムアウト（未設定なら無制限）
    timeout: Option<Duration>,
}

impl Invoker {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// 署名を実行する。`input` は完了後に削除される。
    ///
    /// `output` も実行タスクに預け、完了後に返す。リクエストが途中で破棄された場合は
    /// タスクの終了時に `output` がDropされる。
    pub async fn sign(
        &self,
        backend: &Arc<dyn AttestationBackend>,
        input: StagedFile,
        output: StagedFile,
    ) -> Result<(InvocationResult, StagedFile), GatewayError> {
        let invocation = backend.sign_invocation(input.path(), output.path())?;
        self.dispatch("sign", backend, invocation, input, output).await
    }

    /// 検証を実行する。`input` は完了後に削除される。
    pub async fn verify(
        &self,
        backend: &Arc<dyn AttestationBackend>,
        input: StagedFile,
    ) -> Result<InvocationResult, GatewayError> {
        let invocation = backend.verify_invocation(input.path())?;
        let (result, ()) = self.dispatch("verify", backend, invocation, input, ()).await?;
        Ok(result)
    }

    async fn dispatch<T: Send + 'static>(
        &self,
        operation: &'static str,
        backend: &Arc<dyn AttestationBackend>,
        invocation: Invocation,
        input: StagedFile,
        held: T,
    ) -> Result<(InvocationResult, T), GatewayError> {
        let timeout = self.timeout;
        let kind = backend.kind();
        tracing::debug!(operation, backend = %kind, command = %invocation.display(), "c2patoolを実行");

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let result = run(&invocation, timeout).await;
            drop(input);
            tracing::info!(
                operation,
                backend = %kind,
                succeeded = result.succeeded,
                exit_code = ?result.exit_code,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "c2patoolの実行が完了"
            );
            (result, held)
        });

        task.await
            .map_err(|e| GatewayError::Internal(format!("呼び出しタスクが異常終了: {e}")))
    }
}
