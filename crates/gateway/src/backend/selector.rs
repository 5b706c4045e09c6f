//! # 実行バックエンドセレクタ
//!
//! どのバックエンドを使うかをプロセスごとに一度だけ決め、その準備も一度だけ行う。
//!
//! ## 解決ポリシー
//! 1. `C2PA_MODE=local` ならLocal、`docker`/`sandboxed` ならSandboxed
//! 2. 指定なしの場合、ホスト上のc2patoolが `--help` に正常終了すればLocal
//! 3. それ以外はSandboxed
//!
//! 解決結果と準備完了状態はそれぞれ [`tokio::sync::OnceCell`] に保持する。
//! 初期化中に到着したリクエストは進行中の初期化を待ち、重複した探索やビルドは
//! 発生しない。準備に失敗した場合はセルが空のまま残り、次のリクエストが再試行する。

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use super::{AttestationBackend, BackendKind, Invocation, LocalBackend};
use crate::error::GatewayError;
use crate::invoker;

/// ローカル探索呼び出しのタイムアウト
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// 運用者によるバックエンド指定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// ローカル探索の結果で決める
    Auto,
    /// 常にLocal
    Local,
    /// 常にSandboxed
    Sandboxed,
}

impl FromStr for BackendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(BackendMode::Auto),
            "local" => Ok(BackendMode::Local),
            "docker" | "sandbox" | "sandboxed" | "container" => Ok(BackendMode::Sandboxed),
            other => Err(format!("不明なC2PA_MODEです: {other}")),
        }
    }
}

/// 解決に使う候補と探索方法。
struct ResolutionPolicy {
    mode: BackendMode,
    local: Arc<dyn AttestationBackend>,
    sandboxed: Arc<dyn AttestationBackend>,
    probe: Invocation,
}

/// プロセス全体で共有するバックエンドセレクタ。
pub struct BackendSelector {
    /// 解決済みで生成された場合はNone
    policy: Option<ResolutionPolicy>,
    resolved: OnceCell<Arc<dyn AttestationBackend>>,
    ready: OnceCell<()>,
    /// 探索の実行回数（ログ用）
    probe_count: AtomicUsize,
}

impl BackendSelector {
    /// 運用者指定と2つの候補からセレクタを作成する。解決は初回使用時。
    pub fn new(
        mode: BackendMode,
        local: Arc<LocalBackend>,
        sandboxed: Arc<dyn AttestationBackend>,
    ) -> Self {
        let probe = local.probe_invocation();
        Self {
            policy: Some(ResolutionPolicy {
                mode,
                local,
                sandboxed,
                probe,
            }),
            resolved: OnceCell::new(),
            ready: OnceCell::new(),
            probe_count: AtomicUsize::new(0),
        }
    }

    /// 解決済みのバックエンドを持つセレクタを作成する。準備は初回使用時に行う。
    pub fn fixed(backend: Arc<dyn AttestationBackend>) -> Self {
        Self {
            policy: None,
            resolved: OnceCell::new_with(Some(backend)),
            ready: OnceCell::new(),
            probe_count: AtomicUsize::new(0),
        }
    }

    /// 使用するバックエンドを返す。初回のみ探索し、以降はキャッシュを返す。
    pub async fn resolve(&self) -> Result<Arc<dyn AttestationBackend>, GatewayError> {
        self.resolved
            .get_or_try_init(|| async {
                let policy = self.policy.as_ref().ok_or_else(|| {
                    GatewayError::Internal("バックエンドの解決ポリシーがありません".to_string())
                })?;
                let backend = self.decide(policy).await;
                tracing::info!(backend = %backend.kind(), mode = ?policy.mode, "実行バックエンドを決定");
                Ok::<_, GatewayError>(backend)
            })
            .await
            .cloned()
    }

    /// バックエンドを解決し、準備が済んでいなければ準備してから返す。
    pub async fn acquire(&self) -> Result<Arc<dyn AttestationBackend>, GatewayError> {
        let backend = self.resolve().await?;
        self.ready.get_or_try_init(|| backend.prepare()).await?;
        Ok(backend)
    }

    /// 解決済みなら種別を返す（ヘルスチェック・ログ用）。
    pub fn resolved_kind(&self) -> Option<BackendKind> {
        self.resolved.get().map(|b| b.kind())
    }

    async fn decide(&self, policy: &ResolutionPolicy) -> Arc<dyn AttestationBackend> {
        match policy.mode {
            BackendMode::Local => policy.local.clone(),
            BackendMode::Sandboxed => policy.sandboxed.clone(),
            BackendMode::Auto => {
                let attempt = self.probe_count.fetch_add(1, Ordering::SeqCst) + 1;
                let result = invoker::run(&policy.probe, Some(PROBE_TIMEOUT)).await;
                tracing::debug!(attempt, succeeded = result.succeeded, "ホスト上のc2patoolを探索");
                if result.succeeded {
                    policy.local.clone()
                } else {
                    tracing::info!(probe = %policy.probe.display(), attempt, "ホスト上のc2patoolが見つかりません");
                    policy.sandboxed.clone()
                }
            }
        }
    }

    #[cfg(test)]
    fn with_probe(mut self, probe: Invocation) -> Self {
        if let Some(policy) = self.policy.as_mut() {
            policy.probe = probe;
        }
        self
    }

    #[cfg(test)]
    fn probe_count(&self) -> usize {
        self.probe_count.load(Ordering::SeqCst)
    }
}
