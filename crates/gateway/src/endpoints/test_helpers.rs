//! # エンドポイントテスト用共通ヘルパー
//!
//! c2patoolの代わりに `sh -c` スクリプトを実行するスタブバックエンドと、
//! テスト用Gatewayの起動処理。

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{AttestationBackend, BackendKind, BackendSelector, Invocation};
use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::invoker::Invoker;
use crate::staging::StagingArea;

/// スクリプトでc2patoolを模倣するバックエンド。
///
/// スクリプト内では `$1` が入力パス、`$2` が出力パス（署名のみ）。
pub struct StubBackend {
    kind: BackendKind,
    sign_script: String,
    verify_script: String,
    prepare_calls: AtomicUsize,
    prepare_delay: Duration,
    fail_prepare: bool,
}

impl StubBackend {
    fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            sign_script: r#"cp "$1" "$2""#.to_string(),
            verify_script: "exit 0".to_string(),
            prepare_calls: AtomicUsize::new(0),
            prepare_delay: Duration::ZERO,
            fail_prepare: false,
        }
    }

    pub fn local() -> Self {
        Self::new(BackendKind::Local)
    }

    pub fn sandboxed() -> Self {
        Self::new(BackendKind::Sandboxed)
    }

    pub fn sign_script(mut self, script: &str) -> Self {
        self.sign_script = script.to_string();
        self
    }

    pub fn verify_script(mut self, script: &str) -> Self {
        self.verify_script = script.to_string();
        self
    }

    pub fn with_prepare_delay(mut self, delay: Duration) -> Self {
        self.prepare_delay = delay;
        self
    }

    pub fn failing_prepare(mut self) -> Self {
        self.fail_prepare = true;
        self
    }

    pub fn prepare_count(&self) -> usize {
        self.prepare_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AttestationBackend for StubBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn prepare(&self) -> Result<(), GatewayError> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.prepare_delay).await;
        if self.fail_prepare {
            return Err(GatewayError::BackendUnavailable(
                "イメージのビルドに失敗".to_string(),
            ));
        }
        Ok(())
    }

    fn sign_invocation(&self, input: &Path, output: &Path) -> Result<Invocation, GatewayError> {
        Ok(Invocation::new("sh")
            .args(["-c", self.sign_script.as_str(), "stub"])
            .arg(input)
            .arg(output))
    }

    fn verify_invocation(&self, input: &Path) -> Result<Invocation, GatewayError> {
        Ok(Invocation::new("sh")
            .args(["-c", self.verify_script.as_str(), "stub"])
            .arg(input))
    }
}

/// テスト用GatewayStateを構築するヘルパー。ステージング先は `root` 配下。
pub fn test_state(root: &Path, backend: Arc<dyn AttestationBackend>) -> Arc<GatewayState> {
    test_state_with(root, backend, Invoker::default(), true)
}

pub fn test_state_with(
    root: &Path,
    backend: Arc<dyn AttestationBackend>,
    invoker: Invoker,
    keep_signed_output: bool,
) -> Arc<GatewayState> {
    Arc::new(GatewayState {
        staging: StagingArea::new(root.join("uploads"), root.to_path_buf()),
        selector: BackendSelector::fixed(backend),
        invoker,
        keep_signed_output,
    })
}

/// ステージングディレクトリに残っているファイル数。
pub fn staged_file_count(root: &Path) -> usize {
    match std::fs::read_dir(root.join("uploads")) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

/// ルートディレクトリ直下の署名済み出力ファイル名一覧。
pub fn signed_outputs(root: &Path) -> Vec<String> {
    std::fs::read_dir(root)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("signed_"))
        .collect()
}

/// テスト用Gatewayを起動し、ポート番号を返す。
pub async fn start_gateway(
    state: Arc<GatewayState>,
    static_dir: Option<std::path::PathBuf>,
) -> u16 {
    let app = super::router(state, static_dir);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    port
}
