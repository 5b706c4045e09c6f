//! # C2PA Attestation Gateway
//!
//! ブラウザクライアントから受け取った画像に対して c2patool を実行し、
//! 来歴情報の埋め込み（sign）と検証（verify）を行うHTTPゲートウェイ。
//!
//! ## 役割
//! - 画像ペイロード（Data URL / Base64）のデコード
//! - 作業ディレクトリ内への一時ファイルのステージングと後始末
//! - 実行バックエンド（ホスト上のc2patool / コンテナサンドボックス）の選択と準備
//! - 外部プロセスの実行と結果の解釈
//!
//! エンドポイント一覧は [`endpoints`] を参照。

mod backend;
mod config;
mod endpoints;
mod error;
mod interpret;
mod invoker;
mod payload;
mod staging;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::{GatewayConfig, GatewayState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::from_env()?;
    let state = Arc::new(GatewayState::from_config(&config)?);

    let static_dir = config::existing_dir(&config.static_dir);
    if static_dir.is_none() {
        tracing::info!(
            static_dir = %config.static_dir.display(),
            "静的ファイルのルートが無いため配信しません"
        );
    }

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(
        mode = ?config.mode,
        workdir = %config.workdir.display(),
        upload_dir = %state.staging.upload_dir().display(),
        output_dir = %state.staging.output_dir().display(),
        docker_image = %config.docker_image,
        "Gatewayを {} で起動します",
        addr
    );

    let app = endpoints::router(state, static_dir);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
