//! # POST /api/sign
//!
//! ## 処理フロー
//! 1. ボディをパースし、imageDataをデコード（不正なら400、プロセスは起動しない）
//! 2. 実行バックエンドを解決・準備（準備失敗は500）
//! 3. 入力をステージングし、出力パスを予約
//! 4. c2patoolで署名（入力は完了後に必ず削除）
//! 5. 結果を解釈し、署名済み画像をData URLで返却
//!
//! 署名済み出力はKEEP_SIGNED_OUTPUT=falseの場合のみ削除する。切断で処理が中断された
//! 場合も、c2patoolの完了時に削除される。

mod handler;


pub use handler::handle_sign;
