//! # POST /api/verify
//!
//! ## 処理フロー
//! 1. ボディをパースし、imageDataをデコード（不正なら400、プロセスは起動しない）
//! 2. 実行バックエンドを解決・準備
//! 3. 入力をステージングし、c2patoolで検証（入力は完了後に必ず削除）
//! 4. 終了コードと両出力をそのまま返す
//!
//! ツールの非ゼロ終了は検証失敗という通常の結果であり、HTTP 200で `ok:false` を返す。

mod handler;


pub use handler::handle_verify;
