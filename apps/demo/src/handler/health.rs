//! # ヘルスチェックハンドラ
//!
//! ```text
//! GET /health
//! ```
//!
//! リソースへの接続は確認しない（プロセスが応答できることのみを示す）。

use axum::Json;
use ignite_shared::HealthResponse;

/// ヘルスチェックエンドポイント
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy(env!("CARGO_PKG_VERSION")))
}
