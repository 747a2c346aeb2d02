//! # 設定参照ハンドラ
//!
//! ```text
//! GET /config?key=http-server.addr
//! ```
//!
//! 指定キーの設定値をログに出力し、`ok` を返す。値はレスポンスに含めない。

use axum::extract::{Query, State};
use ignite_server::AppContext;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ConfigQuery {
    #[serde(default)]
    pub key: String,
}

pub async fn show_config(
    State(ctx): State<AppContext>,
    Query(query): Query<ConfigQuery>,
) -> &'static str {
    match ctx.config.get_string(&query.key) {
        Some(value) => tracing::info!(key = %query.key, value = %value, "設定値を参照しました"),
        None => tracing::info!(key = %query.key, "設定値が見つかりません"),
    }
    "ok"
}
