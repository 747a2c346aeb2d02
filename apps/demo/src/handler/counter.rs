//! # カウンターハンドラ
//!
//! ```text
//! GET /counter
//! ```
//!
//! キャッシュ `example` の `ignite:counter` を 1 増やし、増やした後の値を返す。
//!
//! ```json
//! { "count": 3 }
//! ```

use axum::{Json, extract::State};
use ignite_server::AppContext;
use redis::AsyncCommands;
use serde::Serialize;

use super::EXAMPLE_RESOURCE;
use crate::error::ApiError;

const COUNTER_KEY: &str = "ignite:counter";

#[derive(Debug, Serialize)]
pub struct CounterResponse {
    pub count: i64,
}

pub async fn increment_counter(
    State(ctx): State<AppContext>,
) -> Result<Json<CounterResponse>, ApiError> {
    let handle = ctx.resources.cache(EXAMPLE_RESOURCE).await?;
    // 複製は同じ多重化接続を共有する
    let mut conn = handle.connection()?;
    let count: i64 = conn.incr(COUNTER_KEY, 1).await?;

    Ok(Json(CounterResponse { count }))
}
