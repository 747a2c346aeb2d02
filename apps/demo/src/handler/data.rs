//! # ユーザー統計ハンドラ
//!
//! ```text
//! GET /data
//! ```
//!
//! データベース `example` の `users` テーブルを集計する。
//! 接続先のアダプタ（PostgreSQL / MySQL）に応じてクエリを切り替える。
//!
//! ```json
//! { "data": { "number_of_user": 2, "max_user_age": 41 } }
//! ```

use axum::{Json, extract::State};
use ignite_infra::db::DatabasePool;
use ignite_server::AppContext;
use serde::Serialize;

use super::EXAMPLE_RESOURCE;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct UserStats {
    pub number_of_user: i64,
    /// テーブルが空の場合は `null`
    pub max_user_age:   Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UserStatsResponse {
    pub data: UserStats,
}

pub async fn user_stats(
    State(ctx): State<AppContext>,
) -> Result<Json<UserStatsResponse>, ApiError> {
    let pool = ctx.resources.database(EXAMPLE_RESOURCE).await?;

    let (number_of_user, max_user_age) = match pool.as_ref() {
        DatabasePool::Postgres(pool) => {
            sqlx::query_as::<_, (i64, Option<i64>)>(
                "SELECT COUNT(*), MAX(age)::BIGINT FROM users",
            )
            .fetch_one(pool)
            .await?
        }
        DatabasePool::MySql(pool) => {
            sqlx::query_as::<_, (i64, Option<i64>)>(
                "SELECT COUNT(*), CAST(MAX(age) AS SIGNED) FROM users",
            )
            .fetch_one(pool)
            .await?
        }
    };

    Ok(Json(UserStatsResponse {
        data: UserStats {
            number_of_user,
            max_user_age,
        },
    }))
}
