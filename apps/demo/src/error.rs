//! # デモアプリのエラー定義
//!
//! ハンドラで発生するエラーと、HTTP レスポンスへの変換を定義する。
//! 内部の詳細はログにのみ出力し、レスポンスには含めない。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ignite_infra::{InfraError, InfraErrorKind, ResourceError};
use serde::Serialize;
use thiserror::Error;

/// エラーレスポンス（RFC 7807 Problem Details）
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub error_type: String,
    pub title:      String,
    pub status:     u16,
    pub detail:     String,
}

/// ハンドラで発生するエラー
#[derive(Debug, Error)]
pub enum ApiError {
    /// リソースを取得できない
    #[error("リソースエラー: {0}")]
    Resource(#[from] ResourceError),

    /// 取得したハンドルが利用できない
    #[error("インフラエラー: {0}")]
    Infra(#[from] InfraError),

    /// Redis コマンドの失敗
    #[error("Redis エラー: {0}")]
    Redis(#[from] redis::RedisError),

    /// クエリの失敗
    #[error("データベースエラー: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, title, detail) = match &self {
            // 終了処理中、または接続先に到達できない
            ApiError::Resource(
                e @ (ResourceError::ManagerClosed { .. } | ResourceError::Connect { .. }),
            ) => {
                tracing::warn!(error = %e, "リソースを利用できません");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "https://ignite.example.com/errors/service-unavailable",
                    "Service Unavailable",
                    "リソースを一時的に利用できません".to_string(),
                )
            }
            ApiError::Infra(e) if matches!(e.kind(), InfraErrorKind::Closed(_)) => {
                tracing::warn!(error = %e, "クローズ済みのリソースが使われました");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "https://ignite.example.com/errors/service-unavailable",
                    "Service Unavailable",
                    "リソースを一時的に利用できません".to_string(),
                )
            }
            ApiError::Infra(e) => {
                tracing::error!(error = %e, "インフラエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "https://ignite.example.com/errors/internal-error",
                    "Internal Server Error",
                    "内部エラーが発生しました".to_string(),
                )
            }
            ApiError::Resource(e) => {
                tracing::error!(error = %e, "リソースの設定エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "https://ignite.example.com/errors/internal-error",
                    "Internal Server Error",
                    "内部エラーが発生しました".to_string(),
                )
            }
            ApiError::Redis(e) => {
                tracing::error!("Redis エラー: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "https://ignite.example.com/errors/internal-error",
                    "Internal Server Error",
                    "内部エラーが発生しました".to_string(),
                )
            }
            ApiError::Database(e) => {
                tracing::error!("データベースエラー: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "https://ignite.example.com/errors/internal-error",
                    "Internal Server Error",
                    "内部エラーが発生しました".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                error_type: error_type.to_string(),
                title: title.to_string(),
                status: status.as_u16(),
                detail,
            }),
        )
            .into_response()
    }
}
