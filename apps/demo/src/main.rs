//! # Ignite デモアプリ
//!
//! Ignite のサーバー基盤の上に構築した HTTP アプリケーションの例。
//!
//! ## エンドポイント
//!
//! | パス | 内容 |
//! |------|------|
//! | `GET /health` | ヘルスチェック |
//! | `GET /ping` | `pong` を返す |
//! | `GET /counter` | キャッシュ `example` のカウンターを増やす |
//! | `GET /data` | データベース `example` の `users` を集計する |
//! | `GET /config?key=...` | 設定値をログに出力する |
//!
//! ## 起動
//!
//! ```bash
//! cargo run -p ignite-demo -- --config configs/default.yml
//! ```
//!
//! SIGINT / SIGTERM で処理中のリクエストを待ってから停止する。

mod error;
mod handler;

use axum::{Router, routing::get};
use clap::Parser;
use handler::{health_check, increment_counter, ping, show_config, user_stats};
use ignite_server::{AppConfig, AppContext, Bootstrap, Cli};

const SERVICE_NAME: &str = "ignite-demo";

/// ルーティングを構築する
fn app(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ping", get(ping))
        .route("/counter", get(increment_counter))
        .route("/data", get(user_stats))
        .route("/config", get(show_config))
        .with_state(ctx)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    let outcome = Bootstrap::new(SERVICE_NAME, config).serve_http(app).await?;
    tracing::info!(?outcome, "{} を終了しました", SERVICE_NAME);

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use pretty_assertions::assert_eq;
    use tower::ServiceExt as _;

    use super::*;

    fn context(yaml: &str) -> AppContext {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        AppContext::new(AppConfig::load(Some(file.path())).unwrap())
    }

    async fn get(ctx: AppContext, uri: &str) -> (StatusCode, String) {
        let response = app(ctx)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_pingはpongを返す() {
        let (status, body) = get(context("log:\n  level: info\n"), "/ping").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "pong");
    }

    #[tokio::test]
    async fn test_healthはバージョンを返す() {
        let (status, body) = get(context("log:\n  level: info\n"), "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_configはokを返す() {
        let (status, body) = get(
            context("http-server:\n  addr: \"127.0.0.1:9000\"\n"),
            "/config?key=http-server.addr",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_キャッシュ未設定のcounterはproblem_detailsを返す() {
        let (status, body) = get(context("log:\n  level: info\n"), "/counter").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], 500);
        assert_eq!(json["title"], "Internal Server Error");
        // 内部の詳細はレスポンスに含めない
        assert_eq!(json["detail"], "内部エラーが発生しました");
    }

    #[tokio::test]
    async fn test_終了後のdataは503を返す() {
        let ctx = context(
            "database:\n  example:\n    adapter: postgres\n    dsn: postgres://localhost/ignite\n",
        );
        ctx.resources.deinit_all().await;

        let (status, _) = get(ctx, "/data").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
