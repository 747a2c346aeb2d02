//! # Bootstrap
//!
//! プロセスの起動から終了までを 1 か所にまとめる。
//!
//! 1. ロギングを初期化する
//! 2. リソースレジストリを作成する（接続は遅延）
//! 3. 渡された処理（または HTTP サーバー）を実行する
//! 4. 処理の成否に関わらず全リソースを閉じる
//!
//! 4 はアプリケーションのエラー・猶予切れのどちらの場合も必ず実行する。

use std::future::Future;

use anyhow::Context as _;
use axum::Router;
use ignite_shared::observability::{TracingConfig, init_tracing};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{
    config::AppConfig,
    context::AppContext,
    shutdown::{HttpListener, ShutdownCoordinator, ShutdownOutcome},
};

/// 起動済みのアプリケーション
pub struct Bootstrap {
    service_name: String,
    context:      AppContext,
}

impl Bootstrap {
    /// ロギングとリソースレジストリを初期化する
    ///
    /// グローバル subscriber が設定済みの場合（テストなど）はそれをそのまま使う。
    pub fn new(service_name: impl Into<String>, config: AppConfig) -> Self {
        let service_name = service_name.into();
        let tracing_config =
            TracingConfig::new(service_name.clone(), config.log.format, config.log.level);
        if init_tracing(&tracing_config).is_err() {
            tracing::debug!("トレーシングは初期化済みのため再設定しません");
        }

        tracing::info!(
            service = %service_name,
            database = config.database.len(),
            redis = config.redis.len(),
            "{} を起動します",
            service_name
        );

        Self {
            service_name,
            context: AppContext::new(config),
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    /// 処理を実行し、終了後に全リソースを閉じる
    ///
    /// 処理の結果をそのまま返す。リソースのクローズに失敗した場合はログに記録するのみ。
    pub async fn run<F, Fut, T>(self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(AppContext) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let result = f(self.context.clone()).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "{} がエラーで終了しました", self.service_name);
        }
        self.deinit().await;
        result
    }

    /// 設定のアドレスで HTTP サーバーを起動し、終了シグナルまで提供する
    ///
    /// SIGINT / SIGTERM を受けると `http-server.graceful-shutdown-timeout-secs` の
    /// 猶予期間で停止し、リソースを閉じて戻る。
    pub async fn serve_http<F>(self, build: F) -> anyhow::Result<ShutdownOutcome>
    where
        F: FnOnce(AppContext) -> Router,
    {
        let coordinator = ShutdownCoordinator::new(
            self.context.config.http_server.graceful_shutdown_timeout(),
        );
        let signals = coordinator.listen_for_signals();

        let addr = self.context.config.http_server.bind_addr();
        let result = match TcpListener::bind(&addr).await {
            Ok(listener) => self.serve_listener(listener, coordinator, build).await,
            Err(e) => {
                self.deinit().await;
                Err(e).with_context(|| format!("{addr} へのバインドに失敗しました"))
            }
        };

        signals.abort();
        result
    }

    /// バインド済みのリスナーで HTTP サーバーを提供する
    ///
    /// 停止は `coordinator` の `trigger` で行う。
    pub async fn serve_listener<F>(
        self,
        listener: TcpListener,
        coordinator: ShutdownCoordinator,
        build: F,
    ) -> anyhow::Result<ShutdownOutcome>
    where
        F: FnOnce(AppContext) -> Router,
    {
        self.run(|ctx| async move {
            let router = build(ctx).layer(TraceLayer::new_for_http());
            let listener = HttpListener::new(listener, router);
            tracing::info!(addr = %listener.local_addr()?, "HTTP サーバーを起動しました");

            let outcome = coordinator.run(listener).await?;
            Ok(outcome)
        })
        .await
    }

    async fn deinit(&self) {
        let report = self.context.resources.deinit_all().await;
        if report.is_success() {
            tracing::info!("全リソースをクローズしました");
        } else {
            tracing::warn!(
                failed = report.failed.len(),
                "一部のリソースのクローズに失敗しました"
            );
        }
    }
}
