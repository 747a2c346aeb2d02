//! # Redis 接続管理
//!
//! 設定（`address` / `password` / `db`）から Redis に接続する
//! [`RedisConnector`] を提供する。
//!
//! ## ConnectionManager を使う理由
//!
//! | 方式 | 特徴 | 用途 |
//! |------|------|------|
//! | `Connection` | 単一接続、手動管理 | 短期間の処理 |
//! | `ConnectionManager` | 自動再接続、Clone 可能 | 長期稼働アプリ |
//!
//! リソースマネージャが名前ごとに 1 つだけ [`RedisHandle`] を保持し、
//! リクエストハンドラは [`RedisHandle::connection`] で得た複製でコマンドを発行する。
//!
//! ## クローズ
//!
//! `ConnectionManager` は明示的な切断 API を持たない。[`RedisHandle`] は
//! クローズ済みフラグを持ち、クローズ後の `connection` はエラーを返す。
//! 実際の接続は、取得済みの複製がすべて破棄された時点で閉じる。
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use redis::AsyncCommands;
//!
//! let handle = registry.cache("example").await?;
//! let mut conn = handle.connection()?;
//! let count: i64 = conn.incr("ignite:counter", 1).await?;
//! ```

use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use redis::{Client, aio::ConnectionManager};

use crate::{
    error::{ConnectError, InfraError},
    resource::Connector,
    settings::ResourceSettings,
};

/// リソース種別名
pub const REDIS_KIND: &str = "redis";

/// 対応するアダプタ名
pub const REDIS_ADAPTER: &str = "redis";

/// 設定から Redis 接続 URL を組み立てる
///
/// 形式: `redis://[:password@]host:port[/db]`
///
/// パスワードはパーセントエンコードする。空のパスワードは未設定として扱う。
pub fn redis_url(name: &str, settings: &ResourceSettings) -> Result<String, InfraError> {
    let address = settings
        .address
        .as_deref()
        .filter(|address| !address.is_empty())
        .ok_or_else(|| {
            InfraError::invalid_settings(format!("redis '{name}' の address が設定されていません"))
        })?;

    let mut url = String::from("redis://");
    if let Some(password) = settings.password.as_deref().filter(|p| !p.is_empty()) {
        url.push(':');
        url.push_str(&urlencoding::encode(password));
        url.push('@');
    }
    url.push_str(address);
    if let Some(db) = settings.db {
        url.push('/');
        url.push_str(&db.to_string());
    }
    Ok(url)
}

/// Redis 接続マネージャを作成する
///
/// # エラー
///
/// - URL パースエラー: 不正な URL 形式
/// - 接続エラー: Redis サーバーに接続できない
/// - 認証エラー: パスワードが不正
pub async fn create_connection_manager(
    redis_url: &str,
) -> Result<ConnectionManager, redis::RedisError> {
    let client = Client::open(redis_url)?;
    ConnectionManager::new(client).await
}

/// マネージャが保持する Redis ハンドル
///
/// 型パラメータはテストで接続を差し替えるためのもの。
pub struct RedisHandle<C = ConnectionManager> {
    conn:   C,
    closed: AtomicBool,
}

impl<C: Clone> RedisHandle<C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            closed: AtomicBool::new(false),
        }
    }

    /// コマンド発行用の接続を返す
    ///
    /// # エラー
    ///
    /// クローズ後は [`InfraErrorKind::Closed`](crate::error::InfraErrorKind::Closed) を返す。
    pub fn connection(&self) -> Result<C, InfraError> {
        if self.is_closed() {
            return Err(InfraError::closed("Redis ハンドルはクローズされています"));
        }
        Ok(self.conn.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl<C> fmt::Debug for RedisHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisHandle")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Redis クライアントを作成するコネクタ
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

#[async_trait]
impl Connector for RedisConnector {
    type Handle = RedisHandle;

    fn kind(&self) -> &'static str {
        REDIS_KIND
    }

    /// 接続後に `PING` を送り、応答を確認してから返す
    async fn connect(
        &self,
        name: &str,
        settings: &ResourceSettings,
    ) -> Result<RedisHandle, ConnectError> {
        if settings.adapter != REDIS_ADAPTER {
            return Err(ConnectError::UnsupportedAdapter(settings.adapter.clone()));
        }

        let url = redis_url(name, settings)?;
        let mut conn = create_connection_manager(&url)
            .await
            .map_err(InfraError::from)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(InfraError::from)?;

        Ok(RedisHandle::new(conn))
    }

    /// 以降の `connection` を拒否する。接続自体は最後の複製の破棄で閉じる
    async fn close(&self, name: &str, handle: &RedisHandle) -> Result<(), InfraError> {
        handle.mark_closed();
        tracing::debug!(resource.name = name, "Redis ハンドルを解放します");
        Ok(())
    }
}
