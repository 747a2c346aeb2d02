//! # データベース接続管理
//!
//! 設定に従って接続プールを作成する [`DatabaseConnector`] を提供する。
//! [`ResourceManager`](crate::resource::ResourceManager) と組み合わせ、
//! リソース名ごとに 1 つのプールを遅延作成する。
//!
//! ## 対応アダプタ
//!
//! | `adapter` | プール |
//! |-----------|--------|
//! | `postgres` / `postgresql` | [`sqlx::PgPool`] |
//! | `mysql` | [`sqlx::MySqlPool`] |
//!
//! ## プール設定の対応
//!
//! | 設定項目 | sqlx の設定 | 未設定時 |
//! |----------|-------------|----------|
//! | `max-open-connections` | `max_connections` | 10 |
//! | `max-idle-connections` | `min_connections`（最大接続数で頭打ち） | 0 |
//! | `conn-max-lifetime-secs` | `max_lifetime` | 2 時間 |
//! | `debug` | ステートメントログの有効化 | 無効 |
//!
//! 値が `0` の項目は未設定として扱う。

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use sqlx::{
    ConnectOptions,
    MySqlPool,
    PgPool,
    mysql::{MySqlConnectOptions, MySqlPoolOptions},
    pool::PoolOptions,
    postgres::{PgConnectOptions, PgPoolOptions},
};

use crate::{
    error::{ConnectError, InfraError},
    resource::Connector,
    settings::ResourceSettings,
};

/// リソース種別名
pub const DATABASE_KIND: &str = "database";

/// 最大接続数のデフォルト値
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// 接続取得のタイムアウト
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// データベースの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseAdapter {
    Postgres,
    MySql,
}

impl DatabaseAdapter {
    /// 設定の `adapter` タグからパースする。未対応なら `None`
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" => Some(Self::MySql),
            _ => None,
        }
    }
}

/// 接続プール
///
/// 内部のプールは `Clone` で同じ接続群を共有する。
#[derive(Debug, Clone)]
pub enum DatabasePool {
    Postgres(PgPool),
    MySql(MySqlPool),
}

impl DatabasePool {
    pub fn adapter(&self) -> DatabaseAdapter {
        match self {
            Self::Postgres(_) => DatabaseAdapter::Postgres,
            Self::MySql(_) => DatabaseAdapter::MySql,
        }
    }

    pub fn as_postgres(&self) -> Option<&PgPool> {
        match self {
            Self::Postgres(pool) => Some(pool),
            Self::MySql(_) => None,
        }
    }

    pub fn as_mysql(&self) -> Option<&MySqlPool> {
        match self {
            Self::MySql(pool) => Some(pool),
            Self::Postgres(_) => None,
        }
    }

    /// プールを閉じる
    ///
    /// 貸し出し中の接続が返却されるまで待つ。以降の接続取得はエラーになる。
    pub async fn close(&self) {
        match self {
            Self::Postgres(pool) => pool.close().await,
            Self::MySql(pool) => pool.close().await,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Postgres(pool) => pool.is_closed(),
            Self::MySql(pool) => pool.is_closed(),
        }
    }
}

/// 設定から導出したプール設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolTuning {
    pub max_connections: u32,
    pub min_connections: Option<u32>,
    pub max_lifetime:    Duration,
}

impl PoolTuning {
    pub fn from_settings(settings: &ResourceSettings) -> Self {
        let max_connections = settings
            .max_open_connections
            .filter(|n| *n != 0)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let min_connections = settings
            .max_idle_connections
            .filter(|n| *n != 0)
            .map(|n| n.min(max_connections));

        Self {
            max_connections,
            min_connections,
            max_lifetime: settings.conn_max_lifetime(),
        }
    }

    /// `PoolOptions` に適用する
    pub fn apply<DB: sqlx::Database>(&self, options: PoolOptions<DB>) -> PoolOptions<DB> {
        let options = options
            .max_connections(self.max_connections)
            .max_lifetime(self.max_lifetime)
            .acquire_timeout(ACQUIRE_TIMEOUT);
        match self.min_connections {
            Some(min) => options.min_connections(min),
            None => options,
        }
    }
}

/// データベース接続プールを作成するコネクタ
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseConnector;

#[async_trait]
impl Connector for DatabaseConnector {
    type Handle = DatabasePool;

    fn kind(&self) -> &'static str {
        DATABASE_KIND
    }

    /// プールを作成し、最初の接続を確立して疎通を確認する
    async fn connect(
        &self,
        name: &str,
        settings: &ResourceSettings,
    ) -> Result<DatabasePool, ConnectError> {
        let adapter = DatabaseAdapter::parse(&settings.adapter)
            .ok_or_else(|| ConnectError::UnsupportedAdapter(settings.adapter.clone()))?;
        let dsn = settings
            .dsn
            .as_deref()
            .filter(|dsn| !dsn.is_empty())
            .ok_or_else(|| {
                InfraError::invalid_settings(format!("database '{name}' の dsn が設定されていません"))
            })?;
        let tuning = PoolTuning::from_settings(settings);

        let pool = match adapter {
            DatabaseAdapter::Postgres => {
                DatabasePool::Postgres(connect_postgres(dsn, settings.debug, &tuning).await?)
            }
            DatabaseAdapter::MySql => {
                DatabasePool::MySql(connect_mysql(dsn, settings.debug, &tuning).await?)
            }
        };
        Ok(pool)
    }

    async fn close(&self, _name: &str, handle: &DatabasePool) -> Result<(), InfraError> {
        handle.close().await;
        Ok(())
    }
}

async fn connect_postgres(dsn: &str, debug: bool, tuning: &PoolTuning) -> Result<PgPool, InfraError> {
    let mut options = PgConnectOptions::from_str(dsn)?;
    if !debug {
        options = options.disable_statement_logging();
    }
    Ok(tuning.apply(PgPoolOptions::new()).connect_with(options).await?)
}

async fn connect_mysql(
    dsn: &str,
    debug: bool,
    tuning: &PoolTuning,
) -> Result<MySqlPool, InfraError> {
    let mut options = MySqlConnectOptions::from_str(dsn)?;
    if !debug {
        options = options.disable_statement_logging();
    }
    Ok(tuning.apply(MySqlPoolOptions::new()).connect_with(options).await?)
}
