//! # ResourceRegistry
//!
//! プロセス全体で共有するリソースマネージャ（データベース・キャッシュ）を保持する。
//!
//! グローバル変数は使わない。起動時に [`ResourceRegistry::init_all`] で 1 つ作成し、
//! axum の State などで明示的にハンドラへ渡す。終了時に
//! [`ResourceRegistry::deinit_all`] で全マネージャを閉じる。

use std::sync::Arc;

use crate::{
    db::{DATABASE_KIND, DatabaseConnector, DatabasePool},
    error::ResourceError,
    redis::{REDIS_KIND, RedisConnector, RedisHandle},
    resource::{Connector, ResourceManager},
    settings::SettingsSource,
};

/// データベース接続プールのマネージャ
pub type DatabaseManager = ResourceManager<DatabaseConnector>;

/// Redis クライアントのマネージャ
pub type CacheManager = ResourceManager<RedisConnector>;

/// `deinit_all` の結果
#[derive(Debug, Default)]
pub struct DeinitReport {
    /// クローズに成功したリソース種別
    pub closed: Vec<&'static str>,
    /// クローズに失敗したリソース種別とエラー
    pub failed: Vec<(&'static str, ResourceError)>,
}

impl DeinitReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// プロセス単位のリソースレジストリ
///
/// 型パラメータはテストでコネクタを差し替えるためのもの。
/// 通常は既定の `ResourceRegistry`（PostgreSQL/MySQL + Redis）を使う。
///
/// `Clone` は同じマネージャを共有する。
pub struct ResourceRegistry<D: Connector = DatabaseConnector, K: Connector = RedisConnector> {
    database: Option<Arc<ResourceManager<D>>>,
    cache:    Option<Arc<ResourceManager<K>>>,
}

impl ResourceRegistry {
    /// 全リソース種別のマネージャを作成する
    ///
    /// 接続は行わない（各名前の最初の `lookup` で接続する）。
    pub fn init_all(database: impl SettingsSource, cache: impl SettingsSource) -> Self {
        Self::with_connectors(DatabaseConnector, database, RedisConnector, cache)
    }

    /// 名前に対応するデータベース接続プールを返す
    pub async fn database(&self, name: &str) -> Result<Arc<DatabasePool>, ResourceError> {
        self.database_manager()?.lookup(name).await
    }

    /// 名前に対応する Redis クライアントを返す
    pub async fn cache(&self, name: &str) -> Result<Arc<RedisHandle>, ResourceError> {
        self.cache_manager()?.lookup(name).await
    }
}

impl<D: Connector, K: Connector> ResourceRegistry<D, K> {
    /// コネクタを指定してマネージャを作成する
    pub fn with_connectors(
        database_connector: D,
        database: impl SettingsSource,
        cache_connector: K,
        cache: impl SettingsSource,
    ) -> Self {
        Self {
            database: Some(Arc::new(ResourceManager::new(database_connector, database))),
            cache:    Some(Arc::new(ResourceManager::new(cache_connector, cache))),
        }
    }

    /// データベースのマネージャ
    pub fn database_manager(&self) -> Result<&ResourceManager<D>, ResourceError> {
        self.database
            .as_deref()
            .ok_or(ResourceError::NotInitialized {
                kind: DATABASE_KIND,
            })
    }

    /// キャッシュのマネージャ
    pub fn cache_manager(&self) -> Result<&ResourceManager<K>, ResourceError> {
        self.cache
            .as_deref()
            .ok_or(ResourceError::NotInitialized { kind: REDIS_KIND })
    }

    /// 全マネージャを閉じる
    ///
    /// 個別のマネージャがエラーを返しても、残りのマネージャのクローズは継続する。
    /// `init_all` を呼んでいないレジストリに対しては何もしない。
    pub async fn deinit_all(&self) -> DeinitReport {
        let mut report = DeinitReport::default();

        if let Some(manager) = &self.database {
            record(&mut report, manager.kind(), manager.close().await);
        }
        if let Some(manager) = &self.cache {
            record(&mut report, manager.kind(), manager.close().await);
        }

        report
    }
}

fn record(report: &mut DeinitReport, kind: &'static str, result: Result<(), ResourceError>) {
    match result {
        Ok(()) => {
            tracing::info!(resource.kind = kind, "リソースマネージャをクローズしました");
            report.closed.push(kind);
        }
        Err(error) => {
            tracing::error!(
                resource.kind = kind,
                error = %error,
                "リソースマネージャのクローズに失敗"
            );
            report.failed.push((kind, error));
        }
    }
}

impl<D: Connector, K: Connector> Default for ResourceRegistry<D, K> {
    /// 未初期化のレジストリ（すべての取得が `NotInitialized` になる）
    fn default() -> Self {
        Self {
            database: None,
            cache:    None,
        }
    }
}

impl<D: Connector, K: Connector> Clone for ResourceRegistry<D, K> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            cache:    self.cache.clone(),
        }
    }
}
