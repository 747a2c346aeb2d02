//! # アプリケーションコンテキスト
//!
//! 設定とリソースレジストリをまとめた、プロセス全体で共有する値。
//! axum の State としてハンドラに渡す。

use std::sync::Arc;

use ignite_infra::ResourceRegistry;

use crate::config::AppConfig;

/// ハンドラに渡す共有状態
///
/// `Clone` は設定とレジストリの参照を共有するだけで、接続は複製しない。
#[derive(Clone)]
pub struct AppContext {
    pub config:    Arc<AppConfig>,
    pub resources: ResourceRegistry,
}

impl AppContext {
    /// 設定からレジストリを作成する（接続は最初の利用時に行う）
    pub fn new(config: AppConfig) -> Self {
        let resources = ResourceRegistry::init_all(config.database.clone(), config.redis.clone());
        Self {
            config: Arc::new(config),
            resources,
        }
    }
}
