//! # Ignite インフラ層
//!
//! 外部リソース（データベース・キャッシュ）への接続を名前単位で管理する。
//!
//! ## 責務
//!
//! - **遅延接続**: リソース名ごとに最初の利用時に接続し、以降は共有する
//! - **一括クローズ**: プロセス終了時に全接続を閉じる
//! - **接続種別の実装**: PostgreSQL / MySQL 接続プール、Redis クライアント
//!
//! ## 依存関係
//!
//! ```text
//! app → server → infra
//!          ↘       ↓
//!            shared
//! ```
//!
//! ## モジュール構成
//!
//! - [`settings`] - リソースごとの接続設定
//! - [`resource`] - コネクタトレイトと名前付きリソースマネージャ
//! - [`db`] - データベース接続プールのコネクタ
//! - [`redis`] - Redis クライアントのコネクタ
//! - [`registry`] - プロセス単位のマネージャ集約
//! - [`error`] - インフラ層エラー定義
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use ignite_infra::ResourceRegistry;
//!
//! let registry = ResourceRegistry::init_all(config.database.clone(), config.redis.clone());
//! let pool = registry.database("example").await?;
//! // ...
//! registry.deinit_all().await;
//! ```

pub mod db;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod redis;
pub mod registry;
pub mod resource;
pub mod settings;

pub use error::{ConnectError, InfraError, InfraErrorKind, ResourceError};
pub use registry::{CacheManager, DatabaseManager, DeinitReport, ResourceRegistry};
pub use resource::{Connector, ResourceManager};
pub use settings::{ResourceSection, ResourceSettings, SettingsSource};
