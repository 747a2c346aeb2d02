//! # Ignite 共有ユーティリティ
//!
//! ワークスペース内のすべてのクレート（infra, server, アプリ）から使用される
//! 共通ユーティリティを提供する。
//!
//! ## 設計方針
//!
//! - リソース管理やサーバー制御のロジックを含まない純粋なユーティリティのみを配置
//! - 外部クレートへの依存は最小限に抑える（トレーシング初期化は feature で分離）

pub mod health;
pub mod observability;

pub use health::HealthResponse;
