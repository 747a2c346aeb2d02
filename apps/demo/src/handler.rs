//! # HTTP ハンドラ
//!
//! 各エンドポイントは [`AppContext`](ignite_server::AppContext) を State として受け取り、
//! 必要なリソースを名前で取得する。

mod config;
mod counter;
mod data;
mod health;
mod ping;

pub use config::show_config;
pub use counter::increment_counter;
pub use data::user_stats;
pub use health::health_check;
pub use ping::ping;

/// デモで使うリソース名
pub const EXAMPLE_RESOURCE: &str = "example";
