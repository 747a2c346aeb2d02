//! # Ignite サーバー基盤
//!
//! 設定の読み込みからリソースの解放までのプロセスのライフサイクルを扱う。
//!
//! ## モジュール構成
//!
//! - [`config`] - 設定ファイルと環境変数の読み込み
//! - [`context`] - ハンドラに渡す共有状態
//! - [`bootstrap`] - 起動・実行・終了処理
//! - [`shutdown`] - 終了シグナルとグレースフルシャットダウン
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use clap::Parser;
//! use ignite_server::{AppConfig, Bootstrap, Cli};
//!
//! let cli = Cli::parse();
//! let config = AppConfig::load(cli.config.as_deref())?;
//! Bootstrap::new("demo", config)
//!     .serve_http(|ctx| Router::new().with_state(ctx))
//!     .await?;
//! ```

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod shutdown;

pub use bootstrap::Bootstrap;
pub use config::{AppConfig, Cli};
pub use context::AppContext;
pub use shutdown::{ShutdownCoordinator, ShutdownError, ShutdownOutcome, ShutdownState};
