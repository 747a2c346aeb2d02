//! # インフラ層エラー定義
//!
//! 外部リソース（データベース・Redis）との接続で発生するエラーと、
//! リソースマネージャが呼び出し元に返すエラーを定義する。
//!
//! ## 構造
//!
//! - [`InfraError`]: 接続処理そのものの失敗。エラー種別（[`InfraErrorKind`]）と
//!   [`SpanTrace`] を保持する（`std::io::Error` と同じ struct + enum パターン）
//! - [`ConnectError`]: [`Connector`](crate::resource::Connector) が返す失敗。
//!   アダプタ未対応か接続失敗かを区別する
//! - [`ResourceError`]: [`ResourceManager`](crate::resource::ResourceManager) の
//!   公開 API が返すエラー。リソース種別と名前を含む

use std::fmt;

use derive_more::Display;
use thiserror::Error;
use tracing_error::SpanTrace;

/// 接続処理で発生するエラー
///
/// `From<sqlx::Error>` 等の変換や convenience constructor でエラーを生成すると、
/// その時点のスパン情報が自動的にキャプチャされる。
#[derive(Display)]
#[display("{kind}")]
pub struct InfraError {
    kind:       InfraErrorKind,
    span_trace: SpanTrace,
}

/// 接続エラーの種別
#[derive(Debug, Error)]
pub enum InfraErrorKind {
    /// データベースエラー
    ///
    /// 接続 URL の不正、接続失敗、認証エラーなど。
    #[error("データベースエラー: {0}")]
    Database(#[source] sqlx::Error),

    /// Redis エラー
    ///
    /// Redis への接続失敗、PING の失敗など。
    #[error("Redis エラー: {0}")]
    Redis(#[source] redis::RedisError),

    /// 設定値の不備
    ///
    /// アダプタに必要な項目（`dsn`, `address` など）が欠けている場合に使用する。
    #[error("設定エラー: {0}")]
    InvalidSettings(String),

    /// クローズ済みのハンドルの利用
    #[error("クローズ済みです: {0}")]
    Closed(String),

    /// 予期しないエラー
    #[error("予期しないエラー: {0}")]
    Unexpected(String),
}

// ===== InfraError のメソッド =====

impl InfraError {
    /// エラー種別を取得する
    pub fn kind(&self) -> &InfraErrorKind {
        &self.kind
    }

    /// SpanTrace を取得する
    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }

    // ===== Convenience constructors =====

    /// 設定値の不備を表すエラーを生成する
    pub fn invalid_settings(msg: impl Into<String>) -> Self {
        Self {
            kind:       InfraErrorKind::InvalidSettings(msg.into()),
            span_trace: SpanTrace::capture(),
        }
    }

    /// クローズ済みのハンドルを使おうとしたエラーを生成する
    pub fn closed(msg: impl Into<String>) -> Self {
        Self {
            kind:       InfraErrorKind::Closed(msg.into()),
            span_trace: SpanTrace::capture(),
        }
    }

    /// 予期しないエラーを生成する
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self {
            kind:       InfraErrorKind::Unexpected(msg.into()),
            span_trace: SpanTrace::capture(),
        }
    }
}

// ===== トレイト実装 =====

impl fmt::Debug for InfraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfraError")
            .field("kind", &self.kind)
            .field("span_trace", &self.span_trace)
            .finish()
    }
}

impl std::error::Error for InfraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

// ===== From 実装（SpanTrace 自動キャプチャ） =====

impl From<sqlx::Error> for InfraError {
    fn from(source: sqlx::Error) -> Self {
        Self {
            kind:       InfraErrorKind::Database(source),
            span_trace: SpanTrace::capture(),
        }
    }
}

impl From<redis::RedisError> for InfraError {
    fn from(source: redis::RedisError) -> Self {
        Self {
            kind:       InfraErrorKind::Redis(source),
            span_trace: SpanTrace::capture(),
        }
    }
}

/// コネクタの接続処理が返すエラー
#[derive(Debug, Error)]
pub enum ConnectError {
    /// 設定の `adapter` がコネクタの対応外
    #[error("サポートされていないアダプタです: {0:?}")]
    UnsupportedAdapter(String),

    /// 接続・疎通確認の失敗
    #[error(transparent)]
    Failed(#[from] InfraError),
}

/// リソースマネージャの操作で発生するエラー
///
/// `kind` はリソース種別（`"database"`, `"redis"` など）、`name` は設定上のリソース名。
/// いずれのエラーもマネージャ内部でリトライされず、そのまま呼び出し元に返る。
#[derive(Debug, Error)]
pub enum ResourceError {
    /// マネージャが初期化されていない
    #[error("{kind} マネージャが初期化されていません")]
    NotInitialized { kind: &'static str },

    /// クローズ後の操作
    #[error("{kind} マネージャはクローズ済みです")]
    ManagerClosed { kind: &'static str },

    /// 指定名の設定が存在しない
    #[error("{kind} の設定が見つかりません: {name}")]
    ConfigNotFound { kind: &'static str, name: String },

    /// 設定の `adapter` が未対応
    #[error("{kind} '{name}' のアダプタはサポートされていません: {adapter:?}")]
    UnsupportedAdapter {
        kind:    &'static str,
        name:    String,
        adapter: String,
    },

    /// 接続・疎通確認の失敗
    ///
    /// ハンドルは保存されないため、次回の `lookup` で改めて接続を試みる。
    #[error("{kind} '{name}' への接続に失敗しました: {source}")]
    Connect {
        kind:   &'static str,
        name:   String,
        #[source]
        source: InfraError,
    },

    /// `close()` の二重呼び出し
    #[error("{kind} マネージャは既にクローズされています")]
    AlreadyClosed { kind: &'static str },
}

impl ConnectError {
    /// リソース種別と名前を付与して [`ResourceError`] に変換する
    pub fn into_resource_error(self, kind: &'static str, name: &str) -> ResourceError {
        match self {
            Self::UnsupportedAdapter(adapter) => ResourceError::UnsupportedAdapter {
                kind,
                name: name.to_string(),
                adapter,
            },
            Self::Failed(source) => ResourceError::Connect {
                kind,
                name: name.to_string(),
                source,
            },
        }
    }
}
