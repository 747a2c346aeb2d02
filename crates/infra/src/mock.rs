//! # テスト用モックコネクタ
//!
//! リソースマネージャ・レジストリのテストで使用するインメモリのコネクタ。
//! 接続・クローズの呼び出しを記録し、遅延や失敗を注入できる。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! ignite-infra = { workspace = true, features = ["test-utils"] }
//! ```

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    error::{ConnectError, InfraError},
    resource::Connector,
    settings::ResourceSettings,
};

/// モックコネクタが受け付けるアダプタ名
pub const MOCK_ADAPTER: &str = "mock";

/// モックコネクタが返すハンドル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockHandle {
    /// リソース名
    pub name:   String,
    /// 何回目の接続呼び出しで生成されたか（1 始まり）
    pub serial: usize,
}

#[derive(Default)]
struct MockState {
    connect_calls:    Mutex<Vec<String>>,
    closed:           Mutex<Vec<String>>,
    failing_connects: Mutex<HashSet<String>>,
    failing_closes:   Mutex<HashSet<String>>,
    connect_delay:    Mutex<Duration>,
}

/// 呼び出しを記録するコネクタ
///
/// `Clone` は状態を共有する。マネージャに渡した後も、手元の複製から
/// 呼び出し回数を確認できる。
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接続ごとに指定時間待つ
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        *self.state.connect_delay.lock().unwrap() = delay;
        self
    }

    /// 指定名の接続を失敗させる
    pub fn fail_connect(&self, name: &str) {
        self.state
            .failing_connects
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    /// 指定名の接続失敗を解除する
    pub fn recover_connect(&self, name: &str) {
        self.state.failing_connects.lock().unwrap().remove(name);
    }

    /// 指定名のクローズを失敗させる
    pub fn fail_close(&self, name: &str) {
        self.state
            .failing_closes
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    /// 接続呼び出しの総数
    pub fn connect_count(&self) -> usize {
        self.state.connect_calls.lock().unwrap().len()
    }

    /// 指定名の接続呼び出し回数
    pub fn connect_count_for(&self, name: &str) -> usize {
        self.state
            .connect_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }

    /// クローズが試みられた名前（呼び出し順）
    pub fn closed_names(&self) -> Vec<String> {
        self.state.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Handle = MockHandle;

    fn kind(&self) -> &'static str {
        "mock"
    }

    async fn connect(
        &self,
        name: &str,
        settings: &ResourceSettings,
    ) -> Result<MockHandle, ConnectError> {
        if settings.adapter != MOCK_ADAPTER {
            return Err(ConnectError::UnsupportedAdapter(settings.adapter.clone()));
        }

        let serial = {
            let mut calls = self.state.connect_calls.lock().unwrap();
            calls.push(name.to_string());
            calls.len()
        };

        let delay = *self.state.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.state.failing_connects.lock().unwrap().contains(name) {
            return Err(InfraError::unexpected(format!("{name} への接続に失敗しました")).into());
        }

        Ok(MockHandle {
            name: name.to_string(),
            serial,
        })
    }

    async fn close(&self, name: &str, _handle: &MockHandle) -> Result<(), InfraError> {
        self.state.closed.lock().unwrap().push(name.to_string());

        if self.state.failing_closes.lock().unwrap().contains(name) {
            return Err(InfraError::unexpected(format!("{name} のクローズに失敗しました")));
        }
        Ok(())
    }
}
