//! # 名前付きリソースマネージャ
//!
//! データベース接続プールや Redis クライアントのような、生成コストが高く
//! 共有可能な接続（ハンドル）を名前単位で遅延生成・キャッシュする。
//!
//! ## 設計方針
//!
//! - **遅延接続**: マネージャ生成時には何も接続しない。名前ごとに最初の
//!   [`lookup`](ResourceManager::lookup) で接続し、以降は同じハンドルを返す
//! - **名前ごとに高々 1 回の構築**: 名前ごとの初期化ガード（[`OnceCell`]）で
//!   同時に初回アクセスが来ても接続は 1 本だけ確立する。別名の構築は並行に進む
//! - **失敗はキャッシュしない**: 設定なし・アダプタ未対応・接続失敗のいずれも
//!   何も保存しないため、設定を直せば次の `lookup` で接続できる
//! - **一度きりのクローズ**: [`close`](ResourceManager::close) はフラグを立ててから
//!   全ハンドルを閉じる。個別のクローズ失敗はログに残して残りを続行する
//!
//! ## ロックの構成
//!
//! ```text
//! slots        : std RwLock<HashMap<name, Arc<OnceCell<Arc<Handle>>>>>
//!                 ├─ 高速パス: 読み取りロックで構築済みハンドルを返す
//!                 └─ await を跨いで保持しない
//! construction : tokio RwLock<()>
//!                 ├─ 構築中の lookup は読み取り側を保持する（名前が違えば並行）
//!                 └─ close は書き込み側を取り、構築中の接続の完了を待ってから掃除する
//! closed       : AtomicBool（false → true のみ）
//! ```
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use ignite_infra::{db::DatabaseConnector, resource::ResourceManager};
//!
//! let manager = ResourceManager::new(DatabaseConnector, config.database.clone());
//! let pool = manager.lookup("example").await?;
//! // ...
//! manager.close().await?;
//! ```

use std::{
    collections::HashMap,
    sync::{
        Arc,
        PoisonError,
        RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::{OnceCell, RwLock as AsyncRwLock};

use crate::{
    error::{ConnectError, InfraError, ResourceError},
    settings::{ResourceSettings, SettingsSource},
};

/// リソース種別ごとの接続処理
///
/// [`ResourceManager`] はこのトレイトを通じてハンドルを生成・破棄する。
/// 設定の `adapter` が対応外なら [`ConnectError::UnsupportedAdapter`] を、
/// 接続や疎通確認に失敗したら [`ConnectError::Failed`] を返す。
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// 接続済みのハンドル（接続プール、クライアントなど）
    type Handle: Send + Sync + 'static;

    /// ログ・エラーに使うリソース種別名
    fn kind(&self) -> &'static str;

    /// 設定に従って接続し、疎通を確認したハンドルを返す
    async fn connect(
        &self,
        name: &str,
        settings: &ResourceSettings,
    ) -> Result<Self::Handle, ConnectError>;

    /// ハンドルを閉じる
    async fn close(&self, name: &str, handle: &Self::Handle) -> Result<(), InfraError>;
}

type Slot<H> = Arc<OnceCell<Arc<H>>>;

/// 名前付きハンドルのレジストリ
///
/// リソース種別（データベース、キャッシュ）ごとに 1 インスタンス生成する。
/// `lookup` は `&self` で呼べるため、`Arc` で包んでリクエストハンドラ間で共有する。
pub struct ResourceManager<C: Connector> {
    connector:    C,
    settings:     Arc<dyn SettingsSource>,
    slots:        RwLock<HashMap<String, Slot<C::Handle>>>,
    construction: AsyncRwLock<()>,
    closed:       AtomicBool,
}

impl<C: Connector> ResourceManager<C> {
    /// 空のマネージャを作成する（接続は行わない）
    pub fn new(connector: C, settings: impl SettingsSource) -> Self {
        Self {
            connector,
            settings: Arc::new(settings),
            slots: RwLock::new(HashMap::new()),
            construction: AsyncRwLock::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// リソース種別名
    pub fn kind(&self) -> &'static str {
        self.connector.kind()
    }

    /// クローズ済みかどうか
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 接続済みハンドルの名前一覧（名前順）
    pub fn open_names(&self) -> Vec<String> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// 名前に対応するハンドルを返す。未接続なら接続する
    ///
    /// # エラー
    ///
    /// - [`ResourceError::ManagerClosed`]: クローズ後の呼び出し
    /// - [`ResourceError::ConfigNotFound`]: 名前に対応する設定がない
    /// - [`ResourceError::UnsupportedAdapter`]: 設定の `adapter` が未対応
    /// - [`ResourceError::Connect`]: 接続・疎通確認の失敗
    ///
    /// 接続処理にタイムアウトは設けない。下位クライアントの既定値に従う。
    pub async fn lookup(&self, name: &str) -> Result<Arc<C::Handle>, ResourceError> {
        let kind = self.kind();
        if self.is_closed() {
            return Err(ResourceError::ManagerClosed { kind });
        }

        if let Some(handle) = self.cached(name) {
            return Ok(handle);
        }

        let settings = self
            .settings
            .resource(name)
            .ok_or_else(|| ResourceError::ConfigNotFound {
                kind,
                name: name.to_string(),
            })?;

        let _construction = self.construction.read().await;
        // close() がフラグを立てた後に構築を始めてはならない
        if self.is_closed() {
            return Err(ResourceError::ManagerClosed { kind });
        }

        // 同名の構築が並行している場合は OnceCell がその完了を待ち、結果を共有する
        let slot = self.slot(name);
        let handle = slot
            .get_or_try_init(|| self.construct(name, &settings))
            .await?;
        Ok(Arc::clone(handle))
    }

    /// 全ハンドルを閉じ、以降の `lookup` を拒否する
    ///
    /// プロセスの終了時に 1 回だけ呼ぶ。2 回目以降は
    /// [`ResourceError::AlreadyClosed`] を返し、何も閉じない。
    ///
    /// 個別ハンドルのクローズ失敗はエラーログを出して残りの処理を続ける。
    pub async fn close(&self) -> Result<(), ResourceError> {
        let kind = self.kind();
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ResourceError::AlreadyClosed { kind });
        }

        // 構築中の lookup が読み取り側を手放すまで待つ
        let _construction = self.construction.write().await;

        let mut drained: Vec<(String, Slot<C::Handle>)> = {
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            slots.drain().collect()
        };
        drained.sort_by(|(a, _), (b, _)| a.cmp(b));

        for (name, slot) in drained {
            let Some(handle) = slot.get() else {
                continue;
            };
            match self.connector.close(&name, handle).await {
                Ok(()) => {
                    tracing::debug!(resource.kind = kind, resource.name = %name, "リソースをクローズしました");
                }
                Err(error) => {
                    tracing::error!(
                        resource.kind = kind,
                        resource.name = %name,
                        error = %error,
                        "リソースのクローズに失敗"
                    );
                }
            }
        }

        Ok(())
    }

    fn cached(&self, name: &str) -> Option<Arc<C::Handle>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(name).and_then(|slot| slot.get()).cloned()
    }

    fn slot(&self, name: &str) -> Slot<C::Handle> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(name.to_string()).or_default())
    }

    async fn construct(
        &self,
        name: &str,
        settings: &ResourceSettings,
    ) -> Result<Arc<C::Handle>, ResourceError> {
        let kind = self.kind();
        let handle = self
            .connector
            .connect(name, settings)
            .await
            .map_err(|e| e.into_resource_error(kind, name))?;

        tracing::info!(
            resource.kind = kind,
            resource.name = name,
            adapter = %settings.adapter,
            "リソースに接続しました"
        );
        Ok(Arc::new(handle))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Mutex,
        time::Duration,
    };

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        mock::{MOCK_ADAPTER, MockConnector},
        settings::ResourceSection,
    };

    /// 実行中に書き換えられる設定（設定修正後の再試行を検証する）
    #[derive(Default)]
    struct MutableSettings(Mutex<ResourceSection>);

    impl MutableSettings {
        fn set(&self, name: &str, settings: ResourceSettings) {
            self.0.lock().unwrap().insert(name.to_string(), settings);
        }
    }

    impl SettingsSource for MutableSettings {
        fn resource(&self, name: &str) -> Option<ResourceSettings> {
            self.0.lock().unwrap().get(name).cloned()
        }
    }

    fn section(names: &[&str]) -> ResourceSection {
        names
            .iter()
            .map(|name| (name.to_string(), ResourceSettings::new(MOCK_ADAPTER)))
            .collect()
    }

    fn manager(connector: &MockConnector, names: &[&str]) -> ResourceManager<MockConnector> {
        ResourceManager::new(connector.clone(), section(names))
    }

    // ===== lookup =====

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_同時に初回lookupしても接続は1回だけ() {
        let connector = MockConnector::new().with_connect_delay(Duration::from_millis(50));
        let sut = Arc::new(manager(&connector, &["example"]));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let sut = Arc::clone(&sut);
                tokio::spawn(async move { sut.lookup("example").await })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(connector.connect_count_for("example"), 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_構築済みの名前は再接続しない() {
        let connector = MockConnector::new();
        let sut = Arc::new(manager(&connector, &["example"]));
        let first = sut.lookup("example").await.unwrap();

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let sut = Arc::clone(&sut);
                tokio::spawn(async move { sut.lookup("example").await })
            })
            .collect();
        for task in tasks {
            let handle = task.await.unwrap().unwrap();
            assert!(Arc::ptr_eq(&handle, &first));
        }

        assert_eq!(connector.connect_count(), 1);
        assert_eq!(sut.open_names(), vec!["example".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_別名の構築は互いを待たない() {
        let connector = MockConnector::new().with_connect_delay(Duration::from_millis(100));
        let sut = manager(&connector, &["a", "b"]);
        let started = tokio::time::Instant::now();

        let (a, b) = tokio::join!(sut.lookup("a"), sut.lookup("b"));

        assert!(a.is_ok() && b.is_ok());
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_設定がない名前はconfig_not_foundを毎回返す() {
        let connector = MockConnector::new();
        let settings = Arc::new(MutableSettings::default());
        let sut = ResourceManager::new(connector.clone(), Arc::clone(&settings));

        for _ in 0..2 {
            let err = sut.lookup("nonexistent").await.unwrap_err();
            assert!(matches!(
                err,
                ResourceError::ConfigNotFound { kind: "mock", ref name } if name == "nonexistent"
            ));
        }
        assert_eq!(connector.connect_count(), 0);

        settings.set("nonexistent", ResourceSettings::new(MOCK_ADAPTER));
        assert!(sut.lookup("nonexistent").await.is_ok());
    }

    #[tokio::test]
    async fn test_未対応アダプタは保存されず設定修正後に接続できる() {
        let connector = MockConnector::new();
        let settings = Arc::new(MutableSettings::default());
        settings.set("example", ResourceSettings::new("oracle"));
        let sut = ResourceManager::new(connector.clone(), Arc::clone(&settings));

        let err = sut.lookup("example").await.unwrap_err();
        assert!(matches!(
            err,
            ResourceError::UnsupportedAdapter { ref adapter, .. } if adapter == "oracle"
        ));
        assert!(sut.open_names().is_empty());

        settings.set("example", ResourceSettings::new(MOCK_ADAPTER));
        assert!(sut.lookup("example").await.is_ok());
        assert_eq!(sut.open_names(), vec!["example".to_string()]);
    }

    #[tokio::test]
    async fn test_接続失敗はキャッシュされず次のlookupで再接続する() {
        let connector = MockConnector::new();
        connector.fail_connect("example");
        let sut = manager(&connector, &["example"]);

        let err = sut.lookup("example").await.unwrap_err();
        assert!(matches!(err, ResourceError::Connect { .. }));

        connector.recover_connect("example");
        let handle = sut.lookup("example").await.unwrap();

        assert_eq!(connector.connect_count_for("example"), 2);
        assert_eq!(handle.serial, 2);
    }

    // ===== close =====

    #[tokio::test]
    async fn test_close後のlookupはmanager_closedを返す() {
        let connector = MockConnector::new();
        let sut = manager(&connector, &["example", "other"]);
        sut.lookup("example").await.unwrap();

        sut.close().await.unwrap();

        // 構築済みだった名前も、未構築の名前も拒否する
        for name in ["example", "other"] {
            let err = sut.lookup(name).await.unwrap_err();
            assert!(matches!(err, ResourceError::ManagerClosed { kind: "mock" }));
        }
        assert!(sut.is_closed());
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_二重closeはalready_closedを返し再クローズしない() {
        let connector = MockConnector::new();
        let sut = manager(&connector, &["example"]);
        sut.lookup("example").await.unwrap();
        sut.close().await.unwrap();

        let err = sut.close().await.unwrap_err();

        assert!(matches!(err, ResourceError::AlreadyClosed { kind: "mock" }));
        assert_eq!(connector.closed_names(), vec!["example".to_string()]);
    }

    #[tokio::test]
    async fn test_クローズ失敗があっても残りのハンドルを閉じる() {
        let connector = MockConnector::new();
        connector.fail_close("a");
        let sut = manager(&connector, &["a", "b"]);
        sut.lookup("a").await.unwrap();
        sut.lookup("b").await.unwrap();

        let result = sut.close().await;

        assert!(result.is_ok());
        assert_eq!(
            connector.closed_names(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(sut.open_names().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closeは構築中の接続の完了を待ってから閉じる() {
        let connector = MockConnector::new().with_connect_delay(Duration::from_secs(1));
        let sut = Arc::new(manager(&connector, &["slow"]));

        let lookup = {
            let sut = Arc::clone(&sut);
            tokio::spawn(async move { sut.lookup("slow").await })
        };
        while connector.connect_count() == 0 {
            tokio::task::yield_now().await;
        }

        sut.close().await.unwrap();

        // close より前に始まった lookup は成功し、そのハンドルは close で閉じられている
        assert!(lookup.await.unwrap().is_ok());
        assert_eq!(connector.closed_names(), vec!["slow".to_string()]);
    }

    #[tokio::test]
    async fn test_未接続のままcloseしても何も閉じない() {
        let connector = MockConnector::new();
        let sut = manager(&connector, &["example"]);

        sut.close().await.unwrap();

        assert!(connector.closed_names().is_empty());
    }
}
