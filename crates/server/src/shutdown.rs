//! # グレースフルシャットダウン
//!
//! 終了シグナル（SIGINT / SIGTERM）を受けたら新規接続の受付を止め、
//! 処理中のリクエストが猶予期間内に終わるのを待ってからサーバーを止める。
//!
//! ## 状態遷移
//!
//! ```text
//! Running ──trigger──→ ShuttingDown ──(完了 or 猶予切れ)──→ Stopped
//!    └──────────(シグナル前にリスナーが終了)──────────────────┘
//! ```
//!
//! 状態は `tokio::sync::watch` で共有する。`trigger` は `Running` のときだけ
//! 遷移させるため、何度呼んでも停止処理は 1 回しか始まらない。
//!
//! ## 猶予切れの扱い
//!
//! 猶予期間を過ぎても処理中のリクエストが残っている場合は、それを待たずに
//! `run` から戻る（[`ShutdownOutcome::Forced`]）。これはエラーではなく警告ログを出して
//! 通常の終了手順（リソースのクローズ）へ進む。

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::Router;
use thiserror::Error;
use tokio::{net::TcpListener, sync::watch, task::JoinHandle};

/// サーバーの稼働状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Stopped,
}

/// `run` の終了理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// 処理中のリクエストがすべて猶予期間内に完了した
    Graceful,
    /// 猶予期間を過ぎたため処理中のリクエストを待たずに停止した
    Forced,
    /// 停止要求の前にリスナーが正常終了した
    ListenerExited,
}

/// シャットダウン処理のエラー
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("猶予期間 {grace:?} 内に処理中のリクエストが完了しませんでした")]
    Forced { grace: Duration },

    #[error("サーバーが異常終了しました: {0}")]
    Serve(#[from] io::Error),
}

/// リスナーに渡す停止要求
///
/// [`wait`](StopSignal::wait) は停止要求（`Running` 以外への遷移）で完了する。
/// コーディネータが破棄された場合も停止要求として扱う。
#[derive(Debug, Clone)]
pub struct StopSignal {
    state: watch::Receiver<ShutdownState>,
}

impl StopSignal {
    pub async fn wait(mut self) {
        let _ = self
            .state
            .wait_for(|state| *state != ShutdownState::Running)
            .await;
    }
}

/// 接続を受け付けるリスナー
///
/// `serve` は停止要求を受けるまで接続を受け付け、受けたら新規の受付を止めて
/// 処理中のリクエストの完了を待ってから戻る。
#[async_trait]
pub trait Listener: Send {
    async fn serve(self, stop: StopSignal) -> io::Result<()>;
}

/// axum の Router を提供する HTTP リスナー
pub struct HttpListener {
    listener: TcpListener,
    router:   Router,
}

impl HttpListener {
    /// アドレスにバインドする
    pub async fn bind(addr: &str, router: Router) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::new(listener, router))
    }

    pub fn new(listener: TcpListener, router: Router) -> Self {
        Self { listener, router }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl Listener for HttpListener {
    async fn serve(self, stop: StopSignal) -> io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(stop.wait())
            .await
    }
}

/// シャットダウンの調停役
///
/// `Clone` した複製は同じ状態を共有する。
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    state: Arc<watch::Sender<ShutdownState>>,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            state: Arc::new(state),
            grace,
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn stop_signal(&self) -> StopSignal {
        StopSignal {
            state: self.state.subscribe(),
        }
    }

    /// 停止を要求する
    ///
    /// `Running` から `ShuttingDown` に遷移した場合のみ `true` を返す。
    /// 2 回目以降の呼び出しは何もしない。
    pub fn trigger(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::ShuttingDown;
                true
            } else {
                false
            }
        })
    }

    /// 終了シグナルを待ち受けるタスクを起動する
    ///
    /// 最初に届いたシグナルで 1 回だけ [`trigger`](Self::trigger) する。
    /// 以降のシグナルは停止処理に影響しない。
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            match termination_signal().await {
                Ok(signal) => {
                    tracing::info!(signal, "終了シグナルを受信しました");
                    coordinator.trigger();
                }
                Err(e) => {
                    tracing::error!(error = %e, "シグナルハンドラの登録に失敗");
                }
            }
        })
    }

    /// リスナーを起動し、停止まで待つ
    ///
    /// # エラー
    ///
    /// リスナーが I/O エラーで終了した場合は [`ShutdownError::Serve`] を返す。
    /// 猶予切れはエラーにせず [`ShutdownOutcome::Forced`] を返す。
    pub async fn run<L: Listener>(&self, listener: L) -> Result<ShutdownOutcome, ShutdownError> {
        let mut serve = listener.serve(self.stop_signal());

        tokio::select! {
            result = &mut serve => {
                self.finish();
                result?;
                tracing::info!("停止要求の前にサーバーが終了しました");
                return Ok(ShutdownOutcome::ListenerExited);
            }
            () = self.stop_signal().wait() => {}
        }

        tracing::info!(
            grace_secs = self.grace.as_secs_f64(),
            "グレースフルシャットダウンを開始します"
        );

        let outcome = match tokio::time::timeout(self.grace, &mut serve).await {
            Ok(result) => {
                self.finish();
                result?;
                tracing::info!("サーバーを停止しました");
                ShutdownOutcome::Graceful
            }
            Err(_) => {
                self.finish();
                let error = ShutdownError::Forced { grace: self.grace };
                tracing::warn!(error = %error, "処理中のリクエストを待たずに停止します");
                ShutdownOutcome::Forced
            }
        };

        Ok(outcome)
    }

    fn finish(&self) {
        self.state.send_replace(ShutdownState::Stopped);
    }
}

/// SIGINT（Ctrl+C）または SIGTERM を待つ
///
/// 受信したシグナル名を返す。
pub async fn termination_signal() -> io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok("SIGINT")
            }
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("SIGINT")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    const GRACE: Duration = Duration::from_secs(5);

    /// 停止要求を受けてから `drain` だけ経って終了するリスナー
    struct DrainingListener {
        drain:    Duration,
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Listener for DrainingListener {
        async fn serve(self, stop: StopSignal) -> io::Result<()> {
            stop.wait().await;
            tokio::time::sleep(self.drain).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// 即座に I/O エラーで終了するリスナー
    struct FailingListener;

    #[async_trait]
    impl Listener for FailingListener {
        async fn serve(self, _stop: StopSignal) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::AddrInUse, "address already in use"))
        }
    }

    /// 停止要求を待たずに正常終了するリスナー
    struct ExitingListener;

    #[async_trait]
    impl Listener for ExitingListener {
        async fn serve(self, _stop: StopSignal) -> io::Result<()> {
            Ok(())
        }
    }

    async fn run_with_drain(drain: Duration) -> (ShutdownCoordinator, ShutdownOutcome, bool) {
        let sut = ShutdownCoordinator::new(GRACE);
        let finished = Arc::new(AtomicBool::new(false));
        let listener = DrainingListener {
            drain,
            finished: finished.clone(),
        };

        let runner = {
            let sut = sut.clone();
            tokio::spawn(async move { sut.run(listener).await })
        };
        tokio::task::yield_now().await;
        assert!(sut.trigger());

        let outcome = runner.await.unwrap().unwrap();
        (sut, outcome, finished.load(Ordering::SeqCst))
    }

    #[test]
    fn test_初期状態はrunning() {
        let sut = ShutdownCoordinator::new(GRACE);
        assert_eq!(sut.state(), ShutdownState::Running);
        assert_eq!(sut.grace(), GRACE);
    }

    #[test]
    fn test_triggerは一度だけ遷移する() {
        let sut = ShutdownCoordinator::new(GRACE);

        assert!(sut.trigger());
        assert!(!sut.trigger());
        assert!(!sut.clone().trigger());

        assert_eq!(sut.state(), ShutdownState::ShuttingDown);
    }

    #[tokio::test]
    async fn test_stop_signalはtriggerで完了する() {
        let sut = ShutdownCoordinator::new(GRACE);
        let signal = sut.stop_signal();
        let waiter = tokio::spawn(signal.wait());

        sut.trigger();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_trigger後に取得したstop_signalは即座に完了する() {
        let sut = ShutdownCoordinator::new(GRACE);
        sut.trigger();

        tokio::time::timeout(Duration::from_secs(1), sut.stop_signal().wait())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_猶予期間内に処理が終わればgraceful() {
        let (sut, outcome, finished) = run_with_drain(GRACE - Duration::from_millis(100)).await;

        assert_eq!(outcome, ShutdownOutcome::Graceful);
        assert!(finished);
        assert_eq!(sut.state(), ShutdownState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_猶予期間を過ぎるとforcedで戻る() {
        let started = tokio::time::Instant::now();

        let (sut, outcome, finished) = run_with_drain(GRACE + Duration::from_millis(100)).await;

        assert_eq!(outcome, ShutdownOutcome::Forced);
        assert!(!finished);
        assert_eq!(sut.state(), ShutdownState::Stopped);
        // 猶予期間を大きく超えて待たない
        assert!(started.elapsed() < GRACE + Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_リスナーのエラーはserveエラーとして返す() {
        let sut = ShutdownCoordinator::new(GRACE);

        let err = sut.run(FailingListener).await.unwrap_err();

        assert!(matches!(err, ShutdownError::Serve(ref e) if e.kind() == io::ErrorKind::AddrInUse));
        assert_eq!(sut.state(), ShutdownState::Stopped);
    }

    #[tokio::test]
    async fn test_停止要求前にリスナーが終了した場合() {
        let sut = ShutdownCoordinator::new(GRACE);

        let outcome = sut.run(ExitingListener).await.unwrap();

        assert_eq!(outcome, ShutdownOutcome::ListenerExited);
        assert_eq!(sut.state(), ShutdownState::Stopped);
        // 停止後の trigger は何もしない
        assert!(!sut.trigger());
    }

    #[test]
    fn test_forcedエラーのメッセージ() {
        let err = ShutdownError::Forced { grace: GRACE };
        assert_eq!(
            err.to_string(),
            "猶予期間 5s 内に処理中のリクエストが完了しませんでした"
        );
    }
}
