//! ワンダー目標点の再選択タイマー
//!
//! フレームループとは独立したtokioタスクとして動作し、ランダムな間隔で
//! 境界内の新しい目標点を `watch` チャネルへ送ります。フレーム側は各フレームで
//! 最新値だけを読み取ります。
//!
//! 待ち時間はランタイムの時計か、フレーム時間の累計（`TimeSource::Simulated`）で計ります。
//! 後者ではフレームを進めた分だけタイマーが進むため、実行速度に依存しません。
//!
//! 破棄後に目標が変わらないことを保証するため、明示的な `disposed` フラグを
//! 発火前と読み取り時の両方で確認し、さらにタスク自体も中断します。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use glam::DVec3;
use rand::Rng;
use rand::rngs::StdRng;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::models::common::Bounds;
use crate::models::controller::ControllerError;

/// 再選択間隔の範囲（ミリ秒）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetargetInterval {
    pub min_ms: f64,
    pub max_ms: f64,
}

impl RetargetInterval {
    pub fn new(min_ms: f64, max_ms: f64) -> Self {
        Self { min_ms, max_ms }
    }

    /// 一様ランダムな待ち時間
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let ms = rng.gen_range(self.min_ms..=self.max_ms);
        Duration::from_secs_f64(ms / 1000.0)
    }
}

impl From<[f64; 2]> for RetargetInterval {
    fn from(value: [f64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

/// タイマーの時間源
#[derive(Debug)]
pub enum TimeSource {
    /// tokioランタイムの時計
    Runtime,
    /// フレーム側が公開するシミュレーション経過時間
    Simulated(watch::Receiver<Duration>),
}

impl TimeSource {
    /// `delay` だけ待つ。シミュレーション時計の送信側が破棄された場合は false
    async fn wait(&mut self, delay: Duration) -> bool {
        match self {
            TimeSource::Runtime => {
                tokio::time::sleep(delay).await;
                true
            }
            TimeSource::Simulated(clock) => {
                let deadline = *clock.borrow_and_update() + delay;
                loop {
                    if *clock.borrow_and_update() >= deadline {
                        return true;
                    }
                    if clock.changed().await.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}

/// 目標点再選択タイマー
#[derive(Debug)]
pub struct RetargetTimer {
    receiver: watch::Receiver<DVec3>,
    disposed: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RetargetTimer {
    /// 現在のtokioランタイム上でタイマーを起動
    ///
    /// `initial_target` はチャネルの初期値になります（呼び出し側は既に保持している前提）。
    /// ランタイム外から呼ぶと `ControllerError::NoRuntime`。
    pub fn spawn(
        agent_id: String,
        bounds: Bounds,
        interval: RetargetInterval,
        initial_target: DVec3,
        mut rng: StdRng,
        mut time: TimeSource,
    ) -> Result<Self, ControllerError> {
        let runtime = Handle::try_current().map_err(|_| ControllerError::NoRuntime)?;

        // 初期値は既読扱いなので、最初の発火までは latest() が None を返す
        let (sender, receiver) = watch::channel(initial_target);

        let disposed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&disposed);

        let handle = runtime.spawn(async move {
            let mut retarget_count: u64 = 0;
            loop {
                let delay = interval.sample(&mut rng);
                if !time.wait(delay).await {
                    break;
                }

                if flag.load(Ordering::Acquire) {
                    break;
                }

                let target = bounds.random_point(&mut rng);
                if sender.send(target).is_err() {
                    break;
                }
                retarget_count += 1;

                trace!(
                    agent_id = %agent_id,
                    target_x = target.x,
                    target_y = target.y,
                    target_z = target.z,
                    delay_ms = delay.as_secs_f64() * 1000.0,
                    retarget_count,
                    "BEE_RETARGET: ワンダー目標点を更新しました"
                );
            }
            debug!(agent_id = %agent_id, retarget_count, "BEE_RETARGET_STOPPED: 目標点タイマーを停止しました");
        });

        Ok(Self {
            receiver,
            disposed,
            handle: Some(handle),
        })
    }

    /// 前回の読み取り以降に新しい目標が届いていれば返す
    pub fn latest(&mut self) -> Option<DVec3> {
        if self.is_cancelled() {
            return None;
        }
        match self.receiver.has_changed() {
            Ok(true) => Some(*self.receiver.borrow_and_update()),
            _ => None,
        }
    }

    /// タイマーを停止（何度呼んでもよい）
    pub fn cancel(&mut self) {
        self.disposed.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for RetargetTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
