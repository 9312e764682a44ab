//! ポインタ入力の追跡
//!
//! ポインタ移動イベントを受け取り、フレームごとにスナップショットを返します。
//! 一定時間移動がなければ非アクティブに戻り、狭いビューポート（タッチ端末想定）では
//! 常に非アクティブです。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::models::common::{PointerState, Viewport};

/// ポインタ追跡設定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// 最後の移動からこの時間が経つと非アクティブ（ミリ秒）
    pub idle_timeout_ms: u64,
    /// この幅未満のビューポートでは反発を無効化（ピクセル）
    pub min_viewport_width_px: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 2000,
            min_viewport_width_px: 768.0,
        }
    }
}

/// ポインタ追跡器
#[derive(Debug, Clone)]
pub struct PointerTracker {
    config: InteractionConfig,
    x: f64,
    y: f64,
    last_move: Option<Instant>,
}

impl PointerTracker {
    pub fn new(config: InteractionConfig) -> Self {
        Self {
            config,
            x: 0.0,
            y: 0.0,
            last_move: None,
        }
    }

    /// 移動イベント
    pub fn on_move(&mut self, x: f64, y: f64, now: Instant) {
        self.x = x;
        self.y = y;
        self.last_move = Some(now);
    }

    /// ポインタがウィンドウ外へ出た
    pub fn on_leave(&mut self) {
        self.last_move = None;
    }

    /// 現時点のスナップショット
    pub fn snapshot(&self, viewport: Viewport, now: Instant) -> PointerState {
        let interactive = viewport.width >= self.config.min_viewport_width_px;
        let recent = self
            .last_move
            .is_some_and(|t| now.saturating_duration_since(t) < Duration::from_millis(self.config.idle_timeout_ms));
        PointerState::new(self.x, self.y, interactive && recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_pointer_goes_idle_after_timeout() {
        let viewport = Viewport::new(1280.0, 720.0);
        let mut tracker = PointerTracker::new(InteractionConfig::default());
        assert!(!tracker.snapshot(viewport, Instant::now()).active);

        tracker.on_move(100.0, 200.0, Instant::now());
        let snap = tracker.snapshot(viewport, Instant::now());
        assert!(snap.active);
        assert_eq!((snap.x, snap.y), (100.0, 200.0));

        tokio::time::advance(Duration::from_millis(1999)).await;
        assert!(tracker.snapshot(viewport, Instant::now()).active);

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(!tracker.snapshot(viewport, Instant::now()).active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_narrow_viewport_disables_interaction() {
        let mut tracker = PointerTracker::new(InteractionConfig::default());
        tracker.on_move(10.0, 10.0, Instant::now());
        assert!(!tracker.snapshot(Viewport::new(600.0, 900.0), Instant::now()).active);
        assert!(tracker.snapshot(Viewport::new(768.0, 900.0), Instant::now()).active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_deactivates() {
        let viewport = Viewport::new(1280.0, 720.0);
        let mut tracker = PointerTracker::new(InteractionConfig::default());
        tracker.on_move(10.0, 10.0, Instant::now());
        tracker.on_leave();
        assert!(!tracker.snapshot(viewport, Instant::now()).active);
    }
}
