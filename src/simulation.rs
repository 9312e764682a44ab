//! # Simulation モジュール
//!
//! シナリオに従ってエージェントを生成し、フレームループで駆動するエンジンです。
//! ブラウザのレンダーループに相当する部分をヘッドレスで再現します。
//!
//! ## フレーム処理順序
//!
//! 各フレームにおいて、以下の順序で処理が実行されます：
//!
//! 1. **ポインタイベント適用**: スクリプトに記述された移動・離脱をトラッカーへ反映
//! 2. **ポインタスナップショット**: アイドル判定込みの最新状態を取得
//! 3. **エージェント更新**: 各コントローラーの `update`
//! 4. **統計更新**: 最大速度・反射回数・反発フレーム数など
//!
//! ポインタのアイドル判定はフレーム時間の累計で行います。
//! 目標点の再選択はフレームとは独立したタイマータスクで行われます。
//! `clock: frame` ではタイマーもフレーム時間の累計で進むため、
//! 実時間ペースでない実行でも再選択が起こり、結果はシードで再現できます。
//! 同一スレッド上の協調スケジューリングのため、フレーム処理と同時には走りません。
//!
//! 周期タイマー（`tokio::time::interval`）は `realtime: true` のときだけ作ります。
//!
//! ## 使用例
//!
//! ```no_run
//! use beesim::scenario::ScenarioConfig;
//! use beesim::simulation::SimulationEngine;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScenarioConfig::from_file("scenarios/bee_default.yaml")?;
//! let mut engine = SimulationEngine::new(config, 1);
//! engine.initialize().await?;
//! let stats = engine.run().await?;
//! println!("{}", stats.frames);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use glam::DVec3;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::models::*;
use crate::scenario::*;

/// エージェントごとの統計
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentStats {
    pub frames: u64,
    pub max_speed: f64,
    pub max_steering: f64,
    pub reflections: u64,
    pub repulsion_frames: u64,
    pub retargets: u64,
    pub final_position: DVec3,
    pub final_velocity: DVec3,
    pub representation: &'static str,
}

/// シミュレーション全体の統計
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationStats {
    pub frames: u64,
    pub simulated_seconds: f64,
    pub agents: BTreeMap<String, AgentStats>,
}

pub struct SimulationEngine {
    pub current_frame: u64,
    pub scenario_config: ScenarioConfig,
    pub verbose_level: u8,

    pub camera: Arc<Camera>,
    pub controllers: Vec<BeeController>,
    pub pointer: PointerTracker,
    pub stats: SimulationStats,
    /// ポインタのアイドル判定に使うシミュレーション時刻の起点
    epoch: Instant,
}

impl SimulationEngine {
    pub fn new(scenario: ScenarioConfig, verbose_level: u8) -> Self {
        let camera = Arc::new(scenario.camera);
        let pointer = PointerTracker::new(scenario.interaction);

        Self {
            current_frame: 0,
            scenario_config: scenario,
            verbose_level,
            camera,
            controllers: Vec::new(),
            pointer,
            stats: SimulationStats::default(),
            epoch: Instant::now(),
        }
    }

    /// エージェント生成とモデル読み込み（ファイルローダー使用）
    pub async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.initialize_with_loader(&FileAssetLoader).await
    }

    /// 任意のローダーでエージェントを初期化
    pub async fn initialize_with_loader<L: IAssetLoader>(&mut self, loader: &L) -> Result<(), Box<dyn std::error::Error>> {
        if self.verbose_level > 0 {
            info!("シミュレーションエンジンを初期化中...");
        }

        let base_seed = self.scenario_config.sim.seed;
        for (index, agent_config) in self.scenario_config.agents.iter().enumerate() {
            let seed = base_seed.wrapping_add(index as u64);
            let mut controller = BeeController::new(
                agent_config.clone(),
                Arc::clone(&self.camera),
                seed,
                self.scenario_config.sim.clock,
            )?;
            controller.load_representation(loader, &self.scenario_config.assets.model).await;

            if self.verbose_level > 1 {
                debug!(
                    "エージェント初期化: {} (表示: {}, シード: {})",
                    controller.get_id(),
                    controller.representation().kind(),
                    seed
                );
            }

            self.stats.agents.insert(controller.get_id(), AgentStats::default());
            self.controllers.push(controller);
        }

        if self.verbose_level > 0 {
            info!("初期化完了: エージェント {}体", self.controllers.len());
        }

        Ok(())
    }

    /// フレームループを実行し、終了時に全エージェントを破棄する
    pub async fn run(&mut self) -> Result<SimulationStats, Box<dyn std::error::Error>> {
        info!("=== シミュレーション実行開始 ===");

        let frames = self.scenario_config.sim.frames;
        let fixed_delta = self.scenario_config.sim.delta_s;
        let realtime = self.scenario_config.sim.realtime;

        // 実時間ペースのときだけ周期タイマーを作る
        let mut ticker = if realtime {
            let period = frame_period(fixed_delta)?;
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            Some(ticker)
        } else {
            None
        };
        self.epoch = Instant::now();
        let mut last_tick = self.epoch;

        while self.current_frame < frames {
            let delta = if let Some(ticker) = ticker.as_mut() {
                ticker.tick().await;
                let now = Instant::now();
                let measured = now.saturating_duration_since(last_tick).as_secs_f64();
                last_tick = now;
                // 最初のティックは即時なので固定値を使う
                if self.current_frame == 0 { fixed_delta } else { measured }
            } else {
                // タイマータスクに実行機会を与える
                tokio::task::yield_now().await;
                fixed_delta
            };

            self.step(delta);

            if self.verbose_level > 2 {
                trace!("フレーム: {} (経過: {:.2}秒)", self.current_frame, self.stats.simulated_seconds);
            }

            if self.current_frame % 100 == 0 && self.verbose_level > 0 {
                let progress = (self.current_frame as f64 / frames as f64) * 100.0;
                info!("進行状況: {:.1}% ({}/{}フレーム)", progress, self.current_frame, frames);
            }
        }

        for controller in &mut self.controllers {
            controller.dispose();
        }

        info!("=== シミュレーション完了 ===");
        info!("総フレーム数: {}", self.stats.frames);
        info!("シミュレーション時間: {:.2}秒", self.stats.simulated_seconds);

        Ok(self.stats.clone())
    }

    fn step(&mut self, delta: f64) {
        self.apply_pointer_script();
        let viewport = self.scenario_config.viewport;
        let pointer = self.pointer.snapshot(viewport, self.sim_now());

        for controller in &mut self.controllers {
            let outcome = controller.update(delta, pointer, viewport);
            if let Some(stats) = self.stats.agents.get_mut(&controller.config.id) {
                record_frame(stats, controller, outcome);
            }
        }

        self.current_frame += 1;
        self.stats.frames = self.current_frame;
        self.stats.simulated_seconds += delta;
    }

    /// シミュレーション時刻（フレーム時間の累計）
    ///
    /// 表現できない累計になった場合は起点で止まります。
    fn sim_now(&self) -> Instant {
        Duration::try_from_secs_f64(self.stats.simulated_seconds)
            .ok()
            .and_then(|elapsed| self.epoch.checked_add(elapsed))
            .unwrap_or(self.epoch)
    }

    fn apply_pointer_script(&mut self) {
        let now = self.sim_now();
        for event in self.scenario_config.pointer_script.iter().filter(|e| e.frame == self.current_frame) {
            match event.action {
                PointerAction::Move { x, y } => self.pointer.on_move(x, y, now),
                PointerAction::Leave => self.pointer.on_leave(),
            }
            debug!(frame = self.current_frame, action = ?event.action, "POINTER_EVENT: ポインタイベントを適用しました");
        }
    }

    /// 統計の表示
    pub fn print_summary(&self) {
        println!("=== シミュレーション結果 ===");
        println!("総フレーム数: {}", self.stats.frames);
        println!("シミュレーション時間: {:.2}秒", self.stats.simulated_seconds);
        for (id, stats) in &self.stats.agents {
            println!(
                "  {}: 表示={} 最終位置=({:.2}, {:.2}, {:.2}) 最大速度={:.3} 反射={}回 反発={}フレーム 目標更新={}回",
                id,
                stats.representation,
                stats.final_position.x,
                stats.final_position.y,
                stats.final_position.z,
                stats.max_speed,
                stats.reflections,
                stats.repulsion_frames,
                stats.retargets
            );
        }
    }
}

/// 実時間ペースのフレーム周期（ゼロや表現できない値はエラー）
fn frame_period(delta_s: f64) -> Result<Duration, ScenarioError> {
    Duration::try_from_secs_f64(delta_s)
        .ok()
        .filter(|period| !period.is_zero())
        .ok_or_else(|| ScenarioError::Validation(format!("delta_s {} is not a usable frame period", delta_s)))
}

fn record_frame(stats: &mut AgentStats, controller: &BeeController, outcome: Option<FrameOutcome>) {
    stats.representation = controller.representation().kind();
    stats.final_position = controller.get_position();
    stats.final_velocity = controller.get_velocity();

    let Some(outcome) = outcome else {
        return;
    };
    stats.frames += 1;
    stats.max_speed = stats.max_speed.max(controller.get_velocity().length());
    stats.max_steering = stats.max_steering.max(outcome.report.forces.steering.length());
    if outcome.report.reflected.any() {
        stats.reflections += 1;
    }
    if outcome.report.forces.repulsion != DVec3::ZERO {
        stats.repulsion_frames += 1;
    }
    if outcome.retargeted {
        stats.retargets += 1;
    }
}
