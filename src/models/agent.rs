//! エージェントの運動状態と1フレームの積分処理
//!
//! `step` はレンダラーに依存しない純粋な更新関数です。状態は呼び出し側が所有し、
//! 参照で渡します。コントローラーはこの関数の薄いラッパーになっています。
//!
//! 処理順序：
//! 1. 加速度をゼロクリア
//! 2. 操舵力の計算（ワンダー + シーク + 反発、`max_force` で制限）
//! 3. 加速度へ加算 → 速度積分 → `max_speed` でクリップ
//! 4. 位置更新（`delta` 秒）
//! 5. 軸ごとの境界反射（マージン付き、位置はクランプしない）

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::models::camera::Camera;
use crate::models::common::{Bounds, PointerState, ReflectedAxes, ReflectionMargins, Viewport};
use crate::models::steering::{self, SteeringForces, SteeringWeights, WanderSource};

/// エージェント設定（生存期間中は不変）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub id: String,
    pub start_position: DVec3,
    pub max_speed: f64,
    pub max_force: f64,
    pub bounds: Bounds,
    /// 目標点の再選択間隔 [最小, 最大]（ミリ秒）
    pub wander_interval_ms: [f64; 2],
    /// ポインタ回避半径（ピクセル）
    pub avoid_radius_px: f64,
    /// メッシュ表示時のスケール
    pub scale: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: "BEE001".to_string(),
            start_position: DVec3::new(0.0, 1.5, 0.0),
            max_speed: 1.2,
            max_force: 0.05,
            bounds: Bounds::default(),
            wander_interval_ms: [2000.0, 6000.0],
            avoid_radius_px: 120.0,
            scale: 0.45,
        }
    }
}

impl AgentConfig {
    /// 設定の検証
    ///
    /// 空・反転した境界や非正の速度上限など、実行時にNaN位置を生む設定を拒否します。
    pub fn validate(&self) -> Result<(), String> {
        for (axis, range) in self.bounds.axes() {
            if !range.is_valid() {
                return Err(format!(
                    "bounds.{} must satisfy min < max (got [{}, {}])",
                    axis, range.min, range.max
                ));
            }
        }
        if !(self.max_speed.is_finite() && self.max_speed > 0.0) {
            return Err(format!("max_speed must be positive (got {})", self.max_speed));
        }
        if !(self.max_force.is_finite() && self.max_force > 0.0) {
            return Err(format!("max_force must be positive (got {})", self.max_force));
        }
        let [min_ms, max_ms] = self.wander_interval_ms;
        if !(min_ms.is_finite() && max_ms.is_finite() && min_ms > 0.0 && min_ms <= max_ms) {
            return Err(format!(
                "wander_interval_ms must satisfy 0 < min <= max (got [{}, {}])",
                min_ms, max_ms
            ));
        }
        if !(self.avoid_radius_px.is_finite() && self.avoid_radius_px >= 0.0) {
            return Err(format!("avoid_radius_px must be non-negative (got {})", self.avoid_radius_px));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(format!("scale must be positive (got {})", self.scale));
        }
        if !self.start_position.is_finite() {
            return Err("start_position must be finite".to_string());
        }
        Ok(())
    }
}

/// 運動状態
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentState {
    pub position: DVec3,
    pub velocity: DVec3,
    /// フレーム内の一時的な累積値（毎フレーム先頭でゼロクリア）
    pub acceleration: DVec3,
    pub target: DVec3,
    /// 平滑化済みのバンク角（ラジアン）
    pub current_bank: f64,
}

impl AgentState {
    pub fn new(position: DVec3, target: DVec3) -> Self {
        Self {
            position,
            velocity: DVec3::ZERO,
            acceleration: DVec3::ZERO,
            target,
            current_bank: 0.0,
        }
    }
}

/// 1フレームの外部入力
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    /// フレーム時間（秒）
    pub delta: f64,
    /// エージェント内部時計の経過秒
    pub elapsed: f64,
    pub pointer: PointerState,
    pub viewport: Viewport,
    pub camera: &'a Camera,
}

/// `step` の結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub forces: SteeringForces,
    pub reflected: ReflectedAxes,
}

/// 1フレーム分の操舵・積分・境界反射
pub fn step(
    state: &mut AgentState,
    config: &AgentConfig,
    wander: &WanderSource,
    weights: &SteeringWeights,
    input: &FrameInput<'_>,
) -> StepReport {
    // 1. 加速度リセット
    state.acceleration = DVec3::ZERO;

    // 2. 操舵力（1フレームに1回だけ計算し、バンク計算でも再利用する）
    let wander_f = steering::wander_force(wander, input.elapsed, weights);
    let seek_f = steering::seek_force(state.position, state.target, weights);
    let repulsion_f = steering::repulsion_force(
        state.position,
        &input.pointer,
        input.camera,
        input.viewport,
        config.avoid_radius_px,
        weights,
    );
    let steering_f = steering::compose(wander_f, seek_f, repulsion_f, state.velocity, config.max_force);

    // 3. 加速度 → 速度
    state.acceleration += steering_f;
    state.velocity = (state.velocity + state.acceleration).clamp_length_max(config.max_speed);

    // 4. 位置
    state.position += state.velocity * input.delta;

    // 5. 境界反射
    let reflected = reflect_at_bounds(state, &config.bounds, ReflectionMargins::default());

    StepReport {
        forces: SteeringForces {
            wander: wander_f,
            seek: seek_f,
            repulsion: repulsion_f,
            steering: steering_f,
        },
        reflected,
    }
}

/// 軸ごとにマージン外なら速度成分を反転する
pub fn reflect_at_bounds(state: &mut AgentState, bounds: &Bounds, margins: ReflectionMargins) -> ReflectedAxes {
    let mut reflected = ReflectedAxes::default();
    if bounds.x.is_outside(state.position.x, margins.x) {
        state.velocity.x = -state.velocity.x;
        reflected.x = true;
    }
    if bounds.y.is_outside(state.position.y, margins.y) {
        state.velocity.y = -state.velocity.y;
        reflected.y = true;
    }
    if bounds.z.is_outside(state.position.z, margins.z) {
        state.velocity.z = -state.velocity.z;
        reflected.z = true;
    }
    reflected
}
