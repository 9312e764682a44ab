//! ハチ型エージェントのコントローラー
//!
//! 運動状態・操舵・目標点タイマー・表示形態をひとまとめに所有し、
//! 外部のレンダーループから1フレームに1回 `update` されます。
//!
//! ライフサイクル：
//! 1. `new` で設定検証、乱数の初期化、最初の目標点選択、タイマー起動
//! 2. `load_representation` でメッシュかスプライトのどちらかに確定（一度だけ）
//! 3. `update` を毎フレーム呼び出し
//! 4. `dispose`（または drop）でタイマー停止・表示解放・アニメーション停止

use std::sync::Arc;
use std::time::Duration;

use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::models::agent::{self, AgentConfig, AgentState, FrameInput, StepReport};
use crate::models::assets::{AnimationPlayback, select_flight_clip};
use crate::models::camera::Camera;
use crate::models::common::{AgentStatus, PointerState, Viewport};
use crate::models::noise::GradientNoise;
use crate::models::orientation::{BankingParams, MeshBody, Representation, SpriteBody};
use crate::models::retarget::{RetargetInterval, RetargetTimer, TimeSource};
use crate::models::steering::{SteeringWeights, WanderSource};
use crate::models::traits::{IAgent, IAssetLoader, IMovable};

/// コントローラーの構築エラー
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("エージェント設定が不正です ({id}): {reason}")]
    InvalidConfig { id: String, reason: String },
    #[error("tokioランタイムの外で目標点タイマーを起動できません")]
    NoRuntime,
}

/// ワンダー用の内部時計
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    /// 構築時からの実経過時間
    #[default]
    Wall,
    /// `update` に渡された delta の合計（再現可能）。目標点タイマーもこの時計で進む
    Frame,
}

#[derive(Debug)]
enum AgentClock {
    Wall(Instant),
    /// 経過秒と、目標点タイマーへ公開する送信側
    Frame { total: f64, publisher: watch::Sender<Duration> },
}

impl AgentClock {
    /// 時計と、目標点タイマー用の時間源を作る
    fn new(mode: ClockMode) -> (Self, TimeSource) {
        match mode {
            ClockMode::Wall => (AgentClock::Wall(Instant::now()), TimeSource::Runtime),
            ClockMode::Frame => {
                let (publisher, receiver) = watch::channel(Duration::ZERO);
                (AgentClock::Frame { total: 0.0, publisher }, TimeSource::Simulated(receiver))
            }
        }
    }

    fn advance(&mut self, delta: f64) -> f64 {
        match self {
            AgentClock::Wall(started) => started.elapsed().as_secs_f64(),
            AgentClock::Frame { total, publisher } => {
                *total += delta;
                if let Ok(elapsed) = Duration::try_from_secs_f64(*total) {
                    publisher.send_replace(elapsed);
                }
                *total
            }
        }
    }
}

/// フレーム更新の結果（描画側・統計用）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutcome {
    pub report: StepReport,
    pub retargeted: bool,
}

/// ハチ型エージェントコントローラー
#[derive(Debug)]
pub struct BeeController {
    pub config: AgentConfig,
    camera: Arc<Camera>,
    state: AgentState,
    wander: WanderSource,
    weights: SteeringWeights,
    banking: BankingParams,
    clock: AgentClock,
    retarget: RetargetTimer,
    representation: Representation,
    load_attempted: bool,
    /// アニメーション開始位相（秒）
    animation_phase: f64,
    status: AgentStatus,
    frame_count: u64,
}

impl BeeController {
    /// 新しいコントローラーを作成
    ///
    /// ノイズ順列・位相オフセット・初期目標点・タイマー用乱数はすべて `seed` から導出します。
    /// 目標点タイマーを起動するため、tokioランタイム内で呼び出す必要があります。
    pub fn new(config: AgentConfig, camera: Arc<Camera>, seed: u64, clock: ClockMode) -> Result<Self, ControllerError> {
        config.validate().map_err(|reason| ControllerError::InvalidConfig {
            id: config.id.clone(),
            reason,
        })?;

        let mut rng = StdRng::seed_from_u64(seed);
        let noise = GradientNoise::from_rng(&mut rng);
        let phase_offset = rng.gen_range(0.0..1000.0);
        let animation_phase = rng.gen_range(0.0..1.0);
        let target = config.bounds.random_point(&mut rng);
        let timer_rng = StdRng::seed_from_u64(rng.next_u64());
        let (agent_clock, time_source) = AgentClock::new(clock);

        let retarget = RetargetTimer::spawn(
            config.id.clone(),
            config.bounds,
            RetargetInterval::from(config.wander_interval_ms),
            target,
            timer_rng,
            time_source,
        )?;

        info!(
            agent_id = %config.id,
            start_x = config.start_position.x,
            start_y = config.start_position.y,
            start_z = config.start_position.z,
            target_x = target.x,
            target_y = target.y,
            target_z = target.z,
            max_speed = config.max_speed,
            max_force = config.max_force,
            seed,
            clock = ?clock,
            "BEE_CREATED: エージェントを生成しました"
        );

        Ok(Self {
            state: AgentState::new(config.start_position, target),
            config,
            camera,
            wander: WanderSource::new(noise, phase_offset),
            weights: SteeringWeights::default(),
            banking: BankingParams::default(),
            clock: agent_clock,
            retarget,
            representation: Representation::Pending,
            load_attempted: false,
            animation_phase,
            status: AgentStatus::Active,
            frame_count: 0,
        })
    }

    /// 表示形態を読み込む（インスタンスごとに一度だけ）
    ///
    /// 失敗時は警告ログを出してスプライト表示へ切り替えます。エラーは呼び出し側へ返しません。
    pub async fn load_representation<L: IAssetLoader>(&mut self, loader: &L, url: &str) {
        if self.load_attempted || self.status == AgentStatus::Disposed {
            debug!(agent_id = %self.config.id, "BEE_LOAD_SKIPPED: 読み込み済み、または破棄済みです");
            return;
        }
        self.load_attempted = true;

        let result = loader.load(url).await;

        self.representation = match result {
            Ok(model) => {
                let animation = select_flight_clip(&model.clips)
                    .cloned()
                    .map(|clip| AnimationPlayback::start(clip, self.animation_phase));
                info!(
                    agent_id = %self.config.id,
                    source = %model.source,
                    mesh_count = model.meshes.len(),
                    clip = animation.as_ref().map(|a| a.clip.name.as_str()).unwrap_or("-"),
                    "BEE_MODEL_LOADED: 3Dモデルを読み込みました"
                );
                Representation::Mesh(MeshBody::new(model.source, self.state.position, self.config.scale, animation))
            }
            Err(err) => {
                warn!(
                    agent_id = %self.config.id,
                    url = %url,
                    error = %err,
                    "BEE_ASSET_FALLBACK: モデル読み込みに失敗したためスプライト表示に切り替えます"
                );
                Representation::Sprite(SpriteBody::new(self.state.position))
            }
        };
    }

    /// 1フレーム更新
    ///
    /// 表示形態が未確定、または破棄後は何もしません。`delta` は秒単位で、
    /// 負値・非有限値のフレームは警告を出して読み飛ばします。
    pub fn update(&mut self, delta: f64, pointer: PointerState, viewport: Viewport) -> Option<FrameOutcome> {
        if self.status == AgentStatus::Disposed || !self.representation.is_live() {
            return None;
        }
        if !(delta.is_finite() && delta >= 0.0) {
            warn!(agent_id = %self.config.id, delta, "BEE_FRAME_SKIPPED: 不正なフレーム時間です");
            return None;
        }

        let retargeted = self.refresh_target();
        let elapsed = self.clock.advance(delta);

        let input = FrameInput {
            delta,
            elapsed,
            pointer,
            viewport,
            camera: &self.camera,
        };
        let report = agent::step(&mut self.state, &self.config, &self.wander, &self.weights, &input);

        match &mut self.representation {
            Representation::Mesh(body) => {
                body.position = self.state.position;
                self.state.current_bank = body.orient(self.state.velocity, report.forces.steering, delta, &self.banking);
                if let Some(animation) = body.animation.as_mut() {
                    animation.advance(delta);
                }
            }
            Representation::Sprite(sprite) => {
                sprite.position = self.state.position;
                sprite.orient(self.state.velocity);
            }
            Representation::Pending | Representation::Released => {}
        }

        if report.reflected.any() {
            debug!(
                agent_id = %self.config.id,
                position_x = self.state.position.x,
                position_y = self.state.position.y,
                position_z = self.state.position.z,
                reflect_x = report.reflected.x,
                reflect_y = report.reflected.y,
                reflect_z = report.reflected.z,
                "BEE_BOUNDS_REFLECT: 境界で速度成分を反転しました"
            );
        }

        self.frame_count += 1;
        Some(FrameOutcome { report, retargeted })
    }

    /// タイマーから届いた最新の目標点を取り込む
    fn refresh_target(&mut self) -> bool {
        match self.retarget.latest() {
            Some(target) => {
                self.state.target = target;
                true
            }
            None => false,
        }
    }

    /// 破棄（何度呼んでもよい）
    ///
    /// 目標点タイマーの停止、表示の解放、アニメーション停止を行います。
    pub fn dispose(&mut self) {
        self.retarget.cancel();

        if let Representation::Mesh(body) = &mut self.representation {
            if let Some(animation) = body.animation.as_mut() {
                animation.stop();
            }
        }
        let released = std::mem::replace(&mut self.representation, Representation::Released);

        if self.status != AgentStatus::Disposed {
            self.status = AgentStatus::Disposed;
            info!(
                agent_id = %self.config.id,
                representation = released.kind(),
                frames = self.frame_count,
                "BEE_DISPOSED: エージェントを破棄しました"
            );
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn target(&self) -> DVec3 {
        self.state.target
    }

    pub fn representation(&self) -> &Representation {
        &self.representation
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn is_disposed(&self) -> bool {
        self.status == AgentStatus::Disposed
    }
}

impl Drop for BeeController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl IAgent for BeeController {
    fn get_id(&self) -> String {
        self.config.id.clone()
    }

    fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}

impl IMovable for BeeController {
    fn get_position(&self) -> DVec3 {
        self.state.position
    }

    fn get_velocity(&self) -> DVec3 {
        self.state.velocity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::assets::{AnimationClip, LoadedModel, StaticAssetLoader};

    fn viewport() -> Viewport {
        Viewport::new(1280.0, 720.0)
    }

    fn controller(seed: u64) -> BeeController {
        BeeController::new(AgentConfig::default(), Arc::new(Camera::default()), seed, ClockMode::Frame).unwrap()
    }

    fn bee_model() -> LoadedModel {
        LoadedModel {
            source: "bee_low.glb".to_string(),
            meshes: vec!["Body".to_string()],
            clips: vec![AnimationClip::new("Idle", 2.0), AnimationClip::new("Fly", 1.0)],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_fails_fast() {
        let mut config = AgentConfig::default();
        config.bounds.z = crate::models::common::AxisRange::new(2.0, -1.0);
        let result = BeeController::new(config, Arc::new(Camera::default()), 1, ClockMode::Frame);
        assert!(matches!(result, Err(ControllerError::InvalidConfig { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_target_inside_bounds_and_seed_reproducible() {
        let a = controller(5);
        let b = controller(5);
        assert!(a.config.bounds.contains(a.target()));
        assert_eq!(a.target(), b.target());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_is_noop_until_loaded() {
        let mut bee = controller(1);
        assert!(bee.update(1.0 / 60.0, PointerState::inactive(), viewport()).is_none());
        assert_eq!(bee.state().position, AgentConfig::default().start_position);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mesh_load_selects_fly_clip() {
        let mut bee = controller(2);
        bee.load_representation(&StaticAssetLoader::Model(bee_model()), "bee_low.glb").await;
        match bee.representation() {
            Representation::Mesh(body) => {
                let animation = body.animation.as_ref().unwrap();
                assert_eq!(animation.clip.name, "Fly");
                assert!(animation.playing);
                assert!((0.0..1.0).contains(&animation.time));
                assert_eq!(body.scale, 0.45);
            }
            other => panic!("expected mesh, got {}", other.kind()),
        }
        assert!(bee.update(1.0 / 60.0, PointerState::inactive(), viewport()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_falls_back_to_sprite_once() {
        let mut bee = controller(3);
        bee.load_representation(&StaticAssetLoader::Fail("404".to_string()), "bee_low.glb").await;
        assert_eq!(bee.representation().kind(), "sprite");

        // 2回目の読み込みは無視され、メッシュには戻らない
        bee.load_representation(&StaticAssetLoader::Model(bee_model()), "bee_low.glb").await;
        assert_eq!(bee.representation().kind(), "sprite");

        let outcome = bee.update(1.0 / 60.0, PointerState::inactive(), viewport());
        assert!(outcome.is_some());
        if let Representation::Sprite(sprite) = bee.representation() {
            assert!((sprite.rotation - bee.state().velocity.x * -0.2).abs() < 1e-12);
            assert_eq!(sprite.position, bee.state().position);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_does_not_change_physics() {
        let mut mesh = controller(4);
        let mut sprite = controller(4);
        mesh.load_representation(&StaticAssetLoader::Model(bee_model()), "a").await;
        sprite.load_representation(&StaticAssetLoader::Fail("x".into()), "a").await;
        for _ in 0..120 {
            mesh.update(1.0 / 60.0, PointerState::inactive(), viewport());
            sprite.update(1.0 / 60.0, PointerState::inactive(), viewport());
        }
        assert_eq!(mesh.state().position, sprite.state().position);
        assert_eq!(mesh.state().velocity, sprite.state().velocity);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_delta_frame_is_skipped() {
        let mut bee = controller(6);
        bee.load_representation(&StaticAssetLoader::Fail("x".into()), "a").await;
        assert!(bee.update(-0.016, PointerState::inactive(), viewport()).is_none());
        assert!(bee.update(f64::NAN, PointerState::inactive(), viewport()).is_none());
        assert_eq!(bee.frame_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_retarget_is_picked_up_by_update() {
        let mut bee =
            BeeController::new(AgentConfig::default(), Arc::new(Camera::default()), 7, ClockMode::Wall).unwrap();
        bee.load_representation(&StaticAssetLoader::Fail("x".into()), "a").await;
        let first = bee.target();
        tokio::time::sleep(Duration::from_millis(6001)).await;
        let outcome = bee.update(1.0 / 60.0, PointerState::inactive(), viewport()).unwrap();
        assert!(outcome.retargeted);
        assert_ne!(bee.target(), first);
        assert!(bee.config.bounds.contains(bee.target()));
    }

    #[tokio::test]
    async fn test_frame_clock_retarget_follows_summed_delta() {
        let mut bee = controller(7);
        bee.load_representation(&StaticAssetLoader::Fail("x".into()), "a").await;
        let first = bee.target();

        // 実時間ではなくフレーム時間で発火する（6秒 + 余裕）
        let mut retargeted_at = None;
        for frame in 0..400u32 {
            tokio::task::yield_now().await;
            let outcome = bee.update(1.0 / 60.0, PointerState::inactive(), viewport()).unwrap();
            if outcome.retargeted {
                retargeted_at = Some(frame);
                break;
            }
        }
        let frame = retargeted_at.expect("frame clock should drive the retarget timer");
        assert!(frame >= 120, "fired after {} frames", frame);
        assert_ne!(bee.target(), first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_is_idempotent_and_stops_retargeting() {
        let mut bee = controller(8);
        bee.load_representation(&StaticAssetLoader::Model(bee_model()), "a").await;
        bee.update(1.0 / 60.0, PointerState::inactive(), viewport());

        bee.dispose();
        bee.dispose();
        assert!(bee.is_disposed());
        assert!(!bee.is_active());
        assert_eq!(bee.representation().kind(), "released");

        let target = bee.target();
        let position = bee.state().position;
        tokio::time::sleep(Duration::from_millis(20_000)).await;
        assert!(bee.update(1.0 / 60.0, PointerState::inactive(), viewport()).is_none());
        assert_eq!(bee.target(), target);
        assert_eq!(bee.state().position, position);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_after_dispose_is_ignored() {
        let mut bee = controller(9);
        bee.dispose();
        bee.load_representation(&StaticAssetLoader::Model(bee_model()), "a").await;
        assert_eq!(bee.representation().kind(), "released");
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_600_frames_without_pointer() {
        let mut bee = controller(42);
        bee.load_representation(&StaticAssetLoader::Model(bee_model()), "a").await;
        let delta = 1.0 / 60.0;
        // 反射は境界外に出た後で効くため、最大2フレーム分のはみ出しを許容する（DESIGN.md「Soft-bounds tests」）
        let slack = 1.2 * delta * 2.0;
        for _ in 0..600 {
            bee.update(delta, PointerState::inactive(), viewport());
            assert!(bee.get_velocity().length() <= 1.2 + 1e-9);
        }
        let p = bee.get_position();
        assert!((-3.0 - slack..=3.0 + slack).contains(&p.x), "x = {}", p.x);
        assert!((0.0 - slack..=3.0 + slack).contains(&p.y), "y = {}", p.y);
        assert!((-2.0 - slack..=3.0 + slack).contains(&p.z), "z = {}", p.z);
        assert_eq!(bee.frame_count(), 600);
    }
}
