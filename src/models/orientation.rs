//! 表示形態と姿勢（向き・バンク）
//!
//! 表示形態は読み込み結果が確定した時点で一度だけ選ばれるタグ付き列挙型です。
//! 姿勢計算はこの列挙型で分岐し、物理・操舵側には影響しません。

use glam::{DMat3, DQuat, DVec2, DVec3};

use crate::models::assets::AnimationPlayback;
use crate::models::common::math_utils;

/// バンク計算のパラメータ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BankingParams {
    /// 横方向の操舵力からバンク角への係数
    pub gain: f64,
    /// 基準フレームレートでの1フレームあたりの補間係数
    pub smoothing_per_frame: f64,
    pub reference_fps: f64,
}

impl Default for BankingParams {
    fn default() -> Self {
        Self {
            gain: 15.0,
            smoothing_per_frame: 0.1,
            reference_fps: 60.0,
        }
    }
}

/// 3Dメッシュ表示
#[derive(Debug, Clone, PartialEq)]
pub struct MeshBody {
    pub source: String,
    pub position: DVec3,
    pub scale: f64,
    /// 進行方向のみの回転（バンク前）
    pub heading: DQuat,
    /// 平滑化済みのバンク角（ラジアン）
    pub bank: f64,
    /// 最終的な回転（heading × ロール）
    pub orientation: DQuat,
    pub animation: Option<AnimationPlayback>,
}

impl MeshBody {
    pub fn new(source: String, position: DVec3, scale: f64, animation: Option<AnimationPlayback>) -> Self {
        Self {
            source,
            position,
            scale,
            heading: DQuat::IDENTITY,
            bank: 0.0,
            orientation: DQuat::IDENTITY,
            animation,
        }
    }

    /// ローカル右方向（heading基準）
    pub fn right(&self) -> DVec3 {
        self.heading * DVec3::X
    }

    /// 進行方向へ向け、横方向の操舵力からバンク角を更新する
    ///
    /// 速度がゼロの場合は直前の向きを保持します。戻り値は更新後のバンク角。
    pub fn orient(&mut self, velocity: DVec3, steering: DVec3, delta: f64, params: &BankingParams) -> f64 {
        if let Some(heading) = look_rotation(self.position, self.position + velocity, DVec3::Y) {
            self.heading = heading;
        }

        let lateral_force = self.right().dot(steering);
        let target_bank = -lateral_force * params.gain;
        let factor = math_utils::frame_rate_independent_factor(params.smoothing_per_frame, delta, params.reference_fps);
        self.bank = math_utils::lerp(self.bank, target_bank, factor);

        self.orientation = self.heading * DQuat::from_rotation_z(self.bank);
        self.bank
    }
}

/// 平面スプライト表示（モデル読み込み失敗時の代替）
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteBody {
    pub position: DVec3,
    pub scale: DVec2,
    /// 画面内の回転（ラジアン）
    pub rotation: f64,
}

impl SpriteBody {
    pub const SCALE: DVec2 = DVec2::new(0.5, 0.5);
    pub const ROTATION_PER_VELOCITY_X: f64 = -0.2;

    pub fn new(position: DVec3) -> Self {
        Self {
            position,
            scale: Self::SCALE,
            rotation: 0.0,
        }
    }

    /// 向き・バンクの代わりに、x方向速度に比例した2D回転だけを付ける
    pub fn orient(&mut self, velocity: DVec3) {
        self.rotation = velocity.x * Self::ROTATION_PER_VELOCITY_X;
    }
}

/// 表示形態
#[derive(Debug, Clone, PartialEq)]
pub enum Representation {
    /// 読み込み未確定
    Pending,
    Mesh(MeshBody),
    Sprite(SpriteBody),
    /// 破棄済み（グラフィックス資源は解放済み）
    Released,
}

impl Representation {
    pub fn kind(&self) -> &'static str {
        match self {
            Representation::Pending => "pending",
            Representation::Mesh(_) => "mesh",
            Representation::Sprite(_) => "sprite",
            Representation::Released => "released",
        }
    }

    /// 描画可能（物理更新を行う）状態か
    pub fn is_live(&self) -> bool {
        matches!(self, Representation::Mesh(_) | Representation::Sprite(_))
    }
}

/// `from` から `to` を向く回転（ローカル+Zが前方）
///
/// 2点が一致する場合は `None`。`up` と平行な場合は上方向をずらして計算します。
pub fn look_rotation(from: DVec3, to: DVec3, up: DVec3) -> Option<DQuat> {
    let forward = (to - from).normalize_or_zero();
    if forward == DVec3::ZERO {
        return None;
    }

    let mut right = up.cross(forward);
    if right.length_squared() < 1e-12 {
        // 真上・真下を向く場合
        let nudged = if up.z.abs() < 0.9 { DVec3::Z } else { DVec3::X };
        right = nudged.cross(forward);
    }
    let right = right.normalize();
    let true_up = forward.cross(right);

    Some(DQuat::from_mat3(&DMat3::from_cols(right, true_up, forward)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_look_rotation_points_forward_axis_at_target() {
        let q = look_rotation(DVec3::ZERO, DVec3::new(1.0, 0.0, 0.0), DVec3::Y).unwrap();
        let forward = q * DVec3::Z;
        assert!((forward - DVec3::X).length() < 1e-9);
        let up = q * DVec3::Y;
        assert!((up - DVec3::Y).length() < 1e-9);
    }

    #[test]
    fn test_look_rotation_degenerate_is_none() {
        let p = DVec3::new(1.0, 2.0, 3.0);
        assert!(look_rotation(p, p, DVec3::Y).is_none());
    }

    #[test]
    fn test_look_rotation_straight_up_is_finite() {
        let q = look_rotation(DVec3::ZERO, DVec3::Y, DVec3::Y).unwrap();
        assert!(q.is_finite());
        assert!(((q * DVec3::Z) - DVec3::Y).length() < 1e-9);
    }

    #[test]
    fn test_zero_velocity_keeps_heading() {
        let mut body = MeshBody::new("bee.glb".into(), DVec3::ZERO, 0.45, None);
        let params = BankingParams::default();
        body.orient(DVec3::new(0.0, 0.0, -1.0), DVec3::ZERO, 1.0 / 60.0, &params);
        let heading = body.heading;
        body.orient(DVec3::ZERO, DVec3::ZERO, 1.0 / 60.0, &params);
        assert_eq!(body.heading, heading);
    }

    #[test]
    fn test_bank_opposes_lateral_force_and_is_smoothed() {
        let mut body = MeshBody::new("bee.glb".into(), DVec3::ZERO, 0.45, None);
        let params = BankingParams::default();
        let velocity = DVec3::new(0.0, 0.0, 1.0);
        // +Z向きのとき右方向は+X
        let steering = DVec3::new(0.05, 0.0, 0.0);
        let bank = body.orient(velocity, steering, 1.0 / 60.0, &params);
        let target = -0.05 * 15.0;
        assert!((bank - target * 0.1).abs() < 1e-9);

        for _ in 0..600 {
            body.orient(velocity, steering, 1.0 / 60.0, &params);
        }
        assert!((body.bank - target).abs() < 1e-6);
    }

    #[test]
    fn test_bank_smoothing_is_frame_rate_independent() {
        let params = BankingParams::default();
        let velocity = DVec3::new(0.0, 0.0, 1.0);
        let steering = DVec3::new(0.05, 0.0, 0.0);

        let mut at_60 = MeshBody::new("a".into(), DVec3::ZERO, 1.0, None);
        for _ in 0..60 {
            at_60.orient(velocity, steering, 1.0 / 60.0, &params);
        }
        let mut at_30 = MeshBody::new("b".into(), DVec3::ZERO, 1.0, None);
        for _ in 0..30 {
            at_30.orient(velocity, steering, 1.0 / 30.0, &params);
        }
        assert!((at_60.bank - at_30.bank).abs() < 1e-9);
    }

    #[test]
    fn test_sprite_rotation_follows_velocity_x() {
        let mut sprite = SpriteBody::new(DVec3::ZERO);
        sprite.orient(DVec3::new(1.0, 5.0, -2.0));
        assert!((sprite.rotation + 0.2).abs() < 1e-12);
        assert_eq!(sprite.scale, DVec2::new(0.5, 0.5));
    }
}
