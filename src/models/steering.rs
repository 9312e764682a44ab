//! 操舵力の合成
//!
//! ワンダー（ノイズ駆動）、シーク（目標追従）、反発（ポインタ回避）の3つの
//! 行動を重み付きで合算し、`desired - velocity` を最大操舵力で制限します。
//! 速度を直接書き換えるのではなく加速度に加えるため、慣性のある旋回になります。

use glam::DVec3;

use crate::models::camera::Camera;
use crate::models::common::{PointerState, Viewport};
use crate::models::noise::GradientNoise;

/// 各行動の重みとワンダーのノイズ周波数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringWeights {
    pub wander: f64,
    pub seek: f64,
    pub repel: f64,
    /// ノイズのサンプリング周波数（時間スケール）
    pub noise_frequency: f64,
}

impl Default for SteeringWeights {
    fn default() -> Self {
        Self {
            wander: 0.8,
            seek: 0.4,
            repel: 3.0,
            noise_frequency: 0.5,
        }
    }
}

/// ワンダー行動の入力源
///
/// ノイズ場と個体ごとの位相オフセットの組です。オフセットにより、
/// 複数エージェントが同じ動きをしないようにします。
#[derive(Debug, Clone)]
pub struct WanderSource {
    pub noise: GradientNoise,
    pub phase_offset: f64,
}

impl WanderSource {
    pub fn new(noise: GradientNoise, phase_offset: f64) -> Self {
        Self { noise, phase_offset }
    }
}

/// 1フレーム分の操舵計算結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringForces {
    pub wander: DVec3,
    pub seek: DVec3,
    pub repulsion: DVec3,
    /// 制限後の操舵ベクトル（加速度とバンク計算の両方に使う）
    pub steering: DVec3,
}

/// ノイズによるワンダー力
pub fn wander_force(source: &WanderSource, elapsed_s: f64, weights: &SteeringWeights) -> DVec3 {
    let t = elapsed_s * weights.noise_frequency + source.phase_offset;
    let n = &source.noise;
    DVec3::new(n.noise(t, 0.0, 0.0), n.noise(0.0, t, 0.0), n.noise(0.0, 0.0, t)).normalize_or_zero()
        * weights.wander
}

/// 目標点へのシーク力（目標上にいる場合はゼロ）
pub fn seek_force(position: DVec3, target: DVec3, weights: &SteeringWeights) -> DVec3 {
    (target - position).normalize_or_zero() * weights.seek
}

/// エージェントとポインタの画面上の距離（ピクセル）
pub fn screen_distance_px(position: DVec3, pointer: &PointerState, camera: &Camera, viewport: Viewport) -> f64 {
    let screen = camera.world_to_screen(position, viewport);
    let dx = screen.x - pointer.x;
    let dy = screen.y - pointer.y;
    (dx * dx + dy * dy).sqrt()
}

/// ポインタからの反発力
///
/// ポインタが非アクティブ、ビューポートが無効、または画面距離が半径以上の場合はゼロ。
pub fn repulsion_force(
    position: DVec3,
    pointer: &PointerState,
    camera: &Camera,
    viewport: Viewport,
    avoid_radius_px: f64,
    weights: &SteeringWeights,
) -> DVec3 {
    if !pointer.active || !viewport.is_usable() {
        return DVec3::ZERO;
    }

    if screen_distance_px(position, pointer, camera, viewport) >= avoid_radius_px {
        return DVec3::ZERO;
    }

    let hazard = camera.pointer_point_at_depth_of(pointer, position, viewport);
    (position - hazard).normalize_or_zero() * weights.repel
}

/// 3つの行動を合算し `desired - velocity` を `max_force` で制限
pub fn compose(wander: DVec3, seek: DVec3, repulsion: DVec3, velocity: DVec3, max_force: f64) -> DVec3 {
    (wander + seek + repulsion - velocity).clamp_length_max(max_force)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        Viewport::new(1280.0, 720.0)
    }

    #[test]
    fn test_seek_at_target_is_zero() {
        let p = DVec3::new(1.0, 2.0, 3.0);
        let f = seek_force(p, p, &SteeringWeights::default());
        assert_eq!(f, DVec3::ZERO);
        assert!(f.is_finite());
    }

    #[test]
    fn test_seek_has_seek_weight_length() {
        let f = seek_force(DVec3::ZERO, DVec3::new(3.0, 0.0, 4.0), &SteeringWeights::default());
        assert!((f.length() - 0.4).abs() < 1e-12);
        assert!(f.x > 0.0 && f.z > 0.0);
    }

    #[test]
    fn test_wander_has_wander_weight_length() {
        let source = WanderSource::new(GradientNoise::new(3), 123.456);
        let f = wander_force(&source, 2.5, &SteeringWeights::default());
        if f != DVec3::ZERO {
            assert!((f.length() - 0.8).abs() < 1e-9);
        }
    }

    #[test]
    fn test_compose_is_clamped() {
        let s = compose(
            DVec3::new(0.8, 0.0, 0.0),
            DVec3::new(0.0, 0.4, 0.0),
            DVec3::new(0.0, 0.0, 3.0),
            DVec3::new(-1.0, 0.0, 0.0),
            0.05,
        );
        assert!(s.length() <= 0.05 + 1e-12);
    }

    #[test]
    fn test_compose_small_difference_passes_through() {
        let s = compose(DVec3::new(0.01, 0.0, 0.0), DVec3::ZERO, DVec3::ZERO, DVec3::ZERO, 0.05);
        assert_eq!(s, DVec3::new(0.01, 0.0, 0.0));
    }

    #[test]
    fn test_repulsion_inactive_pointer_is_zero() {
        let camera = Camera::default();
        let pointer = PointerState::new(640.0, 360.0, false);
        let f = repulsion_force(camera.look_at, &pointer, &camera, viewport(), 120.0, &SteeringWeights::default());
        assert_eq!(f, DVec3::ZERO);
    }

    #[test]
    fn test_repulsion_threshold_around_radius() {
        let camera = Camera::default();
        let agent = camera.look_at;
        let weights = SteeringWeights::default();
        let radius = 120.0;

        let inside = PointerState::new(640.0 + radius - 1.0, 360.0, true);
        let f_inside = repulsion_force(agent, &inside, &camera, viewport(), radius, &weights);
        assert!(f_inside.length() > 0.0);
        assert!((f_inside.length() - 3.0).abs() < 1e-9);
        // ポインタは画面右側なので、左へ押し出される
        assert!(f_inside.x < 0.0);

        let outside = PointerState::new(640.0 + radius + 1.0, 360.0, true);
        let f_outside = repulsion_force(agent, &outside, &camera, viewport(), radius, &weights);
        assert_eq!(f_outside, DVec3::ZERO);
    }

    #[test]
    fn test_repulsion_with_degenerate_viewport_is_zero() {
        let camera = Camera::default();
        let pointer = PointerState::new(0.0, 0.0, true);
        let f = repulsion_force(
            camera.look_at,
            &pointer,
            &camera,
            Viewport::new(0.0, 0.0),
            120.0,
            &SteeringWeights::default(),
        );
        assert_eq!(f, DVec3::ZERO);
    }
}
