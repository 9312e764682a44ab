//! 透視カメラとスクリーン空間変換
//!
//! 反発判定のために、ワールド座標 → NDC → ピクセル座標の投影と、
//! ポインタのピクセル座標 → ワールド空間レイの逆投影を提供します。
//! NDCの深度範囲は [-1, 1]（OpenGL規約）です。

use glam::{DMat4, DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::models::common::{PointerState, Viewport};

/// 透視投影カメラ
///
/// エージェントからは読み取り専用の共有入力として扱われます。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: DVec3,
    pub look_at: DVec3,
    #[serde(default = "default_up")]
    pub up: DVec3,
    /// 垂直画角（度）
    pub fov_deg: f64,
    pub near: f64,
    pub far: f64,
}

fn default_up() -> DVec3 {
    DVec3::Y
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: DVec3::new(0.0, 1.5, 5.0),
            look_at: DVec3::new(0.0, 1.5, 0.0),
            up: DVec3::Y,
            fov_deg: 50.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn view_matrix(&self) -> DMat4 {
        DMat4::look_at_rh(self.position, self.look_at, self.up)
    }

    pub fn projection_matrix(&self, aspect: f64) -> DMat4 {
        DMat4::perspective_rh_gl(self.fov_deg.to_radians(), aspect, self.near, self.far)
    }

    pub fn view_projection(&self, viewport: Viewport) -> DMat4 {
        self.projection_matrix(viewport.aspect()) * self.view_matrix()
    }

    /// ワールド座標をNDCへ投影
    pub fn project(&self, world: DVec3, viewport: Viewport) -> DVec3 {
        self.view_projection(viewport).project_point3(world)
    }

    /// NDCをワールド座標へ逆投影
    pub fn unproject(&self, ndc: DVec3, viewport: Viewport) -> DVec3 {
        self.view_projection(viewport).inverse().project_point3(ndc)
    }

    /// ワールド座標を画面ピクセル座標へ投影（原点は左上、yは下向き）
    pub fn world_to_screen(&self, world: DVec3, viewport: Viewport) -> DVec2 {
        let ndc = self.project(world, viewport);
        DVec2::new(
            (ndc.x * 0.5 + 0.5) * viewport.width,
            (-(ndc.y * 0.5) + 0.5) * viewport.height,
        )
    }

    /// ポインタ位置を通るカメラからのレイ方向（単位ベクトル）
    pub fn pointer_ray(&self, pointer: &PointerState, viewport: Viewport) -> DVec3 {
        let ndc = DVec3::new(
            (pointer.x / viewport.width) * 2.0 - 1.0,
            -(pointer.y / viewport.height) * 2.0 + 1.0,
            0.5,
        );
        (self.unproject(ndc, viewport) - self.position).normalize_or_zero()
    }

    /// ポインタのレイ上で、`world` とカメラの距離が等しい点
    pub fn pointer_point_at_depth_of(&self, pointer: &PointerState, world: DVec3, viewport: Viewport) -> DVec3 {
        let ray = self.pointer_ray(pointer, viewport);
        self.position + ray * world.distance(self.position)
    }
}
