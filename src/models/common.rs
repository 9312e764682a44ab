use glam::DVec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// 1軸分の範囲 [min, max]
///
/// YAMLでは `[min, max]` の2要素配列として記述します。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// 有限値かつ min < max であるか
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min < self.max
    }

    /// マージン込みで範囲外かどうか
    pub fn is_outside(&self, value: f64, margin: f64) -> bool {
        value < self.min - margin || value > self.max + margin
    }

    /// 範囲内の一様乱数
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        rng.gen_range(self.min..self.max)
    }
}

impl From<[f64; 2]> for AxisRange {
    fn from(value: [f64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<AxisRange> for [f64; 2] {
    fn from(range: AxisRange) -> Self {
        [range.min, range.max]
    }
}

/// 軸平行境界ボックス
///
/// ワンダー目標点の選択範囲であり、反射判定（マージン付き）の基準でもあります。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: AxisRange,
    pub y: AxisRange,
    pub z: AxisRange,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            x: AxisRange::new(-2.0, 2.0),
            y: AxisRange::new(0.5, 2.5),
            z: AxisRange::new(-1.0, 2.0),
        }
    }
}

impl Bounds {
    /// 各軸の範囲を (軸名, 範囲) で列挙
    pub fn axes(&self) -> [(&'static str, AxisRange); 3] {
        [("x", self.x), ("y", self.y), ("z", self.z)]
    }

    /// 境界内の一様ランダム点
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> DVec3 {
        DVec3::new(self.x.sample(rng), self.y.sample(rng), self.z.sample(rng))
    }

    /// 境界内（マージンなし）に含まれるか
    pub fn contains(&self, p: DVec3) -> bool {
        !self.x.is_outside(p.x, 0.0) && !self.y.is_outside(p.y, 0.0) && !self.z.is_outside(p.z, 0.0)
    }

    /// マージンを加えて拡張した境界
    pub fn expanded(&self, margins: ReflectionMargins) -> Bounds {
        Bounds {
            x: AxisRange::new(self.x.min - margins.x, self.x.max + margins.x),
            y: AxisRange::new(self.y.min - margins.y, self.y.max + margins.y),
            z: AxisRange::new(self.z.min - margins.z, self.z.max + margins.z),
        }
    }
}

/// 反射判定に使う軸ごとのマージン
///
/// 目標点の選択範囲より少し外側まで泳がせてから跳ね返すためのソフトリード。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReflectionMargins {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for ReflectionMargins {
    fn default() -> Self {
        Self { x: 1.0, y: 0.5, z: 1.0 }
    }
}

/// 反射した軸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReflectedAxes {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

impl ReflectedAxes {
    pub fn any(&self) -> bool {
        self.x || self.y || self.z
    }
}

/// 画面上のポインタ状態（ピクセル座標）
///
/// `active` が false の場合、距離に関係なく反発力は発生しません。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerState {
    pub x: f64,
    pub y: f64,
    pub active: bool,
}

impl PointerState {
    pub fn new(x: f64, y: f64, active: bool) -> Self {
        Self { x, y, active }
    }

    pub fn inactive() -> Self {
        Self::default()
    }
}

/// ビューポートサイズ（ピクセル）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// 投影計算に使える大きさか
    pub fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    pub fn aspect(&self) -> f64 {
        self.width / self.height
    }
}

/// エージェントの状態を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Active,   // アクティブ
    Disposed, // 破棄済み
}

/// 数学ユーティリティ関数
pub mod math_utils {
    /// 線形補間
    pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
        a + (b - a) * t
    }

    /// 基準フレームレートでの補間係数を `delta` 秒分に換算
    ///
    /// `reference_fps` で1フレーム進んだとき `per_frame` と一致します。
    pub fn frame_rate_independent_factor(per_frame: f64, delta: f64, reference_fps: f64) -> f64 {
        if delta <= 0.0 {
            return 0.0;
        }
        1.0 - (1.0 - per_frame).powf(delta * reference_fps)
    }
}
