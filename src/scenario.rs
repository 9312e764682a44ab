use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::models::{AgentConfig, Camera, ClockMode, InteractionConfig, Viewport};

/// シナリオメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    pub description: String,
}

/// シミュレーション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// 実行フレーム数
    pub frames: u64,
    /// フレーム時間（秒）
    pub delta_s: f64,
    pub seed: u64,
    #[serde(default)]
    pub clock: ClockMode,
    /// true の場合、delta_s 間隔で実時間に合わせてフレームを進める
    #[serde(default)]
    pub realtime: bool,
}

/// アセット設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetsConfig {
    /// 3Dモデル（.glb）のパス
    pub model: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            model: "assets/bee/bee_low.glb".to_string(),
        }
    }
}

/// ポインタ移動イベント（指定フレームの直前に適用）
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct PointerEvent {
    pub frame: u64,
    #[serde(flatten)]
    pub action: PointerAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum PointerAction {
    Move { x: f64, y: f64 },
    Leave,
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    pub sim: SimulationConfig,
    #[serde(default)]
    pub camera: Camera,
    pub viewport: Viewport,
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub pointer_script: Vec<PointerEvent>,
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        // ファイル存在チェック
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        // ファイル読み込み
        let contents = fs::read_to_string(path).map_err(|e| ScenarioError::Io(path.to_path_buf(), e))?;

        // YAML解析
        let config: ScenarioConfig =
            serde_yaml::from_str(&contents).map_err(|e| ScenarioError::Parse(path.to_path_buf(), e))?;

        // 基本的な検証
        config.validate()?;

        Ok(config)
    }

    /// YAML文字列から読み込み（検証込み）
    pub fn from_yaml_str(contents: &str) -> Result<Self, ScenarioError> {
        let config: ScenarioConfig =
            serde_yaml::from_str(contents).map_err(|e| ScenarioError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// 組み込みのデモシナリオ（`--test` 用）
    pub fn demo() -> Self {
        Self {
            meta: ScenarioMeta {
                version: "1.0".to_string(),
                name: "demo".to_string(),
                description: "単体のハチが10秒間飛行し、途中でポインタが接近する".to_string(),
            },
            sim: SimulationConfig {
                frames: 600,
                delta_s: 1.0 / 60.0,
                seed: 42,
                clock: ClockMode::Frame,
                realtime: false,
            },
            camera: Camera::default(),
            viewport: Viewport::new(1280.0, 720.0),
            interaction: InteractionConfig::default(),
            assets: AssetsConfig::default(),
            agents: vec![AgentConfig::default()],
            pointer_script: vec![
                PointerEvent {
                    frame: 120,
                    action: PointerAction::Move { x: 690.0, y: 360.0 },
                },
                PointerEvent {
                    frame: 240,
                    action: PointerAction::Leave,
                },
            ],
        }
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        // 時間設定の検証
        if !(self.sim.delta_s.is_finite() && self.sim.delta_s > 0.0) {
            return Err(ScenarioError::Validation("delta_s must be positive".to_string()));
        }
        // 周期タイマーとシミュレーション時刻は Duration で表すため、表現できる範囲に限る
        match Duration::try_from_secs_f64(self.sim.delta_s) {
            Ok(period) if !period.is_zero() => {}
            _ => {
                return Err(ScenarioError::Validation(format!(
                    "delta_s {} is not representable as a frame period",
                    self.sim.delta_s
                )));
            }
        }
        if self.sim.frames == 0 {
            return Err(ScenarioError::Validation("frames must be positive".to_string()));
        }
        if Duration::try_from_secs_f64(self.sim.delta_s * self.sim.frames as f64).is_err() {
            return Err(ScenarioError::Validation(format!(
                "total duration of {} frames at delta_s {} is too long",
                self.sim.frames, self.sim.delta_s
            )));
        }

        // ビューポートとカメラ
        if !self.viewport.is_usable() {
            return Err(ScenarioError::Validation("viewport must have positive size".to_string()));
        }
        if !(self.camera.near > 0.0 && self.camera.far > self.camera.near) {
            return Err(ScenarioError::Validation("camera requires 0 < near < far".to_string()));
        }
        if !(self.camera.fov_deg > 0.0 && self.camera.fov_deg < 180.0) {
            return Err(ScenarioError::Validation("camera fov_deg must be in (0, 180)".to_string()));
        }
        if self.camera.position == self.camera.look_at {
            return Err(ScenarioError::Validation("camera position equals look_at".to_string()));
        }

        // エージェント
        if self.agents.is_empty() {
            return Err(ScenarioError::Validation("at least one agent is required".to_string()));
        }
        for (i, agent) in self.agents.iter().enumerate() {
            agent
                .validate()
                .map_err(|reason| ScenarioError::Validation(format!("agents[{}] ({}): {}", i, agent.id, reason)))?;
            if self.agents[..i].iter().any(|other| other.id == agent.id) {
                return Err(ScenarioError::Validation(format!("duplicate agent id {}", agent.id)));
            }
        }

        // ポインタイベントのフレーム範囲
        for event in &self.pointer_script {
            if event.frame >= self.sim.frames {
                return Err(ScenarioError::Validation(format!(
                    "pointer event frame {} >= simulation frames {}",
                    event.frame, self.sim.frames
                )));
            }
        }

        Ok(())
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== シミュレーション設定 ===");
        println!("フレーム数: {}", self.sim.frames);
        println!(
            "フレーム時間: {:.4}秒 (合計 {:.1}秒)",
            self.sim.delta_s,
            self.sim.delta_s * self.sim.frames as f64
        );
        println!("シード値: {}", self.sim.seed);
        println!("時計: {:?} / 実時間: {}", self.sim.clock, self.sim.realtime);
        println!("ビューポート: {:.0}x{:.0}px", self.viewport.width, self.viewport.height);
        println!("モデル: {}", self.assets.model);
        println!();

        println!("=== エージェント ===");
        for agent in &self.agents {
            println!(
                "  {}: 開始位置 ({:.2}, {:.2}, {:.2}) 最大速度 {:.2} 最大操舵力 {:.3} 回避半径 {:.0}px",
                agent.id,
                agent.start_position.x,
                agent.start_position.y,
                agent.start_position.z,
                agent.max_speed,
                agent.max_force,
                agent.avoid_radius_px
            );
        }
        println!("ポインタイベント: {}件", self.pointer_script.len());
    }
}

/// シナリオ読み込みエラー
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("シナリオファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("ファイル読み込みエラー {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
    #[error("YAML解析エラー {}: {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_yaml::Error),
    #[error("設定検証エラー: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
meta:
  version: "1.0"
  name: two_bees
  description: test
sim:
  frames: 120
  delta_s: 0.016666666666666666
  seed: 7
  clock: frame
viewport: { width: 1280, height: 720 }
agents:
  - id: BEE001
  - id: BEE002
    start_position: [1.0, 2.0, 0.5]
    max_speed: 0.8
    bounds: { x: [-1, 1], y: [1, 2], z: [0, 1] }
pointer_script:
  - { frame: 10, action: move, x: 700, y: 300 }
  - { frame: 50, action: leave }
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = ScenarioConfig::from_yaml_str(SCENARIO).unwrap();
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[0].max_speed, 1.2);
        assert_eq!(config.agents[0].avoid_radius_px, 120.0);
        assert_eq!(config.agents[1].max_speed, 0.8);
        assert_eq!(config.agents[1].max_force, 0.05);
        assert_eq!(config.agents[1].bounds.y.min, 1.0);
        assert_eq!(config.sim.clock, ClockMode::Frame);
        assert!(!config.sim.realtime);
        assert_eq!(config.camera, Camera::default());
        assert_eq!(config.pointer_script[0].action, PointerAction::Move { x: 700.0, y: 300.0 });
        assert_eq!(config.pointer_script[1].action, PointerAction::Leave);
    }

    #[test]
    fn test_inverted_agent_bounds_rejected() {
        let yaml = SCENARIO.replace("x: [-1, 1]", "x: [1, -1]");
        let err = ScenarioConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, ScenarioError::Validation(msg) if msg.contains("BEE002")));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let yaml = SCENARIO.replace("id: BEE002", "id: BEE001");
        assert!(matches!(ScenarioConfig::from_yaml_str(&yaml), Err(ScenarioError::Validation(_))));
    }

    #[test]
    fn test_pointer_event_out_of_range_rejected() {
        let yaml = SCENARIO.replace("frame: 50", "frame: 500");
        assert!(matches!(ScenarioConfig::from_yaml_str(&yaml), Err(ScenarioError::Validation(_))));
    }

    #[test]
    fn test_unrepresentable_delta_rejected() {
        // 1ns 未満はゼロ周期、巨大値は Duration に収まらない
        for delta in ["1e-12", "1e300"] {
            let yaml = SCENARIO.replace("delta_s: 0.016666666666666666", &format!("delta_s: {}", delta));
            let err = ScenarioConfig::from_yaml_str(&yaml).unwrap_err();
            assert!(matches!(err, ScenarioError::Validation(msg) if msg.contains("delta_s")), "{}", delta);
        }
    }

    #[test]
    fn test_total_duration_overflow_rejected() {
        let yaml = SCENARIO
            .replace("delta_s: 0.016666666666666666", "delta_s: 1.0e9")
            .replace("frames: 120", "frames: 100000000000");
        let err = ScenarioConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, ScenarioError::Validation(msg) if msg.contains("too long")));
    }

    #[test]
    fn test_missing_file() {
        let err = ScenarioConfig::from_file("no/such/scenario.yaml").unwrap_err();
        assert!(matches!(err, ScenarioError::FileNotFound(_)));
    }

    #[test]
    fn test_demo_is_valid() {
        assert!(ScenarioConfig::demo().validate().is_ok());
    }
}
