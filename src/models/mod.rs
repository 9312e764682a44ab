// 基本的なデータ型と数学ユーティリティ
pub mod common;

// エージェントの基本インターフェース（trait）定義
pub mod traits;

// 操舵・運動・表示の各部品
pub mod noise;
pub mod camera;
pub mod steering;
pub mod agent;
pub mod retarget;
pub mod orientation;
pub mod assets;
pub mod pointer;

// 上記を束ねるコントローラー
pub mod controller;

// 便利な re-export
pub use common::*;
pub use traits::*;
pub use agent::{AgentConfig, AgentState, FrameInput, StepReport};
pub use assets::{AnimationClip, AnimationPlayback, AssetError, FileAssetLoader, LoadedModel, StaticAssetLoader};
pub use camera::Camera;
pub use controller::{BeeController, ClockMode, ControllerError, FrameOutcome};
pub use noise::GradientNoise;
pub use orientation::{MeshBody, Representation, SpriteBody};
pub use pointer::{InteractionConfig, PointerTracker};
pub use retarget::{RetargetInterval, RetargetTimer, TimeSource};
pub use steering::{SteeringForces, SteeringWeights, WanderSource};
