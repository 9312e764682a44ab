//! # beesim
//!
//! ポインタを避けながら境界内を飛び回る自律エージェント（ハチ）の操舵シミュレーション。
//!
//! - `models`: ノイズ、操舵、積分、目標点タイマー、姿勢、モデル読み込み、コントローラー
//! - `scenario`: YAMLシナリオ設定
//! - `simulation`: フレームループ駆動のシミュレーションエンジン
//! - `logging`: tracingによるログ出力設定

pub mod logging;
pub mod models;
pub mod scenario;
pub mod simulation;
