//! モデル読み込みとアニメーション再生
//!
//! 3Dモデル（バイナリglTF）の読み込み結果と、その中のアニメーションクリップを扱います。
//! 読み込みに失敗した場合、コントローラーはスプライト表示へ切り替えます。

use std::future::Future;
use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

use crate::models::traits::IAssetLoader;

/// 読み込み失敗
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("モデルファイルを読み込めません {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("モデル形式が不正です {url}: {reason}")]
    InvalidFormat { url: String, reason: String },
    #[error("glTF JSON解析エラー {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// アニメーションクリップ
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    /// 長さ（秒）
    pub duration: f64,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, duration: f64) -> Self {
        Self {
            name: name.into(),
            duration,
        }
    }
}

/// 読み込まれたモデル
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModel {
    pub source: String,
    pub meshes: Vec<String>,
    pub clips: Vec<AnimationClip>,
}

/// 飛行系のクリップ（名前に "fly" を含む）を優先し、なければ先頭を選ぶ
pub fn select_flight_clip(clips: &[AnimationClip]) -> Option<&AnimationClip> {
    clips
        .iter()
        .find(|clip| clip.name.to_lowercase().contains("fly"))
        .or_else(|| clips.first())
}

/// ループ再生中のアニメーション
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationPlayback {
    pub clip: AnimationClip,
    /// 再生位置（秒）
    pub time: f64,
    pub playing: bool,
}

impl AnimationPlayback {
    /// `start_time` から再生開始（複数個体の羽ばたきをずらすため）
    pub fn start(clip: AnimationClip, start_time: f64) -> Self {
        let mut playback = Self {
            clip,
            time: 0.0,
            playing: true,
        };
        playback.time = playback.wrap(start_time);
        playback
    }

    pub fn advance(&mut self, delta: f64) {
        if self.playing {
            self.time = self.wrap(self.time + delta);
        }
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    fn wrap(&self, t: f64) -> f64 {
        if self.clip.duration > 0.0 {
            t.rem_euclid(self.clip.duration)
        } else {
            0.0
        }
    }
}

const GLB_MAGIC: &[u8; 4] = b"glTF";
const CHUNK_JSON: u32 = 0x4E4F_534A;

/// バイナリglTF（.glb）のJSONチャンクからメッシュ名とクリップを取り出す
pub fn parse_glb(url: &str, bytes: &[u8]) -> Result<LoadedModel, AssetError> {
    let invalid = |reason: &str| AssetError::InvalidFormat {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    if bytes.len() < 20 {
        return Err(invalid("ファイルが短すぎます"));
    }
    if &bytes[0..4] != GLB_MAGIC {
        return Err(invalid("glTFマジックがありません"));
    }
    let read_u32 = |offset: usize| u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]);

    let version = read_u32(4);
    if version != 2 {
        return Err(invalid(&format!("未対応のglTFバージョン {}", version)));
    }
    let chunk_len = read_u32(12) as usize;
    if read_u32(16) != CHUNK_JSON {
        return Err(invalid("先頭チャンクがJSONではありません"));
    }
    let json_bytes = bytes
        .get(20..20 + chunk_len)
        .ok_or_else(|| invalid("JSONチャンクが途中で切れています"))?;

    let doc: Value = serde_json::from_slice(json_bytes).map_err(|source| AssetError::Json {
        url: url.to_string(),
        source,
    })?;

    let meshes = doc["meshes"]
        .as_array()
        .map(|meshes| {
            meshes
                .iter()
                .enumerate()
                .map(|(i, m)| m["name"].as_str().map(str::to_string).unwrap_or_else(|| format!("mesh_{}", i)))
                .collect()
        })
        .unwrap_or_default();

    let clips = doc["animations"]
        .as_array()
        .map(|animations| {
            animations
                .iter()
                .enumerate()
                .map(|(i, anim)| {
                    let name = anim["name"].as_str().map(str::to_string).unwrap_or_else(|| format!("clip_{}", i));
                    AnimationClip::new(name, clip_duration(&doc, anim))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(LoadedModel {
        source: url.to_string(),
        meshes,
        clips,
    })
}

// サンプラー入力アクセサの max の最大値がクリップ長
fn clip_duration(doc: &Value, anim: &Value) -> f64 {
    anim["samplers"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|sampler| sampler["input"].as_u64())
        .filter_map(|input| doc["accessors"][input as usize]["max"][0].as_f64())
        .fold(0.0, f64::max)
}

/// ファイルシステムからモデルを読み込むローダー
#[derive(Debug, Clone, Default)]
pub struct FileAssetLoader;

impl IAssetLoader for FileAssetLoader {
    fn load(&self, url: &str) -> impl Future<Output = Result<LoadedModel, AssetError>> + Send {
        let url = url.to_string();
        async move {
            let path = PathBuf::from(&url);
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|source| AssetError::Io { path, source })?;
            parse_glb(&url, &bytes)
        }
    }
}

/// 固定の結果を返すローダー（テスト・デモ用）
#[derive(Debug, Clone)]
pub enum StaticAssetLoader {
    Model(LoadedModel),
    Fail(String),
}

impl IAssetLoader for StaticAssetLoader {
    fn load(&self, url: &str) -> impl Future<Output = Result<LoadedModel, AssetError>> + Send {
        let result = match self {
            StaticAssetLoader::Model(model) => Ok(model.clone()),
            StaticAssetLoader::Fail(reason) => Err(AssetError::InvalidFormat {
                url: url.to_string(),
                reason: reason.clone(),
            }),
        };
        std::future::ready(result)
    }
}
