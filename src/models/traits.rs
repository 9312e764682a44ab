use std::future::Future;

use glam::DVec3;

use crate::models::assets::{AssetError, LoadedModel};

/// エージェントの識別と生存状態のインターフェース
///
/// フレーム処理は結果を返す `BeeController::update` が担います。
pub trait IAgent {
    /// エージェントIDの取得
    fn get_id(&self) -> String;

    /// エージェントがアクティブかどうか
    fn is_active(&self) -> bool;
}

/// 移動可能なエージェントのインターフェース
pub trait IMovable {
    /// 現在位置の取得
    fn get_position(&self) -> DVec3;

    /// 現在速度の取得
    fn get_velocity(&self) -> DVec3;
}

/// モデルローダーのインターフェース
///
/// 1回の呼び出しで成功か失敗のどちらかに一度だけ解決します。
pub trait IAssetLoader {
    fn load(&self, url: &str) -> impl Future<Output = Result<LoadedModel, AssetError>> + Send;
}
