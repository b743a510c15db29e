use async_trait::async_trait;
use serde::Serialize;

/// マイク権限の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    NotDetermined,
    Unavailable,
}

/// 権限レイヤーとの境界。
///
/// `microphone` は同期チェック、`request_microphone` はユーザーへの確認フロー。
/// 確認フローの完了はセッションのキューに戻されてから処理される。
#[async_trait]
pub trait PermissionGate: Send + Sync {
    fn microphone(&self) -> PermissionState;

    /// 許可されたら true
    async fn request_microphone(&self) -> bool;
}
