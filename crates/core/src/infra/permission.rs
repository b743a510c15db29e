use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::domain::permission::{PermissionGate, PermissionState};

/// 固定の答えを返す権限ゲート（権限モデルのないプラットフォームやテスト用）
pub struct StaticPermissionGate {
    state: PermissionState,
}

impl StaticPermissionGate {
    pub fn new(state: PermissionState) -> Self {
        Self { state }
    }

    pub fn granted() -> Self {
        Self::new(PermissionState::Granted)
    }

    pub fn denied() -> Self {
        Self::new(PermissionState::Denied)
    }
}

#[async_trait]
impl PermissionGate for StaticPermissionGate {
    fn microphone(&self) -> PermissionState {
        self.state
    }

    async fn request_microphone(&self) -> bool {
        self.state == PermissionState::Granted
    }
}

/// ホスト UI の確認ダイアログを待つ権限ゲート。
///
/// `request_microphone` は `answer` が呼ばれるまで保留される。
/// 状態の確認と待機の登録は1つのロックの中で行う。
pub struct DeferredPermissionGate {
    inner: Mutex<PromptState>,
}

struct PromptState {
    state: PermissionState,
    waiters: Vec<oneshot::Sender<bool>>,
}

impl DeferredPermissionGate {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PromptState {
                state: PermissionState::NotDetermined,
                waiters: Vec::new(),
            }),
        }
    }

    /// ユーザーの回答を反映し、待機中の確認フローをすべて再開する
    pub fn answer(&self, granted: bool) {
        let waiters = {
            let mut inner = self.inner.lock();
            inner.state = if granted {
                PermissionState::Granted
            } else {
                PermissionState::Denied
            };
            std::mem::take(&mut inner.waiters)
        };
        log::info!("マイク権限の回答: granted={granted} (待機 {} 件)", waiters.len());
        for waiter in waiters {
            let _ = waiter.send(granted);
        }
    }

    /// 回答待ちの確認フロー数
    pub fn pending_prompts(&self) -> usize {
        self.inner.lock().waiters.len()
    }
}

impl Default for DeferredPermissionGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionGate for DeferredPermissionGate {
    fn microphone(&self) -> PermissionState {
        self.inner.lock().state
    }

    async fn request_microphone(&self) -> bool {
        let rx = {
            let mut inner = self.inner.lock();
            if inner.state == PermissionState::Granted {
                return true;
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push(tx);
            rx
        };
        // ゲートが破棄された場合は拒否扱い
        rx.await.unwrap_or(false)
    }
}
