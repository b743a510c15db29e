use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use super::error::RecognitionError;

/// 呼び出し側に届く結果。書き起こし（空文字も可）か、エラーのどちらか一方。
pub type RecognitionOutcome = Result<String, RecognitionError>;

/// セッション状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    /// 権限確認・前回エンジンの後始末・エンジン起動のいずれか
    Starting,
    /// Ready 受信済み、タイムアウト監視中
    Listening,
    /// 発話終了または手動停止後、終端イベント待ち
    Resolving,
}

impl SessionState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::Resolving => "resolving",
        }
    }
}

/// 状態遷移ログ用ペイロード
#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub attempt: u64,
    pub prev_state: SessionState,
    pub new_state: SessionState,
}

/// セッションの観測用スナップショット
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub listening: bool,
    pub timeout_armed: bool,
    pub has_pending: bool,
    pub last_partial: String,
    pub attempt: u64,
}

// ─── Resolution ──────────────────────────────────────────────────

/// 解決に使った書き起こしの出どころ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Final,
    Partial,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub text: String,
    pub source: ResolutionSource,
}

impl Resolution {
    fn empty() -> Self {
        Self {
            text: String::new(),
            source: ResolutionSource::Empty,
        }
    }
}

/// 確定結果から返す文字列を選ぶ: 先頭候補 > 途中結果 > 空文字
pub fn select_final(matches: &[String], last_partial: &str) -> Resolution {
    match matches.first() {
        Some(first) if !first.is_empty() => Resolution {
            text: first.clone(),
            source: ResolutionSource::Final,
        },
        _ => select_fallback(last_partial),
    }
}

/// エラー・タイムアウト時: 途中結果があればそれを、なければ空文字
pub fn select_fallback(last_partial: &str) -> Resolution {
    if last_partial.is_empty() {
        Resolution::empty()
    } else {
        Resolution {
            text: last_partial.to_string(),
            source: ResolutionSource::Partial,
        }
    }
}

// ─── PendingRequest ──────────────────────────────────────────────

/// 呼び出し側の継続。`resolve` で消費されるため二重解決は起こらない。
#[derive(Debug)]
pub struct PendingRequest {
    id: Uuid,
    received_at: Instant,
    reply: oneshot::Sender<RecognitionOutcome>,
}

impl PendingRequest {
    pub fn new(reply: oneshot::Sender<RecognitionOutcome>) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at: Instant::now(),
            reply,
        }
    }

    /// 結果を受け取る側とペアで生成する
    pub fn channel() -> (Self, oneshot::Receiver<RecognitionOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// 結果を届ける。呼び出し側が既に待つのをやめていれば false。
    pub fn resolve(self, outcome: RecognitionOutcome) -> bool {
        self.reply.send(outcome).is_ok()
    }
}
