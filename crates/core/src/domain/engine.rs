use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ─── EngineEvent ─────────────────────────────────────────────────

/// 認識エンジンが発行するライフサイクルイベント。
///
/// 1回の試行につき `Ready` → 0個以上の `Partial` → `Final` / `Error`
/// の順で届く。`SpeechEnd` は終端イベントの前に来ることもあれば来ないこともある。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// マイクが開き、発話を受け付けられる状態になった
    Ready,
    /// 発話の開始を検出した
    SpeechBegin,
    /// 途中経過の書き起こし（後で修正され得る）
    Partial(String),
    /// 確定結果（候補リスト、先頭が最有力）
    Final(Vec<String>),
    /// 発話の終了を検出した（結果はこの後に届く）
    SpeechEnd,
    /// エンジン側のエラー
    Error(EngineErrorCode),
}

impl EngineEvent {
    /// この試行に対してこれ以上イベントが来ないことを示すかどうか。
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final(_) | Self::Error(_))
    }
}

// ─── EngineErrorCode ─────────────────────────────────────────────

/// ホスト認識サービスのエラーコード。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorCode {
    NetworkTimeout,
    Network,
    Audio,
    Server,
    Client,
    SpeechTimeout,
    NoMatch,
    RecognizerBusy,
    InsufficientPermissions,
    LanguageNotSupported,
    LanguageUnavailable,
    Unknown(i32),
}

impl EngineErrorCode {
    /// ホストが返す数値コードから変換する。
    pub fn from_raw(code: i32) -> Self {
        match code {
            1 => Self::NetworkTimeout,
            2 => Self::Network,
            3 => Self::Audio,
            4 => Self::Server,
            5 => Self::Client,
            6 => Self::SpeechTimeout,
            7 => Self::NoMatch,
            8 => Self::RecognizerBusy,
            9 => Self::InsufficientPermissions,
            12 => Self::LanguageNotSupported,
            13 => Self::LanguageUnavailable,
            other => Self::Unknown(other),
        }
    }

    /// ログ用の人間可読な説明。
    pub fn description(&self) -> String {
        match self {
            Self::Audio => "Audio recording error".to_string(),
            Self::Client => "Client side error".to_string(),
            Self::InsufficientPermissions => "Insufficient permissions".to_string(),
            Self::Network => "Network error".to_string(),
            Self::NetworkTimeout => "Network timeout".to_string(),
            Self::NoMatch => "No speech match".to_string(),
            Self::RecognizerBusy => "Recognition service busy".to_string(),
            Self::Server => "Server error".to_string(),
            Self::SpeechTimeout => "No speech input".to_string(),
            Self::LanguageNotSupported => "Language not supported".to_string(),
            Self::LanguageUnavailable => "Language unavailable".to_string(),
            Self::Unknown(code) => format!("Unknown error ({code})"),
        }
    }
}

impl fmt::Display for EngineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

// ─── RecognitionConfig ───────────────────────────────────────────

/// 言語モデルの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageModel {
    /// 自由発話（ディクテーション向け）
    FreeForm,
    /// 短い検索クエリ向け
    WebSearch,
}

/// 1回の認識試行ごとにエンジンへ渡す設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// 言語タグ (例: "en-US")
    pub language: String,
    pub language_model: LanguageModel,
    /// 返してほしい候補数の上限
    pub max_results: u32,
    /// 途中経過を受け取るか
    pub partial_results: bool,
    /// 発話完了とみなす無音長 (ミリ秒)
    pub complete_silence_ms: u64,
    /// 発話がおそらく完了したとみなす無音長 (ミリ秒)
    pub possibly_complete_silence_ms: u64,
    /// 最小入力長 (ミリ秒)
    pub minimum_length_ms: u64,
    /// Ready 後に結果を待つ上限 (ミリ秒)
    pub timeout_ms: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            language_model: LanguageModel::FreeForm,
            max_results: 5,
            partial_results: true,
            complete_silence_ms: 1500,
            possibly_complete_silence_ms: 1500,
            minimum_length_ms: 5000,
            timeout_ms: 5000,
        }
    }
}

// ─── EngineStartError ────────────────────────────────────────────

/// エンジン生成・開始時の同期エラー。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineStartError {
    #[error("Speech recognition not available")]
    Unavailable,
    #[error("Failed to create recognizer: {0}")]
    Construction(String),
    #[error("Failed to start: {0}")]
    Rejected(String),
}

// ─── EventSink ───────────────────────────────────────────────────

/// エンジンからセッションへイベントを届ける唯一のリスナー。
///
/// エンジンはどのスレッドから `emit` してもよい。配送先で直列化される。
#[derive(Clone)]
pub struct EventSink {
    deliver: Arc<dyn Fn(EngineEvent) + Send + Sync>,
}

impl EventSink {
    pub fn new(deliver: impl Fn(EngineEvent) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn emit(&self, event: EngineEvent) {
        (self.deliver)(event);
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

// ─── RecognitionEngine / EngineFactory ───────────────────────────

/// ホストの音声認識サービスを包むアダプタ。
///
/// セッション方針は持たない。イベントは生成時に渡された `EventSink` に流す。
pub trait RecognitionEngine: Send {
    /// 認識を開始する。サービスが使えない場合は即座にエラーを返す。
    fn start(&mut self, config: &RecognitionConfig) -> Result<(), EngineStartError>;

    /// 録音を止める。エンジンはこの後に終端イベントを送ってもよい。
    fn stop(&mut self);

    /// 下位リソースを解放する。複数回呼ばれても安全であること。
    fn dispose(&mut self);
}

/// 試行ごとに新しいエンジンを生成するファクトリ。
pub trait EngineFactory: Send + Sync {
    /// デバイス上で音声認識サービスが利用可能かどうか。
    fn is_available(&self) -> bool;

    fn create(&self, sink: EventSink) -> Result<Box<dyn RecognitionEngine>, EngineStartError>;

    /// ファクトリ名 (例: "host-bridge", "scripted")。
    fn name(&self) -> &str;
}

// ─── Tests ───────────────────────────────────────────────────────
