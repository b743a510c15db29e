//! ホスト OS の音声認識サービスへの薄いアダプタ。
//!
//! ネイティブ側は `HostSpeechService` / `HostRecognizer` を実装し、
//! コールバックを `HostListener` に流す。ここではコールバックを
//! `EngineEvent` に変換するだけで、セッション方針は持たない。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::domain::engine::{
    EngineErrorCode, EngineEvent, EngineFactory, EngineStartError, EventSink, LanguageModel,
    RecognitionConfig, RecognitionEngine,
};

pub const ACTION_RECOGNIZE_SPEECH: &str = "android.speech.action.RECOGNIZE_SPEECH";
pub const EXTRA_LANGUAGE_MODEL: &str = "android.speech.extra.LANGUAGE_MODEL";
pub const EXTRA_LANGUAGE: &str = "android.speech.extra.LANGUAGE";
pub const EXTRA_LANGUAGE_PREFERENCE: &str = "android.speech.extra.LANGUAGE_PREFERENCE";
pub const EXTRA_ONLY_RETURN_LANGUAGE_PREFERENCE: &str =
    "android.speech.extra.ONLY_RETURN_LANGUAGE_PREFERENCE";
pub const EXTRA_MAX_RESULTS: &str = "android.speech.extra.MAX_RESULTS";
pub const EXTRA_PARTIAL_RESULTS: &str = "android.speech.extra.PARTIAL_RESULTS";
pub const EXTRA_COMPLETE_SILENCE_MILLIS: &str =
    "android.speech.extras.SPEECH_INPUT_COMPLETE_SILENCE_LENGTH_MILLIS";
pub const EXTRA_POSSIBLY_COMPLETE_SILENCE_MILLIS: &str =
    "android.speech.extras.SPEECH_INPUT_POSSIBLY_COMPLETE_SILENCE_LENGTH_MILLIS";
pub const EXTRA_MINIMUM_LENGTH_MILLIS: &str =
    "android.speech.extras.SPEECH_INPUT_MINIMUM_LENGTH_MILLIS";

// ─── Host interfaces ─────────────────────────────────────────────

/// ホストの認識サービス
pub trait HostSpeechService: Send + Sync {
    fn is_recognition_available(&self) -> bool;

    fn create_recognizer(&self) -> Result<Box<dyn HostRecognizer>, String>;
}

/// ホストの認識器インスタンス（1試行ごとに作り直す）
pub trait HostRecognizer: Send {
    fn set_listener(&mut self, listener: HostListener);

    fn start_listening(&mut self, intent: &RecognizerIntent) -> Result<(), String>;

    fn stop_listening(&mut self);

    fn destroy(&mut self);
}

// ─── RecognizerIntent ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum IntentExtra {
    Text(String),
    Int(i64),
    Flag(bool),
}

/// ホストに渡す認識リクエスト。ネイティブブリッジには JSON で渡せる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecognizerIntent {
    pub action: &'static str,
    pub extras: BTreeMap<&'static str, IntentExtra>,
}

impl RecognizerIntent {
    pub fn from_config(config: &RecognitionConfig) -> Self {
        let model = match config.language_model {
            LanguageModel::FreeForm => "free_form",
            LanguageModel::WebSearch => "web_search",
        };
        let language = IntentExtra::Text(config.language.clone());

        let mut extras = BTreeMap::new();
        extras.insert(EXTRA_LANGUAGE_MODEL, IntentExtra::Text(model.to_string()));
        extras.insert(EXTRA_LANGUAGE, language.clone());
        extras.insert(EXTRA_LANGUAGE_PREFERENCE, language.clone());
        extras.insert(EXTRA_ONLY_RETURN_LANGUAGE_PREFERENCE, language);
        extras.insert(EXTRA_MAX_RESULTS, IntentExtra::Int(i64::from(config.max_results)));
        extras.insert(EXTRA_PARTIAL_RESULTS, IntentExtra::Flag(config.partial_results));
        extras.insert(
            EXTRA_COMPLETE_SILENCE_MILLIS,
            IntentExtra::Int(millis(config.complete_silence_ms)),
        );
        extras.insert(
            EXTRA_POSSIBLY_COMPLETE_SILENCE_MILLIS,
            IntentExtra::Int(millis(config.possibly_complete_silence_ms)),
        );
        extras.insert(
            EXTRA_MINIMUM_LENGTH_MILLIS,
            IntentExtra::Int(millis(config.minimum_length_ms)),
        );

        Self {
            action: ACTION_RECOGNIZE_SPEECH,
            extras,
        }
    }

    pub fn get(&self, key: &str) -> Option<&IntentExtra> {
        self.extras.get(key)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn millis(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

// ─── HostListener ────────────────────────────────────────────────

/// ホストのコールバックを `EngineEvent` に変換する
#[derive(Debug, Clone)]
pub struct HostListener {
    sink: EventSink,
}

impl HostListener {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }

    pub fn on_ready_for_speech(&self) {
        self.sink.emit(EngineEvent::Ready);
    }

    pub fn on_beginning_of_speech(&self) {
        self.sink.emit(EngineEvent::SpeechBegin);
    }

    pub fn on_rms_changed(&self, _rms_db: f32) {}

    pub fn on_buffer_received(&self, _buffer: &[u8]) {}

    pub fn on_end_of_speech(&self) {
        self.sink.emit(EngineEvent::SpeechEnd);
    }

    pub fn on_error(&self, code: i32) {
        self.sink.emit(EngineEvent::Error(EngineErrorCode::from_raw(code)));
    }

    /// 結果バンドルに候補がなければ空リストの Final になる
    pub fn on_results(&self, matches: Option<Vec<String>>) {
        self.sink.emit(EngineEvent::Final(matches.unwrap_or_default()));
    }

    /// 候補のない途中結果は無視する
    pub fn on_partial_results(&self, matches: Option<Vec<String>>) {
        if let Some(first) = matches.and_then(|m| m.into_iter().next()) {
            self.sink.emit(EngineEvent::Partial(first));
        }
    }

    pub fn on_event(&self, event_type: i32) {
        log::trace!("host event ignored: {event_type}");
    }
}

// ─── BridgeEngine ────────────────────────────────────────────────

pub struct BridgeEngine {
    host: Arc<dyn HostSpeechService>,
    recognizer: Box<dyn HostRecognizer>,
    destroyed: bool,
}

impl RecognitionEngine for BridgeEngine {
    fn start(&mut self, config: &RecognitionConfig) -> Result<(), EngineStartError> {
        if !self.host.is_recognition_available() {
            return Err(EngineStartError::Unavailable);
        }
        let intent = RecognizerIntent::from_config(config);
        self.recognizer
            .start_listening(&intent)
            .map_err(EngineStartError::Rejected)
    }

    fn stop(&mut self) {
        if !self.destroyed {
            self.recognizer.stop_listening();
        }
    }

    fn dispose(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.recognizer.destroy();
        }
    }
}

impl Drop for BridgeEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// ホストサービスから `BridgeEngine` を作るファクトリ
pub struct BridgeEngineFactory {
    host: Arc<dyn HostSpeechService>,
}

impl BridgeEngineFactory {
    pub fn new(host: Arc<dyn HostSpeechService>) -> Self {
        Self { host }
    }
}

impl EngineFactory for BridgeEngineFactory {
    fn is_available(&self) -> bool {
        self.host.is_recognition_available()
    }

    fn create(&self, sink: EventSink) -> Result<Box<dyn RecognitionEngine>, EngineStartError> {
        let mut recognizer = self
            .host
            .create_recognizer()
            .map_err(EngineStartError::Construction)?;
        recognizer.set_listener(HostListener::new(sink));
        Ok(Box::new(BridgeEngine {
            host: self.host.clone(),
            recognizer,
            destroyed: false,
        }))
    }

    fn name(&self) -> &str {
        "host-bridge"
    }
}
