//! 台本どおりにイベントを再生する認識エンジン。
//!
//! 実機なしでセッションの振る舞いを再現するためのシミュレーション実装。
//! 生成・開始・停止・破棄の呼び出し回数を記録する。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::domain::engine::{
    EngineErrorCode, EngineEvent, EngineFactory, EngineStartError, EventSink, RecognitionConfig,
    RecognitionEngine,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Emit(EngineEvent),
    Wait(Duration),
}

/// 1回の試行で再生するイベント列
#[derive(Debug, Clone, Default)]
pub struct Script {
    steps: Vec<Step>,
    on_stop: Vec<Step>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(mut self, event: EngineEvent) -> Self {
        self.steps.push(Step::Emit(event));
        self
    }

    pub fn wait_ms(mut self, ms: u64) -> Self {
        self.steps.push(Step::Wait(Duration::from_millis(ms)));
        self
    }

    pub fn ready(self) -> Self {
        self.emit(EngineEvent::Ready)
    }

    pub fn partial(self, text: &str) -> Self {
        self.emit(EngineEvent::Partial(text.to_string()))
    }

    pub fn final_results(self, matches: &[&str]) -> Self {
        self.emit(EngineEvent::Final(
            matches.iter().map(|m| m.to_string()).collect(),
        ))
    }

    pub fn error(self, code: EngineErrorCode) -> Self {
        self.emit(EngineEvent::Error(code))
    }

    /// `stop()` 後に送るイベント（停止後に結果を返すエンジンの再現）
    pub fn on_stop(mut self, event: EngineEvent) -> Self {
        self.on_stop.push(Step::Emit(event));
        self
    }
}

/// エンジン呼び出し回数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineCalls {
    pub created: u32,
    pub started: u32,
    pub stopped: u32,
    pub disposed: u32,
}

/// 台本エンジンのファクトリ。台本は生成順に消費され、尽きたら `fallback` を使う。
pub struct ScriptedEngineFactory {
    available: Mutex<bool>,
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    construction_error: Mutex<Option<String>>,
    start_error: Mutex<Option<EngineStartError>>,
    calls: Arc<Mutex<EngineCalls>>,
}

impl ScriptedEngineFactory {
    /// `fallback` は Ready だけを送る（無音のユーザー）
    pub fn new() -> Self {
        Self {
            available: Mutex::new(true),
            scripts: Mutex::new(VecDeque::new()),
            fallback: Script::new().ready(),
            construction_error: Mutex::new(None),
            start_error: Mutex::new(None),
            calls: Arc::new(Mutex::new(EngineCalls::default())),
        }
    }

    pub fn with_script(self, script: Script) -> Self {
        self.scripts.lock().push_back(script);
        self
    }

    pub fn unavailable(self) -> Self {
        *self.available.lock() = false;
        self
    }

    pub fn failing_construction(self, msg: &str) -> Self {
        *self.construction_error.lock() = Some(msg.to_string());
        self
    }

    pub fn failing_start(self, err: EngineStartError) -> Self {
        *self.start_error.lock() = Some(err);
        self
    }

    pub fn calls(&self) -> EngineCalls {
        *self.calls.lock()
    }
}

impl Default for ScriptedEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory for ScriptedEngineFactory {
    fn is_available(&self) -> bool {
        *self.available.lock()
    }

    fn create(&self, sink: EventSink) -> Result<Box<dyn RecognitionEngine>, EngineStartError> {
        if let Some(msg) = self.construction_error.lock().clone() {
            return Err(EngineStartError::Construction(msg));
        }
        self.calls.lock().created += 1;

        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        Ok(Box::new(ScriptedEngine {
            script,
            sink,
            start_error: self.start_error.lock().clone(),
            calls: self.calls.clone(),
            playback: None,
            disposed: false,
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedEngine {
    script: Script,
    sink: EventSink,
    start_error: Option<EngineStartError>,
    calls: Arc<Mutex<EngineCalls>>,
    playback: Option<JoinHandle<()>>,
    disposed: bool,
}

impl ScriptedEngine {
    fn play(&mut self, steps: Vec<Step>) {
        self.abort_playback();
        if steps.is_empty() {
            return;
        }
        let sink = self.sink.clone();
        self.playback = Some(tokio::spawn(async move {
            for step in steps {
                match step {
                    Step::Wait(d) => tokio::time::sleep(d).await,
                    Step::Emit(event) => sink.emit(event),
                }
            }
        }));
    }

    fn abort_playback(&mut self) {
        if let Some(handle) = self.playback.take() {
            handle.abort();
        }
    }
}

impl RecognitionEngine for ScriptedEngine {
    fn start(&mut self, _config: &RecognitionConfig) -> Result<(), EngineStartError> {
        if let Some(err) = self.start_error.clone() {
            return Err(err);
        }
        self.calls.lock().started += 1;
        let steps = self.script.steps.clone();
        self.play(steps);
        Ok(())
    }

    fn stop(&mut self) {
        self.calls.lock().stopped += 1;
        let steps = self.script.on_stop.clone();
        self.play(steps);
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.abort_playback();
        self.calls.lock().disposed += 1;
    }
}

impl Drop for ScriptedEngine {
    fn drop(&mut self) {
        self.abort_playback();
    }
}
