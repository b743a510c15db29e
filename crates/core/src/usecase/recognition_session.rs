//! 音声認識セッションの状態機械。
//!
//! 1つのタスク上で `SessionCommand` を順番に処理する単一アクター。
//! エンジンイベント・タイムアウト・権限確認の完了・再起動待ちの完了は
//! すべて同じメールボックスを経由するため、状態へのロックは不要。
//!
//! 状態: Idle → Starting → Listening → Resolving → Idle

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::domain::engine::{
    EngineEvent, EngineFactory, EventSink, RecognitionConfig, RecognitionEngine,
};
use crate::domain::error::{InternalFailure, RecognitionError};
use crate::domain::permission::{PermissionGate, PermissionState};
use crate::domain::session::{
    select_fallback, select_final, PendingRequest, Resolution, SessionSnapshot, SessionState,
    StateTransition,
};
use crate::domain::settings::SpeechSettings;
use crate::infra::metrics::SessionMetrics;

/// セッションアクターへのメッセージ
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Request(PendingRequest),
    Stop { ack: oneshot::Sender<()> },
    Engine { attempt: u64, event: EngineEvent },
    TimeoutElapsed { attempt: u64 },
    PermissionResolved { generation: u64, granted: bool },
    CooldownElapsed,
    Snapshot { reply: oneshot::Sender<SessionSnapshot> },
    Dispose { ack: Option<oneshot::Sender<()>> },
}

type Mailbox = mpsc::WeakUnboundedSender<SessionCommand>;

fn post(mailbox: &Mailbox, command: SessionCommand) {
    if let Some(tx) = mailbox.upgrade() {
        let _ = tx.send(command);
    }
}

/// 公開状態より細かい内部フェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    AwaitingPermission,
    CoolingDown,
    Starting,
    Listening,
    Resolving,
}

impl Phase {
    fn state(self) -> SessionState {
        match self {
            Self::Idle => SessionState::Idle,
            Self::AwaitingPermission | Self::CoolingDown | Self::Starting => SessionState::Starting,
            Self::Listening => SessionState::Listening,
            Self::Resolving => SessionState::Resolving,
        }
    }
}

pub(crate) struct RecognitionSession {
    factory: Arc<dyn EngineFactory>,
    permission: Arc<dyn PermissionGate>,
    config: RecognitionConfig,
    listen_timeout: Duration,
    restart_cooldown: Duration,
    mailbox: Mailbox,
    metrics: Arc<SessionMetrics>,

    phase: Phase,
    listening: bool,
    last_partial: String,
    pending: Option<PendingRequest>,
    timeout: Option<JoinHandle<()>>,
    engine: Option<Box<dyn RecognitionEngine>>,
    cooling_down: bool,
    /// リクエストを受け付けるたびに進む。古いイベント・タイマーの判定に使う。
    generation: u64,
    disposed: bool,
}

impl RecognitionSession {
    pub(crate) fn new(
        factory: Arc<dyn EngineFactory>,
        permission: Arc<dyn PermissionGate>,
        settings: &SpeechSettings,
        mailbox: Mailbox,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        Self {
            factory,
            permission,
            config: settings.to_recognition_config(),
            listen_timeout: settings.listen_timeout(),
            restart_cooldown: settings.restart_cooldown(),
            mailbox,
            metrics,
            phase: Phase::Idle,
            listening: false,
            last_partial: String::new(),
            pending: None,
            timeout: None,
            engine: None,
            cooling_down: false,
            generation: 0,
            disposed: false,
        }
    }

    /// メールボックスが閉じるか Dispose を受けるまでコマンドを処理する
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionCommand>) {
        while let Some(command) = rx.recv().await {
            self.handle(command);
            if self.disposed {
                break;
            }
        }
        self.dispose();
        log::debug!("音声認識セッション終了");
    }

    pub(crate) fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Request(request) => self.on_request(request),
            SessionCommand::Stop { ack } => {
                self.on_stop();
                let _ = ack.send(());
            }
            SessionCommand::Engine { attempt, event } => self.on_engine_event(attempt, event),
            SessionCommand::TimeoutElapsed { attempt } => self.on_timeout(attempt),
            SessionCommand::PermissionResolved {
                generation,
                granted,
            } => self.on_permission_resolved(generation, granted),
            SessionCommand::CooldownElapsed => self.on_cooldown_elapsed(),
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionCommand::Dispose { ack } => {
                self.dispose();
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
        }
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.phase.state(),
            listening: self.listening,
            timeout_armed: self.timeout.is_some(),
            has_pending: self.pending.is_some(),
            last_partial: self.last_partial.clone(),
            attempt: self.generation,
        }
    }

    // ==================== Request ====================

    fn on_request(&mut self, request: PendingRequest) {
        self.metrics.inc_requests();

        if self.disposed {
            request.resolve(Err(RecognitionError::service_unavailable(
                "Speech service has shut down",
            )));
            return;
        }

        // 認識中は重ねて開始しない。新しい呼び出し側には空文字を返す。
        if self.phase == Phase::Listening {
            log::warn!(
                "Already listening - skipping new recognition request ({})",
                request.id()
            );
            self.metrics.inc_rejected_busy();
            request.resolve(Ok(String::new()));
            return;
        }

        if let Some(previous) = self.pending.take() {
            log::warn!(
                "未解決のリクエスト {} を新しいリクエスト {} で置き換えます",
                previous.id(),
                request.id()
            );
            self.metrics.inc_superseded();
            previous.resolve(Ok(String::new()));
        }

        self.generation += 1;
        self.pending = Some(request);

        match self.permission.microphone() {
            PermissionState::Granted => self.begin_attempt(),
            state => {
                log::info!("マイク権限の確認を要求します ({state:?})");
                self.set_phase(Phase::AwaitingPermission);
                self.request_permission();
            }
        }
    }

    fn request_permission(&self) {
        let gate = self.permission.clone();
        let mailbox = self.mailbox.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let granted = gate.request_microphone().await;
            post(
                &mailbox,
                SessionCommand::PermissionResolved {
                    generation,
                    granted,
                },
            );
        });
    }

    fn on_permission_resolved(&mut self, generation: u64, granted: bool) {
        if generation != self.generation || self.phase != Phase::AwaitingPermission {
            log::debug!("古い権限確認の結果を無視 (generation={generation})");
            return;
        }
        if granted {
            self.begin_attempt();
        } else {
            self.fail(RecognitionError::permission_denied());
        }
    }

    fn begin_attempt(&mut self) {
        if !self.factory.is_available() {
            self.fail(RecognitionError::service_unavailable(
                "Speech recognition not available",
            ));
            return;
        }

        // 前回のエンジンが残っていれば止めて破棄し、ホスト側の後始末を待つ
        if let Some(mut engine) = self.engine.take() {
            self.cancel_timeout();
            self.listening = false;
            engine.stop();
            engine.dispose();
            drop(engine);
            self.schedule_cooldown();
        }

        if self.cooling_down {
            self.set_phase(Phase::CoolingDown);
            return;
        }
        self.launch();
    }

    fn schedule_cooldown(&mut self) {
        self.cooling_down = true;
        let mailbox = self.mailbox.clone();
        let delay = self.restart_cooldown;
        log::debug!("前回のエンジンを破棄、{}ms 待機", delay.as_millis());
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            post(&mailbox, SessionCommand::CooldownElapsed);
        });
    }

    fn on_cooldown_elapsed(&mut self) {
        self.cooling_down = false;
        if self.phase == Phase::CoolingDown {
            self.launch();
        }
    }

    fn launch(&mut self) {
        self.last_partial.clear();
        let attempt = self.generation;

        let mut engine = match self.factory.create(self.event_sink(attempt)) {
            Ok(engine) => engine,
            Err(err) => {
                self.fail(err.into());
                return;
            }
        };

        let started = engine.start(&self.config);
        // 開始に失敗しても次のリクエストで後始末できるよう保持する
        self.engine = Some(engine);
        if let Err(err) = started {
            self.fail(err.into());
            return;
        }

        self.set_phase(Phase::Starting);
        log::info!(
            "音声認識を開始しました (attempt={attempt}, engine={}, language={})",
            self.factory.name(),
            self.config.language
        );
    }

    fn event_sink(&self, attempt: u64) -> EventSink {
        let mailbox = self.mailbox.clone();
        EventSink::new(move |event| post(&mailbox, SessionCommand::Engine { attempt, event }))
    }

    // ==================== Engine events ====================

    fn on_engine_event(&mut self, attempt: u64, event: EngineEvent) {
        if attempt != self.generation || self.engine.is_none() {
            log::debug!("古い試行のイベントを無視 (attempt={attempt}): {event:?}");
            return;
        }
        // 解決済みの試行に遅れて届いたイベント
        if self.phase == Phase::Idle {
            log::debug!("解決済みのためイベントを無視: {event:?}");
            return;
        }

        if event.is_terminal() {
            self.listening = false;
            self.cancel_timeout();
        }

        match event {
            EngineEvent::Ready => {
                if self.phase != Phase::Starting {
                    log::debug!("Ready を無視 (phase={:?})", self.phase);
                    return;
                }
                log::info!("Ready for speech (attempt={attempt})");
                self.set_phase(Phase::Listening);
                self.listening = true;
                self.arm_timeout(attempt);
            }
            EngineEvent::SpeechBegin => {
                log::debug!("Speech detected (attempt={attempt})");
            }
            EngineEvent::Partial(text) => {
                if self.pending.is_some() {
                    log::debug!("Partial: {text}");
                    self.last_partial = text;
                }
            }
            EngineEvent::SpeechEnd => {
                self.listening = false;
                self.cancel_timeout();
                if matches!(self.phase, Phase::Starting | Phase::Listening) {
                    self.set_phase(Phase::Resolving);
                }
            }
            EngineEvent::Final(matches) => {
                let resolution = select_final(&matches, &self.last_partial);
                self.complete(resolution);
            }
            EngineEvent::Error(code) => {
                self.absorb(InternalFailure::EngineError(code));
            }
        }
    }

    fn on_timeout(&mut self, attempt: u64) {
        if attempt != self.generation || !self.listening {
            return;
        }
        self.timeout = None;
        self.listening = false;
        if let Some(engine) = self.engine.as_mut() {
            engine.stop();
        }
        self.absorb(InternalFailure::Timeout);
    }

    /// エンジンエラー・タイムアウトは呼び出し側に出さず、途中結果か空文字で解決する
    fn absorb(&mut self, failure: InternalFailure) {
        match failure {
            InternalFailure::Timeout => {
                log::warn!("Timeout - stopping recognition (partial={:?})", self.last_partial);
                self.metrics.inc_timeouts();
            }
            InternalFailure::EngineError(code) => {
                log::warn!("Speech error: {failure} (code: {code:?})");
                self.metrics.inc_engine_errors();
            }
        }
        let resolution = select_fallback(&self.last_partial);
        self.complete(resolution);
    }

    fn complete(&mut self, resolution: Resolution) {
        match self.pending.take() {
            Some(request) => {
                let elapsed = request.received_at().elapsed().as_millis();
                let elapsed = u64::try_from(elapsed).unwrap_or(u64::MAX);
                log::info!(
                    "認識結果 ({:?}, {}ms): {:?}",
                    resolution.source,
                    elapsed,
                    resolution.text
                );
                self.metrics.record_resolution(resolution.source, elapsed);
                request.resolve(Ok(resolution.text));
            }
            None => log::debug!("解決待ちのリクエストなし、結果を破棄"),
        }
        self.last_partial.clear();
        self.set_phase(Phase::Idle);
    }

    fn fail(&mut self, error: RecognitionError) {
        log::error!("音声認識に失敗: {error}");
        self.metrics.inc_failure(error.code);
        if let Some(request) = self.pending.take() {
            request.resolve(Err(error));
        }
        self.listening = false;
        self.cancel_timeout();
        self.last_partial.clear();
        self.set_phase(Phase::Idle);
    }

    // ==================== Timer ====================

    fn arm_timeout(&mut self, attempt: u64) {
        self.cancel_timeout();
        let mailbox = self.mailbox.clone();
        let delay = self.listen_timeout;
        self.timeout = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            post(&mailbox, SessionCommand::TimeoutElapsed { attempt });
        }));
    }

    fn cancel_timeout(&mut self) {
        if let Some(handle) = self.timeout.take() {
            handle.abort();
        }
    }

    // ==================== Stop / Dispose ====================

    /// 手動停止。解決はエンジンの終端イベントに任せる。
    fn on_stop(&mut self) {
        if !self.listening {
            log::debug!("stop: 認識中ではないため何もしません");
            return;
        }
        self.cancel_timeout();
        if let Some(engine) = self.engine.as_mut() {
            engine.stop();
        }
        self.listening = false;
        self.set_phase(Phase::Resolving);
        log::info!("Speech recognition stopped");
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.cancel_timeout();
        if let Some(mut engine) = self.engine.take() {
            engine.dispose();
        }
        if let Some(request) = self.pending.take() {
            request.resolve(Ok(String::new()));
        }
        self.listening = false;
        self.last_partial.clear();
        self.set_phase(Phase::Idle);
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase == phase {
            return;
        }
        let transition = StateTransition {
            attempt: self.generation,
            prev_state: self.phase.state(),
            new_state: phase.state(),
        };
        if transition.prev_state != transition.new_state {
            log::debug!(
                "session state: {} -> {} (attempt={})",
                transition.prev_state.as_str(),
                transition.new_state.as_str(),
                transition.attempt
            );
        }
        self.phase = phase;
    }
}

impl Drop for RecognitionSession {
    fn drop(&mut self) {
        self.dispose();
    }
}
