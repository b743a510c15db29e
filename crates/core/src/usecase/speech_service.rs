use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::domain::engine::EngineFactory;
use crate::domain::error::RecognitionError;
use crate::domain::permission::PermissionGate;
use crate::domain::session::{PendingRequest, SessionSnapshot};
use crate::domain::settings::SpeechSettings;
use crate::infra::metrics::{MetricsSummary, SessionMetrics};
use crate::usecase::recognition_session::{RecognitionSession, SessionCommand};

/// 音声認識サービス（ホストのメソッドチャネルから呼ばれる窓口）
///
/// クローンは同じセッションを共有する。すべてのハンドルが破棄されると
/// セッションはエンジンを破棄して終了する。
#[derive(Clone)]
pub struct SpeechService {
    tx: mpsc::UnboundedSender<SessionCommand>,
    metrics: Arc<SessionMetrics>,
}

impl SpeechService {
    /// セッションタスクを起動する。Tokio ランタイム内から呼ぶこと。
    pub fn spawn(
        factory: Arc<dyn EngineFactory>,
        permission: Arc<dyn PermissionGate>,
        settings: SpeechSettings,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(SessionMetrics::new());
        let session = RecognitionSession::new(
            factory.clone(),
            permission,
            &settings,
            tx.downgrade(),
            metrics.clone(),
        );
        log::info!(
            "SpeechService started (engine={}, timeout={}ms, cooldown={}ms)",
            factory.name(),
            settings.recognition.timeout_ms,
            settings.restart_cooldown_ms
        );
        tokio::spawn(session.run(rx));
        Self { tx, metrics }
    }

    /// 認識を1回開始し、確定した文字列を返す。
    ///
    /// タイムアウト・エンジンエラーは途中結果か空文字で成功扱いになる。
    /// エラーになるのは権限拒否・サービス不可・エンジン生成失敗のみ。
    pub async fn start_speech_recognition(&self) -> Result<String, RecognitionError> {
        let (pending, rx) = PendingRequest::channel();
        log::debug!("startSpeechRecognition ({})", pending.id());
        if self.tx.send(SessionCommand::Request(pending)).is_err() {
            return Err(shut_down());
        }
        rx.await.unwrap_or_else(|_| Err(shut_down()))
    }

    /// 認識中なら停止する。認識中でなければ何もしない。常に成功する。
    pub async fn stop_speech_recognition(&self) {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(SessionCommand::Stop { ack }).is_ok() {
            let _ = rx.await;
        }
    }

    /// 現在の状態。セッション終了後は `None`。
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(SessionCommand::Snapshot { reply }).ok()?;
        rx.await.ok()
    }

    pub fn metrics(&self) -> MetricsSummary {
        self.metrics.summary()
    }

    /// エンジンとタイマーを解放してセッションを終了する。二重に呼んでもよい。
    pub async fn shutdown(&self) {
        let (ack, rx) = oneshot::channel();
        if self
            .tx
            .send(SessionCommand::Dispose { ack: Some(ack) })
            .is_ok()
        {
            let _ = rx.await;
        }
        log::info!("SpeechService shut down");
    }
}

fn shut_down() -> RecognitionError {
    RecognitionError::service_unavailable("Speech service has shut down")
}
