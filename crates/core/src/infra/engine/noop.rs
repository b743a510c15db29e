use crate::domain::engine::{EngineFactory, EngineStartError, EventSink, RecognitionEngine};

/// NoopEngineFactory: 認識サービスのないデバイス向け。常に利用不可を返す。
pub struct NoopEngineFactory;

impl EngineFactory for NoopEngineFactory {
    fn is_available(&self) -> bool {
        false
    }

    fn create(&self, _sink: EventSink) -> Result<Box<dyn RecognitionEngine>, EngineStartError> {
        Err(EngineStartError::Unavailable)
    }

    fn name(&self) -> &str {
        "noop"
    }
}
