pub mod bridge;
mod noop;
pub mod scripted;

pub use bridge::{BridgeEngineFactory, HostRecognizer, HostSpeechService};
pub use noop::NoopEngineFactory;
pub use scripted::{EngineCalls, Script, ScriptedEngineFactory};

use std::sync::Arc;

use crate::domain::engine::EngineFactory;

/// エンジンファクトリを選ぶ（ホストサービスがあれば bridge、なければ Noop）
pub fn default_engine_factory(host: Option<Arc<dyn HostSpeechService>>) -> Arc<dyn EngineFactory> {
    if let Some(host) = host {
        if host.is_recognition_available() {
            log::info!("Host speech service selected");
            return Arc::new(BridgeEngineFactory::new(host));
        }
        log::warn!("Host speech service not available, falling back to Noop engine");
    }

    log::info!("Using Noop engine");
    Arc::new(NoopEngineFactory)
}
