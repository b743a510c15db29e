//! 音声認識セッションのコアライブラリ。
//!
//! ホストの音声認識エンジンを1つのセッションで包み、
//! 「開始して確定文字列を1つ返す」操作として提供する。
//!
//! - `domain`: 状態・エラー・設定・エンジン/権限のトレイト
//! - `infra`: エンジンアダプタ、権限ゲート、メトリクス
//! - `usecase`: セッションアクターと公開サービス

pub mod domain;
pub mod infra;
pub mod usecase;

pub use domain::error::{ErrorCode, RecognitionError};
pub use domain::settings::SpeechSettings;
pub use usecase::speech_service::SpeechService;
