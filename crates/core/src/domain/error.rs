use serde::Serialize;

use super::engine::{EngineErrorCode, EngineStartError};

/// 呼び出し側に返すエラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "E_PERMISSION")]
    PermissionDenied,
    #[serde(rename = "E_STT_UNAVAILABLE")]
    ServiceUnavailable,
    #[serde(rename = "E_CONSTRUCTION")]
    ConstructionFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "E_PERMISSION",
            Self::ServiceUnavailable => "E_STT_UNAVAILABLE",
            Self::ConstructionFailed => "E_CONSTRUCTION",
        }
    }
}

/// 呼び出し側に見える認識エラー。いずれもリトライ不可。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecognitionError {
    pub code: ErrorCode,
    pub message: String,
}

impl RecognitionError {
    pub fn permission_denied() -> Self {
        Self {
            code: ErrorCode::PermissionDenied,
            message: "Microphone permission denied".to_string(),
        }
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::ServiceUnavailable,
            message: msg.into(),
        }
    }

    pub fn construction_failed(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::ConstructionFailed,
            message: msg.into(),
        }
    }
}

impl From<EngineStartError> for RecognitionError {
    fn from(err: EngineStartError) -> Self {
        match err {
            EngineStartError::Unavailable => Self::service_unavailable(err.to_string()),
            EngineStartError::Construction(_) | EngineStartError::Rejected(_) => {
                Self::construction_failed(err.to_string())
            }
        }
    }
}

impl std::fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for RecognitionError {}

/// セッション内部で吸収される失敗。呼び出し側には空文字か途中結果として返る。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalFailure {
    EngineError(EngineErrorCode),
    Timeout,
}

impl std::fmt::Display for InternalFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EngineError(code) => write!(f, "engine error: {code}"),
            Self::Timeout => f.write_str("timeout"),
        }
    }
}
