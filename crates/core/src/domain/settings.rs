use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::engine::RecognitionConfig;

/// 設定ファイルの場所を上書きする環境変数
pub const SETTINGS_PATH_ENV: &str = "SR_SETTINGS_PATH";

/// 設定の読み込みエラー
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// 音声認識サービスの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// 試行ごとにエンジンへ渡す設定（タイムアウトもここ）
    pub recognition: RecognitionConfig,
    /// 前回エンジン破棄後、新しいエンジンを作るまでの待ち時間（ミリ秒）
    pub restart_cooldown_ms: u64,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            recognition: RecognitionConfig::default(),
            restart_cooldown_ms: 500,
        }
    }
}

impl SpeechSettings {
    /// JSON ファイルから読み込む。欠けているキーはデフォルト値になる。
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json(&raw)?;
        log::info!("設定を読み込みました: {}", path.display());
        Ok(settings)
    }

    pub fn from_json(raw: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// `SR_SETTINGS_PATH` → ユーザー設定ディレクトリ → デフォルト値 の順で探す
    pub fn load_or_default() -> Result<Self, SettingsError> {
        if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
            return Self::load(Path::new(&path));
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                log::debug!("設定ファイルなし、デフォルト値を使用");
                Ok(Self::default())
            }
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("speech-relay").join("settings.json"))
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let r = &self.recognition;
        if r.language.trim().is_empty() {
            return Err(SettingsError::Invalid("language must not be empty".into()));
        }
        if r.max_results == 0 {
            return Err(SettingsError::Invalid("max_results must be at least 1".into()));
        }
        if r.timeout_ms == 0 {
            return Err(SettingsError::Invalid("timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// 1回の試行でエンジンへ渡す設定
    pub fn to_recognition_config(&self) -> RecognitionConfig {
        self.recognition.clone()
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_millis(self.recognition.timeout_ms)
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_millis(self.restart_cooldown_ms)
    }
}
