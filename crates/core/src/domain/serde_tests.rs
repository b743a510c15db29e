#[cfg(test)]
mod tests {
    use crate::domain::engine::{EngineErrorCode, LanguageModel, RecognitionConfig};
    use crate::domain::error::{ErrorCode, RecognitionError};
    use crate::domain::permission::PermissionState;
    use crate::domain::session::{SessionSnapshot, SessionState, StateTransition};
    use crate::domain::settings::SpeechSettings;
    use crate::infra::engine::bridge::{IntentExtra, RecognizerIntent};
    use crate::infra::metrics::SessionMetrics;

    #[test]
    fn test_session_state_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionState::Idle).unwrap(),
            "\"idle\""
        );
        assert_eq!(
            serde_json::to_string(&SessionState::Listening).unwrap(),
            "\"listening\""
        );
        assert_eq!(
            serde_json::to_string(&SessionState::Resolving).unwrap(),
            "\"resolving\""
        );
    }

    #[test]
    fn test_state_transition_serialization() {
        let transition = StateTransition {
            attempt: 3,
            prev_state: SessionState::Starting,
            new_state: SessionState::Listening,
        };
        let json = serde_json::to_value(&transition).unwrap();
        assert_eq!(json["attempt"], 3);
        assert_eq!(json["prev_state"], "starting");
        assert_eq!(json["new_state"], "listening");
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = SessionSnapshot {
            state: SessionState::Listening,
            listening: true,
            timeout_armed: true,
            has_pending: true,
            last_partial: "turn on".to_string(),
            attempt: 1,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"state\":\"listening\""));
        assert!(json.contains("\"last_partial\":\"turn on\""));
    }

    #[test]
    fn test_error_code_serialization() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::PermissionDenied).unwrap(),
            "\"E_PERMISSION\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::ServiceUnavailable).unwrap(),
            "\"E_STT_UNAVAILABLE\""
        );

        let err = RecognitionError::permission_denied();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "E_PERMISSION");
        assert_eq!(json["message"], "Microphone permission denied");
    }

    #[test]
    fn test_engine_error_code_serialization() {
        assert_eq!(
            serde_json::to_string(&EngineErrorCode::NoMatch).unwrap(),
            "\"no_match\""
        );
        assert_eq!(
            serde_json::from_str::<EngineErrorCode>("\"network\"").unwrap(),
            EngineErrorCode::Network
        );
    }

    #[test]
    fn test_permission_state_serialization() {
        assert_eq!(
            serde_json::to_string(&PermissionState::NotDetermined).unwrap(),
            "\"not_determined\""
        );
    }

    #[test]
    fn test_settings_partial_json_uses_defaults() {
        let json = r#"{ "recognition": { "language": "ja-JP", "language_model": "web_search" } }"#;
        let settings: SpeechSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.recognition.language, "ja-JP");
        assert_eq!(settings.recognition.language_model, LanguageModel::WebSearch);
        assert_eq!(settings.recognition.max_results, 5);
        assert_eq!(settings.restart_cooldown_ms, 500);
    }

    #[test]
    fn test_intent_extras_serialize_flat() {
        let intent = RecognizerIntent::from_config(&RecognitionConfig::default());
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["action"], "android.speech.action.RECOGNIZE_SPEECH");
        assert_eq!(json["extras"]["android.speech.extra.MAX_RESULTS"], 5);
        assert_eq!(json["extras"]["android.speech.extra.PARTIAL_RESULTS"], true);
        assert_eq!(
            serde_json::to_string(&IntentExtra::Text("en-US".into())).unwrap(),
            "\"en-US\""
        );
    }

    #[test]
    fn test_metrics_summary_serialization() {
        let metrics = SessionMetrics::new();
        metrics.inc_requests();
        let json = serde_json::to_value(metrics.summary()).unwrap();
        assert_eq!(json["requests"], 1);
        assert!(json["avg_latency_ms"].is_null());
        assert_eq!(json["resolutions"]["final_result"], 0);
    }
}
