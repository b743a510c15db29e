//! セッション全体のシナリオテスト。
//!
//! 台本エンジンと一時停止した Tokio 時計で、タイムアウトや再起動待ちを
//! 実時間を使わずに再現する。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use sr_core::domain::engine::{EngineErrorCode, EngineEvent};
use sr_core::domain::session::SessionState;
use sr_core::infra::engine::{default_engine_factory, Script, ScriptedEngineFactory};
use sr_core::infra::permission::{DeferredPermissionGate, StaticPermissionGate};
use sr_core::{ErrorCode, SpeechService, SpeechSettings};

fn spawn_service(factory: &Arc<ScriptedEngineFactory>) -> SpeechService {
    SpeechService::spawn(
        factory.clone(),
        Arc::new(StaticPermissionGate::granted()),
        SpeechSettings::default(),
    )
}

async fn wait_until_listening(svc: &SpeechService) {
    loop {
        let snap = svc.snapshot().await.expect("session alive");
        if snap.state == SessionState::Listening {
            return;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn partials_then_empty_final_return_last_partial() {
    let factory = Arc::new(ScriptedEngineFactory::new().with_script(
        Script::new()
            .ready()
            .wait_ms(200)
            .partial("turn on")
            .wait_ms(200)
            .partial("turn on the lights")
            .wait_ms(200)
            .final_results(&[]),
    ));
    let svc = spawn_service(&factory);

    let text = svc.start_speech_recognition().await.unwrap();
    assert_eq!(text, "turn on the lights");
    assert_eq!(svc.metrics().resolutions.partial, 1);
}

#[tokio::test(start_paused = true)]
async fn silence_times_out_with_empty_string() {
    let factory = Arc::new(ScriptedEngineFactory::new());
    let svc = spawn_service(&factory);

    let started = Instant::now();
    let text = svc.start_speech_recognition().await.unwrap();
    assert_eq!(text, "");
    assert!(started.elapsed() >= Duration::from_millis(5000));
    assert_eq!(factory.calls().stopped, 1);

    // 解決後にタイマーが再度発火しないこと
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(factory.calls().stopped, 1);
    assert_eq!(svc.metrics().timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_returns_partial_heard_so_far() {
    let factory = Arc::new(
        ScriptedEngineFactory::new().with_script(Script::new().ready().partial("remind me")),
    );
    let svc = spawn_service(&factory);

    assert_eq!(svc.start_speech_recognition().await.unwrap(), "remind me");
}

#[tokio::test(start_paused = true)]
async fn engine_error_is_absorbed() {
    let factory = Arc::new(
        ScriptedEngineFactory::new()
            .with_script(Script::new().ready().wait_ms(100).error(EngineErrorCode::Network)),
    );
    let svc = spawn_service(&factory);

    assert_eq!(svc.start_speech_recognition().await, Ok(String::new()));
    assert_eq!(svc.metrics().engine_errors, 1);
}

#[tokio::test(start_paused = true)]
async fn unavailable_service_never_constructs_engine() {
    let factory = Arc::new(ScriptedEngineFactory::new().unavailable());
    let svc = spawn_service(&factory);

    let err = svc.start_speech_recognition().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ServiceUnavailable);
    assert_eq!(err.message, "Speech recognition not available");
    assert_eq!(factory.calls().created, 0);
}

#[tokio::test(start_paused = true)]
async fn missing_host_falls_back_to_unavailable() {
    let svc = SpeechService::spawn(
        default_engine_factory(None),
        Arc::new(StaticPermissionGate::granted()),
        SpeechSettings::default(),
    );
    let err = svc.start_speech_recognition().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ServiceUnavailable);
}

#[tokio::test(start_paused = true)]
async fn construction_failure_is_reported() {
    let factory = Arc::new(ScriptedEngineFactory::new().failing_construction("binder died"));
    let svc = spawn_service(&factory);

    let err = svc.start_speech_recognition().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ConstructionFailed);
    assert_eq!(err.to_string(), "[E_CONSTRUCTION] Failed to create recognizer: binder died");
}

#[tokio::test(start_paused = true)]
async fn second_request_while_listening_gets_empty_string() {
    let factory = Arc::new(ScriptedEngineFactory::new().with_script(
        Script::new()
            .ready()
            .wait_ms(1000)
            .final_results(&["first caller"]),
    ));
    let svc = spawn_service(&factory);

    let first = {
        let svc = svc.clone();
        tokio::spawn(async move { svc.start_speech_recognition().await })
    };
    wait_until_listening(&svc).await;

    assert_eq!(svc.start_speech_recognition().await, Ok(String::new()));
    assert_eq!(first.await.unwrap(), Ok("first caller".to_string()));
    assert_eq!(factory.calls().created, 1);
    assert_eq!(svc.metrics().rejected_busy, 1);
}

#[tokio::test(start_paused = true)]
async fn stop_while_idle_does_nothing() {
    let factory = Arc::new(ScriptedEngineFactory::new());
    let svc = spawn_service(&factory);

    svc.stop_speech_recognition().await;
    assert_eq!(factory.calls().created, 0);
    assert_eq!(factory.calls().stopped, 0);
    assert_eq!(svc.snapshot().await.unwrap().state, SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn manual_stop_resolves_with_engine_final() {
    let factory = Arc::new(ScriptedEngineFactory::new().with_script(
        Script::new()
            .ready()
            .partial("open the")
            .on_stop(EngineEvent::Final(vec!["open the door".into()])),
    ));
    let svc = spawn_service(&factory);

    let request = {
        let svc = svc.clone();
        tokio::spawn(async move { svc.start_speech_recognition().await })
    };
    wait_until_listening(&svc).await;
    svc.stop_speech_recognition().await;

    assert_eq!(request.await.unwrap(), Ok("open the door".to_string()));
    assert_eq!(factory.calls().stopped, 1);
}

#[tokio::test(start_paused = true)]
async fn next_request_waits_for_cooldown() {
    let factory = Arc::new(
        ScriptedEngineFactory::new()
            .with_script(Script::new().ready().final_results(&["one"]))
            .with_script(Script::new().ready().final_results(&["two"])),
    );
    let svc = spawn_service(&factory);

    assert_eq!(svc.start_speech_recognition().await.unwrap(), "one");
    let started = Instant::now();
    assert_eq!(svc.start_speech_recognition().await.unwrap(), "two");
    assert!(started.elapsed() >= Duration::from_millis(500));

    let calls = factory.calls();
    assert_eq!(calls.created, 2);
    assert_eq!(calls.disposed, 1);
}

#[tokio::test(start_paused = true)]
async fn first_request_does_not_wait_for_cooldown() {
    let factory = Arc::new(
        ScriptedEngineFactory::new().with_script(Script::new().ready().final_results(&["hi"])),
    );
    let svc = spawn_service(&factory);

    let started = Instant::now();
    assert_eq!(svc.start_speech_recognition().await.unwrap(), "hi");
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn denied_permission_is_reported() {
    let factory = Arc::new(ScriptedEngineFactory::new());
    let svc = SpeechService::spawn(
        factory.clone(),
        Arc::new(StaticPermissionGate::denied()),
        SpeechSettings::default(),
    );

    let err = svc.start_speech_recognition().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PermissionDenied);
    assert_eq!(factory.calls().created, 0);
}

#[tokio::test(start_paused = true)]
async fn permission_prompt_then_grant() {
    let factory = Arc::new(
        ScriptedEngineFactory::new().with_script(Script::new().ready().final_results(&["yes"])),
    );
    let gate = Arc::new(DeferredPermissionGate::new());
    let svc = SpeechService::spawn(factory.clone(), gate.clone(), SpeechSettings::default());

    let request = {
        let svc = svc.clone();
        tokio::spawn(async move { svc.start_speech_recognition().await })
    };
    while gate.pending_prompts() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(factory.calls().created, 0);
    assert_eq!(svc.snapshot().await.unwrap().state, SessionState::Starting);

    gate.answer(true);
    assert_eq!(request.await.unwrap(), Ok("yes".to_string()));
}

#[tokio::test(start_paused = true)]
async fn permission_prompt_then_deny() {
    let factory = Arc::new(ScriptedEngineFactory::new());
    let gate = Arc::new(DeferredPermissionGate::new());
    let svc = SpeechService::spawn(factory.clone(), gate.clone(), SpeechSettings::default());

    let request = {
        let svc = svc.clone();
        tokio::spawn(async move { svc.start_speech_recognition().await })
    };
    while gate.pending_prompts() == 0 {
        tokio::task::yield_now().await;
    }
    gate.answer(false);

    let err = request.await.unwrap().unwrap_err();
    assert_eq!(err.code, ErrorCode::PermissionDenied);
    assert_eq!(factory.calls().created, 0);
    assert_eq!(svc.metrics().failures.permission, 1);
}

#[tokio::test(start_paused = true)]
async fn every_request_resolves_exactly_once() {
    let factory = Arc::new(
        ScriptedEngineFactory::new()
            .with_script(
                Script::new()
                    .ready()
                    .partial("a")
                    .wait_ms(6000)
                    .final_results(&["late"]),
            )
            .with_script(Script::new().ready().error(EngineErrorCode::NoMatch))
            .with_script(Script::new().ready().final_results(&["c"])),
    );
    let svc = spawn_service(&factory);

    assert_eq!(svc.start_speech_recognition().await.unwrap(), "a");
    assert_eq!(svc.start_speech_recognition().await.unwrap(), "");
    assert_eq!(svc.start_speech_recognition().await.unwrap(), "c");

    let m = svc.metrics();
    assert_eq!(m.requests, 3);
    let r = m.resolutions;
    assert_eq!(r.final_result + r.partial + r.empty, 3);
}

#[tokio::test(start_paused = true)]
async fn dropping_service_disposes_engine() {
    let factory = Arc::new(
        ScriptedEngineFactory::new().with_script(Script::new().ready().final_results(&["x"])),
    );
    let svc = spawn_service(&factory);
    svc.start_speech_recognition().await.unwrap();
    drop(svc);

    while factory.calls().disposed == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(factory.calls().disposed, 1);
}
