pub(crate) mod recognition_session;
pub mod speech_service;
