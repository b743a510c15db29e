pub mod engine;
pub mod error;
pub mod permission;
pub mod session;
pub mod settings;

mod serde_tests;
