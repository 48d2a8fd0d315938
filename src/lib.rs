// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod compare;
pub mod config;
pub mod content;
pub mod corpus;
pub mod engine;
pub mod event_log;
pub mod hangul;
pub mod log_store;
pub mod runtime;
pub mod session;
pub mod stats;
pub mod trace_init;
pub mod typing_policy;
pub mod util;
