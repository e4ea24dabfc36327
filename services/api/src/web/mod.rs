pub mod auth;
pub mod middleware;
pub mod monitor_task;
pub mod rest;
pub mod source_cache;
pub mod state;

// Re-export the handlers the binary wires into the router.
pub use middleware::{require_auth, resolve_principal};
pub use monitor_task::run_monitoring_pass_handler;
pub use rest::{
    access_handler, create_term_ai_handler, create_term_handler, list_sources_handler,
    lookup_handler, track_term_handler, trends_handler, upsert_source_handler,
};
