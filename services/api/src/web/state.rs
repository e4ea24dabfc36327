//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::web::source_cache::SourceThresholdCache;
use slanglab_core::domain::PlanCatalog;
use slanglab_core::ports::{DirectoryService, EvidenceService, TermCreationService};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<dyn DirectoryService>,
    pub evidence: Arc<dyn EvidenceService>,
    pub creator: Arc<dyn TermCreationService>,
    pub config: Arc<Config>,
    /// Plan limits loaded from the store at startup. A missing plan row is
    /// logged there and resolves to fully locked limits.
    pub catalog: Arc<PlanCatalog>,
    /// Cached minimum enabled-source score threshold.
    pub thresholds: Arc<SourceThresholdCache>,
}
