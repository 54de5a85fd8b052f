//! Shared state handed to every HTTP handler.

use std::sync::Arc;

use crate::config::routing::RouteTable;
use crate::proxy::reasoning_cache::ReasoningCache;
use crate::proxy::sessions::SessionRegistry;
use crate::storage::TrajectoryStore;

/// Collaborators the Runtime needs for every request: an immutable route
/// table, the session/reasoning/trajectory stores (each independently
/// mutex-guarded), and the shared upstream HTTP client. Cloning is cheap —
/// everything behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub sessions: Arc<SessionRegistry>,
    pub reasoning: Arc<ReasoningCache>,
    pub trajectory: Arc<TrajectoryStore>,
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(
        routes: RouteTable,
        sessions: Arc<SessionRegistry>,
        reasoning: Arc<ReasoningCache>,
        trajectory: Arc<TrajectoryStore>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            routes: Arc::new(routes),
            sessions,
            reasoning,
            trajectory,
            client,
        }
    }
}
