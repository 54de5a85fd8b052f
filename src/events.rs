//! Lifecycle event vocabulary recorded to the trajectory store.
//!
//! These are the event-name strings passed to `storage::TrajectoryStore::append`.
//! Centralizing the known names here keeps the Runtime's call sites honest.

/// A session was registered or updated via `/sessions/register`.
pub const SESSION_REGISTERED: &str = "session_registered";

/// An inbound Anthropic Messages request was accepted.
pub const ANTHROPIC_REQUEST: &str = "anthropic_request";

/// An inbound OpenAI Chat Completions request was accepted.
pub const OPENAI_REQUEST: &str = "openai_request";

/// Route lookup missed for the requested model.
pub const ROUTE_NOT_FOUND: &str = "route_not_found";

/// The upstream responded with an HTTP error status.
pub const UPSTREAM_ERROR: &str = "upstream_error";

/// The upstream could not be reached (DNS, connect, or timeout).
pub const NETWORK_ERROR: &str = "network_error";

/// The upstream responded with a non-JSON body where JSON was required.
pub const INVALID_UPSTREAM_RESPONSE: &str = "invalid_upstream_response";

/// An arbitrary lifecycle event submitted via `/sessions/event`.
pub const SESSION_EVENT: &str = "session_event";
