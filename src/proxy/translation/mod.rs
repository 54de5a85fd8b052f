//! Bidirectional Anthropic <-> OpenAI protocol translation.
//!
//! Each direction is a pure function over request/response bodies: parse the
//! source shape, build the target shape, serialize. No shared state, no
//! trait objects — the Runtime picks the right function by comparing the
//! inbound protocol against the matched route's upstream protocol.

pub mod anthropic_to_openai_request;
pub mod anthropic_to_openai_response;
mod ids;
pub mod openai_to_anthropic_request;
pub mod openai_to_anthropic_response;

pub use ids::{dedup_id, fresh_call_id, fresh_message_id, fresh_tool_use_id};
