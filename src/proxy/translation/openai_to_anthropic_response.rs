//! OpenAI Chat Completions response -> Anthropic Messages response.
//!
//! Covers both the buffered (non-streaming) conversion and the synthesis of
//! an Anthropic-shaped SSE event sequence from a single buffered OpenAI
//! response, for routes where the client asked for streaming but the
//! upstream only returns a single JSON body.

use super::ids::{fresh_message_id, parse_arguments};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct OpenAiChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub model: String,
    pub choices: Vec<OpenAiChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiChoice {
    pub message: OpenAiResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAiResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiResponseToolCall {
    pub id: String,
    pub function: OpenAiResponseFunctionCall,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiResponseFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct AnthropicResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub response_type: String,
    pub role: String,
    pub content: Vec<AnthropicContentBlock>,
    pub model: String,
    pub stop_reason: String,
    pub stop_sequence: Option<String>,
    pub usage: AnthropicUsage,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Serialize)]
pub struct AnthropicUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Translate a buffered OpenAI chat-completion body into an Anthropic
/// Messages response body. `original_model` is echoed back verbatim when the
/// client specified one, per the model-echo rule.
pub fn translate(body: &[u8], original_model: Option<&str>) -> Result<Vec<u8>> {
    let resp: OpenAiChatResponse =
        serde_json::from_slice(body).context("parsing openai response")?;
    let anthropic = convert(resp, original_model);
    serde_json::to_vec(&anthropic).context("serializing anthropic response")
}

fn convert(resp: OpenAiChatResponse, original_model: Option<&str>) -> AnthropicResponse {
    let choice = resp.choices.into_iter().next();
    let mut content = Vec::new();

    if let Some(choice) = &choice {
        if let Some(text) = &choice.message.content {
            if !text.is_empty() {
                content.push(AnthropicContentBlock::Text { text: text.clone() });
            }
        }
        if let Some(tool_calls) = &choice.message.tool_calls {
            for call in tool_calls {
                content.push(AnthropicContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    input: parse_arguments(&call.function.arguments),
                });
            }
        }
    }

    let stop_reason = convert_finish_reason(choice.as_ref().and_then(|c| c.finish_reason.as_deref()));
    let id = resp
        .id
        .map(|id| format!("msg_{}", id.strip_prefix("chatcmpl-").unwrap_or(&id)))
        .unwrap_or_else(fresh_message_id);

    let usage = resp.usage.unwrap_or_default();

    AnthropicResponse {
        id,
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: original_model.map(str::to_string).unwrap_or(resp.model),
        stop_reason,
        stop_sequence: None,
        usage: AnthropicUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        },
    }
}

fn convert_finish_reason(reason: Option<&str>) -> String {
    match reason {
        Some("stop") => "end_turn",
        Some("length") => "max_tokens",
        Some("tool_calls") => "tool_use",
        Some("content_filter") => "end_turn",
        _ => "end_turn",
    }
    .to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Synthesized SSE event sequence
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessageStartEvent {
    #[serde(rename = "type")]
    event_type: &'static str,
    message: MessageStartPayload,
}

#[derive(Debug, Serialize)]
struct MessageStartPayload {
    id: String,
    #[serde(rename = "type")]
    payload_type: &'static str,
    role: &'static str,
    content: Vec<()>,
    model: String,
    stop_reason: Option<String>,
    stop_sequence: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Serialize)]
struct ContentBlockStartEvent {
    #[serde(rename = "type")]
    event_type: &'static str,
    index: usize,
    content_block: ContentBlockPayload,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentBlockPayload {
    #[serde(rename = "text")]
    Text { text: &'static str },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Serialize)]
struct ContentBlockDeltaEvent {
    #[serde(rename = "type")]
    event_type: &'static str,
    index: usize,
    delta: ContentDelta,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Serialize)]
struct ContentBlockStopEvent {
    #[serde(rename = "type")]
    event_type: &'static str,
    index: usize,
}

#[derive(Debug, Serialize)]
struct MessageDeltaEvent {
    #[serde(rename = "type")]
    event_type: &'static str,
    delta: MessageDeltaPayload,
    usage: MessageDeltaUsage,
}

#[derive(Debug, Serialize)]
struct MessageDeltaPayload {
    stop_reason: String,
    stop_sequence: Option<String>,
}

#[derive(Debug, Serialize)]
struct MessageDeltaUsage {
    output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct MessageStopEvent {
    #[serde(rename = "type")]
    event_type: &'static str,
}

fn format_sse_event(event_type: &str, data: &impl Serialize) -> Result<String> {
    let json = serde_json::to_string(data)?;
    Ok(format!("event: {event_type}\ndata: {json}\n\n"))
}

/// Synthesize a full Anthropic-shaped SSE stream from one buffered OpenAI
/// response. Used when the downstream client requested `stream: true` but
/// the matched upstream only returns a single JSON body.
pub fn synthesize_stream(body: &[u8], original_model: Option<&str>) -> Result<String> {
    let resp: OpenAiChatResponse =
        serde_json::from_slice(body).context("parsing openai response")?;
    let anthropic = convert(resp, original_model);

    let mut out = String::new();

    out.push_str(&format_sse_event(
        "message_start",
        &MessageStartEvent {
            event_type: "message_start",
            message: MessageStartPayload {
                id: anthropic.id.clone(),
                payload_type: "message",
                role: "assistant",
                content: Vec::new(),
                model: anthropic.model.clone(),
                stop_reason: None,
                stop_sequence: None,
                usage: AnthropicUsage {
                    input_tokens: anthropic.usage.input_tokens,
                    output_tokens: 0,
                },
            },
        },
    )?);

    for (index, block) in anthropic.content.iter().enumerate() {
        match block {
            AnthropicContentBlock::Text { text } => {
                out.push_str(&format_sse_event(
                    "content_block_start",
                    &ContentBlockStartEvent {
                        event_type: "content_block_start",
                        index,
                        content_block: ContentBlockPayload::Text { text: "" },
                    },
                )?);
                out.push_str(&format_sse_event(
                    "content_block_delta",
                    &ContentBlockDeltaEvent {
                        event_type: "content_block_delta",
                        index,
                        delta: ContentDelta::TextDelta { text: text.clone() },
                    },
                )?);
            }
            AnthropicContentBlock::ToolUse { id, name, input } => {
                out.push_str(&format_sse_event(
                    "content_block_start",
                    &ContentBlockStartEvent {
                        event_type: "content_block_start",
                        index,
                        content_block: ContentBlockPayload::ToolUse {
                            id: id.clone(),
                            name: name.clone(),
                            input: serde_json::json!({}),
                        },
                    },
                )?);
                out.push_str(&format_sse_event(
                    "content_block_delta",
                    &ContentBlockDeltaEvent {
                        event_type: "content_block_delta",
                        index,
                        delta: ContentDelta::InputJsonDelta {
                            partial_json: serde_json::to_string(input).unwrap_or_default(),
                        },
                    },
                )?);
            }
        }
        out.push_str(&format_sse_event(
            "content_block_stop",
            &ContentBlockStopEvent {
                event_type: "content_block_stop",
                index,
            },
        )?);
    }

    out.push_str(&format_sse_event(
        "message_delta",
        &MessageDeltaEvent {
            event_type: "message_delta",
            delta: MessageDeltaPayload {
                stop_reason: anthropic.stop_reason.clone(),
                stop_sequence: None,
            },
            usage: MessageDeltaUsage {
                output_tokens: anthropic.usage.output_tokens,
            },
        },
    )?);

    out.push_str(&format_sse_event(
        "message_stop",
        &MessageStopEvent {
            event_type: "message_stop",
        },
    )?);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_plain_text_response() {
        let body = br#"{
            "id": "chatcmpl-abc",
            "model": "gpt-x",
            "choices": [{"message": {"content": "hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1}
        }"#;
        let out = translate(body, None).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["id"], "msg_abc");
        assert_eq!(v["content"][0]["text"], "hello");
        assert_eq!(v["stop_reason"], "end_turn");
        assert_eq!(v["usage"]["input_tokens"], 3);
    }

    #[test]
    fn echoes_original_model_when_present() {
        let body = br#"{
            "model": "gpt-x",
            "choices": [{"message": {"content": "hi"}, "finish_reason": "stop"}]
        }"#;
        let out = translate(body, Some("claude-x")).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["model"], "claude-x");
    }

    #[test]
    fn tool_calls_parse_into_tool_use_blocks() {
        let body = br#"{
            "model": "gpt-x",
            "choices": [{
                "message": {"tool_calls": [{"id": "call_1", "function": {"name": "run", "arguments": "{\"cmd\":\"ls\"}"}}]},
                "finish_reason": "tool_calls"
            }]
        }"#;
        let out = translate(body, None).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["content"][0]["type"], "tool_use");
        assert_eq!(v["content"][0]["input"]["cmd"], "ls");
        assert_eq!(v["stop_reason"], "tool_use");
    }

    #[test]
    fn malformed_arguments_wrap_as_value() {
        let body = br#"{
            "model": "gpt-x",
            "choices": [{
                "message": {"tool_calls": [{"id": "call_1", "function": {"name": "run", "arguments": "not json"}}]},
                "finish_reason": "tool_calls"
            }]
        }"#;
        let out = translate(body, None).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["content"][0]["input"]["value"], "not json");
    }

    #[test]
    fn synthesized_stream_has_full_event_sequence() {
        let body = br#"{
            "model": "gpt-x",
            "choices": [{"message": {"content": "hi"}, "finish_reason": "stop"}]
        }"#;
        let out = synthesize_stream(body, None).unwrap();
        assert!(out.contains("event: message_start"));
        assert!(out.contains("event: content_block_start"));
        assert!(out.contains("event: content_block_delta"));
        assert!(out.contains("event: content_block_stop"));
        assert!(out.contains("event: message_delta"));
        assert!(out.contains("event: message_stop"));
    }

    #[test]
    fn synthesized_stream_tool_use_has_empty_start_and_input_json_delta() {
        let body = br#"{
            "model": "gpt-x",
            "choices": [{
                "message": {"tool_calls": [{"id": "call_1", "function": {"name": "run", "arguments": "{\"cmd\":\"ls\"}"}}]},
                "finish_reason": "tool_calls"
            }]
        }"#;
        let out = synthesize_stream(body, None).unwrap();
        let start_idx = out.find("event: content_block_start").unwrap();
        let delta_idx = out.find("event: content_block_delta").unwrap();
        assert!(start_idx < delta_idx);

        let start_line = out[start_idx..].lines().nth(1).unwrap();
        assert!(start_line.contains("\"input\":{}"));

        let delta_line = out[delta_idx..].lines().nth(1).unwrap();
        assert!(delta_line.contains("input_json_delta"));
        assert!(delta_line.contains("\\\"cmd\\\":\\\"ls\\\""));
    }
}
