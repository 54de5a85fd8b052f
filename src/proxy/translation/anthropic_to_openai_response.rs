//! Anthropic Messages response -> OpenAI Chat Completions response.
//!
//! Covers buffered (non-streaming) conversion only: routes matched to an
//! Anthropic upstream but fronting an OpenAI-speaking client use this when
//! the upstream response is a single buffered JSON body.

use super::ids::stringify_arguments;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub model: String,
    #[serde(default)]
    pub content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
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
    #[serde(rename = "thinking")]
    Thinking {
        #[allow(dead_code)]
        thinking: String,
    },
}

#[derive(Debug, Default, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct OpenAiChatResponse {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub choices: Vec<OpenAiChoice>,
    pub usage: OpenAiUsage,
}

#[derive(Debug, Serialize)]
pub struct OpenAiChoice {
    pub index: u32,
    pub message: OpenAiResponseMessage,
    pub finish_reason: String,
}

#[derive(Debug, Serialize)]
pub struct OpenAiResponseMessage {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Serialize)]
pub struct OpenAiToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: &'static str,
    pub function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub struct OpenAiUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Translate a buffered Anthropic Messages response body into an OpenAI
/// chat-completion response body. `original_model` is echoed back verbatim
/// when the client specified one. `created` is supplied by the caller since
/// wall-clock timestamps cannot be generated inside this pure function.
pub fn translate(body: &[u8], original_model: Option<&str>, created: u64) -> Result<Vec<u8>> {
    let resp: AnthropicResponse =
        serde_json::from_slice(body).context("parsing anthropic response")?;

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in &resp.content {
        match block {
            AnthropicContentBlock::Text { text } => text_parts.push(text.clone()),
            AnthropicContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(OpenAiToolCall {
                    id: id.clone(),
                    call_type: "function",
                    function: OpenAiFunctionCall {
                        name: name.clone(),
                        arguments: stringify_arguments(input),
                    },
                });
            }
            AnthropicContentBlock::Thinking { .. } => {}
        }
    }

    let finish_reason = convert_stop_reason(resp.stop_reason.as_deref());
    let id = resp
        .id
        .map(|id| format!("chatcmpl-{}", id.strip_prefix("msg_").unwrap_or(&id)))
        .unwrap_or_else(|| format!("chatcmpl-{created}"));

    let usage = resp.usage.unwrap_or_default();

    let openai_response = OpenAiChatResponse {
        id,
        object: "chat.completion",
        created,
        model: original_model.map(str::to_string).unwrap_or(resp.model),
        choices: vec![OpenAiChoice {
            index: 0,
            message: OpenAiResponseMessage {
                role: "assistant",
                content: if text_parts.is_empty() {
                    None
                } else {
                    Some(text_parts.join("\n"))
                },
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
            },
            finish_reason,
        }],
        usage: OpenAiUsage {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens + usage.output_tokens,
        },
    };

    serde_json::to_vec(&openai_response).context("serializing openai response")
}

fn convert_stop_reason(reason: Option<&str>) -> String {
    match reason {
        Some("end_turn") => "stop",
        Some("max_tokens") => "length",
        Some("stop_sequence") => "stop",
        Some("tool_use") => "tool_calls",
        _ => "stop",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_plain_text_response() {
        let body = br#"{
            "id": "msg_abc",
            "model": "claude-x",
            "content": [{"type": "text", "text": "hello"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 2, "output_tokens": 1}
        }"#;
        let out = translate(body, None, 1000).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["id"], "chatcmpl-abc");
        assert_eq!(v["choices"][0]["message"]["content"], "hello");
        assert_eq!(v["choices"][0]["finish_reason"], "stop");
        assert_eq!(v["usage"]["total_tokens"], 3);
    }

    #[test]
    fn tool_use_becomes_tool_call_with_string_arguments() {
        let body = br#"{
            "model": "claude-x",
            "content": [{"type": "tool_use", "id": "toolu_1", "name": "run", "input": {"cmd": "ls"}}],
            "stop_reason": "tool_use"
        }"#;
        let out = translate(body, None, 1000).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let call = &v["choices"][0]["message"]["tool_calls"][0];
        assert_eq!(call["id"], "toolu_1");
        assert_eq!(call["function"]["arguments"], "{\"cmd\":\"ls\"}");
        assert_eq!(v["choices"][0]["finish_reason"], "tool_calls");
    }

    #[test]
    fn scalar_tool_input_is_wrapped_before_stringifying() {
        let body = br#"{
            "model": "claude-x",
            "content": [{"type": "tool_use", "id": "toolu_1", "name": "count", "input": 5}],
            "stop_reason": "tool_use"
        }"#;
        let out = translate(body, None, 1000).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let call = &v["choices"][0]["message"]["tool_calls"][0];
        assert_eq!(call["function"]["arguments"], "{\"value\":5}");
    }

    #[test]
    fn thinking_blocks_are_dropped() {
        let body = br#"{
            "model": "claude-x",
            "content": [
                {"type": "thinking", "thinking": "pondering"},
                {"type": "text", "text": "done"}
            ],
            "stop_reason": "end_turn"
        }"#;
        let out = translate(body, None, 1000).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["choices"][0]["message"]["content"], "done");
    }

    #[test]
    fn echoes_original_model_when_present() {
        let body = br#"{"model": "claude-x", "content": [{"type": "text", "text": "hi"}]}"#;
        let out = translate(body, Some("gpt-x"), 1000).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["model"], "gpt-x");
    }
}
