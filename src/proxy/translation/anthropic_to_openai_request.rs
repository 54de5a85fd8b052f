//! Anthropic Messages request -> OpenAI Chat Completions request.
//!
//! Used when a client speaks the Anthropic protocol but the matched route's
//! upstream speaks OpenAI.

use super::ids::{dedup_id, fresh_call_id, stringify_arguments};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Deserialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub messages: Vec<AnthropicMessage>,
    #[serde(default)]
    pub system: Option<SystemPrompt>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    /// Read for completeness but never forwarded: cross-protocol requests
    /// always buffer the upstream answer and, when set, synthesize a
    /// streamed response from it instead.
    #[serde(default)]
    #[allow(dead_code)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub tools: Option<Vec<AnthropicTool>>,
    #[serde(default)]
    pub tool_choice: Option<AnthropicToolChoice>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum SystemBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: AnthropicContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        id: Option<String>,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<ToolResultContent>,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ToolResultBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ToolResultBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Deserialize)]
pub struct AnthropicTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicToolChoice {
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "none")]
    None,
    #[serde(rename = "any")]
    Any,
    #[serde(rename = "tool")]
    Tool { name: String },
}

#[derive(Debug, Serialize)]
pub struct OpenAiChatRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<OpenAiToolChoice>,
}

#[derive(Debug, Serialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OpenAiToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub struct OpenAiTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
pub struct OpenAiFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OpenAiToolChoice {
    Mode(String),
    Specific {
        #[serde(rename = "type")]
        choice_type: String,
        function: ToolChoiceFunction,
    },
}

#[derive(Debug, Serialize)]
pub struct ToolChoiceFunction {
    pub name: String,
}

/// Translate an Anthropic Messages request body into an OpenAI Chat
/// Completions request body, using `upstream_model` as the outgoing model
/// name. Returns the serialized OpenAI body.
pub fn translate(body: &[u8], upstream_model: &str) -> Result<Vec<u8>> {
    let req: AnthropicRequest =
        serde_json::from_slice(body).context("parsing anthropic request")?;

    let mut messages = Vec::new();
    if let Some(system) = &req.system {
        let text = match system {
            SystemPrompt::Text(t) => t.clone(),
            SystemPrompt::Blocks(blocks) => blocks
                .iter()
                .map(|b| match b {
                    SystemBlock::Text { text } => text.as_str(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        };
        if !text.is_empty() {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: Some(text),
                tool_calls: None,
                tool_call_id: None,
            });
        }
    }

    let mut seen_ids = HashSet::new();
    for msg in &req.messages {
        messages.extend(convert_message(msg, &mut seen_ids));
    }

    let openai_request = OpenAiChatRequest {
        model: upstream_model.to_string(),
        messages,
        max_tokens: req.max_tokens,
        temperature: req.temperature,
        top_p: req.top_p,
        stop: req.stop_sequences,
        // Cross-protocol requests never stream upstream: the Runtime buffers
        // the JSON answer and, if the downstream client asked for streaming,
        // synthesizes an Anthropic-shaped SSE from it. Same-protocol
        // passthrough (which does forward `stream` verbatim) never calls
        // this function.
        stream: None,
        tools: req
            .tools
            .map(|tools| tools.into_iter().map(convert_tool).collect()),
        tool_choice: req.tool_choice.map(convert_tool_choice),
    };

    serde_json::to_vec(&openai_request).context("serializing openai request")
}

fn convert_message(msg: &AnthropicMessage, seen_ids: &mut HashSet<String>) -> Vec<OpenAiMessage> {
    match msg.role.as_str() {
        "user" => convert_user_message(msg),
        "system" => vec![convert_system_message(msg)],
        _ => vec![convert_assistant_message(msg, seen_ids)],
    }
}

/// Assistant turns collapse into a single OpenAI message: text blocks joined
/// into `content`, `tool_use` blocks become `tool_calls` entries.
fn convert_assistant_message(msg: &AnthropicMessage, seen_ids: &mut HashSet<String>) -> OpenAiMessage {
    let blocks = match &msg.content {
        AnthropicContent::Text(text) => return OpenAiMessage {
            role: msg.role.clone(),
            content: Some(text.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
        AnthropicContent::Blocks(blocks) => blocks,
    };

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text } => text_parts.push(text.clone()),
            AnthropicContentBlock::ToolUse { id, name, input } => {
                let id = dedup_id(id.clone().unwrap_or_else(fresh_call_id), seen_ids);
                tool_calls.push(OpenAiToolCall {
                    id,
                    call_type: "function".to_string(),
                    function: OpenAiFunctionCall {
                        name: name.clone(),
                        arguments: stringify_arguments(input),
                    },
                });
            }
            // Assistant turns don't carry tool_result blocks in practice; fold
            // any that show up into plain text rather than dropping them.
            AnthropicContentBlock::ToolResult { tool_use_id, .. } => {
                text_parts.push(format!("[tool_result {tool_use_id}]"));
            }
        }
    }

    OpenAiMessage {
        role: msg.role.clone(),
        content: Some(text_parts.join("\n")),
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        tool_call_id: None,
    }
}

fn convert_system_message(msg: &AnthropicMessage) -> OpenAiMessage {
    let text = match &msg.content {
        AnthropicContent::Text(text) => text.clone(),
        AnthropicContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|b| match b {
                AnthropicContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    };
    OpenAiMessage {
        role: "system".to_string(),
        content: Some(text),
        tool_calls: None,
        tool_call_id: None,
    }
}

/// User turns split the block sequence: pending text is flushed as one
/// `user` message right before each `tool_result`, which becomes its own
/// standalone `tool` message.
fn convert_user_message(msg: &AnthropicMessage) -> Vec<OpenAiMessage> {
    let blocks = match &msg.content {
        AnthropicContent::Text(text) => {
            return vec![OpenAiMessage {
                role: "user".to_string(),
                content: Some(text.clone()),
                tool_calls: None,
                tool_call_id: None,
            }]
        }
        AnthropicContent::Blocks(blocks) => blocks,
    };

    let mut out = Vec::new();
    let mut pending_text: Vec<String> = Vec::new();

    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text } => pending_text.push(text.clone()),
            AnthropicContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                flush_pending_text(&mut pending_text, &mut out);
                let mut text = content
                    .as_ref()
                    .map(|c| match c {
                        ToolResultContent::Text(t) => t.clone(),
                        ToolResultContent::Blocks(blocks) => blocks
                            .iter()
                            .map(|b| match b {
                                ToolResultBlock::Text { text } => text.as_str(),
                            })
                            .collect::<Vec<_>>()
                            .join("\n"),
                    })
                    .unwrap_or_default();
                if *is_error {
                    text = format!("[tool_error]\n{text}");
                }
                out.push(OpenAiMessage {
                    role: "tool".to_string(),
                    content: Some(text),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id.clone()),
                });
            }
            // A block without a tool_use_id (e.g. a stray tool_use in a user
            // turn) degrades to pending text rather than being dropped.
            AnthropicContentBlock::ToolUse { id, name, input } => {
                pending_text.push(
                    serde_json::json!({"tool_use": name, "id": id, "input": input}).to_string(),
                );
            }
        }
    }
    flush_pending_text(&mut pending_text, &mut out);

    if out.is_empty() {
        out.push(OpenAiMessage {
            role: "user".to_string(),
            content: Some(String::new()),
            tool_calls: None,
            tool_call_id: None,
        });
    }
    out
}

fn flush_pending_text(pending: &mut Vec<String>, out: &mut Vec<OpenAiMessage>) {
    if pending.is_empty() {
        return;
    }
    out.push(OpenAiMessage {
        role: "user".to_string(),
        content: Some(pending.join("\n")),
        tool_calls: None,
        tool_call_id: None,
    });
    pending.clear();
}

fn convert_tool(tool: AnthropicTool) -> OpenAiTool {
    OpenAiTool {
        tool_type: "function".to_string(),
        function: OpenAiFunction {
            name: tool.name,
            description: tool.description,
            parameters: tool.input_schema,
        },
    }
}

fn convert_tool_choice(choice: AnthropicToolChoice) -> OpenAiToolChoice {
    match choice {
        AnthropicToolChoice::Auto => OpenAiToolChoice::Mode("auto".to_string()),
        AnthropicToolChoice::None => OpenAiToolChoice::Mode("none".to_string()),
        AnthropicToolChoice::Any => OpenAiToolChoice::Mode("required".to_string()),
        AnthropicToolChoice::Tool { name } => OpenAiToolChoice::Specific {
            choice_type: "function".to_string(),
            function: ToolChoiceFunction { name },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_simple_text_request() {
        let body = br#"{
            "model": "claude-x",
            "max_tokens": 64,
            "messages": [{"role": "user", "content": "hi"}]
        }"#;
        let out = translate(body, "gpt-x").unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["model"], "gpt-x");
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"], "hi");
    }

    #[test]
    fn system_field_becomes_leading_message() {
        let body = br#"{
            "model": "claude-x",
            "max_tokens": 64,
            "system": "be nice",
            "messages": [{"role": "user", "content": "hi"}]
        }"#;
        let out = translate(body, "gpt-x").unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][0]["content"], "be nice");
    }

    #[test]
    fn tool_use_and_result_round_trip_ids() {
        let body = br#"{
            "model": "claude-x",
            "max_tokens": 64,
            "messages": [
                {"role": "user", "content": "run ls"},
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "toolu_1", "name": "run", "input": {"cmd": "ls"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "a\nb"}
                ]}
            ]
        }"#;
        let out = translate(body, "gpt-x").unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let tool_calls = &v["messages"][1]["tool_calls"][0];
        assert_eq!(tool_calls["id"], "toolu_1");
        assert_eq!(tool_calls["function"]["arguments"], "{\"cmd\":\"ls\"}");
        assert_eq!(v["messages"][2]["role"], "tool");
        assert_eq!(v["messages"][2]["tool_call_id"], "toolu_1");
        assert_eq!(v["messages"][2]["content"], "a\nb");
    }

    #[test]
    fn scalar_tool_input_is_wrapped_before_stringifying() {
        let body = br#"{
            "model": "claude-x",
            "max_tokens": 64,
            "messages": [
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "toolu_1", "name": "count", "input": 5}
                ]}
            ]
        }"#;
        let out = translate(body, "gpt-x").unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let arguments = v["messages"][0]["tool_calls"][0]["function"]["arguments"]
            .as_str()
            .unwrap();
        assert_eq!(arguments, "{\"value\":5}");
    }

    #[test]
    fn tool_choice_any_maps_to_required() {
        let body = br#"{
            "model": "claude-x",
            "max_tokens": 64,
            "tool_choice": {"type": "any"},
            "messages": [{"role": "user", "content": "hi"}]
        }"#;
        let out = translate(body, "gpt-x").unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["tool_choice"], "required");
    }

    #[test]
    fn stream_is_never_forwarded_upstream() {
        let body = br#"{
            "model": "claude-x",
            "max_tokens": 64,
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}]
        }"#;
        let out = translate(body, "gpt-x").unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert!(v.get("stream").is_none());
    }
}
