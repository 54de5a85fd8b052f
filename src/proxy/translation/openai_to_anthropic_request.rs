//! OpenAI Chat Completions request -> Anthropic Messages request.
//!
//! Used when a client speaks the OpenAI protocol but the matched route's
//! upstream speaks Anthropic.

use super::ids::{dedup_id, fresh_tool_use_id};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Deserialize)]
pub struct OpenAiChatRequest {
    #[allow(dead_code)]
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub max_completion_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stop: Option<StopSequences>,
    /// Read for completeness but never forwarded: cross-protocol requests
    /// always buffer the upstream answer and, when set, synthesize a
    /// streamed response from it instead.
    #[serde(default)]
    #[allow(dead_code)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub tools: Option<Vec<OpenAiTool>>,
    #[serde(default)]
    pub tool_choice: Option<OpenAiToolChoice>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<OpenAiContent>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum OpenAiContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiToolCall {
    #[serde(default)]
    pub id: Option<String>,
    pub function: OpenAiFunctionCall,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiTool {
    pub function: OpenAiFunction,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiFunction {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OpenAiToolChoice {
    Mode(String),
    Specific {
        function: ToolChoiceFunction,
    },
}

#[derive(Debug, Deserialize)]
pub struct ToolChoiceFunction {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<AnthropicToolChoice>,
}

#[derive(Debug, Serialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { source: ImageSource },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: &'static str,
    pub media_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct AnthropicTool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum AnthropicToolChoice {
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "any")]
    Any,
    #[serde(rename = "tool")]
    Tool { name: String },
}

const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Translate an OpenAI chat-completions request body into an Anthropic
/// Messages request body, using `upstream_model` as the outgoing model name.
pub fn translate(body: &[u8], upstream_model: &str) -> Result<Vec<u8>> {
    let req: OpenAiChatRequest = serde_json::from_slice(body).context("parsing openai request")?;

    let mut system_parts = Vec::new();
    let mut messages = Vec::new();
    let mut seen_ids = HashSet::new();

    for msg in req.messages {
        if msg.role == "system" {
            if let Some(OpenAiContent::Text(text)) = msg.content {
                system_parts.push(text);
            }
            continue;
        }
        messages.push(convert_message(msg, &mut seen_ids));
    }

    let anthropic_request = AnthropicRequest {
        model: upstream_model.to_string(),
        messages,
        system: if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n"))
        },
        max_tokens: req
            .max_tokens
            .or(req.max_completion_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS),
        temperature: req.temperature,
        top_p: req.top_p,
        stop_sequences: req.stop.map(|s| match s {
            StopSequences::One(s) => vec![s],
            StopSequences::Many(v) => v,
        }),
        // Cross-protocol requests never stream upstream: the Runtime buffers
        // the JSON answer and, if the downstream client asked for streaming,
        // synthesizes a response from it. Same-protocol passthrough (which
        // does forward `stream` verbatim) never calls this function.
        stream: None,
        tools: req
            .tools
            .map(|tools| tools.into_iter().map(convert_tool).collect()),
        tool_choice: req.tool_choice.map(convert_tool_choice),
    };

    serde_json::to_vec(&anthropic_request).context("serializing anthropic request")
}

fn convert_message(msg: OpenAiMessage, seen_ids: &mut HashSet<String>) -> AnthropicMessage {
    if msg.role == "tool" {
        let tool_use_id = msg.tool_call_id.unwrap_or_default();
        let text = match msg.content {
            Some(OpenAiContent::Text(t)) => t,
            Some(OpenAiContent::Parts(parts)) => parts
                .into_iter()
                .filter_map(|p| match p {
                    OpenAiContentPart::Text { text } => Some(text),
                    OpenAiContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        };
        return AnthropicMessage {
            role: "user".to_string(),
            content: vec![AnthropicContentBlock::ToolResult {
                tool_use_id,
                content: text,
            }],
        };
    }

    let mut blocks = Vec::new();

    match msg.content {
        Some(OpenAiContent::Text(text)) => {
            if !text.is_empty() {
                blocks.push(AnthropicContentBlock::Text { text });
            }
        }
        Some(OpenAiContent::Parts(parts)) => {
            for part in parts {
                match part {
                    OpenAiContentPart::Text { text } => blocks.push(AnthropicContentBlock::Text { text }),
                    OpenAiContentPart::ImageUrl { image_url } => {
                        if let Some((media_type, data)) = parse_data_url(&image_url.url) {
                            blocks.push(AnthropicContentBlock::Image {
                                source: ImageSource {
                                    source_type: "base64",
                                    media_type,
                                    data,
                                },
                            });
                        }
                    }
                }
            }
        }
        None => {}
    }

    if let Some(tool_calls) = msg.tool_calls {
        for call in tool_calls {
            let id = dedup_id(call.id.unwrap_or_else(fresh_tool_use_id), seen_ids);
            blocks.push(AnthropicContentBlock::ToolUse {
                id,
                name: call.function.name,
                input: super::ids::parse_arguments(&call.function.arguments),
            });
        }
    }

    if blocks.is_empty() {
        blocks.push(AnthropicContentBlock::Text {
            text: String::new(),
        });
    }

    AnthropicMessage {
        role: msg.role,
        content: blocks,
    }
}

fn parse_data_url(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("data:")?;
    let (media_type, data) = rest.split_once(";base64,")?;
    Some((media_type.to_string(), data.to_string()))
}

fn convert_tool(tool: OpenAiTool) -> AnthropicTool {
    AnthropicTool {
        name: tool.function.name,
        description: tool.function.description,
        input_schema: tool.function.parameters,
    }
}

fn convert_tool_choice(choice: OpenAiToolChoice) -> AnthropicToolChoice {
    match choice {
        OpenAiToolChoice::Mode(mode) if mode == "required" => AnthropicToolChoice::Any,
        OpenAiToolChoice::Mode(_) => AnthropicToolChoice::Auto,
        OpenAiToolChoice::Specific { function } => AnthropicToolChoice::Tool {
            name: function.name,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_becomes_system_field() {
        let body = br#"{
            "model": "gpt-x",
            "messages": [
                {"role": "system", "content": "be nice"},
                {"role": "user", "content": "hi"}
            ]
        }"#;
        let out = translate(body, "claude-x").unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["system"], "be nice");
        assert_eq!(v["messages"][0]["role"], "user");
    }

    #[test]
    fn tool_message_becomes_tool_result_block() {
        let body = br#"{
            "model": "gpt-x",
            "messages": [
                {"role": "tool", "tool_call_id": "call_1", "content": "42"}
            ]
        }"#;
        let out = translate(body, "claude-x").unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"][0]["type"], "tool_result");
        assert_eq!(v["messages"][0]["content"][0]["tool_use_id"], "call_1");
    }

    #[test]
    fn missing_max_tokens_defaults() {
        let body = br#"{"model": "gpt-x", "messages": [{"role": "user", "content": "hi"}]}"#;
        let out = translate(body, "claude-x").unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn max_completion_tokens_is_used_when_max_tokens_absent() {
        let body = br#"{
            "model": "gpt-x",
            "max_completion_tokens": 2048,
            "messages": [{"role": "user", "content": "hi"}]
        }"#;
        let out = translate(body, "claude-x").unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["max_tokens"], 2048);
    }

    #[test]
    fn tool_choice_required_maps_to_any() {
        let body = br#"{
            "model": "gpt-x",
            "tool_choice": "required",
            "messages": [{"role": "user", "content": "hi"}]
        }"#;
        let out = translate(body, "claude-x").unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["tool_choice"]["type"], "any");
    }

    #[test]
    fn stream_is_never_forwarded_upstream() {
        let body = br#"{
            "model": "gpt-x",
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}]
        }"#;
        let out = translate(body, "claude-x").unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert!(v.get("stream").is_none());
    }
}
