//! Proxy Runtime: the HTTP handlers that accept Anthropic/OpenAI chat
//! requests, select a route, translate across protocols when needed, call
//! the matched upstream, and log a query/answer trajectory pair for every
//! request that reaches here.

pub mod error;
pub mod reasoning_cache;
pub mod server;
pub mod sessions;
pub mod sse;
pub mod state;
pub mod translation;

use std::time::Duration;

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::routing::{Route, UpstreamProtocol};
use crate::events;
use error::ProxyError;
use state::AppState;
use translation::{
    anthropic_to_openai_request, anthropic_to_openai_response, openai_to_anthropic_request,
    openai_to_anthropic_response,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

// ─────────────────────────────────────────────────────────────────────────────
// Token extraction and header masking
// ─────────────────────────────────────────────────────────────────────────────

/// `Authorization: Bearer …` > `x-api-key` > `body.session_token` > `"anonymous"`.
fn extract_token(headers: &HeaderMap, body: &Value) -> String {
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            return token.to_string();
        }
    }
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return key.to_string();
    }
    if let Some(token) = body.get("session_token").and_then(|v| v.as_str()) {
        return token.to_string();
    }
    "anonymous".to_string()
}

const SENSITIVE_HEADERS: [&str; 3] = ["authorization", "x-api-key", "api-key"];

/// Masked snapshot of inbound headers, safe to persist or log.
fn masked_headers(headers: &HeaderMap) -> Value {
    let mut map = serde_json::Map::new();
    for (name, value) in headers.iter() {
        let name = name.as_str();
        let rendered = if SENSITIVE_HEADERS.contains(&name) {
            "***".to_string()
        } else {
            value.to_str().unwrap_or("").to_string()
        };
        map.insert(name.to_string(), json!(rendered));
    }
    Value::Object(map)
}

// ─────────────────────────────────────────────────────────────────────────────
// Reasoning cache glue (operates on raw JSON, not the typed translation models,
// since it mutates request bodies in flight rather than transforming shape)
// ─────────────────────────────────────────────────────────────────────────────

/// Fill `reasoning_content` on outgoing assistant/tool_calls messages that are
/// missing it, using the cache bound to this token.
fn inject_reasoning(cache: &reasoning_cache::ReasoningCache, token: &str, body: &mut Value) {
    let Some(messages) = body.get_mut("messages").and_then(|m| m.as_array_mut()) else {
        return;
    };
    for message in messages.iter_mut() {
        let Some(obj) = message.as_object_mut() else {
            continue;
        };
        if obj.get("role").and_then(|r| r.as_str()) != Some("assistant") {
            continue;
        }
        if obj.contains_key("reasoning_content") {
            continue;
        }
        let first_id = obj
            .get("tool_calls")
            .and_then(|t| t.as_array())
            .and_then(|calls| calls.first())
            .and_then(|call| call.get("id"))
            .and_then(|id| id.as_str());
        let Some(first_id) = first_id else { continue };
        if let Some(reasoning) = cache.lookup(token, first_id) {
            obj.insert("reasoning_content".to_string(), json!(reasoning));
        }
    }
}

/// Bind a fresh upstream OpenAI response's `reasoning_content` to the
/// tool-call ids it accompanied.
fn remember_reasoning(cache: &reasoning_cache::ReasoningCache, token: &str, body: &[u8]) {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return;
    };
    let Some(message) = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
    else {
        return;
    };
    let Some(reasoning) = message.get("reasoning_content").and_then(|r| r.as_str()) else {
        return;
    };
    let ids: Vec<String> = message
        .get("tool_calls")
        .and_then(|t| t.as_array())
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| c.get("id").and_then(|i| i.as_str()).map(String::from))
                .collect()
        })
        .unwrap_or_default();
    if ids.is_empty() {
        return;
    }
    cache.remember(token, reasoning, &ids);
}

// ─────────────────────────────────────────────────────────────────────────────
// Control endpoints
// ─────────────────────────────────────────────────────────────────────────────

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "routes": state.routes.len() }))
}

pub async fn list_routes(State(state): State<AppState>) -> impl IntoResponse {
    let routes: Vec<Value> = state
        .routes
        .iter()
        .map(|r| {
            json!({
                "name": r.name,
                "request_model": r.request_model,
                "upstream_provider": r.upstream_protocol.as_str(),
                "upstream_base_url": r.upstream_base_url,
                "upstream_model": r.upstream_model,
            })
        })
        .collect();
    Json(json!({ "routes": routes }))
}

pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "sessions": state.sessions.snapshot() }))
}

#[derive(Deserialize)]
pub struct RegisterSessionRequest {
    token: String,
    sandbox_id: Option<String>,
    task_name: Option<String>,
}

pub async fn register_session(
    State(state): State<AppState>,
    Json(req): Json<RegisterSessionRequest>,
) -> Result<impl IntoResponse, ProxyError> {
    if req.token.trim().is_empty() {
        return Err(ProxyError::BadRequest("token must not be empty".to_string()));
    }
    let meta = state
        .sessions
        .register(&req.token, req.sandbox_id, req.task_name);
    let _ = state
        .trajectory
        .append(&req.token, events::SESSION_REGISTERED, json!(meta));
    Ok(Json(json!(meta)))
}

#[derive(Deserialize)]
pub struct SessionEventRequest {
    token: String,
    event_type: String,
    #[serde(default)]
    payload: Value,
}

pub async fn session_event(
    State(state): State<AppState>,
    Json(req): Json<SessionEventRequest>,
) -> Result<impl IntoResponse, ProxyError> {
    if req.token.trim().is_empty() || req.event_type.trim().is_empty() {
        return Err(ProxyError::BadRequest(
            "token and event_type must not be empty".to_string(),
        ));
    }
    state.sessions.touch(&req.token);
    state
        .trajectory
        .append(&req.token, &req.event_type, req.payload)
        .map_err(|e| ProxyError::InvalidProxyResponse(e.to_string()))?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn not_found() -> impl IntoResponse {
    (
        axum::http::StatusCode::NOT_FOUND,
        Json(json!({ "error": "not_found" })),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat endpoints
// ─────────────────────────────────────────────────────────────────────────────

pub async fn anthropic_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, ProxyError> {
    dispatch(state, UpstreamProtocol::Anthropic, headers, body).await
}

pub async fn openai_chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, ProxyError> {
    dispatch(state, UpstreamProtocol::Openai, headers, body).await
}

/// Single state machine driving both `/v1/messages` and `/v1/chat/completions`,
/// since the two directions are symmetric: only which translation functions
/// (if any) apply differs, keyed by comparing `downstream_protocol` against
/// the matched route's `upstream_protocol`.
async fn dispatch(
    state: AppState,
    downstream_protocol: UpstreamProtocol,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, ProxyError> {
    let inbound: Value = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::BadRequest(format!("invalid JSON body: {e}")))?;

    let requested_model = inbound
        .get("model")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProxyError::BadRequest("missing model".to_string()))?
        .to_string();
    let downstream_stream = inbound
        .get("stream")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let token = extract_token(&headers, &inbound);
    state.sessions.touch(&token);

    let request_event = match downstream_protocol {
        UpstreamProtocol::Anthropic => events::ANTHROPIC_REQUEST,
        UpstreamProtocol::Openai => events::OPENAI_REQUEST,
    };
    let _ = state.trajectory.append(
        &token,
        request_event,
        json!({ "model": requested_model, "headers": masked_headers(&headers) }),
    );

    let Some(route) = state.routes.match_model(&requested_model) else {
        let _ = state.trajectory.append(
            &token,
            events::ROUTE_NOT_FOUND,
            json!({ "requested_model": requested_model }),
        );
        return Err(ProxyError::RouteNotFound(format!(
            "no route for model {requested_model:?}"
        )));
    };

    let cross_protocol = downstream_protocol != route.upstream_protocol;

    let mut outgoing = if cross_protocol {
        translate_request(downstream_protocol, &body, &route.upstream_model)?
    } else {
        let mut rewritten = inbound.clone();
        if let Some(obj) = rewritten.as_object_mut() {
            obj.insert("model".to_string(), json!(route.upstream_model));
        }
        serde_json::to_vec(&rewritten)
            .map_err(|e| ProxyError::InvalidProxyResponse(e.to_string()))?
    };

    if route.upstream_protocol == UpstreamProtocol::Openai {
        if let Ok(mut value) = serde_json::from_slice::<Value>(&outgoing) {
            inject_reasoning(&state.reasoning, &token, &mut value);
            if let Ok(bytes) = serde_json::to_vec(&value) {
                outgoing = bytes;
            }
        }
    }

    let outgoing_value: Value =
        serde_json::from_slice(&outgoing).unwrap_or_else(|_| json!({ "raw": true }));
    let stem = state
        .trajectory
        .write_query(&token, outgoing_value)
        .map_err(|e| ProxyError::InvalidProxyResponse(e.to_string()))?;

    let result = call_upstream(&state, route, &outgoing).await;

    let response = match result {
        Err(err) => {
            let _ = state.trajectory.write_answer(
                &token,
                &stem,
                json!({ "upstream_status": Value::Null, "upstream_response_text": err.message_text() }),
            );
            let _ = state
                .trajectory
                .append(&token, err.event_name(), json!({ "message": err.message_text() }));
            return Err(err);
        }
        Ok(r) => r,
    };

    match response {
        UpstreamOutcome::RawSse { bytes } => {
            let _ = state.trajectory.write_answer(
                &token,
                &stem,
                json!({ "upstream_status": 200, "upstream_response_text": String::from_utf8_lossy(&bytes) }),
            );
            Ok(Response::builder()
                .status(200)
                .header("content-type", "text/event-stream")
                .header("cache-control", "no-cache")
                .body(axum::body::Body::from(bytes))
                .map_err(|e| ProxyError::InvalidProxyResponse(e.to_string()))?)
        }
        UpstreamOutcome::Json { status, bytes } => {
            if route.upstream_protocol == UpstreamProtocol::Openai {
                remember_reasoning(&state.reasoning, &token, &bytes);
            }

            if !cross_protocol {
                let parsed: Value =
                    serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({ "raw": true }));
                let _ = state.trajectory.write_answer(
                    &token,
                    &stem,
                    json!({ "upstream_status": status, "downstream_body": parsed }),
                );
                return Ok(Response::builder()
                    .status(status)
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(bytes))
                    .map_err(|e| ProxyError::InvalidProxyResponse(e.to_string()))?);
            }

            if downstream_stream && downstream_protocol == UpstreamProtocol::Anthropic {
                let sse = openai_to_anthropic_response::synthesize_stream(
                    &bytes,
                    Some(&requested_model),
                )
                .map_err(|e| ProxyError::InvalidUpstreamResponse(e.to_string()))?;
                let _ = state.trajectory.write_answer(
                    &token,
                    &stem,
                    json!({ "upstream_status": status, "upstream_response_text": sse }),
                );
                return Ok(Response::builder()
                    .status(200)
                    .header("content-type", "text/event-stream")
                    .header("cache-control", "no-cache")
                    .header("connection", "close")
                    .body(axum::body::Body::from(sse))
                    .map_err(|e| ProxyError::InvalidProxyResponse(e.to_string()))?);
            }

            let translated = translate_response(downstream_protocol, &bytes, &requested_model)?;
            let parsed: Value =
                serde_json::from_slice(&translated).unwrap_or_else(|_| json!({ "raw": true }));
            let _ = state.trajectory.write_answer(
                &token,
                &stem,
                json!({ "upstream_status": status, "downstream_body": parsed }),
            );
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(axum::body::Body::from(translated))
                .map_err(|e| ProxyError::InvalidProxyResponse(e.to_string()))?)
        }
    }
}

/// Translate an inbound request from `downstream_protocol` into the opposite
/// (upstream) protocol shape.
fn translate_request(
    downstream_protocol: UpstreamProtocol,
    body: &[u8],
    upstream_model: &str,
) -> Result<Vec<u8>, ProxyError> {
    match downstream_protocol {
        UpstreamProtocol::Anthropic => anthropic_to_openai_request::translate(body, upstream_model),
        UpstreamProtocol::Openai => openai_to_anthropic_request::translate(body, upstream_model),
    }
    .map_err(|e| ProxyError::BadRequest(e.to_string()))
}

/// Translate a buffered upstream response back into `downstream_protocol`'s shape.
fn translate_response(
    downstream_protocol: UpstreamProtocol,
    body: &[u8],
    requested_model: &str,
) -> Result<Vec<u8>, ProxyError> {
    match downstream_protocol {
        UpstreamProtocol::Anthropic => {
            openai_to_anthropic_response::translate(body, Some(requested_model))
        }
        UpstreamProtocol::Openai => {
            let created = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            anthropic_to_openai_response::translate(body, Some(requested_model), created)
        }
    }
    .map_err(|e| ProxyError::InvalidUpstreamResponse(e.to_string()))
}

enum UpstreamOutcome {
    RawSse { bytes: axum::body::Bytes },
    Json { status: u16, bytes: axum::body::Bytes },
}

impl ProxyError {
    fn event_name(&self) -> &'static str {
        match self {
            ProxyError::NetworkError(_) => events::NETWORK_ERROR,
            ProxyError::UpstreamError { .. } => events::UPSTREAM_ERROR,
            ProxyError::InvalidUpstreamResponse(_) => events::INVALID_UPSTREAM_RESPONSE,
            _ => events::NETWORK_ERROR,
        }
    }

    fn message_text(&self) -> String {
        match self {
            ProxyError::BadRequest(m)
            | ProxyError::RouteNotFound(m)
            | ProxyError::InvalidUpstreamResponse(m)
            | ProxyError::NetworkError(m)
            | ProxyError::InvalidProxyResponse(m) => m.clone(),
            ProxyError::UpstreamError { body, .. } => body.clone(),
        }
    }
}

/// POST `outgoing` to the route's upstream, classifying the result per §4.5 /
/// §4.7: network failure, HTTP error status, or a success body (raw SSE or JSON).
async fn call_upstream(
    state: &AppState,
    route: &Route,
    outgoing: &[u8],
) -> Result<UpstreamOutcome, ProxyError> {
    let url = match route.upstream_protocol {
        UpstreamProtocol::Anthropic => format!("{}/v1/messages", route.upstream_base_url),
        UpstreamProtocol::Openai => format!("{}/chat/completions", route.upstream_base_url),
    };

    let mut request = state
        .client
        .post(&url)
        .timeout(Duration::from_secs(route.timeout_seconds))
        .header("content-type", "application/json")
        .body(outgoing.to_vec());

    request = match route.upstream_protocol {
        UpstreamProtocol::Anthropic => request
            .header("x-api-key", route.upstream_api_key.as_str())
            .header("anthropic-version", ANTHROPIC_VERSION),
        UpstreamProtocol::Openai => {
            request.header("authorization", format!("Bearer {}", route.upstream_api_key))
        }
    };

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ProxyError::NetworkError(format!("upstream request timed out: {e}"))
        } else {
            ProxyError::NetworkError(format!("upstream request failed: {e}"))
        }
    })?;

    let status = response.status();
    let response_headers = response.headers().clone();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ProxyError::NetworkError(format!("reading upstream body failed: {e}")))?;

    if status.as_u16() >= 400 {
        return Err(ProxyError::UpstreamError {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).to_string(),
        });
    }

    if sse::is_sse_response(&response_headers) {
        return Ok(UpstreamOutcome::RawSse { bytes });
    }

    if serde_json::from_slice::<Value>(&bytes).is_err() {
        return Err(ProxyError::InvalidUpstreamResponse(
            "upstream returned a non-JSON body".to_string(),
        ));
    }

    Ok(UpstreamOutcome::Json {
        status: status.as_u16(),
        bytes,
    })
}
