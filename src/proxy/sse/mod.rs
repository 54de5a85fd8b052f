//! SSE detection helper for the raw-passthrough decision.
//!
//! The Runtime only needs to know whether an upstream response is itself an
//! SSE stream (so it can copy the byte stream unchanged) or a single JSON
//! body (so it can translate or synthesize a stream from it). Anything more
//! than that — line-level event parsing — lives in `translation`, where the
//! synthesized stream is actually built.

/// Check if a response is SSE based on its content-type header.
pub fn is_sse_response(headers: &reqwest::header::HeaderMap) -> bool {
    headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("text/event-stream"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn detects_event_stream_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("text/event-stream; charset=utf-8"),
        );
        assert!(is_sse_response(&headers));
    }

    #[test]
    fn rejects_json_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/json"),
        );
        assert!(!is_sse_response(&headers));
    }

    #[test]
    fn missing_content_type_is_not_sse() {
        assert!(!is_sse_response(&HeaderMap::new()));
    }
}
