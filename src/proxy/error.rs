//! Proxy error types and HTTP response mapping.

use axum::{
    body::Body,
    http::{Response, StatusCode},
    response::IntoResponse,
};
use serde_json::json;

/// The six request-path error kinds the Runtime can surface.
#[derive(Debug)]
pub enum ProxyError {
    /// Missing or invalid `model` in the inbound body.
    BadRequest(String),
    /// No route matched the requested model.
    RouteNotFound(String),
    /// Upstream responded with an HTTP status >= 400.
    UpstreamError { status: u16, body: String },
    /// Upstream returned a non-JSON body where JSON was required.
    InvalidUpstreamResponse(String),
    /// DNS, connect, or timeout failure reaching the upstream.
    NetworkError(String),
    /// Internal mode/type mismatch; indicates a bug in the proxy itself.
    InvalidProxyResponse(String),
}

impl ProxyError {
    fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::RouteNotFound(_) => "route_not_found",
            Self::UpstreamError { .. } => "upstream_error",
            Self::InvalidUpstreamResponse(_) => "invalid_upstream_response",
            Self::NetworkError(_) => "network_error",
            Self::InvalidProxyResponse(_) => "invalid_proxy_response",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RouteNotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamError { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::InvalidUpstreamResponse(_) => StatusCode::BAD_GATEWAY,
            Self::NetworkError(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidProxyResponse(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest(m)
            | Self::RouteNotFound(m)
            | Self::InvalidUpstreamResponse(m)
            | Self::NetworkError(m)
            | Self::InvalidProxyResponse(m) => m.clone(),
            Self::UpstreamError { body, .. } => body.clone(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response<Body> {
        let status = self.status();
        let kind = self.kind();
        let message = self.message();

        tracing::error!(kind, %status, "proxy error: {}", message);

        let body = json!({
            "type": "error",
            "error": { "type": kind, "message": message },
        });

        Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap_or_else(|_| Response::new(Body::from("internal error building error response")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_maps_to_400() {
        let err = ProxyError::BadRequest("missing model".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "bad_request");
    }

    #[test]
    fn route_not_found_maps_to_404() {
        let err = ProxyError::RouteNotFound("no route".to_string());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn network_error_maps_to_502() {
        let err = ProxyError::NetworkError("connect timed out".to_string());
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn invalid_proxy_response_maps_to_500() {
        let err = ProxyError::InvalidProxyResponse("bug".to_string());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
