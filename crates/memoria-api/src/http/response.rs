//! Envelope response format for API responses.
//!
//! ```json
//! {
//!   "data": { ... },
//!   "meta": { "request_id": "...", "timestamp": "...", "response_time_ms": 5 },
//!   "errors": []
//! }
//! ```

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;

/// Envelope wrapping every API payload.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    pub meta: ApiMeta,

    /// Empty on success.
    pub errors: Vec<ApiErrorDetail>,

    #[serde(rename = "_links", skip_serializing_if = "HashMap::is_empty")]
    pub links: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct ApiMeta {
    pub request_id: String,
    pub timestamp: String,
    pub response_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    pub message: String,
}

impl ApiMeta {
    fn now(request_id: String, response_time_ms: u64) -> Self {
        Self {
            request_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            response_time_ms,
        }
    }
}

/// Request id and start time for one handler invocation.
pub struct RequestTimer {
    pub request_id: String,
    start: Instant,
}

impl RequestTimer {
    pub fn start() -> Self {
        Self {
            request_id: uuid::Uuid::now_v7().to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Wrap `data` in a success envelope.
    pub fn success<T: Serialize>(self, data: T) -> ApiResponse<T> {
        let elapsed = self.elapsed_ms();
        ApiResponse::success(data, self.request_id, elapsed)
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, request_id: String, response_time_ms: u64) -> Self {
        Self {
            data: Some(data),
            meta: ApiMeta::now(request_id, response_time_ms),
            errors: Vec::new(),
            links: HashMap::new(),
        }
    }

    pub fn with_link(mut self, rel: &str, href: &str) -> Self {
        self.links.insert(rel.to_string(), href.to_string());
        self
    }
}

impl ApiResponse<()> {
    pub fn error(code: &str, message: &str, request_id: String) -> Self {
        Self {
            data: None,
            meta: ApiMeta::now(request_id, 0),
            errors: vec![ApiErrorDetail {
                code: code.to_string(),
                message: message.to_string(),
            }],
            links: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_has_data_and_empty_errors() {
        let resp = RequestTimer::start()
            .success(serde_json::json!({"id": "abc"}))
            .with_link("self", "/api/v1/memories");
        let value = serde_json::to_value(&resp).unwrap();

        assert_eq!(value["data"]["id"], "abc");
        assert_eq!(value["errors"], serde_json::json!([]));
        assert_eq!(value["_links"]["self"], "/api/v1/memories");
        assert!(value["meta"]["request_id"].is_string());
    }

    #[test]
    fn error_envelope_omits_data() {
        let resp = ApiResponse::error("VALIDATION_ERROR", "query must not be empty", "r1".to_string());
        let value = serde_json::to_value(&resp).unwrap();

        assert!(value.get("data").is_none());
        assert_eq!(value["errors"][0]["code"], "VALIDATION_ERROR");
        assert_eq!(value["meta"]["request_id"], "r1");
    }
}
