//! OpenAI-compatible embeddings client.
//!
//! Calls `POST {base_url}/embeddings` with `{input, model}` and reads
//! `data[].embedding`. Works against OpenAI and local servers that mirror
//! the same endpoint. The API key, when present, is held in a
//! [`SecretString`] and only exposed while building the request header.

use std::time::Duration;

use memoria_core::memory::embedder::Embedder;
use memoria_types::error::EmbeddingError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Embedder backed by an OpenAI-compatible HTTP endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
    dimension: usize,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    fn classify(&self, err: reqwest::Error) -> EmbeddingError {
        if err.is_timeout() {
            EmbeddingError::Timeout(self.timeout.as_millis() as u64)
        } else {
            EmbeddingError::Unavailable(format!("embedding request failed: {err}"))
        }
    }
}

impl std::fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbedder")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

/// Turn a parsed response into vectors in input order.
fn into_vectors(response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if response.data.len() != expected {
        return Err(EmbeddingError::Unavailable(format!(
            "expected {expected} embeddings, provider returned {}",
            response.data.len()
        )));
    }

    let mut data = response.data;
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(self.endpoint()).json(&EmbeddingRequest {
            input: texts,
            model: &self.model,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => EmbeddingError::RateLimited,
                _ => EmbeddingError::Unavailable(format!("HTTP {status}: {body}")),
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Unavailable(format!("invalid embeddings response: {e}")))?;

        tracing::debug!(model = %self.model, count = texts.len(), "embeddings received");
        into_vectors(parsed, texts.len())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_has_openai_shape() {
        let input = vec!["hello".to_string()];
        let body = serde_json::to_value(EmbeddingRequest {
            input: &input,
            model: "text-embedding-3-small",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"input": ["hello"], "model": "text-embedding-3-small"})
        );
    }

    #[test]
    fn response_vectors_follow_index_order() {
        let response: EmbeddingResponse = serde_json::from_value(serde_json::json!({
            "object": "list",
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ],
            "model": "m"
        }))
        .unwrap();

        let vectors = into_vectors(response, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn count_mismatch_is_unavailable() {
        let response: EmbeddingResponse =
            serde_json::from_value(serde_json::json!({"data": [{"embedding": [1.0]}]})).unwrap();
        assert!(matches!(
            into_vectors(response, 2),
            Err(EmbeddingError::Unavailable(_))
        ));
    }

    #[test]
    fn debug_output_hides_key() {
        let embedder = HttpEmbedder::new(
            "http://localhost:11434/v1/",
            "nomic-embed-text",
            768,
            Some(SecretString::from("sk-very-secret".to_string())),
            Duration::from_secs(1),
        )
        .unwrap();

        let debug = format!("{embedder:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert_eq!(embedder.endpoint(), "http://localhost:11434/v1/embeddings");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let embedder = HttpEmbedder::new(
            "http://127.0.0.1:1",
            "m",
            4,
            None,
            Duration::from_secs(2),
        )
        .unwrap();

        let err = embedder.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::Unavailable(_) | EmbeddingError::Timeout(_)
        ));
    }
}
