//! Model discovery via the `/models` endpoint.
//!
//! The models URL is derived from the chat completions URL, and the
//! listing accepts both the OpenAI-compatible `{"data": [...]}` wrapper
//! and a bare JSON array.

use crate::IoClient;
use crate::api::error::{ApiError, classify_status, classify_transport};
use serde_json::Value;
use tracing::debug;

/// Known-good models returned when the live listing is unavailable.
const FALLBACK_MODELS: [&str; 3] = [
    "meta-llama/Llama-3.3-70B-Instruct",
    "meta-llama/Llama-3.1-405B-Instruct",
    "meta-llama/Llama-3.1-70B-Instruct",
];

/// Model-id substrings preferred by [`IoClient::recommended_models`].
const PREFERRED_PATTERNS: [&str; 5] = [
    "llama-3.3-70b",
    "llama-3.1-405b",
    "llama-3.1-70b",
    "llama-3-70b",
    "mixtral-8x7b",
];

/// Derive the models endpoint URL from the chat completions URL.
fn models_url(api_url: &str) -> String {
    let base = if api_url.contains("/chat/completions") {
        api_url.replace("/chat/completions", "")
    } else {
        api_url.trim_end_matches('/').to_string()
    };
    format!("{base}/models")
}

impl IoClient {
    /// List available models.
    pub async fn list_models(&self) -> Result<Vec<Value>, ApiError> {
        let url = models_url(&self.api_url);
        debug!("listing models from {url}");

        let resp = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| classify_transport(&e, self.timeout))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| classify_transport(&e, self.timeout))?;

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &text));
        }

        let data: Value = serde_json::from_str(&text)
            .map_err(|e| ApiError::invalid_response(format!("Invalid JSON response: {e}")))?;

        match data {
            Value::Object(mut obj) => match obj.remove("data") {
                Some(Value::Array(models)) => Ok(models),
                _ => Err(ApiError::invalid_response(
                    "Unexpected models response format",
                )),
            },
            Value::Array(models) => Ok(models),
            _ => Err(ApiError::invalid_response(
                "Unexpected models response format",
            )),
        }
    }

    /// Look up a model by `id` or `name`.
    pub async fn model_info(&self, model_id: &str) -> Result<Value, ApiError> {
        let models = self.list_models().await?;
        models
            .into_iter()
            .find(|m| {
                m.get("id").and_then(Value::as_str) == Some(model_id)
                    || m.get("name").and_then(Value::as_str) == Some(model_id)
            })
            .ok_or_else(|| ApiError::invalid_response(format!("Model '{model_id}' not found")))
    }

    /// Whether a model exists and is available.
    pub async fn validate_model(&self, model_id: &str) -> bool {
        self.model_info(model_id).await.is_ok()
    }

    /// Model IDs recommended for common use cases: preferred families from
    /// the live listing, then the first few listed models, then a
    /// hard-coded fallback when the listing itself fails.
    pub async fn recommended_models(&self) -> Vec<String> {
        let Ok(models) = self.list_models().await else {
            return FALLBACK_MODELS.iter().map(|s| (*s).to_string()).collect();
        };

        let mut recommended: Vec<String> = Vec::new();
        for model in &models {
            let Some(id) = model.get("id").and_then(Value::as_str) else {
                continue;
            };
            let lower = id.to_lowercase();
            if PREFERRED_PATTERNS.iter().any(|p| lower.contains(p)) {
                recommended.push(id.to_string());
            }
        }

        if recommended.is_empty() {
            recommended = models
                .iter()
                .take(3)
                .filter_map(|m| m.get("id").and_then(Value::as_str).map(str::to_string))
                .collect();
        }

        recommended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_TIMEOUT;
    use crate::api::error::ErrorKind;
    use crate::api::retry::RetryPolicy;
    use serde_json::json;

    #[test]
    fn models_url_strips_chat_completions_suffix() {
        assert_eq!(
            models_url("https://api.example.com/v1/chat/completions"),
            "https://api.example.com/v1/models"
        );
        assert_eq!(
            models_url("https://api.example.com/v1/"),
            "https://api.example.com/v1/models"
        );
    }

    fn test_client(url: &str) -> IoClient {
        let api_url = format!("{url}/v1/chat/completions");
        IoClient::with_config("test-key", api_url, DEFAULT_TIMEOUT, RetryPolicy::with_retries(0))
            .unwrap()
    }

    #[tokio::test]
    async fn list_models_unwraps_data_field() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/models")
            .with_status(200)
            .with_body(json!({"data": [{"id": "model-a"}, {"id": "model-b"}]}).to_string())
            .create_async()
            .await;

        let models = test_client(&server.url()).list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0]["id"], "model-a");
    }

    #[tokio::test]
    async fn list_models_accepts_bare_array() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/models")
            .with_status(200)
            .with_body(json!([{"id": "model-a"}]).to_string())
            .create_async()
            .await;

        let models = test_client(&server.url()).list_models().await.unwrap();
        assert_eq!(models.len(), 1);
    }

    #[tokio::test]
    async fn list_models_rejects_unexpected_shape() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/models")
            .with_status(200)
            .with_body(json!({"models": []}).to_string())
            .create_async()
            .await;

        let err = test_client(&server.url()).list_models().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn model_info_matches_id_or_name() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/models")
            .with_status(200)
            .with_body(
                json!({"data": [{"id": "model-a", "name": "Model A"}]}).to_string(),
            )
            .expect_at_least(2)
            .create_async()
            .await;

        let client = test_client(&server.url());
        assert!(client.model_info("Model A").await.is_ok());
        let err = client.model_info("missing").await.unwrap_err();
        assert!(err.message.contains("'missing' not found"));
    }

    #[tokio::test]
    async fn recommended_models_falls_back_when_listing_fails() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/models")
            .with_status(500)
            .create_async()
            .await;

        let recommended = test_client(&server.url()).recommended_models().await;
        assert_eq!(recommended.len(), 3);
        assert!(recommended[0].contains("Llama-3.3"));
    }

    #[tokio::test]
    async fn recommended_models_prefers_known_families() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/models")
            .with_status(200)
            .with_body(
                json!({"data": [
                    {"id": "org/some-other-model"},
                    {"id": "meta-llama/Llama-3.3-70B-Instruct"},
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let recommended = test_client(&server.url()).recommended_models().await;
        assert_eq!(recommended, vec!["meta-llama/Llama-3.3-70B-Instruct"]);
    }
}
