// SPDX-License-Identifier: MIT

//! OpenAI Model - chat-completions API implementation
//!
//! Works against api.openai.com as well as local OpenAI-compatible servers
//! (Ollama, LM Studio, llama.cpp) through `OPENAI_BASE_URL`.

use super::{Completion, CompletionRequest, Model};
use crate::adk::error::{ProviderError, ProviderErrorCode};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat model
pub struct OpenAIModel {
    client: Client,
    api_key: Option<String>,
    model_name: String,
    endpoint: Url,
}

impl OpenAIModel {
    /// Create a new OpenAIModel
    ///
    /// `api_key` may be omitted for local servers that do not check it.
    pub fn new(
        model_name: impl Into<String>,
        base_url: &str,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let mut base = Url::parse(base_url).map_err(|e| {
            ProviderError::new(
                ProviderErrorCode::Network,
                format!("Invalid base URL '{}': {}", base_url, e),
            )
        })?;
        // Url::join replaces the last segment unless the path ends with '/'
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let endpoint = base.join("chat/completions").map_err(|e| {
            ProviderError::new(ProviderErrorCode::Network, format!("Invalid endpoint: {}", e))
        })?;

        Ok(Self {
            client: Client::new(),
            api_key,
            model_name: model_name.into(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        json!({
            "model": request.model.as_deref().unwrap_or(&self.model_name),
            "messages": [{ "role": "user", "content": request.prompt }]
        })
    }

    /// Map an HTTP failure to a provider error code
    fn classify_status(status: StatusCode, body: &str) -> ProviderErrorCode {
        match status.as_u16() {
            401 | 403 => ProviderErrorCode::Unauthorized,
            404 => ProviderErrorCode::ModelNotFound,
            408 | 504 => ProviderErrorCode::Timeout,
            429 => ProviderErrorCode::RateLimited,
            400 | 413
                if body.contains("context_length") || body.contains("maximum context") =>
            {
                ProviderErrorCode::ContextLength
            }
            _ => ProviderErrorCode::Other,
        }
    }

    fn classify_transport(err: &reqwest::Error) -> ProviderErrorCode {
        if err.is_timeout() {
            ProviderErrorCode::Timeout
        } else if err.is_connect() || err.is_request() {
            ProviderErrorCode::Network
        } else {
            ProviderErrorCode::Other
        }
    }

    /// Pull the assistant text out of a chat-completions response
    fn parse_response(response: &serde_json::Value) -> Result<Completion, ProviderError> {
        let choice = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| ProviderError::invalid_response("No choices in completion response"))?;

        let content = choice["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::invalid_response("Completion has no text content"))?;

        Ok(Completion {
            content: content.to_string(),
        })
    }
}

#[async_trait]
impl Model for OpenAIModel {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let body = self.request_body(&request);
        log::debug!(
            "Completion request to {} ({} prompt chars)",
            self.endpoint,
            request.prompt.len()
        );

        let mut builder = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await.map_err(|e| {
            ProviderError::new(Self::classify_transport(&e), format!("Request failed: {}", e))
        })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            ProviderError::new(Self::classify_transport(&e), format!("Reading response failed: {}", e))
        })?;

        if !status.is_success() {
            log::warn!("Completion API returned {}", status);
            return Err(ProviderError::new(
                Self::classify_status(status, &text),
                format!("API error {}: {}", status.as_u16(), text),
            ));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::invalid_response(format!("Response is not JSON: {}", e)))?;
        Self::parse_response(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let model = OpenAIModel::new("gpt-4o-mini", "http://localhost:11434/v1", None).unwrap();
        assert_eq!(
            model.endpoint().as_str(),
            "http://localhost:11434/v1/chat/completions"
        );

        let model = OpenAIModel::new("gpt-4o-mini", "http://localhost:11434/v1/", None).unwrap();
        assert_eq!(
            model.endpoint().as_str(),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(OpenAIModel::new("m", "not a url", None).is_err());
    }

    #[test]
    fn test_request_body_uses_override() {
        let model = OpenAIModel::new("default-model", DEFAULT_BASE_URL, None).unwrap();
        let body = model.request_body(
            &CompletionRequest::new("hi").with_model(Some("other-model".to_string())),
        );
        assert_eq!(body["model"], "other-model");
        assert_eq!(body["messages"][0]["content"], "hi");

        let body = model.request_body(&CompletionRequest::new("hi"));
        assert_eq!(body["model"], "default-model");
    }

    #[test]
    fn test_parse_text_response() {
        let response = json!({
            "choices": [{
                "message": { "role": "assistant", "content": "Hello, how can I help?" }
            }]
        });
        let completion = OpenAIModel::parse_response(&response).unwrap();
        assert_eq!(completion.content, "Hello, how can I help?");
    }

    #[test]
    fn test_parse_response_without_choices() {
        let err = OpenAIModel::parse_response(&json!({"choices": []})).unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::InvalidResponse);
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            OpenAIModel::classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ProviderErrorCode::RateLimited
        );
        assert_eq!(
            OpenAIModel::classify_status(StatusCode::UNAUTHORIZED, ""),
            ProviderErrorCode::Unauthorized
        );
        assert_eq!(
            OpenAIModel::classify_status(
                StatusCode::BAD_REQUEST,
                r#"{"error":{"code":"context_length_exceeded"}}"#
            ),
            ProviderErrorCode::ContextLength
        );
        assert_eq!(
            OpenAIModel::classify_status(StatusCode::BAD_REQUEST, "bad"),
            ProviderErrorCode::Other
        );
    }
}
