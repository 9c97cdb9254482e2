use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ConversationService;
use crate::error::ChatError;

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, ChatError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ChatError::Service(format!(
                "Failed to list models: {}",
                response.status()
            )));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        Ok(models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect())
    }
}

#[async_trait]
impl ConversationService for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<Option<String>, ChatError> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        debug!(model = %self.model, "Sending prompt to Ollama");

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(ChatError::Service(format!(
                "Ollama request failed with status: {}. Make sure Ollama is running with: ollama serve",
                response.status()
            )));
        }

        let ollama_response: OllamaResponse = response.json().await?;
        if ollama_response.response.is_empty() {
            Ok(None)
        } else {
            Ok(Some(ollama_response.response))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_response_field_parses_as_empty() {
        let parsed: OllamaResponse = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert!(parsed.response.is_empty());
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = OllamaClient::new("http://localhost:11434/", "llama3.2", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_service_error() {
        // Port 9 (discard) is never an Ollama server.
        let client = OllamaClient::new("http://127.0.0.1:9", "llama3.2", Duration::from_secs(2)).unwrap();
        let result = client.generate("hi").await;
        assert!(matches!(result, Err(ChatError::Service(_))));
    }
}
