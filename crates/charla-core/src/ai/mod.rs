pub mod gemini;
pub mod ollama;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::ChatError;
use crate::provider::Provider;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

/// A remote model that turns one prompt into one reply.
///
/// `Ok(None)` means the call succeeded but the model produced no text.
#[async_trait]
pub trait ConversationService: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Option<String>, ChatError>;
}

/// Build the client for the configured provider.
pub fn service_from_config(config: &Config) -> Result<Arc<dyn ConversationService>, ChatError> {
    let timeout = Duration::from_secs(config.request_timeout_secs());
    let model = config.model();

    match config.provider() {
        Provider::Gemini => {
            let api_key = config.gemini_api_key().ok_or_else(|| {
                ChatError::Config(
                    "Gemini API key not configured. Set GEMINI_API_KEY or add gemini_api_key to the config file."
                        .to_string(),
                )
            })?;
            let mut client = GeminiClient::new(&api_key, &model, timeout)?;
            if let Some(base_url) = config.gemini_base_url() {
                client = client.with_base_url(&base_url);
            }
            Ok(Arc::new(client))
        }
        Provider::Ollama => Ok(Arc::new(OllamaClient::new(&config.ollama_url(), &model, timeout)?)),
    }
}
