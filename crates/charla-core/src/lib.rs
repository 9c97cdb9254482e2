pub mod ai;
pub mod config;
pub mod controller;
pub mod error;
pub mod provider;
pub mod state;
pub mod store;
pub mod voice;
pub mod worker;

// Re-export main types for convenience
pub use ai::{service_from_config, ConversationService, GeminiClient, OllamaClient};
pub use config::{Config, Theme};
pub use controller::{ChatView, Controller, ControllerEvent, EMPTY_REPLY_FALLBACK};
pub use error::ChatError;
pub use provider::Provider;
pub use state::{Message, Sender};
pub use store::{ConversationStore, SqliteStore};
pub use voice::{CommandVoiceCapture, PermissionGate, PermissionRequest, VoiceCapture};
