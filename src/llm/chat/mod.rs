pub mod openai;

use async_trait::async_trait;
use log::info;
use serde::{ Deserialize, Serialize };
use std::sync::Arc;

use self::openai::OpenAIChatClient;
use super::LlmConfig;
use crate::error::ServiceError;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<CompletionResponse, ServiceError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn new_client(config: &LlmConfig) -> Result<Option<Arc<dyn ChatClient>>, ServiceError> {
    let has_key = config.api_key.as_deref().map_or(false, |k| !k.trim().is_empty());
    if config.llm_type.requires_api_key() && !has_key {
        info!("No API key for {} chat provider; assistant runs in demo mode", config.llm_type);
        return Ok(None);
    }

    let client: Arc<dyn ChatClient> = Arc::new(OpenAIChatClient::from_config(config)?);
    Ok(Some(client))
}
