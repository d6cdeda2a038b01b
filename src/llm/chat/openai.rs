use async_trait::async_trait;
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::time::Duration;

use super::{ ChatClient, ChatMessage, CompletionResponse };
use crate::error::ServiceError;
use crate::llm::LlmConfig;

pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
    temperature: f32,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

impl OpenAIChatClient {
    pub fn new(
        api_key: Option<String>,
        model: String,
        base_url: String,
        temperature: f32,
        timeout: Duration
    ) -> Result<Self, ServiceError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", key.trim())).map_err(|e|
                ServiceError::Transport(format!("Invalid API key format: {}", e))
            )?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { http, model, base_url, temperature })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ServiceError> {
        let model = config.completion_model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| config.llm_type.default_model().to_string());
        let base_url = config.base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| config.llm_type.default_base_url().to_string());

        Self::new(
            config.api_key.clone(),
            model,
            base_url,
            config.temperature,
            Duration::from_secs(config.request_timeout_secs)
        )
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<CompletionResponse, ServiceError> {
        let req = OpenAIChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };
        debug!("Chat completion request: model={}, messages={}", self.model, messages.len());

        let resp = self.http.post(&self.base_url).json(&req).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            warn!("Chat provider answered {}: {}", status, body);
            return Err(ServiceError::Rejected { status: status.as_u16(), body });
        }

        let parsed: OpenAIResponse = serde_json
            ::from_str(&body)
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;

        let content = parsed.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ServiceError::MalformedResponse("missing choices[0].message.content".to_string())
            })?;

        Ok(CompletionResponse { response: content })
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
