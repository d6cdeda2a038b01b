pub mod emailjs;

use async_trait::async_trait;
use log::info;
use serde::{ Deserialize, Serialize };
use std::sync::Arc;

use self::emailjs::EmailJsSender;
use crate::error::ServiceError;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TemplateParams {
    pub user_name: String,
    pub user_email: String,
    pub message: String,
}

impl TemplateParams {
    pub fn has_blank_field(&self) -> bool {
        self.user_name.trim().is_empty() ||
            self.user_email.trim().is_empty() ||
            self.message.trim().is_empty()
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, params: &TemplateParams) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone, Default)]
pub struct EmailConfig {
    pub service_id: Option<String>,
    pub template_id: Option<String>,
    pub public_key: Option<String>,
    pub private_key: Option<String>,
    pub base_url: Option<String>,
    pub request_timeout_secs: u64,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn new_sender(config: &EmailConfig) -> Result<Option<Arc<dyn EmailSender>>, ServiceError> {
    let (service_id, template_id, public_key) = match (
        present(&config.service_id),
        present(&config.template_id),
        present(&config.public_key),
    ) {
        (Some(s), Some(t), Some(p)) => (s, t, p),
        _ => {
            info!("EmailJS credentials incomplete; email delivery disabled");
            return Ok(None);
        }
    };

    let sender = EmailJsSender::new(
        service_id,
        template_id,
        public_key,
        present(&config.private_key),
        present(&config.base_url),
        config.request_timeout_secs
    )?;
    Ok(Some(Arc::new(sender)))
}
