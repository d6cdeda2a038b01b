use async_trait::async_trait;
use log::{ debug, warn };
use reqwest::Client as HttpClient;
use serde::Serialize;
use std::time::Duration;

use super::{ EmailSender, TemplateParams };
use crate::error::ServiceError;

const EMAILJS_SEND_URL: &str = "https://api.emailjs.com/api/v1.0/email/send";

pub struct EmailJsSender {
    http: HttpClient,
    url: String,
    service_id: String,
    template_id: String,
    public_key: String,
    private_key: Option<String>,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    access_token: Option<&'a str>,
    template_params: &'a TemplateParams,
}

impl EmailJsSender {
    pub fn new(
        service_id: String,
        template_id: String,
        public_key: String,
        private_key: Option<String>,
        base_url: Option<String>,
        timeout_secs: u64
    ) -> Result<Self, ServiceError> {
        let http = HttpClient::builder().timeout(Duration::from_secs(timeout_secs.max(1))).build()?;
        Ok(Self {
            http,
            url: base_url.unwrap_or_else(|| EMAILJS_SEND_URL.to_string()),
            service_id,
            template_id,
            public_key,
            private_key,
        })
    }
}

#[async_trait]
impl EmailSender for EmailJsSender {
    async fn send(&self, params: &TemplateParams) -> Result<(), ServiceError> {
        let req = SendRequest {
            service_id: &self.service_id,
            template_id: &self.template_id,
            user_id: &self.public_key,
            access_token: self.private_key.as_deref(),
            template_params: params,
        };
        debug!("Sending email via EmailJS template {}", self.template_id);

        let resp = self.http.post(&self.url).json(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("EmailJS rejected message with {}: {}", status, body);
            return Err(ServiceError::Rejected { status: status.as_u16(), body });
        }
        Ok(())
    }
}
