use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{service} is not configured")]
    NotConfigured { service: &'static str },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl ServiceError {
    pub fn not_configured(service: &'static str) -> Self {
        ServiceError::NotConfigured { service }
    }

    pub fn is_not_configured(&self) -> bool {
        matches!(self, ServiceError::NotConfigured { .. })
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ServiceError::MalformedResponse(err.to_string());
        }
        match err.status() {
            Some(status) => ServiceError::Rejected {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => ServiceError::Transport(err.to_string()),
        }
    }
}
