use async_trait::async_trait;
use axum::{ body::Bytes, extract::State, http::{ header, HeaderMap, StatusCode }, response::IntoResponse, Router };
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{ Arc, Mutex };
use std::time::Duration;

use crate::email::{ EmailSender, TemplateParams };
use crate::error::ServiceError;
use crate::llm::chat::{ ChatClient, ChatMessage, CompletionResponse };

#[derive(Default)]
pub struct MockChatClient {
    replies: Mutex<VecDeque<Result<String, ServiceError>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    delay: Option<Duration>,
}

impl MockChatClient {
    pub fn replying<I>(replies: I) -> Self where I: IntoIterator<Item = Result<String, ServiceError>> {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<CompletionResponse, ServiceError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let reply = self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("respuesta".to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        reply.map(|response| CompletionResponse { response })
    }

    fn get_model(&self) -> String {
        "mock".to_string()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}

#[derive(Default)]
pub struct MockEmailSender {
    results: Mutex<VecDeque<Result<(), ServiceError>>>,
    sent: Mutex<Vec<TemplateParams>>,
}

impl MockEmailSender {
    pub fn with_results<I>(results: I) -> Self where I: IntoIterator<Item = Result<(), ServiceError>> {
        Self {
            results: Mutex::new(results.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<TemplateParams> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send(&self, params: &TemplateParams) -> Result<(), ServiceError> {
        self.sent.lock().unwrap().push(params.clone());
        self.results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct EndpointState {
    status: StatusCode,
    response: Value,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

pub struct JsonEndpoint {
    pub url: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    _server: tokio::task::JoinHandle<()>,
}

impl JsonEndpoint {
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn capture_request(
    State(state): State<EndpointState>,
    headers: HeaderMap,
    body: Bytes
) -> impl IntoResponse {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.requests.lock().unwrap().push(CapturedRequest { authorization, body });
    (state.status, axum::Json(state.response.clone()))
}

pub async fn spawn_json_endpoint(status: StatusCode, response: Value) -> JsonEndpoint {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = EndpointState { status, response, requests: Arc::clone(&requests) };
    let app = Router::new().fallback(capture_request).with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    JsonEndpoint {
        url: format!("http://{}/v1/chat/completions", addr),
        requests,
        _server: server,
    }
}
