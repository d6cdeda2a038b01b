use crate::agent::Assistant;
use crate::cli::Args;
use crate::contact::FormStatus;
use crate::email::TemplateParams;
use crate::server::websocket::tls_paths;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    routing::{ get, post },
    Router,
    extract::State,
    response::IntoResponse,
    http::StatusCode,
    Json,
};
use serde::{ Deserialize, Serialize };
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, warn, error };

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct ContactRequest {
    pub user_name: String,
    pub user_email: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ContactResponse {
    pub status: FormStatus,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub llm_configured: bool,
    pub email_configured: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ReloadResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Clone)]
struct AppState {
    assistant: Arc<Assistant>,
}

pub fn router(assistant: Arc<Assistant>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/contact", post(contact_handler))
        .route("/api/reload-prompts", get(reload_prompts_handler))
        .layer(cors)
        .with_state(AppState { assistant })
}

pub async fn start_http_server(
    http_port: u16,
    assistant: Arc<Assistant>,
    args: Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = router(assistant);

    if let Some((cert_path, key_path)) = tls_paths(&args)? {
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        tokio::spawn(async move {
            let result = axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await;

            if let Err(e) = result {
                error!("HTTPS server error: {}", e);
            }
        });

        info!("HTTPS server started with TLS enabled");
    } else {
        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                        error!("HTTP server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                }
            }
        });

        info!("HTTP server started");
    }

    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        llm_configured: state.assistant.llm_configured(),
        email_configured: state.assistant.email_configured(),
    })
}

async fn contact_handler(
    State(state): State<AppState>,
    Json(req): Json<ContactRequest>
) -> impl IntoResponse {
    let prompts = state.assistant.prompts().await;
    let texts = &prompts.contact_form;
    let params = TemplateParams {
        user_name: req.user_name,
        user_email: req.user_email,
        message: req.message,
    };

    let (code, status, message) = if params.has_blank_field() {
        (StatusCode::BAD_REQUEST, FormStatus::Error, texts.missing_fields.clone())
    } else {
        match state.assistant.send_contact_form(params).await {
            Ok(()) => {
                info!("Contact form delivered");
                (StatusCode::OK, FormStatus::Success, texts.success.clone())
            }
            Err(e) if e.is_not_configured() => {
                warn!("Contact form received but email is not configured");
                (StatusCode::SERVICE_UNAVAILABLE, FormStatus::Error, texts.not_configured.clone())
            }
            Err(e) => {
                error!("Contact form delivery failed: {}", e);
                (StatusCode::BAD_GATEWAY, FormStatus::Error, texts.error.clone())
            }
        }
    };

    (code, Json(ContactResponse { status, message }))
}

async fn reload_prompts_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.assistant.reload_prompts_if_changed().await {
        Ok(true) =>
            (
                StatusCode::OK,
                Json(ReloadResponse { success: true, message: "Prompts reloaded".into() }),
            ),
        Ok(false) =>
            (
                StatusCode::OK,
                Json(ReloadResponse { success: true, message: "Prompts unchanged".into() }),
            ),
        Err(e) => {
            error!("Prompt reload failed: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(ReloadResponse { success: false, message: format!("Reload error: {}", e) }),
            )
        }
    }
}
