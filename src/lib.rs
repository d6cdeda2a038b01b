pub mod agent;
pub mod capture;
pub mod cli;
pub mod config;
pub mod contact;
pub mod effect;
pub mod email;
pub mod error;
pub mod intent;
pub mod llm;
pub mod models;
pub mod render;
pub mod server;
pub mod session;

#[cfg(test)]
mod testing;

use agent::Assistant;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("HTTP API Port: {}", args.http_port.map_or("disabled".to_string(), |p| p.to_string()));
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("provider default"));
    info!("Chat API Key Set: {}", !args.chat_api_key.trim().is_empty());
    info!("EmailJS Service: {}", args.emailjs_service_id.as_deref().unwrap_or("not set"));
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("Bubble Interval: {}s", args.bubble_interval_secs);
    info!("Form Reset Delay: {}s", args.form_reset_secs);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("Handshake Auth: {}", args.server_api_key.as_deref().map_or(false, |k| !k.is_empty()));
    info!("-------------------------");

    let assistant = Arc::new(Assistant::from_args(&args)?);
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, assistant, args.clone());
    server.run().await?;

    Ok(())
}
