use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for the assistant (moonshot, openai, deepseek, groq, xai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "moonshot")]
    pub chat_llm_type: String,

    /// Full chat-completions URL of the provider. Defaults to the provider's public endpoint.
    #[arg(long, env = "CHAT_BASE_URL")]
    pub chat_base_url: Option<String>,

    /// API Key for the chat provider. Leave empty to run the assistant in demo mode.
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., moonshot-v1-8k, gpt-4o-mini)
    #[arg(long, env = "CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Sampling temperature sent with every completion request.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.3")]
    pub chat_temperature: f32,

    /// Timeout in seconds for requests to the collaborators (LLM and email).
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "60")]
    pub request_timeout_secs: u64,

    // --- Email (EmailJS) Args ---
    /// EmailJS service id.
    #[arg(long, env = "EMAILJS_SERVICE_ID")]
    pub emailjs_service_id: Option<String>,

    /// EmailJS template id. The template receives user_name, user_email and message.
    #[arg(long, env = "EMAILJS_TEMPLATE_ID")]
    pub emailjs_template_id: Option<String>,

    /// EmailJS public key (sent as user_id).
    #[arg(long, env = "EMAILJS_PUBLIC_KEY")]
    pub emailjs_public_key: Option<String>,

    /// Optional EmailJS private key, required when the account enforces it for API calls.
    #[arg(long, env = "EMAILJS_PRIVATE_KEY")]
    pub emailjs_private_key: Option<String>,

    /// Override of the EmailJS send endpoint.
    #[arg(long, env = "EMAILJS_BASE_URL")]
    pub emailjs_base_url: Option<String>,

    // --- General App Args ---
    /// Path to a JSON prompt configuration file. Built-in prompts are used when unset.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Seconds between proactive bubble rotations while the chat widget is closed.
    #[arg(long, env = "BUBBLE_INTERVAL_SECS", default_value = "4")]
    pub bubble_interval_secs: u64,

    /// Seconds before a contact form success/error status returns to idle.
    #[arg(long, env = "FORM_RESET_SECS", default_value = "5")]
    pub form_reset_secs: u64,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Host address and port for the WebSocket server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional API Key required for clients to connect to the WebSocket server. If set, clients must provide this key.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Port for the HTTP API (contact form, health, prompt reload). Disabled when unset.
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Optional path to the TLS certificate file (PEM format) for enabling WSS. Requires --tls-key.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling WSS. Requires --tls-cert.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_without_arguments() {
        let args = Args::try_parse_from(["portfolio-assistant"]).unwrap();
        assert_eq!(args.chat_llm_type, "moonshot");
        assert_eq!(args.bubble_interval_secs, 4);
        assert_eq!(args.form_reset_secs, 5);
        assert!(args.http_port.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "portfolio-assistant",
            "--chat-llm-type",
            "ollama",
            "--http-port",
            "8080",
            "--form-reset-secs",
            "2",
        ]).unwrap();
        assert_eq!(args.chat_llm_type, "ollama");
        assert_eq!(args.http_port, Some(8080));
        assert_eq!(args.form_reset_secs, 2);
    }
}
