pub mod chat;
use serde::{ Deserialize, Serialize };
use std::str::FromStr;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Moonshot,
    OpenAI,
    DeepSeek,
    Groq,
    XAI,
    Ollama,
}

impl LlmType {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmType::Moonshot => "https://api.moonshot.cn/v1/chat/completions",
            LlmType::OpenAI => "https://api.openai.com/v1/chat/completions",
            LlmType::DeepSeek => "https://api.deepseek.com/chat/completions",
            LlmType::Groq => "https://api.groq.com/openai/v1/chat/completions",
            LlmType::XAI => "https://api.x.ai/v1/chat/completions",
            LlmType::Ollama => "http://localhost:11434/v1/chat/completions",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmType::Moonshot => "moonshot-v1-8k",
            LlmType::OpenAI => "gpt-4o-mini",
            LlmType::DeepSeek => "deepseek-chat",
            LlmType::Groq => "llama-3.1-8b-instant",
            LlmType::XAI => "grok-2-latest",
            LlmType::Ollama => "llama3",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, LlmType::Ollama)
    }
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LlmType::Moonshot => "moonshot",
            LlmType::OpenAI => "openai",
            LlmType::DeepSeek => "deepseek",
            LlmType::Groq => "groq",
            LlmType::XAI => "xai",
            LlmType::Ollama => "ollama",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}

impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "moonshot" | "kimi" => Ok(LlmType::Moonshot),
            "openai" => Ok(LlmType::OpenAI),
            "deepseek" => Ok(LlmType::DeepSeek),
            "groq" => Ok(LlmType::Groq),
            "xai" => Ok(LlmType::XAI),
            "ollama" => Ok(LlmType::Ollama),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::Moonshot,
            api_key: None,
            completion_model: None,
            base_url: None,
            temperature: 0.3,
            request_timeout_secs: 60,
        }
    }
}
