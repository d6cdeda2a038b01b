use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use log::info;

use crate::intent::QuickAction;

#[derive(Debug)]
pub enum PromptError {
    Invalid(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::Invalid(msg) => write!(f, "Invalid prompt configuration: {}", msg),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            PromptError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "\
Eres el asistente virtual oficial del portafolio de Erick Seis. Tu única función es responder preguntas sobre el perfil profesional de Erick e invitar a contactarlo.

INFORMACIÓN DE ERICK SEIS:
- Título: Desarrollador Full Stack (3 años de experiencia).
- Ubicación: Arica, Chile.
- Contacto: +56984994011, erickseislaboral@gmail.com.
- Experiencia Actual: Freelancer (Nov 2023 - Presente). Desarrollo web a medida, dashboards financieros, automatización con IA (React, Node.js, PostgreSQL).
- Experiencia Anterior: Asunción Digital (Oct 2022 - Nov 2023). Desarrollo interfaces React/Redux, backend Node.js/Express.
- Habilidades: React, JavaScript, TypeScript, Node.js, Python, PostgreSQL, HTML/CSS, Git, Scrum, Liderazgo Técnico.
- Educación: Analista Programador (INACAP, en curso), Desarrollador Full Stack MERN (Academlo, 2022).
- Logros: Plataforma 4DX, Dashboard Financiero Real-Time, Optimización de rendimiento web (30% más rápido).

REGLAS DE COMPORTAMIENTO:
1. SOLO responde preguntas sobre Erick, su experiencia, habilidades o proyectos.
2. Si te preguntan sobre otros temas (clima, noticias, chistes, otros programadores), responde amablemente que solo puedes hablar sobre Erick Seis.
3. SIEMPRE que el usuario muestre interés en contratar o contactar, sugiere WhatsApp y añade el token '[SHOW_WHATSAPP]' al final.
4. Sé profesional, persuasivo y amable. Vende a Erick como la mejor opción para proyectos de desarrollo y automatización.
5. Responde siempre en Español.";

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct QuickActionDefinition {
    pub action: QuickAction,
    pub label: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CapturePrompts {
    pub ask_name: String,
    pub ask_email: String,
    pub ask_message: String,
    pub acknowledgment: String,
    pub sent: String,
    pub failed: String,
    pub not_configured: String,
}

impl Default for CapturePrompts {
    fn default() -> Self {
        Self {
            ask_name: "¡Genial! Te ayudo a dejarle un mensaje a Erick. ¿Cuál es tu nombre?".into(),
            ask_email: "Gracias, {name}. ¿A qué email puede responderte Erick?".into(),
            ask_message: "Perfecto. Cuéntame brevemente sobre tu proyecto o lo que necesitas.".into(),
            acknowledgment: "¡Gracias! Estoy enviando tu mensaje a Erick...".into(),
            sent: "¡Listo! Tu mensaje fue enviado. Erick te responderá pronto.".into(),
            failed: "No pude enviar tu mensaje en este momento. Puedes escribirle directamente por WhatsApp. [SHOW_WHATSAPP]".into(),
            not_configured: "El envío de emails no está configurado todavía. Mientras tanto, puedes escribirle por WhatsApp. [SHOW_WHATSAPP]".into(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct FormMessages {
    pub success: String,
    pub error: String,
    pub not_configured: String,
    pub missing_fields: String,
}

impl Default for FormMessages {
    fn default() -> Self {
        Self {
            success: "¡Mensaje enviado con éxito! Te responderé pronto.".into(),
            error: "Hubo un error al enviar el mensaje. Por favor intenta nuevamente.".into(),
            not_configured: "El formulario de contacto no está configurado. Escríbeme a erickseislaboral@gmail.com.".into(),
            missing_fields: "Por favor completa tu nombre, email y mensaje.".into(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PromptConfig {
    pub system_prompt: String,
    pub greeting: String,
    pub quick_actions: Vec<QuickActionDefinition>,
    pub whatsapp_handoff: String,
    pub whatsapp_url: String,
    pub capture: CapturePrompts,
    pub lead_origin_tag: String,
    pub llm_not_configured: String,
    pub llm_failed: String,
    pub contact_keywords: Vec<String>,
    pub contact_max_edits: usize,
    pub bubble_messages: Vec<String>,
    pub contact_form: FormMessages,
    #[serde(skip)]
    pub last_loaded: Option<SystemTime>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            greeting: "¡Hola! Soy la IA de Erick Seis. ¿En qué puedo ayudarte? Pregúntame sobre su experiencia, proyectos o habilidades.".into(),
            quick_actions: vec![
                QuickActionDefinition {
                    action: QuickAction::EmailContact,
                    label: "📧 Quiero que Erick me contacte por email".into(),
                },
                QuickActionDefinition {
                    action: QuickAction::WhatsAppHandoff,
                    label: "💬 Prefiero hablar por WhatsApp".into(),
                },
            ],
            whatsapp_handoff: "¡Perfecto! Escríbele directamente a Erick por WhatsApp y conversen sobre tu proyecto. [SHOW_WHATSAPP]".into(),
            whatsapp_url: "https://wa.me/56984994011".into(),
            capture: CapturePrompts::default(),
            lead_origin_tag: "[Asistente IA]".into(),
            llm_not_configured: "Para activar mi inteligencia completa, por favor configura la API Key de Moonshot en el archivo .env. Por ahora, estoy en modo demostración.".into(),
            llm_failed: "Lo siento, tuve un problema al procesar tu solicitud. Por favor intenta de nuevo.".into(),
            contact_keywords: vec![
                "contáctame".into(),
                "contactame".into(),
                "contactarme".into(),
                "escríbeme".into(),
                "escribeme".into(),
                "llámame".into(),
                "llamame".into(),
            ],
            contact_max_edits: 1,
            bubble_messages: vec![
                "¿Buscas un desarrollador Full Stack?".into(),
                "Hablemos sobre tu próximo proyecto".into(),
                "¿Quieres ver mi experiencia?".into(),
                "Pregúntame lo que sea sobre mí".into(),
            ],
            contact_form: FormMessages::default(),
            last_loaded: None,
        }
    }
}

impl PromptConfig {
    pub fn validate(&self) -> Result<(), PromptError> {
        if self.greeting.trim().is_empty() {
            return Err(PromptError::Invalid("greeting must not be empty".to_string()));
        }
        for (i, def) in self.quick_actions.iter().enumerate() {
            if def.label.trim().is_empty() {
                return Err(
                    PromptError::Invalid(format!("quick action {:?} has an empty label", def.action))
                );
            }
            if def.label.trim() != def.label {
                return Err(
                    PromptError::Invalid(
                        format!("quick action label '{}' has surrounding whitespace", def.label)
                    )
                );
            }
            if self.quick_actions[..i].iter().any(|other| other.label == def.label) {
                return Err(PromptError::Invalid(format!("duplicate quick action label '{}'", def.label)));
            }
        }
        Ok(())
    }

    pub fn quick_action_label(&self, action: QuickAction) -> Option<&str> {
        self.quick_actions
            .iter()
            .find(|def| def.action == action)
            .map(|def| def.label.as_str())
    }

    pub fn ask_email(&self, name: &str) -> String {
        self.capture.ask_email.replace("{name}", name)
    }
}

pub fn load_prompts_from_str(json: &str) -> Result<Arc<PromptConfig>, PromptError> {
    let mut config: PromptConfig = serde_json::from_str(json)?;
    config.validate()?;
    config.last_loaded = Some(SystemTime::now());
    Ok(Arc::new(config))
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(path.as_ref())?;
    let config = load_prompts_from_str(&file_content)?;
    info!("Loaded prompt configuration from: {}", path.as_ref().display());
    Ok(config)
}

pub fn load_prompts_or_default(path: Option<&str>) -> Result<Arc<PromptConfig>, PromptError> {
    match path {
        Some(p) if !p.trim().is_empty() => load_prompts(p),
        _ => {
            info!("No prompts file configured, using built-in prompts");
            Ok(Arc::new(PromptConfig::default()))
        }
    }
}

pub fn reload_prompts_if_changed<P: AsRef<Path>>(
    path: P,
    current_config: &Arc<PromptConfig>
) -> Result<Option<Arc<PromptConfig>>, PromptError> {
    let metadata = fs::metadata(&path)?;

    if let Ok(modified) = metadata.modified() {
        if let Some(last_loaded) = current_config.last_loaded {
            if modified > last_loaded {
                info!("Prompts file changed, reloading...");
                return load_prompts(path).map(Some);
            }
        } else {
            info!("No last_loaded timestamp, reloading prompts...");
            return load_prompts(path).map(Some);
        }
    }
    Ok(None)
}
