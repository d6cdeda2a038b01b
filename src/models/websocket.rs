use serde::{ Serialize, Deserialize };

use crate::contact::FormStatus;
use crate::intent::QuickAction;
use crate::models::chat::Role;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        content: String,
    },
    #[serde(rename = "quick_action")] QuickAction {
        action: QuickAction,
    },
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "close")]
    Close,
    #[serde(rename = "contact_form")] ContactForm {
        user_name: String,
        user_email: String,
        message: String,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QuickActionButton {
    pub action: QuickAction,
    pub label: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "welcome")] Welcome {
        session_id: String,
        whatsapp_url: String,
        quick_actions: Vec<QuickActionButton>,
    },
    #[serde(rename = "message")] Message {
        role: Role,
        content: String,
        show_whatsapp: bool,
        timestamp: i64,
    },
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "bubble")] Bubble {
        content: String,
    },
    #[serde(rename = "form_status")] FormStatus {
        status: FormStatus,
        sending: bool,
        message: Option<String>,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
}
