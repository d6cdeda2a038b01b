use log::{ debug, info, warn };
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::capture::{ CaptureStage, CaptureStep, LeadCapture, LeadDraft };
use crate::config::prompt::PromptConfig;
use crate::contact::{ ContactForm, FormStatus };
use crate::effect::{ Effect, Outcome };
use crate::email::TemplateParams;
use crate::intent::{ self, Intent, QuickAction };
use crate::llm::chat::ChatMessage as LlmMessage;
use crate::models::chat::Transcript;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub form_reset_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { form_reset_delay: Duration::from_secs(5) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormView {
    pub status: FormStatus,
    pub sending: bool,
    pub message: Option<String>,
}

pub struct Session {
    id: String,
    prompts: Arc<PromptConfig>,
    settings: SessionSettings,
    transcript: Transcript,
    capture: LeadCapture,
    last_turn: u64,
    pending_turn: Option<u64>,
    widget_open: bool,
    bubble_index: usize,
    form: ContactForm,
    form_message: Option<String>,
}

impl Session {
    pub fn new(prompts: Arc<PromptConfig>, settings: SessionSettings) -> Self {
        let transcript = Transcript::with_greeting(&prompts.greeting);
        Self {
            id: Uuid::new_v4().to_string(),
            prompts,
            settings,
            transcript,
            capture: LeadCapture::default(),
            last_turn: 0,
            pending_turn: None,
            widget_open: false,
            bubble_index: 0,
            form: ContactForm::default(),
            form_message: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn prompts(&self) -> &PromptConfig {
        &self.prompts
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn capture_stage(&self) -> CaptureStage {
        self.capture.stage()
    }

    pub fn lead_draft(&self) -> &LeadDraft {
        self.capture.draft()
    }

    pub fn is_busy(&self) -> bool {
        self.pending_turn.is_some()
    }

    pub fn pending_turn(&self) -> Option<u64> {
        self.pending_turn
    }

    pub fn submit(&mut self, utterance: &str) -> Vec<Effect> {
        let text = utterance.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let mut effects = Vec::new();
        if let Some(turn) = self.pending_turn.take() {
            info!("Session {}: turn {} superseded by new input", self.id, turn);
            effects.push(Effect::CancelCompletion { turn });
        }

        self.transcript.push_user(utterance);

        let intent = intent::classify(self.capture.stage(), text, &self.prompts);
        debug!("Session {}: intent {:?} (stage {:?})", self.id, intent, self.capture.stage());
        match intent {
            Intent::CaptureAnswer => self.answer_capture(text, &mut effects),
            Intent::QuickAction(QuickAction::EmailContact) | Intent::ContactRequest => {
                self.begin_capture();
            }
            Intent::QuickAction(QuickAction::WhatsAppHandoff) => {
                self.transcript.push_assistant(self.prompts.whatsapp_handoff.clone());
            }
            Intent::ForwardToLlm => effects.push(self.start_turn()),
        }
        effects
    }

    pub fn quick_action(&mut self, action: QuickAction) -> Vec<Effect> {
        match self.prompts.quick_action_label(action).map(str::to_string) {
            Some(label) => self.submit(&label),
            None => {
                warn!("Session {}: quick action {:?} has no configured label", self.id, action);
                Vec::new()
            }
        }
    }

    pub fn apply(&mut self, outcome: Outcome) -> Vec<Effect> {
        match outcome {
            Outcome::Completion { turn, result } => {
                if self.pending_turn != Some(turn) {
                    debug!("Session {}: dropping late completion for turn {}", self.id, turn);
                    return Vec::new();
                }
                self.pending_turn = None;
                let reply = match result {
                    Ok(content) => content,
                    Err(e) if e.is_not_configured() => self.prompts.llm_not_configured.clone(),
                    Err(e) => {
                        warn!("Session {}: completion for turn {} failed: {}", self.id, turn, e);
                        self.prompts.llm_failed.clone()
                    }
                };
                self.transcript.push_assistant(reply);
                Vec::new()
            }
            Outcome::LeadDelivery { result } => {
                let reply = match result {
                    Ok(()) => {
                        info!("Session {}: lead delivered", self.id);
                        self.prompts.capture.sent.clone()
                    }
                    Err(e) if e.is_not_configured() => self.prompts.capture.not_configured.clone(),
                    Err(e) => {
                        warn!("Session {}: lead delivery failed: {}", self.id, e);
                        self.prompts.capture.failed.clone()
                    }
                };
                self.transcript.push_assistant(reply);
                Vec::new()
            }
            Outcome::FormDelivery { generation, result } => {
                let (status, message) = match result {
                    Ok(()) => (FormStatus::Success, self.prompts.contact_form.success.clone()),
                    Err(e) if e.is_not_configured() => {
                        (FormStatus::Error, self.prompts.contact_form.not_configured.clone())
                    }
                    Err(e) => {
                        warn!("Session {}: contact form delivery failed: {}", self.id, e);
                        (FormStatus::Error, self.prompts.contact_form.error.clone())
                    }
                };
                self.finish_form(generation, status, message)
            }
            Outcome::FormReset { generation } => {
                if self.form.reset(generation) {
                    self.form_message = None;
                }
                Vec::new()
            }
        }
    }

    pub fn is_widget_open(&self) -> bool {
        self.widget_open
    }

    pub fn open_widget(&mut self) {
        self.widget_open = true;
    }

    pub fn close_widget(&mut self) {
        self.widget_open = false;
    }

    pub fn bubble_text(&self) -> Option<&str> {
        if self.widget_open {
            return None;
        }
        self.prompts.bubble_messages.get(self.bubble_index).map(String::as_str)
    }

    pub fn rotate_bubble(&mut self) -> Option<&str> {
        let count = self.prompts.bubble_messages.len();
        if self.widget_open || count == 0 {
            return None;
        }
        self.bubble_index = (self.bubble_index + 1) % count;
        self.bubble_text()
    }

    pub fn submit_contact_form(&mut self, params: TemplateParams) -> Vec<Effect> {
        let Some(generation) = self.form.begin() else {
            debug!("Session {}: contact form already sending", self.id);
            return Vec::new();
        };
        self.form_message = None;

        if params.has_blank_field() {
            let message = self.prompts.contact_form.missing_fields.clone();
            return self.finish_form(generation, FormStatus::Error, message);
        }
        vec![Effect::DeliverContactForm { generation, params }]
    }

    pub fn form_view(&self) -> FormView {
        FormView {
            status: self.form.status(),
            sending: self.form.is_sending(),
            message: self.form_message.clone(),
        }
    }

    fn finish_form(&mut self, generation: u64, status: FormStatus, message: String) -> Vec<Effect> {
        if !self.form.finish(generation, status) {
            return Vec::new();
        }
        self.form_message = Some(message);
        vec![Effect::ScheduleFormReset { generation, delay: self.settings.form_reset_delay }]
    }

    fn begin_capture(&mut self) {
        self.capture.begin();
        self.transcript.push_assistant(self.prompts.capture.ask_name.clone());
    }

    fn answer_capture(&mut self, text: &str, effects: &mut Vec<Effect>) {
        match self.capture.answer(text) {
            Ok(CaptureStep::AskEmail { name }) => {
                self.transcript.push_assistant(self.prompts.ask_email(&name));
            }
            Ok(CaptureStep::AskMessage) => {
                self.transcript.push_assistant(self.prompts.capture.ask_message.clone());
            }
            Ok(CaptureStep::Completed(draft)) => {
                self.transcript.push_assistant(self.prompts.capture.acknowledgment.clone());
                effects.push(Effect::DeliverLead { params: self.lead_params(draft) });
            }
            Err(e) => warn!("Session {}: capture answer ignored: {}", self.id, e),
        }
    }

    fn lead_params(&self, draft: LeadDraft) -> TemplateParams {
        TemplateParams {
            user_name: draft.name,
            user_email: draft.email,
            message: format!("{} {}", self.prompts.lead_origin_tag, draft.message),
        }
    }

    fn start_turn(&mut self) -> Effect {
        self.last_turn += 1;
        let turn = self.last_turn;
        self.pending_turn = Some(turn);

        let mut messages = Vec::with_capacity(self.transcript.len() + 1);
        if !self.prompts.system_prompt.trim().is_empty() {
            messages.push(LlmMessage::system(self.prompts.system_prompt.clone()));
        }
        messages.extend(self.transcript.llm_context());
        Effect::RequestCompletion { turn, messages }
    }
}
