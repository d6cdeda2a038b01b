use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig, PromptError };
use crate::effect::{ Effect, Outcome };
use crate::email::{ self, EmailConfig, EmailSender, TemplateParams };
use crate::error::ServiceError;
use crate::llm::{ LlmConfig, LlmType };
use crate::llm::chat::{ ChatClient, ChatMessage, new_client as new_chat_client };
use crate::session::{ Session, SessionSettings };

use futures::FutureExt;
use log::{ debug, info, warn, error };
use std::collections::HashMap;
use std::error::Error;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::{ AbortHandle, JoinSet };

// Dropping the set aborts all pending collaborator calls of the connection.
pub struct TaskSet {
    tasks: JoinSet<Outcome>,
    completions: HashMap<u64, AbortHandle>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            completions: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    fn spawn_completion<F>(&mut self, turn: u64, task: F)
        where F: std::future::Future<Output = Outcome> + Send + 'static
    {
        // a panic still ends the turn
        let task = AssertUnwindSafe(task)
            .catch_unwind()
            .map(move |joined| {
                joined.unwrap_or_else(|_| {
                    error!("Completion task for turn {} panicked", turn);
                    Outcome::Completion {
                        turn,
                        result: Err(ServiceError::Transport("completion task panicked".to_string())),
                    }
                })
            });
        let handle = self.tasks.spawn(task);
        self.completions.insert(turn, handle);
    }

    fn spawn<F>(&mut self, task: F) where F: std::future::Future<Output = Outcome> + Send + 'static {
        self.tasks.spawn(task);
    }

    fn cancel_completion(&mut self, turn: u64) {
        if let Some(handle) = self.completions.remove(&turn) {
            handle.abort();
        }
    }

    pub async fn next(&mut self) -> Option<Outcome> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if let Outcome::Completion { turn, .. } = &outcome {
                        self.completions.remove(turn);
                    }
                    return Some(outcome);
                }
                Err(e) if e.is_cancelled() => {
                    debug!("Collaborator task cancelled");
                }
                Err(e) => {
                    error!("Collaborator task failed: {}", e);
                }
            }
        }
        None
    }
}

pub struct Assistant {
    chat_client: Option<Arc<dyn ChatClient>>,
    email_sender: Option<Arc<dyn EmailSender>>,
    prompt_config: RwLock<Arc<PromptConfig>>,
    prompts_path: Option<String>,
    settings: SessionSettings,
}

impl Assistant {
    pub fn new(
        chat_client: Option<Arc<dyn ChatClient>>,
        email_sender: Option<Arc<dyn EmailSender>>,
        prompt_config: Arc<PromptConfig>,
        prompts_path: Option<String>,
        settings: SessionSettings
    ) -> Self {
        Self {
            chat_client,
            email_sender,
            prompt_config: RwLock::new(prompt_config),
            prompts_path,
            settings,
        }
    }

    pub fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let chat_llm_type: LlmType = args.chat_llm_type.parse()?;
        let chat_api_key = if !args.chat_api_key.is_empty() {
            Some(args.chat_api_key.clone())
        } else {
            None
        };
        let chat_config = LlmConfig {
            llm_type: chat_llm_type,
            api_key: chat_api_key,
            completion_model: args.chat_model.clone(),
            base_url: args.chat_base_url.clone(),
            temperature: args.chat_temperature,
            request_timeout_secs: args.request_timeout_secs,
        };
        let chat_client = new_chat_client(&chat_config)?;
        match &chat_client {
            Some(client) =>
                info!(
                    "Chat client configured: Type={}, Model={}, BaseURL={}",
                    chat_config.llm_type,
                    client.get_model(),
                    client.get_base_url().as_deref().unwrap_or("adapter default")
                ),
            None => warn!("Chat client not configured: {} needs an API key", chat_config.llm_type),
        }

        let email_config = EmailConfig {
            service_id: args.emailjs_service_id.clone(),
            template_id: args.emailjs_template_id.clone(),
            public_key: args.emailjs_public_key.clone(),
            private_key: args.emailjs_private_key.clone(),
            base_url: args.emailjs_base_url.clone(),
            request_timeout_secs: args.request_timeout_secs,
        };
        let email_sender = email::new_sender(&email_config)?;
        if email_sender.is_some() {
            info!(
                "Email sender configured: EmailJS service={}, template={}",
                email_config.service_id.as_deref().unwrap_or_default(),
                email_config.template_id.as_deref().unwrap_or_default()
            );
        } else {
            warn!("Email sender not configured: EmailJS credentials missing");
        }

        let prompt_config = prompt::load_prompts_or_default(args.prompts_path.as_deref())?;
        let settings = SessionSettings {
            form_reset_delay: Duration::from_secs(args.form_reset_secs),
        };

        Ok(
            Self::new(
                chat_client,
                email_sender,
                prompt_config,
                args.prompts_path.clone(),
                settings
            )
        )
    }

    pub fn llm_configured(&self) -> bool {
        self.chat_client.is_some()
    }

    pub fn email_configured(&self) -> bool {
        self.email_sender.is_some()
    }

    pub async fn prompts(&self) -> Arc<PromptConfig> {
        Arc::clone(&*self.prompt_config.read().await)
    }

    pub async fn open_session(&self) -> Session {
        Session::new(self.prompts().await, self.settings.clone())
    }

    pub fn execute(&self, effects: Vec<Effect>, tasks: &mut TaskSet) {
        for effect in effects {
            match effect {
                Effect::RequestCompletion { turn, messages } => {
                    let client = self.chat_client.clone();
                    tasks.spawn_completion(turn, async move {
                        let result = complete(client, messages).await;
                        Outcome::Completion { turn, result }
                    });
                }
                Effect::CancelCompletion { turn } => tasks.cancel_completion(turn),
                Effect::DeliverLead { params } => {
                    let sender = self.email_sender.clone();
                    tasks.spawn(async move {
                        let result = deliver(sender, params).await;
                        Outcome::LeadDelivery { result }
                    });
                }
                Effect::DeliverContactForm { generation, params } => {
                    let sender = self.email_sender.clone();
                    tasks.spawn(async move {
                        let result = deliver(sender, params).await;
                        Outcome::FormDelivery { generation, result }
                    });
                }
                Effect::ScheduleFormReset { generation, delay } => {
                    tasks.spawn(async move {
                        tokio::time::sleep(delay).await;
                        Outcome::FormReset { generation }
                    });
                }
            }
        }
    }

    pub async fn settle(&self, session: &mut Session, effects: Vec<Effect>, tasks: &mut TaskSet) {
        self.execute(effects, tasks);
        while let Some(outcome) = tasks.next().await {
            let follow_up = session.apply(outcome);
            self.execute(follow_up, tasks);
        }
    }

    pub async fn send_contact_form(&self, params: TemplateParams) -> Result<(), ServiceError> {
        deliver(self.email_sender.clone(), params).await
    }

    pub async fn reload_prompts_if_changed(&self) -> Result<bool, PromptError> {
        let path = match self.prompts_path.as_deref() {
            Some(p) if !p.trim().is_empty() => p,
            _ => {
                return Ok(false);
            }
        };

        let mut current = self.prompt_config.write().await;
        match prompt::reload_prompts_if_changed(path, &current)? {
            Some(new_config) => {
                *current = new_config;
                info!("Prompts successfully reloaded from {}", path);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

async fn complete(
    client: Option<Arc<dyn ChatClient>>,
    messages: Vec<ChatMessage>
) -> Result<String, ServiceError> {
    let client = client.ok_or_else(|| ServiceError::not_configured("chat LLM"))?;
    debug!("Requesting completion from {} with {} messages", client.get_model(), messages.len());
    let response = client.complete(&messages).await?;
    Ok(response.response)
}

async fn deliver(
    sender: Option<Arc<dyn EmailSender>>,
    params: TemplateParams
) -> Result<(), ServiceError> {
    let sender = sender.ok_or_else(|| ServiceError::not_configured("EmailJS"))?;
    sender.send(&params).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureStage;
    use crate::contact::FormStatus;
    use crate::intent::QuickAction;
    use crate::models::chat::Role;
    use crate::render::{ render, DIRECTIVE_TOKEN };
    use crate::testing::{ MockChatClient, MockEmailSender };
    use std::io::Write;

    fn assistant(
        chat: Option<Arc<MockChatClient>>,
        email: Option<Arc<MockEmailSender>>
    ) -> Assistant {
        Assistant::new(
            chat.map(|c| c as Arc<dyn ChatClient>),
            email.map(|e| e as Arc<dyn EmailSender>),
            Arc::new(PromptConfig::default()),
            None,
            SessionSettings { form_reset_delay: Duration::from_millis(10) }
        )
    }

    async fn say(assistant: &Assistant, session: &mut Session, tasks: &mut TaskSet, text: &str) {
        let effects = session.submit(text);
        assistant.settle(session, effects, tasks).await;
    }

    async fn capture_lead(assistant: &Assistant, session: &mut Session, tasks: &mut TaskSet) {
        let effects = session.quick_action(QuickAction::EmailContact);
        assistant.settle(session, effects, tasks).await;
        for answer in ["Ana", "ana@x.com", "necesito una web"] {
            say(assistant, session, tasks, answer).await;
        }
    }

    #[tokio::test]
    async fn capture_flow_never_calls_llm() {
        let chat = Arc::new(MockChatClient::default());
        let email = Arc::new(MockEmailSender::default());
        let assistant = assistant(Some(chat.clone()), Some(email.clone()));
        let mut session = assistant.open_session().await;
        let mut tasks = TaskSet::new();

        capture_lead(&assistant, &mut session, &mut tasks).await;

        assert!(chat.requests().is_empty());
        let sent = email.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_name, "Ana");
        assert_eq!(sent[0].user_email, "ana@x.com");
        assert!(sent[0].message.starts_with("[Asistente IA]"));
        assert!(sent[0].message.contains("necesito una web"));
        assert_eq!(session.capture_stage(), CaptureStage::Idle);
        assert_eq!(session.transcript().last().unwrap().content, session.prompts().capture.sent);
    }

    #[tokio::test]
    async fn capture_returns_to_idle_when_delivery_fails() {
        let email = Arc::new(
            MockEmailSender::with_results([Err(ServiceError::Transport("timeout".into()))])
        );
        let assistant = assistant(None, Some(email.clone()));
        let mut session = assistant.open_session().await;
        let mut tasks = TaskSet::new();

        capture_lead(&assistant, &mut session, &mut tasks).await;

        assert_eq!(email.sent().len(), 1);
        assert_eq!(session.capture_stage(), CaptureStage::Idle);
        let last = session.transcript().last().unwrap();
        assert_eq!(last.content, session.prompts().capture.failed);
        assert!(render(&last.content).show_whatsapp);
    }

    #[tokio::test]
    async fn two_captures_send_two_independent_emails() {
        let email = Arc::new(
            MockEmailSender::with_results([Err(ServiceError::Transport("down".into())), Ok(())])
        );
        let assistant = assistant(None, Some(email.clone()));
        let mut session = assistant.open_session().await;
        let mut tasks = TaskSet::new();

        capture_lead(&assistant, &mut session, &mut tasks).await;
        assert_eq!(session.transcript().last().unwrap().content, session.prompts().capture.failed);

        capture_lead(&assistant, &mut session, &mut tasks).await;
        assert_eq!(session.transcript().last().unwrap().content, session.prompts().capture.sent);
        assert_eq!(email.sent().len(), 2);
    }

    #[tokio::test]
    async fn missing_email_credentials_reply_not_configured() {
        let assistant = assistant(None, None);
        let mut session = assistant.open_session().await;
        let mut tasks = TaskSet::new();

        capture_lead(&assistant, &mut session, &mut tasks).await;

        assert_eq!(
            session.transcript().last().unwrap().content,
            session.prompts().capture.not_configured
        );
        assert_eq!(session.capture_stage(), CaptureStage::Idle);
    }

    #[tokio::test]
    async fn missing_llm_credential_gives_one_fallback_message() {
        let assistant = assistant(None, None);
        assert!(!assistant.llm_configured());
        let mut session = assistant.open_session().await;
        let mut tasks = TaskSet::new();

        say(&assistant, &mut session, &mut tasks, "¿Qué proyectos ha hecho?").await;

        let fresh = session.transcript().since(1);
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[0].role, Role::User);
        assert_eq!(fresh[1].content, session.prompts().llm_not_configured);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn llm_failure_gives_failure_message() {
        let chat = Arc::new(
            MockChatClient::replying([
                Err(ServiceError::Rejected { status: 500, body: "oops".into() }),
            ])
        );
        let assistant = assistant(Some(chat.clone()), None);
        let mut session = assistant.open_session().await;
        let mut tasks = TaskSet::new();

        say(&assistant, &mut session, &mut tasks, "hola").await;

        assert_eq!(chat.requests().len(), 1);
        assert_eq!(session.transcript().last().unwrap().content, session.prompts().llm_failed);
    }

    #[tokio::test]
    async fn llm_requests_never_carry_directive() {
        let chat = Arc::new(
            MockChatClient::replying([
                Ok(format!("Escríbele por WhatsApp {}", DIRECTIVE_TOKEN)),
                Ok("Sabe React".to_string()),
            ])
        );
        let assistant = assistant(Some(chat.clone()), None);
        let mut session = assistant.open_session().await;
        let mut tasks = TaskSet::new();

        let effects = session.quick_action(QuickAction::WhatsAppHandoff);
        assistant.settle(&mut session, effects, &mut tasks).await;
        say(&assistant, &mut session, &mut tasks, "Quiero contratarlo").await;
        say(&assistant, &mut session, &mut tasks, "¿Qué tecnologías usa?").await;

        let requests = chat.requests();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            assert!(
                request
                    .iter()
                    .filter(|m| m.role != "system")
                    .all(|m| !m.content.contains(DIRECTIVE_TOKEN))
            );
        }
        assert_eq!(session.transcript().last().unwrap().content, "Sabe React");
    }

    #[tokio::test]
    async fn whatsapp_quick_action_needs_no_collaborator() {
        let chat = Arc::new(MockChatClient::default());
        let assistant = assistant(Some(chat.clone()), None);
        let mut session = assistant.open_session().await;
        let mut tasks = TaskSet::new();

        let effects = session.quick_action(QuickAction::WhatsAppHandoff);
        assert!(effects.is_empty());
        assistant.settle(&mut session, effects, &mut tasks).await;

        let replies: Vec<_> = session
            .transcript()
            .since(1)
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        assert_eq!(replies.len(), 1);
        let rendered = render(&replies[0].content);
        assert!(rendered.show_whatsapp);
        assert!(!rendered.text.contains(DIRECTIVE_TOKEN));
        assert!(chat.requests().is_empty());
    }

    #[tokio::test]
    async fn superseded_turn_is_aborted() {
        let chat = Arc::new(
            MockChatClient::replying([Ok("vieja".to_string()), Ok("nueva".to_string())]).with_delay(
                Duration::from_millis(50)
            )
        );
        let assistant = assistant(Some(chat.clone()), None);
        let mut session = assistant.open_session().await;
        let mut tasks = TaskSet::new();

        let first = session.submit("primera pregunta");
        assistant.execute(first, &mut tasks);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = session.submit("segunda pregunta");
        assistant.settle(&mut session, second, &mut tasks).await;

        let replies: Vec<_> = session
            .transcript()
            .messages()
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(replies, vec![session.prompts().greeting.as_str(), "nueva"]);
        assert_eq!(chat.requests().len(), 2);
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn panicking_completion_still_ends_the_turn() {
        let assistant = assistant(None, None);
        let mut session = assistant.open_session().await;
        let mut tasks = TaskSet::new();

        let turn = match &session.submit("hola")[..] {
            [Effect::RequestCompletion { turn, .. }] => *turn,
            other => panic!("unexpected effects {:?}", other),
        };
        tasks.spawn_completion(turn, async move {
            if turn > 0 {
                panic!("provider client bug");
            }
            Outcome::Completion { turn, result: Ok(String::new()) }
        });

        let outcome = tasks.next().await.unwrap();
        assert!(
            matches!(&outcome, Outcome::Completion { turn: t, result: Err(ServiceError::Transport(_)) } if *t == turn)
        );
        session.apply(outcome);
        assert!(!session.is_busy());
        assert_eq!(session.transcript().last().unwrap().content, session.prompts().llm_failed);
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn contact_form_resets_after_delay() {
        let email = Arc::new(MockEmailSender::default());
        let assistant = assistant(None, Some(email.clone()));
        let mut session = assistant.open_session().await;
        let mut tasks = TaskSet::new();

        let effects = session.submit_contact_form(TemplateParams {
            user_name: "Ana".into(),
            user_email: "ana@x.com".into(),
            message: "Hola Erick".into(),
        });
        assistant.execute(effects, &mut tasks);

        let outcome = tasks.next().await.unwrap();
        let follow_up = session.apply(outcome);
        assert_eq!(session.form_view().status, FormStatus::Success);
        assistant.settle(&mut session, follow_up, &mut tasks).await;

        assert_eq!(session.form_view().status, FormStatus::Idle);
        assert_eq!(email.sent()[0].message, "Hola Erick");
    }

    #[tokio::test]
    async fn stateless_contact_form_reports_not_configured() {
        let assistant = assistant(None, None);
        let err = assistant
            .send_contact_form(TemplateParams {
                user_name: "Ana".into(),
                user_email: "ana@x.com".into(),
                message: "hola".into(),
            }).await
            .unwrap_err();
        assert!(err.is_not_configured());
    }

    #[tokio::test]
    async fn reload_picks_up_changed_prompt_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "greeting": "Hola v1" }}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let initial = prompt::load_prompts(&path).unwrap();
        let assistant = Assistant::new(
            None,
            None,
            initial,
            Some(path.clone()),
            SessionSettings::default()
        );
        assert!(!assistant.reload_prompts_if_changed().await.unwrap());

        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(&path, r#"{ "greeting": "Hola v2" }"#).unwrap();
        assert!(assistant.reload_prompts_if_changed().await.unwrap());

        let session = assistant.open_session().await;
        assert_eq!(session.transcript().messages()[0].content, "Hola v2");
    }
}
