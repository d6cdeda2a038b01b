use crate::agent::{ Assistant, TaskSet };
use crate::cli::Args;
use crate::effect::Effect;
use crate::email::TemplateParams;
use crate::models::websocket::{ ClientMessage, QuickActionButton, ServerMessage };
use crate::render::render;
use crate::server::auth;
use crate::session::{ FormView, Session };

use std::error::Error;
use std::fmt::Display;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };
use tokio::time::{ interval_at, Instant, MissedTickBehavior };

use tokio_tungstenite::{ accept_hdr_async, WebSocketStream };
use tokio_tungstenite::tungstenite::handshake::server::{ Request, Response, ErrorResponse };
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_rustls::TlsAcceptor;

use rustls::ServerConfig;
use rustls::pki_types::{ CertificateDer, PrivateKeyDer };
use rustls_pemfile::{ certs, pkcs8_private_keys };

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use chrono::Utc;
use log::{ debug, info, warn, error };
use futures::{ Sink, SinkExt, StreamExt };

const MAX_MESSAGE_SIZE: usize = 64 * 1024;
const CONNECTIONS_PER_SECOND: NonZeroU32 = match NonZeroU32::new(10) {
    Some(n) => n,
    None => NonZeroU32::MIN,
};

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(CONNECTIONS_PER_SECOND));
}

pub(crate) fn load_tls_config(
    cert_path: &str,
    key_path: &str
) -> Result<Arc<ServerConfig>, Box<dyn Error + Send + Sync>> {
    let cert_file = File::open(cert_path).map_err(|e|
        format!("Failed to open TLS certificate file '{}': {}", cert_path, e)
    )?;
    let key_file = File::open(key_path).map_err(|e|
        format!("Failed to open TLS key file '{}': {}", key_path, e)
    )?;

    let mut cert_reader = BufReader::new(cert_file);
    let mut key_reader = BufReader::new(key_file);
    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Failed to read certificate(s): {}", e))?;

    let mut keys = pkcs8_private_keys(&mut key_reader);
    let key = match keys.next() {
        Some(Ok(k)) => PrivateKeyDer::Pkcs8(k),
        Some(Err(e)) => {
            return Err(format!("Error reading private key: {}", e).into());
        }
        None => {
            return Err("No PKCS8 private key found in key file".into());
        }
    };

    let config = ServerConfig::builder().with_no_client_auth().with_single_cert(cert_chain, key)?;
    Ok(Arc::new(config))
}

pub(crate) fn tls_paths(args: &Args) -> Result<Option<(&str, &str)>, Box<dyn Error + Send + Sync>> {
    if !args.enable_tls {
        return Ok(None);
    }
    match (&args.tls_cert_path, &args.tls_key_path) {
        (Some(cert_path), Some(key_path)) => Ok(Some((cert_path.as_str(), key_path.as_str()))),
        (Some(_), None) | (None, Some(_)) => {
            error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
            Err("Missing TLS certificate or key path".into())
        }
        (None, None) => {
            error!("--enable-tls was set but no certificate/key paths provided.");
            Err("TLS enabled without cert/key".into())
        }
    }
}

pub async fn start_ws_server(
    addr: &str,
    assistant: Arc<Assistant>,
    args: Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    let tls_acceptor = match tls_paths(&args)? {
        Some((cert_path, key_path)) => {
            info!(
                "TLS enabled. Loading certificate from '{}' and key from '{}'",
                cert_path,
                key_path
            );
            let config = load_tls_config(cert_path, key_path)?;
            Some(TlsAcceptor::from(config))
        }
        None => {
            info!("TLS not enabled. Running plain WebSocket (WS) server.");
            None
        }
    };
    let protocol = if tls_acceptor.is_some() { "wss" } else { "ws" };
    info!("{} server listening on: {}", protocol.to_uppercase(), addr);

    let bubble_interval = Duration::from_secs(args.bubble_interval_secs.max(1));

    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let assistant_clone = Arc::clone(&assistant);
        let required_api_key = args.server_api_key.clone();
        let tls_acceptor_clone = tls_acceptor.clone();

        tokio::spawn(async move {
            let process_result = if let Some(acceptor) = tls_acceptor_clone {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        info!("TLS handshake successful for {}", peer);
                        process_connection(
                            peer,
                            tls_stream,
                            assistant_clone,
                            required_api_key,
                            bubble_interval
                        ).await
                    }
                    Err(e) => {
                        error!("TLS handshake error for {}: {}", peer, e);
                        Err(Box::new(e) as Box<dyn Error + Send + Sync>)
                    }
                }
            } else {
                process_connection(
                    peer,
                    stream,
                    assistant_clone,
                    required_api_key,
                    bubble_interval
                ).await
            };

            if let Err(e) = process_result {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

fn reject(reason: String) -> ErrorResponse {
    let mut res = ErrorResponse::new(Some(reason));
    *res.status_mut() = StatusCode::UNAUTHORIZED;
    res
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    assistant: Arc<Assistant>,
    required_api_key: Option<String>,
    bubble_interval: Duration
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let header_key = req
            .headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok());
        let query = req.uri().query().unwrap_or("");

        match auth::authorize(required_api_key.as_deref(), query, header_key, Utc::now().timestamp()) {
            Ok(()) => Ok(response),
            Err(e) => {
                warn!("Rejected handshake from {}: {}", peer, e);
                Err(reject(e.to_string()))
            }
        }
    };

    match accept_hdr_async(stream, auth_callback).await {
        Ok(ws) => {
            handle_connection(peer, ws, assistant, bubble_interval).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

struct ClientView {
    sent: usize,
    busy: bool,
    form: FormView,
}

impl ClientView {
    fn new(session: &Session) -> Self {
        Self {
            sent: 0,
            busy: false,
            form: session.form_view(),
        }
    }

    fn sync(&mut self, session: &Session) -> Vec<ServerMessage> {
        let mut frames = Vec::new();

        for message in session.transcript().since(self.sent) {
            let rendered = render(&message.content);
            frames.push(ServerMessage::Message {
                role: message.role,
                content: rendered.text,
                show_whatsapp: rendered.show_whatsapp,
                timestamp: message.timestamp,
            });
        }
        self.sent = session.transcript().len();

        match (self.busy, session.is_busy()) {
            (false, true) => frames.push(ServerMessage::Processing),
            (true, false) => frames.push(ServerMessage::Done),
            _ => {}
        }
        self.busy = session.is_busy();

        let form = session.form_view();
        if form != self.form {
            frames.push(ServerMessage::FormStatus {
                status: form.status,
                sending: form.sending,
                message: form.message.clone(),
            });
            self.form = form;
        }
        frames
    }
}

fn welcome(session: &Session) -> ServerMessage {
    let prompts = session.prompts();
    ServerMessage::Welcome {
        session_id: session.id().to_string(),
        whatsapp_url: prompts.whatsapp_url.clone(),
        quick_actions: prompts.quick_actions
            .iter()
            .map(|def| QuickActionButton { action: def.action, label: def.label.clone() })
            .collect(),
    }
}

fn bubble(session: &Session) -> Option<ServerMessage> {
    session.bubble_text().map(|content| ServerMessage::Bubble { content: content.to_string() })
}

fn dispatch(session: &mut Session, frame: ClientMessage) -> (Vec<Effect>, Option<ServerMessage>) {
    match frame {
        ClientMessage::Chat { content } => (session.submit(&content), None),
        ClientMessage::QuickAction { action } => (session.quick_action(action), None),
        ClientMessage::Open => {
            session.open_widget();
            (Vec::new(), None)
        }
        ClientMessage::Close => {
            session.close_widget();
            (Vec::new(), bubble(session))
        }
        ClientMessage::ContactForm { user_name, user_email, message } => {
            let params = TemplateParams { user_name, user_email, message };
            (session.submit_contact_form(params), None)
        }
    }
}

async fn send_frame<S>(tx: &mut S, frame: &ServerMessage) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: Sink<Message> + Unpin, S::Error: Display
{
    let json = serde_json::to_string(frame)?;
    tx.send(Message::Text(json)).await.map_err(|e| format!("Failed to send frame: {}", e))?;
    Ok(())
}

async fn send_all<S>(tx: &mut S, frames: Vec<ServerMessage>) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: Sink<Message> + Unpin, S::Error: Display
{
    for frame in &frames {
        send_frame(tx, frame).await?;
    }
    Ok(())
}

pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    assistant: Arc<Assistant>,
    bubble_interval: Duration
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    info!("New WebSocket connection: {}", peer);

    if let Err(e) = assistant.reload_prompts_if_changed().await {
        warn!("Prompt reload failed, keeping current prompts: {}", e);
    }

    let (mut tx, mut rx) = websocket.split();
    let mut session = assistant.open_session().await;
    let mut tasks = TaskSet::new();
    let mut view = ClientView::new(&session);
    info!("Assigned session ID {} to {}", session.id(), peer);

    let mut opening = vec![welcome(&session)];
    opening.extend(view.sync(&session));
    opening.extend(bubble(&session));
    if let Err(e) = send_all(&mut tx, opening).await {
        error!("Error sending welcome to {}: {}", peer, e);
        return;
    }

    let mut bubble_timer = interval_at(Instant::now() + bubble_interval, bubble_interval);
    bubble_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let mut replies = Vec::new();

        tokio::select! {
            msg = rx.next() => {
                let message = match msg {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        match e {
                            | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                            | tokio_tungstenite::tungstenite::Error::Protocol(_)
                            | tokio_tungstenite::tungstenite::Error::Utf8 => {
                                info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                            }
                            tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                                io_err.kind() == std::io::ErrorKind::ConnectionReset
                            => {
                                info!("WebSocket connection reset by peer {}", peer);
                            }
                            tokio_tungstenite::tungstenite::Error::Capacity(ref cap_err) => {
                                error!("WebSocket capacity error for {}: {}", peer, cap_err);
                                let error_msg = ServerMessage::Error {
                                    message: "Server capacity error".to_string(),
                                };
                                let _ = send_frame(&mut tx, &error_msg).await;
                            }
                            _ => {
                                error!("Error receiving message from {}: {}", peer, e);
                            }
                        }
                        break;
                    }
                    None => break,
                };

                if message.len() > MAX_MESSAGE_SIZE {
                    warn!(
                        "Message from {} exceeds size limit ({} > {})",
                        peer,
                        message.len(),
                        MAX_MESSAGE_SIZE
                    );
                    let error_msg = ServerMessage::Error {
                        message: "Message too large".to_string(),
                    };
                    if send_frame(&mut tx, &error_msg).await.is_err() {
                        error!("Failed to send size limit error to {}", peer);
                    }
                    break;
                }

                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(frame) => {
                                debug!("Session {}: received {:?}", session.id(), frame);
                                let (effects, reply) = dispatch(&mut session, frame);
                                assistant.execute(effects, &mut tasks);
                                replies.extend(reply);
                            }
                            Err(e) => {
                                error!("Failed to parse message from {}: {}", peer, e);
                                replies.push(ServerMessage::Error {
                                    message: format!("Failed to parse message: {}", e),
                                });
                            }
                        }
                    }
                    Message::Close(_) => {
                        info!("Received close frame from {}", peer);
                        break;
                    }
                    Message::Ping(ping_data) => {
                        if tx.send(Message::Pong(ping_data)).await.is_err() {
                            error!("Failed to send pong to {}", peer);
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Binary(_) => {
                        warn!("Ignoring binary message from {}", peer);
                    }
                    Message::Frame(_) => {}
                }
            }
            Some(outcome) = tasks.next(), if !tasks.is_empty() => {
                let effects = session.apply(outcome);
                assistant.execute(effects, &mut tasks);
            }
            _ = bubble_timer.tick() => {
                if let Some(content) = session.rotate_bubble() {
                    replies.push(ServerMessage::Bubble { content: content.to_string() });
                }
            }
        }

        replies.extend(view.sync(&session));
        if let Err(e) = send_all(&mut tx, replies).await {
            error!("Error sending to {}: {}", peer, e);
            break;
        }
    }

    if !tasks.is_empty() {
        info!("Aborting {} pending collaborator task(s) for {}", tasks.len(), peer);
    }
    drop(tasks);
    info!("WebSocket connection closed for {} (Session ID: {})", peer, session.id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::prompt::PromptConfig;
    use crate::contact::FormStatus;
    use crate::effect::Outcome;
    use crate::intent::QuickAction;
    use crate::models::chat::Role;
    use crate::session::SessionSettings;

    fn session() -> Session {
        Session::new(Arc::new(PromptConfig::default()), SessionSettings::default())
    }

    #[test]
    fn first_sync_sends_greeting() {
        let session = session();
        let mut view = ClientView::new(&session);
        let frames = view.sync(&session);
        assert_eq!(frames.len(), 1);
        assert!(
            matches!(&frames[0], ServerMessage::Message { role: Role::Assistant, content, .. } if *content == session.prompts().greeting)
        );
        assert!(view.sync(&session).is_empty());
    }

    #[test]
    fn forwarded_turn_brackets_with_processing_and_done() {
        let mut session = session();
        let mut view = ClientView::new(&session);
        view.sync(&session);

        let (effects, reply) = dispatch(&mut session, ClientMessage::Chat {
            content: "hola".into(),
        });
        assert!(reply.is_none());
        let frames = view.sync(&session);
        assert!(matches!(&frames[..], [ServerMessage::Message { role: Role::User, .. }, ServerMessage::Processing]));

        let turn = match &effects[..] {
            [Effect::RequestCompletion { turn, .. }] => *turn,
            other => panic!("unexpected effects {:?}", other),
        };
        session.apply(Outcome::Completion { turn, result: Ok("¡Hola!".into()) });
        let frames = view.sync(&session);
        assert!(matches!(&frames[..], [ServerMessage::Message { role: Role::Assistant, .. }, ServerMessage::Done]));
    }

    #[test]
    fn rendered_frames_hide_directive() {
        let mut session = session();
        let mut view = ClientView::new(&session);
        view.sync(&session);

        dispatch(&mut session, ClientMessage::QuickAction { action: QuickAction::WhatsAppHandoff });
        let frames = view.sync(&session);
        match &frames[..] {
            [ServerMessage::Message { role: Role::User, .. }, ServerMessage::Message { content, show_whatsapp, .. }] => {
                assert!(*show_whatsapp);
                assert!(!content.contains("[SHOW_WHATSAPP]"));
            }
            other => panic!("unexpected frames {:?}", other),
        }
    }

    #[test]
    fn widget_toggle_controls_bubble() {
        let mut session = session();
        let (_, reply) = dispatch(&mut session, ClientMessage::Open);
        assert!(reply.is_none());
        assert!(session.is_widget_open());

        let (_, reply) = dispatch(&mut session, ClientMessage::Close);
        assert!(matches!(reply, Some(ServerMessage::Bubble { .. })));
    }

    #[test]
    fn contact_form_reports_status() {
        let mut session = session();
        let mut view = ClientView::new(&session);
        view.sync(&session);

        dispatch(&mut session, ClientMessage::ContactForm {
            user_name: "".into(),
            user_email: "ana@x.com".into(),
            message: "hola".into(),
        });
        let frames = view.sync(&session);
        assert!(
            matches!(&frames[..], [ServerMessage::FormStatus { status: FormStatus::Error, sending: false, message: Some(_) }])
        );
    }
}
