use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use uuid::Uuid;

use crate::backend::{AppHandle, MessageHandler, MessagingClient, PushBackend};
use crate::config::Configuration;
use crate::error::BackendError;
use crate::model::InboundMessage;

const DEFAULT_APP_NAME: &str = "[DEFAULT]";
const UNCOMPRESSED_P256_LEN: usize = 65;

struct TransportState {
    focused: bool,
    issue_tokens: bool,
    foreground: Vec<MessageHandler>,
    background: Vec<MessageHandler>,
}

struct Transport {
    state: Mutex<TransportState>,
    token_requests: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Foreground(usize),
    Background(usize),
    Dropped,
}

#[derive(Clone)]
pub struct LoopbackBackend {
    transport: Arc<Transport>,
    apps: Arc<Mutex<HashSet<String>>>,
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBackend {
    pub fn new() -> Self {
        LoopbackBackend {
            transport: Arc::new(Transport {
                state: Mutex::new(TransportState {
                    focused: true,
                    issue_tokens: true,
                    foreground: Vec::new(),
                    background: Vec::new(),
                }),
                token_requests: AtomicUsize::new(0),
            }),
            apps: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// A backend for another execution context: same transport, fresh app registry.
    pub fn new_context(&self) -> Self {
        LoopbackBackend {
            transport: self.transport.clone(),
            apps: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn set_focused(&self, focused: bool) {
        self.transport.state.lock().focused = focused;
        tracing::debug!(%focused, "Page focus changed.");
    }

    /// When disabled, `get_token` succeeds without issuing a token.
    pub fn set_issue_tokens(&self, issue_tokens: bool) {
        self.transport.state.lock().issue_tokens = issue_tokens;
    }

    pub fn token_requests(&self) -> usize {
        self.transport.token_requests.load(Ordering::SeqCst)
    }

    pub fn deliver(&self, message: InboundMessage) -> Delivery {
        let (delivery, handlers) = {
            let state = self.transport.state.lock();
            if state.focused && !state.foreground.is_empty() {
                (
                    Delivery::Foreground(state.foreground.len()),
                    state.foreground.clone(),
                )
            } else if !state.background.is_empty() {
                (
                    Delivery::Background(state.background.len()),
                    state.background.clone(),
                )
            } else {
                (Delivery::Dropped, Vec::new())
            }
        };

        tracing::debug!(?delivery, "Delivering inbound message.");
        for handler in handlers {
            handler(message.clone());
        }

        delivery
    }

    pub fn apply(&self, command: TransportCommand) -> Option<Delivery> {
        match command {
            TransportCommand::Focus => {
                self.set_focused(true);
                None
            }
            TransportCommand::Blur => {
                self.set_focused(false);
                None
            }
            TransportCommand::Deliver(message) => Some(self.deliver(message)),
        }
    }

    /// Applies one command per line until the reader is exhausted.
    pub async fn feed<R>(&self, reader: R) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            match TransportCommand::parse(&line) {
                Ok(command) => {
                    if let Some(delivery) = self.apply(command) {
                        tracing::info!(?delivery, "Inbound message delivered.");
                    }
                }
                Err(error) => tracing::warn!(%error, "Ignoring transport command."),
            }
        }

        Ok(())
    }
}

impl PushBackend for LoopbackBackend {
    fn initialize_app(&self, config: &Configuration) -> Result<AppHandle, BackendError> {
        if let Err(missing) = config.validate() {
            return Err(BackendError::new(
                "app/invalid-app-options",
                format!("missing {}", missing.join(", ")),
            ));
        }

        let mut apps = self.apps.lock();
        if !apps.insert(DEFAULT_APP_NAME.to_string()) {
            return Err(BackendError::new(
                "app/duplicate-app",
                format!("Firebase App named '{}' already exists", DEFAULT_APP_NAME),
            ));
        }

        Ok(AppHandle {
            name: DEFAULT_APP_NAME.to_string(),
            project_id: config.project_id.clone(),
        })
    }

    fn get_messaging(&self, app: &AppHandle) -> Result<Arc<dyn MessagingClient>, BackendError> {
        if !self.apps.lock().contains(&app.name) {
            return Err(BackendError::new(
                "app/no-app",
                format!("No Firebase App '{}' has been created", app.name),
            ));
        }

        Ok(Arc::new(LoopbackClient {
            transport: self.transport.clone(),
            project_id: app.project_id.clone(),
            token: Mutex::new(None),
        }))
    }
}

struct LoopbackClient {
    transport: Arc<Transport>,
    project_id: String,
    token: Mutex<Option<String>>,
}

fn validate_vapid_key(vapid_key: &str) -> Result<(), BackendError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(vapid_key.trim_end_matches('='))
        .map_err(|error| BackendError::new("messaging/invalid-vapid-key", error.to_string()))?;

    if decoded.len() != UNCOMPRESSED_P256_LEN || decoded[0] != 0x04 {
        return Err(BackendError::new(
            "messaging/invalid-vapid-key",
            "expected an uncompressed P-256 public key",
        ));
    }

    Ok(())
}

#[async_trait]
impl MessagingClient for LoopbackClient {
    async fn get_token(&self, vapid_key: &str) -> Result<Option<String>, BackendError> {
        self.transport.token_requests.fetch_add(1, Ordering::SeqCst);
        validate_vapid_key(vapid_key)?;

        if !self.transport.state.lock().issue_tokens {
            return Ok(None);
        }

        let mut token = self.token.lock();
        let token = token.get_or_insert_with(|| {
            format!("{}:{}", self.project_id, Uuid::new_v4().simple())
        });

        Ok(Some(token.clone()))
    }

    fn on_message(&self, handler: MessageHandler) {
        self.transport.state.lock().foreground.push(handler);
    }

    fn on_background_message(&self, handler: MessageHandler) {
        self.transport.state.lock().background.push(handler);
    }
}

/// One line of input driving the loopback transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Focus,
    Blur,
    Deliver(InboundMessage),
}

impl TransportCommand {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        match line.trim() {
            "focus" => Ok(TransportCommand::Focus),
            "blur" => Ok(TransportCommand::Blur),
            json => serde_json::from_str(json).map(TransportCommand::Deliver),
        }
    }
}
