use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::config::{ConfigStatus, Configuration};
use crate::environment::Clipboard;
use crate::gateway::MessagingGateway;
use crate::logging::LogError;
use crate::model::{DisplayedMessage, RegistrationToken};
use crate::worker::{WorkerHost, WorkerMessage, WorkerRegistration, WORKER_SCRIPT_PATH};

pub const TOKEN_ERROR_MESSAGE: &str = "Failed to get FCM token. Please check your Firebase configuration and notification permissions.";

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TokenState {
    Idle,
    Loading,
    Obtained { token: RegistrationToken },
    Error { message: String },
}

#[derive(Error, Debug)]
pub enum CopyError {
    #[error("no token to copy")]
    NoToken,

    #[error("could not write to clipboard: {0}")]
    Clipboard(#[from] anyhow::Error),
}

/// Snapshot of everything the page renders.
#[derive(Serialize, Debug, Clone)]
pub struct PageView {
    pub token: TokenState,
    pub can_fetch_token: bool,
    pub can_copy_token: bool,
    pub messages: Vec<DisplayedMessage>,
    pub config_status: Vec<ConfigStatus>,
}

struct PageState {
    token: TokenState,
    messages: Vec<DisplayedMessage>,
    mounted: bool,
}

pub struct PageController {
    gateway: Arc<MessagingGateway>,
    config: Configuration,
    workers: WorkerHost,
    clipboard: Arc<dyn Clipboard>,
    state: Arc<Mutex<PageState>>,
    worker: Mutex<Option<WorkerRegistration>>,
}

impl PageController {
    pub fn new(
        gateway: Arc<MessagingGateway>,
        config: Configuration,
        workers: WorkerHost,
        clipboard: Arc<dyn Clipboard>,
    ) -> Self {
        PageController {
            gateway,
            config,
            workers,
            clipboard,
            state: Arc::new(Mutex::new(PageState {
                token: TokenState::Idle,
                messages: Vec::new(),
                mounted: false,
            })),
            worker: Mutex::new(None),
        }
    }

    /// Subscribes to foreground deliveries and hands the configuration to a
    /// freshly registered worker. Only the first call has any effect.
    pub async fn mount(&self) {
        {
            let mut state = self.state.lock();
            if state.mounted {
                tracing::debug!("Page already mounted.");
                return;
            }
            state.mounted = true;
        }

        let state = self.state.clone();
        let subscribed = self.gateway.subscribe_foreground(move |message| {
            tracing::info!(?message, "Received foreground message.");
            let captured = DisplayedMessage::capture(&message, Utc::now());
            state.lock().messages.insert(0, captured);
        });
        if !subscribed {
            tracing::warn!("Messaging disabled, foreground messages will not be shown.");
        }

        self.register_worker().await;
    }

    async fn register_worker(&self) {
        let mut registration = match self.workers.register(WORKER_SCRIPT_PATH) {
            Ok(registration) => registration,
            Err(error) => {
                tracing::error!(%error, "Service Worker registration failed.");
                return;
            }
        };

        if registration.wait_active().await {
            let handoff = WorkerMessage::InitFirebase {
                config: self.config.clone(),
            };
            registration
                .post_message(&handoff)
                .log_error("Could not send configuration to worker");
        } else {
            tracing::warn!("Worker is not active, configuration not sent.");
        }

        *self.worker.lock() = Some(registration);
    }

    /// Runs the token action. Once it has left `Idle` the action is
    /// disabled and the current state is returned without touching the
    /// backend.
    pub async fn fetch_token(&self) -> TokenState {
        {
            let mut state = self.state.lock();
            if state.token != TokenState::Idle {
                tracing::debug!(token = ?state.token, "Token action disabled.");
                return state.token.clone();
            }
            state.token = TokenState::Loading;
        }

        let next = match self.gateway.request_permission().await {
            Ok(Some(token)) => TokenState::Obtained { token },
            Ok(None) => TokenState::Error {
                message: TOKEN_ERROR_MESSAGE.to_string(),
            },
            Err(error) => TokenState::Error {
                message: error.to_string(),
            },
        };

        self.state.lock().token = next.clone();
        next
    }

    pub fn token(&self) -> Option<RegistrationToken> {
        match &self.state.lock().token {
            TokenState::Obtained { token } => Some(token.clone()),
            _ => None,
        }
    }

    pub fn copy_token(&self) -> Result<(), CopyError> {
        let token = self.token().ok_or(CopyError::NoToken)?;
        self.clipboard.write_text(token.as_str())?;
        tracing::info!("Token copied to clipboard.");
        Ok(())
    }

    pub fn view(&self) -> PageView {
        let state = self.state.lock();
        PageView {
            token: state.token.clone(),
            can_fetch_token: state.token == TokenState::Idle,
            can_copy_token: matches!(state.token, TokenState::Obtained { .. }),
            messages: state.messages.clone(),
            config_status: self.config.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::test_configuration;
    use crate::environment::{HostEnvironment, PermissionPolicy};
    use crate::loopback::{Delivery, LoopbackBackend};
    use crate::model::InboundMessage;
    use crate::worker::tests::RecordingSurface;

    #[derive(Default)]
    struct RecordingClipboard {
        written: Mutex<Vec<String>>,
    }

    impl Clipboard for RecordingClipboard {
        fn write_text(&self, text: &str) -> anyhow::Result<()> {
            self.written.lock().push(text.to_string());
            Ok(())
        }
    }

    struct Fixture {
        controller: PageController,
        backend: LoopbackBackend,
        clipboard: Arc<RecordingClipboard>,
        surface: Arc<RecordingSurface>,
    }

    fn fixture(config: Configuration, environment: HostEnvironment) -> Fixture {
        let backend = LoopbackBackend::new();
        let gateway = MessagingGateway::initialize(&config, &backend, Arc::new(environment));
        let surface = Arc::new(RecordingSurface::default());
        let workers = WorkerHost::new(Arc::new(backend.new_context()), surface.clone());
        let clipboard = Arc::new(RecordingClipboard::default());
        let controller = PageController::new(Arc::new(gateway), config, workers, clipboard.clone());

        Fixture {
            controller,
            backend,
            clipboard,
            surface,
        }
    }

    fn granted() -> Fixture {
        fixture(
            test_configuration(),
            HostEnvironment::new(PermissionPolicy::Grant),
        )
    }

    #[tokio::test]
    async fn shows_foreground_messages_newest_first() {
        let fixture = granted();
        fixture.controller.mount().await;

        fixture
            .backend
            .deliver(InboundMessage::with_notification("M1", "first"));
        fixture
            .backend
            .deliver(InboundMessage::with_notification("M2", "second"));

        let titles: Vec<_> = fixture
            .controller
            .view()
            .messages
            .into_iter()
            .map(|message| message.title)
            .collect();
        assert_eq!(titles, vec!["M2", "M1"]);
    }

    #[tokio::test]
    async fn subscribes_once_per_mount() {
        let fixture = granted();
        fixture.controller.mount().await;
        fixture.controller.mount().await;

        assert_eq!(
            fixture.backend.deliver(InboundMessage::default()),
            Delivery::Foreground(1)
        );
        assert_eq!(fixture.controller.view().messages.len(), 1);
    }

    #[tokio::test]
    async fn hands_configuration_to_the_worker() {
        let fixture = granted();
        fixture.controller.mount().await;
        fixture.backend.set_focused(false);

        let delivered = tokio::time::timeout(Duration::from_secs(1), async {
            while fixture
                .backend
                .deliver(InboundMessage::with_notification("T", "B"))
                != Delivery::Background(1)
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        assert!(delivered.is_ok());
        assert_eq!(fixture.surface.shown.lock()[0].0, "T");
    }

    #[tokio::test]
    async fn token_action_runs_once() {
        let fixture = granted();
        assert!(fixture.controller.view().can_fetch_token);

        let first = fixture.controller.fetch_token().await;
        let second = fixture.controller.fetch_token().await;

        assert!(matches!(first, TokenState::Obtained { .. }));
        assert_eq!(first, second);
        assert_eq!(fixture.backend.token_requests(), 1);

        let view = fixture.controller.view();
        assert!(!view.can_fetch_token);
        assert!(view.can_copy_token);
    }

    #[tokio::test]
    async fn failed_token_action_shows_an_error_and_stays_disabled() {
        let config = Configuration {
            vapid_key: Some("bogus".to_string()),
            ..test_configuration()
        };
        let fixture = fixture(config, HostEnvironment::new(PermissionPolicy::Grant));

        let state = fixture.controller.fetch_token().await;
        assert_eq!(
            state,
            TokenState::Error {
                message: TOKEN_ERROR_MESSAGE.to_string()
            }
        );

        fixture.controller.fetch_token().await;
        assert_eq!(fixture.backend.token_requests(), 1);
        assert!(!fixture.controller.view().can_fetch_token);
    }

    #[tokio::test]
    async fn unsupported_environment_surfaces_its_message() {
        let fixture = fixture(
            test_configuration(),
            HostEnvironment::new(PermissionPolicy::Grant).with_capabilities(false, true),
        );

        let state = fixture.controller.fetch_token().await;

        assert_eq!(
            state,
            TokenState::Error {
                message: "Firebase Messaging is not supported in this browser".to_string()
            }
        );
    }

    #[tokio::test]
    async fn copies_only_an_obtained_token() {
        let fixture = granted();
        assert!(matches!(
            fixture.controller.copy_token(),
            Err(CopyError::NoToken)
        ));

        fixture.controller.fetch_token().await;
        fixture.controller.copy_token().unwrap();

        let token = fixture.controller.token().unwrap();
        assert_eq!(*fixture.clipboard.written.lock(), vec![token.to_string()]);
    }
}
