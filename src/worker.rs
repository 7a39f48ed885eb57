use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use crate::backend::{MessagingClient, PushBackend};
use crate::config::Configuration;
use crate::logging::LogError;
use crate::model::{InboundMessage, NotificationOptions, DEFAULT_BODY, DEFAULT_ICON, DEFAULT_TITLE};
use crate::notification::NotificationSurface;

pub const WORKER_SCRIPT_PATH: &str = "/firebase-messaging-sw.js";
const INIT_MESSAGE_TYPE: &str = "INIT_FIREBASE";

/// Messages the page may post to the worker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    #[serde(rename = "INIT_FIREBASE")]
    InitFirebase { config: Configuration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Activated,
    Redundant,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("invalid worker script path: {0}")]
    InvalidScriptPath(String),

    #[error("worker is no longer running")]
    Closed,

    #[error("could not encode worker message: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct BackgroundWorker {
    backend: Arc<dyn PushBackend>,
    surface: Arc<dyn NotificationSurface>,
    client: Option<Arc<dyn MessagingClient>>,
}

impl BackgroundWorker {
    pub fn new(backend: Arc<dyn PushBackend>, surface: Arc<dyn NotificationSurface>) -> Self {
        BackgroundWorker {
            backend,
            surface,
            client: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.client.is_some()
    }

    pub fn handle_raw(&mut self, raw: &str) {
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(error) => {
                tracing::debug!(%error, "Ignoring unrecognised worker message.");
                return;
            }
        };

        let is_handoff =
            value.get("type").and_then(serde_json::Value::as_str) == Some(INIT_MESSAGE_TYPE);
        match serde_json::from_value::<WorkerMessage>(value) {
            Ok(message) => self.handle(message),
            Err(error) if is_handoff => {
                tracing::error!(%error, "Firebase initialization error in worker: malformed configuration.");
            }
            Err(error) => tracing::debug!(%error, "Ignoring unrecognised worker message."),
        }
    }

    pub fn handle(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::InitFirebase { config } => self.initialize(&config),
        }
    }

    /// Once a client exists, further handoffs are ignored. A failed
    /// initialization leaves the worker waiting for the next handoff.
    fn initialize(&mut self, config: &Configuration) {
        if self.client.is_some() {
            tracing::debug!("Worker already initialized, ignoring configuration handoff.");
            return;
        }

        let Some(client) = self
            .backend
            .initialize_app(config)
            .and_then(|app| self.backend.get_messaging(&app))
            .log_error("Firebase initialization error in worker")
        else {
            return;
        };

        let surface = self.surface.clone();
        client.on_background_message(Arc::new(move |message| {
            show_background_notification(surface.as_ref(), &message);
        }));

        tracing::info!(project_id = %config.project_id, "Worker initialized.");
        self.client = Some(client);
    }

    async fn run(mut self, mut messages: mpsc::UnboundedReceiver<String>) {
        while let Some(raw) = messages.recv().await {
            self.handle_raw(&raw);
        }

        tracing::debug!("Worker channel closed.");
    }
}

pub fn show_background_notification(surface: &dyn NotificationSurface, message: &InboundMessage) {
    tracing::info!(?message, "Received background message.");

    let title = message.title().unwrap_or(DEFAULT_TITLE);
    let options = NotificationOptions {
        body: message.body().unwrap_or(DEFAULT_BODY).to_string(),
        icon: message.icon().unwrap_or(DEFAULT_ICON).to_string(),
    };

    surface
        .show_notification(title, &options)
        .log_error("Could not show notification");
}

/// Spawns background workers for the page.
#[derive(Clone)]
pub struct WorkerHost {
    backend: Arc<dyn PushBackend>,
    surface: Arc<dyn NotificationSurface>,
}

impl WorkerHost {
    /// `backend` must belong to the worker's own context, not the page's.
    pub fn new(backend: Arc<dyn PushBackend>, surface: Arc<dyn NotificationSurface>) -> Self {
        WorkerHost { backend, surface }
    }

    pub fn register(&self, script_path: &str) -> Result<WorkerRegistration, WorkerError> {
        if !script_path.starts_with('/') {
            return Err(WorkerError::InvalidScriptPath(script_path.to_string()));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(WorkerState::Installing);
        let worker = BackgroundWorker::new(self.backend.clone(), self.surface.clone());

        let span = tracing::info_span!("worker", script = %script_path);
        tokio::spawn(
            async move {
                let _ = state_tx.send(WorkerState::Activated);
                worker.run(receiver).await;
                let _ = state_tx.send(WorkerState::Redundant);
            }
            .instrument(span),
        );

        tracing::info!(%script_path, "Worker registered.");

        Ok(WorkerRegistration {
            sender,
            state: state_rx,
        })
    }
}

/// The page's handle on a registered worker. Dropping it stops the worker.
pub struct WorkerRegistration {
    sender: mpsc::UnboundedSender<String>,
    state: watch::Receiver<WorkerState>,
}

impl WorkerRegistration {
    /// Waits for installation to finish; `true` if the worker is active.
    pub async fn wait_active(&mut self) -> bool {
        loop {
            let current = *self.state.borrow();
            match current {
                WorkerState::Activated => return true,
                WorkerState::Redundant => return false,
                WorkerState::Installing => {}
            }

            if self.state.changed().await.is_err() {
                return *self.state.borrow() == WorkerState::Activated;
            }
        }
    }

    pub fn post_message(&self, message: &WorkerMessage) -> Result<(), WorkerError> {
        let raw = serde_json::to_string(message)?;
        self.sender.send(raw).map_err(|_| WorkerError::Closed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::config::test_configuration;
    use crate::loopback::{Delivery, LoopbackBackend};

    #[derive(Default)]
    pub struct RecordingSurface {
        pub shown: Mutex<Vec<(String, NotificationOptions)>>,
    }

    impl NotificationSurface for RecordingSurface {
        fn show_notification(
            &self,
            title: &str,
            options: &NotificationOptions,
        ) -> anyhow::Result<()> {
            self.shown.lock().push((title.to_string(), options.clone()));
            Ok(())
        }
    }

    fn worker() -> (BackgroundWorker, LoopbackBackend, Arc<RecordingSurface>) {
        let backend = LoopbackBackend::new();
        backend.set_focused(false);
        let surface = Arc::new(RecordingSurface::default());
        let worker = BackgroundWorker::new(Arc::new(backend.clone()), surface.clone());
        (worker, backend, surface)
    }

    fn init_message() -> WorkerMessage {
        WorkerMessage::InitFirebase {
            config: test_configuration(),
        }
    }

    #[test]
    fn wire_format_matches_the_page_handoff() {
        let json = serde_json::to_value(init_message()).unwrap();

        assert_eq!(json["type"], "INIT_FIREBASE");
        assert_eq!(json["config"]["projectId"], "demo-project");
    }

    #[test]
    fn registers_one_background_handler_and_ignores_repeat_handoffs() {
        let (mut worker, backend, surface) = worker();
        assert_eq!(backend.deliver(InboundMessage::default()), Delivery::Dropped);

        worker.handle(init_message());
        worker.handle(init_message());

        assert!(worker.is_initialized());
        assert_eq!(
            backend.deliver(InboundMessage::with_notification("T", "B")),
            Delivery::Background(1)
        );
        assert_eq!(surface.shown.lock().len(), 1);
    }

    #[test]
    fn shows_payload_title_and_body() {
        let (mut worker, backend, surface) = worker();
        worker.handle(init_message());

        backend.deliver(serde_json::from_str(r#"{"notification": {"title": "T", "body": "B"}}"#).unwrap());

        let shown = surface.shown.lock();
        assert_eq!(shown[0].0, "T");
        assert_eq!(shown[0].1.body, "B");
        assert_eq!(shown[0].1.icon, DEFAULT_ICON);
        assert_eq!(shown[0].1.icon, "/vite.svg");
    }

    #[test]
    fn falls_back_when_payload_has_no_notification() {
        let (mut worker, backend, surface) = worker();
        worker.handle(init_message());

        backend.deliver(serde_json::from_str(r#"{"data": {"k": "v"}}"#).unwrap());

        let shown = surface.shown.lock();
        assert_eq!(shown[0].0, DEFAULT_TITLE);
        assert_eq!(shown[0].1.body, DEFAULT_BODY);
    }

    #[test]
    fn survives_invalid_configuration_and_unknown_messages() {
        let (mut worker, _backend, _surface) = worker();

        worker.handle_raw(r#"{"type": "SKIP_WAITING"}"#);
        worker.handle_raw("not json");
        worker.handle(WorkerMessage::InitFirebase {
            config: Configuration::default(),
        });
        assert!(!worker.is_initialized());

        worker.handle_raw(&serde_json::to_string(&init_message()).unwrap());
        assert!(worker.is_initialized());
    }

    #[test]
    fn malformed_handoff_leaves_the_worker_waiting() {
        let (mut worker, backend, _surface) = worker();

        worker.handle_raw(r#"{"type": "INIT_FIREBASE", "config": {"apiKey": 42}}"#);
        assert!(!worker.is_initialized());
        assert_eq!(backend.deliver(InboundMessage::default()), Delivery::Dropped);

        worker.handle(init_message());
        assert!(worker.is_initialized());
    }

    #[test]
    fn rejects_relative_script_paths() {
        let host = WorkerHost::new(
            Arc::new(LoopbackBackend::new()),
            Arc::new(RecordingSurface::default()),
        );

        assert!(matches!(
            host.register("sw.js"),
            Err(WorkerError::InvalidScriptPath(_))
        ));
    }

    #[tokio::test]
    async fn registered_worker_initializes_from_posted_configuration() {
        let backend = LoopbackBackend::new();
        backend.set_focused(false);
        let surface = Arc::new(RecordingSurface::default());
        let host = WorkerHost::new(Arc::new(backend.new_context()), surface.clone());

        let mut registration = host.register(WORKER_SCRIPT_PATH).unwrap();
        assert!(registration.wait_active().await);
        registration.post_message(&init_message()).unwrap();

        let delivered = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if backend.deliver(InboundMessage::with_notification("T", "B"))
                    == Delivery::Background(1)
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        assert!(delivered.is_ok());
        assert_eq!(surface.shown.lock()[0].0, "T");
    }
}
