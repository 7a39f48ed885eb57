use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;

use crate::backend::{MessagingClient, PushBackend};
use crate::config::Configuration;
use crate::environment::Environment;
use crate::error::{MessagingError, MessagingResult};
use crate::logging::LogError;
use crate::model::{InboundMessage, PermissionState, RegistrationToken};

/// The page's bridge to the push backend.
///
/// Created once at startup and shared by reference. When the host lacks
/// notification or worker support, or the backend refuses to initialize, the
/// gateway is disabled rather than failing.
pub struct MessagingGateway {
    client: Option<Arc<dyn MessagingClient>>,
    vapid_key: Option<String>,
    environment: Arc<dyn Environment>,
}

impl MessagingGateway {
    pub fn initialize(
        config: &Configuration,
        backend: &dyn PushBackend,
        environment: Arc<dyn Environment>,
    ) -> Self {
        let client = if environment.supports_notifications() && environment.supports_workers() {
            backend
                .initialize_app(config)
                .and_then(|app| backend.get_messaging(&app))
                .log_error("Firebase messaging initialization error")
        } else {
            tracing::warn!("Notifications or background workers unsupported, messaging disabled.");
            None
        };

        MessagingGateway {
            client,
            vapid_key: config.vapid_key.clone(),
            environment,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Prompts for notification permission and, once granted, requests a
    /// registration token.
    ///
    /// Only a disabled gateway is reported as an error. A denied prompt, a
    /// missing VAPID key and backend failures all yield `Ok(None)`.
    pub async fn request_permission(&self) -> MessagingResult<Option<RegistrationToken>> {
        let client = self
            .client
            .as_ref()
            .ok_or(MessagingError::UnsupportedEnvironment)?;

        match self.fetch_token(client.as_ref()).await {
            Ok(Some(token)) => {
                tracing::info!(%token, "FCM token issued.");
                Ok(Some(token))
            }
            Ok(None) => {
                tracing::info!("No registration token available.");
                Ok(None)
            }
            Err(MessagingError::PermissionDenied) => {
                tracing::info!("Notification permission denied.");
                Ok(None)
            }
            Err(error) => {
                tracing::error!(?error, "Error getting notification permission: {}", error);
                Ok(None)
            }
        }
    }

    async fn fetch_token(
        &self,
        client: &dyn MessagingClient,
    ) -> MessagingResult<Option<RegistrationToken>> {
        if self.environment.request_permission().await != PermissionState::Granted {
            return Err(MessagingError::PermissionDenied);
        }
        tracing::info!("Notification permission granted.");

        let vapid_key = self
            .vapid_key
            .as_deref()
            .ok_or(MessagingError::MissingVapidKey)?;
        let token = client.get_token(vapid_key).await?;

        Ok(token.map(RegistrationToken::new))
    }

    /// Registers a persistent handler for foreground deliveries. Returns
    /// `false` without registering anything when the gateway is disabled.
    pub fn subscribe_foreground<F>(&self, handler: F) -> bool
    where
        F: Fn(InboundMessage) + Send + Sync + 'static,
    {
        match &self.client {
            Some(client) => {
                client.on_message(Arc::new(handler));
                true
            }
            None => false,
        }
    }

    /// Resolves with the next foreground delivery.
    ///
    /// Each call leaves a handler registered for the lifetime of the
    /// backend, and on a disabled gateway the future never resolves. Prefer
    /// [`MessagingGateway::subscribe_foreground`].
    pub fn next_foreground_message(&self) -> BoxFuture<'static, InboundMessage> {
        let Some(client) = &self.client else {
            return future::pending().boxed();
        };

        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        client.on_message(Arc::new(move |message| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(message);
            }
        }));

        async move {
            match rx.await {
                Ok(message) => message,
                Err(_) => future::pending().await,
            }
        }
        .boxed()
    }
}
