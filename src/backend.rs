use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Configuration;
use crate::error::BackendError;
use crate::model::InboundMessage;

pub type MessageHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// An initialized backend application, keyed by project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppHandle {
    pub name: String,
    pub project_id: String,
}

/// The push SDK's application entry points.
pub trait PushBackend: Send + Sync + 'static {
    fn initialize_app(&self, config: &Configuration) -> Result<AppHandle, BackendError>;

    fn get_messaging(&self, app: &AppHandle) -> Result<Arc<dyn MessagingClient>, BackendError>;
}

/// A messaging client owned by exactly one execution context.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Requests a registration token. `Ok(None)` means the backend issued none.
    async fn get_token(&self, vapid_key: &str) -> Result<Option<String>, BackendError>;

    /// Registers a handler for deliveries while the page has focus.
    fn on_message(&self, handler: MessageHandler);

    /// Registers a handler for deliveries while the page is not focused.
    fn on_background_message(&self, handler: MessageHandler);
}
