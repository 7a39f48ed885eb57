use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "New Message";
pub const DEFAULT_BODY: &str = "You have a new message";
pub const DEFAULT_ICON: &str = "/vite.svg";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RegistrationToken(String);

impl RegistrationToken {
    pub fn new(token: impl Into<String>) -> Self {
        RegistrationToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RegistrationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Default,
    Granted,
    Denied,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct NotificationPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
}

/// A push payload as delivered by the backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationPayload>,

    #[serde(default)]
    pub data: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl InboundMessage {
    pub fn with_notification(title: &str, body: &str) -> Self {
        InboundMessage {
            notification: Some(NotificationPayload {
                title: Some(title.to_string()),
                body: Some(body.to_string()),
                icon: None,
            }),
            ..Default::default()
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.notification.as_ref()?.title.as_deref()
    }

    pub fn body(&self) -> Option<&str> {
        self.notification.as_ref()?.body.as_deref()
    }

    pub fn icon(&self) -> Option<&str> {
        self.notification.as_ref()?.icon.as_deref()
    }
}

/// A foreground message as captured for display.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DisplayedMessage {
    pub title: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl DisplayedMessage {
    pub fn capture(message: &InboundMessage, received_at: DateTime<Utc>) -> Self {
        DisplayedMessage {
            title: message.title().unwrap_or(DEFAULT_TITLE).to_string(),
            body: message.body().unwrap_or_default().to_string(),
            received_at,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
}
