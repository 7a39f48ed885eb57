use async_trait::async_trait;
use clap::ValueEnum;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::model::PermissionState;

/// Capabilities and permission state of the host the page runs in.
#[async_trait]
pub trait Environment: Send + Sync {
    fn supports_notifications(&self) -> bool;

    fn supports_workers(&self) -> bool;

    fn permission(&self) -> PermissionState;

    /// Shows the permission prompt. May wait indefinitely on the user.
    async fn request_permission(&self) -> PermissionState;
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionPolicy {
    Grant,
    Deny,
    Ask,
}

pub struct HostEnvironment {
    supports_notifications: bool,
    supports_workers: bool,
    policy: PermissionPolicy,
    permission: Mutex<PermissionState>,
}

impl HostEnvironment {
    pub fn new(policy: PermissionPolicy) -> Self {
        HostEnvironment {
            supports_notifications: true,
            supports_workers: true,
            policy,
            permission: Mutex::new(PermissionState::Default),
        }
    }

    pub fn with_capabilities(mut self, notifications: bool, workers: bool) -> Self {
        self.supports_notifications = notifications;
        self.supports_workers = workers;
        self
    }

    async fn ask() -> std::io::Result<PermissionState> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(b"Allow notifications from this client? [y/N] ")
            .await?;
        stdout.flush().await?;

        let mut answer = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut answer)
            .await?;

        Ok(match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => PermissionState::Granted,
            "n" | "no" => PermissionState::Denied,
            _ => PermissionState::Default,
        })
    }
}

#[async_trait]
impl Environment for HostEnvironment {
    fn supports_notifications(&self) -> bool {
        self.supports_notifications
    }

    fn supports_workers(&self) -> bool {
        self.supports_workers
    }

    fn permission(&self) -> PermissionState {
        *self.permission.lock()
    }

    async fn request_permission(&self) -> PermissionState {
        let current = self.permission();
        if current != PermissionState::Default {
            return current;
        }

        let decided = match self.policy {
            PermissionPolicy::Grant => PermissionState::Granted,
            PermissionPolicy::Deny => PermissionState::Denied,
            PermissionPolicy::Ask => Self::ask().await.unwrap_or_else(|error| {
                tracing::warn!(%error, "Permission prompt failed.");
                PermissionState::Default
            }),
        };

        *self.permission.lock() = decided;
        decided
    }
}

pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> anyhow::Result<()>;
}

pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn write_text(&self, text: &str) -> anyhow::Result<()> {
        let mut clipboard = arboard::Clipboard::new()?;
        clipboard.set_text(text.to_string())?;
        Ok(())
    }
}
