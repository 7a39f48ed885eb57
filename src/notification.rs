use crate::model::NotificationOptions;

/// The OS-level notification surface. Only the background worker uses it.
pub trait NotificationSurface: Send + Sync {
    fn show_notification(&self, title: &str, options: &NotificationOptions) -> anyhow::Result<()>;
}

/// Surfaces notifications on stdout and in the log.
pub struct TracingNotificationSurface;

impl NotificationSurface for TracingNotificationSurface {
    fn show_notification(&self, title: &str, options: &NotificationOptions) -> anyhow::Result<()> {
        tracing::info!(%title, body = %options.body, icon = %options.icon, "Showing notification.");
        println!("[notification] {}: {}", title, options.body);
        Ok(())
    }
}
