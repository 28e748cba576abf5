/// User-visible signal that a forward succeeded or failed.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, success: bool, title: &str, body: &str);
}

/// Reports notifications through the `log` facade.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, success: bool, title: &str, body: &str) {
        if success {
            log::info!("✅ {title}: {body}");
        } else {
            log::warn!("❌ {title}: {body}");
        }
    }
}
