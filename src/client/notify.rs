/// Where the client reports user-facing failures. A UI would show a toast
/// and route to its login view on `session_expired`.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn error(&self, message: &str);

    fn session_expired(&self);
}

/// Writes notices to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn error(&self, message: &str) {
        tracing::warn!(notice = %message, "api request failed");
    }

    fn session_expired(&self) {
        tracing::warn!("session expired, login required");
    }
}
