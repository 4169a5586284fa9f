use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use ta_recruitment::workflows::recruitment::{
    DirectoryError, MailingListDirectory, Notification, Notifier, NotifyError, UserId,
};
use tracing::{debug, info};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Notifier for deployments without a mail relay: every notification becomes a log event.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            template = %notification.template,
            recipients = notification.recipients.len(),
            "notification queued"
        );
        Ok(())
    }
}

/// Directory used when no mailing-list service is configured; every list is empty.
#[derive(Default, Clone)]
pub(crate) struct UnconfiguredDirectory;

impl MailingListDirectory for UnconfiguredDirectory {
    fn members(&self, list: &str) -> Result<Vec<UserId>, DirectoryError> {
        debug!(list, "mailing-list directory not configured");
        Ok(Vec::new())
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
