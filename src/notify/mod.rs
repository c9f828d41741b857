//! # Notifications
//!
//! Best-effort status messages about each run. A notifier is a messaging
//! backend with a name that accepts pushed messages; a failed push is logged
//! by the caller and never fails the run.
//!
//! * `telegram` - Telegram Bot API backend (chat and optional forum thread)

pub mod telegram;

pub use telegram::TelegramNotifier;

use crate::config::{NotifierConfig, TargetConfig};
use crate::error::SyncResult;
use crate::sync::{RunOutcome, RunReport};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::info;

/// Message sent once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub outcome: RunOutcome,
    /// New records found by the extractor
    pub found: usize,
    pub imported: usize,
    pub skipped: usize,
    /// Source users left out because their creation time is unusable
    pub undated: usize,
    pub timestamp: DateTime<Utc>,
}

impl NotificationMessage {
    pub fn from_report(report: &RunReport, timestamp: DateTime<Utc>) -> Self {
        Self {
            outcome: report.outcome.clone(),
            found: report.found,
            imported: report.imported,
            skipped: report.skipped,
            undated: report.undated,
            timestamp,
        }
    }

    /// Render the message text
    pub fn render(&self) -> String {
        let mut text = self.render_outcome();
        if self.undated > 0 {
            text.push_str(&format!(
                " Warning: {} source users have no usable creation time and are never synced.",
                self.undated
            ));
        }
        text
    }

    fn render_outcome(&self) -> String {
        let at = self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
        match &self.outcome {
            RunOutcome::NoNewRecords => format!("Listmonk sync {}: no new users to import", at),
            RunOutcome::Imported => {
                let mut text = format!(
                    "Listmonk sync {}: imported {} new users",
                    at, self.imported
                );
                if self.skipped > 0 {
                    text.push_str(&format!(" ({} skipped as malformed)", self.skipped));
                }
                text
            }
            RunOutcome::NothingToImport => format!(
                "Listmonk sync {}: {} malformed users are stuck and block the checkpoint; \
                 they will be found again on every run until fixed in the source",
                at, self.found
            ),
            RunOutcome::Extracted => format!(
                "Listmonk sync {}: extracted {} new users (not uploaded)",
                at, self.found
            ),
            RunOutcome::Failed { stage, error } if self.imported > 0 => format!(
                "Listmonk sync {} FAILED during {}: {}. Found {} new users, {} imported \
                 but the checkpoint did not move; the next run offers them again.",
                at, stage, error, self.found, self.imported
            ),
            RunOutcome::Failed { stage, error } => format!(
                "Listmonk sync {} FAILED during {}: {}. Found {} new users, none imported.",
                at, stage, error, self.found
            ),
        }
    }
}

/// A messaging backend for run notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn push(&self, message: &NotificationMessage) -> SyncResult<()>;
}

/// Used when no channel is configured; messages only reach the log
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn push(&self, message: &NotificationMessage) -> SyncResult<()> {
        info!("Notifications disabled; would have sent: {}", message.render());
        Ok(())
    }
}

/// Build the notifier named by the configuration.
pub fn notifier_from_config(
    config: &NotifierConfig,
    target: &TargetConfig,
) -> SyncResult<Box<dyn Notifier>> {
    if config.enabled {
        Ok(Box::new(TelegramNotifier::new(config, target.timeout())?))
    } else {
        Ok(Box::new(DisabledNotifier))
    }
}
