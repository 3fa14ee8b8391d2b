//! New-lead notifications
//!
//! A `Notification` is raised by the lead poller when it sees a lead id above
//! the last known maximum. Delivery goes through a `NotificationSink` so the
//! poller does not care whether alerts end up on a terminal or in a test.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::types::Lead;
use crate::util::truncate_chars;

const MAX_BODY_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub lead: Lead,
    pub raised_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(lead: Lead, raised_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead,
            raised_at,
        }
    }

    pub fn title(&self) -> String {
        format!("New lead: {}", self.lead.company)
    }

    pub fn body(&self) -> String {
        let mut body = format!(
            "{} ({}), score {:.0}",
            self.lead.name, self.lead.sector, self.lead.lead_score
        );
        if let Some(region) = self.lead.region.as_deref().filter(|r| !r.is_empty()) {
            body.push_str(&format!(", {}", region));
        }
        if !self.lead.suggested_next_action.is_empty() {
            body.push_str(&format!(". Next: {}", self.lead.suggested_next_action));
        }
        truncate_chars(&body, MAX_BODY_CHARS)
    }
}

/// Receives notifications raised by the poller.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), ApiError>;

    /// Called when a notification is dismissed or its display time runs out.
    async fn clear(&self, _notification: &Notification) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Prints notifications to stdout.
pub struct TerminalSink;

#[async_trait::async_trait]
impl NotificationSink for TerminalSink {
    async fn notify(&self, notification: &Notification) -> Result<(), ApiError> {
        println!(
            "[{}] {}\n    {}",
            notification.raised_at.format("%H:%M:%S"),
            notification.title(),
            notification.body()
        );
        Ok(())
    }
}
