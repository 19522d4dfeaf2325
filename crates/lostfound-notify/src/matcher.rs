//! Match notification.
//!
//! When an item becomes visible (approved, or submitted with matching on
//! submit enabled) the owners of open opposite-kind reports with an
//! overlapping title are emailed. Each recipient gets at most one message per
//! event and a failed delivery never stops the others.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use lostfound_core::{
    is_plausible_email, normalize_email, Item, ItemRepository, MatchQuery, Result,
};

use crate::mailer::{EmailMessage, Mailer};
use crate::templates;

/// Outcome of one notification run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchReport {
    /// Candidate items found.
    pub candidates: usize,
    /// Messages delivered.
    pub sent: usize,
    /// Messages the relay rejected.
    pub failed: usize,
    /// Candidates that produced no message.
    pub skipped: usize,
}

#[derive(Clone)]
pub struct MatchNotifier {
    items: Arc<dyn ItemRepository>,
    mailer: Arc<dyn Mailer>,
}

impl MatchNotifier {
    pub fn new(items: Arc<dyn ItemRepository>, mailer: Arc<dyn Mailer>) -> Self {
        Self { items, mailer }
    }

    /// Open, approved, opposite-kind items whose title overlaps the trigger's.
    pub async fn find_candidates(&self, trigger: &Item) -> Result<Vec<Item>> {
        self.items
            .find_matches(&MatchQuery::for_trigger(trigger))
            .await
    }

    /// One message per distinct candidate owner.
    ///
    /// Owners without a plausible email, duplicates (compared
    /// case-insensitively) and the trigger's own submitter are skipped.
    pub fn plan(trigger: &Item, candidates: &[Item]) -> Vec<EmailMessage> {
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(normalize_email(&trigger.user_email));

        let mut messages = Vec::new();
        for candidate in candidates {
            let email = candidate.user_email.trim();
            if !is_plausible_email(email) {
                trace!(item_id = %candidate.id, "Skipping candidate without a usable email");
                continue;
            }
            if !seen.insert(normalize_email(email)) {
                trace!(item_id = %candidate.id, "Skipping already notified recipient");
                continue;
            }
            messages.push(templates::possible_match(
                email,
                trigger,
                candidate.item_type,
            ));
        }
        messages
    }

    /// Find candidates and email their owners.
    ///
    /// Never fails: lookup and delivery errors are logged and counted.
    pub async fn notify(&self, trigger: &Item) -> MatchReport {
        let start = Instant::now();

        let candidates = match self.find_candidates(trigger).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(
                    subsystem = "notify",
                    component = "matcher",
                    item_id = %trigger.id,
                    error = %e,
                    "Match lookup failed"
                );
                return MatchReport::default();
            }
        };

        let messages = Self::plan(trigger, &candidates);
        debug!(
            subsystem = "notify",
            component = "matcher",
            item_id = %trigger.id,
            item_type = %trigger.item_type,
            candidates = candidates.len(),
            recipients = messages.len(),
            "Match candidates found"
        );

        let mut report = MatchReport {
            candidates: candidates.len(),
            skipped: candidates.len() - messages.len(),
            ..Default::default()
        };

        for message in &messages {
            match self.mailer.send(message).await {
                Ok(_) => {
                    info!(
                        subsystem = "notify",
                        component = "matcher",
                        item_id = %trigger.id,
                        recipient = %message.to,
                        "Match notification sent"
                    );
                    report.sent += 1;
                }
                Err(e) => {
                    warn!(
                        subsystem = "notify",
                        component = "matcher",
                        item_id = %trigger.id,
                        recipient = %message.to,
                        error = %e,
                        "Match notification failed"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            subsystem = "notify",
            component = "matcher",
            op = "notify",
            item_id = %trigger.id,
            candidates = report.candidates,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            duration_ms = start.elapsed().as_millis() as u64,
            "Match notification complete"
        );
        report
    }

    /// Run [`notify`](Self::notify) on a background task.
    pub fn spawn(&self, trigger: Item) -> JoinHandle<MatchReport> {
        let notifier = self.clone();
        tokio::spawn(async move { notifier.notify(&trigger).await })
    }
}
