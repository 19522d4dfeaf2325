//! HTTP handlers.

pub mod admin;
pub mod auth;
pub mod items;

use std::sync::Arc;

use lostfound_notify::{send_best_effort, EmailMessage, Mailer};

/// Deliver a courtesy email without holding up the response.
pub(crate) fn send_in_background(mailer: Arc<dyn Mailer>, message: EmailMessage) {
    tokio::spawn(async move {
        send_best_effort(mailer.as_ref(), &message).await;
    });
}
