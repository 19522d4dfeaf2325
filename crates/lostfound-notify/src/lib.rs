//! # lostfound-notify
//!
//! Outbound email for the lost & found service: transports, message
//! templates, and the routine that tells owners about possible matches.

pub mod mailer;
pub mod matcher;
pub mod templates;

pub use mailer::{
    send_best_effort, EmailMessage, LogMailer, Mailer, RecordingMailer, SmtpConfig, SmtpMailer,
};
pub use matcher::{MatchNotifier, MatchReport};
