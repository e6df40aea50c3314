//! Outgoing mail.
//!
//! [`Mailer`] is the transport interface the post office sends through.
//! [`SmtpMailer`] implements it over SMTP with [lettre](https://lettre.rs),
//! authenticating with a password or with an OAuth2 token kept fresh by
//! [`oauth::TokenProvider`].

pub mod oauth;
mod smtp;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use smtp::SmtpMailer;

/// How the body text is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    Plain,
    Html,
}

/// A message ready for the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMail {
    /// Recipient address.
    pub to: String,
    pub subject: String,
    pub body: String,
    pub body_type: BodyType,
    /// Files to attach. Each must exist when the mail is sent.
    #[serde(default)]
    pub attachments: Vec<PathBuf>,
    /// Optional blind copy.
    #[serde(default)]
    pub bcc: Option<String>,
}

/// Sends mail. Returns a transport confirmation on success.
pub trait Mailer {
    fn send(&self, mail: &OutgoingMail) -> Result<String>;
}
