//! SMTP transport using lettre.

use std::path::Path;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{Message, SmtpTransport, Transport};
use tracing::{debug, info};

use super::oauth::{OAuthClient, TokenProvider};
use super::{BodyType, Mailer, OutgoingMail};
use crate::config::{Config, MailAuth};
use crate::error::{PostError, Result};

/// Environment variable consulted when `mail.password` is not set.
pub const PASSWORD_ENV: &str = "SLOWPOST_SMTP_PASSWORD";

enum Secret {
    Password(String),
    OAuth(TokenProvider),
}

/// Blocking SMTP mailer.
pub struct SmtpMailer {
    host: String,
    port: u16,
    timeout: Duration,
    username: String,
    from: Mailbox,
    secret: Secret,
}

impl SmtpMailer {
    /// Build the mailer from configuration.
    ///
    /// Missing credentials are a configuration error, reported before any
    /// letter is touched. For OAuth2 this means `authorize` has not been run.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mail = &config.mail;
        if mail.smtp_host.is_empty() {
            return Err(PostError::Config("mail.smtp_host is not set".into()));
        }
        if mail.username.is_empty() {
            return Err(PostError::Config("mail.username is not set".into()));
        }
        let from_raw = if mail.from.is_empty() {
            &mail.username
        } else {
            &mail.from
        };
        let from: Mailbox = from_raw
            .parse()
            .map_err(|_| PostError::Config(format!("invalid sender address '{from_raw}'")))?;

        let secret = match mail.auth {
            MailAuth::Password => {
                let password = mail
                    .password
                    .clone()
                    .or_else(|| std::env::var(PASSWORD_ENV).ok())
                    .ok_or_else(|| {
                        PostError::Config(format!(
                            "mail.password is not set and ${PASSWORD_ENV} is empty"
                        ))
                    })?;
                // App passwords are often pasted with spaces
                Secret::Password(password.split_whitespace().collect())
            }
            MailAuth::Oauth2 => {
                let client = OAuthClient::load(&config.resolve(&mail.client_secret))?;
                let tokens = TokenProvider::new(client, config.resolve(&mail.token_cache))?;
                if !tokens.has_cached_token() {
                    return Err(PostError::Config(
                        "no cached OAuth token; run `slowpost authorize` first".into(),
                    ));
                }
                Secret::OAuth(tokens)
            }
        };

        Ok(Self {
            host: mail.smtp_host.clone(),
            port: mail.smtp_port,
            timeout: Duration::from_secs(mail.timeout_secs),
            username: mail.username.clone(),
            from,
            secret,
        })
    }

    /// Credentials for this send. OAuth tokens are refreshed here when expired.
    fn credentials(&self) -> Result<(Credentials, Mechanism)> {
        match &self.secret {
            Secret::Password(password) => Ok((
                Credentials::new(self.username.clone(), password.clone()),
                Mechanism::Login,
            )),
            Secret::OAuth(tokens) => {
                let token = tokens.access_token(chrono::Utc::now())?;
                Ok((
                    Credentials::new(self.username.clone(), token),
                    Mechanism::Xoauth2,
                ))
            }
        }
    }

    fn transport(&self) -> Result<SmtpTransport> {
        let builder = if self.port == 465 {
            SmtpTransport::relay(&self.host)
        } else {
            SmtpTransport::starttls_relay(&self.host)
        }
        .map_err(|e| PostError::Mail(e.to_string()))?;

        let (credentials, mechanism) = self.credentials()?;
        let mut mechanisms = vec![mechanism];
        if mechanism == Mechanism::Login {
            mechanisms.push(Mechanism::Plain);
        }

        Ok(builder
            .port(self.port)
            .timeout(Some(self.timeout))
            .credentials(credentials)
            .authentication(mechanisms)
            .build())
    }

    fn build_message(&self, mail: &OutgoingMail) -> Result<Message> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|_| PostError::Mail(format!("invalid recipient address '{}'", mail.to)))?;

        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone());

        if let Some(bcc) = &mail.bcc {
            let mailbox: Mailbox = bcc
                .parse()
                .map_err(|_| PostError::Mail(format!("invalid bcc address '{bcc}'")))?;
            builder = builder.bcc(mailbox);
        }

        let body = match mail.body_type {
            BodyType::Plain => SinglePart::plain(mail.body.clone()),
            BodyType::Html => SinglePart::html(mail.body.clone()),
        };

        let mut parts = MultiPart::mixed().singlepart(body);
        for path in &mail.attachments {
            parts = parts.singlepart(attachment_part(path)?);
        }

        builder
            .multipart(parts)
            .map_err(|e| PostError::Mail(e.to_string()))
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<String> {
        let message = self.build_message(mail)?;
        let transport = self.transport()?;
        debug!(to = %mail.to, attachments = mail.attachments.len(), "Sending via SMTP");

        let response = transport
            .send(&message)
            .map_err(|e| PostError::Mail(e.to_string()))?;

        let confirmation = response.first_line().unwrap_or_default().to_string();
        info!(to = %mail.to, response = %confirmation, "SMTP accepted message");
        Ok(confirmation)
    }
}

/// Read a file into an attachment part named after the file.
fn attachment_part(path: &Path) -> Result<SinglePart> {
    if !path.exists() {
        return Err(PostError::Mail(format!(
            "attachment not found: {}",
            path.display()
        )));
    }
    let data = std::fs::read(path).map_err(|e| PostError::io(path, e))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    Ok(Attachment::new(filename).body(data, content_type_for(path)))
}

fn content_type_for(path: &Path) -> ContentType {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => ContentType::TEXT_HTML,
        Some("txt") => ContentType::TEXT_PLAIN,
        _ => ContentType::parse("application/octet-stream")
            .unwrap_or(ContentType::TEXT_PLAIN),
    }
}
