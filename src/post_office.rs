//! The post office: submission, scheduled delivery and the pending sweep.
//!
//! A letter is accepted by [`PostOffice::submit`], which schedules it after
//! the letter queued before it and stores it in transit. [`PostOffice::send`]
//! renders and mails one letter and marks it delivered only when the mailer
//! succeeds. [`PostOffice::sweep_pending`] sends everything that is due.
//!
//! Per-letter failures never escape `send` or the sweep: they are logged
//! with the letter id and the letter stays in transit for the next sweep.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{ErrorKind, PostError, Result};
use crate::intake::LetterDraft;
use crate::mail::{BodyType, Mailer, OutgoingMail};
use crate::model::letter::{Letter, LetterStatus, LetterSummary};
use crate::model::postal::PostalInfo;
use crate::render::context::{email_body_context, letter_context};
use crate::render::{Renderer, EMAIL_BODY_TEMPLATE, LETTER_TEMPLATE};
use crate::schedule::{compute_delivery_time, BetaSkew, DeliveryWindow, SkewSampler};
use crate::store::LetterStore;
use crate::textgen::{clean_subject, load_subject_prompt, TextGenerator, BUILTIN_SUBJECT_PROMPT};

/// Date shown at the top of a rendered letter.
const LETTER_DATE_FORMAT: &str = "%B %-d, %Y";

/// Plain settings the post office needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct PostSettings {
    pub window: DeliveryWindow,
    /// Used whenever subject generation fails or is unavailable.
    pub default_subject: String,
    pub subject_prompt: String,
    /// Parent for the per-send temporary directory. System temp dir if unset.
    pub spool_dir: Option<PathBuf>,
    pub bcc: Option<String>,
}

impl Default for PostSettings {
    fn default() -> Self {
        Self {
            window: DeliveryWindow::default(),
            default_subject: Config::default().text_generation.default_subject,
            subject_prompt: BUILTIN_SUBJECT_PROMPT.to_string(),
            spool_dir: None,
            bcc: None,
        }
    }
}

impl PostSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            window: DeliveryWindow::from_config(&config.schedule)?,
            default_subject: config.text_generation.default_subject.clone(),
            subject_prompt: load_subject_prompt(config)?,
            spool_dir: config.paths.spool_dir.as_deref().map(|p| config.resolve(p)),
            bcc: config.mail.bcc.clone().filter(|b| !b.trim().is_empty()),
        })
    }
}

/// Outcome of a sweep over due letters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Ids sent and marked delivered, in sweep order.
    pub delivered: Vec<String>,
    /// Ids that stayed in transit.
    pub failed: Vec<String>,
}

/// Ties the scheduler, store, renderer, mailer and text generator together.
pub struct PostOffice {
    store: Box<dyn LetterStore>,
    renderer: Box<dyn Renderer>,
    mailer: Option<Box<dyn Mailer>>,
    text_generator: Option<Box<dyn TextGenerator>>,
    sampler: Box<dyn SkewSampler>,
    clock: Box<dyn Clock>,
    settings: PostSettings,
}

impl PostOffice {
    /// A post office using the wall clock and Beta(2,5) skew, with no mail
    /// transport and no subject generation. Use the `with_*` methods to
    /// replace any of these. Without a mailer every send fails.
    pub fn new(
        store: Box<dyn LetterStore>,
        renderer: Box<dyn Renderer>,
        settings: PostSettings,
    ) -> Self {
        Self {
            store,
            renderer,
            mailer: None,
            text_generator: None,
            sampler: Box::new(BetaSkew),
            clock: Box::new(SystemClock),
            settings,
        }
    }

    pub fn with_mailer(mut self, mailer: Box<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_text_generator(mut self, generator: Box<dyn TextGenerator>) -> Self {
        self.text_generator = Some(generator);
        self
    }

    pub fn with_sampler(mut self, sampler: Box<dyn SkewSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &PostSettings {
        &self.settings
    }

    /// Accept a letter and schedule it. Returns the new letter's id.
    ///
    /// The postal info is copied into the record; later edits to the postal
    /// info file do not affect letters already submitted.
    pub fn submit(&self, draft: &LetterDraft, postal: &PostalInfo) -> Result<String> {
        let now = self.clock.now();
        let previous = self.store.latest_in_transit_schedule()?;
        let scheduled = compute_delivery_time(
            previous.as_deref(),
            now,
            &self.settings.window,
            self.sampler.as_ref(),
        );

        let creation_time = draft.creation_time.unwrap_or(now);
        let rendered = self.render_letter(&draft.name, &draft.contents, postal, creation_time)?;

        let letter = Letter {
            id: uuid::Uuid::new_v4().to_string(),
            name: draft.name.clone(),
            creation_time,
            contents: draft.contents.clone(),
            rendered_html: Some(rendered),
            postal_info: postal.clone(),
            received_time: now,
            scheduled_delivery_time: scheduled,
            delivery_time: None,
            status: LetterStatus::InTransit,
        };
        self.store.insert(&letter)?;

        info!(
            id = %letter.id,
            name = %letter.name,
            scheduled = %letter.scheduled_delivery_time,
            "Letter received"
        );
        Ok(letter.id)
    }

    /// Send one letter. Returns `true` if it was mailed and marked delivered.
    ///
    /// Unknown ids, already delivered letters and transport failures are
    /// logged and reported as `false`; the record is left untouched.
    pub fn send(&self, id: &str) -> bool {
        match self.deliver(id) {
            Ok(confirmation) => {
                info!(id, response = %confirmation, "Letter delivered");
                true
            }
            Err(e) => {
                match e.kind() {
                    ErrorKind::NotFound => warn!(id, error = %e, "Letter not sent"),
                    _ => error!(id, error = %e, "Letter not sent"),
                }
                false
            }
        }
    }

    /// Send one letter, returning the transport confirmation or the reason
    /// it was not sent.
    pub fn deliver(&self, id: &str) -> Result<String> {
        let mut letter = self
            .store
            .get(id)?
            .ok_or_else(|| PostError::NotFound(id.to_string()))?;
        let sent_at = self.clock.now();
        // Applied in memory only until the mailer succeeds. Refuses a
        // letter that is already delivered.
        letter.mark_delivered(sent_at)?;

        let mailer = self
            .mailer
            .as_ref()
            .ok_or_else(|| PostError::Config("no mail transport configured".into()))?;

        let to = letter.postal_info.recipient.email.trim().to_string();
        if to.is_empty() {
            return Err(PostError::Mail("recipient has no email address".into()));
        }

        let subject = self.subject(&letter);
        let body = self
            .renderer
            .render(EMAIL_BODY_TEMPLATE, &email_body_context(&letter, sent_at))?;
        let html = match letter.rendered_html.as_deref() {
            Some(html) if !html.trim().is_empty() => html.to_string(),
            _ => {
                debug!(id, "No stored rendering; rendering from snapshot");
                self.render_letter(
                    &letter.name,
                    &letter.contents,
                    &letter.postal_info,
                    letter.creation_time,
                )?
            }
        };

        let confirmation = {
            // Removed when this block ends, whatever the mailer returns.
            let spool = self.spool()?;
            let path = spool.path().join(attachment_name(&letter.name));
            std::fs::write(&path, html).map_err(|e| PostError::io(&path, e))?;

            let mail = OutgoingMail {
                to,
                subject,
                body,
                body_type: BodyType::Html,
                attachments: vec![path],
                bcc: self.settings.bcc.clone(),
            };
            mailer.send(&mail)?
        };

        if !self.store.mark_delivered(&letter.id, sent_at)? {
            // Delivered by someone else between our read and write.
            warn!(id, "Letter was no longer in transit after sending");
        }
        Ok(confirmation)
    }

    /// Send every letter that is due and return the ids that succeeded.
    pub fn sweep_pending(&self) -> Result<Vec<String>> {
        Ok(self.sweep(None)?.delivered)
    }

    /// Send every due letter, oldest schedule first, reporting progress as
    /// `(done, total)` after each letter.
    pub fn sweep(&self, progress: Option<&dyn Fn(usize, usize)>) -> Result<SweepReport> {
        let now = self.clock.now();
        let due = self.store.due_ids(now)?;
        let total = due.len();
        info!(count = total, "Sweeping pending letters");

        let mut report = SweepReport::default();
        for (i, id) in due.into_iter().enumerate() {
            if self.send(&id) {
                report.delivered.push(id);
            } else {
                report.failed.push(id);
            }
            if let Some(cb) = progress {
                cb(i + 1, total);
            }
        }

        info!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Sweep finished"
        );
        Ok(report)
    }

    pub fn get(&self, id: &str) -> Result<Option<Letter>> {
        self.store.get(id)
    }

    pub fn list(&self, status: Option<LetterStatus>) -> Result<Vec<Letter>> {
        self.store.list(status)
    }

    pub fn upcoming(&self) -> Result<Vec<LetterSummary>> {
        self.store.upcoming(self.clock.now())
    }

    pub fn summaries(&self) -> Result<Vec<LetterSummary>> {
        self.store.summaries()
    }

    /// The in-transit letter that was received first.
    pub fn next_to_deliver(&self) -> Result<Option<Letter>> {
        self.store.next_to_deliver()
    }

    /// Remove a letter record. Administrative.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.store.delete(id)?;
        if removed {
            info!(id, "Letter deleted");
        }
        Ok(removed)
    }

    fn render_letter(
        &self,
        name: &str,
        contents: &str,
        postal: &PostalInfo,
        created: DateTime<Utc>,
    ) -> Result<String> {
        let date = created.format(LETTER_DATE_FORMAT).to_string();
        self.renderer
            .render(LETTER_TEMPLATE, &letter_context(name, contents, postal, &date))
    }

    /// Generated subject, or the default on any failure.
    fn subject(&self, letter: &Letter) -> String {
        let Some(generator) = &self.text_generator else {
            return self.settings.default_subject.clone();
        };
        match generator.generate(&self.settings.subject_prompt) {
            Ok(raw) => match clean_subject(&raw) {
                Some(subject) => subject,
                None => {
                    warn!(id = %letter.id, "Generated subject was empty; using default");
                    self.settings.default_subject.clone()
                }
            },
            Err(e) => {
                warn!(id = %letter.id, error = %e, "Subject generation failed; using default");
                self.settings.default_subject.clone()
            }
        }
    }

    fn spool(&self) -> Result<tempfile::TempDir> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("slowpost-");
            b
        };
        match &self.settings.spool_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| PostError::io(dir, e))?;
                builder.tempdir_in(dir).map_err(|e| PostError::io(dir, e))
            }
            None => builder
                .tempdir()
                .map_err(|e| PostError::io(std::env::temp_dir(), e)),
        }
    }
}

/// `<name>.html`, with path separators replaced.
fn attachment_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    let safe = safe.trim();
    if safe.is_empty() || safe == "." || safe == ".." {
        "letter.html".to_string()
    } else {
        format!("{safe}.html")
    }
}
