//! HTML rendering by placeholder substitution.
//!
//! Templates contain `{{ key }}` placeholders. Values are HTML-escaped;
//! placeholders without a value render as empty text.

pub mod context;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::debug;

use crate::config::Config;
use crate::error::{PostError, Result};

/// Name of the letter template.
pub const LETTER_TEMPLATE: &str = "letter";
/// Name of the email body template.
pub const EMAIL_BODY_TEMPLATE: &str = "email_body";

const BUILTIN_LETTER: &str = include_str!("../../templates/letter.html");
const BUILTIN_EMAIL_BODY: &str = include_str!("../../templates/email_body.html");

/// Flat string-keyed values for a template.
pub type Context = BTreeMap<&'static str, String>;

/// Fills a named template with a context.
pub trait Renderer {
    fn render(&self, template: &str, context: &Context) -> Result<String>;
}

/// Templates held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Templates {
    sources: HashMap<String, String>,
}

impl Templates {
    /// The built-in letter and email body templates.
    pub fn builtin() -> Self {
        Self::default()
            .with(LETTER_TEMPLATE, BUILTIN_LETTER)
            .with(EMAIL_BODY_TEMPLATE, BUILTIN_EMAIL_BODY)
    }

    /// Built-ins, overridden by any template paths in the configuration.
    ///
    /// A configured path that cannot be read is a configuration error.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut templates = Self::builtin();
        if let Some(path) = &config.paths.letter_template {
            templates = templates.load(LETTER_TEMPLATE, &config.resolve(path))?;
        }
        if let Some(path) = &config.paths.email_body_template {
            templates = templates.load(EMAIL_BODY_TEMPLATE, &config.resolve(path))?;
        }
        Ok(templates)
    }

    /// Add or replace a template from a string.
    pub fn with(mut self, name: &str, source: impl Into<String>) -> Self {
        self.sources.insert(name.to_string(), source.into());
        self
    }

    /// Add or replace a template from a file.
    pub fn load(self, name: &str, path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| PostError::Template {
            name: name.to_string(),
            reason: format!("{}: {e}", path.display()),
        })?;
        debug!(template = name, path = %path.display(), "Loaded template");
        Ok(self.with(name, source))
    }
}

impl Renderer for Templates {
    fn render(&self, template: &str, context: &Context) -> Result<String> {
        let source = self.sources.get(template).ok_or_else(|| PostError::Template {
            name: template.to_string(),
            reason: "not loaded".into(),
        })?;
        substitute(template, source, context)
    }
}

/// Replace every `{{ key }}` in `source` with the escaped value from `context`.
pub fn substitute(name: &str, source: &str, context: &Context) -> Result<String> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| PostError::Template {
            name: name.to_string(),
            reason: format!(
                "unclosed placeholder at byte {}",
                source.len() - rest.len() + start
            ),
        })?;
        let key = after[..end].trim();
        match context.get(key) {
            Some(value) => out.push_str(&escape_html(value)),
            None => debug!(template = name, key, "Placeholder without value"),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Escape the five HTML-significant characters.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
