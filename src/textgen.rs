//! Subject line generation through a text-completion API.
//!
//! Generation is best-effort: callers must have a fallback subject.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::Config;
use crate::error::{PostError, Result};

/// Environment variable consulted when no key is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Prompt used when no prompt file is configured.
pub const BUILTIN_SUBJECT_PROMPT: &str = include_str!("../templates/subject_prompt.txt");

/// Longest subject kept from a generated reply, in characters.
const MAX_SUBJECT_CHARS: usize = 120;

/// Turns a prompt into text.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Client for an OpenAI-style `/responses` endpoint.
pub struct OpenAiGenerator {
    http: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ApiKeyFile {
    api_key: String,
}

impl OpenAiGenerator {
    pub fn new(endpoint: &str, model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PostError::TextGeneration(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Build from configuration. Returns `Ok(None)` when generation is
    /// disabled or no API key can be found.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let tg = &config.text_generation;
        if !tg.enabled {
            return Ok(None);
        }
        let key = match (&tg.api_key, &tg.api_key_file) {
            (Some(key), _) => Some(key.clone()),
            (None, Some(path)) => Some(read_key_file(&config.resolve(path))?),
            (None, None) => std::env::var(API_KEY_ENV).ok(),
        };
        match key.filter(|k| !k.trim().is_empty()) {
            Some(key) => Ok(Some(Self::new(
                &tg.endpoint,
                &tg.model,
                key.trim(),
                Duration::from_secs(tg.timeout_secs),
            )?)),
            None => {
                debug!("No API key for text generation; subjects will use the default");
                Ok(None)
            }
        }
    }
}

impl TextGenerator for OpenAiGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/responses", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": prompt }))
            .send()
            .map_err(|e| PostError::TextGeneration(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PostError::TextGeneration(format!("API returned {status}")));
        }
        let body: Value = response
            .json()
            .map_err(|e| PostError::TextGeneration(e.to_string()))?;
        output_text(&body)
            .ok_or_else(|| PostError::TextGeneration("response carried no text".into()))
    }
}

/// Collect the text of every `output_text` content item.
fn output_text(body: &Value) -> Option<String> {
    if let Some(text) = body.get("output_text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let text: String = body
        .get("output")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("content")?.as_array())
        .flatten()
        .filter(|c| c.get("type").and_then(Value::as_str) == Some("output_text"))
        .filter_map(|c| c.get("text")?.as_str())
        .collect();
    (!text.is_empty()).then_some(text)
}

/// Reduce generated text to a usable subject line: first non-empty line,
/// surrounding quotes removed, length capped. `None` if nothing is left.
pub fn clean_subject(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .strip_prefix("Subject:")
        .map(str::trim)
        .unwrap_or(line);
    let unquoted = line.trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”' | '«' | '»'));
    let subject: String = unquoted.trim().chars().take(MAX_SUBJECT_CHARS).collect();
    (!subject.is_empty()).then_some(subject)
}

/// The subject prompt: configured file, or the built-in prompt.
pub fn load_subject_prompt(config: &Config) -> Result<String> {
    match &config.paths.subject_prompt {
        Some(path) => {
            let path = config.resolve(path);
            std::fs::read_to_string(&path)
                .map_err(|e| PostError::Config(format!("subject prompt {}: {e}", path.display())))
        }
        None => Ok(BUILTIN_SUBJECT_PROMPT.to_string()),
    }
}

fn read_key_file(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| PostError::Config(format!("API key file {}: {e}", path.display())))?;
    let file: ApiKeyFile = serde_json::from_str(&raw)
        .map_err(|e| PostError::Config(format!("API key file {}: {e}", path.display())))?;
    Ok(file.api_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_text_from_output_items() {
        let body = json!({
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "💌 Your letter has arrived"}
                ]}
            ]
        });
        assert_eq!(output_text(&body).as_deref(), Some("💌 Your letter has arrived"));
    }

    #[test]
    fn test_output_text_shortcut_field() {
        let body = json!({ "output_text": "Hello" });
        assert_eq!(output_text(&body).as_deref(), Some("Hello"));
        assert_eq!(output_text(&json!({ "output": [] })), None);
    }

    #[test]
    fn test_clean_subject() {
        assert_eq!(
            clean_subject("\n  \"A letter for you\"  \nextra").as_deref(),
            Some("A letter for you")
        );
        assert_eq!(
            clean_subject("Subject: Mail has come").as_deref(),
            Some("Mail has come")
        );
        assert_eq!(clean_subject("  \n \"\" "), None);
        let long = "x".repeat(500);
        assert_eq!(clean_subject(&long).unwrap().chars().count(), MAX_SUBJECT_CHARS);
    }

    #[test]
    fn test_disabled_generator() {
        let mut cfg = Config::default();
        cfg.text_generation.enabled = false;
        assert!(OpenAiGenerator::from_config(&cfg).unwrap().is_none());
    }

    #[test]
    fn test_key_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("key.json");
        std::fs::write(&path, r#"{"api_key": "sk-test"}"#).unwrap();
        assert_eq!(read_key_file(&path).unwrap(), "sk-test");

        let mut cfg = Config::default();
        cfg.text_generation.api_key_file = Some(path);
        assert!(OpenAiGenerator::from_config(&cfg).unwrap().is_some());
    }

    #[test]
    fn test_builtin_prompt_when_unset() {
        let prompt = load_subject_prompt(&Config::default()).unwrap();
        assert!(prompt.contains("subject line"));
    }
}
