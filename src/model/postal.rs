//! Sender and recipient postal data.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PostError, Result};

/// One side of a letter: who it is from or who it goes to.
///
/// Every field is optional in the source JSON and defaults to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Party {
    pub name: String,
    pub address_line1: String,
    pub address_line2: String,
    pub city_state: String,
    pub zip: String,
    pub country: String,
    pub phone: String,
    pub email: String,
}

/// Sender and recipient, captured when a letter is submitted.
///
/// A record keeps its own copy, so later edits to the postal info file
/// never change letters already in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalInfo {
    pub sender: Party,
    pub recipient: Party,
}

impl PostalInfo {
    /// Load the postal info JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| PostError::io(path, e))?;
        serde_json::from_str(&raw)
            .map_err(|e| PostError::Config(format!("{}: {e}", path.display())))
    }

    /// Serialize for the store's embedded text column.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Rebuild from the store's embedded text column.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
