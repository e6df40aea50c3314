//! Letter storage.
//!
//! [`LetterStore`] is the interface the post office works against;
//! [`sqlite::SqliteStore`] is the persistent implementation.

pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::letter::{Letter, LetterStatus, LetterSummary};

pub use sqlite::SqliteStore;

/// Persistence for letter records.
///
/// Implementations provide read-then-write semantics only; there is no
/// transaction spanning calls.
pub trait LetterStore {
    /// Insert a new record. Fails if the id already exists.
    fn insert(&self, letter: &Letter) -> Result<()>;

    /// Look up a record by id.
    fn get(&self, id: &str) -> Result<Option<Letter>>;

    /// Ids of letters in transit whose scheduled time is at or before `now`,
    /// earliest schedule first. Rows are not decoded, so one unreadable
    /// record does not hide the others.
    fn due_ids(&self, now: DateTime<Utc>) -> Result<Vec<String>>;

    /// Stored scheduled time of the in-transit letter received last,
    /// as raw text so a malformed value can be handled by the caller.
    fn latest_in_transit_schedule(&self) -> Result<Option<String>>;

    /// The in-transit letter received first.
    fn next_to_deliver(&self) -> Result<Option<Letter>>;

    /// Move an in-transit letter to delivered. Returns `false` if no
    /// in-transit letter with that id exists.
    fn mark_delivered(&self, id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// All letters, optionally filtered by status. Delivered listings are
    /// ordered by creation time, others by received time.
    fn list(&self, status: Option<LetterStatus>) -> Result<Vec<Letter>>;

    /// In-transit letters scheduled after `now`.
    fn upcoming(&self, now: DateTime<Utc>) -> Result<Vec<LetterSummary>>;

    /// Summary rows for every letter.
    fn summaries(&self) -> Result<Vec<LetterSummary>>;

    /// Remove a letter. Administrative only. Returns `false` if absent.
    fn delete(&self, id: &str) -> Result<bool>;
}
