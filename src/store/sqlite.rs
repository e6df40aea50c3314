//! SQLite-backed letter store.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::LetterStore;
use crate::error::{PostError, Result};
use crate::model::letter::{format_timestamp, parse_timestamp, Letter, LetterStatus, LetterSummary};
use crate::model::postal::PostalInfo;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS letters (
    id                      TEXT PRIMARY KEY,
    name                    TEXT NOT NULL,
    creation_time           TEXT NOT NULL,
    contents                TEXT NOT NULL,
    rendered_html           TEXT,
    postal_info             TEXT NOT NULL,
    received_time           TEXT NOT NULL,
    scheduled_delivery_time TEXT NOT NULL,
    delivery_time           TEXT,
    status                  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS letters_status_schedule
    ON letters (status, scheduled_delivery_time);
";

const COLUMNS: &str = "id, name, creation_time, contents, rendered_html, postal_info, \
                       received_time, scheduled_delivery_time, delivery_time, status";

/// Letter records in a single SQLite file.
pub struct SqliteStore {
    path: PathBuf,
    conn: Connection,
}

/// A row as stored, before timestamps and the snapshot are decoded.
struct RawLetter {
    id: String,
    name: String,
    creation_time: String,
    contents: String,
    rendered_html: Option<String>,
    postal_info: String,
    received_time: String,
    scheduled_delivery_time: String,
    delivery_time: Option<String>,
    status: String,
}

impl RawLetter {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            creation_time: row.get(2)?,
            contents: row.get(3)?,
            rendered_html: row.get(4)?,
            postal_info: row.get(5)?,
            received_time: row.get(6)?,
            scheduled_delivery_time: row.get(7)?,
            delivery_time: row.get(8)?,
            status: row.get(9)?,
        })
    }

    fn decode(self) -> Result<Letter> {
        Ok(Letter {
            creation_time: parse_timestamp(&self.creation_time)?,
            received_time: parse_timestamp(&self.received_time)?,
            scheduled_delivery_time: parse_timestamp(&self.scheduled_delivery_time)?,
            delivery_time: self.delivery_time.as_deref().map(parse_timestamp).transpose()?,
            status: self.status.parse()?,
            postal_info: PostalInfo::from_json(&self.postal_info)?,
            id: self.id,
            name: self.name,
            contents: self.contents,
            rendered_html: self.rendered_html,
        })
    }
}

impl SqliteStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PostError::io(parent, e))?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %path.display(), "Opened letter store");
        Ok(Self { path, conn })
    }

    /// A throwaway store that lives only as long as this value.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn query_letters(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Letter>> {
        let mut stmt = self.conn.prepare(sql)?;
        let raw = stmt
            .query_map(args, RawLetter::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(RawLetter::decode).collect()
    }

    fn query_summaries(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<LetterSummary>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(id, name, status, scheduled)| {
                Ok(LetterSummary {
                    id,
                    name,
                    status: status.parse()?,
                    scheduled_delivery_time: parse_timestamp(&scheduled)?,
                })
            })
            .collect()
    }
}

impl LetterStore for SqliteStore {
    fn insert(&self, letter: &Letter) -> Result<()> {
        self.conn.execute(
            &format!("INSERT INTO letters ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
            params![
                letter.id,
                letter.name,
                format_timestamp(letter.creation_time),
                letter.contents,
                letter.rendered_html,
                letter.postal_info.to_json()?,
                format_timestamp(letter.received_time),
                format_timestamp(letter.scheduled_delivery_time),
                letter.delivery_time.map(format_timestamp),
                letter.status.as_str(),
            ],
        )?;
        debug!(letter_id = %letter.id, "Inserted letter");
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Letter>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM letters WHERE id = ?1"),
                params![id],
                RawLetter::from_row,
            )
            .optional()?;
        raw.map(RawLetter::decode).transpose()
    }

    fn due_ids(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM letters \
             WHERE status = ?1 AND scheduled_delivery_time <= ?2 \
             ORDER BY scheduled_delivery_time ASC, rowid ASC",
        )?;
        let ids = stmt
            .query_map(
                params![LetterStatus::InTransit.as_str(), format_timestamp(now)],
                |row| row.get::<_, String>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn latest_in_transit_schedule(&self) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT scheduled_delivery_time FROM letters WHERE status = ?1 \
                 ORDER BY received_time DESC, rowid DESC LIMIT 1",
                params![LetterStatus::InTransit.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?)
    }

    fn next_to_deliver(&self) -> Result<Option<Letter>> {
        let mut letters = self.query_letters(
            &format!(
                "SELECT {COLUMNS} FROM letters WHERE status = ?1 \
                 ORDER BY received_time ASC, rowid ASC LIMIT 1"
            ),
            &[&LetterStatus::InTransit.as_str()],
        )?;
        Ok(letters.pop())
    }

    fn mark_delivered(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE letters SET status = ?1, delivery_time = ?2 WHERE id = ?3 AND status = ?4",
            params![
                LetterStatus::Delivered.as_str(),
                format_timestamp(at),
                id,
                LetterStatus::InTransit.as_str(),
            ],
        )?;
        Ok(changed > 0)
    }

    fn list(&self, status: Option<LetterStatus>) -> Result<Vec<Letter>> {
        match status {
            None => self.query_letters(
                &format!("SELECT {COLUMNS} FROM letters ORDER BY received_time ASC, rowid ASC"),
                &[],
            ),
            Some(LetterStatus::Delivered) => self.query_letters(
                &format!(
                    "SELECT {COLUMNS} FROM letters WHERE status = ?1 \
                     ORDER BY creation_time ASC, rowid ASC"
                ),
                &[&LetterStatus::Delivered.as_str()],
            ),
            Some(LetterStatus::InTransit) => self.query_letters(
                &format!(
                    "SELECT {COLUMNS} FROM letters WHERE status = ?1 \
                     ORDER BY received_time ASC, rowid ASC"
                ),
                &[&LetterStatus::InTransit.as_str()],
            ),
        }
    }

    fn upcoming(&self, now: DateTime<Utc>) -> Result<Vec<LetterSummary>> {
        self.query_summaries(
            "SELECT id, name, status, scheduled_delivery_time FROM letters \
             WHERE status = ?1 AND scheduled_delivery_time > ?2 \
             ORDER BY scheduled_delivery_time ASC",
            &[&LetterStatus::InTransit.as_str(), &format_timestamp(now)],
        )
    }

    fn summaries(&self) -> Result<Vec<LetterSummary>> {
        self.query_summaries(
            "SELECT id, name, status, scheduled_delivery_time FROM letters \
             ORDER BY received_time ASC, rowid ASC",
            &[],
        )
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM letters WHERE id = ?1", params![id])?;
        if changed > 0 {
            info!(letter_id = id, "Deleted letter");
        }
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::postal::Party;
    use chrono::{Duration, TimeZone};

    fn dt(days: i64, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, hour, 0, 0).unwrap() + Duration::days(days)
    }

    fn letter(id: &str, received: DateTime<Utc>, scheduled: DateTime<Utc>) -> Letter {
        Letter {
            id: id.into(),
            name: id.into(),
            creation_time: received,
            contents: format!("Contents of {id}"),
            rendered_html: Some(format!("<p>{id}</p>")),
            postal_info: PostalInfo {
                sender: Party {
                    name: "Ana".into(),
                    ..Party::default()
                },
                recipient: Party {
                    name: "Luis".into(),
                    email: "luis@example.com".into(),
                    ..Party::default()
                },
            },
            received_time: received,
            scheduled_delivery_time: scheduled,
            delivery_time: None,
            status: LetterStatus::InTransit,
        }
    }

    fn seeded() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&letter("first", dt(0, 10), dt(1, 8))).unwrap();
        store.insert(&letter("second", dt(1, 11), dt(2, 8))).unwrap();
        let mut third = letter("third", dt(2, 12), dt(3, 8));
        third.mark_delivered(dt(3, 9)).unwrap();
        store.insert(&third).unwrap();
        store
    }

    #[test]
    fn test_get_roundtrip() {
        let store = seeded();
        let original = letter("first", dt(0, 10), dt(1, 8));
        let loaded = store.get("first").unwrap().unwrap();
        assert_eq!(loaded, original);
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let store = seeded();
        let dup = letter("first", dt(5, 10), dt(6, 8));
        assert!(matches!(store.insert(&dup), Err(PostError::Store(_))));
    }

    #[test]
    fn test_due_respects_status_and_time() {
        let store = seeded();
        assert!(store.due_ids(dt(0, 12)).unwrap().is_empty());
        assert_eq!(store.due_ids(dt(1, 8)).unwrap(), vec!["first"]);
        assert_eq!(store.due_ids(dt(10, 0)).unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_due_lists_unreadable_rows_without_failing() {
        let store = seeded();
        store
            .conn
            .execute(
                "UPDATE letters SET creation_time = 'garbage', status = 'in_transit' \
                 WHERE id = 'second'",
                [],
            )
            .unwrap();
        assert_eq!(store.due_ids(dt(10, 0)).unwrap(), vec!["first", "second"]);
        assert!(matches!(
            store.get("second"),
            Err(PostError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_latest_and_next() {
        let store = seeded();
        assert_eq!(
            store.latest_in_transit_schedule().unwrap().as_deref(),
            Some("2025-09-03 08:00:00")
        );
        assert_eq!(store.next_to_deliver().unwrap().unwrap().id, "first");
    }

    #[test]
    fn test_latest_breaks_ties_by_insertion() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&letter("a", dt(0, 10), dt(2, 0))).unwrap();
        store.insert(&letter("b", dt(0, 10), dt(3, 0))).unwrap();
        assert_eq!(
            store.latest_in_transit_schedule().unwrap().as_deref(),
            Some("2025-09-04 00:00:00")
        );
    }

    #[test]
    fn test_mark_delivered_is_forward_only() {
        let store = seeded();
        assert!(store.mark_delivered("first", dt(1, 9)).unwrap());
        let loaded = store.get("first").unwrap().unwrap();
        assert_eq!(loaded.status, LetterStatus::Delivered);
        assert_eq!(loaded.delivery_time, Some(dt(1, 9)));

        // Already delivered: no change
        assert!(!store.mark_delivered("first", dt(4, 9)).unwrap());
        assert_eq!(
            store.get("first").unwrap().unwrap().delivery_time,
            Some(dt(1, 9))
        );
        assert!(!store.mark_delivered("missing", dt(4, 9)).unwrap());
    }

    #[test]
    fn test_listings() {
        let store = seeded();
        assert_eq!(store.list(None).unwrap().len(), 3);
        let delivered = store.list(Some(LetterStatus::Delivered)).unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].id, "third");
        assert_eq!(store.list(Some(LetterStatus::InTransit)).unwrap().len(), 2);

        let upcoming = store.upcoming(dt(1, 12)).unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, "second");

        let summaries = store.summaries().unwrap();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[2].status, LetterStatus::Delivered);
    }

    #[test]
    fn test_delete() {
        let store = seeded();
        assert!(store.delete("second").unwrap());
        assert!(!store.delete("second").unwrap());
        assert!(store.get("second").unwrap().is_none());
    }

    #[test]
    fn test_reopen_file_keeps_records() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("postal.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert(&letter("kept", dt(0, 10), dt(1, 8))).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
        assert!(store.get("kept").unwrap().is_some());
    }
}
