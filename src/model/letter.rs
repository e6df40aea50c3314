//! Letter records and their delivery status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::postal::PostalInfo;
use crate::error::{PostError, Result};

/// Text format for every stored timestamp (UTC). String order equals time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Where a letter is in its lifecycle.
///
/// The only transition is `InTransit` → `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LetterStatus {
    /// Submitted and waiting for its scheduled time, or for a successful send.
    InTransit,
    /// Sent. Terminal.
    Delivered,
}

impl LetterStatus {
    /// Stored representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
        }
    }
}

impl fmt::Display for LetterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for LetterStatus {
    type Err = PostError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "in_transit" => Ok(Self::InTransit),
            "delivered" => Ok(Self::Delivered),
            other => Err(PostError::InvalidStatus(other.to_string())),
        }
    }
}

/// A submitted letter with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Letter {
    /// Unique, immutable identifier.
    pub id: String,
    /// Human label, usually the source file stem.
    pub name: String,
    /// When the letter was written.
    pub creation_time: DateTime<Utc>,
    /// Raw text body.
    pub contents: String,
    /// HTML rendering made at submission.
    pub rendered_html: Option<String>,
    /// Sender and recipient snapshot.
    pub postal_info: PostalInfo,
    /// When the post office accepted the letter.
    pub received_time: DateTime<Utc>,
    /// Set once at submission and never changed.
    pub scheduled_delivery_time: DateTime<Utc>,
    /// Set only by a successful send.
    pub delivery_time: Option<DateTime<Utc>>,
    pub status: LetterStatus,
}

impl Letter {
    /// Apply the `in_transit → delivered` transition.
    pub fn mark_delivered(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.status == LetterStatus::Delivered {
            return Err(PostError::AlreadyDelivered(self.id.clone()));
        }
        self.status = LetterStatus::Delivered;
        self.delivery_time = Some(at);
        Ok(())
    }

    /// Compact view for listings.
    pub fn summary(&self) -> LetterSummary {
        LetterSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            scheduled_delivery_time: self.scheduled_delivery_time,
        }
    }
}

/// One row of an administrative listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterSummary {
    pub id: String,
    pub name: String,
    pub status: LetterStatus,
    pub scheduled_delivery_time: DateTime<Utc>,
}

/// Format a timestamp for storage and display.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. RFC 3339 is accepted as well.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| PostError::InvalidTimestamp(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Letter {
        let t0 = Utc.with_ymd_and_hms(2025, 9, 1, 10, 0, 0).unwrap();
        Letter {
            id: "abc".into(),
            name: "2025-09-01".into(),
            creation_time: t0,
            contents: "Hola".into(),
            rendered_html: None,
            postal_info: PostalInfo::default(),
            received_time: t0,
            scheduled_delivery_time: t0 + chrono::Duration::days(1),
            delivery_time: None,
            status: LetterStatus::InTransit,
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("in_transit".parse::<LetterStatus>().unwrap(), LetterStatus::InTransit);
        assert_eq!("in transit".parse::<LetterStatus>().unwrap(), LetterStatus::InTransit);
        assert_eq!("Delivered".parse::<LetterStatus>().unwrap(), LetterStatus::Delivered);
        let err = "failed".parse::<LetterStatus>().unwrap_err();
        assert!(matches!(err, PostError::InvalidStatus(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedInput);
    }

    #[test]
    fn test_mark_delivered_only_once() {
        let mut letter = sample();
        let at = letter.scheduled_delivery_time;
        letter.mark_delivered(at).unwrap();
        assert_eq!(letter.status, LetterStatus::Delivered);
        assert_eq!(letter.delivery_time, Some(at));

        let again = letter.mark_delivered(at + chrono::Duration::hours(1));
        assert!(matches!(again, Err(PostError::AlreadyDelivered(_))));
        assert_eq!(letter.delivery_time, Some(at));
    }

    #[test]
    fn test_timestamp_text_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2025, 9, 3, 8, 5, 9).unwrap();
        let text = format_timestamp(ts);
        assert_eq!(text, "2025-09-03 08:05:09");
        assert_eq!(parse_timestamp(&text).unwrap(), ts);
        assert_eq!(parse_timestamp("2025-09-03T08:05:09Z").unwrap(), ts);
        assert!(matches!(
            parse_timestamp("next tuesday"),
            Err(PostError::InvalidTimestamp(_))
        ));
    }
}
