//! Reading letter files for submission.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{PostError, Result};

/// Date formats recognized in letter file names.
const NAME_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d_%H-%M", "%Y-%m-%d %H-%M", "%Y-%m-%dT%H-%M"];
const NAME_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%Y%m%d"];

/// A letter as read from disk, before it enters the post office.
#[derive(Debug, Clone, PartialEq)]
pub struct LetterDraft {
    /// File stem.
    pub name: String,
    pub contents: String,
    /// From the name when it is a date, else the file's modification time.
    pub creation_time: Option<DateTime<Utc>>,
}

impl LetterDraft {
    /// Read a letter file.
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| PostError::io(path, e))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PostError::Config(format!("no file name in {}", path.display())))?;
        let creation_time = creation_time_from_name(&name).or_else(|| modified_time(path));
        Ok(Self {
            name,
            contents,
            creation_time,
        })
    }

    /// A draft built in memory.
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        let name = name.into();
        let creation_time = creation_time_from_name(&name);
        Self {
            name,
            contents: contents.into(),
            creation_time,
        }
    }
}

/// Resolve a CLI argument to a letter file: an existing path is used as is,
/// otherwise `<letters_dir>/<name>.txt`.
pub fn resolve_letter_path(arg: &str, letters_dir: &Path) -> PathBuf {
    let direct = PathBuf::from(arg);
    if direct.is_file() {
        return direct;
    }
    let file_name = if Path::new(arg).extension().is_some() {
        arg.to_string()
    } else {
        format!("{arg}.txt")
    };
    letters_dir.join(file_name)
}

/// Interpret a letter name such as `2025-09-01` or `01-09-2025` as a date.
pub fn creation_time_from_name(name: &str) -> Option<DateTime<Utc>> {
    let name = name.trim();
    for fmt in NAME_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(name, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in NAME_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(name, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let dt: DateTime<Utc> = modified.into();
    Some(chrono::SubsecRound::trunc_subsecs(dt, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_name_date_formats() {
        let sep1 = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
        assert_eq!(creation_time_from_name("2025-09-01"), Some(sep1));
        assert_eq!(creation_time_from_name("01-09-2025"), Some(sep1));
        assert_eq!(creation_time_from_name("20250901"), Some(sep1));
        assert_eq!(
            creation_time_from_name("2025-09-01_21-30"),
            Some(Utc.with_ymd_and_hms(2025, 9, 1, 21, 30, 0).unwrap())
        );
        assert_eq!(creation_time_from_name("for-ana"), None);
    }

    #[test]
    fn test_read_uses_stem_and_name_date() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("2025-09-01.txt");
        std::fs::write(&path, "Querida Ana,\n").unwrap();
        let draft = LetterDraft::read(&path).unwrap();
        assert_eq!(draft.name, "2025-09-01");
        assert_eq!(draft.contents, "Querida Ana,\n");
        assert_eq!(
            draft.creation_time,
            Some(Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_read_falls_back_to_mtime() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("for-ana.txt");
        std::fs::write(&path, "hi").unwrap();
        let draft = LetterDraft::read(&path).unwrap();
        assert!(draft.creation_time.is_some());
    }

    #[test]
    fn test_read_missing_file() {
        let err = LetterDraft::read(Path::new("/nonexistent/letter.txt")).unwrap_err();
        assert!(matches!(err, PostError::Io { .. }));
    }

    #[test]
    fn test_resolve_letter_path() {
        let tmp = tempfile::tempdir().unwrap();
        let existing = tmp.path().join("direct.txt");
        std::fs::write(&existing, "x").unwrap();
        let arg = existing.to_string_lossy().into_owned();
        assert_eq!(resolve_letter_path(&arg, Path::new("/letters")), existing);
        assert_eq!(
            resolve_letter_path("2025-09-01", Path::new("/letters")),
            PathBuf::from("/letters/2025-09-01.txt")
        );
        assert_eq!(
            resolve_letter_path("note.md", Path::new("/letters")),
            PathBuf::from("/letters/note.md")
        );
    }
}
