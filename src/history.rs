//! Chrome history import: copies `urls ⋈ visits` from a Chrome profile's
//! `History` database into the record store.

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OpenFlags};
use tracing::info;

use crate::error::{Error, Result};
use crate::storage::{RecordStore, Visit};

const DEFAULT_CHROME_HISTORY: &str = ".config/google-chrome/Default/History";

/// `~/.config/google-chrome/Default/History`, if a home directory is known.
pub fn default_chrome_history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_CHROME_HISTORY))
}

/// Chrome stores visit times as microseconds since 1601-01-01 UTC.
pub fn chrome_time_to_datetime(micros: i64) -> Option<NaiveDateTime> {
    let epoch = NaiveDate::from_ymd_opt(1601, 1, 1)?.and_hms_opt(0, 0, 0)?;
    epoch.checked_add_signed(Duration::microseconds(micros))
}

fn format_visit_time(micros: i64) -> String {
    chrome_time_to_datetime(micros)
    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
    .unwrap_or_default()
}

/// Reads every visit, newest first.
pub fn extract_history(chrome_db: &Path) -> Result<Vec<Visit>> {
    if !chrome_db.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Chrome history database not found at {}", chrome_db.display()),
        )));
    }

    let conn = Connection::open_with_flags(chrome_db, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let mut stmt = conn.prepare(
        "SELECT urls.url, urls.title, visits.visit_time
         FROM urls, visits
         WHERE urls.id = visits.url
         ORDER BY visits.visit_time DESC",
    )?;

    let rows = stmt.query_map([], |row| {
        let micros: i64 = row.get(2)?;
        Ok(Visit {
            url: row.get(0)?,
            title: row.get(1)?,
            visit_time: format_visit_time(micros),
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Extract and store in one step; returns the number of rows written.
pub fn import_history(chrome_db: &Path, store: &RecordStore) -> Result<usize> {
    let visits = extract_history(chrome_db)?;
    let written = store.insert_visits(&visits)?;
    info!("Stored {} history entries", written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn converts_chrome_epoch() {
        // 2024-01-01 00:00:00 UTC
        let t = chrome_time_to_datetime(13_348_540_800_000_000).unwrap();
        assert_eq!(t.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-01 00:00:00");
        assert_eq!(format_visit_time(0), "1601-01-01 00:00:00");
    }

    #[test]
    fn missing_history_names_the_path() {
        let err = extract_history(Path::new("/nonexistent/History")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/History"));
    }

    #[test]
    fn imports_visits_newest_first() {
        let dir = tempdir().unwrap();
        let chrome = dir.path().join("History");
        {
            let conn = Connection::open(&chrome).unwrap();
            conn.execute_batch(
                "CREATE TABLE urls (id INTEGER PRIMARY KEY, url TEXT, title TEXT);
                 CREATE TABLE visits (id INTEGER PRIMARY KEY, url INTEGER, visit_time INTEGER);
                 INSERT INTO urls VALUES (1, 'https://old.test', 'Old'), (2, 'https://new.test', 'New');
                 INSERT INTO visits VALUES (1, 1, 13348540800000000), (2, 2, 13348540900000000);",
            )
            .unwrap();
        }

        let store = RecordStore::open_in_memory().unwrap();
        assert_eq!(import_history(&chrome, &store).unwrap(), 2);

        let urls = store.urls(None).unwrap();
        assert_eq!(urls[0].1, "https://new.test");
        assert_eq!(store.get(2).unwrap().unwrap().title, "Old");
    }
}
