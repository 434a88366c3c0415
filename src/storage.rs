use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::model::Record;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS browsing_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL,
        title TEXT,
        visit_time TEXT,
        description TEXT
    )";

/// A raw visit as produced by the history importer.
#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub url: String,
    pub title: Option<String>,
    pub visit_time: String,
}

/// Scraped page metadata for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct PageMetadata {
    pub id: i64,
    pub title: String,
    pub description: String,
}

/// Durable id → (title, description) mapping over the `browsing_history` table.
#[derive(Debug)]
pub struct RecordStore {
    conn: Mutex<Connection>,
}

impl RecordStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_TABLE)?;
        ensure_description_column(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
        .lock()
        .map_err(|_| Error::LockPoisoned("record store"))
    }

    /// Every record in ascending id order. The order is what the index
    /// builder assigns positions by.
    pub fn all_records(&self) -> Result<Vec<Record>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, title, description FROM browsing_history ORDER BY id ASC")?;
        let rows = stmt.query_map([], record_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn get(&self, id: i64) -> Result<Option<Record>> {
        let conn = self.conn()?;
        let record = conn
        .query_row(
            "SELECT id, title, description FROM browsing_history WHERE id = ?1",
            params![id],
            record_from_row,
        )
        .optional()?;
        Ok(record)
    }

    /// Resolves positions against the same enumeration as [`all_records`]:
    /// position `p` is the `p`-th record by ascending id, not id `p`.
    ///
    /// [`all_records`]: RecordStore::all_records
    pub fn get_by_position_order(&self, positions: &[usize]) -> Result<Vec<Option<Record>>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, description FROM browsing_history ORDER BY id ASC LIMIT 1 OFFSET ?1",
        )?;

        let mut out = Vec::with_capacity(positions.len());
        for &position in positions {
            let record = stmt.query_row(params![position as i64], record_from_row).optional()?;
            out.push(record);
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM browsing_history", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    /// Appends visits in one transaction; returns how many were written.
    pub fn insert_visits(&self, visits: &[Visit]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO browsing_history (url, title, visit_time) VALUES (?1, ?2, ?3)",
            )?;
            for v in visits {
                stmt.execute(params![v.url, v.title, v.visit_time])?;
            }
        }
        tx.commit()?;
        Ok(visits.len())
    }

    /// `(id, url)` pairs in id order, capped at `limit` when given.
    pub fn urls(&self, limit: Option<usize>) -> Result<Vec<(i64, String)>> {
        let conn = self.conn()?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare("SELECT id, url FROM browsing_history ORDER BY id ASC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn update_metadata(&self, metadata: &[PageMetadata]) -> Result<()> {
        if metadata.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE browsing_history SET title = ?1, description = ?2 WHERE id = ?3",
            )?;
            for m in metadata {
                stmt.execute(params![m.title, m.description, m.id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        id: row.get(0)?,
        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
    })
}

// Stores created by the plain history import predate the description column.
fn ensure_description_column(conn: &Connection) -> Result<()> {
    let present: Option<String> = conn
    .query_row(
        "SELECT name FROM pragma_table_info('browsing_history') WHERE name = 'description'",
        [],
        |r| r.get(0),
    )
    .optional()?;

    if present.is_none() {
        conn.execute("ALTER TABLE browsing_history ADD COLUMN description TEXT", [])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(rows: &[(i64, &str, &str)]) -> RecordStore {
        let store = RecordStore::open_in_memory().unwrap();
        {
            let conn = store.conn().unwrap();
            for (id, title, desc) in rows {
                conn.execute(
                    "INSERT INTO browsing_history (id, url, title, description) VALUES (?1, ?2, ?3, ?4)",
                    params![id, format!("https://example.com/{}", id), title, desc],
                )
                .unwrap();
            }
        }
        store
    }

    #[test]
    fn all_records_orders_by_id() {
        let store = store_with(&[(9, "b", "B"), (2, "c", "C"), (5, "a", "A")]);
        let ids: Vec<i64> = store.all_records().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn position_order_is_not_raw_id_lookup() {
        let store = store_with(&[(5, "five", ""), (9, "nine", ""), (12, "twelve", "")]);
        let res = store.get_by_position_order(&[1, 0, 7]).unwrap();
        assert_eq!(res[0].as_ref().map(|r| r.id), Some(9));
        assert_eq!(res[1].as_ref().map(|r| r.id), Some(5));
        assert!(res[2].is_none());
    }

    #[test]
    fn null_metadata_reads_as_empty() {
        let store = RecordStore::open_in_memory().unwrap();
        store
        .insert_visits(&[Visit { url: "https://x.test".into(), title: None, visit_time: "2024-01-01 00:00:00".into() }])
        .unwrap();
        let r = store.get(1).unwrap().unwrap();
        assert_eq!(r.title, "");
        assert_eq!(r.description, "");
    }

    #[test]
    fn update_metadata_writes_back() {
        let store = store_with(&[(1, "old", "")]);
        store
        .update_metadata(&[PageMetadata { id: 1, title: "New".into(), description: "Desc".into() }])
        .unwrap();
        assert_eq!(store.get(1).unwrap().unwrap(), Record::new(1, "New", "Desc"));
    }

    #[test]
    fn urls_respects_limit() {
        let store = store_with(&[(1, "", ""), (2, "", ""), (3, "", "")]);
        assert_eq!(store.urls(Some(2)).unwrap().len(), 2);
        assert_eq!(store.urls(None).unwrap().len(), 3);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn legacy_table_gains_description_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE browsing_history (id INTEGER PRIMARY KEY AUTOINCREMENT, url TEXT NOT NULL, title TEXT, visit_time TEXT);
             INSERT INTO browsing_history (url, title) VALUES ('https://a.test', 'A');",
        )
        .unwrap();
        let store = RecordStore::init(conn).unwrap();
        assert_eq!(store.get(1).unwrap().unwrap(), Record::new(1, "A", ""));
    }

    #[test]
    fn poisoned_lock_is_reported_as_such() {
        let store = std::sync::Arc::new(store_with(&[(1, "Weather", "")]));
        let holder = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.conn.lock().unwrap();
            panic!("writer died mid-transaction");
        })
        .join();

        let err = store.count().unwrap_err();
        assert!(matches!(err, Error::LockPoisoned("record store")));
        assert_eq!(err.to_string(), "record store lock poisoned");
    }
}
