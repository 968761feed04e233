//! SQLite key-value store for state that outlives a single job.
//!
//! Values are JSON documents under fixed keys: pending chapter images,
//! the scraped chapter cache and the persisted download settings.

use crate::error::StorageError;
use crate::models::{Chapter, DownloadSettings, PendingChapter, ScrapedChapters};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub const PENDING_CHAPTER_IMAGES: &str = "pendingChapterImages";
pub const MANGA_CHAPTERS: &str = "mangaChapters";
pub const LAST_SCRAPED_TIME: &str = "lastScrapedTime";
pub const SETTINGS: &str = "settings";

pub fn init_db(path: impl AsRef<Path>) -> Result<Connection, StorageError> {
    let conn = Connection::open(path)?;
    create_tables(&conn)?;
    Ok(conn)
}

pub fn init_in_memory() -> Result<Connection, StorageError> {
    let conn = Connection::open_in_memory()?;
    create_tables(&conn)?;
    Ok(conn)
}

pub fn create_tables(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

pub fn get_value<T: DeserializeOwned>(conn: &Connection, key: &str) -> Result<Option<T>, StorageError> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?;
    match raw {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub fn set_value<T: Serialize + ?Sized>(conn: &Connection, key: &str, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, json],
    )?;
    Ok(())
}

pub fn remove_value(conn: &Connection, key: &str) -> Result<(), StorageError> {
    conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
    Ok(())
}

/// Record the images of one chapter folder. Re-recording a folder replaces
/// its URLs but keeps its original position.
pub fn record_pending_chapter(conn: &Connection, folder: &str, urls: &[String]) -> Result<(), StorageError> {
    let mut pending: Vec<PendingChapter> = get_value(conn, PENDING_CHAPTER_IMAGES)?.unwrap_or_default();
    match pending.iter_mut().find(|p| p.folder == folder) {
        Some(existing) => existing.urls = urls.to_vec(),
        None => pending.push(PendingChapter {
            folder: folder.to_string(),
            urls: urls.to_vec(),
        }),
    }
    set_value(conn, PENDING_CHAPTER_IMAGES, &pending)
}

pub fn load_pending_chapters(conn: &Connection) -> Result<Vec<PendingChapter>, StorageError> {
    Ok(get_value(conn, PENDING_CHAPTER_IMAGES)?.unwrap_or_default())
}

pub fn clear_pending_chapters(conn: &Connection) -> Result<(), StorageError> {
    remove_value(conn, PENDING_CHAPTER_IMAGES)
}

pub fn save_scraped_chapters(conn: &Connection, chapters: &[Chapter]) -> Result<ScrapedChapters, StorageError> {
    let now = chrono::Utc::now().timestamp_millis();
    set_value(conn, MANGA_CHAPTERS, chapters)?;
    set_value(conn, LAST_SCRAPED_TIME, &now)?;
    Ok(ScrapedChapters {
        chapters: chapters.to_vec(),
        last_scraped_time: now,
    })
}

pub fn load_scraped_chapters(conn: &Connection) -> Result<Option<ScrapedChapters>, StorageError> {
    let Some(chapters) = get_value::<Vec<Chapter>>(conn, MANGA_CHAPTERS)? else {
        return Ok(None);
    };
    let last_scraped_time = get_value(conn, LAST_SCRAPED_TIME)?.unwrap_or_default();
    Ok(Some(ScrapedChapters {
        chapters,
        last_scraped_time,
    }))
}

pub fn save_settings(conn: &Connection, settings: &DownloadSettings) -> Result<(), StorageError> {
    set_value(conn, SETTINGS, &settings.normalized())
}

pub fn load_settings(conn: &Connection) -> Result<Option<DownloadSettings>, StorageError> {
    get_value(conn, SETTINGS)
}

/// Shared handle to the store
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Ok(Self::from_connection(init_db(path)?))
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self::from_connection(init_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    pub fn record_pending_chapter(&self, folder: &str, urls: &[String]) -> Result<(), StorageError> {
        record_pending_chapter(&*self.conn()?, folder, urls)
    }

    pub fn load_pending_chapters(&self) -> Result<Vec<PendingChapter>, StorageError> {
        load_pending_chapters(&*self.conn()?)
    }

    pub fn clear_pending_chapters(&self) -> Result<(), StorageError> {
        clear_pending_chapters(&*self.conn()?)
    }

    pub fn save_scraped_chapters(&self, chapters: &[Chapter]) -> Result<ScrapedChapters, StorageError> {
        save_scraped_chapters(&*self.conn()?, chapters)
    }

    pub fn load_scraped_chapters(&self) -> Result<Option<ScrapedChapters>, StorageError> {
        load_scraped_chapters(&*self.conn()?)
    }

    pub fn save_settings(&self, settings: &DownloadSettings) -> Result<(), StorageError> {
        save_settings(&*self.conn()?, settings)
    }

    pub fn load_settings(&self) -> Result<Option<DownloadSettings>, StorageError> {
        load_settings(&*self.conn()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NumberSource;

    fn urls(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pending_chapters_keep_order_and_replace_in_place() {
        let conn = init_in_memory().unwrap();
        record_pending_chapter(&conn, "Manga/Chapter 2", &urls(&["a", "b"])).unwrap();
        record_pending_chapter(&conn, "Manga/Chapter 1", &urls(&["c"])).unwrap();
        record_pending_chapter(&conn, "Manga/Chapter 2", &urls(&["d"])).unwrap();

        let pending = load_pending_chapters(&conn).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].folder, "Manga/Chapter 2");
        assert_eq!(pending[0].urls, urls(&["d"]));
        assert_eq!(pending[1].folder, "Manga/Chapter 1");

        clear_pending_chapters(&conn).unwrap();
        assert!(load_pending_chapters(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_scraped_chapters_roundtrip_with_timestamp() {
        let store = Store::in_memory().unwrap();
        assert!(store.load_scraped_chapters().unwrap().is_none());

        let chapters = vec![Chapter {
            url: "https://s.com/chapter-1".into(),
            name: "Chapter 1".into(),
            number: Some(1.0),
            number_source: NumberSource::Url,
        }];
        let saved = store.save_scraped_chapters(&chapters).unwrap();
        let loaded = store.load_scraped_chapters().unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert!(loaded.last_scraped_time > 0);
    }

    #[test]
    fn test_settings_are_normalized_on_save() {
        let store = Store::in_memory().unwrap();
        assert!(store.load_settings().unwrap().is_none());
        store
            .save_settings(&DownloadSettings {
                download_delay: 0,
                batch_size: 99,
                chapter_delay: 500,
            })
            .unwrap();
        let loaded = store.load_settings().unwrap().unwrap();
        assert_eq!(loaded.download_delay, 0);
        assert_eq!(loaded.batch_size, 10);
    }

    #[test]
    fn test_corrupt_value_is_a_json_error() {
        let conn = init_in_memory().unwrap();
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)",
            params![SETTINGS, "not json"],
        )
        .unwrap();
        assert!(matches!(load_settings(&conn), Err(StorageError::Json(_))));
    }
}
