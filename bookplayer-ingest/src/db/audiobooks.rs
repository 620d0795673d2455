//! Audiobook store
//!
//! An audiobook and its chapters are written in one transaction: either
//! every row lands or none does.

use super::retry::retry_on_lock;
use crate::models::{AudiobookInfo, Chapter, ProcessedAudiobook, ProcessedChapter};
use async_trait::async_trait;
use bookplayer_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use std::time::Duration;

/// Default time to keep retrying while the database is locked
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

/// Persistence collaborator used by the audiobook sink
#[async_trait]
pub trait AudiobookStore: Send + Sync + 'static {
    /// Insert the audiobook and its chapters atomically; returns the new id
    async fn insert_audiobook(&self, audiobook: &ProcessedAudiobook) -> Result<i64>;

    /// Load an audiobook with chapters ordered by ordinal
    async fn get_audiobook_by_id(&self, id: i64) -> Result<ProcessedAudiobook>;

    /// Release connections
    async fn close(&self) {}
}

/// SQLite-backed [`AudiobookStore`]
#[derive(Debug, Clone)]
pub struct SqliteAudiobookStore {
    pool: SqlitePool,
    lock_wait: Duration,
}

impl SqliteAudiobookStore {
    /// Wrap a pool whose schema was created by `bookplayer_common::db`
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_once(&self, audiobook: &ProcessedAudiobook) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let info = &audiobook.info;

        let id = sqlx::query(
            r#"
            INSERT INTO audiobooks
                (title, author, narrator, description, genre, duration, dir_path, chapter_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&info.title)
        .bind(&info.author)
        .bind(&info.narrator)
        .bind(&info.description)
        .bind(&info.genre)
        .bind(info.duration)
        .bind(audiobook.dir_path.to_string_lossy().into_owned())
        .bind(audiobook.chapters.len() as i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for processed in &audiobook.chapters {
            let chapter = &processed.chapter;
            sqlx::query(
                r#"
                INSERT INTO chapters
                    (audiobook_id, title, numbering, start_time, end_time, file_path)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(&chapter.title)
            .bind(chapter.ordinal as i64)
            .bind(chapter.start_time)
            .bind(chapter.end_time)
            .bind(processed.file_path.to_string_lossy().into_owned())
            .execute(&mut *tx)
            .await?;
        }

        // Dropping an uncommitted transaction rolls it back
        tx.commit().await?;
        Ok(id)
    }
}

#[async_trait]
impl AudiobookStore for SqliteAudiobookStore {
    async fn insert_audiobook(&self, audiobook: &ProcessedAudiobook) -> Result<i64> {
        if audiobook.info.title.is_empty() {
            return Err(Error::InvalidInput("audiobook title is empty".to_string()));
        }
        retry_on_lock("insert audiobook", self.lock_wait, || self.insert_once(audiobook)).await
    }

    async fn get_audiobook_by_id(&self, id: i64) -> Result<ProcessedAudiobook> {
        let row = sqlx::query(
            r#"
            SELECT title, author, narrator, description, genre, duration, dir_path, created_at
            FROM audiobooks
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("audiobook {}", id)))?;

        let info = AudiobookInfo {
            title: row.get("title"),
            author: row.get("author"),
            narrator: row.get("narrator"),
            description: row.get("description"),
            genre: row.get("genre"),
            duration: row.get("duration"),
        };
        let dir_path: String = row.get("dir_path");
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        let chapter_rows = sqlx::query(
            r#"
            SELECT title, numbering, start_time, end_time, file_path
            FROM chapters
            WHERE audiobook_id = ?
            ORDER BY numbering
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let chapters = chapter_rows
            .iter()
            .map(|row| {
                let numbering: i64 = row.get("numbering");
                let file_path: String = row.get("file_path");
                ProcessedChapter {
                    chapter: Chapter {
                        title: row.get("title"),
                        start_time: row.get("start_time"),
                        end_time: row.get("end_time"),
                        ordinal: numbering as u32,
                    },
                    file_path: PathBuf::from(file_path),
                }
            })
            .collect();

        Ok(ProcessedAudiobook {
            id: Some(id),
            info,
            dir_path: PathBuf::from(dir_path),
            chapters,
            created_at: Some(created_at),
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookplayer_common::db::init_memory_database;

    fn sample(title: &str, chapter_count: u32) -> ProcessedAudiobook {
        ProcessedAudiobook {
            id: None,
            info: AudiobookInfo {
                title: title.to_string(),
                author: "Author".to_string(),
                duration: chapter_count as f64 * 60.0,
                ..Default::default()
            },
            dir_path: PathBuf::from(format!("/processed/{}", title)),
            chapters: (1..=chapter_count)
                .map(|n| ProcessedChapter {
                    chapter: Chapter {
                        title: format!("Chapter {}", n),
                        start_time: (n - 1) as f64 * 60.0,
                        end_time: n as f64 * 60.0,
                        ordinal: n,
                    },
                    file_path: PathBuf::from(format!("/processed/{}/{}.m4b", title, n)),
                })
                .collect(),
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let store = SqliteAudiobookStore::new(init_memory_database().await.unwrap());
        let book = sample("Dune", 3);

        let id = store.insert_audiobook(&book).await.unwrap();
        let loaded = store.get_audiobook_by_id(id).await.unwrap();

        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.info, book.info);
        assert_eq!(loaded.dir_path, book.dir_path);
        assert_eq!(loaded.chapters, book.chapters);
        assert!(loaded.created_at.is_some());
    }

    #[tokio::test]
    async fn test_undecodable_created_at_is_error() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query(
            "INSERT INTO audiobooks (title, dir_path, chapter_count, created_at) \
             VALUES ('Garbled', '/processed/Garbled', 0, 'last tuesday')",
        )
        .execute(&pool)
        .await
        .unwrap();
        let store = SqliteAudiobookStore::new(pool);

        assert!(matches!(
            store.get_audiobook_by_id(1).await,
            Err(Error::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_id_is_not_found() {
        let store = SqliteAudiobookStore::new(init_memory_database().await.unwrap());
        assert!(matches!(
            store.get_audiobook_by_id(42).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_chapters_returned_in_ordinal_order() {
        let store = SqliteAudiobookStore::new(init_memory_database().await.unwrap());
        let mut book = sample("Emma", 3);
        book.chapters.reverse();

        let id = store.insert_audiobook(&book).await.unwrap();
        let loaded = store.get_audiobook_by_id(id).await.unwrap();

        let ordinals: Vec<u32> = loaded.chapters.iter().map(|c| c.chapter.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failed_chapter_insert_rolls_back_audiobook() {
        let store = SqliteAudiobookStore::new(init_memory_database().await.unwrap());
        let mut book = sample("Broken", 2);
        // Duplicate ordinal violates UNIQUE(audiobook_id, numbering)
        book.chapters[1].chapter.ordinal = 1;

        assert!(store.insert_audiobook(&book).await.is_err());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audiobooks")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
