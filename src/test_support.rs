//! Shared fixtures for unit tests.

use async_trait::async_trait;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::llm::{LlmError, SqlGenerator};

pub const MOVIES: &[(&str, i64, f64)] = &[
    ("The Godfather", 1972, 9.2),
    ("The Dark Knight", 2008, 9.0),
    ("Pulp Fiction", 1994, 8.9),
    ("Inception", 2010, 8.8),
    ("Heat", 1995, 7.9),
    ("Speed", 1994, 7.2),
    ("Cats", 2019, 2.8),
];

/// Writes a small movies database into `dir` and returns its path.
pub fn create_movies_db(dir: &Path) -> PathBuf {
    let path = dir.join("movies.sqlite");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE movies (id INTEGER PRIMARY KEY, title TEXT NOT NULL, year INTEGER, rating REAL);",
    )
    .unwrap();
    for (title, year, rating) in MOVIES {
        conn.execute(
            "INSERT INTO movies (title, year, rating) VALUES (?1, ?2, ?3)",
            rusqlite::params![title, year, rating],
        )
        .unwrap();
    }
    path
}

/// Generator that answers every question with a canned reply and counts calls.
pub struct CannedGenerator {
    reply: Result<String, String>,
    calls: Arc<AtomicUsize>,
}

impl CannedGenerator {
    pub fn answering(sql: &str) -> (Self, Arc<AtomicUsize>) {
        Self::with_reply(Ok(sql.to_string()))
    }

    pub fn failing(message: &str) -> (Self, Arc<AtomicUsize>) {
        Self::with_reply(Err(message.to_string()))
    }

    fn with_reply(reply: Result<String, String>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                reply,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl SqlGenerator for CannedGenerator {
    async fn generate_sql(&self, _question: &str, _instruction: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .clone()
            .map_err(LlmError::ConnectionError)
    }
}
