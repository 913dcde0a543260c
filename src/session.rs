use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::result::QueryResult;

#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub question: String,
    pub sql: String,
    pub rows: QueryResult,
    pub executed_at: DateTime<Utc>,
}

/// Queries executed during one session, oldest first. With a capacity the
/// oldest record is dropped once the log is full.
#[derive(Debug, Default)]
pub struct SessionLog {
    records: VecDeque<SessionRecord>,
    capacity: Option<usize>,
}

impl SessionLog {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.filter(|c| *c > 0),
        }
    }

    pub fn append(&mut self, question: &str, sql: &str, rows: QueryResult) {
        if let Some(capacity) = self.capacity {
            while self.records.len() >= capacity {
                self.records.pop_front();
            }
        }

        self.records.push_back(SessionRecord {
            question: question.to_string(),
            sql: sql.to_string(),
            rows,
            executed_at: Utc::now(),
        });
    }

    pub fn list_reverse_chronological(&self) -> Vec<&SessionRecord> {
        self.records.iter().rev().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Everything one user session owns.
#[derive(Debug)]
pub struct SessionContext {
    pub id: String,
    pub database: PathBuf,
    pub uploaded: bool,
    pub log: SessionLog,
    /// Last displayed result, the source for exports
    pub last_result: Option<QueryResult>,
    pub created_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(id: impl Into<String>, database: impl Into<PathBuf>, capacity: Option<usize>) -> Self {
        Self {
            id: id.into(),
            database: database.into(),
            uploaded: false,
            log: SessionLog::new(capacity),
            last_result: None,
            created_at: Utc::now(),
        }
    }

    pub fn use_uploaded_database(&mut self, path: impl Into<PathBuf>) {
        self.database = path.into();
        self.uploaded = true;
        self.last_result = None;
    }

    /// Deletes the uploaded database file, if this session has one.
    pub async fn release_upload(&self) {
        if !self.uploaded {
            return;
        }
        match tokio::fs::remove_file(&self.database).await {
            Ok(()) => debug!("Removed uploaded database {}", self.database.display()),
            Err(e) => warn!(
                "Failed to remove uploaded database {}: {}",
                self.database.display(),
                e
            ),
        }
    }
}

pub type SharedSession = Arc<Mutex<SessionContext>>;

struct SessionSlot {
    session: SharedSession,
    last_seen: Instant,
}

/// Live sessions keyed by id. The per-session mutex keeps requests from one
/// session strictly sequential while other sessions proceed. Every lookup
/// refreshes the session's idle clock.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionSlot>>,
    default_database: PathBuf,
    capacity: Option<usize>,
}

impl SessionStore {
    pub fn new(default_database: impl Into<PathBuf>, capacity: Option<usize>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_database: default_database.into(),
            capacity,
        }
    }

    pub fn default_database(&self) -> &Path {
        &self.default_database
    }

    pub async fn create(&self) -> SharedSession {
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Mutex::new(SessionContext::new(
            id.clone(),
            self.default_database.clone(),
            self.capacity,
        )));

        self.sessions.write().await.insert(
            id.clone(),
            SessionSlot {
                session: Arc::clone(&session),
                last_seen: Instant::now(),
            },
        );
        info!("Created session {}", id);
        session
    }

    pub async fn get(&self, id: &str) -> Option<SharedSession> {
        let mut sessions = self.sessions.write().await;
        let slot = sessions.get_mut(id)?;
        slot.last_seen = Instant::now();
        Some(Arc::clone(&slot.session))
    }

    pub async fn remove(&self, id: &str) -> Option<SharedSession> {
        let removed = self.sessions.write().await.remove(id).map(|slot| slot.session);
        if removed.is_some() {
            debug!("Removed session {}", id);
        }
        removed
    }

    /// Drops every session not looked up for `idle` as of `now`, deleting
    /// their uploaded databases. Sessions with a request in flight are kept.
    pub async fn expire_idle(&self, idle: Duration, now: Instant) -> usize {
        let expired: Vec<(String, SharedSession)> = {
            let mut sessions = self.sessions.write().await;
            let stale: Vec<String> = sessions
                .iter()
                .filter(|(_, slot)| {
                    now.saturating_duration_since(slot.last_seen) >= idle
                        && slot.session.try_lock().is_ok()
                })
                .map(|(id, _)| id.clone())
                .collect();

            stale
                .into_iter()
                .filter_map(|id| sessions.remove(&id).map(|slot| (id, slot.session)))
                .collect()
        };

        for (id, session) in &expired {
            session.lock().await.release_upload().await;
            info!("Expired idle session {}", id);
        }

        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
