use rusqlite::{Batch, Connection, OpenFlags};
use rusqlite::fallible_iterator::FallibleIterator;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::db::result::{CellValue, QueryResult};

/// How much trust generated SQL gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Anything the engine accepts runs, including writes.
    Unrestricted,
    /// Read-only connection; statements that would write are refused up front.
    ReadOnly,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Unrestricted => f.write_str("unrestricted"),
            ExecutionMode::ReadOnly => f.write_str("read_only"),
        }
    }
}

#[derive(Debug)]
pub enum ExecutionError {
    DatabaseUnavailable(String),
    Rejected(String),
    SqlError(String),
    TaskFailed(String),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::DatabaseUnavailable(msg) => write!(f, "Database unavailable: {}", msg),
            ExecutionError::Rejected(msg) => write!(f, "Statement rejected: {}", msg),
            ExecutionError::SqlError(msg) => write!(f, "SQL error: {}", msg),
            ExecutionError::TaskFailed(msg) => write!(f, "Execution task failed: {}", msg),
        }
    }
}

impl Error for ExecutionError {}

impl From<rusqlite::Error> for ExecutionError {
    fn from(err: rusqlite::Error) -> Self {
        ExecutionError::SqlError(err.to_string())
    }
}

/// Runs generated SQL against a SQLite file. Every call opens its own
/// connection and drops it before returning.
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor {
    mode: ExecutionMode,
}

impl QueryExecutor {
    pub fn new(mode: ExecutionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn execute(&self, sql: &str, database: &Path) -> Result<QueryResult, ExecutionError> {
        if sql.trim().is_empty() {
            return Err(ExecutionError::SqlError("empty statement".to_string()));
        }

        // Opening without SQLITE_OPEN_CREATE would fail anyway, this just gives a clearer message
        if !database.is_file() {
            return Err(ExecutionError::DatabaseUnavailable(format!(
                "{} does not exist",
                database.display()
            )));
        }

        let conn = self.open(database)?;
        debug!("Executing SQL against {}: {}", database.display(), sql);

        // Trailing whitespace and comments prepare to nothing; a second real statement is refused
        let mut batch = Batch::new(&conn, sql);
        let mut stmt = match batch.next()? {
            Some(stmt) => stmt,
            None => return Err(ExecutionError::SqlError("empty statement".to_string())),
        };
        if batch.next()?.is_some() {
            warn!("Refusing multi-statement SQL: {}", sql);
            return Err(ExecutionError::SqlError(
                "You can only execute one statement at a time".to_string(),
            ));
        }

        if self.mode == ExecutionMode::ReadOnly && !stmt.readonly() {
            warn!("Refusing non read-only statement: {}", sql);
            return Err(ExecutionError::Rejected(
                "only read-only statements are allowed".to_string(),
            ));
        }

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        let column_count = columns.len();

        let mut rows = stmt.query([])?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(CellValue::from(row.get_ref(i)?));
            }
            collected.push(values);
        }

        info!("Query returned {} rows", collected.len());

        Ok(QueryResult {
            columns,
            rows: collected,
        })
    }

    fn open(&self, database: &Path) -> Result<Connection, ExecutionError> {
        let access = match self.mode {
            ExecutionMode::Unrestricted => OpenFlags::SQLITE_OPEN_READ_WRITE,
            ExecutionMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
        };
        let flags = access | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        Connection::open_with_flags(database, flags)
            .map_err(|e| ExecutionError::DatabaseUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::create_movies_db;

    const TOP_FIVE: &str = "SELECT title, rating FROM movies ORDER BY rating DESC LIMIT 5;";

    #[test]
    fn top_rated_movies_come_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = create_movies_db(dir.path());

        let result = QueryExecutor::new(ExecutionMode::Unrestricted)
            .execute(TOP_FIVE, &db)
            .unwrap();

        assert_eq!(result.columns, vec!["title", "rating"]);
        assert_eq!(result.row_count(), 5);
        assert_eq!(result.value(0, "title"), Some(&CellValue::Text("The Godfather".to_string())));

        let ratings: Vec<f64> = result
            .rows
            .iter()
            .map(|row| match row[1] {
                CellValue::Real(r) => r,
                ref other => panic!("unexpected rating {:?}", other),
            })
            .collect();
        assert!(ratings.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn repeated_reads_agree() {
        let dir = tempfile::tempdir().unwrap();
        let db = create_movies_db(dir.path());
        let executor = QueryExecutor::new(ExecutionMode::ReadOnly);

        let first = executor.execute("SELECT * FROM movies WHERE year > 1990", &db).unwrap();
        let second = executor.execute("SELECT * FROM movies WHERE year > 1990", &db).unwrap();

        assert!(!first.is_empty());
        assert_eq!(first.row_count(), second.row_count());
        assert_eq!(first.columns, second.columns);
    }

    #[test]
    fn zero_rows_is_still_success() {
        let dir = tempfile::tempdir().unwrap();
        let db = create_movies_db(dir.path());

        let result = QueryExecutor::new(ExecutionMode::Unrestricted)
            .execute("SELECT title FROM movies WHERE rating > 100", &db)
            .unwrap();

        assert!(result.is_empty());
        assert_eq!(result.columns, vec!["title"]);
    }

    #[test]
    fn failures_are_values_with_messages() {
        let dir = tempfile::tempdir().unwrap();
        let db = create_movies_db(dir.path());
        let executor = QueryExecutor::new(ExecutionMode::Unrestricted);

        for sql in ["SELECT * FROM actors", "SELEC title FROM movies", "   "] {
            let err = executor.execute(sql, &db).unwrap_err();
            assert!(matches!(err, ExecutionError::SqlError(_)), "{sql}: {err:?}");
            assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn missing_database_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sqlite");

        let err = QueryExecutor::new(ExecutionMode::Unrestricted)
            .execute("SELECT 1", &path)
            .unwrap_err();

        assert!(matches!(err, ExecutionError::DatabaseUnavailable(_)));
        assert!(!path.exists());
    }

    #[test]
    fn unrestricted_mode_runs_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db = create_movies_db(dir.path());
        let executor = QueryExecutor::new(ExecutionMode::Unrestricted);

        let result = executor.execute("DELETE FROM movies WHERE rating < 8", &db).unwrap();
        assert!(result.is_empty());

        let remaining = executor.execute("SELECT COUNT(*) AS n FROM movies", &db).unwrap();
        assert_eq!(remaining.value(0, "n"), Some(&CellValue::Integer(4)));
    }

    #[test]
    fn trailing_comments_and_whitespace_are_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let db = create_movies_db(dir.path());

        let result = QueryExecutor::new(ExecutionMode::ReadOnly)
            .execute("SELECT COUNT(*) AS n FROM movies;  -- all of them\n\n", &db)
            .unwrap();

        assert_eq!(result.value(0, "n"), Some(&CellValue::Integer(7)));
    }

    #[test]
    fn second_statement_is_an_error_in_every_mode() {
        let dir = tempfile::tempdir().unwrap();
        let db = create_movies_db(dir.path());

        for mode in [ExecutionMode::ReadOnly, ExecutionMode::Unrestricted] {
            let executor = QueryExecutor::new(mode);
            for sql in [
                "SELECT COUNT(*) FROM movies; DROP TABLE movies;",
                "SELECT 1; DELETE FROM movies;",
            ] {
                let err = executor.execute(sql, &db).unwrap_err();
                assert!(matches!(err, ExecutionError::SqlError(_)), "{mode} {sql}: {err:?}");
            }
        }

        let count = QueryExecutor::new(ExecutionMode::ReadOnly)
            .execute("SELECT COUNT(*) AS n FROM movies", &db)
            .unwrap();
        assert_eq!(count.value(0, "n"), Some(&CellValue::Integer(7)));
    }

    #[test]
    fn read_only_mode_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db = create_movies_db(dir.path());
        let executor = QueryExecutor::new(ExecutionMode::ReadOnly);

        let err = executor.execute("DROP TABLE movies", &db).unwrap_err();
        assert!(matches!(err, ExecutionError::Rejected(_)));

        let still_there = executor.execute("SELECT COUNT(*) AS n FROM movies", &db).unwrap();
        assert_eq!(still_there.value(0, "n"), Some(&CellValue::Integer(7)));
    }
}
