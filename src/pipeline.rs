use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::db::executor::{ExecutionError, QueryExecutor};
use crate::db::result::QueryResult;
use crate::history::{HistoryError, HistoryLog};
use crate::llm::{LlmError, LlmManager};
use crate::prompt::{PromptError, PromptLoader};
use crate::session::SessionContext;

#[derive(Debug)]
pub enum AskError {
    EmptyQuestion,
    PromptUnavailable(PromptError),
    Translation(LlmError),
    Execution { sql: String, error: ExecutionError },
}

impl fmt::Display for AskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AskError::EmptyQuestion => write!(f, "Question is empty"),
            AskError::PromptUnavailable(err) => write!(f, "{}", err),
            AskError::Translation(err) => write!(f, "{}", err),
            AskError::Execution { error, .. } => write!(f, "{}", error),
        }
    }
}

impl Error for AskError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AskStatus {
    Rows,
    /// The statement ran fine and produced nothing
    Empty,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub status: AskStatus,
    pub question: String,
    pub sql: String,
    /// Truncated to the requested display size
    pub result: QueryResult,
    pub total_rows: usize,
    pub history_warning: Option<String>,
}

/// Question in, SQL and rows out. Translation always finishes before
/// execution starts and nothing is logged unless execution succeeds.
pub struct QueryPipeline {
    prompt: Arc<PromptLoader>,
    llm: Arc<LlmManager>,
    executor: QueryExecutor,
    history: Arc<HistoryLog>,
}

impl QueryPipeline {
    pub fn new(
        prompt: Arc<PromptLoader>,
        llm: Arc<LlmManager>,
        executor: QueryExecutor,
        history: Arc<HistoryLog>,
    ) -> Self {
        Self {
            prompt,
            llm,
            executor,
            history,
        }
    }

    pub fn executor(&self) -> QueryExecutor {
        self.executor
    }

    pub fn history(&self) -> &Arc<HistoryLog> {
        &self.history
    }

    pub async fn ask(
        &self,
        session: &mut SessionContext,
        question: &str,
        max_rows: usize,
    ) -> Result<AskOutcome, AskError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AskError::EmptyQuestion);
        }

        info!("Session {} asked: {}", session.id, question);

        let instruction = self.prompt.load().await.map_err(|e| {
            error!("Failed to load instruction prompt: {}", e);
            AskError::PromptUnavailable(e)
        })?;

        let sql = self.llm.translate(question, &instruction).await.map_err(|e| {
            error!("Translation failed: {}", e);
            AskError::Translation(e)
        })?;
        info!("Generated SQL: {}", sql);

        let executor = self.executor;
        let database = session.database.clone();
        let sql_to_execute = sql.clone();
        let executed = tokio::task::spawn_blocking(move || executor.execute(&sql_to_execute, &database))
            .await
            .unwrap_or_else(|join_err| Err(ExecutionError::TaskFailed(join_err.to_string())));

        let result = match executed {
            Ok(result) => result,
            Err(error) => {
                warn!("SQL execution failed: {}", error);
                return Err(AskError::Execution { sql, error });
            }
        };

        let total_rows = result.row_count();
        let shown = result.head(max_rows);
        let status = if result.is_empty() {
            AskStatus::Empty
        } else {
            AskStatus::Rows
        };
        debug!("Showing {} of {} rows", shown.row_count(), total_rows);

        session.log.append(question, &sql, shown.clone());
        session.last_result = Some(shown.clone());

        let history_warning = self.record_history(question, &sql).await.err().map(|e| {
            warn!("Failed to record history: {}", e);
            e.to_string()
        });

        Ok(AskOutcome {
            status,
            question: question.to_string(),
            sql,
            result: shown,
            total_rows,
            history_warning,
        })
    }

    async fn record_history(&self, question: &str, sql: &str) -> Result<(), HistoryError> {
        let history = Arc::clone(&self.history);
        let question = question.to_string();
        let sql = sql.to_string();

        tokio::task::spawn_blocking(move || history.record(&question, &sql))
            .await
            .map_err(|e| HistoryError::IoError(std::io::Error::other(e.to_string())))??;
        Ok(())
    }
}
