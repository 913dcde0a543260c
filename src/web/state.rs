use crate::config::AppConfig;
use crate::db::executor::QueryExecutor;
use crate::history::HistoryLog;
use crate::llm::LlmManager;
use crate::pipeline::QueryPipeline;
use crate::prompt::PromptLoader;
use crate::session::SessionStore;
use crate::web::templates::init_templates;
use minijinja::Environment;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub template_env: Environment<'static>,
    pub pipeline: QueryPipeline,
    pub sessions: SessionStore,
    pub prompt: Arc<PromptLoader>,
    pub data_dir: PathBuf,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, llm_manager: LlmManager) -> Self {
        let prompt = Arc::new(PromptLoader::new(&config.prompt.path));
        let history = Arc::new(HistoryLog::new(&config.history.path));
        let executor = QueryExecutor::new(config.database.execution_mode);

        info!(
            "Executing generated SQL in {} mode, history at {}",
            executor.mode(),
            history.path().display()
        );

        let pipeline = QueryPipeline::new(
            Arc::clone(&prompt),
            Arc::new(llm_manager),
            executor,
            history,
        );

        let sessions = SessionStore::new(
            &config.database.default_path,
            config.session.max_records,
        );

        Self {
            data_dir: PathBuf::from(&config.data_dir),
            config,
            template_env: init_templates(),
            pipeline,
            sessions,
            prompt,
            startup_time: chrono::Utc::now(),
        }
    }

    /// Where a session's uploaded database lives
    pub fn upload_path(&self, session_id: &str) -> PathBuf {
        self.data_dir.join("uploads").join(format!("{}.sqlite", session_id))
    }
}
