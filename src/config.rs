use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::db::executor::ExecutionMode;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Database used by sessions that have not uploaded their own file
    pub default_path: String,
    pub execution_mode: ExecutionMode,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub upload_limit_mb: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "gemini", "openai", or "ollama"
    pub model: String,   // Model name
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub api_url: Option<String>,
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Explicit key wins, otherwise the environment variable named by `api_key_env`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    pub default_max_rows: usize,
    pub max_records: Option<usize>,
    /// Sessions not used for this long are dropped with their uploads; 0 keeps them forever
    pub idle_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub prompt: PromptConfig,
    pub history: HistoryConfig,
    pub session: SessionConfig,
    pub data_dir: String,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory for uploaded databases
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Instruction prompt file
    #[arg(long, value_name = "FILE")]
    pub prompt: Option<String>,

    /// Default SQLite database for new sessions
    #[arg(long, value_name = "FILE")]
    pub database: Option<String>,

    /// Log output format: "pretty" or "json"
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        // Start with default configuration
        let mut config_builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/sqlask/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // SQLASK__LLM__MODEL=... style overrides
        config_builder = config_builder.add_source(
            Environment::with_prefix("SQLASK")
                .prefix_separator("__")
                .separator("__"),
        );

        // Build the config
        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(data_dir) = &args.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(prompt) = &args.prompt {
            config.prompt.path = prompt.clone();
        }
        if let Some(database) = &args.database {
            config.database.default_path = database.clone();
        }

        Ok(config)
    }
}

// Default implementation
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                default_path: "sample_movies.db".to_string(),
                execution_mode: ExecutionMode::Unrestricted,
            },
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                upload_limit_mb: 200,
            },
            llm: LlmConfig {
                backend: "gemini".to_string(),
                model: "gemini-1.5-flash".to_string(),
                api_key: None,
                api_key_env: "GOOGLE_API_KEY".to_string(),
                api_url: None,
                timeout_secs: 60,
            },
            prompt: PromptConfig {
                path: "moviesdb_prompt.txt".to_string(),
            },
            history: HistoryConfig {
                path: "history.csv".to_string(),
            },
            session: SessionConfig {
                default_max_rows: 20,
                max_records: None,
                idle_timeout_secs: 1800,
                cleanup_interval_secs: 60,
            },
            data_dir: "data".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
execution_mode = "read_only"

[llm]
backend = "ollama"
model = "sqlcoder"

[session]
default_max_rows = 50
max_records = 10
"#
        )
        .unwrap();

        let args = CliArgs {
            config: Some(file.path().to_path_buf()),
            port: Some(8080),
            ..Default::default()
        };
        let config = AppConfig::new(&args).unwrap();

        assert_eq!(config.database.execution_mode, ExecutionMode::ReadOnly);
        assert_eq!(config.database.default_path, "sample_movies.db");
        assert_eq!(config.llm.backend, "ollama");
        assert_eq!(config.llm.api_key_env, "GOOGLE_API_KEY");
        assert_eq!(config.session.default_max_rows, 50);
        assert_eq!(config.session.max_records, Some(10));
        assert_eq!(config.session.idle_timeout_secs, 1800);
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.web.host, "127.0.0.1");
    }

    #[test]
    fn explicit_api_key_wins_over_environment() {
        let mut llm = AppConfig::default().llm;
        llm.api_key = Some("from-config".to_string());
        llm.api_key_env = "SQLASK_TEST_UNSET_KEY_VARIABLE".to_string();
        assert_eq!(llm.resolve_api_key().as_deref(), Some("from-config"));

        llm.api_key = Some("   ".to_string());
        assert_eq!(llm.resolve_api_key(), None);
    }
}
