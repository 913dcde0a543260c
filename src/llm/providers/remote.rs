use crate::config::LlmConfig;
use crate::llm::{LlmError, SqlGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible chat completions endpoint.
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct PromptRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct PromptResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl RemoteLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let api_key = config.resolve_api_key().ok_or_else(|| {
            LlmError::ConfigError(format!(
                "API key is required for remote LLM provider (set llm.api_key or {})",
                config.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model: config.model.clone(),
        })
    }

    fn build_request(&self, question: &str, instruction: &str) -> PromptRequest {
        PromptRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: instruction.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: question.to_string(),
                },
            ],
            temperature: 0.1,
            max_tokens: 2000,
        }
    }
}

fn first_choice_text(response: PromptResponse) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| LlmError::ResponseError("No choices in response".to_string()))
}

#[async_trait]
impl SqlGenerator for RemoteLlmProvider {
    async fn generate_sql(&self, question: &str, instruction: &str) -> Result<String, LlmError> {
        let request = self.build_request(question, instruction);

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Remote API responded with status code: {}", status);
            return Err(LlmError::from_status("Remote", status, &body));
        }

        let prompt_response: PromptResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))?;

        let content = first_choice_text(prompt_response)?;
        debug!("Remote completion: {}", content);
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> RemoteLlmProvider {
        let mut config = crate::config::AppConfig::default().llm;
        config.backend = "openai".to_string();
        config.model = "gpt-4o-mini".to_string();
        config.api_key = Some("sk-test".to_string());
        RemoteLlmProvider::new(&config).unwrap()
    }

    #[test]
    fn instruction_goes_in_the_system_message() {
        let request = serde_json::to_value(provider().build_request("q?", "rules")).unwrap();

        assert_eq!(request["model"], "gpt-4o-mini");
        assert_eq!(request["messages"][0]["role"], "system");
        assert_eq!(request["messages"][0]["content"], "rules");
        assert_eq!(request["messages"][1]["role"], "user");
        assert_eq!(request["messages"][1]["content"], "q?");
    }

    #[test]
    fn first_choice_wins() {
        let response: PromptResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"SELECT 1;"}},{"message":{"content":"SELECT 2;"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_text(response).unwrap(), "SELECT 1;");

        let empty: PromptResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(first_choice_text(empty).is_err());
    }
}
