use crate::config::AppConfig;
use crate::db::QueryExecutor;
use crate::llm::LlmManager;
use crate::pipeline::{self, InteractionOutcome};
use crate::web::templates::init_templates;
use minijinja::Environment;
use std::sync::Arc;

/// Shared application state for the web server. Read-only after startup.
pub struct AppState {
    pub config: AppConfig,
    pub llm_manager: LlmManager,
    pub executor: Arc<dyn QueryExecutor>,
    pub template_env: Environment<'static>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        llm_manager: LlmManager,
        executor: Arc<dyn QueryExecutor>,
    ) -> Result<Self, minijinja::Error> {
        Ok(Self {
            config,
            llm_manager,
            executor,
            template_env: init_templates()?,
            startup_time: chrono::Utc::now(),
        })
    }

    pub async fn run_interaction(&self, question: &str) -> InteractionOutcome {
        pipeline::run_interaction(
            &self.llm_manager,
            self.executor.as_ref(),
            question,
            self.config.debug,
        )
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, LlmConfig, SearchConfig, WebConfig};
    use crate::pipeline::tests::Harness;

    pub(crate) fn test_config(debug: bool) -> AppConfig {
        AppConfig {
            database: DatabaseConfig {
                host: "localhost".to_string(),
                name: "sales".to_string(),
                user: "reader".to_string(),
                password: "secret".to_string(),
                trust_server_certificate: true,
            },
            llm: LlmConfig {
                endpoint: "https://example.openai.azure.com".to_string(),
                deployment: "gpt-4o".to_string(),
                api_key: "oai-key".to_string(),
                api_version: crate::config::DEFAULT_API_VERSION.to_string(),
            },
            search: SearchConfig {
                endpoint: "https://example.search.windows.net".to_string(),
                api_key: "search-key".to_string(),
                index_name: Some("patterns".to_string()),
            },
            web: WebConfig::default(),
            debug,
        }
    }

    pub(crate) fn test_state(h: Harness, debug: bool) -> Arc<AppState> {
        Arc::new(AppState::new(test_config(debug), h.llm, Arc::new(h.executor)).unwrap())
    }
}
