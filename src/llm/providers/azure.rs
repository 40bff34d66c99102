use crate::config::{LlmConfig, SearchConfig};
use crate::llm::models::{
    ApiErrorResponse, AzureSearchParameters, ChatCompletionRequest, ChatCompletionResponse,
    ChatMessage, DataSource, SearchAuthentication,
};
use crate::llm::{strip_code_fences, LlmError, SqlGenerator};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Index the retrieval block always names, regardless of `AZURE_SEARCH_INDEX`.
pub const GROUNDING_INDEX: &str = "serene-diamond-r8pp11ww7f";

const SYSTEM_PROMPT: &str = "You are an AI assistant specialized in transforming natural language into SQL Server queries. \
Return only the SQL query without explanations or comments. \
The dataset includes embedding vectors representing predefined query patterns. \
Use these embeddings to adapt the generated SQL queries, aligning them with patterns found \
in the embedding dataset attached to the query. \
Do not use MySQL/PostgreSQL-specific syntax like LIMIT.";

const MAX_TOKENS: u32 = 800;
const TEMPERATURE: f64 = 0.67;
const TOP_P: f64 = 0.95;
const SEMANTIC_CONFIGURATION: &str = "azureml-default";
const STRICTNESS: u8 = 3;
const TOP_N_DOCUMENTS: u32 = 5;

pub struct AzureOpenAiProvider {
    client: reqwest::Client,
    completions_url: String,
    api_key: String,
    deployment: String,
    search_endpoint: String,
    search_key: String,
}

impl AzureOpenAiProvider {
    pub fn new(llm: &LlmConfig, search: &SearchConfig) -> Result<Self, LlmError> {
        let endpoint = llm.endpoint.trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(LlmError::ConfigError("Azure OpenAI endpoint is empty".to_string()));
        }

        // No timeout beyond the client defaults
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if let Some(configured) = &search.index_name {
            if configured != GROUNDING_INDEX {
                warn!(
                    "AZURE_SEARCH_INDEX is '{}' but requests are grounded on '{}'",
                    configured, GROUNDING_INDEX
                );
            }
        }

        Ok(Self {
            client,
            completions_url: format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint, llm.deployment, llm.api_version
            ),
            api_key: llm.api_key.clone(),
            deployment: llm.deployment.clone(),
            search_endpoint: search.endpoint.clone(),
            search_key: search.api_key.clone(),
        })
    }

    pub fn build_request(&self, question: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.deployment.clone(),
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(question)],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            top_p: TOP_P,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            stream: false,
            data_sources: vec![DataSource::AzureSearch {
                parameters: AzureSearchParameters {
                    endpoint: self.search_endpoint.clone(),
                    index_name: GROUNDING_INDEX.to_string(),
                    authentication: SearchAuthentication::ApiKey {
                        key: self.search_key.clone(),
                    },
                    semantic_configuration: SEMANTIC_CONFIGURATION.to_string(),
                    query_type: "simple".to_string(),
                    filter: None,
                    in_scope: true,
                    strictness: STRICTNESS,
                    top_n_documents: TOP_N_DOCUMENTS,
                },
            }],
        }
    }
}

/// Pulls the first completion's text out of a response and strips code fences.
pub fn extract_sql(response: ChatCompletionResponse) -> Result<String, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::ResponseError("No choices in response".to_string()))?;

    let content = choice.message.content.ok_or(LlmError::EmptyCompletion)?;
    let sql = strip_code_fences(&content);
    if sql.is_empty() {
        return Err(LlmError::EmptyCompletion);
    }

    Ok(sql)
}

#[async_trait]
impl SqlGenerator for AzureOpenAiProvider {
    async fn generate_sql(&self, question: &str) -> Result<String, LlmError> {
        let request = self.build_request(question);
        debug!("Requesting completion from deployment '{}'", self.deployment);

        let response = self
            .client
            .post(&self.completions_url)
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| match e.error.code {
                    Some(code) => format!("{} ({})", e.error.message, code),
                    None => e.error.message,
                })
                .unwrap_or(body);
            return Err(LlmError::ResponseError(format!(
                "API responded with status code {}: {}",
                status, detail
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))?;

        let sql = extract_sql(completion)?;
        info!("Generated SQL ({} chars)", sql.len());
        debug!("Generated SQL: {}", sql);
        Ok(sql)
    }
}
