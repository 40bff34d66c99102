pub mod models;
pub mod providers;

use crate::config::{LlmConfig, SearchConfig};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
    #[error("LLM returned an empty completion")]
    EmptyCompletion,
}

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate_sql(&self, question: &str) -> Result<String, LlmError>;
}

pub struct LlmManager {
    generator: Box<dyn SqlGenerator + Send + Sync>,
}

impl LlmManager {
    pub fn new(llm: &LlmConfig, search: &SearchConfig) -> Result<Self, LlmError> {
        let provider = providers::azure::AzureOpenAiProvider::new(llm, search)?;
        Ok(Self::with_generator(Box::new(provider)))
    }

    pub fn with_generator(generator: Box<dyn SqlGenerator + Send + Sync>) -> Self {
        Self { generator }
    }

    pub async fn generate_sql(&self, question: &str) -> Result<String, LlmError> {
        self.generator.generate_sql(question).await
    }
}

// Opening fence with a tag on its own line, a known SQL tag glued to the
// query, or any bare fence.
static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)```[a-z0-9_+\-]*[ \t]*\r?\n|```(?:t?sql|mssql)|```")
        .expect("code fence pattern is valid")
});

/// Removes Markdown code-fence delimiters from a model reply and trims it.
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fence_with_language_tag() {
        let reply = "```sql\nSELECT MONTH(OrderDate) AS m, SUM(Total) FROM Sales GROUP BY MONTH(OrderDate)\n```";
        assert_eq!(
            strip_code_fences(reply),
            "SELECT MONTH(OrderDate) AS m, SUM(Total) FROM Sales GROUP BY MONTH(OrderDate)"
        );
    }

    #[test]
    fn strips_fence_without_language_tag() {
        assert_eq!(strip_code_fences("```\nSELECT 1\n```\n"), "SELECT 1");
    }

    #[test]
    fn strips_upper_case_and_other_tags() {
        assert_eq!(strip_code_fences("```SQL\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fences("```tsql\r\nSELECT 1\r\n```"), "SELECT 1");
    }

    #[test]
    fn strips_inline_fences() {
        assert_eq!(strip_code_fences("```SELECT TOP 5 * FROM Trips```"), "SELECT TOP 5 * FROM Trips");
        assert_eq!(strip_code_fences("```sql SELECT 1```"), "SELECT 1");
        assert_eq!(strip_code_fences("```sqlSELECT 1```"), "SELECT 1");
    }

    #[test]
    fn unfenced_reply_is_only_trimmed() {
        assert_eq!(strip_code_fences("  SELECT name FROM sys.tables \n"), "SELECT name FROM sys.tables");
    }

    #[test]
    fn keeps_multi_line_query_body() {
        let reply = "```sql\nSELECT a,\n       b\nFROM t\nWHERE a > 1;\n```";
        assert_eq!(strip_code_fences(reply), "SELECT a,\n       b\nFROM t\nWHERE a > 1;");
    }
}
