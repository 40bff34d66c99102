//! One operator interaction: validate, generate, execute, and report
//! exactly one outcome.
//!
//! Generated SQL runs unvalidated and with whatever rights the configured
//! database login has. Nothing here inspects or rewrites it.

use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::db::{QueryExecutor, ResultSet};
use crate::llm::LlmManager;

pub const VALIDATION_MESSAGE: &str = "Please enter a question first.";
pub const EMPTY_RESULT_MESSAGE: &str = "Query returned no rows.";

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Invalid {
        message: String,
    },
    GenerationFailed {
        message: String,
    },
    ExecutionFailed {
        sql: String,
        message: String,
    },
    Empty {
        sql: String,
        message: String,
    },
    Rows {
        sql: String,
        message: String,
        result: ResultSet,
    },
}

impl Outcome {
    pub fn sql(&self) -> Option<&str> {
        match self {
            Outcome::Invalid { .. } | Outcome::GenerationFailed { .. } => None,
            Outcome::ExecutionFailed { sql, .. }
            | Outcome::Empty { sql, .. }
            | Outcome::Rows { sql, .. } => Some(sql),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Outcome::Invalid { message }
            | Outcome::GenerationFailed { message }
            | Outcome::ExecutionFailed { message, .. }
            | Outcome::Empty { message, .. }
            | Outcome::Rows { message, .. } => message,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Outcome::Invalid { .. } | Outcome::GenerationFailed { .. } | Outcome::ExecutionFailed { .. }
        )
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct InteractionOutcome {
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub debug: Vec<String>,
}

// Collects `[DEBUG]` lines for the page when debugging is switched on
struct DebugTrace {
    enabled: bool,
    lines: Vec<String>,
}

impl DebugTrace {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            lines: Vec::new(),
        }
    }

    fn log(&mut self, msg: impl FnOnce() -> String) {
        if self.enabled {
            self.lines.push(format!("[DEBUG] {}", msg()));
        }
    }

    fn finish(self, outcome: Outcome) -> InteractionOutcome {
        InteractionOutcome {
            outcome,
            debug: self.lines,
        }
    }
}

/// Runs one interaction. Failures are folded into the returned outcome and
/// never escape; the executor is only reached once SQL has been generated.
pub async fn run_interaction(
    llm: &LlmManager,
    executor: &dyn QueryExecutor,
    question: &str,
    debug_enabled: bool,
) -> InteractionOutcome {
    let mut trace = DebugTrace::new(debug_enabled);

    if question.trim().is_empty() {
        debug!("Rejected blank question");
        trace.log(|| "question is blank, nothing sent".to_string());
        return trace.finish(Outcome::Invalid {
            message: VALIDATION_MESSAGE.to_string(),
        });
    }

    trace.log(|| format!("question has {} characters", question.chars().count()));

    let gen_start = Instant::now();
    let generated = llm
        .generate_sql(question)
        .instrument(info_span!("generate"))
        .await;
    let sql = match generated {
        Ok(sql) => sql,
        Err(e) => {
            error!("SQL generation failed: {}", e);
            trace.log(|| format!("generation failed after {}ms: {:?}", gen_start.elapsed().as_millis(), e));
            return trace.finish(Outcome::GenerationFailed {
                message: format!("LLM generation failed: {}", e),
            });
        }
    };
    trace.log(|| format!("generated in {}ms: {}", gen_start.elapsed().as_millis(), sql));

    let exec_start = Instant::now();
    let executed = executor
        .execute(&sql)
        .instrument(info_span!("execute"))
        .await;
    match executed {
        Ok(result) if result.is_empty() => {
            warn!("Query returned no rows");
            trace.log(|| {
                format!(
                    "executed in {}ms, 0 rows, {} columns",
                    exec_start.elapsed().as_millis(),
                    result.columns.len()
                )
            });
            trace.finish(Outcome::Empty {
                sql,
                message: EMPTY_RESULT_MESSAGE.to_string(),
            })
        }
        Ok(result) => {
            info!("Query returned {} rows", result.row_count());
            trace.log(|| {
                format!(
                    "executed in {}ms, {} rows, columns {:?}",
                    exec_start.elapsed().as_millis(),
                    result.row_count(),
                    result.columns
                )
            });
            trace.finish(Outcome::Rows {
                sql,
                message: format!("Returned {} rows", result.row_count()),
                result,
            })
        }
        Err(e) => {
            error!("SQL execution failed: {}", e);
            trace.log(|| format!("execution failed after {}ms: {:?}", exec_start.elapsed().as_millis(), e));
            trace.finish(Outcome::ExecutionFailed {
                sql,
                message: format!("SQL execution failed: {}", e),
            })
        }
    }
}
