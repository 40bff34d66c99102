use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::llm::providers::azure::GROUNDING_INDEX;
use crate::pipeline::{InteractionOutcome, Outcome};
use crate::web::state::AppState;

#[derive(Debug, Deserialize, Clone)]
pub struct NlQueryRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub debug: bool,
    pub deployment: String,
    pub configured_search_index: Option<String>,
    pub grounding_search_index: String,
}

fn status_for(outcome: &Outcome) -> StatusCode {
    match outcome {
        Outcome::Rows { .. } | Outcome::Empty { .. } => StatusCode::OK,
        Outcome::Invalid { .. } => StatusCode::BAD_REQUEST,
        Outcome::GenerationFailed { .. } | Outcome::ExecutionFailed { .. } => StatusCode::BAD_GATEWAY,
    }
}

// Natural language query: one full interaction, returned as JSON
pub async fn nl_query(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<NlQueryRequest>,
) -> (StatusCode, Json<InteractionOutcome>) {
    debug!("NL-query: {}", payload.question);

    let outcome = app_state.run_interaction(&payload.question).await;
    let status = status_for(&outcome.outcome);
    if let Some(sql) = outcome.outcome.sql() {
        debug!("NL-query SQL: {}", sql);
    }
    info!("NL-query finished with status {}: {}", status, outcome.outcome.message());

    (status, Json(outcome))
}

pub async fn system_status(State(app_state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let uptime = chrono::Utc::now() - app_state.startup_time;

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds(),
        debug: app_state.config.debug,
        deployment: app_state.config.llm.deployment.clone(),
        configured_search_index: app_state.config.search.index_name.clone(),
        grounding_search_index: GROUNDING_INDEX.to_string(),
    })
}
