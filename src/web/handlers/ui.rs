use axum::{
    extract::State,
    response::{Html, IntoResponse},
    Form,
};
use minijinja::context;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::pipeline::InteractionOutcome;
use crate::web::state::AppState;
use crate::web::templates::{render_template, INDEX_TEMPLATE};

#[derive(Debug, Deserialize)]
pub struct RunForm {
    #[serde(default)]
    pub question: String,
}

// Main UI entry point
pub async fn index_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    render_page(&state, "", None)
}

pub async fn run_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<RunForm>,
) -> impl IntoResponse {
    info!("Run requested from form");
    let outcome = state.run_interaction(&form.question).await;
    if outcome.outcome.is_failure() {
        warn!("Interaction failed: {}", outcome.outcome.message());
    }
    render_page(&state, &form.question, Some(&outcome))
}

fn render_page(state: &AppState, question: &str, outcome: Option<&InteractionOutcome>) -> Html<String> {
    Html(render_template(
        &state.template_env,
        INDEX_TEMPLATE,
        context! { question => question, outcome => outcome },
    ))
}
