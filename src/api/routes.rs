//! REST handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, info};

use super::AppState;
use crate::catalog::{WorkType, WorkTypeCategory};
use crate::error::PipelineError;
use crate::intake::{IntakeTicket, process_intake};
use crate::pipeline::{AnswerSet, QuestionSet};

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ClassifyWithAnswersRequest {
    pub text: String,
    pub questions: QuestionSet,
    pub answers: AnswerSet,
}

/// Optional filters for `/api/v1/work-types`. `q` is a comma-separated keyword list.
#[derive(Debug, Default, Deserialize)]
pub struct WorkTypeFilter {
    pub category: Option<WorkTypeCategory>,
    pub q: Option<String>,
}

/// Stage descriptions served by `/api/v1/agents`.
const AGENTS: [(&str, &str, &str); 5] = [
    (
        "normalizer",
        "normalize",
        "Expands abbreviations and fixes typos; keeps the original text on failure",
    ),
    (
        "fast_classifier",
        "ml_classification",
        "Local embedding classifier; stops the run at or above the confidence threshold",
    ),
    (
        "deep_classifier",
        "deep_analysis",
        "Catalog-grounded LLM classification; the \"no class\" answer always escalates",
    ),
    (
        "question_generator",
        "question_generation",
        "Asks 3 to 5 clarifying questions when neither classifier is confident",
    ),
    (
        "final_classifier",
        "completed",
        "Classifies the ticket using the answers; no threshold applies",
    ),
];

pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "ticket-triage",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "classify": "POST /api/v1/classify",
            "classify_with_answers": "POST /api/v1/classify-with-answers",
            "work_types": "GET /api/v1/work-types?category=&q=",
            "work_type": "GET /api/v1/work-types/{id}",
            "agents": "GET /api/v1/agents",
            "intake_webhook": "POST /api/v1/webhook/intake",
            "health": "GET /api/v1/health",
            "updates": "GET /ws/updates"
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "ticket-triage",
        "local_models_loaded": state.orchestrator.fast_ready(),
        "work_types": state.orchestrator.catalog().len(),
        "ws_subscribers": state.orchestrator.events().subscriber_count(),
    }))
}

pub async fn work_types(
    State(state): State<AppState>,
    Query(filter): Query<WorkTypeFilter>,
) -> impl IntoResponse {
    let catalog = state.orchestrator.catalog();

    let mut matches: Vec<&WorkType> = match filter.category {
        Some(category) => catalog.by_category(category),
        None => catalog.all().iter().collect(),
    };

    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let terms: Vec<&str> = q.split(',').collect();
        let hits = catalog.search_by_keywords(&terms);
        matches.retain(|wt| hits.iter().any(|hit| hit.id == wt.id));
    }

    Json(matches.into_iter().cloned().collect::<Vec<_>>())
}

pub async fn work_type(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.orchestrator.catalog().get(&id) {
        Some(work_type) => (StatusCode::OK, Json(serde_json::json!(work_type))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("Unknown work type: {id}") })),
        ),
    }
}

pub async fn agents() -> impl IntoResponse {
    let agents: Vec<_> = AGENTS
        .iter()
        .map(|(name, stage, description)| {
            serde_json::json!({
                "name": name,
                "stage": stage,
                "description": description,
            })
        })
        .collect();
    Json(agents)
}

pub async fn classify(
    State(state): State<AppState>,
    Json(body): Json<ClassifyRequest>,
) -> impl IntoResponse {
    match state.orchestrator.classify(&body.text).await {
        Ok(result) => {
            info!(stage = %result.stage(), "Classify request served");
            (StatusCode::OK, Json(serde_json::json!(result.to_response())))
        }
        Err(e) => error_response(e),
    }
}

pub async fn classify_with_answers(
    State(state): State<AppState>,
    Json(body): Json<ClassifyWithAnswersRequest>,
) -> impl IntoResponse {
    match state
        .orchestrator
        .resolve(&body.text, &body.questions, &body.answers)
        .await
    {
        Ok(result) => {
            info!(stage = %result.stage(), "Classify-with-answers request served");
            (StatusCode::OK, Json(serde_json::json!(result.to_response())))
        }
        Err(e) => error_response(e),
    }
}

/// Accept a pushed ticket and classify it in the background.
pub async fn intake_webhook(
    State(state): State<AppState>,
    Json(ticket): Json<IntakeTicket>,
) -> impl IntoResponse {
    if ticket.ticket_text().is_empty() {
        return error_response(PipelineError::EmptyTicket);
    }

    info!(ticket_id = %ticket.ticket_id, callback = ticket.callback_url.is_some(), "Intake ticket accepted");
    let ticket_id = ticket.ticket_id.clone();
    tokio::spawn(process_intake(
        state.orchestrator.clone(),
        state.results.clone(),
        ticket,
    ));

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "accepted",
            "ticket_id": ticket_id,
        })),
    )
}

fn error_response(e: PipelineError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &e {
        PipelineError::EmptyTicket => StatusCode::BAD_REQUEST,
        PipelineError::AnswerCountMismatch { .. } | PipelineError::InvalidQuestionSet { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        PipelineError::Internal(_) => {
            error!(error = %e, "Pipeline fault");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(serde_json::json!({ "error": e.to_string() })))
}
