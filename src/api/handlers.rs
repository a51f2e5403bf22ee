//! API handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::assistant::{Assistant, AssistantReply, EventOutcome, QueryRequest};
use crate::metrics::METRICS;
use crate::proactive::ProactiveEvent;
use crate::services::{AssistantStore, InstructionPriority, OngoingInstruction};

/// Application state for the assistant handlers
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<Assistant>,
    pub store: Arc<dyn AssistantStore>,
}

/// API error envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Query envelope with the user scope
#[derive(Debug, Deserialize)]
pub struct QueryEnvelope {
    pub user_id: String,
    #[serde(flatten)]
    pub request: QueryRequest,
}

/// Process a query
///
/// POST /api/v1/assistant/query
pub async fn handle_query(
    State(state): State<AppState>,
    Json(envelope): Json<QueryEnvelope>,
) -> Result<Json<AssistantReply>, (StatusCode, Json<ApiError>)> {
    if envelope.user_id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new("VALIDATION_ERROR", "user_id cannot be empty")),
        ));
    }
    if envelope.request.query.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new("VALIDATION_ERROR", "query cannot be empty")),
        ));
    }

    info!(user = %envelope.user_id, "query received");
    let reply = state
        .assistant
        .handle_query(&envelope.user_id, envelope.request)
        .await;
    Ok(Json(reply))
}

/// Process a normalized webhook event
///
/// POST /api/v1/events
pub async fn handle_event(
    State(state): State<AppState>,
    Json(event): Json<ProactiveEvent>,
) -> Result<Json<EventOutcome>, (StatusCode, Json<ApiError>)> {
    if event.user_id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new("VALIDATION_ERROR", "userId cannot be empty")),
        ));
    }
    if event.event.is_empty() || event.service.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                "VALIDATION_ERROR",
                "event and service are required",
            )),
        ));
    }

    info!(user = %event.user_id, event = %event.event, service = %event.service, "event received");
    let outcome = state.assistant.handle_event(event).await;
    Ok(Json(outcome))
}

/// Create an ongoing instruction directly (user action)
#[derive(Debug, Deserialize)]
pub struct CreateInstructionRequest {
    pub user_id: String,
    pub instruction: String,
    #[serde(default)]
    pub priority: InstructionPriority,
}

/// POST /api/v1/instructions
pub async fn create_instruction(
    State(state): State<AppState>,
    Json(request): Json<CreateInstructionRequest>,
) -> Result<Json<OngoingInstruction>, (StatusCode, Json<ApiError>)> {
    if request.instruction.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                "VALIDATION_ERROR",
                "instruction cannot be empty",
            )),
        ));
    }

    match state
        .store
        .create_instruction(&request.user_id, &request.instruction, request.priority)
        .await
    {
        Ok(instruction) => Ok(Json(instruction)),
        Err(e) => {
            error!(error = %e, "instruction creation failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new("INTERNAL_ERROR", e.to_string())),
            ))
        }
    }
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// GET /metrics
pub async fn metrics() -> String {
    METRICS.export_prometheus()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_envelope_deserializes_flat() {
        let envelope: QueryEnvelope = serde_json::from_str(
            r#"{"user_id": "u1", "query": "show all contacts"}"#,
        )
        .unwrap();
        assert_eq!(envelope.user_id, "u1");
        assert_eq!(envelope.request.query, "show all contacts");
        assert!(envelope.request.conversation_history.is_empty());
    }

    #[test]
    fn test_api_error_shape() {
        let error = ApiError::new("VALIDATION_ERROR", "query cannot be empty");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("VALIDATION_ERROR"));
    }
}
