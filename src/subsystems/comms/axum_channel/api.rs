//! Axum handlers for `/agent/*` and `/api/*` routes.
//!
//! Each handler receives [`AxumState`] via [`axum::extract::State`] and
//! returns an axum [`Response`].  Request bodies are typed per route and
//! reject unknown fields, so malformed input stops at the JSON extractor.
//! Every bus round-trip is bounded by a timeout.

use std::future::Future;
use std::time::Duration;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::core::error::AppError;
use crate::subsystems::comms::state::ToolOutcome;

use super::AxumState;

/// Upper bound for tool and agent round-trips (agent loops may chain
/// several LLM calls).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct SqlRequest {
    query: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct TerminalRequest {
    command: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct PromptRequest {
    prompt: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct GptRequest {
    prompt: String,
    temperature: Option<f32>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub(super) struct AgentRequest {
    prompt: String,
    temperature: Option<f32>,
    owner_id: Option<i64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct WriteRequest {
    input: WriteInput,
}

/// Either the raw tool input string or its two fields.
#[derive(Deserialize)]
#[serde(untagged)]
enum WriteInput {
    Raw(String),
    Fields(WriteFields),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct WriteFields {
    data: String,
    file_name: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub(super) struct ReadRequest {
    file_name: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct CodeQaRequest {
    prompt: String,
    path: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct PathRequest {
    path: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub(super) struct HistoryQuery {
    owner_id: Option<i64>,
    limit: Option<usize>,
    offset: Option<usize>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Build a JSON error response body.
fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

/// HTTP status for a tool failure code.
fn failure_status(code: &str) -> StatusCode {
    match code {
        "invalid_input" => StatusCode::BAD_REQUEST,
        "denied" => StatusCode::FORBIDDEN,
        "not_found" => StatusCode::NOT_FOUND,
        "backend" => StatusCode::BAD_GATEWAY,
        "timeout" => StatusCode::GATEWAY_TIMEOUT,
        "unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Render a tool outcome as the tool envelope.
fn tool_envelope(outcome: ToolOutcome) -> Response {
    let ToolOutcome { tool, result } = outcome;
    match result {
        Ok(output) => (StatusCode::OK, Json(json!({ "ok": true, "tool": tool, "output": output }))).into_response(),
        Err(failure) => (
            failure_status(&failure.code),
            Json(json!({
                "ok": false,
                "tool": tool,
                "error": failure.code,
                "message": failure.message,
                "recoverable": failure.recoverable,
            })),
        )
            .into_response(),
    }
}

/// Await `fut` under `limit`; bus failures become 502 and timeouts 504.
async fn bounded<T>(
    state: &AxumState,
    what: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T, AppError>>,
) -> Result<T, Response> {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!(channel_id = %state.channel_id, what, "request failed: {e}");
            Err((StatusCode::BAD_GATEWAY, json_error("internal", e)).into_response())
        }
        Err(_) => {
            warn!(channel_id = %state.channel_id, what, "request timed out");
            Err((StatusCode::GATEWAY_TIMEOUT, json_error("timeout", format!("{what} request timed out")))
                .into_response())
        }
    }
}

async fn run_tool(state: &AxumState, tool: &str, input: String) -> Response {
    let fut = state.comms.run_tool(&state.channel_id, tool, input);
    match bounded(state, tool, REQUEST_TIMEOUT, fut).await {
        Ok(outcome) => tool_envelope(outcome),
        Err(resp) => resp,
    }
}

async fn ask_agent(
    state: &AxumState,
    agent: &str,
    prompt: String,
    owner_id: Option<i64>,
    temperature: Option<f32>,
) -> Response {
    let fut = state.comms.ask_agent(agent, &state.channel_id, prompt, owner_id, temperature);
    match bounded(state, agent, REQUEST_TIMEOUT, fut).await {
        Ok(output) => (StatusCode::OK, Json(json!({ "output": output }))).into_response(),
        Err(resp) => resp,
    }
}

// ── Tool routes ───────────────────────────────────────────────────────────────

/// POST /agent/execute-sql
pub(super) async fn execute_sql(State(state): State<AxumState>, Json(req): Json<SqlRequest>) -> Response {
    run_tool(&state, "database", req.query).await
}

/// POST /agent/execute-terminal
pub(super) async fn execute_terminal(
    State(state): State<AxumState>,
    Json(req): Json<TerminalRequest>,
) -> Response {
    run_tool(&state, "terminal", req.command).await
}

/// POST /agent/zapier
pub(super) async fn zapier(State(state): State<AxumState>, Json(req): Json<PromptRequest>) -> Response {
    run_tool(&state, "automation", req.prompt).await
}

/// POST /agent/write
pub(super) async fn write(State(state): State<AxumState>, Json(req): Json<WriteRequest>) -> Response {
    let input = match req.input {
        WriteInput::Raw(raw) => raw,
        WriteInput::Fields(WriteFields { data, file_name }) => {
            json!({ "data": data, "fileName": file_name }).to_string()
        }
    };
    run_tool(&state, "write_file", input).await
}

/// POST /agent/read
pub(super) async fn read(State(state): State<AxumState>, Json(req): Json<ReadRequest>) -> Response {
    run_tool(&state, "read_file", json!({ "fileName": req.file_name }).to_string()).await
}

/// POST /agent/qa-over-code
pub(super) async fn qa_over_code(State(state): State<AxumState>, Json(req): Json<CodeQaRequest>) -> Response {
    run_tool(&state, "code_qa", json!({ "prompt": req.prompt, "path": req.path }).to_string()).await
}

/// POST /agent/index/invalidate: 204 whether or not an index was cached.
pub(super) async fn invalidate_index(State(state): State<AxumState>, Json(req): Json<PathRequest>) -> Response {
    let fut = state.comms.invalidate_index(req.path);
    match bounded(&state, "index invalidate", REQUEST_TIMEOUT, fut).await {
        Ok(ToolOutcome { result: Ok(_), .. }) => StatusCode::NO_CONTENT.into_response(),
        Ok(outcome) => tool_envelope(outcome),
        Err(resp) => resp,
    }
}

// ── Agent routes ──────────────────────────────────────────────────────────────

/// POST /agent/gpt
pub(super) async fn gpt(State(state): State<AxumState>, Json(req): Json<GptRequest>) -> Response {
    ask_agent(&state, "gpt", req.prompt, None, req.temperature).await
}

/// POST /agent/conversation
pub(super) async fn conversation(State(state): State<AxumState>, Json(req): Json<AgentRequest>) -> Response {
    ask_agent(&state, "conversation", req.prompt, req.owner_id, req.temperature).await
}

/// POST /agent/chat
pub(super) async fn chat(State(state): State<AxumState>, Json(req): Json<AgentRequest>) -> Response {
    ask_agent(&state, "chat", req.prompt, req.owner_id, req.temperature).await
}

/// GET /agent/chat/history
pub(super) async fn chat_history(State(state): State<AxumState>, Query(q): Query<HistoryQuery>) -> Response {
    let fut = state.comms.chat_history(q.owner_id, q.limit, q.offset);
    match bounded(&state, "chat history", REQUEST_TIMEOUT, fut).await {
        Ok(turns) => (StatusCode::OK, Json(json!({ "turns": turns }))).into_response(),
        Err(resp) => resp,
    }
}

/// GET /agent/langchain
pub(super) async fn langchain() -> &'static str {
    "langchain"
}

// ── Health ────────────────────────────────────────────────────────────────────

/// GET /api/health
pub(super) async fn health(State(state): State<AxumState>) -> Response {
    match bounded(&state, "health", HEALTH_TIMEOUT, state.comms.health()).await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "uptime_ms": snapshot.uptime_ms,
                "subsystems": snapshot.subsystems,
            })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}
