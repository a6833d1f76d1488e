//! `automation`: hand natural-language instructions to an NLA gateway.
//!
//! Flow: list exposed actions, pick one (the only one, or the LLM chooses by
//! description), execute it with the raw instructions, confirm with the
//! gateway's reported status.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::config::AutomationToolConfig;

use super::context::ToolContext;
use super::error::ToolError;

const CHOOSE_PROMPT: &str = "Pick the single action that best fulfils the instructions. \
Reply with the action id only.";

#[derive(Debug, Clone)]
pub struct AutomationTool {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExposedList {
    #[serde(default)]
    results: Vec<ExposedAction>,
}

#[derive(Debug, Clone, Deserialize)]
struct ExposedAction {
    id: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct ExecuteBody<'a> {
    instructions: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExecuteResult {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl AutomationTool {
    pub fn new(config: &AutomationToolConfig) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ToolError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub async fn invoke(&self, input: &str, ctx: &ToolContext) -> Result<String, ToolError> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(ToolError::Unavailable("automation gateway API key is not configured".into()));
        };
        let instructions = input.trim();
        if instructions.is_empty() {
            return Err(ToolError::InvalidInput("empty instructions".into()));
        }

        let actions = self.list_actions(key).await?;
        let action = match actions.as_slice() {
            [] => return Err(ToolError::NotFound("no exposed automation actions".into())),
            [only] => only.clone(),
            many => choose(many, instructions, ctx).await?,
        };
        debug!(action_id = %action.id, description = %action.description, "executing automation action");

        let url = format!("{}/exposed/{}/execute/", self.base_url, action.id);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", key)
            .json(&ExecuteBody { instructions })
            .send()
            .await
            .map_err(transport)?;
        let result: ExecuteResult = check(response).await?.json().await.map_err(|e| {
            warn!(error = %e, "automation execute reply unreadable");
            ToolError::Backend(format!("unreadable gateway reply: {e}"))
        })?;

        let status = result.status.unwrap_or_else(|| "unknown".to_string());
        if status == "error" {
            let message = result.error.unwrap_or_else(|| "gateway reported an error".into());
            return Err(ToolError::Backend(format!("{}: {message}", action.description)));
        }
        Ok(format!("Executed \"{}\" (status: {status}): {instructions}", action.description))
    }

    async fn list_actions(&self, key: &str) -> Result<Vec<ExposedAction>, ToolError> {
        let url = format!("{}/exposed/", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", key)
            .send()
            .await
            .map_err(transport)?;
        let list: ExposedList = check(response).await?.json().await.map_err(|e| {
            warn!(error = %e, "automation action list unreadable");
            ToolError::Backend(format!("unreadable gateway reply: {e}"))
        })?;
        Ok(list.results)
    }
}

async fn choose(
    actions: &[ExposedAction],
    instructions: &str,
    ctx: &ToolContext,
) -> Result<ExposedAction, ToolError> {
    let listing = actions
        .iter()
        .map(|a| format!("- {}: {}", a.id, a.description))
        .collect::<Vec<_>>()
        .join("\n");
    let reply = ctx
        .complete(CHOOSE_PROMPT, format!("Actions:\n{listing}\n\nInstructions: {instructions}"))
        .await?;
    let reply = reply.trim();
    actions
        .iter()
        .find(|a| reply == a.id)
        .or_else(|| actions.iter().find(|a| reply.contains(&a.id)))
        .cloned()
        .ok_or_else(|| ToolError::NotFound(format!("no exposed action matches: {reply}")))
}

fn transport(e: reqwest::Error) -> ToolError {
    warn!(error = %e, "automation gateway request failed");
    if e.is_timeout() {
        ToolError::Timeout("automation gateway timed out".into())
    } else {
        ToolError::Backend(format!("automation gateway unreachable: {e}"))
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, ToolError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(%status, %body, "automation gateway returned HTTP error");
    Err(ToolError::Backend(format!("automation gateway returned HTTP {status}")))
}
