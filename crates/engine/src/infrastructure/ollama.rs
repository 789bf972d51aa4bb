//! Ollama narrator client (OpenAI-compatible API).
//!
//! Renders the assembled turn context into a chat request, asks the
//! model for a JSON outcome, and parses its reply into the closed
//! `NarrativeOutcome` union. Malformed or non-JSON output is an
//! `InvalidResponse` - the caller treats that as an invocation failure
//! and rolls the turn back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use turnwright_domain::NarrativeOutcome;

use crate::infrastructure::ports::{DmContext, NarrativeError, NarrativePort};

/// Default Ollama base URL.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Default model for Ollama.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

const SYSTEM_PROMPT: &str = "You are the dungeon master for a tabletop RPG session. \
Respond with a single JSON object: {\"narrative\": string, \"effects\": [...], \"events\": [string]}. \
Each effect is one of entity_damage, entity_heal, condition_add, condition_remove, position_change. \
Narrate the outcome of the players' turn; do not invent effect types.";

/// Client for Ollama's OpenAI-compatible chat endpoint.
#[derive(Clone)]
pub struct OllamaNarrator {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaNarrator {
    pub fn new(base_url: &str, model: &str) -> Self {
        // Narrator calls can be slow; give them a generous timeout
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create client with custom timeout (for testing).
    pub fn with_timeout(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create client from `OLLAMA_BASE_URL` / `OLLAMA_MODEL` env vars.
    pub fn from_env() -> Self {
        let base_url = std::env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_OLLAMA_BASE_URL.to_string());
        let model =
            std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string());
        Self::new(&base_url, &model)
    }
}

impl Default for OllamaNarrator {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_BASE_URL, DEFAULT_OLLAMA_MODEL)
    }
}

#[async_trait]
impl NarrativePort for OllamaNarrator {
    async fn resolve_turn(&self, context: DmContext) -> Result<NarrativeOutcome, NarrativeError> {
        let api_request = OpenAIChatRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: render_context(&context),
                },
            ],
            temperature: Some(0.8),
            response_format: Some(ResponseFormat {
                r#type: "json_object".to_string(),
            }),
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NarrativeError::Timeout
                } else {
                    NarrativeError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .map_err(|e| NarrativeError::RequestFailed(e.to_string()))?;
            return Err(NarrativeError::RequestFailed(error_text));
        }

        let api_response: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| NarrativeError::InvalidResponse(e.to_string()))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                NarrativeError::InvalidResponse("No choices in narrator response".to_string())
            })?
            .message
            .content
            .unwrap_or_default();

        parse_outcome(&content)
    }
}

/// Parse raw model text into the closed outcome union.
///
/// Unknown effect tags fail serde's unknown-variant check here, which is
/// the boundary guard the resolution pipeline relies on.
pub fn parse_outcome(raw: &str) -> Result<NarrativeOutcome, NarrativeError> {
    serde_json::from_str(raw.trim())
        .map_err(|e| NarrativeError::InvalidResponse(format!("Malformed narrator output: {}", e)))
}

fn render_context(context: &DmContext) -> String {
    let mut sections = Vec::new();
    sections.push(format!("Scene: {}", context.scene_name));
    sections.push(format!("Turn prompt: {}", context.prompt));

    if !context.actions.is_empty() {
        sections.push(format!("Player actions:\n{}", context.actions.join("\n")));
    }
    if !context.rolls.is_empty() {
        sections.push(format!("Dice results:\n{}", context.rolls.join("\n")));
    }
    if !context.entities.is_empty() {
        sections.push(format!("Entities:\n{}", context.entities.join("\n")));
    }
    if !context.sheets.is_empty() {
        sections.push(format!("Characters:\n{}", context.sheets.join("\n")));
    }

    sections.join("\n\n")
}

// =============================================================================
// Wire DTOs
// =============================================================================

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}
