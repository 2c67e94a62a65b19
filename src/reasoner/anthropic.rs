//! Anthropic Messages API reasoner
//!
//! Every catalog action becomes a tool whose input schema is built from the
//! action's parameter specs. A `done` tool carries the expected output schema.
//! `tool_choice` is `any`, so a well-formed reply holds exactly one tool call,
//! which maps one-to-one onto a [`Decision`].

use crate::actions::{ActionSpec, ParamSpec, ParamType};
use crate::error::{ConfigError, ReasonerError};
use crate::reasoner::{Decision, Reasoner, ReasonerRequest};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::time::Duration;

const API_VERSION: &str = "2023-06-01";

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Name of the tool that ends the run with a final answer
pub const DONE_TOOL: &str = "done";

const SYSTEM_PROMPT: &str = "You operate a web browser to complete a task. \
Each turn you see the current page and the steps taken so far, and you call exactly one tool. \
Call an action tool to act on the page. When the task is complete, call `done` with the \
final answer; it must contain exactly the fields its schema lists. \
Failed steps are shown with FAILED; try another approach instead of repeating them.";

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<RequestMessage>,
    tools: Vec<Tool>,
    tool_choice: ToolChoice,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: String,
    content: Vec<RequestBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum RequestBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
struct Tool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "any")]
    Any,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { name: String, input: Value },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    r#type: String,
    message: String,
}

/// Anthropic client configuration
#[derive(Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }

    /// Read `ANTHROPIC_API_KEY`, `ANTHROPIC_BASE_URL` and `ANTHROPIC_MODEL`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("ANTHROPIC_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing("ANTHROPIC_API_KEY".to_string()))?;

        let mut config = Self::new(api_key);
        if let Some(base_url) = lookup("ANTHROPIC_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("ANTHROPIC_MODEL") {
            config.model = model;
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn mask_api_key(key: &str) -> String {
    if key.chars().count() <= 12 {
        return "****".to_string();
    }
    let head: String = key.chars().take(4).collect();
    let mut tail: Vec<char> = key.chars().rev().take(4).collect();
    tail.reverse();
    format!("{}...{}", head, tail.into_iter().collect::<String>())
}

/// Keep auth and quota details out of error messages
fn sanitize_api_error(error: &str) -> String {
    let lower = error.to_lowercase();
    if lower.contains("api key") || lower.contains("x-api-key") || lower.contains("authentication") {
        return "authentication error, check ANTHROPIC_API_KEY".to_string();
    }
    if error.chars().count() > 300 {
        let cut: String = error.chars().take(300).collect();
        return format!("{}...(truncated)", cut);
    }
    error.to_string()
}

pub struct AnthropicReasoner {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicReasoner {
    pub fn new(config: AnthropicConfig) -> Result<Self, ReasonerError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ReasonerError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }

    fn build_request(&self, request: &ReasonerRequest<'_>) -> MessagesRequest {
        let mut content = vec![RequestBlock::Text {
            text: render_observation(request),
        }];
        if let Some(png) = &request.page.screenshot {
            content.push(RequestBlock::Image {
                source: ImageSource {
                    kind: "base64",
                    media_type: "image/png",
                    data: base64::engine::general_purpose::STANDARD.encode(png),
                },
            });
        }

        MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![RequestMessage {
                role: "user".to_string(),
                content,
            }],
            tools: build_tools(request),
            tool_choice: ToolChoice::Any,
        }
    }

    async fn send(&self, body: &MessagesRequest) -> Result<MessagesResponse, ReasonerError> {
        let url = format!("{}/v1/messages", self.config.base_url);
        log::debug!("Sending decision request to {} ({} tools)", url, body.tools.len());

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| ReasonerError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ReasonerError::Transport(e.to_string()))?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<ApiError>(&text) {
                Ok(err) => format!("{}: {}", err.error.r#type, err.error.message),
                Err(_) => format!("HTTP {}", status),
            };
            return Err(ReasonerError::Api(sanitize_api_error(&detail)));
        }

        serde_json::from_str(&text).map_err(|e| ReasonerError::Malformed(format!("unreadable response body: {}", e)))
    }
}

#[async_trait]
impl Reasoner for AnthropicReasoner {
    async fn decide(&self, request: ReasonerRequest<'_>) -> Result<Decision, ReasonerError> {
        let body = self.build_request(&request);
        let response = self.send(&body).await?;
        parse_decision(response)
    }
}

fn render_observation(request: &ReasonerRequest<'_>) -> String {
    let mut text = format!(
        "Task: {}\n\nStep {} of {}.\n\nCurrent page: {} ({})\n\n{}\n",
        request.task,
        request.step,
        request.max_steps,
        request.page.summary.url,
        request.page.summary.title,
        request.page.summary.content
    );

    if request.history.is_empty() {
        text.push_str("\nNo steps taken yet.\n");
    } else {
        text.push_str("\nSteps so far:\n");
        for entry in request.history {
            text.push_str(&entry.to_string());
            text.push('\n');
        }
    }
    text
}

fn build_tools(request: &ReasonerRequest<'_>) -> Vec<Tool> {
    let mut tools: Vec<Tool> = request
        .catalog
        .iter()
        .filter(|spec| {
            if spec.name == DONE_TOOL {
                log::warn!("Action '{}' is shadowed by the finish tool and not offered", spec.name);
                return false;
            }
            true
        })
        .map(action_tool)
        .collect();

    tools.push(Tool {
        name: DONE_TOOL.to_string(),
        description: "Finish the task and report the final answer.".to_string(),
        input_schema: request.output_schema.to_json_schema(),
    });
    tools
}

fn action_tool(spec: &ActionSpec) -> Tool {
    let properties: Map<String, Value> = spec
        .parameters
        .iter()
        .map(|param| (param.name.clone(), param_schema(param)))
        .collect();
    let required: Vec<&str> = spec
        .parameters
        .iter()
        .filter(|param| param.required)
        .map(|param| param.name.as_str())
        .collect();

    Tool {
        name: spec.name.clone(),
        description: spec.description.clone(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

fn param_schema(param: &ParamSpec) -> Value {
    let numeric = matches!(param.ty, ParamType::Number | ParamType::Integer);
    let mut schema = if numeric && !param.strict {
        json!({ "type": [param.ty.as_str(), "string"] })
    } else {
        json!({ "type": param.ty.as_str() })
    };
    if let Some(default) = &param.default {
        schema["default"] = default.clone();
    }
    if let Some(minimum) = param.minimum {
        schema["minimum"] = json!(minimum);
    }
    if let Some(description) = &param.description {
        schema["description"] = json!(description);
    }
    schema
}

fn parse_decision(response: MessagesResponse) -> Result<Decision, ReasonerError> {
    let mut text = Vec::new();
    for block in response.content {
        match block {
            ResponseBlock::ToolUse { name, input } if name == DONE_TOOL => return Ok(Decision::done(input)),
            ResponseBlock::ToolUse { name, input } => return Ok(Decision::invoke(name, input)),
            ResponseBlock::Text { text: t } => text.push(t),
            ResponseBlock::Other => {}
        }
    }

    Err(ReasonerError::Malformed(format!(
        "no tool call in reply (stop_reason: {}): {}",
        response.stop_reason.as_deref().unwrap_or("unknown"),
        text.join(" ")
    )))
}
