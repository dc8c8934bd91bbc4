use crate::config::Settings;
use crate::domain::contract::{LlmNarrative, MAX_NARRATIVE_LINES};
use crate::domain::recommendation::{Narrative, Recommendation};
use crate::narrative::error::LlmDiagnosticsError;
use crate::narrative::json;
use crate::narrative::{NarrativeClient, NarrativeResponse, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const TOOL_NAME_EMIT_NARRATIVE: &str = "emit_narrative";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }

    async fn create_message(
        &self,
        req: CreateMessageRequest,
    ) -> anyhow::Result<(serde_json::Value, CreateMessageResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Anthropic response JSON: {text}"))?;
        let parsed = serde_json::from_value::<CreateMessageResponse>(raw_json.clone())
            .context("failed to decode Anthropic response into CreateMessageResponse")?;
        Ok((raw_json, parsed))
    }

    fn request(&self, content: String) -> CreateMessageRequest {
        CreateMessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content,
            }],
            tools: Some(Self::tools()),
            tool_choice: Some(Self::tool_choice()),
        }
    }

    fn tools() -> Vec<Tool> {
        let schema = serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["summary", "highlights", "cautions"],
            "properties": {
                "summary": {"type": "string"},
                "highlights": {
                    "type": "array",
                    "maxItems": MAX_NARRATIVE_LINES,
                    "items": {"type": "string"}
                },
                "cautions": {
                    "type": "array",
                    "maxItems": MAX_NARRATIVE_LINES,
                    "items": {"type": "string"}
                }
            }
        });

        vec![Tool {
            name: TOOL_NAME_EMIT_NARRATIVE,
            description: "Emit the client-facing explanation of the recommendation",
            input_schema: schema,
        }]
    }

    fn tool_choice() -> ToolChoice {
        ToolChoice::Tool {
            name: TOOL_NAME_EMIT_NARRATIVE,
        }
    }

    fn system_prompt() -> String {
        [
            "You are a financial advisor explaining an already-computed investment recommendation to a retail client.",
            "Never change the numbers: allocation weights, risk category, capacity and projections are final.",
            "Do not recommend specific securities. Use plain language.",
            "Return ONLY valid JSON with keys summary, highlights, cautions. No markdown, no extra keys.",
            "Rules:",
            "- summary: 2-4 sentences",
            "- highlights: at most 5 short lines on what the plan does well",
            "- cautions: at most 5 short lines on risks, shortfalls, or goals that are behind",
            "- If capital is not deployable, say so plainly in the summary",
        ]
        .join("\n")
    }

    fn user_prompt(recommendation: &Recommendation) -> anyhow::Result<String> {
        let body = serde_json::to_string_pretty(recommendation)
            .context("failed to serialize recommendation for the prompt")?;
        Ok(format!(
            "Explain this recommendation for client {}.\n\nRecommendation JSON:\n{body}",
            recommendation.client_id
        ))
    }

    fn repair_prompt(previous_output: &str) -> String {
        format!(
            "Your previous message was NOT valid JSON.\n\n\
TASK: Output ONLY a single JSON object of the form \
{{\"summary\": \"...\", \"highlights\": [\"...\"], \"cautions\": [\"...\"]}}.\n\
- Do NOT include any markdown, prose, or code fences.\n\
- summary MUST be non-empty.\n\
- highlights and cautions MUST each have at most {MAX_NARRATIVE_LINES} strings.\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}"
        )
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    fn response_tool_narrative(res: &CreateMessageResponse) -> anyhow::Result<Option<LlmNarrative>> {
        for block in &res.content {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == TOOL_NAME_EMIT_NARRATIVE {
                    let parsed = serde_json::from_value::<LlmNarrative>(input.clone())
                        .context("failed to decode tool_use.input into LlmNarrative")?;
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }

    fn narrative_from(res: &CreateMessageResponse) -> anyhow::Result<Narrative> {
        match Self::response_tool_narrative(res)? {
            Some(tool) => tool.validate_and_into_narrative(),
            None => json::parse_narrative(&Self::response_text(res)),
        }
    }

    async fn repair(
        &self,
        client_id: &str,
        previous_output: String,
        first_err: anyhow::Error,
    ) -> anyhow::Result<NarrativeResponse> {
        tracing::warn!(%client_id, error = %first_err, "narrative output invalid; attempting repair");

        let (raw_json, res) = self
            .create_message(self.request(Self::repair_prompt(&previous_output)))
            .await?;
        match Self::narrative_from(&res) {
            Ok(narrative) => Ok(NarrativeResponse {
                narrative,
                raw_response_json: raw_json,
            }),
            Err(err) => Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "parse_after_repair",
                detail: format!("first_error={first_err}; final_error={err}"),
                raw_output: Some(Self::response_text(&res)),
                raw_response_json: Some(raw_json),
            }
            .into()),
        }
    }
}

#[async_trait::async_trait]
impl NarrativeClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn narrate(&self, recommendation: &Recommendation) -> anyhow::Result<NarrativeResponse> {
        let (raw_json, res) = self
            .create_message(self.request(Self::user_prompt(recommendation)?))
            .await?;

        if matches!(res.stop_reason.as_deref(), Some("max_tokens")) {
            tracing::warn!(
                client_id = %recommendation.client_id,
                max_tokens = self.max_tokens,
                "Anthropic stop_reason=max_tokens; narrative may be truncated"
            );
        }

        match Self::narrative_from(&res) {
            Ok(narrative) => Ok(NarrativeResponse {
                narrative,
                raw_response_json: raw_json,
            }),
            Err(err) => {
                let previous = match Self::response_text(&res) {
                    text if text.trim().is_empty() => raw_json.to_string(),
                    text => text,
                };
                self.repair(&recommendation.client_id, previous, err).await
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(other)]
    Unknown,
}
