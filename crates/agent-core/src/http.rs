//! Anthropic messages-API backend for the reasoning provider.

use crate::errors::AgentError;
use crate::parse::extract_json_object;
use crate::provider::{ReasoningProvider, ReasoningRequest};
use async_trait::async_trait;
use base64::Engine;
use element_locator::VisionHit;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use webpilot_core_types::{Point, Size};

const ANTHROPIC_VERSION: &str = "2023-06-01";

const DECIDE_SYSTEM_PROMPT: &str = "You operate a web browser one action at a time. \
Reply with exactly one JSON object and nothing else. The object has an \"action\" field \
set to one of: navigate, click, type, scroll, wait, finish. \
navigate takes \"url\". click takes \"target\" (an object with any of selector, role, name, \
text, description). type takes \"target\" plus exactly one of \"text\" or \"question\". \
scroll takes \"dx\" and \"dy\" in pixels. wait takes \"ms\". finish takes \"summary\". \
Always include a short \"reasoning\" field.";

const LOCATE_SYSTEM_PROMPT: &str = "You locate elements in screenshots. \
Reply with exactly one JSON object: {\"found\": bool, \"x\": number, \"y\": number, \
\"confidence\": number between 0 and 1, \"image_width\": number, \"image_height\": number}. \
Coordinates are pixels in the provided image. If the element is not present, \
set found to false.";

#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_base: "https://api.anthropic.com/v1".to_string(),
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| AgentError::Provider(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, config })
    }

    async fn invoke(
        &self,
        system: &str,
        content: Vec<ApiContent>,
    ) -> Result<String, AgentError> {
        let body = ApiRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: system.to_string(),
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content,
            }],
        };
        let url = format!("{}/messages", self.config.api_base.trim_end_matches('/'));

        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| AgentError::Provider(format!("request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(AgentError::Provider(format!(
                "api returned {status}: {text}"
            )));
        }

        let response: ApiResponse = response
            .json()
            .await
            .map_err(|err| AgentError::Provider(format!("response invalid: {err}")))?;

        let text = response
            .content
            .iter()
            .filter_map(|part| part.text.as_ref())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            return Err(AgentError::Provider("response missing content".into()));
        }
        Ok(text)
    }

    fn image_block(png: &[u8]) -> ApiContent {
        ApiContent::Image {
            source: ApiImageSource {
                kind: "base64".to_string(),
                media_type: "image/png".to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(png),
            },
        }
    }
}

#[async_trait]
impl ReasoningProvider for AnthropicProvider {
    async fn decide(&self, request: &ReasoningRequest) -> Result<String, AgentError> {
        let mut content = Vec::with_capacity(2);
        if let Some(png) = &request.screenshot_png {
            content.push(Self::image_block(png));
        }
        content.push(ApiContent::Text {
            text: request.prompt.clone(),
        });
        self.invoke(DECIDE_SYSTEM_PROMPT, content).await
    }

    async fn locate(
        &self,
        screenshot_png: &[u8],
        description: &str,
    ) -> Result<Option<VisionHit>, AgentError> {
        let content = vec![
            Self::image_block(screenshot_png),
            ApiContent::Text {
                text: format!("Locate this element: {description}"),
            },
        ];
        let reply = self.invoke(LOCATE_SYSTEM_PROMPT, content).await?;
        let json = extract_json_object(&reply)
            .ok_or_else(|| AgentError::Provider("locate reply missing JSON".into()))?;
        let hit: LocateReply = serde_json::from_str(json)
            .map_err(|err| AgentError::Provider(format!("locate reply invalid: {err}")))?;
        if !hit.found {
            return Ok(None);
        }
        Ok(Some(VisionHit {
            point: Point::new(hit.x, hit.y),
            confidence: hit.confidence.clamp(0.0, 1.0),
            image_size: Size::new(hit.image_width, hit.image_height),
        }))
    }

    async fn answer(&self, question: &str) -> Result<String, AgentError> {
        let content = vec![ApiContent::Text {
            text: format!(
                "Answer the following form question concisely with only the answer text, \
                 no preamble: {question}"
            ),
        }];
        let reply = self
            .invoke("You fill in web forms on the user's behalf.", content)
            .await?;
        Ok(reply.trim().to_string())
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: Vec<ApiContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ApiContent {
    Text {
        text: String,
    },
    Image {
        source: ApiImageSource,
    },
}

#[derive(Debug, Serialize)]
struct ApiImageSource {
    #[serde(rename = "type")]
    kind: String,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocateReply {
    found: bool,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    image_width: u32,
    #[serde(default)]
    image_height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_block_is_base64_png() {
        let block = AnthropicProvider::image_block(&[1, 2, 3]);
        let json = serde_json::to_value(&block).map_err(|e| e.to_string()).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["source"]["media_type"], "image/png");
        assert_eq!(json["source"]["data"], "AQID");
    }

    #[test]
    fn locate_reply_parses() {
        let reply: LocateReply = serde_json::from_str(
            r#"{"found": true, "x": 12.5, "y": 30, "confidence": 0.91,
                "image_width": 640, "image_height": 400}"#,
        )
        .unwrap();
        assert!(reply.found);
        assert_eq!(reply.image_width, 640);
    }
}
