//! Google Gemini native provider implementation.
//!
//! Uses the Generative Language REST API (`models/{model}:generateContent`).
//!
//! Features:
//! - `x-goog-api-key` header authentication
//! - System prompt as a top-level `systemInstruction`
//! - `user` / `model` content roles, consecutive same-role messages merged
//! - `avgLogprobs` on the candidate turned into a confidence signal
//! - Model listing filtered to models that support `generateContent`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use supportline_core::error::ProviderError;
use supportline_core::message::{Message, Role};
use supportline_core::provider::*;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini `generateContent` provider.
pub struct GeminiProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: "gemini".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Split system instructions from the conversational messages.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let system_parts: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        let rest = messages.iter().filter(|m| m.role != Role::System).collect();
        (system, rest)
    }

    /// Convert messages to Gemini contents, merging consecutive same-role turns.
    fn to_api_contents(messages: &[&Message]) -> Vec<GeminiContent> {
        let mut contents: Vec<GeminiContent> = Vec::new();

        for msg in messages {
            let role = match msg.role {
                Role::Assistant => "model",
                _ => "user",
            };

            match contents.last_mut() {
                Some(last) if last.role.as_deref() == Some(role) => {
                    last.parts.push(GeminiPart {
                        text: msg.content.clone(),
                    });
                }
                _ => contents.push(GeminiContent {
                    role: Some(role.into()),
                    parts: vec![GeminiPart {
                        text: msg.content.clone(),
                    }],
                }),
            }
        }

        contents
    }

    fn build_body(request: &ProviderRequest) -> serde_json::Value {
        let (system, messages) = Self::extract_system(&request.messages);

        let mut generation_config = serde_json::json!({
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_tokens {
            generation_config["maxOutputTokens"] = serde_json::json!(max_tokens);
        }
        if !request.stop.is_empty() {
            generation_config["stopSequences"] = serde_json::json!(request.stop);
        }

        let mut body = serde_json::json!({
            "contents": Self::to_api_contents(&messages),
            "generationConfig": generation_config,
        });

        if let Some(sys) = system {
            body["systemInstruction"] = serde_json::json!(GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: sys }],
            });
        }

        body
    }

    /// Convert a Gemini API response into our `ProviderResponse`.
    fn response_to_provider_response(
        resp: GeminiResponse,
        requested_model: &str,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let Some(candidate) = resp.candidates.into_iter().next() else {
            let reason = resp
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".into());
            return Err(ProviderError::MalformedResponse(format!(
                "Gemini returned no answer: {reason}"
            )));
        };

        let text: String = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let confidence = candidate
            .avg_logprobs
            .map(|avg| avg.exp().clamp(0.0, 1.0) as f32);

        let usage = resp.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        let mut metadata = serde_json::Map::new();
        if let Some(reason) = candidate.finish_reason {
            metadata.insert("finish_reason".into(), serde_json::json!(reason));
        }

        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage,
            model: resp
                .model_version
                .unwrap_or_else(|| requested_model.to_string()),
            confidence,
            metadata,
        })
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let model = request.model.trim_start_matches("models/");
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let body = Self::build_body(&request);

        debug!(provider = "gemini", model = %model, "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Gemini API key".into(),
            ));
        }
        if status == 404 {
            return Err(ProviderError::ModelNotFound(format!(
                "'{model}' is not available for generateContent"
            )));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: GeminiResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("Failed to parse Gemini response: {e}"))
        })?;

        Self::response_to_provider_response(api_resp, model)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: GeminiModelList = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        Ok(body.generative_model_names())
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- Gemini API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    avg_logprobs: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiModelList {
    #[serde(default)]
    models: Vec<GeminiModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModel {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl GeminiModelList {
    fn generative_model_names(self) -> Vec<String> {
        self.models
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == "generateContent")
            })
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor() {
        let provider = GeminiProvider::new("g-test");
        assert_eq!(provider.name(), "gemini");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn constructor_with_base_url() {
        let provider = GeminiProvider::new("g-test").with_base_url("http://localhost:9999/v1beta/");
        assert_eq!(provider.base_url, "http://localhost:9999/v1beta");
    }

    #[test]
    fn system_goes_to_system_instruction() {
        let request = ProviderRequest::new(
            "gemini-1.5-flash",
            vec![Message::system("You are Clara"), Message::user("Hello")],
        )
        .with_max_tokens(256);

        let body = GeminiProvider::build_body(&request);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are Clara");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn consecutive_roles_are_merged() {
        let messages = [
            Message::user("first"),
            Message::user("second"),
            Message::assistant("reply"),
        ];
        let refs: Vec<&Message> = messages.iter().collect();
        let contents = GeminiProvider::to_api_contents(&refs);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].parts.len(), 2);
        assert_eq!(contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn parse_text_response() {
        let resp: GeminiResponse = serde_json::from_str(
            r#"{
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "We are open "}, {"text": "9-5."}]},
                    "finishReason": "STOP",
                    "avgLogprobs": -0.1
                }],
                "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4, "totalTokenCount": 16},
                "modelVersion": "gemini-1.5-flash-002"
            }"#,
        )
        .unwrap();

        let pr = GeminiProvider::response_to_provider_response(resp, "gemini-1.5-flash").unwrap();
        assert_eq!(pr.message.content, "We are open 9-5.");
        assert_eq!(pr.usage.unwrap().total_tokens, 16);
        assert_eq!(pr.model, "gemini-1.5-flash-002");
        let confidence = pr.confidence.unwrap();
        assert!(confidence > 0.9 && confidence < 0.91);
    }

    #[test]
    fn blocked_prompt_is_malformed() {
        let resp: GeminiResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        match GeminiProvider::response_to_provider_response(resp, "m") {
            Err(ProviderError::MalformedResponse(msg)) => assert!(msg.contains("SAFETY")),
            other => panic!("Expected MalformedResponse, got: {other:?}"),
        }
    }

    #[test]
    fn model_list_keeps_generative_models() {
        let list: GeminiModelList = serde_json::from_str(
            r#"{"models": [
                {"name": "models/gemini-1.5-flash", "supportedGenerationMethods": ["generateContent", "countTokens"]},
                {"name": "models/text-embedding-004", "supportedGenerationMethods": ["embedContent"]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(list.generative_model_names(), vec!["gemini-1.5-flash"]);
    }
}
