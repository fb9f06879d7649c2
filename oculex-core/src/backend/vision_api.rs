//! Hosted vision-LLM backend speaking the chat-completions protocol.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{AnalysisBackend, AnalysisRequest, BackendError, BackendResponse, parse};
use async_trait::async_trait;

const SYSTEM_PROMPT: &str = "You are a medical imaging analysis assistant. \
You examine sequences of frames from medical videos or DICOM studies and \
describe observable findings for clinician review. Respond with a single \
JSON object and nothing else, using this shape: {\"summary\": string, \
\"urgency\": \"low\"|\"medium\"|\"high\", \"recommendations\": [string], \
\"frameAnalyses\": [{\"frameNumber\": number, \"timestamp\": number, \
\"analysis\": string, \"confidence\": number, \"findings\": [string]}]}. \
Do not diagnose; describe what is visible and flag anything that warrants \
urgent review.";

/// Connection settings for the hosted vision API.
#[derive(Clone)]
pub struct VisionApiConfig {
    /// Base URL up to the API root, e.g. `https://api.example.com/v1`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
}

impl fmt::Debug for VisionApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// [`AnalysisBackend`] over an OpenAI-compatible chat-completions API.
#[derive(Debug, Clone)]
pub struct VisionApiBackend {
    client: reqwest::Client,
    config: VisionApiConfig,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl VisionApiBackend {
    pub fn new(client: reqwest::Client, config: VisionApiConfig) -> Self {
        Self { client, config }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn build_payload(&self, request: &AnalysisRequest) -> Value {
        let mut context = format!(
            "Patient-described problem: {}\nSubmission mode: {}\nFrames: {}",
            request.problem,
            request.mode,
            request.frames.len()
        );
        if let Some(dicom) = &request.dicom {
            context.push_str(&format!("\nDICOM series: {}", dicom.folder));
            if let Some(modality) = &dicom.modality {
                context.push_str(&format!("\nModality: {modality}"));
            }
        }

        let mut content = vec![json!({ "type": "text", "text": context })];
        for frame in &request.frames {
            content.push(json!({
                "type": "text",
                "text": format!(
                    "Frame {} at {:.2}s:",
                    frame.frame_number, frame.timestamp
                ),
            }));
            content.push(json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:image/png;base64,{}", BASE64.encode(&frame.png)),
                },
            }));
        }

        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": content },
            ],
        })
    }
}

#[async_trait]
impl AnalysisBackend for VisionApiBackend {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<BackendResponse, BackendError> {
        let payload = self.build_payload(request);
        debug!(
            target: "analysis",
            model = %self.config.model,
            frames = request.frames.len(),
            "invoking vision backend"
        );

        let mut call = self.client.post(self.completions_url()).json(&payload);
        if let Some(key) = &self.config.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: truncate(&message, 300),
            });
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| BackendError::Malformed("reply contained no content".to_string()))?;

        Ok(match parse::try_structured(&content) {
            Some(report) => BackendResponse::Structured(report),
            None => BackendResponse::Unstructured(content),
        })
    }
}

fn map_transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(err.to_string())
    } else if err.is_connect() {
        BackendError::Connect(err.to_string())
    } else {
        BackendError::Other(err.to_string())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
