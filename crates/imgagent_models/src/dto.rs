//! Wire types for the Bailian HTTP API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatChoiceMessage {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PromptInput<'a> {
    pub prompt: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ImageParameters<'a> {
    pub size: &'a str,
    pub n: u32,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ImageRequest<'a> {
    pub model: &'a str,
    pub input: PromptInput<'a>,
    pub parameters: ImageParameters<'a>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TaskEnvelope {
    pub output: TaskOutput,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TaskOutput {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub task_status: String,
    #[serde(default)]
    pub results: Vec<TaskResult>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TaskResult {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SpeechInput<'a> {
    pub text: &'a str,
    pub voice: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SpeechRequest<'a> {
    pub model: &'a str,
    pub input: SpeechInput<'a>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SpeechEnvelope {
    pub output: SpeechOutput,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SpeechOutput {
    pub audio: SpeechAudio,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SpeechAudio {
    #[serde(default)]
    pub url: String,
}

/// Error body returned by the service on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<CompatError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct CompatError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub(crate) fn code(&self) -> Option<&str> {
        self.code
            .as_deref()
            .or_else(|| self.error.as_ref().and_then(|e| e.code.as_deref()))
    }

    pub(crate) fn message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or_else(|| self.error.as_ref().and_then(|e| e.message.as_deref()))
    }
}
