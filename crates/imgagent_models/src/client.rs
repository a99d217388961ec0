//! Bailian (DashScope) HTTP client.

use crate::BailianConfig;
use crate::dto::{
    ChatMessage, ChatRequest, ChatResponse, ErrorBody, ImageParameters, ImageRequest,
    PromptInput, ResponseFormat, SpeechEnvelope, SpeechInput, SpeechRequest, TaskEnvelope,
};
use crate::extraction::{parse_role_drafts, parse_scene_drafts};
use crate::prompts::{MAX_ROLE_INPUT_CHARS, ROLE_SYSTEM_PROMPT, SCENE_SYSTEM_PROMPT, truncate_chars};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use imgagent_core::{RoleDraft, SceneDraft};
use imgagent_error::{GenerationError, GenerationErrorKind};
use imgagent_interface::GenerationClient;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry2::strategy::{ExponentialBackoff, jitter};
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, error, instrument, warn};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const CHAT_PATH: &str = "/compatible-mode/v1/chat/completions";
const IMAGE_PATH: &str = "/api/v1/services/aigc/text2image/image-synthesis";
const TASK_PATH: &str = "/api/v1/tasks";
const SPEECH_PATH: &str = "/api/v1/services/aigc/multimodal-generation/generation";

/// Error codes the service uses when content moderation blocks a request.
const MODERATION_CODES: &[&str] = &["DataInspectionFailed", "data_inspection_failed"];

/// Classify a non-success HTTP response.
///
/// Moderation rejections and credential failures are permanent; the status
/// code decides the rest.
///
/// # Examples
///
/// ```
/// use imgagent_models::classify_status;
///
/// assert!(classify_status(503, "").is_transient());
/// assert!(!classify_status(400, r#"{"code":"DataInspectionFailed","message":"blocked"}"#).is_transient());
/// ```
pub fn classify_status(status: u16, body: &str) -> GenerationError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = match (parsed.code(), parsed.message()) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        (Some(code), None) => code.to_string(),
        (None, Some(message)) => message.to_string(),
        (None, None) => truncate_chars(body, 300).to_string(),
    };

    if parsed.code().is_some_and(|c| MODERATION_CODES.contains(&c)) {
        return GenerationError::new(GenerationErrorKind::ContentRejected(message));
    }
    match status {
        401 | 403 => GenerationError::new(GenerationErrorKind::Auth(message)),
        _ => GenerationError::new(GenerationErrorKind::Http {
            status_code: status,
            message,
        }),
    }
}

fn transport_error(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::new(GenerationErrorKind::Timeout(err.to_string()))
    } else {
        GenerationError::new(GenerationErrorKind::Transport(err.to_string()))
    }
}

/// Client for Alibaba Cloud Bailian.
#[derive(Clone)]
pub struct BailianClient {
    http: reqwest::Client,
    config: BailianConfig,
    api_key: String,
    limiter: Option<Arc<DirectRateLimiter>>,
}

impl std::fmt::Debug for BailianClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BailianClient")
            .field("base_url", self.config.base_url())
            .field("chat_model", self.config.chat_model())
            .finish_non_exhaustive()
    }
}

impl BailianClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an `Auth` error if no API key is configured, or a `Transport`
    /// error if the HTTP client cannot be built.
    #[instrument(skip_all, fields(base_url = %config.base_url()))]
    pub fn new(config: BailianConfig) -> Result<Self, GenerationError> {
        let api_key = config.resolved_api_key().ok_or_else(|| {
            GenerationError::new(GenerationErrorKind::Auth(format!(
                "{} not set",
                config.api_key_env()
            )))
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(*config.request_timeout_secs()))
            .build()
            .map_err(transport_error)?;

        let limiter = NonZeroU32::new(*config.requests_per_minute())
            .map(|n| Arc::new(RateLimiter::direct(Quota::per_minute(n))));

        debug!("Creating new Bailian client");
        Ok(Self {
            http,
            config,
            api_key,
            limiter,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url().trim_end_matches('/'), path)
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn read_json<R: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<R, GenerationError> {
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            let err = classify_status(status.as_u16(), &text);
            warn!(status = %status, error = %err, "Bailian returned error");
            return Err(err);
        }
        serde_json::from_str(&text).map_err(|e| {
            error!(error = ?e, "Failed to parse Bailian response");
            GenerationError::new(GenerationErrorKind::Malformed(format!(
                "Failed to parse response: {}",
                e
            )))
        })
    }

    async fn post_once<B, R>(&self, url: &str, body: &B, async_task: bool) -> Result<R, GenerationError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        self.throttle().await;
        let mut request = self.http.post(url).bearer_auth(&self.api_key).json(body);
        if async_task {
            request = request.header("X-DashScope-Async", "enable");
        }
        let response = request.send().await.map_err(transport_error)?;
        Self::read_json(response).await
    }

    async fn get_once<R: DeserializeOwned>(&self, url: &str) -> Result<R, GenerationError> {
        self.throttle().await;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_json(response).await
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> + use<> {
        ExponentialBackoff::from_millis(*self.config.retry_backoff_ms())
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(*self.config.max_retries() as usize)
    }

    /// POST with in-call retries of transient failures.
    async fn post_json<B, R>(&self, path: &str, body: &B, async_task: bool) -> Result<R, GenerationError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        let url = url.as_str();
        Retry::spawn(self.retry_strategy(), || {
            let this = self;
            async move {
                match this.post_once(url, body, async_task).await {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_transient() => {
                        warn!(error = %e, "Bailian call failed, will retry");
                        Err(RetryError::Transient {
                            err: e,
                            retry_after: None,
                        })
                    }
                    Err(e) => Err(RetryError::Permanent(e)),
                }
            }
        })
        .await
    }

    #[instrument(skip(self, system, user), fields(model = %self.config.chat_model(), input_len = user.len()))]
    async fn chat(&self, system: &str, user: &str) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: self.config.chat_model(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let response: ChatResponse = self.post_json(CHAT_PATH, &request, false).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::new(GenerationErrorKind::Malformed(
                    "Chat response has no content".to_string(),
                ))
            })?;
        debug!(output_len = content.len(), "Chat completed");
        Ok(content)
    }

    async fn wait_for_task(&self, task_id: &str) -> Result<String, GenerationError> {
        let poll = Duration::from_millis(*self.config.image_poll_interval_ms());
        let deadline = tokio::time::Instant::now() + Duration::from_secs(*self.config.image_timeout_secs());
        let url = self.url(&format!("{}/{}", TASK_PATH, task_id));

        loop {
            tokio::time::sleep(poll).await;
            let task: TaskEnvelope = self.get_once(&url).await?;
            let output = task.output;
            match output.task_status.as_str() {
                "SUCCEEDED" => {
                    return output
                        .results
                        .into_iter()
                        .find_map(|r| r.url)
                        .ok_or_else(|| {
                            GenerationError::new(GenerationErrorKind::Malformed(format!(
                                "Image task {} succeeded without a result URL",
                                task_id
                            )))
                        });
                }
                "FAILED" | "CANCELED" | "UNKNOWN" => {
                    let code = output.code.unwrap_or_default();
                    let message = format!(
                        "{} {}: {}",
                        output.task_status,
                        code,
                        output.message.unwrap_or_default()
                    );
                    let kind = if MODERATION_CODES.contains(&code.as_str()) {
                        GenerationErrorKind::ContentRejected(message)
                    } else {
                        GenerationErrorKind::TaskFailed(message)
                    };
                    return Err(GenerationError::new(kind));
                }
                status => debug!(task_id, status, "Image task pending"),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(GenerationError::new(GenerationErrorKind::Timeout(format!(
                    "Image task {} did not finish within {}s",
                    task_id,
                    self.config.image_timeout_secs()
                ))));
            }
        }
    }
}

#[async_trait]
impl GenerationClient for BailianClient {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn extract_roles(&self, text: &str) -> Result<Vec<RoleDraft>, GenerationError> {
        let input = truncate_chars(text, MAX_ROLE_INPUT_CHARS);
        let content = self.chat(ROLE_SYSTEM_PROMPT, input).await?;
        let roles = parse_role_drafts(&content)?;
        debug!(count = roles.len(), "Extracted roles");
        Ok(roles)
    }

    #[instrument(skip(self, chapter_text), fields(text_len = chapter_text.len()))]
    async fn extract_scenes(&self, chapter_text: &str) -> Result<Vec<SceneDraft>, GenerationError> {
        let content = self.chat(SCENE_SYSTEM_PROMPT, chapter_text).await?;
        let scenes = parse_scene_drafts(&content)?;
        debug!(count = scenes.len(), "Extracted scenes");
        Ok(scenes)
    }

    #[instrument(skip(self, scene_text), fields(model = %self.config.image_model()))]
    async fn generate_image(&self, scene_text: &str) -> Result<String, GenerationError> {
        let request = ImageRequest {
            model: self.config.image_model(),
            input: PromptInput { prompt: scene_text },
            parameters: ImageParameters {
                size: self.config.image_size(),
                n: 1,
            },
        };
        let submitted: TaskEnvelope = self.post_json(IMAGE_PATH, &request, true).await?;
        let task_id = submitted.output.task_id;
        if task_id.is_empty() {
            return Err(GenerationError::new(GenerationErrorKind::Malformed(
                "Image submission returned no task id".to_string(),
            )));
        }
        debug!(task_id = %task_id, "Image task submitted");
        self.wait_for_task(&task_id).await
    }

    #[instrument(skip(self, scene_text), fields(model = %self.config.voice_model()))]
    async fn generate_voice(&self, scene_text: &str) -> Result<String, GenerationError> {
        let request = SpeechRequest {
            model: self.config.voice_model(),
            input: SpeechInput {
                text: scene_text,
                voice: self.config.voice(),
            },
        };
        let response: SpeechEnvelope = self.post_json(SPEECH_PATH, &request, false).await?;
        let url = response.output.audio.url;
        if url.is_empty() {
            return Err(GenerationError::new(GenerationErrorKind::Malformed(
                "Speech response has no audio URL".to_string(),
            )));
        }
        Ok(url)
    }

    fn provider_name(&self) -> &'static str {
        "bailian"
    }
}
