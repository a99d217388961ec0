//! Bailian client settings.

use serde::{Deserialize, Serialize};

/// Settings for [`BailianClient`](crate::BailianClient).
///
/// # Examples
///
/// ```
/// use imgagent_models::BailianConfig;
///
/// let config = BailianConfig::builder()
///     .chat_model("qwen-max")
///     .max_retries(0u32)
///     .build()
///     .unwrap();
/// assert_eq!(config.chat_model(), "qwen-max");
/// assert_eq!(config.base_url(), "https://dashscope.aliyuncs.com");
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_getters::Getters,
    derive_builder::Builder,
)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct BailianConfig {
    /// Service root URL
    base_url: String,
    /// API key; read from `api_key_env` when unset
    #[serde(skip_serializing)]
    api_key: Option<String>,
    /// Environment variable holding the API key
    api_key_env: String,
    /// Chat model used for extraction
    chat_model: String,
    /// Image synthesis model
    image_model: String,
    /// Image size as `width*height`
    image_size: String,
    /// Speech synthesis model
    voice_model: String,
    /// Voice preset name
    voice: String,
    /// Per-request HTTP timeout in seconds
    request_timeout_secs: u64,
    /// Delay between image task status polls in milliseconds
    image_poll_interval_ms: u64,
    /// Give up on an image task after this many seconds
    image_timeout_secs: u64,
    /// Client-side request budget per minute
    requests_per_minute: u32,
    /// Immediate retries of a transient HTTP failure inside one call
    max_retries: u32,
    /// First delay of the in-call retry backoff in milliseconds
    retry_backoff_ms: u64,
}

impl Default for BailianConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dashscope.aliyuncs.com".to_string(),
            api_key: None,
            api_key_env: "DASHSCOPE_API_KEY".to_string(),
            chat_model: "qwen-plus".to_string(),
            image_model: "wanx2.1-t2i-turbo".to_string(),
            image_size: "1024*1024".to_string(),
            voice_model: "qwen-tts".to_string(),
            voice: "Cherry".to_string(),
            request_timeout_secs: 60,
            image_poll_interval_ms: 2000,
            image_timeout_secs: 180,
            requests_per_minute: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl BailianConfig {
    /// Creates a new config builder.
    pub fn builder() -> BailianConfigBuilder {
        BailianConfigBuilder::default()
    }

    /// Configured API key, or the value of `api_key_env`.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.is_empty())
    }
}
