//! Configuration for the RunPod endpoint, polling and model parameters

use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

pub const DEFAULT_API_BASE: &str
  = "https://api.runpod.ai/v2";

pub const API_KEY_ENV: &str = "RUNPOD_API_KEY";
pub const ENDPOINT_ID_ENV: &str = "RUNPOD_ENDPOINT_ID";
pub const API_BASE_ENV: &str = "RUNPOD_API_BASE";

pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 1.0;
pub const DEFAULT_MAX_POLLING_ATTEMPTS: u32 = 30;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// How chat messages are handed to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatFormat
{   /// Render the conversation into a single `prompt` string
    #[default]
    Prompt
  , /// Send the conversation as `input.messages`
    Messages
}

/// Generation parameters, copied verbatim into the job `input`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParams
{   #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>
  , /// Anything else the worker understands
    #[serde(flatten)]
    pub extra: Map<String, Value>
}

/// RunPod adapter configuration, as written by users
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunPodConfig
{   /// API base URL
    pub api_base: String
  , /// Serverless endpoint id
    pub endpoint_id: Option<String>
  , /// Bearer credential; falls back to `RUNPOD_API_KEY`
    pub api_key: Option<String>
  , /// Seconds between status polls
    pub poll_interval: f64
  , /// Hard cap on status polls per job
    pub max_polling_attempts: u32
  , /// Per HTTP request timeout in seconds
    pub timeout_secs: u64
  , /// Characters per simulated stream chunk
    pub stream_chunk_chars: usize
  , pub chat_format: ChatFormat
  , /// Label reported in response metadata
    pub model_name: Option<String>
  , pub params: ModelParams
}

impl Default for RunPodConfig
{   fn default() -> Self
    {   RunPodConfig
        {   api_base: DEFAULT_API_BASE.to_string()
          , endpoint_id: None
          , api_key: None
          , poll_interval: DEFAULT_POLL_INTERVAL_SECS
          , max_polling_attempts: DEFAULT_MAX_POLLING_ATTEMPTS
          , timeout_secs: DEFAULT_TIMEOUT_SECS
          , stream_chunk_chars: 1
          , chat_format: ChatFormat::default()
          , model_name: None
          , params: ModelParams::default()
        }
    }
}

impl RunPodConfig
{   /// Defaults targeting a single endpoint
    pub fn for_endpoint(endpoint_id: impl Into<String>) -> Self
    {   RunPodConfig
        {   endpoint_id: Some(endpoint_id.into())
          , ..RunPodConfig::default()
        }
    }

    /// Defaults with endpoint and base URL taken from the environment.
    /// The key is left unset; resolution falls back to `RUNPOD_API_KEY`.
    pub fn from_env() -> Self
    {   let mut config = RunPodConfig::default();
        if let Ok(endpoint_id) = std::env::var(ENDPOINT_ID_ENV)
        {   config.endpoint_id = Some(endpoint_id);
        }
        if let Ok(api_base) = std::env::var(API_BASE_ENV)
        {   config.api_base = api_base;
        }
        config
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, Error>
    {   serde_json::from_str(json).map_err(|e| {
          Error::Configuration(format!("invalid config JSON: {}", e))
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self
    {   self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self
    {   self.api_base = api_base.into();
        self
    }

    /// Validate against the process environment
    pub fn resolve(&self) -> Result<ResolvedConfig, Error>
    {   self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Validate, reading fallbacks through `lookup`
    pub fn resolve_with<F>(&self, lookup: F) -> Result<ResolvedConfig, Error>
    where F: Fn(&str) -> Option<String>
    {   let api_key = self.api_key.clone()
          .filter(|k| !k.trim().is_empty())
          .or_else(|| {
            lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty())
          })
          .ok_or_else(|| {
            warn!("No RunPod API key configured");
            Error::Configuration(format!(
              "RunPod API key must be provided via api_key or the {} environment variable",
              API_KEY_ENV
            ))
          })?;

        let endpoint_id = self.endpoint_id.clone()
          .map(|id| id.trim().to_string())
          .filter(|id| !id.is_empty())
          .ok_or_else(|| {
            Error::Configuration(
              "RunPod endpoint_id must be provided".to_string()
            )
          })?;

        let api_base = self.api_base.trim().trim_end_matches('/');
        if api_base.is_empty()
        {   return Err(Error::Configuration(
              "api_base must not be empty".to_string()
            ));
        }

        let poll_interval = Duration::try_from_secs_f64(self.poll_interval)
          .map_err(|e| {
            Error::Configuration(format!(
              "poll_interval must be a non-negative number of seconds, got {}: {}",
              self.poll_interval, e
            ))
          })?;
        if self.max_polling_attempts == 0
        {   return Err(Error::Configuration(
              "max_polling_attempts must be at least 1".to_string()
            ));
        }
        if self.timeout_secs == 0
        {   return Err(Error::Configuration(
              "timeout_secs must be at least 1".to_string()
            ));
        }
        if self.stream_chunk_chars == 0
        {   return Err(Error::Configuration(
              "stream_chunk_chars must be at least 1".to_string()
            ));
        }

        debug!(
          "Resolved RunPod config for endpoint {} at {}",
          endpoint_id, api_base
        );

        Ok(ResolvedConfig
        {   api_base: api_base.to_string()
          , endpoint_id
          , api_key
          , poll_interval
          , max_polling_attempts: self.max_polling_attempts
          , timeout: Duration::from_secs(self.timeout_secs)
          , stream_chunk_chars: self.stream_chunk_chars
          , chat_format: self.chat_format
          , model_name: self.model_name.clone()
          , params: self.params.clone()
        })
    }
}

/// Validated configuration consumed by the job client
#[derive(Clone)]
pub struct ResolvedConfig
{   pub api_base: String
  , pub endpoint_id: String
  , pub api_key: String
  , pub poll_interval: Duration
  , pub max_polling_attempts: u32
  , pub timeout: Duration
  , pub stream_chunk_chars: usize
  , pub chat_format: ChatFormat
  , pub model_name: Option<String>
  , pub params: ModelParams
}

impl fmt::Debug for ResolvedConfig
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.debug_struct("ResolvedConfig")
          .field("api_base", &self.api_base)
          .field("endpoint_id", &self.endpoint_id)
          .field("api_key", &"<redacted>")
          .field("poll_interval", &self.poll_interval)
          .field("max_polling_attempts", &self.max_polling_attempts)
          .field("timeout", &self.timeout)
          .field("stream_chunk_chars", &self.stream_chunk_chars)
          .field("chat_format", &self.chat_format)
          .field("model_name", &self.model_name)
          .field("params", &self.params)
          .finish()
    }
}
