//! RunPod serverless endpoints as a language model.
//!
//! A prompt is submitted as a RunPod job (`POST /{endpoint}/run`), polled
//! (`GET /{endpoint}/status/{id}`) until it reaches a terminal status, and
//! the job output is normalized into a single string. Streaming callers get
//! that string replayed chunk by chunk.
//!
//! ```text
//! runpod-llm/
//! ├── src/
//! │   ├── lib.rs        # Re-exports and chat message types
//! │   ├── error.rs      # Error type shared by every layer
//! │   ├── config.rs     # Endpoint, credential, polling and model settings
//! │   ├── request.rs    # Job request / job status wire types
//! │   ├── normalize.rs  # Output payload -> text
//! │   ├── polling.rs    # Poll state machine shared by both drivers
//! │   ├── client.rs     # Blocking and async job drivers
//! │   ├── stream.rs     # Simulated streaming
//! │   ├── llm.rs        # Text completion facade
//! │   └── chat.rs       # Chat facade
//! └── tests/
//! ```

pub mod error;
pub mod config;
pub mod request;
pub mod normalize;
pub mod polling;
pub mod client;
pub mod stream;
pub mod llm;
pub mod chat;

use serde::{Deserialize, Serialize};

pub use chat::{ChatResponse, ChatRunPod};
pub use client::JobClient;
pub use config::{ChatFormat, ModelParams, ResolvedConfig, RunPodConfig};
pub use error::{Error, ErrorKind};
pub use llm::RunPodLlm;
pub use request::{Completion, JobRequest, JobStatus, JobStatusResponse, ResponseMetadata};
pub use stream::{SimulatedStream, StreamChunk};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role
{   System
  , User
  , Assistant
}

impl Role
{   /// Label used when rendering a conversation into a prompt
    pub fn label(&self) -> &'static str
    {   match self
        {   Role::System => "System"
          , Role::User => "User"
          , Role::Assistant => "Assistant"
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Message
{   pub role: Role
  , pub content: String
}

impl Message
{   pub fn system(content: impl Into<String>) -> Self
    {   Message { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self
    {   Message { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self
    {   Message { role: Role::Assistant, content: content.into() }
    }
}
