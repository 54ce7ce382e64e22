//! Chat facade: a conversation in, an assistant message out

use async_stream::stream;
use futures::{Stream, StreamExt};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::client::JobClient;
use crate::config::{ChatFormat, RunPodConfig};
use crate::error::Error;
use crate::request::{Completion, JobRequest, ResponseMetadata};
use crate::stream::{simulate_stream, simulate_stream_async, SimulatedStream, StreamChunk};
use crate::Message;

/// Assistant reply plus what RunPod reported about the job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse
{   pub message: Message
  , pub response_metadata: ResponseMetadata
}

/// A RunPod endpoint used as a chat model.
/// Every call submits exactly one job.
pub struct ChatRunPod
{   client: JobClient
}

/// Render a conversation as `Role: content` lines ending in an assistant cue
pub fn format_prompt(messages: &[Message]) -> String
{   let mut prompt = String::new();
    for message in messages
    {   prompt.push_str(message.role.label());
        prompt.push_str(": ");
        prompt.push_str(&message.content);
        prompt.push('\n');
    }
    prompt.push_str(crate::Role::Assistant.label());
    prompt.push(':');
    prompt
}

impl ChatRunPod
{   pub fn new(config: &RunPodConfig) -> Result<Self, Error>
    {   Ok(ChatRunPod::from_client(JobClient::new(config)?))
    }

    pub fn from_client(client: JobClient) -> Self
    {   ChatRunPod { client }
    }

    pub fn client(&self) -> &JobClient
    {   &self.client
    }

    fn request(&self, messages: &[Message]) -> JobRequest
    {   let config = self.client.config();
        match config.chat_format
        {   ChatFormat::Prompt => JobRequest::prompt(
              format_prompt(messages),
              config.params.clone()
            )
          , ChatFormat::Messages => JobRequest::messages(
              messages.to_vec(),
              config.params.clone()
            )
        }
    }

    fn metadata(&self, completion: &Completion) -> ResponseMetadata
    {   completion.metadata(self.client.config().model_name.as_deref())
    }

    fn respond(&self, completion: Completion) -> ChatResponse
    {   ChatResponse
        {   response_metadata: self.metadata(&completion)
          , message: Message::assistant(completion.text)
        }
    }

    fn chunks(&self, completion: Completion) -> SimulatedStream
    {   let metadata = self.metadata(&completion);
        simulate_stream(
          completion.text,
          self.client.config().stream_chunk_chars
        ).with_metadata(metadata)
    }

    // ===== Blocking =====
    // Not usable from an async runtime, see `JobClient::submit_and_wait_blocking`.

    pub fn invoke(&self, messages: &[Message]) -> Result<ChatResponse, Error>
    {   debug!("ChatRunPod invoke with {} messages", messages.len());
        let completion = self.client
          .submit_and_wait_blocking(&self.request(messages))?;
        Ok(self.respond(completion))
    }

    pub fn stream(&self, messages: &[Message]) -> Result<SimulatedStream, Error>
    {   let completion = self.client
          .submit_and_wait_blocking(&self.request(messages))?;
        Ok(self.chunks(completion))
    }

    // ===== Async =====

    pub async fn ainvoke(
      &self
    , messages: &[Message]
    ) -> Result<ChatResponse, Error>
    {   debug!("ChatRunPod ainvoke with {} messages", messages.len());
        let completion = self.client
          .submit_and_wait(&self.request(messages))
          .await?;
        Ok(self.respond(completion))
    }

    pub fn astream<'a>(
      &'a self
    , messages: &'a [Message]
    ) -> impl Stream<Item = Result<StreamChunk, Error>> + 'a
    {   self.astream_cancellable(messages, CancellationToken::new())
    }

    pub fn astream_cancellable<'a>(
      &'a self
    , messages: &'a [Message]
    , cancel: CancellationToken
    ) -> impl Stream<Item = Result<StreamChunk, Error>> + 'a
    {   stream!
        {   let request = self.request(messages);
            let completion = match self.client
              .submit_and_wait_cancellable(&request, &cancel)
              .await
            {   Ok(completion) => completion
              , Err(e) => {
                  yield Err(e);
                  return;
                }
            };
            let chunks = simulate_stream_async(self.chunks(completion), cancel);
            futures::pin_mut!(chunks);
            while let Some(chunk) = chunks.next().await
            {   yield chunk;
            }
        }
    }
}
