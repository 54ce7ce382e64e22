//! Text completion facade: one prompt in, one string out

use async_stream::stream;
use futures::{Stream, StreamExt};
use log::debug;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::client::JobClient;
use crate::config::RunPodConfig;
use crate::error::Error;
use crate::request::{Completion, JobRequest};
use crate::stream::{simulate_stream, simulate_stream_async, SimulatedStream, StreamChunk};

/// A RunPod endpoint used as a plain text language model.
/// Every call submits exactly one job.
pub struct RunPodLlm
{   client: JobClient
}

impl RunPodLlm
{   pub fn new(config: &RunPodConfig) -> Result<Self, Error>
    {   Ok(RunPodLlm::from_client(JobClient::new(config)?))
    }

    pub fn from_client(client: JobClient) -> Self
    {   RunPodLlm { client }
    }

    pub fn client(&self) -> &JobClient
    {   &self.client
    }

    pub fn llm_type(&self) -> &'static str
    {   "runpod"
    }

    /// Parameters that identify this model instance
    pub fn identifying_params(&self) -> Value
    {   let config = self.client.config();
        json!({
          "endpoint_id": config.endpoint_id,
          "model_name": config.model_name,
          "params": config.params,
        })
    }

    fn request(&self, prompt: &str, stop: Option<Vec<String>>) -> JobRequest
    {   JobRequest::prompt(prompt, self.client.config().params.clone())
          .with_stop(stop)
    }

    fn chunks(&self, completion: Completion) -> SimulatedStream
    {   let config = self.client.config();
        let metadata = completion.metadata(config.model_name.as_deref());
        simulate_stream(completion.text, config.stream_chunk_chars)
          .with_metadata(metadata)
    }

    // ===== Blocking =====
    // These must not be called from an async runtime; they return a
    // configuration error there. Use the `a*` methods instead.

    pub fn invoke(&self, prompt: &str) -> Result<String, Error>
    {   self.call(prompt, None)
    }

    pub fn call(
      &self
    , prompt: &str
    , stop: Option<Vec<String>>
    ) -> Result<String, Error>
    {   debug!("RunPodLlm call");
        self.client
          .submit_and_wait_blocking(&self.request(prompt, stop))
          .map(|completion| completion.text)
    }

    /// Run the job, then replay its text as chunks
    pub fn stream(&self, prompt: &str) -> Result<SimulatedStream, Error>
    {   let completion = self.client
          .submit_and_wait_blocking(&self.request(prompt, None))?;
        Ok(self.chunks(completion))
    }

    /// One job per prompt, one after another
    pub fn generate(&self, prompts: &[&str]) -> Vec<Result<String, Error>>
    {   prompts.iter().map(|prompt| self.invoke(prompt)).collect()
    }

    // ===== Async =====

    pub async fn ainvoke(&self, prompt: &str) -> Result<String, Error>
    {   self.acall(prompt, None).await
    }

    pub async fn acall(
      &self
    , prompt: &str
    , stop: Option<Vec<String>>
    ) -> Result<String, Error>
    {   debug!("RunPodLlm acall");
        self.client
          .submit_and_wait(&self.request(prompt, stop))
          .await
          .map(|completion| completion.text)
    }

    pub fn astream<'a>(
      &'a self
    , prompt: &'a str
    ) -> impl Stream<Item = Result<StreamChunk, Error>> + 'a
    {   self.astream_cancellable(prompt, CancellationToken::new())
    }

    /// Async stream that stops between polls or chunks once `cancel` fires
    pub fn astream_cancellable<'a>(
      &'a self
    , prompt: &'a str
    , cancel: CancellationToken
    ) -> impl Stream<Item = Result<StreamChunk, Error>> + 'a
    {   stream!
        {   let request = self.request(prompt, None);
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

    /// One job per prompt, all in flight at once
    pub async fn agenerate(&self, prompts: &[&str]) -> Vec<Result<String, Error>>
    {   futures::future::join_all(
          prompts.iter().map(|prompt| self.ainvoke(prompt))
        ).await
    }
}
