//! Simulated streaming.
//!
//! RunPod jobs only hand back a final payload, so streaming callers get the
//! finished text replayed in small slices.

use async_stream::stream;
use futures::Stream;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::request::ResponseMetadata;

/// One piece of a streamed response.
/// Only the last chunk carries metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk
{   pub text: String
  , pub metadata: Option<ResponseMetadata>
}

/// Finite, one-shot iterator over slices of a finished text
#[derive(Debug, Clone)]
pub struct SimulatedStream
{   text: String
  , offset: usize
  , chunk_chars: usize
  , metadata: Option<ResponseMetadata>
  , finished: bool
}

/// Replay `full_text` as chunks of `chunk_chars` characters.
///
/// Slices never exceed half the text, so anything longer than one
/// character arrives in at least two chunks.
pub fn simulate_stream(
  full_text: impl Into<String>
, chunk_chars: usize
) -> SimulatedStream
{   let text = full_text.into();
    let half = (text.chars().count() / 2).max(1);
    debug!("Simulating stream over {} bytes", text.len());
    SimulatedStream
    {   text
      , offset: 0
      , chunk_chars: chunk_chars.clamp(1, half)
      , metadata: None
      , finished: false
    }
}

impl SimulatedStream
{   /// Attach metadata to the final chunk
    pub fn with_metadata(mut self, metadata: ResponseMetadata) -> Self
    {   self.metadata = Some(metadata);
        self
    }

    /// Byte offset just past the next `chunk_chars` characters
    fn next_boundary(&self) -> usize
    {   self.text[self.offset..]
          .char_indices()
          .nth(self.chunk_chars)
          .map(|(i, _)| self.offset + i)
          .unwrap_or(self.text.len())
    }
}

impl Iterator for SimulatedStream
{   type Item = StreamChunk;

    fn next(&mut self) -> Option<StreamChunk>
    {   if self.finished
        {   return None;
        }

        // Empty text still delivers metadata, in one empty chunk
        if self.text.is_empty()
        {   self.finished = true;
            return self.metadata.take().map(|metadata| StreamChunk
            {   text: String::new()
              , metadata: Some(metadata)
            });
        }

        let end = self.next_boundary();
        let text = self.text[self.offset..end].to_string();
        self.offset = end;

        let metadata = if self.offset >= self.text.len()
        {   self.finished = true;
            self.metadata.take()
        } else
        {   None
        };

        Some(StreamChunk { text, metadata })
    }
}

/// Async replay of `chunks`. Yields to the scheduler before every chunk and
/// stops with [`Error::Cancelled`] once `cancel` fires.
pub fn simulate_stream_async(
  chunks: SimulatedStream
, cancel: CancellationToken
) -> impl Stream<Item = Result<StreamChunk, Error>>
{   stream!
    {   for chunk in chunks
        {   tokio::task::yield_now().await;
            if cancel.is_cancelled()
            {   info!("Simulated stream cancelled");
                yield Err(Error::Cancelled { job_id: None });
                return;
            }
            yield Ok(chunk);
        }
    }
}
