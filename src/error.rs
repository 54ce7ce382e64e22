use thiserror::Error;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind
{   Configuration
  , Transport
  , JobFailure
  , Timeout
  , Cancelled
}

/// Error type for every RunPod adapter operation.
/// Implements Clone so results can be compared and fanned out
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error
{   /// Missing credential, endpoint or out-of-range setting
    #[error("Invalid configuration: {0}")]
    Configuration(String)
  , /// API answered with a non-2xx status
    #[error("RunPod API request failed with status {status}: {body}")]
    Http
    {   status: u16
      , body: String
    }
  , /// Connection failure, request timeout or body read failure
    #[error("HTTP error: {0}")]
    Transport(String)
  , /// Response body was not a job status document
    #[error("Parse error: {0}")]
    Parse(String)
  , /// Job reached a status other than COMPLETED
    #[error("RunPod job ended with status {status}{}", format_detail(.error))]
    JobFailed
    {   job_id: Option<String>
      , status: String
      , error: Option<String>
    }
  , /// Polling attempts exhausted
    #[error("RunPod job {job_id} did not finish after {attempts} polling attempts")]
    Timeout
    {   job_id: String
      , attempts: u32
    }
  , #[error("RunPod job cancelled{}", format_job(.job_id))]
    Cancelled
    {   job_id: Option<String>
    }
}

fn format_detail(error: &Option<String>) -> String
{   match error
    {   Some(text) => format!(". Error: {}", text)
      , None => String::new()
    }
}

fn format_job(job_id: &Option<String>) -> String
{   match job_id
    {   Some(id) => format!(" ({})", id)
      , None => String::new()
    }
}

impl Error
{   pub fn kind(&self) -> ErrorKind
    {   match self
        {   Error::Configuration(_) => ErrorKind::Configuration
          , Error::Http { .. }
          | Error::Transport(_)
          | Error::Parse(_) => ErrorKind::Transport
          , Error::JobFailed { .. } => ErrorKind::JobFailure
          , Error::Timeout { .. } => ErrorKind::Timeout
          , Error::Cancelled { .. } => ErrorKind::Cancelled
        }
    }
}

impl From<reqwest::Error> for Error
{   fn from(e: reqwest::Error) -> Self
    {   if e.is_timeout()
        {   Error::Transport(format!("request timed out: {}", e))
        } else
        {   Error::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error
{   fn from(e: serde_json::Error) -> Self
    {   Error::Parse(e.to_string())
    }
}
