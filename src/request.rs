//! Job request and job status types for the RunPod serverless API

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ModelParams;
use crate::Message;

/// Body of `POST /{endpoint_id}/run`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRequest
{   pub input: JobInput
}

/// The `input` object handed to the worker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInput
{   #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>
  , #[serde(flatten)]
    pub params: ModelParams
}

impl JobRequest
{   pub fn prompt(prompt: impl Into<String>, params: ModelParams) -> Self
    {   JobRequest
        {   input: JobInput
            {   prompt: Some(prompt.into())
              , messages: None
              , params
            }
        }
    }

    pub fn messages(messages: Vec<Message>, params: ModelParams) -> Self
    {   JobRequest
        {   input: JobInput
            {   prompt: None
              , messages: Some(messages)
              , params
            }
        }
    }

    /// Per call stop sequences replace the configured ones
    pub fn with_stop(mut self, stop: Option<Vec<String>>) -> Self
    {   if stop.is_some()
        {   self.input.params.stop = stop;
        }
        self
    }
}

/// Lifecycle status reported by RunPod
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus
{   InQueue
  , InProgress
  , Completed
  , Failed
  , Cancelled
  , TimedOut
  , /// Anything undocumented; polled like IN_PROGRESS
    Other(String)
}

impl JobStatus
{   pub fn as_str(&self) -> &str
    {   match self
        {   JobStatus::InQueue => "IN_QUEUE"
          , JobStatus::InProgress => "IN_PROGRESS"
          , JobStatus::Completed => "COMPLETED"
          , JobStatus::Failed => "FAILED"
          , JobStatus::Cancelled => "CANCELLED"
          , JobStatus::TimedOut => "TIMED_OUT"
          , JobStatus::Other(s) => s
        }
    }

    /// FAILED, CANCELLED and TIMED_OUT only
    pub fn is_failure(&self) -> bool
    {   matches!(
          self,
          JobStatus::Failed | JobStatus::Cancelled | JobStatus::TimedOut
        )
    }

    pub fn is_terminal(&self) -> bool
    {   *self == JobStatus::Completed || self.is_failure()
    }
}

impl Default for JobStatus
{   fn default() -> Self
    {   JobStatus::Other(String::new())
    }
}

impl From<String> for JobStatus
{   fn from(s: String) -> Self
    {   match s.as_str()
        {   "IN_QUEUE" => JobStatus::InQueue
          , "IN_PROGRESS" => JobStatus::InProgress
          , "COMPLETED" => JobStatus::Completed
          , "FAILED" => JobStatus::Failed
          , "CANCELLED" => JobStatus::Cancelled
          , "TIMED_OUT" => JobStatus::TimedOut
          , _ => JobStatus::Other(s)
        }
    }
}

impl From<JobStatus> for String
{   fn from(status: JobStatus) -> Self
    {   status.as_str().to_string()
    }
}

impl fmt::Display for JobStatus
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.write_str(self.as_str())
    }
}

/// Body returned by both `/run` and `/status/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse
{   #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>
  , #[serde(default)]
    pub status: JobStatus
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>
  , /// delayTime, executionTime, workerId and friends
    #[serde(flatten)]
    pub extra: Map<String, Value>
}

impl JobStatusResponse
{   /// Backend error text; strings verbatim, anything else as JSON
    pub fn error_text(&self) -> Option<String>
    {   match &self.error
        {   None | Some(Value::Null) => None
          , Some(Value::String(s)) => Some(s.clone())
          , Some(other) => Some(other.to_string())
        }
    }

    fn extra_u64(&self, key: &str) -> Option<u64>
    {   self.extra.get(key).and_then(Value::as_u64)
    }
}

/// A finished job together with its normalized text
#[derive(Debug, Clone, PartialEq)]
pub struct Completion
{   pub job_id: Option<String>
  , pub text: String
  , pub response: JobStatusResponse
}

impl Completion
{   pub fn metadata(&self, model_name: Option<&str>) -> ResponseMetadata
    {   ResponseMetadata
        {   job_id: self.job_id.clone()
          , model_name: model_name.map(str::to_string)
          , delay_time: self.response.extra_u64("delayTime")
          , execution_time: self.response.extra_u64("executionTime")
          , raw_response: serde_json::to_value(&self.response)
              .unwrap_or(Value::Null)
        }
    }
}

/// Metadata attached to chat results and the last stream chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata
{   pub job_id: Option<String>
  , pub model_name: Option<String>
  , /// Milliseconds spent queued
    pub delay_time: Option<u64>
  , /// Milliseconds spent executing
    pub execution_time: Option<u64>
  , pub raw_response: Value
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    #[test]
    fn prompt_request_flattens_params_into_input()
    {   let params = ModelParams
        {   temperature: Some(0.1)
          , max_tokens: Some(10)
          , ..ModelParams::default()
        };
        let body = serde_json::to_value(JobRequest::prompt("Hi", params))
          .unwrap();
        assert_eq!(
          body,
          json!({"input": {"prompt": "Hi", "temperature": 0.1, "max_tokens": 10}})
        );
    }

    #[test]
    fn per_call_stop_overrides_configured_stop()
    {   let params = ModelParams
        {   stop: Some(vec!["###".to_string()])
          , ..ModelParams::default()
        };
        let kept = JobRequest::prompt("a", params.clone()).with_stop(None);
        assert_eq!(kept.input.params.stop, Some(vec!["###".to_string()]));

        let replaced = JobRequest::prompt("a", params)
          .with_stop(Some(vec!["\n".to_string()]));
        assert_eq!(replaced.input.params.stop, Some(vec!["\n".to_string()]));
    }

    #[test]
    fn statuses_parse_and_unknown_ones_are_kept()
    {   let parsed: JobStatusResponse = serde_json::from_value(json!({
          "id": "j1", "status": "IN_QUEUE", "delayTime": 12
        })).unwrap();
        assert_eq!(parsed.status, JobStatus::InQueue);
        assert_eq!(parsed.extra.get("delayTime"), Some(&json!(12)));

        let odd: JobStatusResponse = serde_json::from_value(json!({
          "id": "j1", "status": "THROTTLED"
        })).unwrap();
        assert_eq!(odd.status, JobStatus::Other("THROTTLED".to_string()));
        assert!(!odd.status.is_terminal());
        assert_eq!(serde_json::to_value(&odd).unwrap()["status"], "THROTTLED");
    }

    #[test]
    fn only_documented_failures_are_failures()
    {   for status in ["FAILED", "CANCELLED", "TIMED_OUT"]
        {   assert!(JobStatus::from(status.to_string()).is_failure());
        }
        for status in ["IN_QUEUE", "IN_PROGRESS", "COMPLETED", "ERROR", ""]
        {   assert!(!JobStatus::from(status.to_string()).is_failure());
        }
    }

    #[test]
    fn error_text_is_verbatim_for_strings()
    {   let response = JobStatusResponse
        {   error: Some(json!("Pod terminated"))
          , ..JobStatusResponse::default()
        };
        assert_eq!(response.error_text().as_deref(), Some("Pod terminated"));

        let structured = JobStatusResponse
        {   error: Some(json!({"code": 7}))
          , ..JobStatusResponse::default()
        };
        assert_eq!(structured.error_text().as_deref(), Some(r#"{"code":7}"#));
    }

    #[test]
    fn metadata_reads_timings_and_keeps_raw_response()
    {   let response: JobStatusResponse = serde_json::from_value(json!({
          "id": "j9", "status": "COMPLETED", "output": "ok",
          "delayTime": 120, "executionTime": 800
        })).unwrap();
        let completion = Completion
        {   job_id: response.id.clone()
          , text: "ok".to_string()
          , response
        };
        let meta = completion.metadata(Some("llama"));
        assert_eq!(meta.job_id.as_deref(), Some("j9"));
        assert_eq!(meta.model_name.as_deref(), Some("llama"));
        assert_eq!(meta.delay_time, Some(120));
        assert_eq!(meta.execution_time, Some(800));
        assert_eq!(meta.raw_response["output"], "ok");
    }
}
