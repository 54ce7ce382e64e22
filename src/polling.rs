//! Polling state machine shared by the blocking and async job drivers.
//!
//! The machine never touches the network or the clock. A driver feeds it the
//! submit response, then every status response, and does whatever [`Next`]
//! asks for. Both drivers therefore make the same decisions for the same
//! sequence of responses.

use log::{debug, trace, warn};

use crate::error::Error;
use crate::normalize::normalize;
use crate::request::{Completion, JobStatusResponse};

/// What the driver should do next
#[derive(Debug, Clone, PartialEq)]
pub enum Next
{   /// Stop and hand this result to the caller
    Finish(Result<Completion, Error>)
  , /// Sleep one poll interval, then fetch the status of `job_id`
    Poll
    {   job_id: String
      , attempt: u32
    }
}

/// Per job polling bookkeeping
#[derive(Debug, Clone)]
pub struct PollTracker
{   max_attempts: u32
  , attempts: u32
  , job_id: Option<String>
}

impl PollTracker
{   pub fn new(max_attempts: u32) -> Self
    {   PollTracker
        {   max_attempts
          , attempts: 0
          , job_id: None
        }
    }

    /// Status polls issued so far
    pub fn attempts(&self) -> u32
    {   self.attempts
    }

    pub fn job_id(&self) -> Option<&str>
    {   self.job_id.as_deref()
    }

    /// Feed the response of the submit call
    pub fn on_submitted(&mut self, response: JobStatusResponse) -> Next
    {   debug!(
          "Job {:?} submitted with status {}",
          response.id, response.status
        );

        if response.status.is_terminal()
        {   return Next::Finish(finish(response));
        }

        match response.id.clone().filter(|id| !id.is_empty())
        {   Some(job_id) => {
              self.job_id = Some(job_id);
              self.schedule()
            }
          , None => {
              warn!("Submit response has no job id: {:?}", response);
              Next::Finish(Err(Error::Parse(format!(
                "submit response with status {} has no job id",
                response.status
              ))))
            }
        }
    }

    /// Feed the response of one status poll
    pub fn on_polled(&mut self, response: JobStatusResponse) -> Next
    {   self.attempts += 1;
        trace!(
          "Poll {}/{} for job {:?}: {}",
          self.attempts, self.max_attempts, self.job_id, response.status
        );

        if response.status.is_terminal()
        {   return Next::Finish(finish(response));
        }

        self.schedule()
    }

    fn schedule(&self) -> Next
    {   let job_id = self.job_id.clone().unwrap_or_default();
        if self.attempts >= self.max_attempts
        {   warn!(
              "Job {} still running after {} polls",
              job_id, self.attempts
            );
            return Next::Finish(Err(Error::Timeout
            {   job_id
              , attempts: self.attempts
            }));
        }
        Next::Poll
        {   job_id
          , attempt: self.attempts + 1
        }
    }
}

fn finish(response: JobStatusResponse) -> Result<Completion, Error>
{   let text = normalize(&response)?;
    debug!(
      "Job {:?} completed with {} chars of output",
      response.id, text.len()
    );
    Ok(Completion
    {   job_id: response.id.clone()
      , text
      , response
    })
}

#[cfg(test)]
mod tests
{   use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn status(status: &str) -> JobStatusResponse
    {   serde_json::from_value(json!({"id": "job-7", "status": status}))
          .unwrap()
    }

    fn done(output: &str) -> JobStatusResponse
    {   serde_json::from_value(json!({
          "id": "job-7", "status": "COMPLETED", "output": output
        })).unwrap()
    }

    fn text_of(next: Next) -> String
    {   match next
        {   Next::Finish(Ok(completion)) => completion.text
          , other => panic!("expected completion, got {:?}", other)
        }
    }

    #[test]
    fn completed_submit_finishes_without_polling()
    {   let mut tracker = PollTracker::new(3);
        assert_eq!(text_of(tracker.on_submitted(done("hi"))), "hi");
        assert_eq!(tracker.attempts(), 0);
    }

    #[test]
    fn queued_submit_schedules_first_poll()
    {   let mut tracker = PollTracker::new(3);
        assert_eq!(
          tracker.on_submitted(status("IN_QUEUE")),
          Next::Poll { job_id: "job-7".to_string(), attempt: 1 }
        );
        assert_eq!(tracker.job_id(), Some("job-7"));
    }

    #[test]
    fn walks_through_lifecycle_to_completion()
    {   let mut tracker = PollTracker::new(5);
        tracker.on_submitted(status("IN_QUEUE"));
        assert_eq!(
          tracker.on_polled(status("IN_QUEUE")),
          Next::Poll { job_id: "job-7".to_string(), attempt: 2 }
        );
        assert_eq!(
          tracker.on_polled(status("IN_PROGRESS")),
          Next::Poll { job_id: "job-7".to_string(), attempt: 3 }
        );
        assert_eq!(text_of(tracker.on_polled(done("fin"))), "fin");
        assert_eq!(tracker.attempts(), 3);
    }

    #[test]
    fn unknown_status_keeps_polling()
    {   let mut tracker = PollTracker::new(3);
        tracker.on_submitted(status("IN_QUEUE"));
        assert!(matches!(
          tracker.on_polled(status("ERROR_MAYBE")),
          Next::Poll { attempt: 2, .. }
        ));
    }

    #[test]
    fn times_out_after_exactly_max_attempts()
    {   let mut tracker = PollTracker::new(3);
        let mut next = tracker.on_submitted(status("IN_PROGRESS"));
        let mut polls = 0;
        while let Next::Poll { .. } = next
        {   polls += 1;
            next = tracker.on_polled(status("IN_PROGRESS"));
        }
        assert_eq!(polls, 3);
        assert_eq!(
          next,
          Next::Finish(Err(Error::Timeout
          {   job_id: "job-7".to_string()
            , attempts: 3
          }))
        );
    }

    #[test]
    fn failure_status_finishes_with_job_failure()
    {   let mut tracker = PollTracker::new(3);
        tracker.on_submitted(status("IN_QUEUE"));
        let failed: JobStatusResponse = serde_json::from_value(json!({
          "id": "job-7", "status": "TIMED_OUT", "error": "worker lost"
        })).unwrap();
        match tracker.on_polled(failed)
        {   Next::Finish(Err(err)) => {
              assert_eq!(err.kind(), ErrorKind::JobFailure);
              assert!(err.to_string().contains("TIMED_OUT"));
              assert!(err.to_string().contains("worker lost"));
            }
          , other => panic!("unexpected {:?}", other)
        }
    }

    #[test]
    fn failed_submit_finishes_immediately()
    {   let mut tracker = PollTracker::new(3);
        assert!(matches!(
          tracker.on_submitted(status("CANCELLED")),
          Next::Finish(Err(Error::JobFailed { .. }))
        ));
    }

    #[test]
    fn non_terminal_submit_without_id_is_a_parse_error()
    {   let mut tracker = PollTracker::new(3);
        let response: JobStatusResponse
          = serde_json::from_value(json!({"status": "IN_QUEUE"})).unwrap();
        match tracker.on_submitted(response)
        {   Next::Finish(Err(Error::Parse(_))) => {}
          , other => panic!("unexpected {:?}", other)
        }
    }
}
