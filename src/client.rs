use log::{debug, error, info, trace};
use once_cell::sync::OnceCell;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::config::{ResolvedConfig, RunPodConfig};
use crate::error::Error;
use crate::polling::{Next, PollTracker};
use crate::request::{Completion, JobRequest, JobStatusResponse};

/// Submits jobs to one RunPod endpoint and waits for their results.
///
/// The blocking and async drivers run the same [`PollTracker`], so they
/// agree on every outcome. HTTP clients are built on first use and reused
/// for the lifetime of the `JobClient`.
pub struct JobClient
{   config: ResolvedConfig
  , http: OnceCell<reqwest::Client>
  , blocking_http: OnceCell<reqwest::blocking::Client>
}

impl JobClient
{   /// Validate `config` and build a client. Fails before any network I/O
    /// when the credential or endpoint is missing.
    pub fn new(config: &RunPodConfig) -> Result<Self, Error>
    {   Ok(JobClient::from_resolved(config.resolve()?))
    }

    /// Like [`new`](Self::new), reading environment fallbacks through
    /// `lookup` instead of the process environment
    pub fn new_with_env<F>(config: &RunPodConfig, lookup: F) -> Result<Self, Error>
    where F: Fn(&str) -> Option<String>
    {   Ok(JobClient::from_resolved(config.resolve_with(lookup)?))
    }

    pub fn from_resolved(config: ResolvedConfig) -> Self
    {   debug!("Creating JobClient for endpoint {}", config.endpoint_id);
        JobClient
        {   config
          , http: OnceCell::new()
          , blocking_http: OnceCell::new()
        }
    }

    pub fn config(&self) -> &ResolvedConfig
    {   &self.config
    }

    fn run_url(&self) -> String
    {   format!("{}/{}/run", self.config.api_base, self.config.endpoint_id)
    }

    fn status_url(&self, job_id: &str) -> String
    {   format!(
          "{}/{}/status/{}",
          self.config.api_base, self.config.endpoint_id, job_id
        )
    }

    fn cancel_url(&self, job_id: &str) -> String
    {   format!(
          "{}/{}/cancel/{}",
          self.config.api_base, self.config.endpoint_id, job_id
        )
    }

    fn auth_header(&self) -> String
    {   format!("Bearer {}", self.config.api_key)
    }

    // ===== Async driver =====

    fn http(&self) -> Result<&reqwest::Client, Error>
    {   self.http.get_or_try_init(|| {
          debug!("Building async HTTP client");
          reqwest::Client::builder()
            .timeout(self.config.timeout)
            .build()
            .map_err(Error::from)
        })
    }

    /// Submit `request` and wait for the job to finish
    pub async fn submit_and_wait(
      &self
    , request: &JobRequest
    ) -> Result<Completion, Error>
    {   self.submit_and_wait_cancellable(request, &CancellationToken::new())
          .await
    }

    /// Like [`submit_and_wait`](Self::submit_and_wait), giving up with
    /// [`Error::Cancelled`] as soon as `cancel` fires
    pub async fn submit_and_wait_cancellable(
      &self
    , request: &JobRequest
    , cancel: &CancellationToken
    ) -> Result<Completion, Error>
    {   let submitted = tokio::select!
        {   biased;
            _ = cancel.cancelled() => {
              info!("Cancelled before submit completed");
              return Err(Error::Cancelled { job_id: None });
            }
          , response = self.submit(request) => response?
        };

        let mut tracker = PollTracker::new(self.config.max_polling_attempts);
        let mut next = tracker.on_submitted(submitted);

        loop
        { match next
          {   Next::Finish(result) => return result
            , Next::Poll { job_id, attempt } => {
                let response = tokio::select!
                {   biased;
                    _ = cancel.cancelled() => {
                      info!("Polling for job {} cancelled", job_id);
                      return Err(Error::Cancelled { job_id: Some(job_id.clone()) });
                    }
                  , response = self.wait_and_poll(&job_id, attempt) => response?
                };
                next = tracker.on_polled(response);
              }
          }
        }
    }

    async fn submit(
      &self
    , request: &JobRequest
    ) -> Result<JobStatusResponse, Error>
    {   let url = self.run_url();
        debug!("Submitting job to {}", url);
        trace!("Job request: {:?}", request);

        let response = self.http()?
          .post(&url)
          .header("Authorization", self.auth_header())
          .header("Content-Type", "application/json")
          .json(request)
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error submitting job: {}", e);
            Error::from(e)
          })?;

        let status = response.status();
        let body = response.text().await?;
        decode_status(status, &body)
    }

    async fn wait_and_poll(
      &self
    , job_id: &str
    , attempt: u32
    ) -> Result<JobStatusResponse, Error>
    {   tokio::time::sleep(self.config.poll_interval).await;
        self.fetch_status(job_id, attempt).await
    }

    async fn fetch_status(
      &self
    , job_id: &str
    , attempt: u32
    ) -> Result<JobStatusResponse, Error>
    {   trace!("Polling job {} (attempt {})", job_id, attempt);

        let response = self.http()?
          .get(self.status_url(job_id))
          .header("Authorization", self.auth_header())
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error polling job {}: {}", job_id, e);
            Error::from(e)
          })?;

        let status = response.status();
        let body = response.text().await?;
        decode_status(status, &body)
    }

    /// Ask RunPod to cancel a queued or running job
    pub async fn cancel_job(
      &self
    , job_id: &str
    ) -> Result<JobStatusResponse, Error>
    {   info!("Cancelling job {}", job_id);

        let response = self.http()?
          .post(self.cancel_url(job_id))
          .header("Authorization", self.auth_header())
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error cancelling job {}: {}", job_id, e);
            Error::from(e)
          })?;

        let status = response.status();
        let body = response.text().await?;
        decode_status(status, &body)
    }

    // ===== Blocking driver =====

    fn blocking_http(&self) -> Result<&reqwest::blocking::Client, Error>
    {   self.blocking_http.get_or_try_init(|| {
          debug!("Building blocking HTTP client");
          reqwest::blocking::Client::builder()
            .timeout(self.config.timeout)
            .build()
            .map_err(Error::from)
        })
    }

    /// Blocking twin of [`submit_and_wait`](Self::submit_and_wait).
    /// Returns [`Error::Configuration`] without touching the network when
    /// called from inside an async runtime.
    pub fn submit_and_wait_blocking(
      &self
    , request: &JobRequest
    ) -> Result<Completion, Error>
    {   if tokio::runtime::Handle::try_current().is_ok()
        {   error!("Blocking RunPod call made from inside an async runtime");
            return Err(Error::Configuration(
              "blocking RunPod calls cannot run inside an async runtime, use the async methods"
                .to_string()
            ));
        }
        let submitted = self.submit_blocking(request)?;

        let mut tracker = PollTracker::new(self.config.max_polling_attempts);
        let mut next = tracker.on_submitted(submitted);

        loop
        { match next
          {   Next::Finish(result) => return result
            , Next::Poll { job_id, attempt } => {
                std::thread::sleep(self.config.poll_interval);
                let response = self.fetch_status_blocking(&job_id, attempt)?;
                next = tracker.on_polled(response);
              }
          }
        }
    }

    fn submit_blocking(
      &self
    , request: &JobRequest
    ) -> Result<JobStatusResponse, Error>
    {   let url = self.run_url();
        debug!("Submitting job to {} (blocking)", url);
        trace!("Job request: {:?}", request);

        let response = self.blocking_http()?
          .post(&url)
          .header("Authorization", self.auth_header())
          .header("Content-Type", "application/json")
          .json(request)
          .send()
          .map_err(|e| {
            error!("HTTP error submitting job: {}", e);
            Error::from(e)
          })?;

        let status = response.status();
        let body = response.text()?;
        decode_status(status, &body)
    }

    fn fetch_status_blocking(
      &self
    , job_id: &str
    , attempt: u32
    ) -> Result<JobStatusResponse, Error>
    {   trace!("Polling job {} (attempt {}, blocking)", job_id, attempt);

        let response = self.blocking_http()?
          .get(self.status_url(job_id))
          .header("Authorization", self.auth_header())
          .send()
          .map_err(|e| {
            error!("HTTP error polling job {}: {}", job_id, e);
            Error::from(e)
          })?;

        let status = response.status();
        let body = response.text()?;
        decode_status(status, &body)
    }
}

/// Turn an HTTP status and body into a job status, failing fast on non-2xx
fn decode_status(
  status: StatusCode
, body: &str
) -> Result<JobStatusResponse, Error>
{   trace!("RunPod response status: {}", status);

    if !status.is_success()
    {   error!("RunPod API error {}: {}", status, body);
        return Err(Error::Http
        {   status: status.as_u16()
          , body: body.to_string()
        });
    }

    serde_json::from_str(body).map_err(|e| {
      error!("Unparseable RunPod response: {}", e);
      Error::Parse(format!("invalid job status body: {}", e))
    })
}
