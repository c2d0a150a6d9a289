use crate::config::RemoteConfig;
use crate::error::RelayError;
use crate::metrics::{counters, histograms};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// A forward that failed at the transport level.
///
/// Carried back to the client verbatim as the `remoteError` payload.
#[derive(Error, Debug)]
#[error("{method} {url} failed: {source}")]
pub struct ForwardError {
    method: Method,
    url: String,
    #[source]
    source: reqwest::Error,
}

/// Outcome of one forward attempt.
pub type ForwardOutcome = Result<(), ForwardError>;

/// Relays buffers to the fixed upstream endpoint, one request per buffer.
///
/// No retry, no backoff, no queueing: each buffer is forwarded at most once,
/// best-effort, and dropped afterwards.
#[derive(Clone)]
pub struct Forwarder {
    http: Client,
    method: Method,
    url: String,
}

impl Forwarder {
    /// Build a forwarder for the given remote target.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed or the
    /// configured method is not a valid HTTP method.
    pub fn new(remote: &RemoteConfig) -> Result<Self, RelayError> {
        let method = remote
            .method
            .to_ascii_uppercase()
            .parse::<Method>()
            .map_err(|_| RelayError::InvalidMethod(remote.method.clone()))?;
        Ok(Self {
            http: Client::builder().build()?,
            method,
            url: remote.url(),
        })
    }

    /// Spawn one forward; the outcome is reported on `outcome_tx` when the
    /// upstream call completes, never before.
    pub fn spawn(&self, buffer: Value, outcome_tx: mpsc::Sender<ForwardOutcome>) {
        let this = self.clone();
        tokio::spawn(async move {
            let outcome = this.forward(&buffer).await;
            match &outcome {
                Ok(()) => counters::forwards_total("success"),
                Err(e) => {
                    counters::forwards_total("error");
                    error!("{}", e);
                }
            }
            if outcome_tx.send(outcome).await.is_err() {
                debug!("client gone before forward outcome could be delivered");
            }
        });
    }

    /// Issue one upstream request with the buffer as JSON body.
    ///
    /// The response body is not read and the HTTP status is only logged:
    /// a request that completes at the transport level counts as success.
    ///
    /// # Errors
    ///
    /// Returns a [`ForwardError`] if the request fails at the transport level.
    pub async fn forward(&self, buffer: &Value) -> ForwardOutcome {
        debug!("attempting {} to remote at {}", self.method, self.url);
        let started = Instant::now();
        let result = self
            .http
            .request(self.method.clone(), &self.url)
            .json(buffer)
            .send()
            .await;
        histograms::forward_latency_seconds(started.elapsed().as_secs_f64());
        match result {
            Ok(resp) => {
                debug!(status = %resp.status(), "request accepted by remote");
                Ok(())
            }
            Err(source) => Err(ForwardError {
                method: self.method.clone(),
                url: self.url.clone(),
                source,
            }),
        }
    }
}
