//! HTTP output: buffers entries and ships them as JSON with retry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lumber_entry::Entry;
use lumber_operator::buffer::{Buffer, BufferConfig, Clearer};
use lumber_operator::config::{BuildContext, OperatorBuilder};
use lumber_operator::error::{BuildError, FlushError, OperatorError, ProcessError};
use lumber_operator::flusher::{Flusher, FlusherConfig};
use lumber_operator::helper::{OutputConfig, OutputOperator};
use lumber_operator::operator::Operator;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Configuration of the `http_output` operator.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpOutputConfig {
    /// Output archetype fields.
    #[serde(flatten)]
    pub output: OutputConfig,
    /// Where chunks are POSTed, as a JSON array of entries.
    pub endpoint: String,
    /// Extra request headers (e.g. an authorization token).
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Per-request timeout.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Probe the endpoint during start and fail fast if unreachable.
    #[serde(default)]
    pub test_connection: bool,
    /// Buffer bounds.
    #[serde(default)]
    pub buffer: BufferConfig,
    /// Flusher concurrency and backoff ceiling.
    #[serde(default)]
    pub flusher: FlusherConfig,
}

impl OperatorBuilder for HttpOutputConfig {
    fn id(&self) -> &str {
        self.output.id()
    }

    fn operator_type(&self) -> &str {
        self.output.operator_type()
    }

    fn output_ids(&self) -> Vec<String> {
        Vec::new()
    }

    fn set_namespace(&mut self, namespace: &str, exclusions: &[String]) {
        self.output.set_namespace(namespace, exclusions);
    }

    fn build(&self, context: &BuildContext) -> Result<Arc<dyn Operator>, BuildError> {
        let endpoint = Url::parse(&self.endpoint).map_err(|err| BuildError::InvalidConfig {
            id: self.id().to_string(),
            message: format!("`endpoint` is not a valid URL: {err}"),
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|err| BuildError::InvalidConfig {
                    id: self.id().to_string(),
                    message: format!("invalid header name `{name}`: {err}"),
                })?;
            let value = HeaderValue::from_str(value).map_err(|err| BuildError::InvalidConfig {
                id: self.id().to_string(),
                message: format!("invalid value for header `{name}`: {err}"),
            })?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|err| BuildError::InvalidConfig {
                id: self.id().to_string(),
                message: format!("failed to build HTTP client: {err}"),
            })?;

        let cancellation = context.cancellation.child_token();
        let flusher = self.flusher.build(&cancellation);
        Ok(Arc::new(HttpOutput {
            output: self.output.build()?,
            buffer: self.buffer.build(self.id())?,
            flusher,
            client,
            endpoint,
            headers,
            test_connection: self.test_connection,
            cancellation,
            tracker: TaskTracker::new(),
        }))
    }
}

/// The `http_output` operator.
///
/// `process` only enqueues; a background task reads chunks from the
/// buffer and submits delivery thunks to the flusher. Delivery never
/// happens on the caller's task.
pub struct HttpOutput {
    output: OutputOperator,
    buffer: Arc<dyn Buffer>,
    flusher: Flusher,
    client: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
    test_connection: bool,
    cancellation: CancellationToken,
    tracker: TaskTracker,
}

/// Whether a response status is worth retrying.
///
/// Server errors, timeouts, and throttling are transient; any other
/// non-success response will not improve on retry and is dead-lettered.
fn status_is_retriable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

impl HttpOutput {
    /// The resident entries the buffer still holds.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Probe the endpoint with an empty chunk.
    async fn probe(&self) -> Result<(), String> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .json(&Vec::<Entry>::new())
            .send()
            .await
            .map_err(|err| err.to_string())?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("unexpected status {status}"))
        }
    }

    /// Ship one chunk, classifying the outcome for the flusher.
    async fn ship(
        client: reqwest::Client,
        endpoint: Url,
        headers: HeaderMap,
        operator_id: &str,
        entries: &[Entry],
        clearer: &Mutex<Box<dyn Clearer>>,
        token: &CancellationToken,
    ) -> Result<(), FlushError> {
        let request = client
            .post(endpoint)
            .headers(headers)
            .json(&entries)
            .send();
        let response = tokio::select! {
            response = request => response,
            _ = token.cancelled() => return Err(FlushError::new("cancelled")),
        };

        let response = match response {
            Ok(response) => response,
            // Connection and timeout failures are transient.
            Err(err) => return Err(FlushError::new(format!("request failed: {err}"))),
        };

        let status = response.status();
        if status.is_success() {
            let mut clearer = clearer.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(err) = clearer.mark_all_as_flushed() {
                error!(operator_id, error = %err, "failed to mark chunk as flushed");
            }
            return Ok(());
        }
        if status_is_retriable(status) {
            return Err(FlushError::new(format!("retriable status {status}")));
        }

        // The endpoint rejected the payload; retrying cannot help.
        // Dead-letter the chunk so delivery makes progress.
        warn!(
            operator_id,
            status = status.as_u16(),
            entries = entries.len(),
            "endpoint rejected chunk, dropping it",
        );
        let mut clearer = clearer.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(err) = clearer.mark_all_as_flushed() {
            error!(operator_id, error = %err, "failed to mark rejected chunk as flushed");
        }
        Ok(())
    }
}

#[async_trait]
impl Operator for HttpOutput {
    fn id(&self) -> &str {
        self.output.id()
    }

    fn operator_type(&self) -> &str {
        self.output.operator_type()
    }

    fn can_output(&self) -> bool {
        false
    }

    fn outputs(&self) -> Vec<Arc<dyn Operator>> {
        Vec::new()
    }

    fn set_outputs(&self, outputs: Vec<Arc<dyn Operator>>) -> Result<(), BuildError> {
        if outputs.is_empty() {
            return Ok(());
        }
        self.output.refuse_outputs()
    }

    fn can_process(&self) -> bool {
        true
    }

    /// Enqueue the entry. Never performs network I/O.
    async fn process(&self, ctx: &CancellationToken, entry: Entry) -> Result<(), ProcessError> {
        self.buffer.add(ctx, entry).await?;
        Ok(())
    }

    async fn start(&self) -> Result<(), OperatorError> {
        if self.test_connection {
            self.probe().await.map_err(|message| OperatorError::StartFailed {
                id: self.id().to_string(),
                message: format!("connection test failed: {message}"),
            })?;
        }

        let buffer = Arc::clone(&self.buffer);
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let headers = self.headers.clone();
        let operator_id = self.id().to_string();
        let token = self.cancellation.clone();
        let flusher = self.flusher.clone();
        self.tracker.spawn(async move {
            loop {
                let (entries, clearer) = match buffer.read_chunk(&token).await {
                    Ok(chunk) => chunk,
                    Err(_) => break,
                };
                debug!(operator_id = %operator_id, entries = entries.len(), "chunk read");
                let clearer = Arc::new(Mutex::new(clearer));
                let client = client.clone();
                let endpoint = endpoint.clone();
                let headers = headers.clone();
                let operator_id = operator_id.clone();
                flusher.flush(move |token| {
                    let client = client.clone();
                    let endpoint = endpoint.clone();
                    let headers = headers.clone();
                    let operator_id = operator_id.clone();
                    let entries = entries.clone();
                    let clearer = Arc::clone(&clearer);
                    async move {
                        HttpOutput::ship(
                            client,
                            endpoint,
                            headers,
                            &operator_id,
                            &entries,
                            &clearer,
                            &token,
                        )
                        .await
                    }
                });
            }
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), OperatorError> {
        self.cancellation.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.flusher.stop().await;
        Ok(())
    }
}
