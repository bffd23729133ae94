//! Chunked-context query dispatcher.
//!
//! [`Dispatcher::dispatch`] splits a context into overlapping windows
//! (see [`crate::chunk`]), sends one request per window through the chunk
//! worker pool, and parses each answer. Per-window failures never fail the
//! batch: every window ends up in the [`DispatchReport`] as succeeded,
//! skipped or failed, and only the successful results are returned as data.
//!
//! ```text
//! context ──▶ windows ──▶ pool (≤ N in flight) ──▶ POST ──▶ unmark ──▶ parse
//!                 │                                                    │
//!                 └── < 20 chars: skipped            report ◀──────────┘
//! ```

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::chunk::{chunk_windows, ContextWindow};
use crate::config::DispatchConfig;
use crate::llm::{ChunkFailure, LlmClient};
use crate::parse::{extract_text, parse_structured};
use crate::pool::{PoolError, WorkerPool};
use crate::request::{ApiType, ChunkRequest, ResponseFormat, UnsupportedApiType};

/// Errors that abort a whole batch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    UnsupportedApiType(#[from] UnsupportedApiType),
    #[error("chunk_size must be > 0")]
    ZeroChunkSize,
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Per-call dispatch settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchOptions {
    pub api_type: ApiType,
    pub format: ResponseFormat,
    pub chunk_size: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            api_type: ApiType::Generate,
            format: ResponseFormat::Json,
            chunk_size: 1024,
        }
    }
}

impl DispatchOptions {
    pub fn from_config(config: &DispatchConfig) -> anyhow::Result<Self> {
        Ok(Self {
            api_type: config.api_type.parse()?,
            format: config.format.parse()?,
            chunk_size: config.chunk_size,
        })
    }
}

/// One successful window result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChunkOutput {
    /// Parsed object, when the format is `json`.
    Record(Map<String, Value>),
    /// Normalized answer text, when the format is `none`.
    Text(String),
}

impl ChunkOutput {
    pub fn as_record(&self) -> Option<&Map<String, Value>> {
        match self {
            ChunkOutput::Record(map) => Some(map),
            ChunkOutput::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkStatus {
    Succeeded,
    Skipped,
    Failed(ChunkFailure),
}

/// What happened to one window.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutcome {
    pub index: usize,
    pub chars: usize,
    pub status: ChunkStatus,
}

/// Results plus a per-window account of the batch.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Successful results in completion order.
    pub results: Vec<ChunkOutput>,
    pub outcomes: Vec<ChunkOutcome>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, ChunkStatus::Succeeded))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ChunkStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ChunkStatus::Failed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &ChunkFailure)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            ChunkStatus::Failed(f) => Some((o.index, f)),
            _ => None,
        })
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: DispatchReport) {
        self.results.extend(other.results);
        self.outcomes.extend(other.outcomes);
    }

    fn count(&self, pred: impl Fn(&ChunkStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Fans chunk requests out over the chunk pool.
#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<LlmClient>,
    pool: WorkerPool,
}

impl Dispatcher {
    pub fn new(client: Arc<LlmClient>, pool: WorkerPool) -> Self {
        Self { client, pool }
    }

    pub fn client(&self) -> &LlmClient {
        &self.client
    }

    /// Run `instruction` over every window of `context`.
    ///
    /// # Errors
    ///
    /// Only batch-level problems are errors: an API type that produces no
    /// text, a zero `chunk_size`, or a closed pool. `embeddings` is a known
    /// endpoint, but its answers are vectors rather than text, so it is
    /// refused here and served by [`crate::embedding::embed`] instead.
    /// Window failures are reported in the returned [`DispatchReport`].
    pub async fn dispatch(
        &self,
        instruction: &str,
        title: &str,
        context: &str,
        options: &DispatchOptions,
    ) -> Result<DispatchReport, DispatchError> {
        if options.api_type == ApiType::Embeddings {
            return Err(UnsupportedApiType(options.api_type.to_string()).into());
        }
        if options.chunk_size == 0 {
            return Err(DispatchError::ZeroChunkSize);
        }

        let windows = chunk_windows(context, options.chunk_size);
        let mut report = DispatchReport::default();
        let mut requests = Vec::with_capacity(windows.len());

        for window in windows {
            if !window.is_dispatchable() {
                debug!(chunk = window.index, chars = window.char_len(), "skipping short window");
                report.outcomes.push(ChunkOutcome {
                    index: window.index,
                    chars: window.char_len(),
                    status: ChunkStatus::Skipped,
                });
                continue;
            }
            let request = ChunkRequest {
                instruction: instruction.to_string(),
                title: title.to_string(),
                chunk: window.text.clone(),
                api_type: options.api_type,
                format: options.format,
            };
            requests.push((window, request));
        }

        let sent: Vec<(usize, usize)> = requests
            .iter()
            .map(|(window, _)| (window.index, window.char_len()))
            .collect();

        let client = self.client.clone();
        let finished = self
            .pool
            .map_unordered(requests, move |(window, request)| {
                let client = client.clone();
                async move { process_chunk(&client, &window, &request).await }
            })
            .await?;

        for (position, joined) in finished {
            let (index, chars) = sent[position];
            let status = match joined {
                Ok(Ok(output)) => {
                    report.results.push(output);
                    ChunkStatus::Succeeded
                }
                Ok(Err(failure)) => ChunkStatus::Failed(failure),
                Err(e) => {
                    let failure = match e {
                        PoolError::Panicked(msg) => ChunkFailure::Panicked(msg),
                        _ => ChunkFailure::Cancelled,
                    };
                    warn!(chunk = index, "chunk did not run: {}", failure);
                    ChunkStatus::Failed(failure)
                }
            };
            report.outcomes.push(ChunkOutcome {
                index,
                chars,
                status,
            });
        }

        info!(
            title,
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            "dispatch finished"
        );
        Ok(report)
    }
}

#[instrument(skip_all, fields(chunk = window.index, api_type = %request.api_type))]
async fn process_chunk(
    client: &LlmClient,
    window: &ContextWindow,
    request: &ChunkRequest,
) -> Result<ChunkOutput, ChunkFailure> {
    let begin = Instant::now();
    let body = request.payload(client.router());
    let response = client.post(request.api_type, &body).await;
    debug!(
        chunk_size = window.char_len(),
        elapsed_ms = begin.elapsed().as_millis() as u64,
        "request finished"
    );

    let body = response.map_err(|e| {
        error!("during API call: {}", e);
        e
    })?;

    parse_output(&body, request.api_type, request.format).map_err(|e| {
        error!("during response parsing: {}", e);
        e
    })
}

fn parse_output(
    body: &Value,
    api_type: ApiType,
    format: ResponseFormat,
) -> Result<ChunkOutput, ChunkFailure> {
    let text = extract_text(body, api_type)?;
    match format {
        ResponseFormat::Json => Ok(ChunkOutput::Record(parse_structured(&text)?)),
        ResponseFormat::None => Ok(ChunkOutput::Text(text)),
    }
}
