// SPDX-License-Identifier: MIT

//! File queue protocol
//!
//! A client drops one JSON request per job into a queue directory. The
//! [`QueueProcessor`] picks it up, hands it to a [`QueueHandler`], reports
//! progress to a result file next to it, and deletes the queue file once a
//! terminal status has been written. A crash before that point leaves the
//! request in place, so it is processed again on the next scan.

use crate::adk::error::EngineError;
use crate::flow::config::QueueKind;
use crate::flow::workflow::now_timestamp;
use crate::flow::workflow::store::write_json;
use crate::flow::workflow::validator::is_valid_workflow_id;
use async_trait::async_trait;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

/// Progress stages reported while a request is processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Generating,
    Processing,
    Validating,
    Repairing,
    Layout,
    Writing,
}

impl Stage {
    /// Rough completion percentage shown by the client
    pub fn progress(&self) -> u8 {
        match self {
            Stage::Queued => 0,
            Stage::Generating | Stage::Processing => 10,
            Stage::Validating => 40,
            Stage::Repairing => 50,
            Stage::Layout => 80,
            Stage::Writing => 90,
        }
    }
}

/// Status part of a result record, tagged by `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultStatus {
    #[serde(rename_all = "camelCase")]
    Processing {
        stage: Stage,
        progress: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attempt: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_attempts: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Completed {
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    NeedsClarification {
        questions: Vec<String>,
    },
    Failed {
        error: String,
    },
}

impl ResultStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResultStatus::Processing { .. })
    }
}

/// One document in a result file (or one line of a chat log)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub request_id: String,
    #[serde(flatten)]
    pub status: ResultStatus,
    pub updated_at: String,
}

/// How a handler's work ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(Map<String, Value>),
    NeedsClarification(Vec<String>),
    Failed(String),
}

impl Outcome {
    fn into_status(self) -> ResultStatus {
        match self {
            Outcome::Completed(payload) => ResultStatus::Completed { payload },
            Outcome::NeedsClarification(questions) => ResultStatus::NeedsClarification { questions },
            Outcome::Failed(error) => ResultStatus::Failed { error },
        }
    }
}

/// What happened to a queue file
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// The file was already gone
    Missing,
    /// Another task is processing the same request id
    InFlight,
    /// The request id finished moments ago; the duplicate was dropped
    RecentlyProcessed,
    Completed,
    NeedsClarification,
    Failed,
}

/// Where results are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultMode {
    /// `<requestId>.json`, overwritten on every update
    Overwrite,
    /// `<requestId>.jsonl`, one record appended per update
    Append,
}

/// Writes result records for one request
#[derive(Debug, Clone)]
pub struct Reporter {
    request_id: String,
    path: PathBuf,
    mode: ResultMode,
}

impl Reporter {
    pub fn new(results_dir: &Path, request_id: &str, mode: ResultMode) -> Self {
        let extension = match mode {
            ResultMode::Overwrite => "json",
            ResultMode::Append => "jsonl",
        };
        Self {
            request_id: request_id.to_string(),
            path: results_dir.join(format!("{}.{}", request_id, extension)),
            mode,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Report a stage; failures are logged, not returned
    pub async fn stage(&self, stage: Stage) {
        self.progress(stage, None, None, None).await
    }

    pub async fn progress(
        &self,
        stage: Stage,
        attempt: Option<u32>,
        max_attempts: Option<u32>,
        message: Option<String>,
    ) {
        let status = ResultStatus::Processing {
            stage,
            progress: stage.progress(),
            attempt,
            max_attempts,
            message,
        };
        if let Err(e) = self.write(status).await {
            log::warn!(
                "[{}] Failed to report stage {:?}: {}",
                self.request_id,
                stage,
                e
            );
        }
    }

    /// Append a free-form record; only meaningful for append-mode logs
    pub async fn append(&self, mut record: Map<String, Value>) -> Result<(), EngineError> {
        record.insert("requestId".into(), Value::String(self.request_id.clone()));
        record.insert("updatedAt".into(), Value::String(now_timestamp()));
        self.append_line(&Value::Object(record)).await
    }

    async fn append_line(&self, value: &Value) -> Result<(), EngineError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn write(&self, status: ResultStatus) -> Result<(), EngineError> {
        let record = ResultRecord {
            request_id: self.request_id.clone(),
            status,
            updated_at: now_timestamp(),
        };
        match self.mode {
            ResultMode::Overwrite => write_json(&self.path, &record).await,
            ResultMode::Append => self.append_line(&serde_json::to_value(&record)?).await,
        }
    }
}

/// A pipeline that consumes one kind of queue file
#[async_trait]
pub trait QueueHandler: Send + Sync {
    type Request: DeserializeOwned + Send;

    fn kind(&self) -> QueueKind;

    fn result_mode(&self) -> ResultMode {
        ResultMode::Overwrite
    }

    /// Stage reported right after the request is parsed
    fn first_stage(&self) -> Stage;

    async fn handle(
        &self,
        request: Self::Request,
        reporter: &Reporter,
    ) -> Result<Outcome, EngineError>;
}

/// Removes a request id from the in-flight set when dropped
struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.id);
    }
}

/// Scans a queue directory and drives a handler
pub struct QueueProcessor<H: QueueHandler> {
    handler: Arc<H>,
    queue_dir: PathBuf,
    results_dir: PathBuf,
    in_flight: Arc<Mutex<HashSet<String>>>,
    recent: Option<(Duration, Mutex<HashMap<String, Instant>>)>,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl<H: QueueHandler> QueueProcessor<H> {
    pub fn new(handler: Arc<H>, queue_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            handler,
            queue_dir: queue_dir.into(),
            results_dir: results_dir.into(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            recent: None,
        }
    }

    /// Also drop requests whose id finished within `window`
    pub fn with_recent_window(mut self, window: Duration) -> Self {
        self.recent = Some((window, Mutex::new(HashMap::new())));
        self
    }

    pub fn queue_dir(&self) -> &Path {
        &self.queue_dir
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    fn claim(&self, id: &str) -> Option<InFlightGuard> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            id: id.to_string(),
        })
    }

    fn recently_processed(&self, id: &str) -> bool {
        let Some((window, recent)) = &self.recent else {
            return false;
        };
        let mut recent = recent.lock().unwrap_or_else(|e| e.into_inner());
        recent.retain(|_, finished| finished.elapsed() < *window);
        recent.contains_key(id)
    }

    fn mark_processed(&self, id: &str) {
        if let Some((_, recent)) = &self.recent {
            let mut recent = recent.lock().unwrap_or_else(|e| e.into_inner());
            recent.insert(id.to_string(), Instant::now());
        }
    }

    async fn remove_queue_file(&self, path: &Path, id: &str) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => log::debug!("[{}] Removed queue file {}", id, path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("[{}] Failed to remove queue file {}: {}", id, path.display(), e),
        }
    }

    /// Process one queue file to a terminal status
    pub async fn process_file(&self, path: &Path) -> Result<Disposition, EngineError> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Disposition::Missing),
            Err(e) => return Err(e.into()),
        };

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parsed: Result<Value, _> = serde_json::from_str(&text);
        let claimed_id = parsed
            .as_ref()
            .ok()
            .and_then(|v| v.get("requestId"))
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string);
        // Result files are named after the id, so it must be a plain file name
        let (request_id, unusable_id) = match claimed_id {
            Some(id) if is_valid_workflow_id(&id) => (id, None),
            Some(id) => (stem, Some(id)),
            None => (stem, None),
        };

        let Some(_guard) = self.claim(&request_id) else {
            log::debug!("[{}] Already in flight; skipping", request_id);
            return Ok(Disposition::InFlight);
        };

        if self.recently_processed(&request_id) {
            log::debug!("[{}] Processed moments ago; dropping duplicate", request_id);
            self.remove_queue_file(path, &request_id).await;
            return Ok(Disposition::RecentlyProcessed);
        }

        let kind = self.handler.kind();
        let reporter = Reporter::new(&self.results_dir, &request_id, self.handler.result_mode());
        log::info!("[{}] Processing {} request", request_id, kind);

        let parsed = match unusable_id {
            Some(id) => Err(format!("requestId '{}' is not a valid file name", id)),
            None => parsed.map_err(|e| e.to_string()),
        };
        let outcome = match parsed
            .and_then(|v| serde_json::from_value::<H::Request>(v).map_err(|e| e.to_string()))
        {
            Err(e) => Outcome::Failed(format!("Malformed request: {}", e)),
            Ok(request) => {
                reporter.stage(Stage::Queued).await;
                reporter.stage(self.handler.first_stage()).await;
                let run = AssertUnwindSafe(self.handler.handle(request, &reporter)).catch_unwind();
                match run.await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => Outcome::Failed(e.to_string()),
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        log::error!("[{}] Handler panicked: {}", request_id, message);
                        Outcome::Failed(format!("Internal error: {}", message))
                    }
                }
            }
        };

        let disposition = match &outcome {
            Outcome::Completed(_) => Disposition::Completed,
            Outcome::NeedsClarification(_) => Disposition::NeedsClarification,
            Outcome::Failed(error) => {
                log::warn!("[{}] Failed: {}", request_id, error);
                Disposition::Failed
            }
        };

        // Without a terminal record the request must stay queued
        reporter.write(outcome.into_status()).await?;
        self.remove_queue_file(path, &request_id).await;
        self.mark_processed(&request_id);
        log::info!("[{}] Finished as {:?}", request_id, disposition);

        Ok(disposition)
    }

    /// Queue files currently waiting, ordered by request id
    pub async fn pending_files(&self) -> Result<Vec<PathBuf>, EngineError> {
        let mut entries = match tokio::fs::read_dir(&self.queue_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".json") && !name.starts_with('.') {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Process every waiting file once, sequentially
    pub async fn scan_once(&self) -> Result<Vec<(PathBuf, Disposition)>, EngineError> {
        let mut results = Vec::new();
        for path in self.pending_files().await? {
            match self.process_file(&path).await {
                Ok(disposition) => results.push((path, disposition)),
                Err(e) => log::error!("Failed to process {}: {}", path.display(), e),
            }
        }
        Ok(results)
    }

    /// Scan forever at `interval`
    pub async fn run(&self, interval: Duration) {
        log::info!(
            "Watching {} queue at {}",
            self.handler.kind(),
            self.queue_dir.display()
        );
        loop {
            if let Err(e) = self.scan_once().await {
                log::error!("{} queue scan failed: {}", self.handler.kind(), e);
            }
            tokio::time::sleep(interval).await;
        }
    }
}
