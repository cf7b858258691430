// SPDX-License-Identifier: MIT

//! Queue-file pipelines
//!
//! Each pipeline is a [`QueueHandler`]; [`PipelineSet`] wires all three to
//! their directories under a vault.

pub mod chat;
pub mod edit;
pub mod generate;
pub mod prompts;
pub mod queue;
pub mod repair;
pub mod reply;
pub mod sanitize;

pub use chat::{ChatPipeline, ChatRequest};
pub use edit::{EditPipeline, EditRequest};
pub use generate::{GenerationPipeline, GenerationRequest};
pub use queue::{Disposition, Outcome, QueueHandler, QueueProcessor, Reporter, ResultStatus, Stage};

use crate::adk::command::CommandExecutor;
use crate::adk::model::Model;
use crate::flow::config::{QueueKind, VaultPaths};
use crate::flow::workflow::WorkflowStore;
use std::sync::Arc;
use std::time::Duration;

/// The generation, edit and chat processors of one vault
pub struct PipelineSet {
    pub generate: QueueProcessor<GenerationPipeline>,
    pub edit: QueueProcessor<EditPipeline>,
    pub chat: QueueProcessor<ChatPipeline>,
}

impl PipelineSet {
    pub fn new(paths: &VaultPaths, model: Arc<dyn Model>, executor: Arc<dyn CommandExecutor>) -> Self {
        let store = WorkflowStore::new(paths.workflows_dir());

        let generate = QueueProcessor::new(
            Arc::new(GenerationPipeline::new(Arc::clone(&model), store.clone())),
            paths.queue_dir(QueueKind::Generate),
            paths.results_dir(QueueKind::Generate),
        );
        let edit = QueueProcessor::new(
            Arc::new(EditPipeline::new(Arc::clone(&model), store)),
            paths.queue_dir(QueueKind::Edit),
            paths.results_dir(QueueKind::Edit),
        );
        let chat = QueueProcessor::new(
            Arc::new(ChatPipeline::new(executor, model)),
            paths.queue_dir(QueueKind::Chat),
            paths.results_dir(QueueKind::Chat),
        )
        .with_recent_window(chat::RECENT_WINDOW);

        Self { generate, edit, chat }
    }

    /// Scan every queue once
    pub async fn scan_once(&self) {
        for (kind, result) in [
            (QueueKind::Generate, self.generate.scan_once().await.map(|r| r.len())),
            (QueueKind::Edit, self.edit.scan_once().await.map(|r| r.len())),
            (QueueKind::Chat, self.chat.scan_once().await.map(|r| r.len())),
        ] {
            match result {
                Ok(0) => {}
                Ok(n) => log::debug!("{} queue: processed {} file(s)", kind, n),
                Err(e) => log::error!("{} queue scan failed: {}", kind, e),
            }
        }
    }

    /// Run all three scanners until the future is dropped
    pub async fn serve(&self, interval: Duration) {
        tokio::join!(
            self.generate.run(interval),
            self.edit.run(interval),
            self.chat.run(interval),
        );
    }
}
