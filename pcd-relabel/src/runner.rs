use std::path::{Path, PathBuf};

use pcd_core::{
    error::Result,
    remap::{LabelMapping, Validation},
};

use crate::{
    batch::{BatchCoordinator, BatchResult},
    cancel::CancelToken,
    config::RelabelConfig,
    pipeline::{output_path_for, relabel_file, FileReport},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    /// Only `input`, validated against its own labels.
    Single,
    /// Every matching file next to `input` (or inside it, for a directory).
    Batch,
}

#[derive(Debug, Clone)]
pub struct RelabelRequest {
    pub input: PathBuf,
    /// Single mode only; defaults to `<stem><suffix>.<ext>` beside the input.
    pub output: Option<PathBuf>,
    pub mappings: Vec<LabelMapping>,
    pub mode: ProcessingMode,
}

#[derive(Debug)]
pub enum Outcome {
    Single(FileReport),
    Batch(Vec<BatchResult>),
}

impl Outcome {
    pub fn failures(&self) -> usize {
        match self {
            Outcome::Single(_) => 0,
            Outcome::Batch(results) => results.iter().filter(|result| !result.is_ok()).count(),
        }
    }
}

pub trait Relabeler {
    fn execute(&self, request: RelabelRequest) -> Result<Outcome>;
}

pub struct PointCloudRelabeler {
    config: RelabelConfig,
    cancel: CancelToken,
}

impl PointCloudRelabeler {
    pub fn new(config: RelabelConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

impl Relabeler for PointCloudRelabeler {
    fn execute(&self, request: RelabelRequest) -> Result<Outcome> {
        match request.mode {
            ProcessingMode::Single => {
                let output = request
                    .output
                    .unwrap_or_else(|| output_path_for(&request.input, &self.config.suffix));
                let report = relabel_file(
                    &request.input,
                    &output,
                    &request.mappings,
                    Validation::Strict,
                    &self.config,
                )?;
                Ok(Outcome::Single(report))
            }
            ProcessingMode::Batch => {
                if let Some(output) = &request.output {
                    log::warn!("ignoring output path {:?} in batch mode", output);
                }
                let dir = batch_dir(&request.input);
                let coordinator = BatchCoordinator::new(self.config.clone())
                    .with_cancel(self.cancel.clone());
                let results = coordinator.run_batch(&dir, &request.mappings)?;
                Ok(Outcome::Batch(results))
            }
        }
    }
}

/// Directory whose files make up the batch of `input`.
pub fn batch_dir(input: &Path) -> PathBuf {
    if input.is_dir() {
        return input.to_path_buf();
    }
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
