use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Instant,
};

use glob::{glob_with, MatchOptions, Pattern};
use rayon::prelude::*;

use pcd_core::{
    error::{RelabelError, Result},
    remap::{LabelMapping, LabelSet, Validation},
};
use pcd_parser::{parsers::get_extension, scan_labels};

use crate::{
    cancel::CancelToken,
    config::RelabelConfig,
    pipeline::{output_path_for, relabel_file, FileReport},
};

/// Outcome of one file of a batch.
#[derive(Debug)]
pub struct BatchResult {
    pub path: PathBuf,
    pub outcome: Result<FileReport>,
}

impl BatchResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Labels of a directory and the files that could not be scanned.
#[derive(Debug, Default)]
pub struct LabelScan {
    pub labels: LabelSet,
    pub failed: Vec<(PathBuf, RelabelError)>,
}

/// Runs one mapping list over every matching file of a directory.
pub struct BatchCoordinator {
    pub config: RelabelConfig,
    pub cancel: CancelToken,
}

impl BatchCoordinator {
    pub fn new(config: RelabelConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Files with the configured extension, sorted, without previous outputs.
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let metadata = fs::metadata(dir).map_err(|e| RelabelError::io(dir, e))?;
        if !metadata.is_dir() {
            return Err(RelabelError::io(
                dir,
                io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }
        let extension = get_extension(&self.config.extension).ok_or_else(|| {
            RelabelError::io(
                dir,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unsupported extension `{}`", self.config.extension),
                ),
            )
        })?;
        let dir_str = dir.to_str().ok_or_else(|| {
            RelabelError::io(
                dir,
                io::Error::new(io::ErrorKind::InvalidInput, "path is not valid UTF-8"),
            )
        })?;
        let pattern = format!("{}/*.{}", Pattern::escape(dir_str), extension.as_str());
        let options = MatchOptions {
            case_sensitive: false,
            ..Default::default()
        };

        let entries = glob_with(&pattern, options).map_err(|e| {
            RelabelError::io(dir, io::Error::new(io::ErrorKind::InvalidInput, e.msg))
        })?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                RelabelError::io(path, e.into())
            })?;
            let is_output = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| stem.ends_with(&self.config.suffix));
            if path.is_file() && !is_output {
                files.push(path);
            }
        }
        files.sort();
        log::info!("found {} files in {:?}", files.len(), dir);
        Ok(files)
    }

    /// Union of the labels of every readable file in `dir`; unreadable
    /// files are listed in `failed`.
    pub fn available_labels(&self, dir: &Path) -> Result<LabelScan> {
        let files = self.discover(dir)?;
        let pool = self.thread_pool(dir)?;
        let (labels, scans) = pool.install(|| scan_all(&files));

        let failed: Vec<(PathBuf, RelabelError)> = files
            .into_iter()
            .zip(scans)
            .filter_map(|(path, scan)| scan.err().map(|e| (path, e)))
            .collect();
        for (_, e) in &failed {
            log::warn!("{}", e);
        }
        Ok(LabelScan { labels, failed })
    }

    /// Relabels every file of `dir`, validating `mappings` against the labels
    /// of the whole batch. A single file failing does not stop the others.
    pub fn run_batch(&self, dir: &Path, mappings: &[LabelMapping]) -> Result<Vec<BatchResult>> {
        let start = Instant::now();
        let files = self.discover(dir)?;
        let pool = self.thread_pool(dir)?;

        let (universe, scans) = pool.install(|| scan_all(&files));
        log::info!("available labels: {}", universe);
        if scans.iter().any(|scan| scan.is_ok()) {
            if let Some(mapping) = mappings.iter().find(|m| !universe.contains(m.old_label)) {
                return Err(RelabelError::UnknownLabel(mapping.old_label));
            }
        }

        let results: Vec<BatchResult> = pool.install(|| {
            files
                .into_par_iter()
                .zip(scans.into_par_iter())
                .map(|(path, scan)| {
                    let outcome = match scan {
                        Err(e) => Err(e),
                        Ok(_) if self.cancel.is_cancelled() => {
                            Err(RelabelError::Cancelled { path: path.clone() })
                        }
                        Ok(_) => relabel_file(
                            &path,
                            &output_path_for(&path, &self.config.suffix),
                            mappings,
                            Validation::Universe(&universe),
                            &self.config,
                        ),
                    };
                    if let Err(e) = &outcome {
                        log::warn!("{}", e);
                    }
                    BatchResult { path, outcome }
                })
                .collect()
        });

        let failed = results.iter().filter(|result| !result.is_ok()).count();
        log::info!(
            "batch finished in {:?}: {} succeeded, {} failed",
            start.elapsed(),
            results.len() - failed,
            failed
        );
        Ok(results)
    }

    fn thread_pool(&self, dir: &Path) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .build()
            .map_err(|e| RelabelError::io(dir, io::Error::other(e)))
    }
}

fn scan_all(files: &[PathBuf]) -> (LabelSet, Vec<Result<LabelSet>>) {
    let scans: Vec<Result<LabelSet>> = files.par_iter().map(|path| scan_labels(path)).collect();
    let mut universe = LabelSet::new();
    for labels in scans.iter().flatten() {
        universe.union_with(labels);
    }
    (universe, scans)
}
