use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
    time::Instant,
};

use serde::Serialize;

use pcd_core::{
    error::{RelabelError, Result},
    remap::{LabelMapping, LabelSet, RemapEngine, RemapReport, Validation},
};
use pcd_exporter::{encode, EncodeSummary};
use pcd_parser::parsers::{las::LasParserProvider, ParserProvider as _};

use crate::config::RelabelConfig;

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Labels present before any mapping was applied.
    pub labels: LabelSet,
    pub remap: RemapReport,
    pub encoded: EncodeSummary,
}

/// `dir/tile.laz` becomes `dir/tile<suffix>.laz`.
pub fn output_path_for(input: &Path, suffix: &str) -> PathBuf {
    let mut name = input
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_else(OsString::new);
    name.push(suffix);
    if let Some(extension) = input.extension() {
        name.push(".");
        name.push(extension);
    }
    input.with_file_name(name)
}

/// Whether `output` names `input`, through `..`, symlinks or a different
/// spelling of the same directory.
fn same_file(input: &Path, output: &Path) -> bool {
    if input == output {
        return true;
    }
    let Ok(input) = fs::canonicalize(input) else {
        return false;
    };
    if let Ok(resolved) = fs::canonicalize(output) {
        return resolved == input;
    }
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (fs::canonicalize(parent), output.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name) == input,
        _ => false,
    }
}

/// Decode, remap and encode one file. The input is never written to.
pub fn relabel_file(
    input: &Path,
    output: &Path,
    mappings: &[LabelMapping],
    validation: Validation<'_>,
    config: &RelabelConfig,
) -> Result<FileReport> {
    if same_file(input, output) {
        return Err(RelabelError::io(
            output,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "output path is the same as the input",
            ),
        ));
    }

    let start = Instant::now();
    let provider = LasParserProvider {
        filename: input.to_path_buf(),
    };
    let mut point_cloud = provider.get_parser().parse()?;
    let labels = LabelSet::from_column(point_cloud.classification());

    let remap = RemapEngine::new().apply_with(&mut point_cloud, mappings, validation)?;
    let encoded = encode(output, &point_cloud, &config.encode_options())?;

    log::info!(
        "{:?} -> {:?}: {} records relabeled in {:?}",
        input,
        output,
        remap.total_changed(),
        start.elapsed()
    );

    Ok(FileReport {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        labels,
        remap,
        encoded,
    })
}
