use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use env_logger::Builder;
use log::LevelFilter;
use serde::Serialize;
use thiserror::Error;

use pcd_core::{
    error::RelabelError,
    pointcloud::CANONICAL_SCALE,
    remap::{retain_available, LabelMapping},
};
use pcd_parser::{
    parsers::{
        csv::CsvMappingSource,
        mapping::{ManualEntry, MappingSource as _, MappingTable},
    },
    scan_labels,
};
use pcd_relabel::{
    runner::batch_dir, BatchCoordinator, FileReport, LabelScan, Outcome, PointCloudRelabeler,
    ProcessingMode, RelabelConfig, RelabelRequest, Relabeler as _,
};

#[derive(Parser, Debug)]
#[command(
    name = "ptc-relabel",
    about = "A tool for remapping Ext_Class labels of LAS/LAZ point clouds",
    author = "MIERUNE Inc.",
    version = "0.0.1"
)]
struct Cli {
    #[arg(long, global = true, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the labels of a file, or of every file in its directory
    Labels {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[arg(long)]
        batch: bool,

        #[arg(long, default_value = "laz")]
        ext: String,
    },
    /// Apply label mappings and write `<stem>_updated.<ext>`
    Apply(ApplyArgs),
}

#[derive(Args, Debug)]
struct ApplyArgs {
    #[arg(value_name = "FILE")]
    input: PathBuf,

    #[arg(short = 'm', long = "map", value_name = "OLD:NEW")]
    mappings: Vec<String>,

    #[arg(long, value_name = "CSV")]
    mapping_file: Option<PathBuf>,

    #[arg(long)]
    batch: bool,

    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[arg(long, default_value_t = CANONICAL_SCALE)]
    scale: f64,

    #[arg(long, default_value = "laz")]
    ext: String,

    #[arg(short, long)]
    jobs: Option<usize>,

    /// Drop mappings whose old label does not occur in the input
    #[arg(long)]
    only_available: bool,

    /// Keep only the Extra Bytes VLR instead of copying all source VLRs
    #[arg(long)]
    drop_vlrs: bool,

    #[arg(long, value_name = "JSON")]
    report: Option<PathBuf>,
}

impl ApplyArgs {
    fn config(&self) -> RelabelConfig {
        let mut config = RelabelConfig {
            scale: self.scale,
            extension: self.ext.clone(),
            preserve_vlrs: !self.drop_vlrs,
            ..Default::default()
        };
        if let Some(jobs) = self.jobs {
            config.jobs = jobs.max(1);
        }
        config
    }

    fn mode(&self) -> ProcessingMode {
        if self.batch {
            ProcessingMode::Batch
        } else {
            ProcessingMode::Single
        }
    }
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Relabel(#[from] RelabelError),

    #[error("failed to write report {}: {}", .0.display(), .1)]
    Report(PathBuf, #[source] serde_json::Error),

    #[error("{0} of {1} files failed")]
    Failures(usize, usize),

    #[error("{0} files could not be scanned")]
    Unscanned(usize),
}

#[derive(Serialize)]
struct RunReport<'a> {
    mappings: &'a [LabelMapping],
    rejected_rows: Vec<String>,
    files: Vec<FileEntry<'a>>,
}

#[derive(Serialize)]
struct FileEntry<'a> {
    path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a FileReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn read_mappings(args: &ApplyArgs) -> Result<MappingTable, RelabelError> {
    let mut table = MappingTable::default();
    if let Some(mapping_file) = &args.mapping_file {
        table.extend(CsvMappingSource::new(mapping_file).read_mappings()?);
    }
    let manual = ManualEntry {
        entries: args.mappings.clone(),
    };
    table.extend(manual.read_mappings()?);
    Ok(table)
}

fn available_labels(
    input: &Path,
    batch: bool,
    config: RelabelConfig,
) -> Result<LabelScan, RelabelError> {
    if batch {
        BatchCoordinator::new(config).available_labels(&batch_dir(input))
    } else {
        Ok(LabelScan {
            labels: scan_labels(input)?,
            failed: Vec::new(),
        })
    }
}

fn write_report(path: &Path, report: &RunReport) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| RelabelError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)
        .map_err(|e| AppError::Report(path.to_path_buf(), e))?;
    writer.flush().map_err(|e| RelabelError::io(path, e))?;
    log::info!("write report: {:?}", path);
    Ok(())
}

fn run_labels(input: &Path, batch: bool, ext: &str) -> Result<(), AppError> {
    let config = RelabelConfig {
        extension: ext.to_string(),
        ..Default::default()
    };
    let scan = available_labels(input, batch, config)?;
    println!("{}", scan.labels);
    for (path, e) in &scan.failed {
        println!("{}: FAILED ({})", path.display(), e);
    }
    match scan.failed.len() {
        0 => Ok(()),
        failed => Err(AppError::Unscanned(failed)),
    }
}

fn run_apply(args: ApplyArgs) -> Result<(), AppError> {
    let config = args.config();
    log::info!("input: {:?}", args.input);
    log::info!("mode: {:?}", args.mode());
    log::info!("config: {:?}", config);

    let table = read_mappings(&args)?;
    let mut mappings = table.mappings;
    if args.only_available {
        let scan = available_labels(&args.input, args.batch, config.clone())?;
        if !scan.failed.is_empty() {
            log::warn!(
                "{} files could not be scanned; their labels are not available",
                scan.failed.len()
            );
        }
        let retained = retain_available(&mappings, &scan.labels);
        log::info!(
            "{} of {} mappings apply to available labels {}",
            retained.len(),
            mappings.len(),
            scan.labels
        );
        mappings = retained;
    }
    if mappings.is_empty() {
        log::warn!("no mappings to apply; output will be a re-encoded copy");
    }
    for mapping in &mappings {
        log::info!("mapping: {}", mapping);
    }

    let start = std::time::Instant::now();
    let relabeler = PointCloudRelabeler::new(config);
    let outcome = relabeler.execute(RelabelRequest {
        input: args.input.clone(),
        output: args.output.clone(),
        mappings: mappings.clone(),
        mode: args.mode(),
    })?;
    log::info!("Elapsed: {:?}", start.elapsed());

    let files: Vec<FileEntry> = match &outcome {
        Outcome::Single(report) => vec![FileEntry {
            path: &report.input,
            report: Some(report),
            error: None,
        }],
        Outcome::Batch(results) => results
            .iter()
            .map(|result| match &result.outcome {
                Ok(report) => FileEntry {
                    path: &result.path,
                    report: Some(report),
                    error: None,
                },
                Err(e) => FileEntry {
                    path: &result.path,
                    report: None,
                    error: Some(e.to_string()),
                },
            })
            .collect(),
    };
    for entry in &files {
        match (entry.report, &entry.error) {
            (Some(report), _) => println!(
                "{} -> {}: {} records changed",
                report.input.display(),
                report.output.display(),
                report.remap.total_changed()
            ),
            (None, Some(error)) => println!("{}: FAILED ({})", entry.path.display(), error),
            (None, None) => {}
        }
    }

    let total = files.len();
    if let Some(report_path) = &args.report {
        let report = RunReport {
            mappings: &mappings,
            rejected_rows: table.rejected.iter().map(|e| e.to_string()).collect(),
            files,
        };
        write_report(report_path, &report)?;
    }

    match outcome.failures() {
        0 => Ok(()),
        failed => Err(AppError::Failures(failed, total)),
    }
}

fn main() {
    let args = Cli::parse();

    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, args.log_level)
        .init();

    let result = match args.command {
        Command::Labels { input, batch, ext } => run_labels(&input, batch, &ext),
        Command::Apply(apply) => run_apply(apply),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_apply_flags() {
        let cli = Cli::try_parse_from([
            "ptc-relabel",
            "apply",
            "tile.laz",
            "-m",
            "1:2",
            "--map",
            "2=3",
            "--batch",
            "--jobs",
            "0",
            "--scale",
            "0.01",
        ])
        .unwrap();
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.mappings, vec!["1:2", "2=3"]);
        assert_eq!(args.mode(), ProcessingMode::Batch);

        let config = args.config();
        assert_eq!(config.jobs, 1);
        assert_eq!(config.scale, 0.01);
        assert!(config.preserve_vlrs);

        let table = read_mappings(&args).unwrap();
        assert_eq!(
            table.mappings,
            vec![LabelMapping::new(1, 2), LabelMapping::new(2, 3)]
        );
    }

    #[test]
    fn parse_labels_with_log_level() {
        let cli = Cli::try_parse_from([
            "ptc-relabel",
            "labels",
            "dir/tile.laz",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level, LevelFilter::Debug);
        assert!(matches!(cli.command, Command::Labels { batch: false, .. }));
    }

    #[test]
    fn bad_manual_mapping_is_rejected() {
        let cli = Cli::try_parse_from(["ptc-relabel", "apply", "tile.laz", "-m", "x:2"]).unwrap();
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert!(matches!(
            read_mappings(&args),
            Err(RelabelError::InvalidLabelFormat { .. })
        ));
    }
}
