pub mod batch;
pub mod cancel;
pub mod config;
pub mod pipeline;
pub mod runner;

pub use batch::{BatchCoordinator, BatchResult, LabelScan};
pub use cancel::CancelToken;
pub use config::RelabelConfig;
pub use pipeline::{output_path_for, relabel_file, FileReport};
pub use runner::{Outcome, PointCloudRelabeler, ProcessingMode, RelabelRequest, Relabeler};
