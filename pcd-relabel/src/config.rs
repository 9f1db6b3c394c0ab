use serde::{Deserialize, Serialize};

use pcd_core::pointcloud::CANONICAL_SCALE;
use pcd_exporter::EncodeOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelabelConfig {
    /// Coordinate scale of every output axis.
    pub scale: f64,
    /// Appended to the input stem to name the output.
    pub suffix: String,
    /// Extension of the files picked up in batch mode.
    pub extension: String,
    pub jobs: usize,
    pub preserve_vlrs: bool,
}

impl Default for RelabelConfig {
    fn default() -> Self {
        Self {
            scale: CANONICAL_SCALE,
            suffix: "_updated".to_string(),
            extension: "laz".to_string(),
            jobs: num_cpus::get(),
            preserve_vlrs: true,
        }
    }
}

impl RelabelConfig {
    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            scale: [self.scale; 3],
            preserve_vlrs: self.preserve_vlrs,
            ..Default::default()
        }
    }
}
