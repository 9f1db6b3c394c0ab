pub mod las;

use pcd_core::{error::Result, remap::LabelSet};

/// Streams extended classification values without materializing a cloud.
pub trait LabelReader {
    fn next_label(&mut self) -> Result<Option<i32>>;
}

pub fn collect_labels<R: LabelReader>(reader: &mut R) -> Result<LabelSet> {
    let mut labels = LabelSet::new();
    while let Some(label) = reader.next_label()? {
        labels.insert(label);
    }
    Ok(labels)
}
