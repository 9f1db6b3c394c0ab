use std::path::{Path, PathBuf};

use pcd_core::{error::Result, remap::LabelSet};

use crate::parsers::las::LasSource;

use super::{collect_labels, LabelReader};

/// Reads `Ext_Class` values from a sequence of LAS/LAZ files, one file after
/// another.
pub struct LasLabelReader {
    pub files: Vec<PathBuf>,
    pub current_file_index: usize,
    current_source: Option<LasSource>,
}

impl LasLabelReader {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            current_file_index: 0,
            current_source: None,
        }
    }

    fn open_next_file(&mut self) -> Result<()> {
        if self.current_file_index < self.files.len() {
            let file = &self.files[self.current_file_index];
            self.current_source = Some(LasSource::open(file)?);
            self.current_file_index += 1;
        } else {
            self.current_source = None;
        }
        Ok(())
    }
}

impl LabelReader for LasLabelReader {
    fn next_label(&mut self) -> Result<Option<i32>> {
        loop {
            if self.current_source.is_none() {
                self.open_next_file()?;
            }
            let Some(source) = self.current_source.as_mut() else {
                return Ok(None);
            };

            match source.next_point()? {
                Some(las_point) => return source.ext_class.read(&las_point.extra_bytes).map(Some),
                None => self.current_source = None,
            }
        }
    }
}

/// Distinct labels of a single file.
pub fn scan_labels(path: &Path) -> Result<LabelSet> {
    let mut reader = LasLabelReader::new(vec![path.to_path_buf()]);
    let labels = collect_labels(&mut reader)?;
    log::debug!("{:?}: labels {}", path, labels);
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use std::{fs, io::BufWriter};

    use las::{point::Format, Builder, Writer};
    use pcd_core::pointcloud::extra_bytes::{
        descriptors_vlr, DataType, ExtraBytesDescriptor, EXT_CLASS_NAME,
    };

    use super::*;

    fn write_fixture(path: &Path, labels: &[i16]) {
        let mut builder = Builder::from((1, 4));
        builder.point_format = Format::new(6).unwrap();
        builder.point_format.extra_bytes = 2;
        builder.vlrs.push(descriptors_vlr(&[ExtraBytesDescriptor::new(
            EXT_CLASS_NAME,
            DataType::I16,
        )]));
        let header = builder.into_header().unwrap();

        let file = fs::File::create(path).unwrap();
        let mut writer = Writer::new(BufWriter::new(file), header).unwrap();
        for &label in labels {
            let point = las::Point {
                gps_time: Some(0.0),
                extra_bytes: label.to_le_bytes().to_vec(),
                ..Default::default()
            };
            writer.write_point(point).unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn labels_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.las");
        let b = dir.path().join("b.las");
        write_fixture(&a, &[3, -1, 3]);
        write_fixture(&b, &[8]);

        let mut reader = LasLabelReader::new(vec![a.clone(), b]);
        let mut labels = Vec::new();
        while let Some(label) = reader.next_label().unwrap() {
            labels.push(label);
        }
        assert_eq!(labels, vec![3, -1, 3, 8]);

        assert_eq!(
            scan_labels(&a).unwrap().iter().collect::<Vec<_>>(),
            vec![-1, 3]
        );
    }

    #[test]
    fn empty_file_has_no_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.las");
        write_fixture(&path, &[]);
        assert!(scan_labels(&path).unwrap().is_empty());
    }
}
