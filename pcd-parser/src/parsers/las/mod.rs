pub mod preamble;

use std::{
    error::Error as _,
    io,
    path::{Path, PathBuf},
    time::Instant,
};

use las::{point::ScanDirection, Reader, Vlr};

use pcd_core::{
    error::{RelabelError, Result},
    pointcloud::{
        extra_bytes::{is_descriptor_vlr, parse_descriptors, ExtClassField, EXT_CLASS_NAME},
        point::{Color, PointAttributes, PointRecord},
        table::LabelTable,
        Header, PointCloud,
    },
};

use preamble::LasPreamble;

use super::{Parser, ParserProvider};

pub struct LasParserProvider {
    pub filename: PathBuf,
}

impl ParserProvider for LasParserProvider {
    fn get_parser(&self) -> Box<dyn Parser> {
        Box::new(LasParser {
            filename: self.filename.clone(),
        })
    }
}

pub struct LasParser {
    pub filename: PathBuf,
}

impl Parser for LasParser {
    fn parse(&self) -> Result<PointCloud> {
        decode(&self.filename)
    }
}

/// A validated LAS/LAZ file positioned at its first point record.
pub(crate) struct LasSource {
    pub path: PathBuf,
    pub preamble: LasPreamble,
    pub reader: Reader,
    pub ext_class: ExtClassField,
    pub extra_bytes_len: u16,
    pub vlrs: Vec<Vlr>,
    pub points_read: u64,
}

impl LasSource {
    pub fn open(path: &Path) -> Result<Self> {
        let preamble = LasPreamble::read_checked(path)?;
        let reader = Reader::from_path(path).map_err(|e| {
            if preamble.is_compressed && is_unexpected_eof(&e) {
                RelabelError::Truncated {
                    path: path.to_path_buf(),
                    expected: preamble.point_count,
                    available: 0,
                }
            } else {
                RelabelError::las(path, e)
            }
        })?;

        let header = reader.header();
        let extra_bytes_len = header.point_format().extra_bytes;
        let descriptor_vlr = header
            .vlrs()
            .iter()
            .chain(header.evlrs())
            .find(|vlr| is_descriptor_vlr(vlr));
        let ext_class = locate_ext_class(path, &preamble, descriptor_vlr, extra_bytes_len)?;

        // EVLRs are not carried over, so a descriptor stored there moves to the VLRs
        let mut vlrs: Vec<Vlr> = header.vlrs().to_vec();
        if !vlrs.iter().any(is_descriptor_vlr) {
            vlrs.extend(descriptor_vlr.cloned());
        }

        log::debug!(
            "{:?}: LAS {}.{} format {}, {} points, Ext_Class at extra byte {} ({:?})",
            path,
            preamble.version.0,
            preamble.version.1,
            preamble.point_format,
            preamble.point_count,
            ext_class.byte_offset,
            ext_class.data_type
        );

        Ok(Self {
            path: path.to_path_buf(),
            preamble,
            reader,
            ext_class,
            extra_bytes_len,
            vlrs,
            points_read: 0,
        })
    }

    /// Next point, or `None` once every declared record has been read.
    pub fn next_point(&mut self) -> Result<Option<las::Point>> {
        if self.points_read >= self.preamble.point_count {
            return Ok(None);
        }
        match self.reader.read_point() {
            Ok(Some(point)) => {
                self.points_read += 1;
                Ok(Some(point))
            }
            Ok(None) => Err(self.truncated()),
            Err(e) => {
                log::debug!(
                    "{:?}: read failed after {} points: {}",
                    self.path,
                    self.points_read,
                    e
                );
                Err(self.truncated())
            }
        }
    }

    fn truncated(&self) -> RelabelError {
        RelabelError::Truncated {
            path: self.path.clone(),
            expected: self.preamble.point_count,
            available: self.points_read,
        }
    }
}

/// True when the error, or any error it wraps, is an early end of file.
fn is_unexpected_eof(error: &las::Error) -> bool {
    let mut current = Some(error as &(dyn std::error::Error + 'static));
    while let Some(e) = current {
        if let Some(io_error) = e.downcast_ref::<io::Error>() {
            if io_error.kind() == io::ErrorKind::UnexpectedEof {
                return true;
            }
        }
        current = e.source();
    }
    false
}

fn locate_ext_class(
    path: &Path,
    preamble: &LasPreamble,
    descriptor_vlr: Option<&Vlr>,
    extra_bytes_len: u16,
) -> Result<ExtClassField> {
    let unsupported = |reason: String| RelabelError::UnsupportedPointFormat {
        path: path.to_path_buf(),
        format: preamble.point_format,
        field: EXT_CLASS_NAME.to_string(),
        reason,
    };

    if extra_bytes_len == 0 {
        return Err(unsupported("records carry no extra bytes".to_string()));
    }
    let vlr = descriptor_vlr.ok_or_else(|| unsupported("no Extra Bytes VLR".to_string()))?;
    let descriptors = parse_descriptors(&vlr.data).map_err(unsupported)?;
    ExtClassField::locate(&descriptors, extra_bytes_len as usize).map_err(unsupported)
}

pub fn convert_las_point(las_point: las::Point, ext_class: &ExtClassField) -> Result<PointRecord> {
    let classification = ext_class.read(&las_point.extra_bytes)?;

    let color = las_point
        .color
        .map(|c| Color {
            r: c.red,
            g: c.green,
            b: c.blue,
        })
        .unwrap_or_default();

    let attributes = PointAttributes {
        return_number: las_point.return_number,
        number_of_returns: las_point.number_of_returns,
        scan_direction_flag: matches!(las_point.scan_direction, ScanDirection::LeftToRight),
        edge_of_flight_line: las_point.is_edge_of_flight_line,
        classification_byte: u8::from(las_point.classification),
        is_synthetic: las_point.is_synthetic,
        is_key_point: las_point.is_key_point,
        is_withheld: las_point.is_withheld,
        is_overlap: las_point.is_overlap,
        scanner_channel: las_point.scanner_channel,
        scan_angle: las_point.scan_angle,
        user_data: las_point.user_data,
        point_source_id: las_point.point_source_id,
        gps_time: las_point.gps_time.unwrap_or(0.0),
        color,
        extra_bytes: las_point.extra_bytes,
    };

    Ok(PointRecord {
        x: las_point.x,
        y: las_point.y,
        z: las_point.z,
        intensity: las_point.intensity,
        classification,
        attributes,
    })
}

/// Reads every record of a LAS/LAZ file into memory.
pub fn decode(path: &Path) -> Result<PointCloud> {
    let start = Instant::now();
    let mut source = LasSource::open(path)?;

    // the declared count is untrusted until the records are actually read
    let capacity = source.preamble.point_count.min(1 << 24) as usize;
    let mut table = LabelTable::with_capacity(capacity);
    while let Some(las_point) = source.next_point()? {
        table.push(convert_las_point(las_point, &source.ext_class)?);
    }

    let LasSource {
        preamble,
        ext_class,
        extra_bytes_len,
        vlrs,
        ..
    } = source;
    let header = Header {
        version: preamble.version,
        point_format: preamble.point_format,
        point_count: preamble.point_count,
        scale: preamble.scale,
        offset: preamble.offset,
        bounding_volume: preamble.bounding_volume,
        ext_class,
        extra_bytes_len,
        vlrs,
    };
    log::info!(
        "decoded {} points from {:?} in {:?}",
        table.len(),
        path,
        start.elapsed()
    );

    Ok(PointCloud::from_parts(header, table))
}

#[cfg(test)]
mod tests {
    use std::{fs, io::BufWriter};

    use las::{point::Format, Builder, Transform, Vector, Writer};
    use pcd_core::pointcloud::extra_bytes::{
        descriptors_vlr, DataType, ExtraBytesDescriptor,
    };

    use super::*;

    /// Writes a LAS 1.2 format 3 file whose extra bytes hold a `Ext_Class`
    /// u8 after a two-byte `Pad` field.
    fn write_fixture(path: &Path, labels: &[u8], with_vlr: bool) {
        let mut builder = Builder::from((1, 2));
        builder.point_format = Format::new(3).unwrap();
        builder.point_format.extra_bytes = 3;
        builder.transforms = Vector {
            x: Transform { scale: 0.01, offset: 100.0 },
            y: Transform { scale: 0.01, offset: 200.0 },
            z: Transform { scale: 0.01, offset: 0.0 },
        };
        if with_vlr {
            builder.vlrs.push(descriptors_vlr(&[
                ExtraBytesDescriptor::new("Pad", DataType::U16),
                ExtraBytesDescriptor::new(EXT_CLASS_NAME, DataType::U8),
            ]));
        }
        let header = builder.into_header().unwrap();

        let file = fs::File::create(path).unwrap();
        let mut writer = Writer::new(BufWriter::new(file), header).unwrap();
        for (i, &label) in labels.iter().enumerate() {
            let point = las::Point {
                x: 100.0 + i as f64,
                y: 200.5,
                z: 3.25,
                intensity: 10 * i as u16,
                return_number: 1,
                number_of_returns: 2,
                user_data: 7,
                point_source_id: 42,
                gps_time: Some(1000.5 + i as f64),
                color: Some(las::Color {
                    red: 1,
                    green: 2,
                    blue: 3,
                }),
                extra_bytes: vec![0xEE, 0xFF, label],
                ..Default::default()
            };
            writer.write_point(point).unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn decode_legacy_format_with_ext_class() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.las");
        write_fixture(&path, &[1, 2, 1, 3], true);

        let cloud = decode(&path).unwrap();
        assert_eq!(cloud.len(), 4);
        assert_eq!(cloud.classification(), &[1, 2, 1, 3]);
        assert_eq!(cloud.header.version, (1, 2));
        assert_eq!(cloud.header.point_format, 3);
        assert_eq!(cloud.header.point_count, 4);
        assert_eq!(cloud.header.extra_bytes_len, 3);
        assert_eq!(cloud.header.ext_class.byte_offset, 2);
        assert_eq!(cloud.header.scale, [0.01, 0.01, 0.01]);
        assert_eq!(cloud.header.offset, [100.0, 200.0, 0.0]);
        assert_eq!(cloud.header.bounding_volume.min[0], 100.0);
        assert_eq!(cloud.header.bounding_volume.max[0], 103.0);

        let record = cloud.table().record(1);
        assert!((record.x - 101.0).abs() < 1e-9);
        assert!((record.y - 200.5).abs() < 1e-9);
        assert_eq!(record.intensity, 10);
        assert_eq!(record.attributes.number_of_returns, 2);
        assert_eq!(record.attributes.user_data, 7);
        assert_eq!(record.attributes.point_source_id, 42);
        assert_eq!(record.attributes.gps_time, 1001.5);
        assert_eq!(record.attributes.color, Color { r: 1, g: 2, b: 3 });
        assert_eq!(record.attributes.extra_bytes, vec![0xEE, 0xFF, 2]);
    }

    #[test]
    fn decode_without_descriptor_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.las");
        write_fixture(&path, &[1, 2], false);

        assert!(matches!(
            decode(&path),
            Err(RelabelError::UnsupportedPointFormat { format: 3, .. })
        ));
    }

    #[test]
    fn decode_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.las");
        write_fixture(&path, &[1, 2, 3, 4, 5], true);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

        match decode(&path) {
            Err(RelabelError::Truncated {
                expected,
                available,
                ..
            }) => {
                assert_eq!(expected, 5);
                assert_eq!(available, 4);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    fn write_laz_fixture(path: &Path, count: usize) {
        let mut builder = Builder::from((1, 2));
        builder.point_format = Format::new(3).unwrap();
        builder.point_format.extra_bytes = 3;
        builder.point_format.is_compressed = true;
        builder.vlrs.push(descriptors_vlr(&[
            ExtraBytesDescriptor::new("Pad", DataType::U16),
            ExtraBytesDescriptor::new(EXT_CLASS_NAME, DataType::U8),
        ]));
        let header = builder.into_header().unwrap();

        let file = fs::File::create(path).unwrap();
        let mut writer = Writer::new(BufWriter::new(file), header).unwrap();
        for i in 0..count {
            let point = las::Point {
                x: (i % 97) as f64,
                y: (i % 13) as f64,
                z: (i % 7) as f64,
                intensity: (i * 31 % 65536) as u16,
                gps_time: Some(i as f64),
                color: Some(las::Color {
                    red: i as u16,
                    green: 2,
                    blue: 3,
                }),
                extra_bytes: vec![0, 0, (i % 5) as u8],
                ..Default::default()
            };
            writer.write_point(point).unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn decode_truncated_laz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.laz");
        write_laz_fixture(&path, 5000);
        let bytes = fs::read(&path).unwrap();
        assert_eq!(decode(&path).unwrap().len(), 5000);

        for cut in [bytes.len() / 2, bytes.len() - 100] {
            fs::write(&path, &bytes[..cut]).unwrap();
            match decode(&path) {
                Err(RelabelError::Truncated { expected, .. }) => assert_eq!(expected, 5000),
                other => panic!("cut at {cut}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn decode_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.las");
        fs::write(&path, "x,y,z\n1,2,3\n").unwrap();

        assert!(matches!(decode(&path), Err(RelabelError::Format { .. })));
    }

    #[test]
    fn decode_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            decode(&dir.path().join("missing.las")),
            Err(RelabelError::Io { .. })
        ));
    }
}
