use std::{
    ffi::OsStr,
    io::BufWriter,
    path::{Path, PathBuf},
    time::Instant,
};

use las::{
    point::{Classification, Format, ScanDirection},
    Builder, Transform, Vector, Vlr, Writer,
};
use serde::Serialize;

use pcd_core::{
    error::{RelabelError, Result},
    pointcloud::{
        extra_bytes::is_descriptor_vlr, point::PointAttributes, BoundingVolume, PointCloud,
        CANONICAL_SCALE,
    },
};

pub const OUTPUT_VERSION: (u8, u8) = (1, 4);
pub const OUTPUT_POINT_FORMAT: u8 = 7;

const LASZIP_USER_ID: &str = "laszip encoded";

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub scale: [f64; 3],
    /// `None` compresses when the destination ends in `.laz`.
    pub compress: Option<bool>,
    /// Copy the source VLRs verbatim. The Extra Bytes VLR is always kept.
    pub preserve_vlrs: bool,
    pub generating_software: String,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            scale: [CANONICAL_SCALE; 3],
            compress: None,
            preserve_vlrs: true,
            generating_software: concat!("ptc-relabel ", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Header values the encoder derived from the written points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodeSummary {
    pub path: PathBuf,
    pub point_count: u64,
    pub scale: [f64; 3],
    pub offset: [f64; 3],
    pub bounding_volume: BoundingVolume,
}

/// Writes `cloud` as LAS 1.4 point format 7.
///
/// Offset is the per-axis minimum so that every raw coordinate is
/// non-negative. The file is written next to `path` under a temporary name
/// and renamed into place once complete; on error the temporary file is
/// removed and `path` is left as it was.
pub fn encode(path: &Path, cloud: &PointCloud, options: &EncodeOptions) -> Result<EncodeSummary> {
    let start = Instant::now();
    let table = cloud.table();
    let bounding_volume = table.bounds();
    let offset = bounding_volume.min;
    let scale = options.scale;
    check_quantization(path, &bounding_volume, scale)?;

    let compress = options.compress.unwrap_or_else(|| {
        path.extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case("laz"))
    });

    let mut builder = Builder::from(OUTPUT_VERSION);
    builder.point_format =
        Format::new(OUTPUT_POINT_FORMAT).map_err(|e| RelabelError::las(path, e))?;
    builder.point_format.extra_bytes = cloud.header.extra_bytes_len;
    builder.point_format.is_compressed = compress;
    builder.transforms = Vector {
        x: Transform {
            scale: scale[0],
            offset: offset[0],
        },
        y: Transform {
            scale: scale[1],
            offset: offset[1],
        },
        z: Transform {
            scale: scale[2],
            offset: offset[2],
        },
    };
    builder.generating_software = options.generating_software.clone();
    builder.vlrs = output_vlrs(&cloud.header.vlrs, options.preserve_vlrs);
    let header = builder
        .into_header()
        .map_err(|e| RelabelError::las(path, e))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp = tempfile::Builder::new()
        .prefix(".ptc-relabel-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| RelabelError::io(dir, e))?;
    let file = tmp
        .as_file()
        .try_clone()
        .map_err(|e| RelabelError::io(tmp.path(), e))?;

    let mut writer =
        Writer::new(BufWriter::new(file), header).map_err(|e| RelabelError::las(path, e))?;
    let extra_bytes_len = cloud.header.extra_bytes_len as usize;
    for (position, intensity, classification, attributes) in table.iter() {
        let mut extra_bytes = attributes.extra_bytes.clone();
        extra_bytes.resize(extra_bytes_len, 0);
        cloud
            .header
            .ext_class
            .write(&mut extra_bytes, classification)?;

        let point = to_las_point(position, intensity, attributes, extra_bytes)
            .map_err(|e| RelabelError::las(path, e))?;
        writer
            .write_point(point)
            .map_err(|e| RelabelError::las(path, e))?;
    }
    writer.close().map_err(|e| RelabelError::las(path, e))?;
    drop(writer);

    tmp.as_file()
        .sync_all()
        .map_err(|e| RelabelError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| RelabelError::io(path, e.error))?;

    log::info!(
        "encoded {} points to {:?} in {:?}",
        table.len(),
        path,
        start.elapsed()
    );

    Ok(EncodeSummary {
        path: path.to_path_buf(),
        point_count: table.len() as u64,
        scale,
        offset,
        bounding_volume,
    })
}

fn check_quantization(path: &Path, bounds: &BoundingVolume, scale: [f64; 3]) -> Result<()> {
    for axis in 0..3 {
        if !(scale[axis].is_finite() && scale[axis] > 0.0) {
            return Err(RelabelError::Encode {
                path: path.to_path_buf(),
                reason: format!("scale {} is not a positive number", scale[axis]),
            });
        }
        let extent = ((bounds.max[axis] - bounds.min[axis]) / scale[axis]).round();
        if !extent.is_finite() || extent > i32::MAX as f64 {
            return Err(RelabelError::Encode {
                path: path.to_path_buf(),
                reason: format!(
                    "extent {} along axis {} does not fit i32 at scale {}",
                    bounds.max[axis] - bounds.min[axis],
                    axis,
                    scale[axis]
                ),
            });
        }
    }
    Ok(())
}

fn output_vlrs(vlrs: &[Vlr], preserve: bool) -> Vec<Vlr> {
    vlrs.iter()
        .filter(|vlr| vlr.user_id != LASZIP_USER_ID)
        .filter(|vlr| preserve || is_descriptor_vlr(vlr))
        .cloned()
        .collect()
}

fn to_las_point(
    position: [f64; 3],
    intensity: u16,
    attributes: &PointAttributes,
    extra_bytes: Vec<u8>,
) -> las::Result<las::Point> {
    let scan_direction = if attributes.scan_direction_flag {
        ScanDirection::LeftToRight
    } else {
        ScanDirection::RightToLeft
    };

    Ok(las::Point {
        x: position[0],
        y: position[1],
        z: position[2],
        intensity,
        return_number: attributes.return_number,
        number_of_returns: attributes.number_of_returns,
        scan_direction,
        is_edge_of_flight_line: attributes.edge_of_flight_line,
        classification: Classification::new(attributes.classification_byte)?,
        is_synthetic: attributes.is_synthetic,
        is_key_point: attributes.is_key_point,
        is_withheld: attributes.is_withheld,
        is_overlap: attributes.is_overlap,
        scanner_channel: attributes.scanner_channel,
        scan_angle: attributes.scan_angle,
        user_data: attributes.user_data,
        point_source_id: attributes.point_source_id,
        gps_time: Some(attributes.gps_time),
        color: Some(las::Color {
            red: attributes.color.r,
            green: attributes.color.g,
            blue: attributes.color.b,
        }),
        extra_bytes,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pcd_core::{
        pointcloud::{
            extra_bytes::{
                descriptors_vlr, DataType, ExtClassField, ExtraBytesDescriptor, EXT_CLASS_NAME,
            },
            point::{Color, PointRecord},
        },
        remap::{LabelMapping, LabelSet, RemapEngine},
    };
    use pcd_parser::{decode, parsers::las::preamble::LasPreamble};

    use super::*;

    fn record(x: f64, y: f64, z: f64, classification: i32) -> PointRecord {
        let mut record = PointRecord::new(x, y, z, 500, classification);
        record.attributes = PointAttributes {
            return_number: 2,
            number_of_returns: 3,
            scan_direction_flag: true,
            edge_of_flight_line: true,
            classification_byte: 6,
            is_withheld: true,
            scanner_channel: 1,
            user_data: 9,
            point_source_id: 77,
            gps_time: 123456.25,
            color: Color {
                r: 1000,
                g: 2000,
                b: 3000,
            },
            ..Default::default()
        };
        record
    }

    fn sample_cloud() -> PointCloud {
        PointCloud::new(vec![
            record(1000.04, 2000.0, 5.0, 1),
            record(1010.0, 2003.5, -1.0, 2),
            record(1005.0, 2001.0, 2.0, 1),
            record(1001.0, 2002.0, 0.0, 3),
        ])
    }

    #[test]
    fn header_is_recomputed_from_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.las");
        let summary = encode(&path, &sample_cloud(), &EncodeOptions::default()).unwrap();

        assert_eq!(summary.point_count, 4);
        assert_eq!(summary.scale, [0.1; 3]);
        assert_eq!(summary.offset, [1000.0, 2000.0, -1.0]);
        assert_eq!(summary.bounding_volume.max, [1010.0, 2003.5, 5.0]);

        let preamble = LasPreamble::read_checked(&path).unwrap();
        assert_eq!(preamble.version, OUTPUT_VERSION);
        assert_eq!(preamble.point_format, OUTPUT_POINT_FORMAT);
        assert!(!preamble.is_compressed);
        assert_eq!(preamble.point_count, 4);
        assert_eq!(preamble.scale, [0.1; 3]);
        assert_eq!(preamble.offset, [1000.0, 2000.0, -1.0]);
    }

    #[test]
    fn round_trip_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.las");
        let cloud = sample_cloud();
        encode(&path, &cloud, &EncodeOptions::default()).unwrap();

        let decoded = decode(&path).unwrap();
        assert_eq!(decoded.len(), cloud.len());
        assert_eq!(decoded.classification(), cloud.classification());
        assert_eq!(
            LabelSet::from_column(decoded.classification()),
            LabelSet::from_column(cloud.classification())
        );

        for i in 0..cloud.len() {
            let expected = cloud.table().record(i);
            let actual = decoded.table().record(i);
            for (a, e) in actual.position().iter().zip(expected.position()) {
                assert!((a - e).abs() <= 0.05 + 1e-9, "{a} vs {e}");
            }
            assert_eq!(actual.intensity, expected.intensity);
            let mut attributes = actual.attributes.clone();
            attributes.extra_bytes.clear();
            assert_eq!(attributes, expected.attributes);
        }
    }

    #[test]
    fn coordinates_are_quantized_at_scale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.las");
        encode(&path, &sample_cloud(), &EncodeOptions::default()).unwrap();

        // 1000.04 is stored as raw 0 against an offset of 1000.0
        let decoded = decode(&path).unwrap();
        assert!((decoded.table().positions()[0][0] - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn remapped_labels_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.las");
        let mut cloud = sample_cloud();
        RemapEngine::new()
            .apply(&mut cloud, &[LabelMapping::new(1, 7)])
            .unwrap();
        encode(&path, &cloud, &EncodeOptions::default()).unwrap();

        assert_eq!(decode(&path).unwrap().classification(), &[7, 2, 7, 3]);
    }

    #[test]
    fn laz_output_is_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.laz");
        encode(&path, &sample_cloud(), &EncodeOptions::default()).unwrap();

        assert!(LasPreamble::read_checked(&path).unwrap().is_compressed);
        assert_eq!(decode(&path).unwrap().classification(), &[1, 2, 1, 3]);
    }

    #[test]
    fn keeps_source_field_type() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("u8.las");
        let output = dir.path().join("u8_updated.las");

        let mut cloud = sample_cloud();
        cloud.header.ext_class = ExtClassField {
            data_type: DataType::U8,
            ..Default::default()
        };
        cloud.header.extra_bytes_len = 1;
        cloud.header.vlrs = vec![descriptors_vlr(&[ExtraBytesDescriptor::new(
            EXT_CLASS_NAME,
            DataType::U8,
        )])];
        encode(&source, &cloud, &EncodeOptions::default()).unwrap();

        let decoded = decode(&source).unwrap();
        assert_eq!(decoded.header.extra_bytes_len, 1);
        assert_eq!(decoded.header.ext_class.data_type, DataType::U8);
        encode(&output, &decoded, &EncodeOptions::default()).unwrap();
        assert_eq!(decode(&output).unwrap().header.ext_class.data_type, DataType::U8);
    }

    #[test]
    fn failed_encode_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.las");
        fs::write(&path, b"previous").unwrap();

        let mut cloud = sample_cloud();
        cloud.header.ext_class = ExtClassField {
            data_type: DataType::U8,
            ..Default::default()
        };
        cloud.header.extra_bytes_len = 1;
        cloud.table_mut().set_classification(2, 300);

        assert!(matches!(
            encode(&path, &cloud, &EncodeOptions::default()),
            Err(RelabelError::InvalidLabelFormat { .. })
        ));
        assert_eq!(fs::read(&path).unwrap(), b"previous");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn extent_too_large_for_scale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.las");
        let cloud = PointCloud::new(vec![
            PointRecord::new(0.0, 0.0, 0.0, 0, 1),
            PointRecord::new(1.0e9, 0.0, 0.0, 0, 1),
        ]);

        assert!(matches!(
            encode(&path, &cloud, &EncodeOptions::default()),
            Err(RelabelError::Encode { .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn empty_cloud() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.las");
        let summary =
            encode(&path, &PointCloud::new(Vec::new()), &EncodeOptions::default()).unwrap();
        assert_eq!(summary.point_count, 0);
        assert!(decode(&path).unwrap().is_empty());
    }

    #[test]
    fn dropped_vlrs_keep_descriptor() {
        let mut vlrs = PointCloud::new(Vec::new()).header.vlrs;
        vlrs.push(Vlr {
            user_id: "LASF_Projection".to_string(),
            record_id: 2112,
            description: "WKT".to_string(),
            data: b"PROJCS[]".to_vec(),
        });
        vlrs.push(Vlr {
            user_id: LASZIP_USER_ID.to_string(),
            record_id: 22204,
            description: String::new(),
            data: vec![0; 4],
        });

        assert_eq!(output_vlrs(&vlrs, true).len(), 2);
        let kept = output_vlrs(&vlrs, false);
        assert_eq!(kept.len(), 1);
        assert!(is_descriptor_vlr(&kept[0]));
    }
}
