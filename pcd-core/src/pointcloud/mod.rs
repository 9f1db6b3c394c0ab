pub mod extra_bytes;
pub mod point;
pub mod table;

use las::Vlr;
use serde::{Deserialize, Serialize};

use extra_bytes::{descriptors_vlr, DataType, ExtClassField, ExtraBytesDescriptor, EXT_CLASS_NAME};
use point::PointRecord;
use table::LabelTable;

/// Scale written to every output axis.
pub const CANONICAL_SCALE: f64 = 0.1;

// Maximum and minimum of the real coordinates, after applying scale and offset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingVolume {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

#[derive(Debug, Clone)]
pub struct Header {
    /// LAS version as (major, minor).
    pub version: (u8, u8),
    pub point_format: u8,
    pub point_count: u64,
    pub scale: [f64; 3],
    pub offset: [f64; 3],
    pub bounding_volume: BoundingVolume,
    pub ext_class: ExtClassField,
    /// Extra bytes at the end of every point record.
    pub extra_bytes_len: u16,
    pub vlrs: Vec<Vlr>,
}

impl Header {
    /// Header of a LAS 1.4 format 7 cloud whose only extra field is an i32
    /// `Ext_Class`.
    pub fn with_i32_ext_class() -> Self {
        let descriptor = ExtraBytesDescriptor::new(EXT_CLASS_NAME, DataType::I32);
        Self {
            version: (1, 4),
            point_format: 7,
            point_count: 0,
            scale: [CANONICAL_SCALE; 3],
            offset: [0.0; 3],
            bounding_volume: BoundingVolume::default(),
            ext_class: ExtClassField::default(),
            extra_bytes_len: DataType::I32.size() as u16,
            vlrs: vec![descriptors_vlr(&[descriptor])],
        }
    }
}

#[derive(Debug, Clone)]
pub struct PointCloud {
    pub header: Header,
    table: LabelTable,
}

impl PointCloud {
    /// Builds an in-memory cloud; the `Ext_Class` bytes of each record are
    /// filled in by the encoder.
    pub fn new(records: Vec<PointRecord>) -> Self {
        let table: LabelTable = records.into_iter().collect();
        let mut header = Header::with_i32_ext_class();
        header.point_count = table.len() as u64;
        header.bounding_volume = table.bounds();
        header.offset = header.bounding_volume.min;
        Self { header, table }
    }

    pub fn from_parts(header: Header, table: LabelTable) -> Self {
        Self { header, table }
    }

    pub fn table(&self) -> &LabelTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut LabelTable {
        &mut self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn classification(&self) -> &[i32] {
        self.table.classification()
    }
}
