use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u16,
    pub g: u16,
    pub b: u16,
}

/// Per-point fields that are carried from the input record to the output
/// record without being interpreted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointAttributes {
    pub return_number: u8,
    pub number_of_returns: u8,
    pub scan_direction_flag: bool,
    pub edge_of_flight_line: bool,
    // the 8-bit LAS classification, not the relabeled one
    pub classification_byte: u8,
    pub is_synthetic: bool,
    pub is_key_point: bool,
    pub is_withheld: bool,
    pub is_overlap: bool,
    pub scanner_channel: u8,
    pub scan_angle: f32,
    pub user_data: u8,
    pub point_source_id: u16,
    pub gps_time: f64,
    pub color: Color,
    /// Raw extra bytes of the record, including the encoded `Ext_Class` value.
    pub extra_bytes: Vec<u8>,
}

// LAS data coordinates are stored as scaled i32 values.
// The real coordinates are recovered from the header scale and offset:
// x = (raw_x * scale[0]) + offset[0]
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub intensity: u16,
    /// Extended classification (`Ext_Class`), the field the remap engine edits.
    pub classification: i32,
    pub attributes: PointAttributes,
}

impl PointRecord {
    pub fn new(x: f64, y: f64, z: f64, intensity: u16, classification: i32) -> Self {
        Self {
            x,
            y,
            z,
            intensity,
            classification,
            attributes: PointAttributes::default(),
        }
    }

    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}
