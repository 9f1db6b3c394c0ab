//! Extra Bytes VLR descriptors (LAS 1.4 R15, section 2.5) and the
//! `Ext_Class` field they locate inside each point record.

use byteorder::{ByteOrder as _, LittleEndian};
use las::Vlr;

use crate::error::{RelabelError, Result};

pub const EXTRA_BYTES_USER_ID: &str = "LASF_Spec";
pub const EXTRA_BYTES_RECORD_ID: u16 = 4;
pub const DESCRIPTOR_LEN: usize = 192;
pub const EXT_CLASS_NAME: &str = "Ext_Class";

const OPTION_SCALE: u8 = 1 << 3;
const OPTION_OFFSET: u8 = 1 << 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Opaque bytes, the options field holds the byte count.
    Undocumented(u8),
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// Two- and three-element arrays (codes 11..=30), deprecated in LAS 1.4.
    Deprecated(u8),
}

impl DataType {
    pub fn from_code(code: u8, options: u8) -> Option<Self> {
        let data_type = match code {
            0 => DataType::Undocumented(options),
            1 => DataType::U8,
            2 => DataType::I8,
            3 => DataType::U16,
            4 => DataType::I16,
            5 => DataType::U32,
            6 => DataType::I32,
            7 => DataType::U64,
            8 => DataType::I64,
            9 => DataType::F32,
            10 => DataType::F64,
            11..=30 => DataType::Deprecated(code),
            _ => return None,
        };
        Some(data_type)
    }

    pub fn code(self) -> u8 {
        match self {
            DataType::Undocumented(_) => 0,
            DataType::U8 => 1,
            DataType::I8 => 2,
            DataType::U16 => 3,
            DataType::I16 => 4,
            DataType::U32 => 5,
            DataType::I32 => 6,
            DataType::U64 => 7,
            DataType::I64 => 8,
            DataType::F32 => 9,
            DataType::F64 => 10,
            DataType::Deprecated(code) => code,
        }
    }

    pub fn size(self) -> usize {
        match self {
            DataType::Undocumented(len) => len as usize,
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::U64 | DataType::I64 | DataType::F64 => 8,
            DataType::Deprecated(code) => {
                let base = (code - 1) % 10 + 1;
                let count = if code <= 20 { 2 } else { 3 };
                DataType::from_code(base, 0).map_or(0, DataType::size) * count
            }
        }
    }

    /// Inclusive range of the stored value, `None` for floating point types.
    fn integer_range(self) -> Option<(f64, f64)> {
        match self {
            DataType::U8 => Some((0.0, u8::MAX as f64)),
            DataType::I8 => Some((i8::MIN as f64, i8::MAX as f64)),
            DataType::U16 => Some((0.0, u16::MAX as f64)),
            DataType::I16 => Some((i16::MIN as f64, i16::MAX as f64)),
            DataType::U32 => Some((0.0, u32::MAX as f64)),
            DataType::I32 => Some((i32::MIN as f64, i32::MAX as f64)),
            DataType::U64 => Some((0.0, u64::MAX as f64)),
            DataType::I64 => Some((i64::MIN as f64, i64::MAX as f64)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtraBytesDescriptor {
    pub name: String,
    pub data_type: DataType,
    pub scale: Option<f64>,
    pub offset: Option<f64>,
    pub description: String,
}

impl ExtraBytesDescriptor {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            scale: None,
            offset: None,
            description: String::new(),
        }
    }

    /// Returns `None` for a data type code outside the documented range.
    pub fn from_bytes(buf: &[u8; DESCRIPTOR_LEN]) -> Option<Self> {
        let options = buf[3];
        let data_type = DataType::from_code(buf[2], options)?;
        let scale = (options & OPTION_SCALE != 0).then(|| LittleEndian::read_f64(&buf[112..120]));
        let offset =
            (options & OPTION_OFFSET != 0).then(|| LittleEndian::read_f64(&buf[136..144]));

        Some(Self {
            name: nul_terminated(&buf[4..36]),
            data_type,
            scale,
            offset,
            description: nul_terminated(&buf[160..192]),
        })
    }

    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_LEN] {
        let mut buf = [0u8; DESCRIPTOR_LEN];
        let mut options = match self.data_type {
            DataType::Undocumented(len) => len,
            _ => 0,
        };
        if let Some(scale) = self.scale {
            options |= OPTION_SCALE;
            LittleEndian::write_f64(&mut buf[112..120], scale);
        }
        if let Some(offset) = self.offset {
            options |= OPTION_OFFSET;
            LittleEndian::write_f64(&mut buf[136..144], offset);
        }
        buf[2] = self.data_type.code();
        buf[3] = options;
        copy_truncated(&mut buf[4..36], &self.name);
        copy_truncated(&mut buf[160..192], &self.description);
        buf
    }
}

fn nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

fn copy_truncated(dst: &mut [u8], src: &str) {
    let len = src.len().min(dst.len());
    dst[..len].copy_from_slice(&src.as_bytes()[..len]);
}

pub fn is_descriptor_vlr(vlr: &Vlr) -> bool {
    vlr.user_id == EXTRA_BYTES_USER_ID && vlr.record_id == EXTRA_BYTES_RECORD_ID
}

/// Parses every complete descriptor in an Extra Bytes VLR payload.
pub fn parse_descriptors(data: &[u8]) -> std::result::Result<Vec<ExtraBytesDescriptor>, String> {
    data.chunks_exact(DESCRIPTOR_LEN)
        .enumerate()
        .map(|(i, chunk)| {
            let buf: &[u8; DESCRIPTOR_LEN] = chunk
                .try_into()
                .map_err(|_| format!("descriptor {i} is incomplete"))?;
            ExtraBytesDescriptor::from_bytes(buf)
                .ok_or_else(|| format!("descriptor {i} has an unknown data type ({})", buf[2]))
        })
        .collect()
}

pub fn descriptors_vlr(descriptors: &[ExtraBytesDescriptor]) -> Vlr {
    let mut data = Vec::with_capacity(descriptors.len() * DESCRIPTOR_LEN);
    for descriptor in descriptors {
        data.extend_from_slice(&descriptor.to_bytes());
    }
    Vlr {
        user_id: EXTRA_BYTES_USER_ID.to_string(),
        record_id: EXTRA_BYTES_RECORD_ID,
        description: "Extra Bytes Record".to_string(),
        data,
    }
}

/// Position and encoding of the extended classification inside a record's
/// extra bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtClassField {
    pub byte_offset: usize,
    pub data_type: DataType,
    pub scale: f64,
    pub offset: f64,
}

impl Default for ExtClassField {
    fn default() -> Self {
        Self {
            byte_offset: 0,
            data_type: DataType::I32,
            scale: 1.0,
            offset: 0.0,
        }
    }
}

impl ExtClassField {
    /// Finds `Ext_Class` among the descriptors. Descriptors are laid out
    /// back to back in the order they are declared.
    pub fn locate(
        descriptors: &[ExtraBytesDescriptor],
        extra_bytes_len: usize,
    ) -> std::result::Result<Self, String> {
        let mut byte_offset = 0;
        for descriptor in descriptors {
            if descriptor.name == EXT_CLASS_NAME {
                let data_type = descriptor.data_type;
                if matches!(
                    data_type,
                    DataType::Undocumented(_) | DataType::Deprecated(_)
                ) {
                    return Err(format!(
                        "data type code {} cannot hold a label",
                        data_type.code()
                    ));
                }
                let field = Self {
                    byte_offset,
                    data_type,
                    scale: descriptor.scale.unwrap_or(1.0),
                    offset: descriptor.offset.unwrap_or(0.0),
                };
                if field.end() > extra_bytes_len {
                    return Err(format!(
                        "field ends at byte {} but records carry {} extra bytes",
                        field.end(),
                        extra_bytes_len
                    ));
                }
                if field.scale == 0.0 {
                    return Err("descriptor scale is zero".to_string());
                }
                return Ok(field);
            }
            byte_offset += descriptor.data_type.size();
        }
        Err("no extra-bytes descriptor with this name".to_string())
    }

    pub fn end(&self) -> usize {
        self.byte_offset + self.data_type.size()
    }

    pub fn read(&self, extra_bytes: &[u8]) -> Result<i32> {
        let bytes = extra_bytes
            .get(self.byte_offset..self.end())
            .ok_or_else(|| {
                RelabelError::invalid_label(
                    format!("{extra_bytes:?}"),
                    "record is shorter than the Ext_Class field",
                )
            })?;
        let raw = match self.data_type {
            DataType::U8 => bytes[0] as f64,
            DataType::I8 => bytes[0] as i8 as f64,
            DataType::U16 => LittleEndian::read_u16(bytes) as f64,
            DataType::I16 => LittleEndian::read_i16(bytes) as f64,
            DataType::U32 => LittleEndian::read_u32(bytes) as f64,
            DataType::I32 => LittleEndian::read_i32(bytes) as f64,
            DataType::U64 => LittleEndian::read_u64(bytes) as f64,
            DataType::I64 => LittleEndian::read_i64(bytes) as f64,
            DataType::F32 => LittleEndian::read_f32(bytes) as f64,
            DataType::F64 => LittleEndian::read_f64(bytes),
            DataType::Undocumented(_) | DataType::Deprecated(_) => {
                return Err(RelabelError::invalid_label(
                    format!("{bytes:?}"),
                    "Ext_Class has no numeric data type",
                ))
            }
        };

        let value = raw * self.scale + self.offset;
        if !value.is_finite() || value.fract() != 0.0 {
            return Err(RelabelError::invalid_label(value, "not an integer"));
        }
        if value < i32::MIN as f64 || value > i32::MAX as f64 {
            return Err(RelabelError::invalid_label(value, "outside the i32 range"));
        }
        Ok(value as i32)
    }

    fn raw_value(&self, label: i32) -> std::result::Result<f64, String> {
        let raw = (label as f64 - self.offset) / self.scale;
        match self.data_type.integer_range() {
            Some((min, max)) => {
                let raw = raw.round();
                if raw < min || raw > max {
                    return Err(format!(
                        "does not fit data type code {}",
                        self.data_type.code()
                    ));
                }
                if raw * self.scale + self.offset != label as f64 {
                    return Err(format!(
                        "not representable with scale {} and offset {}",
                        self.scale, self.offset
                    ));
                }
                Ok(raw)
            }
            None if self.data_type == DataType::F32 && (raw as f32) as f64 != raw => {
                Err("not representable as f32".to_string())
            }
            None => Ok(raw),
        }
    }

    pub fn accepts(&self, label: i32) -> bool {
        self.raw_value(label).is_ok()
    }

    pub fn write(&self, extra_bytes: &mut [u8], label: i32) -> Result<()> {
        let raw = self
            .raw_value(label)
            .map_err(|reason| RelabelError::invalid_label(label, reason))?;
        let end = self.end();
        let bytes = extra_bytes
            .get_mut(self.byte_offset..end)
            .ok_or_else(|| {
                RelabelError::invalid_label(label, "record is shorter than the Ext_Class field")
            })?;
        match self.data_type {
            DataType::U8 => bytes[0] = raw as u8,
            DataType::I8 => bytes[0] = raw as i8 as u8,
            DataType::U16 => LittleEndian::write_u16(bytes, raw as u16),
            DataType::I16 => LittleEndian::write_i16(bytes, raw as i16),
            DataType::U32 => LittleEndian::write_u32(bytes, raw as u32),
            DataType::I32 => LittleEndian::write_i32(bytes, raw as i32),
            DataType::U64 => LittleEndian::write_u64(bytes, raw as u64),
            DataType::I64 => LittleEndian::write_i64(bytes, raw as i64),
            DataType::F32 => LittleEndian::write_f32(bytes, raw as f32),
            DataType::F64 => LittleEndian::write_f64(bytes, raw),
            DataType::Undocumented(_) | DataType::Deprecated(_) => {
                return Err(RelabelError::invalid_label(
                    label,
                    "Ext_Class has no numeric data type",
                ))
            }
        }
        Ok(())
    }
}
