use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use byteorder::{ByteOrder as _, LittleEndian, ReadBytesExt as _};

use pcd_core::{
    error::{RelabelError, Result},
    pointcloud::BoundingVolume,
};

pub const LAS_SIGNATURE: &[u8; 4] = b"LASF";
/// Public header block size of LAS 1.0 - 1.2.
pub const MIN_HEADER_LEN: usize = 227;
/// Public header block size of LAS 1.4.
pub const MAX_HEADER_LEN: usize = 375;

/// The fields of the public header block needed to validate a file before
/// handing it to the point reader.
#[derive(Debug, Clone, PartialEq)]
pub struct LasPreamble {
    pub version: (u8, u8),
    pub header_size: u16,
    pub offset_to_point_data: u32,
    pub point_format: u8,
    pub is_compressed: bool,
    pub record_length: u16,
    pub point_count: u64,
    pub scale: [f64; 3],
    pub offset: [f64; 3],
    pub bounding_volume: BoundingVolume,
}

impl LasPreamble {
    pub fn read_from<R: Read>(read: R, path: &Path) -> Result<Self> {
        let mut buf = Vec::with_capacity(MAX_HEADER_LEN);
        read.take(MAX_HEADER_LEN as u64)
            .read_to_end(&mut buf)
            .map_err(|e| RelabelError::io(path, e))?;
        Self::parse(&buf, path)
    }

    pub fn parse(buf: &[u8], path: &Path) -> Result<Self> {
        let format_error = |reason: String| RelabelError::Format {
            path: path.to_path_buf(),
            reason,
        };

        if buf.len() < LAS_SIGNATURE.len() || &buf[..4] != LAS_SIGNATURE {
            return Err(format_error("missing LASF signature".to_string()));
        }
        if buf.len() < MIN_HEADER_LEN {
            return Err(format_error(format!(
                "header is {} bytes, expected at least {MIN_HEADER_LEN}",
                buf.len()
            )));
        }

        let version = (buf[24], buf[25]);
        if version.0 != 1 || version.1 > 4 {
            return Err(format_error(format!(
                "unsupported LAS version {}.{}",
                version.0, version.1
            )));
        }

        let format_byte = buf[104];
        let legacy_count = LittleEndian::read_u32(&buf[107..111]) as u64;
        let point_count = if version.1 >= 4 && buf.len() >= 255 {
            match LittleEndian::read_u64(&buf[247..255]) {
                0 => legacy_count,
                count => count,
            }
        } else {
            legacy_count
        };

        let f64_at = |start: usize| LittleEndian::read_f64(&buf[start..start + 8]);

        Ok(Self {
            version,
            header_size: LittleEndian::read_u16(&buf[94..96]),
            offset_to_point_data: LittleEndian::read_u32(&buf[96..100]),
            point_format: format_byte & 0x3f,
            // LASzip sets bit 7 (and bit 6 for older writers)
            is_compressed: format_byte & 0xc0 != 0,
            record_length: LittleEndian::read_u16(&buf[105..107]),
            point_count,
            scale: [f64_at(131), f64_at(139), f64_at(147)],
            offset: [f64_at(155), f64_at(163), f64_at(171)],
            bounding_volume: BoundingVolume {
                min: [f64_at(187), f64_at(203), f64_at(219)],
                max: [f64_at(179), f64_at(195), f64_at(211)],
            },
        })
    }

    /// Reads the preamble and checks that the file is long enough to hold
    /// the declared point data.
    pub fn read_checked(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| RelabelError::io(path, e))?;
        let file_len = file
            .metadata()
            .map_err(|e| RelabelError::io(path, e))?
            .len();
        let preamble = Self::read_from(&mut file, path)?;
        if preamble.is_compressed {
            let chunk_table_offset =
                preamble.read_chunk_table_offset(&mut file, file_len, path)?;
            preamble.check_chunk_table(chunk_table_offset, file_len, path)?;
        } else {
            preamble.check_point_data(file_len, path)?;
        }
        Ok(preamble)
    }

    /// LAZ point data starts with the i64 position of its chunk table.
    fn read_chunk_table_offset<R: Read + Seek>(
        &self,
        read: &mut R,
        file_len: u64,
        path: &Path,
    ) -> Result<i64> {
        let start = self.offset_to_point_data as u64;
        if file_len < start + 8 {
            return Err(self.truncated_compressed(path));
        }
        read.seek(SeekFrom::Start(start))
            .map_err(|e| RelabelError::io(path, e))?;
        read.read_i64::<LittleEndian>()
            .map_err(|e| RelabelError::io(path, e))
    }

    /// A chunk table past the end of the file means the compressed stream was
    /// cut short. Writers that could not seek back leave the offset at -1.
    pub fn check_chunk_table(
        &self,
        chunk_table_offset: i64,
        file_len: u64,
        path: &Path,
    ) -> Result<()> {
        if chunk_table_offset > 0 && chunk_table_offset as u64 + 8 > file_len {
            return Err(self.truncated_compressed(path));
        }
        Ok(())
    }

    // records before the cut cannot be counted without decompressing
    fn truncated_compressed(&self, path: &Path) -> RelabelError {
        RelabelError::Truncated {
            path: PathBuf::from(path),
            expected: self.point_count,
            available: 0,
        }
    }

    pub fn check_point_data(&self, file_len: u64, path: &Path) -> Result<()> {
        if self.is_compressed || self.record_length == 0 {
            return Ok(());
        }
        let available_bytes = file_len.saturating_sub(self.offset_to_point_data as u64);
        let available = available_bytes / self.record_length as u64;
        if available < self.point_count {
            return Err(RelabelError::Truncated {
                path: PathBuf::from(path),
                expected: self.point_count,
                available,
            });
        }
        Ok(())
    }
}
