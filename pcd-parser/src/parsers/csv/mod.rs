use std::{fs::File, path::PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};

use pcd_core::{
    error::{RelabelError, Result},
    remap::LabelMapping,
};

use super::mapping::{MappingSource, MappingTable};

/// Two-column label table: the first row is a header, then one
/// `old,new` pair per row. Extra columns are ignored.
pub struct CsvMappingSource {
    pub filename: PathBuf,
    pub delimiter: u8,
}

impl CsvMappingSource {
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            delimiter: b',',
        }
    }

    fn row_error(&self, row: usize, message: String) -> RelabelError {
        RelabelError::MappingSource {
            path: self.filename.clone(),
            row,
            message,
        }
    }

    fn parse_record(&self, row: usize, record: &StringRecord) -> Result<LabelMapping> {
        let (old_label, new_label) = match (record.get(0), record.get(1)) {
            (Some(old_label), Some(new_label)) => (old_label, new_label),
            _ => {
                return Err(self.row_error(
                    row,
                    format!("expected two columns, found {}", record.len()),
                ))
            }
        };
        LabelMapping::parse(old_label, new_label).map_err(|e| self.row_error(row, e.to_string()))
    }
}

impl MappingSource for CsvMappingSource {
    fn read_mappings(&self) -> Result<MappingTable> {
        let file = File::open(&self.filename).map_err(|e| RelabelError::io(&self.filename, e))?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .delimiter(self.delimiter)
            .from_reader(file);

        let mut table = MappingTable::default();
        for (index, record) in reader.records().enumerate() {
            // row 1 is the header; blank lines are skipped by the reader
            let fallback_row = index + 2;
            let parsed = match record {
                Ok(record) if record.iter().all(|field| field.is_empty()) => continue,
                Ok(record) => {
                    let row = record
                        .position()
                        .map_or(fallback_row, |position| position.line() as usize);
                    self.parse_record(row, &record)
                }
                Err(e) => {
                    let row = e
                        .position()
                        .map_or(fallback_row, |position| position.line() as usize);
                    Err(self.row_error(row, e.to_string()))
                }
            };
            match parsed {
                Ok(mapping) => table.mappings.push(mapping),
                Err(e) => {
                    log::warn!("skipping mapping row: {}", e);
                    table.rejected.push(e);
                }
            }
        }

        log::info!(
            "read {} mappings from {:?} ({} rows rejected)",
            table.mappings.len(),
            self.filename,
            table.rejected.len()
        );
        Ok(table)
    }
}
