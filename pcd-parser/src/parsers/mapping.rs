use pcd_core::{
    error::{RelabelError, Result},
    remap::LabelMapping,
};

/// Produces the mapping list consumed by the remap engine.
pub trait MappingSource {
    fn read_mappings(&self) -> Result<MappingTable>;
}

/// Mappings that parsed, in source order, and the rows that did not.
#[derive(Debug, Default)]
pub struct MappingTable {
    pub mappings: Vec<LabelMapping>,
    pub rejected: Vec<RelabelError>,
}

impl MappingTable {
    pub fn extend(&mut self, other: MappingTable) {
        self.mappings.extend(other.mappings);
        self.rejected.extend(other.rejected);
    }
}

/// Mappings typed in by hand as `OLD:NEW`. Unlike tabular input, a single
/// malformed entry fails the whole list.
#[derive(Debug, Clone, Default)]
pub struct ManualEntry {
    pub entries: Vec<String>,
}

impl MappingSource for ManualEntry {
    fn read_mappings(&self) -> Result<MappingTable> {
        let mappings = self
            .entries
            .iter()
            .map(|entry| entry.parse::<LabelMapping>())
            .collect::<Result<Vec<_>>>()?;
        Ok(MappingTable {
            mappings,
            rejected: Vec::new(),
        })
    }
}
