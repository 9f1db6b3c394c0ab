use super::{
    point::{PointAttributes, PointRecord},
    BoundingVolume,
};

/// Column-oriented storage of decoded records.
///
/// The remap engine only touches the classification column; every other
/// column is kept so that the encoder can re-emit the full record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTable {
    positions: Vec<[f64; 3]>,
    intensity: Vec<u16>,
    classification: Vec<i32>,
    attributes: Vec<PointAttributes>,
}

impl LabelTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            intensity: Vec::with_capacity(capacity),
            classification: Vec::with_capacity(capacity),
            attributes: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: PointRecord) {
        self.positions.push([record.x, record.y, record.z]);
        self.intensity.push(record.intensity);
        self.classification.push(record.classification);
        self.attributes.push(record.attributes);
    }

    pub fn len(&self) -> usize {
        self.classification.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classification.is_empty()
    }

    pub fn positions(&self) -> &[[f64; 3]] {
        &self.positions
    }

    pub fn intensity(&self) -> &[u16] {
        &self.intensity
    }

    pub fn classification(&self) -> &[i32] {
        &self.classification
    }

    pub fn attributes(&self) -> &[PointAttributes] {
        &self.attributes
    }

    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn set_classification(&mut self, index: usize, value: i32) {
        self.classification[index] = value;
    }

    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn record(&self, index: usize) -> PointRecord {
        let [x, y, z] = self.positions[index];
        PointRecord {
            x,
            y,
            z,
            intensity: self.intensity[index],
            classification: self.classification[index],
            attributes: self.attributes[index].clone(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ([f64; 3], u16, i32, &PointAttributes)> {
        self.positions
            .iter()
            .zip(&self.intensity)
            .zip(&self.classification)
            .zip(&self.attributes)
            .map(|(((position, intensity), classification), attributes)| {
                (*position, *intensity, *classification, attributes)
            })
    }

    pub fn bounds(&self) -> BoundingVolume {
        if self.positions.is_empty() {
            return BoundingVolume::default();
        }

        let mut bounding_volume = BoundingVolume {
            min: [f64::MAX, f64::MAX, f64::MAX],
            max: [f64::MIN, f64::MIN, f64::MIN],
        };
        for position in &self.positions {
            for axis in 0..3 {
                bounding_volume.min[axis] = bounding_volume.min[axis].min(position[axis]);
                bounding_volume.max[axis] = bounding_volume.max[axis].max(position[axis]);
            }
        }
        bounding_volume
    }
}

impl FromIterator<PointRecord> for LabelTable {
    fn from_iter<I: IntoIterator<Item = PointRecord>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut table = LabelTable::with_capacity(iter.size_hint().0);
        for record in iter {
            table.push(record);
        }
        table
    }
}
