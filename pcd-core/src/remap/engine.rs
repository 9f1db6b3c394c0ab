use std::collections::{BTreeMap, HashMap};

use crate::{
    error::{RelabelError, Result},
    pointcloud::PointCloud,
};

use super::{LabelMapping, LabelSet, RemapEntry, RemapReport};

/// Where the old label of each mapping has to exist before anything is
/// rewritten.
#[derive(Debug, Clone, Copy)]
pub enum Validation<'a> {
    /// The cloud's own labels, taken before the first mapping is applied.
    Strict,
    /// A label set gathered elsewhere, e.g. across every file of a batch.
    Universe(&'a LabelSet),
}

/// Applies label mappings in order over the mutated classification column,
/// so `1 -> 2` followed by `2 -> 3` sends original 1s to 3.
///
/// Validation happens before the first write: either every mapping applies
/// or the column is left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemapEngine;

impl RemapEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(&self, cloud: &mut PointCloud, mappings: &[LabelMapping]) -> Result<RemapReport> {
        self.apply_with(cloud, mappings, Validation::Strict)
    }

    pub fn apply_with_universe(
        &self,
        cloud: &mut PointCloud,
        mappings: &[LabelMapping],
        universe: &LabelSet,
    ) -> Result<RemapReport> {
        self.apply_with(cloud, mappings, Validation::Universe(universe))
    }

    pub fn apply_with(
        &self,
        cloud: &mut PointCloud,
        mappings: &[LabelMapping],
        validation: Validation<'_>,
    ) -> Result<RemapReport> {
        let field = cloud.header.ext_class;
        if let Some(mapping) = mappings.iter().find(|m| !field.accepts(m.new_label)) {
            return Err(RelabelError::invalid_label(
                mapping.new_label,
                format!(
                    "cannot be stored in the Ext_Class field (data type code {})",
                    field.data_type.code()
                ),
            ));
        }

        let histogram = histogram(cloud.classification());
        for mapping in mappings {
            let known = match validation {
                Validation::Strict => histogram.contains_key(&mapping.old_label),
                Validation::Universe(universe) => universe.contains(mapping.old_label),
            };
            if !known {
                return Err(RelabelError::UnknownLabel(mapping.old_label));
            }
        }

        // current label -> original labels that now carry it
        let mut groups: BTreeMap<i32, Vec<i32>> =
            histogram.keys().map(|&label| (label, vec![label])).collect();
        let mut counts: HashMap<i32, usize> = histogram.into_iter().collect();
        let mut entries = Vec::with_capacity(mappings.len());

        for &mapping in mappings {
            let LabelMapping {
                old_label,
                new_label,
            } = mapping;
            let records_changed = if old_label == new_label {
                0
            } else {
                if let Some(origins) = groups.remove(&old_label) {
                    groups.entry(new_label).or_default().extend(origins);
                }
                let moved = counts.remove(&old_label).unwrap_or(0);
                if moved > 0 {
                    *counts.entry(new_label).or_default() += moved;
                }
                moved
            };
            log::debug!("mapping {mapping}: {records_changed} records");
            entries.push(RemapEntry {
                mapping,
                records_changed,
            });
        }

        let rewrites: HashMap<i32, i32> = groups
            .into_iter()
            .flat_map(|(label, origins)| origins.into_iter().map(move |origin| (origin, label)))
            .filter(|(origin, label)| origin != label)
            .collect();

        if !rewrites.is_empty() {
            let table = cloud.table_mut();
            for index in 0..table.len() {
                if let Some(&label) = rewrites.get(&table.classification()[index]) {
                    table.set_classification(index, label);
                }
            }
        }

        Ok(RemapReport { entries })
    }
}

fn histogram(column: &[i32]) -> BTreeMap<i32, usize> {
    let mut histogram = BTreeMap::new();
    for &label in column {
        *histogram.entry(label).or_insert(0) += 1;
    }
    histogram
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcloud::{
        extra_bytes::{DataType, ExtClassField},
        point::PointRecord,
    };

    fn cloud(labels: &[i32]) -> PointCloud {
        let records = labels
            .iter()
            .enumerate()
            .map(|(i, &label)| PointRecord::new(i as f64, 0.0, 0.0, 0, label))
            .collect();
        PointCloud::new(records)
    }

    fn changed(report: &RemapReport) -> Vec<usize> {
        report.entries.iter().map(|e| e.records_changed).collect()
    }

    #[test]
    fn single_mapping() {
        let mut cloud = cloud(&[1, 2, 1, 3]);
        let report = RemapEngine::new()
            .apply(&mut cloud, &[LabelMapping::new(1, 7)])
            .unwrap();
        assert_eq!(cloud.classification(), &[7, 2, 7, 3]);
        assert_eq!(changed(&report), vec![2]);
        assert_eq!(report.total_changed(), 2);
    }

    #[test]
    fn identity_mapping_changes_nothing() {
        let mut cloud = cloud(&[5, 5, 1]);
        let report = RemapEngine::new()
            .apply(&mut cloud, &[LabelMapping::new(5, 5)])
            .unwrap();
        assert_eq!(cloud.classification(), &[5, 5, 1]);
        assert_eq!(changed(&report), vec![0]);
    }

    #[test]
    fn mappings_chain() {
        let mut cloud = cloud(&[1, 1, 2]);
        let report = RemapEngine::new()
            .apply(
                &mut cloud,
                &[LabelMapping::new(1, 2), LabelMapping::new(2, 3)],
            )
            .unwrap();
        assert_eq!(cloud.classification(), &[3, 3, 3]);
        assert_eq!(changed(&report), vec![2, 3]);
    }

    #[test]
    fn chain_order_matters() {
        let mut cloud = cloud(&[1, 1, 2]);
        let report = RemapEngine::new()
            .apply(
                &mut cloud,
                &[LabelMapping::new(2, 3), LabelMapping::new(1, 2)],
            )
            .unwrap();
        assert_eq!(cloud.classification(), &[2, 2, 3]);
        assert_eq!(changed(&report), vec![1, 2]);
    }

    #[test]
    fn swap_through_temporary_label() {
        let mut cloud = cloud(&[1, 2, 9, 1]);
        RemapEngine::new()
            .apply(
                &mut cloud,
                &[
                    LabelMapping::new(1, 9),
                    LabelMapping::new(2, 1),
                    LabelMapping::new(9, 2),
                ],
            )
            .unwrap();
        // 9 collects both the original 9 and the former 1s before moving to 2
        assert_eq!(cloud.classification(), &[2, 1, 2, 2]);
    }

    #[test]
    fn unknown_label_leaves_column_untouched() {
        let mut cloud = cloud(&[1, 2, 1]);
        let err = RemapEngine::new()
            .apply(
                &mut cloud,
                &[LabelMapping::new(1, 9), LabelMapping::new(99, 1)],
            )
            .unwrap_err();
        assert!(matches!(err, RelabelError::UnknownLabel(99)));
        assert_eq!(cloud.classification(), &[1, 2, 1]);
    }

    #[test]
    fn validation_uses_pre_remap_labels() {
        // 9 only exists after the first mapping ran
        let mut cloud = cloud(&[1, 2]);
        let err = RemapEngine::new()
            .apply(
                &mut cloud,
                &[LabelMapping::new(1, 9), LabelMapping::new(9, 4)],
            )
            .unwrap_err();
        assert!(matches!(err, RelabelError::UnknownLabel(9)));
        assert_eq!(cloud.classification(), &[1, 2]);
    }

    #[test]
    fn universe_accepts_labels_missing_locally() {
        let mut cloud = cloud(&[1, 2]);
        let universe = LabelSet::from_column(&[1, 2, 6]);
        let report = RemapEngine::new()
            .apply_with_universe(
                &mut cloud,
                &[LabelMapping::new(6, 1), LabelMapping::new(2, 4)],
                &universe,
            )
            .unwrap();
        assert_eq!(cloud.classification(), &[1, 4]);
        assert_eq!(changed(&report), vec![0, 1]);

        let err = RemapEngine::new()
            .apply_with_universe(&mut cloud, &[LabelMapping::new(8, 1)], &universe)
            .unwrap_err();
        assert!(matches!(err, RelabelError::UnknownLabel(8)));
    }

    #[test]
    fn new_label_must_fit_field() {
        let mut cloud = cloud(&[1, 2]);
        cloud.header.ext_class = ExtClassField {
            data_type: DataType::U8,
            ..Default::default()
        };
        let err = RemapEngine::new()
            .apply(
                &mut cloud,
                &[LabelMapping::new(1, 3), LabelMapping::new(2, 256)],
            )
            .unwrap_err();
        assert!(matches!(err, RelabelError::InvalidLabelFormat { .. }));
        assert_eq!(cloud.classification(), &[1, 2]);
    }

    #[test]
    fn empty_mapping_list() {
        let mut cloud = cloud(&[4, 4]);
        let report = RemapEngine::new().apply(&mut cloud, &[]).unwrap();
        assert!(report.entries.is_empty());
        assert_eq!(cloud.classification(), &[4, 4]);
    }
}
