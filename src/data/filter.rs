use std::collections::{BTreeMap, BTreeSet};

use crate::error::IccError;

use super::model::{Dataset, Device, Section};

// ---------------------------------------------------------------------------
// FilteredSubset – the rows admissible for one feature's ICC estimate
// ---------------------------------------------------------------------------

/// One long-form observation of the feature under test. Values are never
/// missing here; missing cells were dropped during filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub subject: String,
    pub device: Device,
    pub value: f64,
}

/// A feature's filtered view of the dataset: device-labelled values from
/// subjects with complete device coverage. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct FilteredSubset {
    feature: String,
    observations: Vec<Observation>,
    devices: BTreeSet<Device>,
}

impl FilteredSubset {
    /// Build a subset directly from observations. `select` is the normal
    /// producer; this constructor exists so the variance decomposer can be
    /// driven (and re-validated) in isolation.
    pub fn new(feature: impl Into<String>, observations: Vec<Observation>) -> Self {
        let devices = observations.iter().map(|obs| obs.device).collect();
        FilteredSubset {
            feature: feature.into(),
            observations,
            devices,
        }
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Distinct devices present in the subset.
    pub fn devices(&self) -> &BTreeSet<Device> {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Values grouped by device, in device order.
    pub fn device_groups(&self) -> BTreeMap<Device, Vec<f64>> {
        let mut groups: BTreeMap<Device, Vec<f64>> = BTreeMap::new();
        for obs in &self.observations {
            groups.entry(obs.device).or_default().push(obs.value);
        }
        groups
    }
}

// ---------------------------------------------------------------------------
// Record filter
// ---------------------------------------------------------------------------

/// Select the observations of `feature` that may enter the ICC estimate for
/// one partition.
///
/// In order:
/// 1. restrict to records of the partition's section;
/// 2. drop records whose cell for `feature` is missing;
/// 3. keep only subjects that still have a value from *every* device in the
///    dataset's device universe; a subject with partial coverage is
///    excluded entirely, not partially used;
/// 4. [`IccError::EmptyFeature`] when nothing usable remains (unknown
///    feature, entirely missing, or all subjects incomplete);
/// 5. [`IccError::InsufficientGroups`] when fewer than two devices remain.
///
/// Pure function over its inputs; the dataset is only read.
pub fn select(
    dataset: &Dataset,
    section: Section,
    feature: &str,
) -> Result<FilteredSubset, IccError> {
    let expected_devices = dataset.devices.len();

    // Non-missing values per subject, partition rows only.
    let mut coverage: BTreeMap<&str, BTreeMap<Device, f64>> = BTreeMap::new();
    for rec in &dataset.records {
        if rec.section != section {
            continue;
        }
        if let Some(value) = rec.value(feature) {
            coverage
                .entry(rec.subject.as_str())
                .or_default()
                .insert(rec.device, value);
        }
    }

    if coverage.is_empty() {
        // Unknown feature column or entirely missing within the partition.
        return Err(IccError::EmptyFeature {
            feature: feature.to_string(),
        });
    }

    let complete: BTreeSet<&str> = coverage
        .iter()
        .filter(|(_, per_device)| per_device.len() == expected_devices)
        .map(|(subject, _)| *subject)
        .collect();

    // Second pass keeps the source row order for the surviving records.
    let mut observations = Vec::new();
    for rec in &dataset.records {
        if rec.section != section || !complete.contains(rec.subject.as_str()) {
            continue;
        }
        if let Some(value) = rec.value(feature) {
            observations.push(Observation {
                subject: rec.subject.clone(),
                device: rec.device,
                value,
            });
        }
    }

    if observations.is_empty() {
        return Err(IccError::EmptyFeature {
            feature: feature.to_string(),
        });
    }

    let subset = FilteredSubset::new(feature, observations);
    let found = subset.devices().len();
    if found < 2 {
        return Err(IccError::InsufficientGroups {
            feature: feature.to_string(),
            found,
        });
    }

    Ok(subset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Record;

    /// Rows are (subject, device, section, feature values in order of `features`).
    fn dataset(features: &[&str], rows: &[(&str, char, Section, &[Option<f64>])]) -> Dataset {
        let records = rows
            .iter()
            .map(|(subject, device, section, values)| {
                let cells = features
                    .iter()
                    .zip(values.iter())
                    .map(|(f, v)| (f.to_string(), *v))
                    .collect();
                Record {
                    name: format!("{subject}_{device}_{section}"),
                    subject: subject.to_string(),
                    device: Device::new(*device),
                    section: *section,
                    values: cells,
                }
            })
            .collect();
        Dataset::from_records(records, features.iter().map(|f| f.to_string()).collect())
    }

    const L: Section = Section::Longitudinal;
    const T: Section = Section::Transverse;

    #[test]
    fn complete_subjects_pass_through() {
        let ds = dataset(
            &["vol"],
            &[
                ("p1", 'F', L, &[Some(1.0)]),
                ("p1", 'S', L, &[Some(2.0)]),
                ("p2", 'F', L, &[Some(3.0)]),
                ("p2", 'S', L, &[Some(4.0)]),
            ],
        );
        let subset = select(&ds, L, "vol").expect("both subjects complete");
        assert_eq!(subset.len(), 4);
        assert_eq!(subset.devices().len(), 2);
        let groups = subset.device_groups();
        assert_eq!(groups[&Device::new('F')], vec![1.0, 3.0]);
        assert_eq!(groups[&Device::new('S')], vec![2.0, 4.0]);
    }

    #[test]
    fn partial_coverage_excludes_the_whole_subject() {
        // p2 was measured by only 2 of the 3 devices: every p2 row must go,
        // not just the missing one.
        let ds = dataset(
            &["vol"],
            &[
                ("p1", 'F', L, &[Some(1.0)]),
                ("p1", 'S', L, &[Some(2.0)]),
                ("p1", 'X', L, &[Some(3.0)]),
                ("p2", 'F', L, &[Some(4.0)]),
                ("p2", 'S', L, &[Some(5.0)]),
            ],
        );
        let subset = select(&ds, L, "vol").expect("p1 is complete");
        assert_eq!(subset.len(), 3);
        assert!(subset.observations().iter().all(|obs| obs.subject == "p1"));
    }

    #[test]
    fn missing_cell_counts_as_no_coverage() {
        // p2 has an X row but its cell for `vol` is empty, so p2 is
        // incomplete for this feature.
        let ds = dataset(
            &["vol", "ent"],
            &[
                ("p1", 'F', L, &[Some(1.0), Some(9.0)]),
                ("p1", 'X', L, &[Some(2.0), Some(8.0)]),
                ("p2", 'F', L, &[Some(3.0), Some(7.0)]),
                ("p2", 'X', L, &[None, Some(6.0)]),
            ],
        );
        let vol = select(&ds, L, "vol").expect("p1 remains");
        assert_eq!(vol.len(), 2);
        assert!(vol.observations().iter().all(|obs| obs.subject == "p1"));

        // The same subject is complete for the other feature.
        let ent = select(&ds, L, "ent").expect("both subjects remain");
        assert_eq!(ent.len(), 4);
    }

    #[test]
    fn entirely_missing_feature_is_empty() {
        let ds = dataset(
            &["vol"],
            &[
                ("p1", 'F', L, &[None]),
                ("p1", 'S', L, &[None]),
            ],
        );
        let err = select(&ds, L, "vol").expect_err("no values at all");
        assert_eq!(
            err,
            IccError::EmptyFeature {
                feature: "vol".to_string()
            }
        );
    }

    #[test]
    fn unknown_feature_is_empty() {
        let ds = dataset(&["vol"], &[("p1", 'F', L, &[Some(1.0)])]);
        let err = select(&ds, L, "nope").expect_err("column does not exist");
        assert!(matches!(err, IccError::EmptyFeature { .. }));
    }

    #[test]
    fn other_partition_rows_do_not_leak() {
        let ds = dataset(
            &["vol"],
            &[
                ("p1", 'F', L, &[Some(1.0)]),
                ("p1", 'S', L, &[Some(2.0)]),
                ("p9", 'F', T, &[Some(100.0)]),
                ("p9", 'S', T, &[Some(200.0)]),
            ],
        );
        let subset = select(&ds, L, "vol").expect("longitudinal rows");
        assert_eq!(subset.len(), 2);
        assert!(subset.observations().iter().all(|obs| obs.value < 100.0));
    }

    #[test]
    fn single_device_universe_has_insufficient_groups() {
        let ds = dataset(
            &["vol"],
            &[("p1", 'F', L, &[Some(1.0)]), ("p2", 'F', L, &[Some(2.0)])],
        );
        let err = select(&ds, L, "vol").expect_err("one device only");
        assert_eq!(
            err,
            IccError::InsufficientGroups {
                feature: "vol".to_string(),
                found: 1
            }
        );
    }

    #[test]
    fn no_complete_subject_is_empty() {
        // Device X exists in the universe but never in this partition, so no
        // subject can be complete here.
        let ds = dataset(
            &["vol"],
            &[
                ("p1", 'F', L, &[Some(1.0)]),
                ("p1", 'S', L, &[Some(2.0)]),
                ("p9", 'X', T, &[Some(3.0)]),
            ],
        );
        let err = select(&ds, L, "vol").expect_err("universe has 3 devices");
        assert!(matches!(err, IccError::EmptyFeature { .. }));
    }
}
