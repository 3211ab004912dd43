use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Device – which measuring device produced a record
// ---------------------------------------------------------------------------

/// Single-letter device code drawn from a fixed small alphabet (`F`, `S`, `X`
/// in the source naming convention). The core treats the code opaquely; only
/// the labels module knows the alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Device(char);

impl Device {
    pub fn new(code: char) -> Self {
        Device(code)
    }

    pub fn code(&self) -> char {
        self.0
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Section – which data partition a record belongs to
// ---------------------------------------------------------------------------

/// Scan section distinguishing the two mutually exclusive data partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    /// `L` records.
    Longitudinal,
    /// `T` records.
    Transverse,
}

impl Section {
    /// Single-letter code as it appears inside sample names.
    pub fn code(&self) -> char {
        match self {
            Section::Longitudinal => 'L',
            Section::Transverse => 'T',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'L' => Some(Section::Longitudinal),
            'T' => Some(Section::Transverse),
            _ => None,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// Record – one row of the source measurement table
// ---------------------------------------------------------------------------

/// A single measurement record (one row of the source table): one subject
/// scanned by one device in one section, with a value per feature column.
/// `None` is a missing cell.
#[derive(Debug, Clone)]
pub struct Record {
    /// Raw sample name as it appeared in the `Name` column.
    pub name: String,
    /// Subject identifier (the name with its device code removed, so scans
    /// of the same subject on different devices collapse together).
    pub subject: String,
    pub device: Device,
    pub section: Section,
    /// Feature column → value. Missing cells are `None`.
    pub values: BTreeMap<String, Option<f64>>,
}

impl Record {
    /// Value of a feature column, flattening "column absent" and "cell
    /// missing" into `None`.
    pub fn value(&self, feature: &str) -> Option<f64> {
        self.values.get(feature).copied().flatten()
    }
}

// ---------------------------------------------------------------------------
// Dataset – the complete loaded table
// ---------------------------------------------------------------------------

/// The full parsed dataset with pre-computed indexes.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// All records (rows).
    pub records: Vec<Record>,
    /// Feature column names in source-table order.
    pub feature_names: Vec<String>,
    /// Device universe observed across the whole table. A subject counts as
    /// fully measured only when it has a value from every device in here.
    pub devices: BTreeSet<Device>,
    /// Sections observed across the whole table.
    pub sections: BTreeSet<Section>,
}

impl Dataset {
    /// Build device/section indexes from the loaded records. Feature order
    /// is taken from the caller (the source table's column order), not from
    /// the rows, because results are reported in that order.
    pub fn from_records(records: Vec<Record>, feature_names: Vec<String>) -> Self {
        let mut devices = BTreeSet::new();
        let mut sections = BTreeSet::new();
        for rec in &records {
            devices.insert(rec.device);
            sections.insert(rec.section);
        }
        Dataset {
            records,
            feature_names,
            devices,
            sections,
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_section(&self, section: Section) -> bool {
        self.sections.contains(&section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, subject: &str, device: char, section: Section) -> Record {
        let mut values = BTreeMap::new();
        values.insert("volume".to_string(), Some(1.0));
        values.insert("entropy".to_string(), None);
        Record {
            name: name.to_string(),
            subject: subject.to_string(),
            device: Device::new(device),
            section,
            values,
        }
    }

    #[test]
    fn value_flattens_absent_and_missing() {
        let rec = record("P01_F_L", "P01__L", 'F', Section::Longitudinal);
        assert_eq!(rec.value("volume"), Some(1.0));
        assert_eq!(rec.value("entropy"), None);
        assert_eq!(rec.value("no_such_column"), None);
    }

    #[test]
    fn from_records_indexes_devices_and_sections() {
        let records = vec![
            record("P01_F_L", "P01__L", 'F', Section::Longitudinal),
            record("P01_S_L", "P01__L", 'S', Section::Longitudinal),
            record("P01_F_T", "P01__T", 'F', Section::Transverse),
        ];
        let ds = Dataset::from_records(records, vec!["volume".into(), "entropy".into()]);

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.devices.len(), 2);
        assert!(ds.has_section(Section::Longitudinal));
        assert!(ds.has_section(Section::Transverse));
        assert_eq!(ds.feature_names, vec!["volume", "entropy"]);
    }

    #[test]
    fn section_codes_round_trip() {
        assert_eq!(Section::from_code('L'), Some(Section::Longitudinal));
        assert_eq!(Section::from_code('T'), Some(Section::Transverse));
        assert_eq!(Section::from_code('Q'), None);
        assert_eq!(Section::Longitudinal.to_string(), "L");
    }
}
