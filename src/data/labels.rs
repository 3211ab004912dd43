use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::model::{Device, Section};

// ---------------------------------------------------------------------------
// Sample-name label extraction
// ---------------------------------------------------------------------------

/// Device codes embedded in sample names: `F`, `S` or `X`.
static DEVICE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[FSX]").expect("valid device regex"));
/// Section codes embedded in sample names: `L` or `T`.
static SECTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[LT]").expect("valid section regex"));

/// Labels derived from one sample name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleLabels {
    /// The name with its device code removed. Scans of the same subject on
    /// different devices therefore map to the same subject identifier.
    pub subject: String,
    pub device: Device,
    pub section: Section,
}

/// A sample name the fixed naming convention cannot account for. Raised at
/// ingest so no record ever enters the pipeline with an undefined device or
/// partition; the loader treats every variant as fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("sample name `{name}` contains no device code (expected one of F, S, X)")]
    MissingDevice { name: String },

    #[error("sample name `{name}` contains {count} device codes, expected exactly one")]
    AmbiguousDevice { name: String, count: usize },

    #[error("sample name `{name}` contains no section code (expected L or T)")]
    MissingSection { name: String },

    #[error("sample name `{name}` contains {count} section codes, expected exactly one")]
    AmbiguousSection { name: String, count: usize },
}

/// Extract `(subject, device, section)` from a raw sample name.
///
/// The naming convention guarantees exactly one device code and exactly one
/// section code per name; anything else is an error, never a silent absent
/// label.
pub fn parse(name: &str) -> Result<SampleLabels, LabelError> {
    let device_hits: Vec<_> = DEVICE_RE.find_iter(name).collect();
    let device_match = match device_hits.as_slice() {
        [] => {
            return Err(LabelError::MissingDevice {
                name: name.to_string(),
            })
        }
        [only] => *only,
        many => {
            return Err(LabelError::AmbiguousDevice {
                name: name.to_string(),
                count: many.len(),
            })
        }
    };

    let section_hits: Vec<_> = SECTION_RE.find_iter(name).collect();
    let section_char = match section_hits.as_slice() {
        [] => {
            return Err(LabelError::MissingSection {
                name: name.to_string(),
            })
        }
        [only] => only.as_str().chars().next().unwrap_or('L'),
        many => {
            return Err(LabelError::AmbiguousSection {
                name: name.to_string(),
                count: many.len(),
            })
        }
    };

    let device_char = device_match
        .as_str()
        .chars()
        .next()
        .unwrap_or('F');
    let mut subject = String::with_capacity(name.len());
    subject.push_str(&name[..device_match.start()]);
    subject.push_str(&name[device_match.end()..]);

    // Section::from_code cannot fail here: the regex only matches L or T.
    let section = Section::from_code(section_char).unwrap_or(Section::Longitudinal);

    Ok(SampleLabels {
        subject,
        device: Device::new(device_char),
        section,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_all_three_labels() {
        let labels = parse("P012_F_L").expect("well-formed name");
        assert_eq!(labels.device, Device::new('F'));
        assert_eq!(labels.section, Section::Longitudinal);
        assert_eq!(labels.subject, "P012__L");
    }

    #[test]
    fn subjects_collapse_across_devices() {
        let a = parse("P012_F_T").expect("well-formed name");
        let b = parse("P012_S_T").expect("well-formed name");
        let c = parse("P012_X_T").expect("well-formed name");
        assert_eq!(a.subject, b.subject);
        assert_eq!(b.subject, c.subject);
        assert_eq!(a.section, Section::Transverse);
    }

    #[test]
    fn missing_device_code_is_loud() {
        let err = parse("P012__L").expect_err("no device code");
        assert_eq!(
            err,
            LabelError::MissingDevice {
                name: "P012__L".to_string()
            }
        );
    }

    #[test]
    fn ambiguous_device_code_is_loud() {
        let err = parse("FAX_01_L").expect_err("two device codes");
        assert_eq!(
            err,
            LabelError::AmbiguousDevice {
                name: "FAX_01_L".to_string(),
                count: 2
            }
        );
    }

    #[test]
    fn missing_section_code_is_loud() {
        let err = parse("P012_S_").expect_err("no section code");
        assert_eq!(
            err,
            LabelError::MissingSection {
                name: "P012_S_".to_string()
            }
        );
    }

    #[test]
    fn ambiguous_section_code_is_loud() {
        let err = parse("PLT_01_F").expect_err("two section codes");
        assert_eq!(
            err,
            LabelError::AmbiguousSection {
                name: "PLT_01_F".to_string(),
                count: 2
            }
        );
    }
}
