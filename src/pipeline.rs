use std::collections::BTreeMap;

use anyhow::{bail, Result};

use crate::data::filter;
use crate::data::model::{Dataset, Section};
use crate::error::IccError;
use crate::stats::icc::{self, IccEstimate};
use crate::stats::varcomp::{RemlDecomposer, VarianceDecomposer};

// ---------------------------------------------------------------------------
// Partitions and result rows
// ---------------------------------------------------------------------------

/// One analyzed slice of the dataset: a section filter paired with the tag
/// appended to every result key the slice produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub tag: String,
    pub section: Section,
}

impl Partition {
    pub fn new(section: Section) -> Self {
        Partition {
            tag: section.code().to_string(),
            section,
        }
    }

    pub fn longitudinal() -> Self {
        Self::new(Section::Longitudinal)
    }

    pub fn transverse() -> Self {
        Self::new(Section::Transverse)
    }
}

/// One row of the result table. A failed feature stays in the table with
/// its error instead of aborting the run.
#[derive(Debug, Clone, PartialEq)]
pub enum IccOutcome {
    Estimate(IccEstimate),
    Failed(IccError),
}

impl IccOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, IccOutcome::Failed(_))
    }
}

/// Result rows keyed by `"{feature}_{tag}"`, ordered for stable output.
pub type ResultTable = BTreeMap<String, IccOutcome>;

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Runs filter, variance fit, and estimation for every requested feature of
/// a partition, one feature at a time.
pub struct IccPipeline<D: VarianceDecomposer> {
    decomposer: D,
}

impl IccPipeline<RemlDecomposer> {
    pub fn new() -> Self {
        IccPipeline {
            decomposer: RemlDecomposer::new(),
        }
    }
}

impl Default for IccPipeline<RemlDecomposer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: VarianceDecomposer> IccPipeline<D> {
    pub fn with_decomposer(decomposer: D) -> Self {
        IccPipeline { decomposer }
    }

    /// Analyze every feature within one partition. Failures are recorded as
    /// rows and never abort the loop.
    pub fn run(
        &self,
        dataset: &Dataset,
        partition: &Partition,
        features: &[String],
    ) -> ResultTable {
        let mut table = ResultTable::new();
        for feature in features {
            let key = format!("{feature}_{}", partition.tag);
            match self.analyze(dataset, partition.section, feature) {
                Ok(est) => {
                    log::debug!("{key}: icc={:.4}", est.icc);
                    table.insert(key, IccOutcome::Estimate(est));
                }
                Err(err) => {
                    log::warn!("{key}: {err}");
                    table.insert(key, IccOutcome::Failed(err));
                }
            }
        }
        table
    }

    fn analyze(
        &self,
        dataset: &Dataset,
        section: Section,
        feature: &str,
    ) -> Result<IccEstimate, IccError> {
        let subset = filter::select(dataset, section, feature)?;
        let components = self.decomposer.fit(&subset)?;
        icc::estimate(components)
    }
}

/// Merge per-partition tables into one report. Partitions must produce
/// disjoint keys; a collision means the same feature/tag pair was analyzed
/// twice and the run is misconfigured.
pub fn merge_results(tables: Vec<ResultTable>) -> Result<ResultTable> {
    let mut merged = ResultTable::new();
    for table in tables {
        for (key, row) in table {
            if merged.contains_key(&key) {
                bail!("duplicate result key `{key}` while merging partitions");
            }
            merged.insert(key, row);
        }
    }
    Ok(merged)
}
