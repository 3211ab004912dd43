use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use iccalc::data::loader;
use iccalc::data::model::Dataset;
use iccalc::pipeline::{merge_results, IccPipeline, Partition, ResultTable};
use iccalc::report;
use iccalc::stats::varcomp::{AnovaDecomposer, VarianceDecomposer};

/// Compute per-feature inter-device agreement (ICC) from a measurement table.
#[derive(Parser)]
#[command(name = "iccalc", version, about)]
struct Args {
    /// Measurement table to analyze (.csv or .parquet).
    input: PathBuf,

    /// Where to write the result table (.csv or .json).
    #[arg(short, long, default_value = "icc_results.csv")]
    output: PathBuf,

    /// Variance-fitting backend.
    #[arg(long, value_enum, default_value_t = Method::Reml)]
    method: Method,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    /// Restricted maximum likelihood (profiled one-dimensional search).
    Reml,
    /// Closed-form one-way ANOVA moments.
    Anova,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let dataset = loader::load_file(&args.input)
        .with_context(|| format!("loading {}", args.input.display()))?;
    log::info!(
        "loaded {} record(s), {} feature(s), {} device(s)",
        dataset.len(),
        dataset.feature_names.len(),
        dataset.devices.len()
    );

    // One partition per section actually present in the data; a table with
    // only longitudinal samples simply produces no transverse rows.
    let partitions: Vec<Partition> = dataset.sections.iter().map(|s| Partition::new(*s)).collect();

    let tables = match args.method {
        Method::Reml => run_partitions(&IccPipeline::new(), &dataset, &partitions),
        Method::Anova => {
            run_partitions(&IccPipeline::with_decomposer(AnovaDecomposer), &dataset, &partitions)
        }
    };
    let results = merge_results(tables)?;

    let failures = results.values().filter(|r| r.is_failure()).count();
    log::info!("{} result row(s), {} with errors", results.len(), failures);

    report::write_results(&args.output, &results)
        .with_context(|| format!("writing {}", args.output.display()))?;
    log::info!("results written to {}", args.output.display());
    Ok(())
}

fn run_partitions<D: VarianceDecomposer>(
    pipeline: &IccPipeline<D>,
    dataset: &Dataset,
    partitions: &[Partition],
) -> Vec<ResultTable> {
    partitions
        .iter()
        .map(|p| pipeline.run(dataset, p, &dataset.feature_names))
        .collect()
}
