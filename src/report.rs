use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::pipeline::{IccOutcome, ResultTable};

/// Write the merged result table to a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`  – columns `feature,icc,ci_low,ci_high,error`
/// * `.json` – object keyed by feature, estimates and errors as sub-objects
pub fn write_results(path: &Path, results: &ResultTable) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => write_csv(path, results),
        "json" => write_json(path, results),
        other => bail!("Unsupported output extension: .{other}"),
    }
}

/// One row per key; estimate rows leave the error cell empty and error rows
/// leave the numeric cells empty.
fn write_csv(path: &Path, results: &ResultTable) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer
        .write_record(["feature", "icc", "ci_low", "ci_high", "error"])
        .context("writing CSV header")?;

    for (key, outcome) in results {
        match outcome {
            IccOutcome::Estimate(est) => {
                let icc = est.icc.to_string();
                let lo = est.ci_low.to_string();
                let hi = est.ci_high.to_string();
                writer.write_record([key.as_str(), icc.as_str(), lo.as_str(), hi.as_str(), ""])
            }
            IccOutcome::Failed(err) => {
                let message = err.to_string();
                writer.write_record([key.as_str(), "", "", "", message.as_str()])
            }
        }
        .with_context(|| format!("writing result row for '{key}'"))?;
    }

    writer.flush().context("flushing CSV output")?;
    Ok(())
}

fn write_json(path: &Path, results: &ResultTable) -> Result<()> {
    let mut root = serde_json::Map::new();
    for (key, outcome) in results {
        let row = match outcome {
            IccOutcome::Estimate(est) => {
                serde_json::to_value(est).context("serializing estimate")?
            }
            IccOutcome::Failed(err) => serde_json::json!({ "error": err.to_string() }),
        };
        root.insert(key.clone(), row);
    }

    let text = serde_json::to_string_pretty(&serde_json::Value::Object(root))
        .context("serializing JSON results")?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
