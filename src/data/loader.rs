use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, AsArray, Float32Array, Float64Array, Int32Array, Int64Array};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::labels;
use super::model::{Dataset, Record};

/// Number of leading metadata columns before the feature block.
const METADATA_COLUMNS: usize = 4;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a measurement table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` / `.pq` – string `Name` column plus numeric feature columns
/// * `.csv`             – header row, same layout
///
/// Either way the first [`METADATA_COLUMNS`] columns are sample metadata
/// (one of them must be `Name`) and every later column is a feature.
pub fn load_file(path: &Path) -> Result<Dataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// Shared header and row plumbing
// ---------------------------------------------------------------------------

/// Locate the `Name` column inside the metadata block and split off the
/// feature column names.
fn feature_headers(headers: &[String]) -> Result<(usize, Vec<String>)> {
    if headers.len() <= METADATA_COLUMNS {
        bail!(
            "table has {} column(s), need {} metadata columns plus at least one feature",
            headers.len(),
            METADATA_COLUMNS
        );
    }
    let name_idx = headers[..METADATA_COLUMNS]
        .iter()
        .position(|h| h == "Name")
        .context("missing 'Name' column among the leading metadata columns")?;
    Ok((name_idx, headers[METADATA_COLUMNS..].to_vec()))
}

/// Coerce one raw cell to a numeric value.  Empty, unparsable, and NaN
/// cells all count as missing.
fn numeric_cell(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_nan() => None,
        Ok(v) => Some(v),
        Err(_) => None,
    }
}

/// Turn `(name, feature cells)` rows into a labelled dataset.  Names that
/// do not carry exactly one device and one section code are input errors,
/// as are two rows resolving to the same subject, device, and section.
fn build_dataset(features: Vec<String>, rows: Vec<(String, Vec<Option<f64>>)>) -> Result<Dataset> {
    let mut records = Vec::with_capacity(rows.len());
    let mut seen = BTreeSet::new();

    for (row_no, (name, cells)) in rows.into_iter().enumerate() {
        let parsed = labels::parse(&name).with_context(|| format!("row {row_no}"))?;
        if !seen.insert((parsed.subject.clone(), parsed.device, parsed.section)) {
            bail!(
                "row {row_no}: duplicate sample '{name}' for subject '{}' [{}/{}]",
                parsed.subject,
                parsed.device,
                parsed.section
            );
        }
        let values = features.iter().cloned().zip(cells).collect();
        records.push(Record {
            name,
            subject: parsed.subject,
            device: parsed.device,
            section: parsed.section,
            values,
        });
    }

    let dataset = Dataset::from_records(records, features);
    if dataset.devices.len() < 2 {
        log::warn!(
            "dataset has {} device group(s); agreement needs at least 2",
            dataset.devices.len()
        );
    }
    Ok(dataset)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one sample per row.  Feature
/// cells hold plain floats; anything else in them reads as missing.
fn load_csv(path: &Path) -> Result<Dataset> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let (name_idx, features) = feature_headers(&headers)?;

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let name = record.get(name_idx).unwrap_or("").to_string();
        let cells = (METADATA_COLUMNS..headers.len())
            .map(|i| numeric_cell(record.get(i).unwrap_or("")))
            .collect();
        rows.push((name, cells));
    }

    build_dataset(features, rows)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet measurement table.
///
/// Expected schema:
/// - `Name`: Utf8 – sample names carrying the device and section codes
/// - feature columns: Float64/Float32/Int64/Int32 (or strings of numbers)
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<Dataset> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;

    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let (name_idx, features) = feature_headers(&headers)?;

    let reader = builder.build().context("building parquet reader")?;
    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let name_col = batch.column(name_idx);
        let feature_cols: Vec<_> = (METADATA_COLUMNS..headers.len())
            .map(|i| batch.column(i))
            .collect();

        for row in 0..batch.num_rows() {
            let name = string_cell(name_col, row)
                .with_context(|| format!("row {row}: reading 'Name'"))?;
            let cells = feature_cols
                .iter()
                .enumerate()
                .map(|(j, col)| {
                    float_cell(col, row).with_context(|| {
                        format!("row {row}: reading '{}'", headers[METADATA_COLUMNS + j])
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push((name, cells));
        }
    }

    build_dataset(features, rows)
}

// -- Parquet / Arrow helpers --

/// Extract a string from an Utf8 or LargeUtf8 column at the given row.
fn string_cell(col: &Arc<dyn Array>, row: usize) -> Result<String> {
    if col.is_null(row) {
        bail!("null sample name");
    }
    match col.data_type() {
        DataType::Utf8 => Ok(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Ok(col.as_string::<i64>().value(row).to_string()),
        other => bail!("'Name' column has type {other:?}, expected strings"),
    }
}

/// Extract one feature cell.  Nulls and NaN payloads read as missing.
fn float_cell(col: &Arc<dyn Array>, row: usize) -> Result<Option<f64>> {
    if col.is_null(row) {
        return Ok(None);
    }
    let value = match col.data_type() {
        DataType::Float64 => {
            let arr = col.as_any().downcast_ref::<Float64Array>().unwrap();
            arr.value(row)
        }
        DataType::Float32 => {
            let arr = col.as_any().downcast_ref::<Float32Array>().unwrap();
            arr.value(row) as f64
        }
        DataType::Int64 => {
            let arr = col.as_any().downcast_ref::<Int64Array>().unwrap();
            arr.value(row) as f64
        }
        DataType::Int32 => {
            let arr = col.as_any().downcast_ref::<Int32Array>().unwrap();
            arr.value(row) as f64
        }
        DataType::Utf8 => return Ok(numeric_cell(col.as_string::<i32>().value(row))),
        DataType::LargeUtf8 => return Ok(numeric_cell(col.as_string::<i64>().value(row))),
        other => bail!("feature column has type {other:?}, expected numbers"),
    };
    Ok(if value.is_nan() { None } else { Some(value) })
}
