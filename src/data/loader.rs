//! Reading and writing OHLC tables from CSV and Parquet files

use super::bars::{Bar, MultiMarketOhlc, OhlcTable};
use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Column names recognised as the time index, in priority order
const TIMESTAMP_COLUMNS: &[&str] = &["timestamp", "ts", "time", "datetime", "date"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Csv,
    Parquet,
}

fn file_format(path: &Path) -> Result<FileFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => Ok(FileFormat::Csv),
        "parquet" | "pq" => Ok(FileFormat::Parquet),
        _ => bail!(
            "Unsupported file extension for {} (expected .csv, .parquet or .pq)",
            path.display()
        ),
    }
}

fn table_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("market")
        .to_string()
}

/// Load a single market from a CSV or Parquet file.
pub fn load_ohlc(path: &Path) -> Result<OhlcTable> {
    let bars = match file_format(path)? {
        FileFormat::Csv => read_csv(path),
        FileFormat::Parquet => read_parquet(path),
    }
    .with_context(|| format!("Failed to read {}", path.display()))?;

    let table = OhlcTable::new(table_name(path), bars)
        .with_context(|| format!("Invalid OHLC data in {}", path.display()))?;

    if let Some(i) = table.first_invalid_price() {
        warn!(
            "{}: bar {} has a non-positive or non-finite price, permutation will reject this table",
            table.name(),
            i
        );
    }

    let inconsistent = table.inconsistent_bars();
    if inconsistent > 0 {
        warn!(
            "{}: {} of {} bars violate high >= max(open, close) / low <= min(open, close)",
            table.name(),
            inconsistent,
            table.len()
        );
    }

    info!("Loaded {} bars from {}", table.len(), path.display());
    Ok(table)
}

/// Load several markets and check they share one time index.
pub fn load_markets(paths: &[PathBuf]) -> Result<MultiMarketOhlc> {
    if paths.is_empty() {
        bail!("No data files given");
    }

    let tables = paths
        .iter()
        .map(|p| load_ohlc(p))
        .collect::<Result<Vec<_>>>()?;

    MultiMarketOhlc::new(tables).context("Markets cannot be permuted together")
}

/// Write a table in the format implied by the file extension.
pub fn write_ohlc(path: &Path, table: &OhlcTable) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    match file_format(path)? {
        FileFormat::Csv => write_csv(path, table),
        FileFormat::Parquet => write_parquet(path, table),
    }
    .with_context(|| format!("Failed to write {}", path.display()))?;

    debug!("Saved {} bars to {}", table.len(), path.display());
    Ok(())
}

/// Integer epochs: the magnitude decides the unit.
fn epoch_to_datetime(value: i64) -> Option<DateTime<Utc>> {
    let magnitude = value.unsigned_abs();
    if magnitude >= 100_000_000_000_000_000 {
        Some(Utc.timestamp_nanos(value))
    } else if magnitude >= 100_000_000_000_000 {
        DateTime::from_timestamp_micros(value)
    } else if magnitude >= 100_000_000_000 {
        Utc.timestamp_millis_opt(value).single()
    } else {
        Utc.timestamp_opt(value, 0).single()
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    if let Ok(epoch) = s.parse::<i64>() {
        return epoch_to_datetime(epoch);
    }

    None
}

fn read_csv(path: &Path) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path).context("Failed to open CSV file")?;

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let index_of = |name: &str| headers.iter().position(|h| h == name);
    let required = |name: &str| index_of(name).with_context(|| format!("Missing {} column", name));

    let open_idx = required("open")?;
    let high_idx = required("high")?;
    let low_idx = required("low")?;
    let close_idx = required("close")?;
    let volume_idx = index_of("volume");
    let ts_idx = TIMESTAMP_COLUMNS.iter().find_map(|name| index_of(name));

    let mut bars = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Bad CSV record at row {}", row + 1))?;

        let price = |idx: usize, name: &str| -> Result<f64> {
            let raw = record.get(idx).unwrap_or("").trim();
            raw.parse::<f64>()
                .with_context(|| format!("Row {}: invalid {} value '{}'", row + 1, name, raw))
        };

        let mut bar = Bar::new(
            price(open_idx, "open")?,
            price(high_idx, "high")?,
            price(low_idx, "low")?,
            price(close_idx, "close")?,
        );

        if let Some(idx) = volume_idx {
            let raw = record.get(idx).unwrap_or("").trim();
            if !raw.is_empty() {
                bar.volume = Some(
                    raw.parse::<f64>()
                        .with_context(|| format!("Row {}: invalid volume '{}'", row + 1, raw))?,
                );
            }
        }

        if let Some(idx) = ts_idx {
            let raw = record.get(idx).unwrap_or("");
            bar.timestamp = Some(
                parse_timestamp(raw)
                    .with_context(|| format!("Row {}: unparseable timestamp '{}'", row + 1, raw))?,
            );
        }

        bars.push(bar);
    }

    Ok(bars)
}

fn find_column<'a>(batch: &'a RecordBatch, names: &[&str]) -> Option<&'a ArrayRef> {
    let schema = batch.schema();
    let idx = names.iter().find_map(|name| {
        schema
            .fields()
            .iter()
            .position(|f| f.name().to_lowercase() == *name)
    })?;
    Some(batch.column(idx))
}

fn get_f64_column(batch: &RecordBatch, name: &str) -> Result<Option<Vec<Option<f64>>>> {
    let Some(col) = find_column(batch, &[name]) else {
        return Ok(None);
    };

    let values = cast(col.as_ref(), &DataType::Float64)
        .with_context(|| format!("{} column is not numeric", name))?;
    let values = values
        .as_any()
        .downcast_ref::<Float64Array>()
        .with_context(|| format!("{} column is not Float64", name))?;

    Ok(Some(values.iter().collect()))
}

fn get_required_f64_column(batch: &RecordBatch, name: &str) -> Result<Vec<f64>> {
    let values = get_f64_column(batch, name)?.with_context(|| format!("Missing {} column", name))?;
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.with_context(|| format!("Null {} value at row {}", name, i)))
        .collect()
}

fn get_timestamp_column(batch: &RecordBatch) -> Result<Option<Vec<DateTime<Utc>>>> {
    let Some(col) = find_column(batch, TIMESTAMP_COLUMNS) else {
        return Ok(None);
    };

    let converted: Vec<Option<DateTime<Utc>>> = match col.data_type() {
        DataType::Timestamp(unit, _) => {
            let unit = unit.clone();
            let raw = cast(col.as_ref(), &DataType::Int64)?;
            let raw = raw
                .as_any()
                .downcast_ref::<Int64Array>()
                .context("timestamp column is not Int64")?;
            raw.iter()
                .map(|v| {
                    v.and_then(|v| match unit {
                        TimeUnit::Second => Utc.timestamp_opt(v, 0).single(),
                        TimeUnit::Millisecond => Utc.timestamp_millis_opt(v).single(),
                        TimeUnit::Microsecond => DateTime::from_timestamp_micros(v),
                        TimeUnit::Nanosecond => Some(Utc.timestamp_nanos(v)),
                    })
                })
                .collect()
        }
        DataType::Utf8 | DataType::LargeUtf8 => {
            let raw = cast(col.as_ref(), &DataType::Utf8)?;
            let raw = raw
                .as_any()
                .downcast_ref::<StringArray>()
                .context("timestamp column is not Utf8")?;
            raw.iter().map(|v| v.and_then(parse_timestamp)).collect()
        }
        dt if dt.is_integer() => {
            let raw = cast(col.as_ref(), &DataType::Int64)?;
            let raw = raw
                .as_any()
                .downcast_ref::<Int64Array>()
                .context("timestamp column is not Int64")?;
            raw.iter().map(|v| v.and_then(epoch_to_datetime)).collect()
        }
        other => bail!("Unsupported timestamp column type {:?}", other),
    };

    converted
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.with_context(|| format!("Null or invalid timestamp at row {}", i)))
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn read_parquet(path: &Path) -> Result<Vec<Bar>> {
    let file = File::open(path).context("Failed to open Parquet file")?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut bars = Vec::new();
    for batch in reader {
        let batch = batch?;

        let opens = get_required_f64_column(&batch, "open")?;
        let highs = get_required_f64_column(&batch, "high")?;
        let lows = get_required_f64_column(&batch, "low")?;
        let closes = get_required_f64_column(&batch, "close")?;
        let volumes = get_f64_column(&batch, "volume")?;
        let timestamps = get_timestamp_column(&batch)?;

        for i in 0..batch.num_rows() {
            bars.push(Bar {
                timestamp: timestamps.as_ref().map(|ts| ts[i]),
                open: opens[i],
                high: highs[i],
                low: lows[i],
                close: closes[i],
                volume: volumes.as_ref().and_then(|v| v[i]),
            });
        }
    }

    Ok(bars)
}

fn write_csv(path: &Path, table: &OhlcTable) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let with_ts = table.has_timestamps();
    let with_volume = table.has_volume();

    let mut header = Vec::with_capacity(6);
    if with_ts {
        header.push("timestamp");
    }
    header.extend(["open", "high", "low", "close"]);
    if with_volume {
        header.push("volume");
    }
    writer.write_record(&header)?;

    for bar in table.bars() {
        let mut record = Vec::with_capacity(header.len());
        if with_ts {
            record.push(bar.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default());
        }
        record.extend([bar.open, bar.high, bar.low, bar.close].iter().map(|v| v.to_string()));
        if with_volume {
            record.push(bar.volume.map(|v| v.to_string()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

fn write_parquet(path: &Path, table: &OhlcTable) -> Result<()> {
    let bars = table.bars();
    let mut fields = Vec::with_capacity(6);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(6);

    if table.has_timestamps() {
        fields.push(Field::new("ts", DataType::Int64, false));
        columns.push(Arc::new(Int64Array::from(
            bars.iter()
                .map(|b| b.timestamp.map(|t| t.timestamp_millis()).unwrap_or_default())
                .collect::<Vec<_>>(),
        )));
    }

    for (name, values) in [
        ("open", table.opens()),
        ("high", table.highs()),
        ("low", table.lows()),
        ("close", table.closes()),
    ] {
        fields.push(Field::new(name, DataType::Float64, false));
        columns.push(Arc::new(Float64Array::from(values)));
    }

    if table.has_volume() {
        fields.push(Field::new("volume", DataType::Float64, true));
        columns.push(Arc::new(Float64Array::from(
            bars.iter().map(|b| b.volume).collect::<Vec<_>>(),
        )));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_csv_load_lowercases_headers_and_parses_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btc.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "Date,Open,High,Low,Close,Volume").unwrap();
        writeln!(f, "2024-01-01 00:00:00,100,101,99,100.5,10").unwrap();
        writeln!(f, "2024-01-01 01:00:00,100.5,102,100,101.5,").unwrap();
        drop(f);

        let table = load_ohlc(&path).unwrap();
        assert_eq!(table.name(), "btc");
        assert_eq!(table.len(), 2);
        assert_eq!(table.bars()[0].volume, Some(10.0));
        assert_eq!(table.bars()[1].volume, None);
        assert_eq!(
            table.bars()[1].timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_csv_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "open,high,low\n1,2,0.5\n1,2,0.5\n").unwrap();
        assert!(load_ohlc(&path).is_err());
    }

    #[test]
    fn test_parquet_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eth.parquet");

        let bars: Vec<Bar> = (0..4)
            .map(|i| {
                let p = 2000.0 + i as f64;
                Bar::new(p, p + 5.0, p - 5.0, p + 1.0)
                    .with_timestamp(Utc.timestamp_opt(1_700_000_000 + 3600 * i, 0).unwrap())
                    .with_volume(1.5 * i as f64)
            })
            .collect();
        let table = OhlcTable::new("eth", bars).unwrap();

        write_ohlc(&path, &table).unwrap();
        let loaded = load_ohlc(&path).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_epoch_units() {
        let secs = epoch_to_datetime(1_700_000_000).unwrap();
        let millis = epoch_to_datetime(1_700_000_000_000).unwrap();
        assert_eq!(secs, millis);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(load_ohlc(Path::new("prices.xlsx")).is_err());
    }
}
