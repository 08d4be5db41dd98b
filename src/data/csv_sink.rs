//! CSV writer for sweep rows.
//!
//! Layout: the run metadata as `# `-prefixed JSON lines, one header record naming the
//! columns, then one record per sweep point. Each row is flushed as it arrives so an
//! aborted run still leaves its completed rows on disk.

use super::{RowSink, RunMetadata};
use crate::error::SinkError;
use crate::sweep::SampleRow;
use async_trait::async_trait;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Column names, in row order.
pub const COLUMNS: [&str; 9] = [
    "bias_mv",
    "voltage_mv",
    "current_ma",
    "cold_power_w",
    "hot_power_w",
    "y_factor",
    "tsys_k",
    "t_hot_k",
    "t_cold_k",
];

/// A writer for CSV files.
pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows_written: usize,
}

impl CsvSink {
    /// Create (or truncate) `path` and write the metadata and header.
    ///
    /// Missing parent directories are created.
    pub fn create(path: impl AsRef<Path>, metadata: &RunMetadata) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = File::create(&path)?;
        let json_string = serde_json::to_string_pretty(metadata)?;
        for line in json_string.lines() {
            writeln!(file, "# {}", line)?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(COLUMNS)?;
        writer.flush()?;

        info!(path = %path.display(), "CSV sink created");
        Ok(Self {
            path,
            writer,
            rows_written: 0,
        })
    }

    /// File being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of data rows written.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}

#[async_trait]
impl RowSink for CsvSink {
    async fn append_row(&mut self, row: &SampleRow) -> Result<(), SinkError> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        self.rows_written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        info!(
            path = %self.path.display(),
            rows = self.rows_written,
            "CSV sink closed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Sample;
    use crate::sweep::{SweepConfig, TSYS_UNDEFINED};

    fn metadata() -> RunMetadata {
        RunMetadata::from_config(&SweepConfig::builder(0.0, 1.0, 0.5).build().unwrap())
    }

    fn row(bias: f64, cold: f64, hot: f64) -> SampleRow {
        let sample = Sample {
            voltage: bias,
            current: bias / 20.0,
            power: Some(cold),
        };
        let mut row = SampleRow::from_cold(bias, &sample, 77.0);
        row.record_hot(Some(hot), 290.0);
        row
    }

    #[tokio::test]
    async fn test_writes_metadata_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("ivy.csv");

        let mut sink = CsvSink::create(&path, &metadata()).unwrap();
        sink.append_row(&row(0.0, 1.0, 2.0)).await.unwrap();
        sink.append_row(&row(0.5, 1.0, 1.0)).await.unwrap();
        sink.finish().await.unwrap();
        assert_eq!(sink.rows_written(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("# {"));
        assert!(text.contains("\"load_cycle\": 1"));

        let header = lines.iter().find(|l| !l.starts_with('#')).unwrap();
        assert_eq!(*header, COLUMNS.join(","));

        let mut reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .from_path(&path)
            .unwrap();
        let rows: Vec<SampleRow> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tsys, 136.0);
        assert_eq!(rows[1].tsys, TSYS_UNDEFINED);
    }

    #[tokio::test]
    async fn test_rows_visible_before_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.csv");

        let mut sink = CsvSink::create(&path, &metadata()).unwrap();
        sink.append_row(&row(0.0, 1.0, 2.0)).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let data_lines = text.lines().filter(|l| !l.starts_with('#')).count();
        assert_eq!(data_lines, 2);
    }
}
