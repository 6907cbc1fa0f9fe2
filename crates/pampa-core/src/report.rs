use crate::{NeighborhoodSummary, PriceExtreme, ReportRow, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const LISTINGS_FILE: &str = "departamentos.csv";
pub const SUMMARY_FILE: &str = "analisis_por_barrio.csv";
pub const EXTREMES_FILE: &str = "extremos_por_barrio.csv";

/// Writes the three report tables of a run into one output directory.
///
/// Files are overwritten on every run; there is no append mode and no
/// atomicity guarantee, a failure midway leaves a partial file behind.
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    /// Creates the output directory (and parents) if missing. With
    /// `timestamp` the directory name gets a datetime suffix, so runs
    /// do not overwrite each other.
    pub fn new(dir: impl Into<PathBuf>, timestamp: bool) -> Result<Self> {
        let dir: PathBuf = dir.into();
        let dir = if timestamp {
            let stamp = Local::now().format("%Y-%m-%d-%H-%M-%S");
            match dir.file_name() {
                Some(name) => dir.with_file_name(format!("{}-{stamp}", name.to_string_lossy())),
                None => dir.join(stamp.to_string()),
            }
        } else {
            dir
        };
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_listings(&self, rows: &[ReportRow]) -> Result<PathBuf> {
        self.write_table(LISTINGS_FILE, rows)
    }

    pub fn write_summary(&self, summaries: &[NeighborhoodSummary]) -> Result<PathBuf> {
        self.write_table(SUMMARY_FILE, summaries)
    }

    pub fn write_extremes(&self, extremes: &[PriceExtreme]) -> Result<PathBuf> {
        self.write_table(EXTREMES_FILE, extremes)
    }

    /// Writes all three tables and returns the directory they landed in.
    pub fn write_all(
        &self,
        rows: &[ReportRow],
        summaries: &[NeighborhoodSummary],
        extremes: &[PriceExtreme],
    ) -> Result<PathBuf> {
        self.write_listings(rows)?;
        self.write_summary(summaries)?;
        self.write_extremes(extremes)?;
        Ok(self.dir.clone())
    }

    fn write_table<T: serde::Serialize>(&self, filename: &str, rows: &[T]) -> Result<PathBuf> {
        let path = self.dir.join(filename);
        let mut writer = csv::Writer::from_path(&path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        info!("wrote {} rows to {}", rows.len(), path.display());
        Ok(path)
    }
}
