use crate::design::DesignMatrix;
use crate::hrf::RegressorSet;
use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::path::Path;

/// Parse newline-delimited frame times, ignoring blank/comment lines.
pub fn parse_frame_times(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let value: f64 = trimmed
            .parse()
            .with_context(|| format!("line {} is not f64: {}", idx + 1, trimmed))?;
        out.push(value);
    }
    if out.is_empty() {
        anyhow::bail!("no frame times found");
    }
    Ok(out)
}

/// Read a newline-delimited frame-time file from disk.
pub fn read_frame_times(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_frame_times(&text)
}

/// Write regressors as a TSV table, frame times in the first column.
pub fn write_regressors_tsv(path: &Path, set: &RegressorSet) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(file);
    let mut header = vec!["frame_time".to_string()];
    header.extend(set.names.iter().cloned());
    writer.write_record(&header)?;
    for (k, t) in set.frame_times.iter().enumerate() {
        let mut row = vec![t.to_string()];
        for signal in &set.signals {
            row.push(signal[k].to_string());
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write regressors as pretty JSON.
pub fn write_regressors_json(path: &Path, set: &RegressorSet) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, set)?;
    Ok(())
}

/// Write a design matrix as a TSV table, one column per regressor.
pub fn write_design_tsv(path: &Path, design: &DesignMatrix) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(file);
    writer.write_record(&design.names)?;
    for row in 0..design.n_rows() {
        let record: Vec<String> = design
            .columns
            .iter()
            .map(|column| column[row].to_string())
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
