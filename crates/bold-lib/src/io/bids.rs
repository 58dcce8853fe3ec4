use crate::events::{Condition, Event};
use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::path::Path;

/// Row of a BIDS `events.tsv` table.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BidsEventRow {
    pub onset: f64,
    pub duration: f64,
    pub trial_type: Option<String>,
    pub modulation: Option<f64>,
}

impl BidsEventRow {
    fn from_record(
        record: &StringRecord,
        onset_idx: usize,
        duration_idx: Option<usize>,
        trial_idx: Option<usize>,
        modulation_idx: Option<usize>,
    ) -> Result<Self> {
        let onset = record
            .get(onset_idx)
            .ok_or_else(|| anyhow!("missing onset column"))?
            .parse::<f64>()
            .context("parsing onset")?;
        let duration = duration_idx
            .and_then(|idx| record.get(idx))
            .and_then(|value| value.parse::<f64>().ok())
            .unwrap_or(0.0);
        let trial_type = trial_idx
            .and_then(|idx| record.get(idx))
            .filter(|value| !value.trim().is_empty() && *value != "n/a")
            .map(|value| value.to_string());
        let modulation = modulation_idx
            .and_then(|idx| record.get(idx))
            .and_then(|value| value.parse::<f64>().ok());
        Ok(Self {
            onset,
            duration,
            trial_type,
            modulation,
        })
    }

    fn event(&self) -> Event {
        Event::new(self.onset, self.duration, self.modulation.unwrap_or(1.0))
    }
}

/// Load a BIDS `events.tsv` into structured rows.
pub fn load_bids_events(path: &Path) -> Result<Vec<BidsEventRow>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let onset_idx = headers
        .iter()
        .position(|header| header.eq_ignore_ascii_case("onset"))
        .ok_or_else(|| anyhow!("events.tsv must include an onset column"))?;
    let duration_idx = headers
        .iter()
        .position(|header| header.eq_ignore_ascii_case("duration"));
    let trial_idx = headers
        .iter()
        .position(|header| header.eq_ignore_ascii_case("trial_type"));
    let modulation_idx = headers
        .iter()
        .position(|header| header.eq_ignore_ascii_case("modulation"));
    let mut out = Vec::new();
    for result in reader.records() {
        let record = result.context("reading events record")?;
        out.push(BidsEventRow::from_record(
            &record,
            onset_idx,
            duration_idx,
            trial_idx,
            modulation_idx,
        )?);
    }
    Ok(out)
}

/// Group event rows into conditions, preserving first-appearance order.
/// Rows without a `trial_type` fall into `default_label`.
pub fn conditions_from_rows(rows: &[BidsEventRow], default_label: &str) -> Vec<Condition> {
    let mut grouped: Vec<(String, Vec<Event>)> = Vec::new();
    for row in rows {
        let label = row
            .trial_type
            .clone()
            .unwrap_or_else(|| default_label.to_string());
        match grouped.iter_mut().find(|(existing, _)| *existing == label) {
            Some((_, events)) => events.push(row.event()),
            None => grouped.push((label, vec![row.event()])),
        }
    }
    grouped
        .into_iter()
        .map(|(label, events)| Condition::new(label, events))
        .collect()
}

/// Rows whose `trial_type` matches `label`, as one condition.
pub fn condition_from_rows(rows: &[BidsEventRow], label: &str) -> Option<Condition> {
    let events: Vec<Event> = rows
        .iter()
        .filter(|row| row.trial_type.as_deref() == Some(label))
        .map(BidsEventRow::event)
        .collect();
    if events.is_empty() {
        None
    } else {
        Some(Condition::new(label, events))
    }
}

/// Every row collapsed into one condition under `label`.
pub fn single_condition(rows: &[BidsEventRow], label: &str) -> Condition {
    Condition::new(label, rows.iter().map(BidsEventRow::event).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn events_path() -> PathBuf {
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        manifest_dir
            .parent()
            .and_then(|p| p.parent())
            .expect("workspace root")
            .join("test_data/button_press_events.tsv")
    }

    #[test]
    fn parses_bids_events_file() {
        let rows = load_bids_events(&events_path()).expect("read sample events");
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].onset, 0.0);
        assert_eq!(rows[0].trial_type.as_deref(), Some("press_left"));
        assert_eq!(rows[3].modulation, Some(0.8));
    }

    #[test]
    fn groups_rows_into_conditions() {
        let rows = load_bids_events(&events_path()).unwrap();
        let conditions = conditions_from_rows(&rows, "main");
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].con_id, "press_left");
        assert_eq!(conditions[0].events.len(), 3);
        assert_eq!(conditions[1].con_id, "press_right");
        assert_eq!(conditions[1].events.len(), 2);
    }

    #[test]
    fn picks_a_single_labelled_condition() {
        let rows = load_bids_events(&events_path()).unwrap();
        let condition = condition_from_rows(&rows, "press_right").expect("condition");
        assert_eq!(condition.events.len(), 2);
        assert!((condition.events[1].amplitude - 0.8).abs() < 1e-12);
        assert!(condition_from_rows(&rows, "absent").is_none());
    }

    #[test]
    fn collapses_every_row_when_unlabelled() {
        let rows = load_bids_events(&events_path()).unwrap();
        let condition = single_condition(&rows, "main");
        assert_eq!(condition.con_id, "main");
        assert_eq!(condition.events.len(), rows.len());
    }
}
