use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Hemodynamic tail appended when suggesting how many scans cover a
/// paradigm (seconds).
const HRF_TAIL_S: f64 = 32.0;

/// Paradigm description loaded from TOML.
#[derive(Debug, Deserialize, Clone)]
pub struct ParadigmSpec {
    pub name: String,
    /// Scanner repetition time (seconds)
    pub tr: f64,
    #[serde(default)]
    pub timing: Option<TimingSpec>,
    #[serde(default)]
    pub randomization: Option<RandomizationSpec>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimingSpec {
    /// Inter-stimulus interval (seconds)
    #[serde(default)]
    pub isi_s: Option<f64>,
    /// Uniform jitter applied around the ISI (seconds)
    #[serde(default)]
    pub isi_jitter_s: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RandomizationSpec {
    /// `shuffle` or `block-shuffle`
    #[serde(default)]
    pub policy: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TrialRow {
    #[serde(default)]
    pub block: Option<usize>,
    pub condition: String,
    pub duration_s: f64,
    #[serde(default)]
    pub amplitude: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct TrialSpec {
    pub block: usize,
    pub condition: String,
    pub duration_s: f64,
    pub amplitude: f64,
}

impl TrialSpec {
    fn from_row(row: TrialRow) -> Self {
        Self {
            block: row.block.unwrap_or(1),
            condition: row.condition,
            duration_s: row.duration_s,
            amplitude: row.amplitude.unwrap_or(1.0),
        }
    }
}

/// Scheduled stimulation event, serialized as a BIDS-style `events.tsv` row.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EventRow {
    pub onset: f64,
    pub duration: f64,
    pub trial_type: String,
    pub modulation: f64,
    pub block: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RunManifest {
    pub task: String,
    pub tr: f64,
    pub total_trials: usize,
    pub seed: Option<u64>,
    pub randomization_policy: Option<String>,
    pub isi_s: f64,
    pub isi_jitter_s: Option<f64>,
    /// Scans needed to cover the last event plus the hemodynamic tail.
    pub suggested_n_scans: usize,
}

pub struct RunBundle {
    pub events: Vec<EventRow>,
    pub manifest: RunManifest,
}

pub fn read_paradigm(path: &Path) -> Result<ParadigmSpec> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read paradigm {}", path.display()))?;
    let spec: ParadigmSpec = toml::from_str(&contents)
        .with_context(|| format!("parsing paradigm {}", path.display()))?;
    Ok(spec)
}

pub fn read_trials(path: &Path) -> Result<Vec<TrialSpec>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening trials {}", path.display()))?;
    let mut trials = Vec::new();
    for (idx, row) in reader.deserialize::<TrialRow>().enumerate() {
        let row = row.with_context(|| format!("parsing trial row {}", idx + 1))?;
        trials.push(TrialSpec::from_row(row));
    }
    Ok(trials)
}

fn shuffle_trials(trials: &mut [TrialSpec], spec: &RandomizationSpec, rng: &mut StdRng) {
    match spec.policy.as_deref() {
        Some("block-shuffle") => shuffle_by_block(trials, rng),
        _ => trials.shuffle(rng),
    }
}

fn shuffle_by_block(trials: &mut [TrialSpec], rng: &mut StdRng) {
    let mut start = 0;
    while start < trials.len() {
        let block = trials[start].block;
        let mut end = start + 1;
        while end < trials.len() && trials[end].block == block {
            end += 1;
        }
        trials[start..end].shuffle(rng);
        start = end;
    }
}

/// Schedule trials onto the scanner timeline with seeded ISI jitter.
pub fn schedule_run(spec: &ParadigmSpec, trials: &[TrialSpec]) -> RunBundle {
    let randomization = spec.randomization.clone();
    let seed = randomization.as_ref().and_then(|r| r.seed).unwrap_or(0);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut trial_order: Vec<TrialSpec> = trials.to_vec();
    if let Some(ref policy) = randomization {
        shuffle_trials(&mut trial_order, policy, &mut rng);
    }
    let isi_s = spec
        .timing
        .as_ref()
        .and_then(|timing| timing.isi_s)
        .unwrap_or(4.0);
    let isi_jitter_s = spec
        .timing
        .as_ref()
        .and_then(|timing| timing.isi_jitter_s)
        .unwrap_or(0.0);
    let mut onset = 0.0;
    let mut events = Vec::with_capacity(trial_order.len());
    for trial in &trial_order {
        events.push(EventRow {
            onset,
            duration: trial.duration_s,
            trial_type: trial.condition.clone(),
            modulation: trial.amplitude,
            block: trial.block,
        });
        let jitter = if isi_jitter_s > 0.0 {
            rng.gen_range(-isi_jitter_s..=isi_jitter_s)
        } else {
            0.0
        };
        onset += trial.duration_s + (isi_s + jitter).max(0.0);
    }
    let paradigm_end = events
        .last()
        .map(|ev| ev.onset + ev.duration)
        .unwrap_or(0.0);
    let suggested_n_scans = ((paradigm_end + HRF_TAIL_S) / spec.tr).ceil() as usize;
    let manifest = RunManifest {
        task: spec.name.clone(),
        tr: spec.tr,
        total_trials: trial_order.len(),
        seed: randomization.as_ref().and_then(|r| r.seed),
        randomization_policy: randomization.as_ref().and_then(|r| r.policy.clone()),
        isi_s,
        isi_jitter_s: if isi_jitter_s > 0.0 {
            Some(isi_jitter_s)
        } else {
            None
        },
        suggested_n_scans,
    };
    RunBundle { events, manifest }
}

pub fn write_events_tsv(path: &Path, events: &[EventRow]) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(file);
    writer.write_record(["onset", "duration", "trial_type", "modulation", "block"])?;
    for event in events {
        writer.write_record(&[
            event.onset.to_string(),
            event.duration.to_string(),
            event.trial_type.clone(),
            event.modulation.to_string(),
            event.block.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_events_tsv(path: &Path) -> Result<Vec<EventRow>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(Trim::All)
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("opening events {}", path.display()))?;
    let mut events = Vec::new();
    for row in reader.deserialize::<EventRow>() {
        let parsed = row.with_context(|| format!("parsing events in {}", path.display()))?;
        events.push(parsed);
    }
    Ok(events)
}

pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, manifest)?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<RunManifest> {
    let file =
        fs::File::open(path).with_context(|| format!("opening manifest {}", path.display()))?;
    let manifest = serde_json::from_reader::<_, RunManifest>(file)
        .with_context(|| format!("parsing manifest {}", path.display()))?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn paradigm(policy: Option<&str>, jitter: Option<f64>) -> ParadigmSpec {
        ParadigmSpec {
            name: "checker".into(),
            tr: 2.0,
            timing: Some(TimingSpec {
                isi_s: Some(4.0),
                isi_jitter_s: jitter,
            }),
            randomization: Some(RandomizationSpec {
                policy: policy.map(|p| p.into()),
                seed: Some(42),
            }),
        }
    }

    fn trials() -> Vec<TrialSpec> {
        vec![
            TrialSpec {
                block: 1,
                condition: "left".into(),
                duration_s: 1.0,
                amplitude: 1.0,
            },
            TrialSpec {
                block: 1,
                condition: "right".into(),
                duration_s: 1.0,
                amplitude: 1.0,
            },
            TrialSpec {
                block: 2,
                condition: "left".into(),
                duration_s: 1.0,
                amplitude: 0.5,
            },
        ]
    }

    #[test]
    fn schedules_monotonic_onsets() {
        let bundle = schedule_run(&paradigm(None, None), &trials());
        assert_eq!(bundle.events.len(), 3);
        for pair in bundle.events.windows(2) {
            assert!(pair[1].onset >= pair[0].onset + pair[0].duration + 4.0 - 1e-9);
        }
        assert_eq!(bundle.manifest.total_trials, 3);
    }

    #[test]
    fn identical_seeds_give_identical_schedules() {
        let spec = paradigm(Some("shuffle"), Some(0.5));
        let a = schedule_run(&spec, &trials());
        let b = schedule_run(&spec, &trials());
        let onsets = |bundle: &RunBundle| -> Vec<f64> {
            bundle.events.iter().map(|ev| ev.onset).collect()
        };
        assert_eq!(onsets(&a), onsets(&b));
    }

    #[test]
    fn block_shuffle_keeps_blocks_contiguous() {
        let bundle = schedule_run(&paradigm(Some("block-shuffle"), None), &trials());
        let blocks: Vec<usize> = bundle.events.iter().map(|ev| ev.block).collect();
        assert_eq!(blocks, vec![1, 1, 2]);
    }

    #[test]
    fn manifest_covers_the_hemodynamic_tail() {
        let bundle = schedule_run(&paradigm(None, None), &trials());
        let end = bundle
            .events
            .last()
            .map(|ev| ev.onset + ev.duration)
            .unwrap();
        let expected = ((end + 32.0) / 2.0).ceil() as usize;
        assert_eq!(bundle.manifest.suggested_n_scans, expected);
        assert_eq!(bundle.manifest.isi_jitter_s, None);
    }

    #[test]
    fn events_round_trip_through_tsv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.tsv");
        let bundle = schedule_run(&paradigm(None, None), &trials());
        write_events_tsv(&path, &bundle.events).unwrap();
        let restored = read_events_tsv(&path).unwrap();
        assert_eq!(restored.len(), bundle.events.len());
        assert_eq!(restored[2].modulation, 0.5);
        assert_eq!(restored[0].trial_type, "left");
    }

    #[test]
    fn manifest_round_trips_through_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        let bundle = schedule_run(&paradigm(Some("block-shuffle"), Some(0.25)), &trials());
        write_manifest(&path, &bundle.manifest).unwrap();
        let restored = read_manifest(&path).unwrap();
        assert_eq!(restored.task, "checker");
        assert_eq!(restored.randomization_policy.as_deref(), Some("block-shuffle"));
        assert_eq!(restored.isi_jitter_s, Some(0.25));
    }
}
