use serde::{Deserialize, Serialize};

/// Single experimental event on the paradigm timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Onset relative to the first scan (seconds)
    pub onset: f64,
    /// Stimulation duration (seconds); zero marks an instantaneous impulse
    #[serde(default)]
    pub duration: f64,
    /// Modulation amplitude
    #[serde(default = "default_amplitude")]
    pub amplitude: f64,
}

fn default_amplitude() -> f64 {
    1.0
}

impl Event {
    pub fn new(onset: f64, duration: f64, amplitude: f64) -> Self {
        Self {
            onset,
            duration,
            amplitude,
        }
    }

    /// Instantaneous unit-amplitude event.
    pub fn impulse(onset: f64) -> Self {
        Self::new(onset, 0.0, 1.0)
    }

    pub fn end(&self) -> f64 {
        self.onset + self.duration
    }
}

/// Ordered events sharing a condition label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub con_id: String,
    pub events: Vec<Event>,
}

impl Condition {
    pub fn new(con_id: impl Into<String>, events: Vec<Event>) -> Self {
        Self {
            con_id: con_id.into(),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Acquisition frame grid for a fixed repetition time, starting at zero.
pub fn frame_times(tr: f64, n_scans: usize) -> Vec<f64> {
    (0..n_scans).map(|i| i as f64 * tr).collect()
}
