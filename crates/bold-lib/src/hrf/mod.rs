//! Event-to-regressor synthesis: convolve condition impulse trains with
//! canonical hemodynamic basis kernels and resample onto the scan grid.

mod kernel;

pub use kernel::{glover_hrf, spm_hrf, GammaDifferenceHrf};

use crate::events::{Condition, Event};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default internal simulation steps per frame interval.
pub const DEFAULT_OVERSAMPLING: usize = 50;
/// Default earliest admissible onset relative to the first frame (seconds).
pub const DEFAULT_MIN_ONSET: f64 = -24.0;

#[derive(Debug, Error)]
pub enum RegressorError {
    #[error("invalid events: {0}")]
    InvalidEvents(String),
    #[error("frame grid must hold at least two strictly increasing finite sample times")]
    EmptyFrameGrid,
    #[error("unknown basis model `{0}`")]
    UnknownModel(String),
    #[error("the fir model requires a non-empty list of delays")]
    MissingDelays,
    #[error("invalid fir delays: {0}")]
    InvalidDelays(String),
}

/// Canonical basis families and their derivative expansions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasisModel {
    Glover,
    GloverDerivative,
    GloverDerivativeDispersion,
    Spm,
    SpmDerivative,
    SpmDerivativeDispersion,
    Fir,
}

impl BasisModel {
    /// Canonical kernel parameterization; `None` for the FIR model.
    pub fn canonical(&self) -> Option<GammaDifferenceHrf> {
        match self {
            BasisModel::Glover | BasisModel::GloverDerivative | BasisModel::GloverDerivativeDispersion => {
                Some(GammaDifferenceHrf::glover())
            }
            BasisModel::Spm | BasisModel::SpmDerivative | BasisModel::SpmDerivativeDispersion => {
                Some(GammaDifferenceHrf::spm())
            }
            BasisModel::Fir => None,
        }
    }

    pub fn with_time_derivative(&self) -> bool {
        matches!(
            self,
            BasisModel::GloverDerivative
                | BasisModel::GloverDerivativeDispersion
                | BasisModel::SpmDerivative
                | BasisModel::SpmDerivativeDispersion
        )
    }

    pub fn with_dispersion_derivative(&self) -> bool {
        matches!(
            self,
            BasisModel::GloverDerivativeDispersion | BasisModel::SpmDerivativeDispersion
        )
    }

    /// Number of basis functions the model expands to.
    pub fn n_basis(&self, fir_delays: Option<&[f64]>) -> usize {
        match self {
            BasisModel::Fir => fir_delays.map(<[f64]>::len).unwrap_or(0),
            _ => 1 + self.with_time_derivative() as usize + self.with_dispersion_derivative() as usize,
        }
    }
}

impl FromStr for BasisModel {
    type Err = RegressorError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let compact: String = raw
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        match compact.as_str() {
            "glover" => Ok(BasisModel::Glover),
            "glover+derivative" => Ok(BasisModel::GloverDerivative),
            "glover+derivative+dispersion" => Ok(BasisModel::GloverDerivativeDispersion),
            "spm" => Ok(BasisModel::Spm),
            "spm+derivative" => Ok(BasisModel::SpmDerivative),
            "spm+derivative+dispersion" => Ok(BasisModel::SpmDerivativeDispersion),
            "fir" => Ok(BasisModel::Fir),
            _ => Err(RegressorError::UnknownModel(raw.to_string())),
        }
    }
}

impl fmt::Display for BasisModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BasisModel::Glover => "glover",
            BasisModel::GloverDerivative => "glover + derivative",
            BasisModel::GloverDerivativeDispersion => "glover + derivative + dispersion",
            BasisModel::Spm => "spm",
            BasisModel::SpmDerivative => "spm + derivative",
            BasisModel::SpmDerivativeDispersion => "spm + derivative + dispersion",
            BasisModel::Fir => "fir",
        };
        f.write_str(label)
    }
}

/// Synthesis knobs; `Default` matches the conventions of the canonical
/// implementations.
#[derive(Debug, Clone)]
pub struct RegressorConfig {
    /// Internal simulation steps per frame interval.
    pub oversampling: usize,
    /// Earliest admissible onset relative to the first frame (seconds,
    /// usually negative).
    pub min_onset: f64,
    /// Delays (seconds) for the FIR model; ignored by canonical models.
    pub fir_delays: Option<Vec<f64>>,
}

impl Default for RegressorConfig {
    fn default() -> Self {
        Self {
            oversampling: DEFAULT_OVERSAMPLING,
            min_onset: DEFAULT_MIN_ONSET,
            fir_delays: None,
        }
    }
}

/// Regressor signals aligned 1:1 with the requested frame times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressorSet {
    pub frame_times: Vec<f64>,
    pub names: Vec<String>,
    pub signals: Vec<Vec<f64>>,
}

impl RegressorSet {
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

/// Convolve one condition with the requested basis set, overriding only the
/// oversampling factor.
pub fn compute_regressor(
    condition: &Condition,
    model: BasisModel,
    frame_times: &[f64],
    oversampling: usize,
) -> Result<RegressorSet, RegressorError> {
    let mut cfg = RegressorConfig::default();
    cfg.oversampling = oversampling;
    compute_regressor_with_config(condition, model, frame_times, &cfg)
}

/// Full synthesis entry point.
///
/// Builds an oversampled impulse train from the condition's events,
/// convolves it with each basis kernel, and reports the result on
/// `frame_times` (linear interpolation for canonical kernels, nearest
/// sampling for FIR indicators).
pub fn compute_regressor_with_config(
    condition: &Condition,
    model: BasisModel,
    frame_times: &[f64],
    cfg: &RegressorConfig,
) -> Result<RegressorSet, RegressorError> {
    validate_frame_times(frame_times)?;
    let oversampling = cfg.oversampling.max(1);
    let dt = median_frame_step(frame_times) / oversampling as f64;
    let grid_start = frame_times[0] + cfg.min_onset;
    let grid_stop = frame_times[frame_times.len() - 1];
    validate_events(&condition.events, grid_start, grid_stop)?;
    let grid = oversampled_grid(grid_start, grid_stop, dt);
    let train = sample_condition(&condition.events, &grid);

    let (names, signals) = match model.canonical() {
        None => {
            let delays = fir_delays(cfg)?;
            let mut names = Vec::with_capacity(delays.len());
            let mut signals = Vec::with_capacity(delays.len());
            for &delay in delays {
                let shifted = shift_right(&train, (delay / dt).round() as usize);
                signals.push(resample_nearest(&grid, &shifted, frame_times));
                names.push(format!("{}_delay_{}", condition.con_id, format_delay(delay)));
            }
            (names, signals)
        }
        Some(hrf) => {
            let mut kernels = vec![hrf.sample(dt)];
            if model.with_time_derivative() {
                kernels.push(hrf.time_derivative(dt));
            }
            if model.with_dispersion_derivative() {
                kernels.push(hrf.dispersion_derivative(dt));
            }
            let mut signals: Vec<Vec<f64>> = kernels
                .iter()
                .map(|kernel| resample_linear(&grid, &convolve_truncated(&train, kernel), frame_times))
                .collect();
            orthogonalize(&mut signals);
            let mut names = vec![condition.con_id.clone()];
            if model.with_time_derivative() {
                names.push(format!("{}_derivative", condition.con_id));
            }
            if model.with_dispersion_derivative() {
                names.push(format!("{}_dispersion_derivative", condition.con_id));
            }
            (names, signals)
        }
    };

    Ok(RegressorSet {
        frame_times: frame_times.to_vec(),
        names,
        signals,
    })
}

fn validate_frame_times(frame_times: &[f64]) -> Result<(), RegressorError> {
    if frame_times.len() < 2 || frame_times.iter().any(|t| !t.is_finite()) {
        return Err(RegressorError::EmptyFrameGrid);
    }
    if frame_times.windows(2).any(|w| w[1] <= w[0]) {
        return Err(RegressorError::EmptyFrameGrid);
    }
    Ok(())
}

fn validate_events(events: &[Event], earliest: f64, latest: f64) -> Result<(), RegressorError> {
    if events.is_empty() {
        return Err(RegressorError::InvalidEvents("condition has no events".into()));
    }
    for (idx, ev) in events.iter().enumerate() {
        if !ev.onset.is_finite() || !ev.duration.is_finite() || !ev.amplitude.is_finite() {
            return Err(RegressorError::InvalidEvents(format!(
                "event {idx} holds a non-finite field"
            )));
        }
        if ev.onset < 0.0 {
            return Err(RegressorError::InvalidEvents(format!(
                "event {idx} has negative onset {}",
                ev.onset
            )));
        }
        if ev.duration < 0.0 {
            return Err(RegressorError::InvalidEvents(format!(
                "event {idx} has negative duration {}",
                ev.duration
            )));
        }
        if ev.onset < earliest || ev.onset > latest {
            return Err(RegressorError::InvalidEvents(format!(
                "event {idx} onset {} outside the frame window [{earliest}, {latest}]",
                ev.onset
            )));
        }
    }
    Ok(())
}

fn median_frame_step(frame_times: &[f64]) -> f64 {
    let mut gaps: Vec<f64> = frame_times.windows(2).map(|w| w[1] - w[0]).collect();
    gaps.sort_by(f64::total_cmp);
    let mid = gaps.len() / 2;
    if gaps.len() % 2 == 0 {
        0.5 * (gaps[mid - 1] + gaps[mid])
    } else {
        gaps[mid]
    }
}

fn oversampled_grid(start: f64, stop: f64, dt: f64) -> Vec<f64> {
    let n = ((stop - start) / dt).ceil() as usize + 1;
    (0..n).map(|i| start + i as f64 * dt).collect()
}

/// Accumulate each event as a rectangular pulse on the high-resolution grid.
fn sample_condition(events: &[Event], grid: &[f64]) -> Vec<f64> {
    let mut train = vec![0.0; grid.len()];
    let last = grid.len() - 1;
    for ev in events {
        let t0 = grid.partition_point(|&t| t < ev.onset).min(last);
        if ev.duration == 0.0 {
            train[t0] += ev.amplitude;
            continue;
        }
        let mut t1 = grid.partition_point(|&t| t < ev.end()).min(last);
        if t1 == t0 {
            // events shorter than one step still cover one sample
            t1 = (t0 + 1).min(last);
        }
        let height = ev.amplitude / ev.duration;
        for value in &mut train[t0..t1] {
            *value += height;
        }
    }
    train
}

/// Causal linear convolution truncated to the input length.
fn convolve_truncated(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; signal.len()];
    for (i, slot) in out.iter_mut().enumerate() {
        let span = kernel.len().min(i + 1);
        let mut acc = 0.0;
        for (j, k) in kernel.iter().take(span).enumerate() {
            acc += k * signal[i - j];
        }
        *slot = acc;
    }
    out
}

fn resample_linear(xs: &[f64], ys: &[f64], at: &[f64]) -> Vec<f64> {
    at.iter().map(|&t| interp_linear(xs, ys, t)).collect()
}

/// Linear interpolation over an ascending grid, clamped at the ends.
fn interp_linear(xs: &[f64], ys: &[f64], t: f64) -> f64 {
    let idx = xs.partition_point(|&x| x < t);
    if idx == 0 {
        return ys[0];
    }
    if idx >= xs.len() {
        return ys[ys.len() - 1];
    }
    let (x0, x1) = (xs[idx - 1], xs[idx]);
    let span = x1 - x0;
    if span <= 0.0 {
        return ys[idx];
    }
    let w = (t - x0) / span;
    ys[idx - 1] * (1.0 - w) + ys[idx] * w
}

/// Nearest-neighbour sampling, used for the FIR indicator regressors.
fn resample_nearest(xs: &[f64], ys: &[f64], at: &[f64]) -> Vec<f64> {
    at.iter()
        .map(|&t| {
            let idx = xs.partition_point(|&x| x < t);
            if idx == 0 {
                return ys[0];
            }
            if idx >= xs.len() {
                return ys[ys.len() - 1];
            }
            if (t - xs[idx - 1]) < (xs[idx] - t) {
                ys[idx - 1]
            } else {
                ys[idx]
            }
        })
        .collect()
}

fn shift_right(signal: &[f64], by: usize) -> Vec<f64> {
    let mut out = vec![0.0; signal.len()];
    if by < signal.len() {
        out[by..].copy_from_slice(&signal[..signal.len() - by]);
    }
    out
}

fn fir_delays(cfg: &RegressorConfig) -> Result<&[f64], RegressorError> {
    let delays = cfg
        .fir_delays
        .as_deref()
        .filter(|delays| !delays.is_empty())
        .ok_or(RegressorError::MissingDelays)?;
    for &delay in delays {
        if !delay.is_finite() || delay < 0.0 {
            return Err(RegressorError::InvalidDelays(format!(
                "delay {delay} must be finite and non-negative"
            )));
        }
    }
    Ok(delays)
}

fn format_delay(delay: f64) -> String {
    if delay.fract().abs() < 1e-9 {
        format!("{}", delay.round() as i64)
    } else {
        format!("{delay}")
    }
}

/// Residualize each extra basis signal against the span of the signals
/// before it; the primary regressor is left untouched.
fn orthogonalize(signals: &mut [Vec<f64>]) {
    for i in 1..signals.len() {
        let (head, tail) = signals.split_at_mut(i);
        let current = &mut tail[0];
        for prev in head.iter() {
            let denom: f64 = prev.iter().map(|v| v * v).sum();
            if denom <= f64::EPSILON {
                continue;
            }
            let coef = current
                .iter()
                .zip(prev.iter())
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / denom;
            for (c, p) in current.iter_mut().zip(prev.iter()) {
                *c -= coef * p;
            }
        }
    }
}
