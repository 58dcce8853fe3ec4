use crate::events::Condition;
use crate::hrf::RegressorSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Color(pub u32);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Filled band between the x axis and the sample values (stimulus blocks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Area(AreaSeries),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }
}

const PALETTE: [u32; 4] = [0x1F77B4, 0xFF7F0E, 0x2CA02C, 0xD62728];
const STIMULUS_COLOR: u32 = 0x808080;
const MAX_POINTS: usize = 2048;

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

/// Stimulus blocks of a condition sampled on the frame grid as an area trace.
pub fn stimulus_series(condition: &Condition, frame_times: &[f64]) -> AreaSeries {
    let points: Vec<[f64; 2]> = frame_times
        .iter()
        .map(|&t| {
            let level: f64 = condition
                .events
                .iter()
                .filter(|ev| {
                    t >= ev.onset && (t < ev.end() || (ev.duration == 0.0 && t == ev.onset))
                })
                .map(|ev| ev.amplitude)
                .sum();
            [t, level]
        })
        .collect();
    AreaSeries {
        name: "stimulus".into(),
        points,
        color: Color(STIMULUS_COLOR),
    }
}

/// Figure overlaying a condition's stimulus outline with its synthesized
/// regressors.
pub fn figure_from_regressors(set: &RegressorSet, stimulus: Option<&Condition>) -> Figure {
    let mut fig = Figure::new(Some("hemodynamic regressors".to_string()));
    fig.x.label = Some("time (s)".into());
    fig.y.label = Some("amplitude (a.u.)".into());
    if let Some(condition) = stimulus {
        fig.add_series(Series::Area(stimulus_series(condition, &set.frame_times)));
    }
    for (j, (name, signal)) in set.names.iter().zip(&set.signals).enumerate() {
        let points: Vec<[f64; 2]> = set
            .frame_times
            .iter()
            .zip(signal)
            .map(|(&t, &value)| [t, value])
            .collect();
        fig.add_series(Series::Line(LineSeries {
            name: name.clone(),
            points: decimate_points(&points, MAX_POINTS),
            style: Style {
                width: 1.6,
                color: Color(PALETTE[j % PALETTE.len()]),
            },
        }));
    }
    fig
}
