use anyhow::{anyhow, Context, Result};
use bold_lib::{
    design::{event_design, one_sample_design, DesignMatrix},
    events::{frame_times, Condition},
    hrf::{
        compute_regressor_with_config, BasisModel, GammaDifferenceHrf, RegressorConfig,
        RegressorSet,
    },
    io::{bids as bids_io, table as table_io},
    plot::{figure_from_regressors, Color as FigureColor, Figure, Series},
};
use clap::{Parser, Subcommand};
use log::info;
use plotters::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "bold",
    version,
    about = "BOLD: fMRI event-regressor tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convolve one condition from a BIDS events.tsv with an HRF basis set
    ComputeRegressor {
        #[arg(long)]
        events: PathBuf,
        /// Condition label (trial_type); without it every row lands in one
        /// condition named `main`
        #[arg(long)]
        label: Option<String>,
        #[arg(long, default_value = "glover")]
        model: String,
        #[arg(long, default_value_t = 2.0)]
        tr: f64,
        #[arg(long, default_value_t = 128)]
        n_scans: usize,
        /// Newline-delimited frame times overriding --tr/--n-scans
        #[arg(long)]
        frame_times: Option<PathBuf>,
        #[arg(long, default_value_t = 50)]
        oversampling: usize,
        #[arg(long, value_delimiter = ',')]
        fir_delays: Option<Vec<f64>>,
        /// Write a .tsv or .json table instead of printing JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Sample the canonical basis kernels of a model at a fixed step
    HrfKernel {
        #[arg(long, default_value = "glover")]
        model: String,
        #[arg(long, default_value_t = 0.01)]
        dt: f64,
    },
    /// Assemble a first-level design matrix from a BIDS events.tsv
    DesignMatrix {
        #[arg(long)]
        events: PathBuf,
        #[arg(long, default_value = "glover")]
        model: String,
        #[arg(long, default_value_t = 2.0)]
        tr: f64,
        #[arg(long, default_value_t = 128)]
        n_scans: usize,
        #[arg(long, default_value_t = 50)]
        oversampling: usize,
        #[arg(long, value_delimiter = ',')]
        fir_delays: Option<Vec<f64>>,
        /// Skip the trailing constant column
        #[arg(long)]
        no_constant: bool,
        #[arg(long)]
        out: PathBuf,
    },
    /// Group-level one-sample design matrix (a column of ones)
    OneSampleDesign {
        #[arg(long)]
        subjects: usize,
        #[arg(long, default_value = "intercept")]
        name: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Render a condition's regressors to a PNG via plotters
    PlotRegressor {
        #[arg(long)]
        events: PathBuf,
        #[arg(long)]
        label: Option<String>,
        #[arg(long, default_value = "glover + derivative")]
        model: String,
        #[arg(long, default_value_t = 2.0)]
        tr: f64,
        #[arg(long, default_value_t = 128)]
        n_scans: usize,
        #[arg(long, default_value_t = 50)]
        oversampling: usize,
        #[arg(long, value_delimiter = ',')]
        fir_delays: Option<Vec<f64>>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Schedule a paradigm description into a BIDS-style events.tsv bundle
    Simulate {
        #[arg(long)]
        design: PathBuf,
        #[arg(long)]
        trials: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::ComputeRegressor {
            events,
            label,
            model,
            tr,
            n_scans,
            frame_times,
            oversampling,
            fir_delays,
            out,
        } => cmd_compute_regressor(
            &events,
            label.as_deref(),
            &model,
            tr,
            n_scans,
            frame_times.as_deref(),
            oversampling,
            fir_delays,
            out.as_deref(),
        )?,
        Commands::HrfKernel { model, dt } => cmd_hrf_kernel(&model, dt)?,
        Commands::DesignMatrix {
            events,
            model,
            tr,
            n_scans,
            oversampling,
            fir_delays,
            no_constant,
            out,
        } => cmd_design_matrix(
            &events,
            &model,
            tr,
            n_scans,
            oversampling,
            fir_delays,
            no_constant,
            &out,
        )?,
        Commands::OneSampleDesign {
            subjects,
            name,
            out,
        } => cmd_one_sample_design(subjects, &name, out.as_deref())?,
        Commands::PlotRegressor {
            events,
            label,
            model,
            tr,
            n_scans,
            oversampling,
            fir_delays,
            out,
        } => cmd_plot_regressor(
            &events,
            label.as_deref(),
            &model,
            tr,
            n_scans,
            oversampling,
            fir_delays,
            &out,
        )?,
        Commands::Simulate {
            design,
            trials,
            out,
        } => cmd_simulate(&design, &trials, &out)?,
    }
    Ok(())
}

fn parse_model(raw: &str) -> Result<BasisModel> {
    raw.parse::<BasisModel>().map_err(|e| anyhow!("{e}"))
}

fn resolve_frame_times(tr: f64, n_scans: usize, file: Option<&Path>) -> Result<Vec<f64>> {
    match file {
        Some(path) => table_io::read_frame_times(path),
        None => Ok(frame_times(tr, n_scans)),
    }
}

fn load_condition(events: &Path, label: Option<&str>) -> Result<Condition> {
    let rows = bids_io::load_bids_events(events)?;
    match label {
        Some(label) => bids_io::condition_from_rows(&rows, label).ok_or_else(|| {
            anyhow!("no events labelled `{label}` in {}", events.display())
        }),
        None => Ok(bids_io::single_condition(&rows, "main")),
    }
}

fn regressor_config(oversampling: usize, fir_delays: Option<Vec<f64>>) -> RegressorConfig {
    let mut cfg = RegressorConfig::default();
    cfg.oversampling = oversampling;
    cfg.fir_delays = fir_delays;
    cfg
}

#[allow(clippy::too_many_arguments)]
fn cmd_compute_regressor(
    events: &Path,
    label: Option<&str>,
    model: &str,
    tr: f64,
    n_scans: usize,
    frame_times_file: Option<&Path>,
    oversampling: usize,
    fir_delays: Option<Vec<f64>>,
    out: Option<&Path>,
) -> Result<()> {
    let model = parse_model(model)?;
    let frames = resolve_frame_times(tr, n_scans, frame_times_file)?;
    let condition = load_condition(events, label)?;
    let cfg = regressor_config(oversampling, fir_delays);
    let set = compute_regressor_with_config(&condition, model, &frames, &cfg)?;
    info!(
        "computed {} regressor(s) over {} frames for `{}`",
        set.names.len(),
        frames.len(),
        condition.con_id
    );
    write_regressors(out, &set)
}

fn write_regressors(out: Option<&Path>, set: &RegressorSet) -> Result<()> {
    match out {
        None => println!("{}", serde_json::to_string(set)?),
        Some(path) => {
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                table_io::write_regressors_json(path, set)?;
            } else {
                table_io::write_regressors_tsv(path, set)?;
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct KernelDump {
    model: String,
    dt: f64,
    names: Vec<String>,
    kernels: Vec<Vec<f64>>,
}

fn cmd_hrf_kernel(model: &str, dt: f64) -> Result<()> {
    let model = parse_model(model)?;
    let hrf: GammaDifferenceHrf = model
        .canonical()
        .ok_or_else(|| anyhow!("the fir model has no canonical kernel"))?;
    if !(dt.is_finite() && dt > 0.0) {
        return Err(anyhow!("--dt must be a positive number of seconds"));
    }
    let mut names = vec!["hrf".to_string()];
    let mut kernels = vec![hrf.sample(dt)];
    if model.with_time_derivative() {
        names.push("hrf_derivative".into());
        kernels.push(hrf.time_derivative(dt));
    }
    if model.with_dispersion_derivative() {
        names.push("hrf_dispersion_derivative".into());
        kernels.push(hrf.dispersion_derivative(dt));
    }
    let dump = KernelDump {
        model: model.to_string(),
        dt,
        names,
        kernels,
    };
    println!("{}", serde_json::to_string(&dump)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_design_matrix(
    events: &Path,
    model: &str,
    tr: f64,
    n_scans: usize,
    oversampling: usize,
    fir_delays: Option<Vec<f64>>,
    no_constant: bool,
    out: &Path,
) -> Result<()> {
    let model = parse_model(model)?;
    let frames = frame_times(tr, n_scans);
    let rows = bids_io::load_bids_events(events)?;
    let conditions = bids_io::conditions_from_rows(&rows, "main");
    let cfg = regressor_config(oversampling, fir_delays);
    let design = event_design(&conditions, model, &frames, &cfg, !no_constant)?;
    info!(
        "design matrix: {} columns x {} rows",
        design.n_columns(),
        design.n_rows()
    );
    table_io::write_design_tsv(out, &design)?;
    Ok(())
}

fn cmd_one_sample_design(subjects: usize, name: &str, out: Option<&Path>) -> Result<()> {
    if subjects == 0 {
        return Err(anyhow!("--subjects must be at least 1"));
    }
    let design: DesignMatrix = one_sample_design(subjects, name);
    match out {
        None => println!("{}", serde_json::to_string(&design)?),
        Some(path) => table_io::write_design_tsv(path, &design)?,
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_plot_regressor(
    events: &Path,
    label: Option<&str>,
    model: &str,
    tr: f64,
    n_scans: usize,
    oversampling: usize,
    fir_delays: Option<Vec<f64>>,
    out: &Path,
) -> Result<()> {
    let model = parse_model(model)?;
    let frames = frame_times(tr, n_scans);
    let condition = load_condition(events, label)?;
    let cfg = regressor_config(oversampling, fir_delays);
    let set = compute_regressor_with_config(&condition, model, &frames, &cfg)?;
    let fig = figure_from_regressors(&set, Some(&condition));
    draw_plotters_figure(out, &fig)?;
    info!("wrote {}", out.display());
    Ok(())
}

fn draw_plotters_figure(path: &Path, fig: &Figure) -> Result<()> {
    let backend = BitMapBackend::new(path, (900, 480));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min: f64 = 0.0;
    let mut y_max: f64 = 0.0;
    for series in &fig.series {
        let points = match series {
            Series::Line(line) => &line.points,
            Series::Area(area) => &area.points,
        };
        for p in points {
            x_min = x_min.min(p[0]);
            x_max = x_max.max(p[0]);
            y_min = y_min.min(p[1]);
            y_max = y_max.max(p[1]);
        }
    }
    if !(x_min.is_finite() && x_max.is_finite()) {
        return Err(anyhow!("nothing to draw"));
    }
    let y_pad = ((y_max - y_min).abs()).max(1e-6) * 0.05;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(x_min..x_max, (y_min - y_pad)..(y_max + y_pad))?;
    chart
        .configure_mesh()
        .x_desc(fig.x.label.clone().unwrap_or_default())
        .y_desc(fig.y.label.clone().unwrap_or_default())
        .draw()?;
    for series in &fig.series {
        match series {
            Series::Area(area) => {
                chart.draw_series(AreaSeries::new(
                    area.points.iter().map(|p| (p[0], p[1])),
                    0.0,
                    &rgb(area.color).mix(0.3),
                ))?;
            }
            Series::Line(line) => {
                chart.draw_series(LineSeries::new(
                    line.points.iter().map(|p| (p[0], p[1])),
                    &rgb(line.style.color),
                ))?;
            }
        }
    }
    root.present()?;
    Ok(())
}

fn rgb(color: FigureColor) -> RGBColor {
    RGBColor(
        ((color.0 >> 16) & 0xFF) as u8,
        ((color.0 >> 8) & 0xFF) as u8,
        (color.0 & 0xFF) as u8,
    )
}

fn cmd_simulate(design: &Path, trials: &Path, out: &Path) -> Result<()> {
    let spec = bold_run::read_paradigm(design)?;
    let trial_list = bold_run::read_trials(trials)?;
    let bundle = bold_run::schedule_run(&spec, &trial_list);
    std::fs::create_dir_all(out)
        .with_context(|| format!("creating output directory {}", out.display()))?;
    bold_run::write_events_tsv(&out.join("events.tsv"), &bundle.events)?;
    bold_run::write_manifest(&out.join("run.json"), &bundle.manifest)?;
    info!(
        "scheduled {} trials for task `{}`",
        bundle.manifest.total_trials, bundle.manifest.task
    );
    println!("{}", serde_json::to_string(&bundle.manifest)?);
    Ok(())
}
