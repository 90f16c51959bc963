//! Visualization utilities for landmark_slam
//!
//! Series are collected first and drawn into a single gnuplot axes when the
//! figure is shown or saved. Trajectories and landmarks are projected on the
//! XY plane.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};

use crate::common::{Pose3, Position3, SlamError, SlamResult};
use crate::simulation::RunResults;

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const ESTIMATED: &str = "#35C788";
    pub const GROUND_TRUTH: &str = "#0000FF";
    pub const LANDMARK: &str = BLACK;
    pub const TRUE_LANDMARK: &str = "#808080";
    pub const AGENT: &str = "#00FFFF";

    /// One color per compared strategy, cycled
    pub const SERIES: [&str; 5] = ["#FF0000", "#0000FF", "#35C788", "#FFA500", "#800080"];
}

/// Style for line rendering
#[derive(Debug, Clone)]
pub struct PathStyle {
    pub color: String,
    pub line_width: f64,
    pub caption: String,
}

impl PathStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            line_width: 2.0,
            caption: caption.to_string(),
        }
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }
}

/// Style for point rendering
#[derive(Debug, Clone)]
pub struct PointStyle {
    pub color: String,
    pub size: f64,
    pub symbol: char,
    pub caption: String,
}

impl PointStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            size: 1.0,
            symbol: 'O',
            caption: caption.to_string(),
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn with_symbol(mut self, symbol: char) -> Self {
        self.symbol = symbol;
        self
    }
}

/// Per-step metric plotted against the number of remaining landmarks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Ate,
    Are,
    Ud,
}

impl Metric {
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Ate => "ATE [m]",
            Metric::Are => "ARE [deg]",
            Metric::Ud => "UD",
        }
    }

    fn values<'a>(&self, results: &'a RunResults) -> &'a [f64] {
        match self {
            Metric::Ate => &results.ate_values,
            Metric::Are => &results.are_values,
            Metric::Ud => &results.ud_values,
        }
    }
}

enum Series {
    Lines(Vec<f64>, Vec<f64>, PathStyle),
    Points(Vec<f64>, Vec<f64>, PointStyle),
}

/// Main visualizer struct
pub struct Visualizer {
    figure: Figure,
    title: String,
    x_label: String,
    y_label: String,
    aspect_ratio: Option<f64>,
    series: Vec<Series>,
}

impl Visualizer {
    /// Create a new visualizer for an XY map view
    pub fn new() -> Self {
        Self {
            figure: Figure::new(),
            title: String::new(),
            x_label: "X [m]".to_string(),
            y_label: "Y [m]".to_string(),
            aspect_ratio: Some(1.0),
            series: Vec::new(),
        }
    }

    /// Set the plot title
    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    pub fn set_x_label(&mut self, label: &str) -> &mut Self {
        self.x_label = label.to_string();
        self
    }

    pub fn set_y_label(&mut self, label: &str) -> &mut Self {
        self.y_label = label.to_string();
        self
    }

    /// Set aspect ratio (None for auto)
    pub fn set_aspect_ratio(&mut self, ratio: Option<f64>) -> &mut Self {
        self.aspect_ratio = ratio;
        self
    }

    pub fn num_series(&self) -> usize {
        self.series.len()
    }

    /// Plot a trajectory
    pub fn plot_trajectory(&mut self, poses: &[Pose3], style: &PathStyle) -> &mut Self {
        let x = poses.iter().map(|p| p.translation.x).collect();
        let y = poses.iter().map(|p| p.translation.y).collect();
        self.series.push(Series::Lines(x, y, style.clone()));
        self
    }

    /// Plot landmark positions
    pub fn plot_landmarks<'a, I>(&mut self, positions: I, style: &PointStyle) -> &mut Self
    where
        I: IntoIterator<Item = &'a Position3>,
    {
        let (x, y) = positions.into_iter().map(|p| (p.x, p.y)).unzip();
        self.series.push(Series::Points(x, y, style.clone()));
        self
    }

    /// Plot the agent's current position
    pub fn plot_agent(&mut self, pose: &Pose3) -> &mut Self {
        let style = PointStyle::new(colors::AGENT, "Agent").with_size(2.0);
        self.series.push(Series::Points(
            vec![pose.translation.x],
            vec![pose.translation.y],
            style,
        ));
        self
    }

    /// One curve per run: `metric` against the number of remaining landmarks
    pub fn plot_metric(&mut self, runs: &BTreeMap<String, RunResults>, metric: Metric) -> &mut Self {
        self.set_x_label("landmarks remaining")
            .set_y_label(metric.label())
            .set_aspect_ratio(None);
        for (i, (name, results)) in runs.iter().enumerate() {
            let x = results.landmarks_remaining.iter().map(|&n| n as f64).collect();
            let y = metric.values(results).to_vec();
            let style = PathStyle::new(colors::SERIES[i % colors::SERIES.len()], name);
            self.series.push(Series::Lines(x, y, style));
        }
        self
    }

    /// Finalize and show the plot
    pub fn show(&mut self) -> SlamResult<()> {
        self.draw();
        self.figure.show().map(|_| ()).map_err(plot_error)
    }

    /// Save to `path`; the format follows the extension (`.png`, otherwise SVG)
    pub fn save(&mut self, path: &Path, width: u32, height: u32) -> SlamResult<()> {
        self.draw();
        let file = path.to_string_lossy();
        let is_png = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("png"));
        if is_png {
            self.figure.save_to_png(&*file, width, height).map_err(plot_error)
        } else {
            self.figure.save_to_svg(&*file, width, height).map_err(plot_error)
        }
    }

    fn draw(&mut self) {
        self.figure.clear_axes();
        let axes = self.figure.axes2d();

        if !self.title.is_empty() {
            axes.set_title(&self.title, &[]);
        }
        axes.set_x_label(&self.x_label, &[]);
        axes.set_y_label(&self.y_label, &[]);
        if let Some(ratio) = self.aspect_ratio {
            axes.set_aspect_ratio(AutoOption::Fix(ratio));
        }

        for series in &self.series {
            match series {
                Series::Lines(x, y, style) => {
                    axes.lines(
                        x,
                        y,
                        &[Caption(&style.caption), Color(&style.color), LineWidth(style.line_width)],
                    );
                }
                Series::Points(x, y, style) => {
                    axes.points(
                        x,
                        y,
                        &[
                            Caption(&style.caption),
                            Color(&style.color),
                            PointSymbol(style.symbol),
                            PointSize(style.size),
                        ],
                    );
                }
            }
        }
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

fn plot_error(e: impl std::fmt::Display) -> SlamError {
    SlamError::Io(io::Error::new(io::ErrorKind::Other, format!("gnuplot: {}", e)))
}

/// Map view of a run: estimated and true trajectories plus landmarks
pub fn trajectory_plot(
    estimated: &[Pose3],
    ground_truth: &[Pose3],
    landmarks: &[Position3],
    true_landmarks: &[Position3],
    title: &str,
) -> Visualizer {
    let mut vis = Visualizer::new();
    vis.set_title(title)
        .plot_landmarks(true_landmarks, &PointStyle::new(colors::TRUE_LANDMARK, "True landmarks").with_symbol('x'))
        .plot_landmarks(landmarks, &PointStyle::new(colors::LANDMARK, "Landmarks").with_symbol('*'))
        .plot_trajectory(ground_truth, &PathStyle::new(colors::GROUND_TRUTH, "Ground truth"))
        .plot_trajectory(estimated, &PathStyle::new(colors::ESTIMATED, "Estimated"));
    if let Some(last) = estimated.last() {
        vis.plot_agent(last);
    }
    vis
}
