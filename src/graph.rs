// Renderers turning an evaluated graph into output bytes

use crate::ir::{EvaluatedGraph, EvaluatedPlot, GraphSpec, Marker, PlotSpec, Series, Style, StyleKind, SubplotSpec};
use crate::palette::ColorPalette;
use crate::scale;
use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDateTime, TimeDelta, Timelike};
use image::ImageEncoder;
use plotters::coord::ranged1d::{DefaultFormatting, KeyPointHint, Ranged};
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use std::ops::Range;
use tracing::debug;

/// Consumes a parsed template and its evaluated series
pub trait GraphRenderer {
    fn render(&self, spec: &GraphSpec, graph: &EvaluatedGraph) -> Result<Vec<u8>>;
}

/// Pixels per template margin unit
const CHAR_PX: f64 = 10.0;
const FONT: &str = "sans-serif";

type PanelChart<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<TickedAxis, TickedAxis>>;

/// Linear f64 axis whose bold ticks sit at fixed positions and which has no light ticks
struct TickedAxis {
    coord: RangedCoordf64,
    ticks: Vec<f64>,
}

impl TickedAxis {
    fn new(range: Range<f64>, ticks: Vec<f64>) -> Self {
        TickedAxis {
            coord: RangedCoordf64::from(range),
            ticks,
        }
    }
}

impl Ranged for TickedAxis {
    type FormatOption = DefaultFormatting;
    type ValueType = f64;

    fn map(&self, value: &f64, limit: (i32, i32)) -> i32 {
        self.coord.map(value, limit)
    }

    fn key_points<Hint: KeyPointHint>(&self, hint: Hint) -> Vec<f64> {
        if hint.weight().allow_light_points() {
            Vec::new()
        } else {
            self.ticks.clone()
        }
    }

    fn range(&self) -> Range<f64> {
        self.coord.range()
    }
}

/// PNG image with one panel per plot, stacked vertically
#[derive(Debug, Default)]
pub struct PngRenderer {
    palette: ColorPalette,
}

impl PngRenderer {
    pub fn new(palette: ColorPalette) -> Self {
        PngRenderer { palette }
    }
}

impl GraphRenderer for PngRenderer {
    fn render(&self, spec: &GraphSpec, graph: &EvaluatedGraph) -> Result<Vec<u8>> {
        if spec.plots.len() != graph.plots.len() {
            anyhow::bail!(
                "Graph has {} plots but {} were evaluated",
                spec.plots.len(),
                graph.plots.len()
            );
        }

        let (width, height) = (spec.width, spec.height);
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(3))
            .ok_or_else(|| anyhow!("Image size {}x{} is too large", width, height))?;
        let mut buffer = vec![0u8; len];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
            root.fill(&WHITE).context("Failed to fill background")?;

            let panels = root.split_evenly((spec.plots.len(), 1));
            for ((plot, evaluated), area) in spec.plots.iter().zip(&graph.plots).zip(&panels) {
                self.draw_panel(area, spec, plot, evaluated, graph)?;
            }

            root.present().context("Failed to present drawing")?;
        }

        let mut png_bytes = Vec::new();
        image::codecs::png::PngEncoder::new(&mut png_bytes)
            .write_image(&buffer, width, height, image::ColorType::Rgb8)
            .context("Failed to encode PNG")?;

        debug!(bytes = png_bytes.len(), "Rendered PNG");
        Ok(png_bytes)
    }
}

impl PngRenderer {
    fn draw_panel(
        &self,
        area: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
        spec: &GraphSpec,
        plot: &PlotSpec,
        evaluated: &EvaluatedPlot,
        graph: &EvaluatedGraph,
    ) -> Result<()> {
        let span = seconds(graph.end - graph.start).max(1.0);
        let x_ticks: Vec<f64> = scale::time_ticks(graph.start, graph.end, spec.xtics)
            .into_iter()
            .map(|t| seconds(t - graph.start))
            .collect();

        let (y_min, y_max) = scale::y_range(plot, evaluated);
        let y_step = plot
            .ytics
            .unwrap_or_else(|| scale::nice_step(y_min, y_max, 5));
        let y_ticks = scale::value_ticks(y_min, y_max, y_step);
        let y2_positions: Vec<f64> = plot
            .y2tics
            .iter()
            .map(|(_, pos)| *pos)
            .filter(|pos| (y_min..=y_max).contains(pos))
            .collect();

        let mut builder = ChartBuilder::on(area);
        builder
            .margin(4)
            .x_label_area_size(margin_px(plot.bmargin) + 10)
            .y_label_area_size(margin_px(spec.lmargin))
            .right_y_label_area_size(margin_px(spec.rmargin));
        if !plot.title.is_empty() {
            builder.caption(&plot.title, (FONT, 16));
        }
        let mut chart = builder
            .build_cartesian_2d(
                TickedAxis::new(0.0..span, x_ticks.clone()),
                TickedAxis::new(y_min..y_max, y_ticks.clone()),
            )
            .context("Failed to build chart")?
            .set_secondary_coord(
                TickedAxis::new(0.0..span, Vec::new()),
                TickedAxis::new(y_min..y_max, y2_positions.clone()),
            );

        let x_label = |x: &f64| time_label(spec, graph.start + TimeDelta::milliseconds((x * 1000.0).round() as i64));
        chart
            .configure_mesh()
            .x_labels(x_ticks.len() + 1)
            .y_labels(y_ticks.len() + 1)
            .x_label_formatter(&x_label)
            .y_label_formatter(&|y| tick_label(*y))
            .light_line_style(WHITE)
            .bold_line_style(BLACK.mix(0.15))
            .label_style((FONT, 11))
            .draw()
            .context("Failed to draw mesh")?;

        if !y2_positions.is_empty() {
            let y2_label = |y: &f64| {
                plot.y2tics
                    .iter()
                    .find(|(_, pos)| (pos - y).abs() < 1e-9)
                    .map(|(label, _)| label.clone())
                    .unwrap_or_default()
            };
            chart
                .configure_secondary_axes()
                .y_labels(y2_positions.len() + 1)
                .y_label_formatter(&y2_label)
                .label_style((FONT, 11))
                .draw()
                .context("Failed to draw secondary axis")?;
        }

        let mut titled = false;
        for (subplot, series) in plot.subplots.iter().zip(&evaluated.series) {
            let color = self.palette.get_color(subplot.colour);
            draw_subplot(&mut chart, subplot.style, color, series, graph.start, (y_min, y_max))?;
            if let Some(title) = &subplot.title {
                titled = true;
                draw_legend_entry(&mut chart, subplot, title, color)?;
            }
        }

        if titled {
            chart
                .configure_series_labels()
                .label_font((FONT, 11))
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .position(SeriesLabelPosition::UpperLeft)
                .draw()
                .context("Failed to draw legend")?;
        }
        Ok(())
    }
}

fn draw_subplot(
    chart: &mut PanelChart<'_, '_>,
    style: Style,
    color: RGBColor,
    series: &Series,
    start: NaiveDateTime,
    (y_min, y_max): (f64, f64),
) -> Result<()> {
    let runs: Vec<Vec<(f64, f64)>> = series
        .runs()
        .into_iter()
        .map(|run| run.into_iter().map(|(t, v)| (seconds(t - start), v)).collect())
        .collect();
    let stroke = color.stroke_width(style.width.round().max(1.0) as u32);
    let size = (3.0 * style.width).round().max(1.0) as i32;

    match style.kind {
        StyleKind::Line => {
            chart
                .draw_series(runs.into_iter().map(|run| PathElement::new(run, stroke)))
                .context("Failed to draw line series")?;
        }
        StyleKind::Step => {
            chart
                .draw_series(runs.into_iter().map(|run| PathElement::new(steps(&run), stroke)))
                .context("Failed to draw step series")?;
        }
        StyleKind::Bars => {
            let points: Vec<(f64, f64)> = runs.into_iter().flatten().collect();
            let half = bar_spacing(&points) * style.width.min(1.0) / 2.0;
            let base = 0.0f64.max(y_min).min(y_max);
            chart
                .draw_series(
                    points
                        .into_iter()
                        .map(|(x, y)| Rectangle::new([(x - half, base), (x + half, y)], color.filled())),
                )
                .context("Failed to draw bar series")?;
        }
        StyleKind::Marker(Marker::Cross) => {
            chart
                .draw_series(runs.into_iter().flatten().map(|p| Cross::new(p, size, stroke)))
                .context("Failed to draw markers")?;
        }
        StyleKind::Marker(Marker::Circle) => {
            chart
                .draw_series(runs.into_iter().flatten().map(|p| Circle::new(p, size, stroke)))
                .context("Failed to draw markers")?;
        }
        StyleKind::Marker(Marker::Dot) => {
            let radius = style.width.round().max(1.0) as i32;
            chart
                .draw_series(runs.into_iter().flatten().map(|p| Circle::new(p, radius, color.filled())))
                .context("Failed to draw markers")?;
        }
        StyleKind::Marker(Marker::Plus) => {
            chart
                .draw_series(runs.into_iter().flatten().map(|p| {
                    EmptyElement::at(p)
                        + PathElement::new(vec![(-size, 0), (size, 0), (0, 0), (0, -size), (0, size)], stroke)
                }))
                .context("Failed to draw markers")?;
        }
    }
    Ok(())
}

/// An empty series carrying the subplot's legend label
fn draw_legend_entry(chart: &mut PanelChart<'_, '_>, subplot: &SubplotSpec, title: &str, color: RGBColor) -> Result<()> {
    let style = subplot.style;
    chart
        .draw_series(std::iter::empty::<PathElement<(f64, f64)>>())
        .context("Failed to draw legend entry")?
        .label(title)
        .legend(move |(x, y)| match style.kind {
            StyleKind::Marker(_) => PathElement::new(vec![(x + 5, y - 3), (x + 5, y + 3)], color.stroke_width(2)),
            _ => PathElement::new(vec![(x, y), (x + 15, y)], color.stroke_width(2)),
        });
    Ok(())
}

/// Horizontal-then-vertical path through the points
fn steps(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(points.len() * 2);
    for pair in points.windows(2) {
        let ((x0, y0), (x1, _)) = (pair[0], pair[1]);
        out.push((x0, y0));
        out.push((x1, y0));
    }
    if let Some(last) = points.last() {
        out.push(*last);
    }
    out
}

/// Smallest gap between consecutive x positions
fn bar_spacing(points: &[(f64, f64)]) -> f64 {
    points
        .windows(2)
        .map(|w| w[1].0 - w[0].0)
        .filter(|d| *d > 0.0)
        .fold(f64::INFINITY, f64::min)
        .min(3600.0)
}

/// Number with float noise and trailing zeros removed
fn tick_label(value: f64) -> String {
    let text = format!("{:.6}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

fn margin_px(chars: f64) -> u32 {
    (chars * CHAR_PX).round().max(0.0) as u32
}

fn seconds(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 1000.0
}

/// X axis label; midnight ticks also carry the date when a date format is set
fn time_label(spec: &GraphSpec, t: NaiveDateTime) -> String {
    match &spec.dateformat {
        Some(dateformat) if t.hour() == 0 && t.minute() == 0 => {
            format!("{} {}", t.format(&spec.xformat), t.format(dateformat))
        }
        _ => t.format(&spec.xformat).to_string(),
    }
}

/// Long-format CSV: one row per evaluated point
#[derive(Debug, Default)]
pub struct CsvRenderer;

impl GraphRenderer for CsvRenderer {
    fn render(&self, spec: &GraphSpec, graph: &EvaluatedGraph) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["plot", "subplot", "title", "idx", "value"])
            .context("Failed to write CSV header")?;

        for (i, (plot, evaluated)) in spec.plots.iter().zip(&graph.plots).enumerate() {
            for (j, (subplot, series)) in plot.subplots.iter().zip(&evaluated.series).enumerate() {
                let title = subplot.title.as_deref().unwrap_or("");
                for (idx, value) in &series.points {
                    let value = value.map(|v| v.to_string()).unwrap_or_default();
                    writer
                        .write_record([
                            i.to_string().as_str(),
                            j.to_string().as_str(),
                            title,
                            idx.format("%Y-%m-%d %H:%M:%S").to_string().as_str(),
                            value.as_str(),
                        ])
                        .context("Failed to write CSV row")?;
                }
            }
        }

        writer
            .into_inner()
            .map_err(|e| anyhow!("Failed to flush CSV output: {}", e.error()))
    }
}
