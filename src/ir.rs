use crate::parser::ast::Expr;
use chrono::{NaiveDateTime, TimeDelta};
use std::fmt;

// =============================================================================
// Phase 1: Parsed template
// =============================================================================

/// One multi-panel graph. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSpec {
    pub width: u32,
    pub height: u32,
    // Margins are in character units, as gnuplot uses them
    pub lmargin: f64,
    pub rmargin: f64,
    pub bmargin: f64,
    /// Time span shown on the x axis, ending at the render time
    pub duration: TimeDelta,
    /// Hours between x axis ticks
    pub xtics: f64,
    pub xformat: String,
    pub dateformat: Option<String>,
    pub plots: Vec<PlotSpec>,
}

/// One panel of the graph
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSpec {
    pub bmargin: f64,
    pub title: String,
    /// Fixed y range; `None` autoscales from the evaluated data
    pub yrange: Option<(f64, f64)>,
    pub ytics: Option<f64>,
    pub y2tics: Vec<(String, f64)>,
    /// Name of the data table the subplots read
    pub source: String,
    pub subplots: Vec<SubplotSpec>,
}

/// One drawn series within a plot
#[derive(Debug, Clone, PartialEq)]
pub struct SubplotSpec {
    pub style: Style,
    pub colour: u32,
    pub ycalc: Ycalc,
    pub title: Option<String>,
}

/// A calculation expression together with the text it was parsed from
#[derive(Debug, Clone, PartialEq)]
pub struct Ycalc {
    pub source: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Style {
    pub kind: StyleKind,
    /// Line width, marker scale or bar width fraction
    pub width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleKind {
    Line,
    Step,
    Bars,
    Marker(Marker),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Plus,
    Cross,
    Circle,
    Dot,
}

impl Default for Style {
    fn default() -> Self {
        Style {
            kind: StyleKind::Line,
            width: 1.0,
        }
    }
}

impl Style {
    /// Parse a style token with optional width, e.g. `line`, `+ 0.5`, `bars 0.8`
    pub fn parse(text: &str) -> Result<Style, String> {
        let mut words = text.split_whitespace();
        let kind = match words.next() {
            None => return Ok(Style::default()),
            Some("line") | Some("-") => StyleKind::Line,
            Some("step") => StyleKind::Step,
            Some("bars") => StyleKind::Bars,
            Some("+") => StyleKind::Marker(Marker::Plus),
            Some("x") => StyleKind::Marker(Marker::Cross),
            Some("o") => StyleKind::Marker(Marker::Circle),
            Some(".") => StyleKind::Marker(Marker::Dot),
            Some(other) => return Err(format!("unknown style '{}'", other)),
        };
        let width = match words.next() {
            None => 1.0,
            Some(w) => w
                .parse::<f64>()
                .ok()
                .filter(|w| w.is_finite() && *w > 0.0)
                .ok_or_else(|| format!("style width must be a positive number, got '{}'", w))?,
        };
        if let Some(extra) = words.next() {
            return Err(format!("unexpected '{}' after style width", extra));
        }
        Ok(Style { kind, width })
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self.kind {
            StyleKind::Line => "line",
            StyleKind::Step => "step",
            StyleKind::Bars => "bars",
            StyleKind::Marker(Marker::Plus) => "+",
            StyleKind::Marker(Marker::Cross) => "x",
            StyleKind::Marker(Marker::Circle) => "o",
            StyleKind::Marker(Marker::Dot) => ".",
        };
        write!(f, "{} {}", token, self.width)
    }
}

// =============================================================================
// Phase 2: Evaluated series (renderer input)
// =============================================================================

/// Evaluated values for every subplot, ready for a renderer
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedGraph {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Index matches `GraphSpec::plots`
    pub plots: Vec<EvaluatedPlot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedPlot {
    /// Index matches `PlotSpec::subplots`
    pub series: Vec<Series>,
}

/// One subplot's points; `None` is a gap in the drawn line
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    pub points: Vec<(NaiveDateTime, Option<f64>)>,
}

impl Series {
    /// Split into runs of consecutive present values
    pub fn runs(&self) -> Vec<Vec<(NaiveDateTime, f64)>> {
        let mut runs = Vec::new();
        let mut current = Vec::new();
        for (idx, value) in &self.points {
            match value {
                Some(v) => current.push((*idx, *v)),
                None => {
                    if !current.is_empty() {
                        runs.push(std::mem::take(&mut current));
                    }
                }
            }
        }
        if !current.is_empty() {
            runs.push(current);
        }
        runs
    }

    /// Smallest and largest present value
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.points
            .iter()
            .filter_map(|(_, v)| *v)
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}
