// Template documents: TOML <-> GraphSpec

use crate::error::ParseError;
use crate::ir::{GraphSpec, PlotSpec, Style, SubplotSpec, Ycalc};
use crate::parser::{format_timedelta, format_y2tics, parse_expression, parse_timedelta, parse_y2tics};
use chrono::format::{Item, StrftimeItems};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_SIZE: (u32, u32) = (600, 800);
const DEFAULT_LMARGIN: f64 = 5.0;
const DEFAULT_RMARGIN: f64 = 3.0;
const DEFAULT_BMARGIN: f64 = 1.0;
const DEFAULT_DURATION_HOURS: i64 = 24;
const DEFAULT_XTICS: f64 = 3.0;
const DEFAULT_XFORMAT: &str = "%H%M";
const DEFAULT_SOURCE: &str = "raw";
/// Largest canvas side in pixels
pub const MAX_PIXELS: u32 = 16384;

/// Raw template document as written in TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lmargin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rmargin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmargin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xtics: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xformat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dateformat: Option<String>,
    // Tables must come after plain values in TOML output
    #[serde(default, rename = "plot")]
    pub plots: Vec<PlotDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlotDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmargin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yrange: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ytics: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y2tics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, rename = "subplot")]
    pub subplots: Vec<SubplotDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubplotDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colour: Option<u32>,
    pub ycalc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Parse and validate a TOML template
pub fn parse_template(text: &str) -> Result<GraphSpec, ParseError> {
    let document: TemplateDocument =
        toml::from_str(text).map_err(|e| ParseError::Syntax(e.to_string()))?;
    let spec = document.into_spec()?;
    debug!(
        plots = spec.plots.len(),
        subplots = spec.plots.iter().map(|p| p.subplots.len()).sum::<usize>(),
        "Parsed template"
    );
    Ok(spec)
}

impl TemplateDocument {
    /// Validate the document and resolve defaults
    pub fn into_spec(self) -> Result<GraphSpec, ParseError> {
        let (width, height) = match &self.size {
            None => DEFAULT_SIZE,
            Some(size) => parse_size(size)?,
        };
        let lmargin = positive("lmargin", self.lmargin.unwrap_or(DEFAULT_LMARGIN))?;
        let rmargin = positive("rmargin", self.rmargin.unwrap_or(DEFAULT_RMARGIN))?;
        let bmargin = positive("bmargin", self.bmargin.unwrap_or(DEFAULT_BMARGIN))?;

        let duration = match &self.duration {
            None => TimeDelta::hours(DEFAULT_DURATION_HOURS),
            Some(text) => parse_timedelta(text).map_err(|reason| ParseError::invalid("duration", reason))?,
        };
        if duration <= TimeDelta::zero() {
            return Err(ParseError::invalid("duration", "must be a positive time span"));
        }

        let xtics = positive("xtics", self.xtics.unwrap_or(DEFAULT_XTICS))?;
        let xformat = self.xformat.unwrap_or_else(|| DEFAULT_XFORMAT.to_string());
        check_time_format("xformat", &xformat)?;
        if let Some(dateformat) = &self.dateformat {
            check_time_format("dateformat", dateformat)?;
        }

        if self.plots.is_empty() {
            return Err(ParseError::invalid("plot", "template has no plots"));
        }
        let plots = self
            .plots
            .into_iter()
            .enumerate()
            .map(|(i, plot)| plot.into_spec(&format!("plot[{}]", i), bmargin))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GraphSpec {
            width,
            height,
            lmargin,
            rmargin,
            bmargin,
            duration,
            xtics,
            xformat,
            dateformat: self.dateformat,
            plots,
        })
    }
}

impl PlotDocument {
    fn into_spec(self, path: &str, parent_bmargin: f64) -> Result<PlotSpec, ParseError> {
        let bmargin = match self.bmargin {
            None => parent_bmargin,
            Some(m) => positive(&format!("{}.bmargin", path), m)?,
        };

        let yrange = match &self.yrange {
            None => None,
            Some(range) => Some(parse_yrange(&format!("{}.yrange", path), range)?),
        };
        let ytics = match self.ytics {
            None => None,
            Some(step) => Some(positive(&format!("{}.ytics", path), step)?),
        };
        let y2tics = match &self.y2tics {
            None => Vec::new(),
            Some(text) => {
                parse_y2tics(text).map_err(|reason| ParseError::invalid(format!("{}.y2tics", path), reason))?
            }
        };

        let source = self.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        if source.trim().is_empty() {
            return Err(ParseError::invalid(format!("{}.source", path), "must name a data source"));
        }

        if self.subplots.is_empty() {
            return Err(ParseError::invalid(
                format!("{}.subplot", path),
                "plot has no subplots",
            ));
        }
        let subplots = self
            .subplots
            .into_iter()
            .enumerate()
            .map(|(i, subplot)| subplot.into_spec(&format!("{}.subplot[{}]", path, i), i))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PlotSpec {
            bmargin,
            title: self.title.unwrap_or_default(),
            yrange,
            ytics,
            y2tics,
            source,
            subplots,
        })
    }
}

impl SubplotDocument {
    fn into_spec(self, path: &str, position: usize) -> Result<SubplotSpec, ParseError> {
        let style = match &self.style {
            None => Style::default(),
            Some(text) => Style::parse(text).map_err(|reason| ParseError::invalid(format!("{}.style", path), reason))?,
        };
        let expr = parse_expression(&self.ycalc)
            .map_err(|e| ParseError::invalid(format!("{}.ycalc", path), e.to_string()))?;

        Ok(SubplotSpec {
            style,
            // gnuplot numbers line colours from 1
            colour: self.colour.unwrap_or(position as u32 + 1),
            ycalc: Ycalc {
                source: self.ycalc,
                expr,
            },
            title: self.title,
        })
    }
}

impl GraphSpec {
    /// Build a document with every field written out explicitly
    pub fn to_template(&self) -> TemplateDocument {
        TemplateDocument {
            size: Some(vec![self.width as f64, self.height as f64]),
            lmargin: Some(self.lmargin),
            rmargin: Some(self.rmargin),
            bmargin: Some(self.bmargin),
            duration: Some(format_timedelta(self.duration)),
            xtics: Some(self.xtics),
            xformat: Some(self.xformat.clone()),
            dateformat: self.dateformat.clone(),
            plots: self
                .plots
                .iter()
                .map(|plot| PlotDocument {
                    bmargin: Some(plot.bmargin),
                    title: Some(plot.title.clone()),
                    yrange: plot.yrange.map(|(lo, hi)| vec![lo, hi]),
                    ytics: plot.ytics,
                    y2tics: if plot.y2tics.is_empty() {
                        None
                    } else {
                        Some(format_y2tics(&plot.y2tics))
                    },
                    source: Some(plot.source.clone()),
                    subplots: plot
                        .subplots
                        .iter()
                        .map(|subplot| SubplotDocument {
                            style: Some(subplot.style.to_string()),
                            colour: Some(subplot.colour),
                            ycalc: subplot.ycalc.source.clone(),
                            title: subplot.title.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// Serialize back to TOML; parsing the result yields an identical spec
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(&self.to_template())
    }
}

fn parse_size(size: &[f64]) -> Result<(u32, u32), ParseError> {
    match size {
        [w, h] if valid_pixels(*w) && valid_pixels(*h) => Ok((*w as u32, *h as u32)),
        _ => Err(ParseError::invalid(
            "size",
            format!("expected two integers from 1 to {}, got {:?}", MAX_PIXELS, size),
        )),
    }
}

fn valid_pixels(v: f64) -> bool {
    v.is_finite() && v >= 1.0 && v.fract() == 0.0 && v <= MAX_PIXELS as f64
}

fn parse_yrange(path: &str, range: &[f64]) -> Result<(f64, f64), ParseError> {
    match range {
        [lo, hi] if lo.is_finite() && hi.is_finite() && lo < hi => Ok((*lo, *hi)),
        [_, _] => Err(ParseError::invalid(
            path,
            format!("minimum must be below maximum, got {:?}", range),
        )),
        _ => Err(ParseError::invalid(
            path,
            format!("expected [min, max], got {:?}", range),
        )),
    }
}

fn positive(path: &str, value: f64) -> Result<f64, ParseError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ParseError::invalid(path, format!("must be positive, got {}", value)))
    }
}

fn check_time_format(path: &str, format: &str) -> Result<(), ParseError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ParseError::invalid(
            path,
            format!("'{}' is not a valid time format", format),
        ));
    }
    Ok(())
}
