// Windowed directional average of wind direction samples

use crate::config::AggregateSettings;
use crate::data::DataWindow;
use crate::error::EvaluationError;
use crate::parser::{parse_timedelta, WindowSpec};
use anyhow::{anyhow, bail, Result};
use chrono::{NaiveDateTime, TimeDelta};

/// Mean resultant length below which directions are considered to cancel
const MIN_RESULTANT: f64 = 1e-9;
/// Reweighting stops once the mean moves less than this (radians)
const CONVERGED: f64 = 1e-12;

/// Averages a direction column over a time window around a reference row
#[derive(Debug, Clone, PartialEq)]
pub struct WindowAggregator {
    log_interval: TimeDelta,
    direction_field: String,
}

impl WindowAggregator {
    /// `log_interval` must be positive
    pub fn new(log_interval: TimeDelta, direction_field: impl Into<String>) -> Result<Self> {
        if log_interval <= TimeDelta::zero() {
            bail!("Logging interval must be positive");
        }
        Ok(WindowAggregator {
            log_interval,
            direction_field: direction_field.into(),
        })
    }

    pub fn from_settings(settings: &AggregateSettings) -> Result<Self> {
        let interval = parse_timedelta(&settings.log_interval)
            .map_err(|e| anyhow!("Invalid aggregate.log_interval '{}': {}", settings.log_interval, e))?;
        Self::new(interval, settings.direction_field.clone())
    }

    pub fn direction_field(&self) -> &str {
        &self.direction_field
    }

    pub fn log_interval(&self) -> TimeDelta {
        self.log_interval
    }

    /// Robust circular mean (degrees) of the direction samples in
    /// `[at + window.start, at + window.end)`
    pub fn winddir_average(
        &self,
        data: DataWindow<'_>,
        at: NaiveDateTime,
        window: WindowSpec,
        smoothing: f64,
        iterations: u32,
    ) -> Result<Option<f64>, EvaluationError> {
        let column = data
            .column_index(&self.direction_field)
            .ok_or_else(|| EvaluationError::UnknownField(self.direction_field.clone()))?;

        let (Some(start), Some(end)) = (
            at.checked_add_signed(window.start),
            at.checked_add_signed(window.end),
        ) else {
            return Ok(None);
        };

        let samples: Vec<(f64, f64)> = data
            .slice(start, end)
            .rows()
            .iter()
            .filter_map(|row| {
                let direction = row.values.get(column).copied().flatten().filter(|d| d.is_finite())?;
                let dt = (row.idx - at).num_milliseconds().abs() as f64 / 1000.0;
                Some((dt, direction))
            })
            .collect();

        let interval = self.log_interval.num_milliseconds() as f64 / 1000.0;
        Ok(circular_mean(&samples, smoothing, iterations, interval))
    }
}

/// Weighted circular mean of `(seconds from reference, degrees)` samples.
///
/// Each sample starts with weight `smoothing^(dt / interval)`. The mean is
/// then refined `iterations` times, scaling every weight by
/// `(1 + cos(theta - mean)) / 2` so that directions far from the current
/// estimate count for less. Returns `None` when there are no samples or
/// when the directions cancel out.
pub fn circular_mean(samples: &[(f64, f64)], smoothing: f64, iterations: u32, interval: f64) -> Option<f64> {
    match samples {
        [] => return None,
        [(_, degrees)] => return Some(normalize_degrees(*degrees)),
        _ => {}
    }

    // Offsets are taken from the nearest sample so distant windows don't underflow
    let nearest = samples.iter().map(|(dt, _)| *dt).fold(f64::INFINITY, f64::min);
    let points: Vec<(f64, f64)> = samples
        .iter()
        .map(|(dt, degrees)| (smoothing.powf((dt - nearest) / interval), degrees.to_radians()))
        .collect();

    let mut mean = resultant(points.iter().copied())?;
    for _ in 0..iterations {
        let reweighted = points
            .iter()
            .map(|(weight, theta)| (weight * (1.0 + (theta - mean).cos()) / 2.0, *theta));
        let Some(next) = resultant(reweighted) else {
            break;
        };
        let moved = (next - mean).sin().atan2((next - mean).cos()).abs();
        mean = next;
        if moved < CONVERGED {
            break;
        }
    }

    Some(normalize_degrees(mean.to_degrees()))
}

/// Direction of the weighted resultant vector, if it is long enough to have one
fn resultant(points: impl Iterator<Item = (f64, f64)>) -> Option<f64> {
    let (mut sin, mut cos, mut total) = (0.0, 0.0, 0.0);
    for (weight, theta) in points {
        sin += weight * theta.sin();
        cos += weight * theta.cos();
        total += weight;
    }
    if total <= 0.0 || sin.hypot(cos) / total < MIN_RESULTANT {
        return None;
    }
    Some(sin.atan2(cos))
}

fn normalize_degrees(degrees: f64) -> f64 {
    let d = degrees.rem_euclid(360.0);
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataRow, Table};
    use chrono::NaiveDate;

    fn angular_distance(a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(360.0);
        d.min(360.0 - d)
    }

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn aggregator() -> WindowAggregator {
        WindowAggregator::new(TimeDelta::minutes(5), "wind_dir").unwrap()
    }

    fn hour_window() -> WindowSpec {
        WindowSpec {
            start: TimeDelta::minutes(-30),
            end: TimeDelta::minutes(30),
        }
    }

    #[test]
    fn test_single_sample_is_exact() {
        assert_eq!(circular_mean(&[(120.0, 247.5)], 0.5, 3, 300.0), Some(247.5));
        assert_eq!(circular_mean(&[(0.0, -90.0)], 0.5, 3, 300.0), Some(270.0));
        assert_eq!(circular_mean(&[(0.0, 360.0)], 0.5, 3, 300.0), Some(0.0));
    }

    #[test]
    fn test_no_samples_is_no_value() {
        assert_eq!(circular_mean(&[], 0.5, 3, 300.0), None);
    }

    #[test]
    fn test_identical_samples() {
        let mean = circular_mean(&[(0.0, 0.0), (300.0, 0.0)], 0.7, 2, 300.0).unwrap();
        assert_eq!(mean, 0.0);
        let mean = circular_mean(&[(0.0, 90.0), (600.0, 90.0)], 0.7, 2, 300.0).unwrap();
        assert!(angular_distance(mean, 90.0) < 1e-9);
    }

    #[test]
    fn test_wraps_through_north() {
        let mean = circular_mean(&[(0.0, 350.0), (0.0, 10.0)], 1.0, 3, 300.0).unwrap();
        assert!((0.0..360.0).contains(&mean));
        assert!(angular_distance(mean, 0.0) < 1e-9);
    }

    #[test]
    fn test_opposite_directions_cancel() {
        assert_eq!(circular_mean(&[(0.0, 0.0), (0.0, 180.0)], 1.0, 3, 300.0), None);
    }

    #[test]
    fn test_reweighting_suppresses_outlier() {
        let samples = [(0.0, 0.0), (0.0, 0.0), (0.0, 0.0), (0.0, 100.0)];
        let plain = circular_mean(&samples, 1.0, 0, 300.0).unwrap();
        let robust = circular_mean(&samples, 1.0, 5, 300.0).unwrap();
        assert!(plain > 15.0 && plain < 25.0);
        assert!(robust > 0.0 && robust < plain);
    }

    #[test]
    fn test_smoothing_favours_nearby_samples() {
        let samples = [(0.0, 0.0), (1800.0, 90.0)];
        let mean = circular_mean(&samples, 0.5, 0, 300.0).unwrap();
        // 0.5^6 weight on the distant sample
        assert!(mean < 5.0);
    }

    #[test]
    fn test_window_excludes_end_and_nulls() {
        let table = Table::new(
            vec!["wind_dir".to_string()],
            vec![
                DataRow { idx: at(11, 30), values: vec![Some(90.0)] },
                DataRow { idx: at(12, 0), values: vec![None] },
                DataRow { idx: at(12, 30), values: vec![Some(270.0)] },
            ],
        )
        .unwrap();
        let mean = aggregator()
            .winddir_average(table.window(), at(12, 0), hour_window(), 0.5, 2)
            .unwrap();
        assert_eq!(mean, Some(90.0));
    }

    #[test]
    fn test_non_finite_directions_are_skipped() {
        let table = Table::new(
            vec!["wind_dir".to_string()],
            vec![
                DataRow { idx: at(11, 55), values: vec![Some(90.0)] },
                DataRow { idx: at(12, 0), values: vec![Some(f64::NAN)] },
                DataRow { idx: at(12, 5), values: vec![Some(f64::INFINITY)] },
                DataRow { idx: at(12, 10), values: vec![Some(90.0)] },
            ],
        )
        .unwrap();
        let mean = aggregator()
            .winddir_average(table.window(), at(12, 0), hour_window(), 0.5, 2)
            .unwrap()
            .unwrap();
        assert!(angular_distance(mean, 90.0) < 1e-9);
    }

    #[test]
    fn test_boundary_window_uses_available_rows() {
        let table = Table::new(
            vec!["wind_dir".to_string()],
            vec![DataRow { idx: at(0, 0), values: vec![Some(45.0)] }],
        )
        .unwrap();
        let mean = aggregator()
            .winddir_average(table.window(), at(0, 0), hour_window(), 0.5, 2)
            .unwrap();
        assert_eq!(mean, Some(45.0));
    }

    #[test]
    fn test_missing_direction_column() {
        let table = Table::new(vec!["wind_ave".to_string()], vec![]).unwrap();
        let err = aggregator()
            .winddir_average(table.window(), at(12, 0), hour_window(), 0.5, 2)
            .unwrap_err();
        assert_eq!(err, EvaluationError::UnknownField("wind_dir".to_string()));
    }

    #[test]
    fn test_from_settings() {
        let agg = WindowAggregator::from_settings(&AggregateSettings::default()).unwrap();
        assert_eq!(agg.log_interval(), TimeDelta::minutes(5));
        assert_eq!(agg.direction_field(), "wind_dir");

        let bad = AggregateSettings {
            log_interval: "minutes=0".to_string(),
            ..AggregateSettings::default()
        };
        assert!(WindowAggregator::from_settings(&bad).is_err());
    }
}
