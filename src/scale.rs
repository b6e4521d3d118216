// Axis ranges and tick positions

use crate::ir::{EvaluatedPlot, PlotSpec};
use chrono::{NaiveDateTime, NaiveTime, TimeDelta};

/// Upper bound on generated ticks per axis
const MAX_TICKS: usize = 200;

/// Y range of a plot: the template's `yrange`, or autoscaled from its series
pub fn y_range(plot: &PlotSpec, evaluated: &EvaluatedPlot) -> (f64, f64) {
    match plot.yrange {
        Some(range) => range,
        None => auto_range(evaluated),
    }
}

/// Padded range covering every present value; `(0, 1)` when there are none
pub fn auto_range(plot: &EvaluatedPlot) -> (f64, f64) {
    let (min, max) = plot
        .series
        .iter()
        .filter_map(|s| s.min_max())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (min, max)| {
            (lo.min(min), hi.max(max))
        });

    if min > max {
        return (0.0, 1.0);
    }
    pad_range(min, max)
}

fn pad_range(min: f64, max: f64) -> (f64, f64) {
    if min == max {
        (min - 1.0, max + 1.0)
    } else {
        let padding = (max - min) * 0.05;
        (min - padding, max + padding)
    }
}

/// X tick times every `step_hours` within `[start, end]`, aligned to midnight
pub fn time_ticks(start: NaiveDateTime, end: NaiveDateTime, step_hours: f64) -> Vec<NaiveDateTime> {
    let step = match TimeDelta::try_milliseconds((step_hours * 3_600_000.0).round() as i64) {
        Some(step) if step > TimeDelta::zero() && start <= end => step,
        _ => return Vec::new(),
    };

    let midnight = start.date().and_time(NaiveTime::MIN);
    let steps_in = (start - midnight).num_milliseconds().div_euclid(step.num_milliseconds());
    let mut tick = midnight + step * steps_in as i32;
    if tick < start {
        tick += step;
    }

    let mut ticks = Vec::new();
    while tick <= end && ticks.len() < MAX_TICKS {
        ticks.push(tick);
        tick += step;
    }
    ticks
}

/// Multiples of `step` within `[min, max]`
pub fn value_ticks(min: f64, max: f64, step: f64) -> Vec<f64> {
    if !(step > 0.0) || !(min <= max) || !step.is_finite() {
        return Vec::new();
    }
    let first = (min / step).ceil() as i64;
    let last = (max / step).floor() as i64;
    (first..=last)
        .take(MAX_TICKS)
        .map(|k| k as f64 * step)
        .collect()
}

/// A 1, 2 or 5 times power of ten step giving about `target` intervals over the range
pub fn nice_step(min: f64, max: f64, target: usize) -> f64 {
    let span = max - min;
    if !(span > 0.0) || !span.is_finite() || target == 0 {
        return 1.0;
    }
    let raw = span / target as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let fraction = raw / magnitude;
    let nice = if fraction <= 1.0 {
        1.0
    } else if fraction <= 2.0 {
        2.0
    } else if fraction <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Series;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn plot_with(values: Vec<Option<f64>>) -> EvaluatedPlot {
        let points = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (at(1, 12, i as u32), v))
            .collect();
        EvaluatedPlot {
            series: vec![Series { points }],
        }
    }

    #[test]
    fn test_auto_range_padding() {
        let (lo, hi) = auto_range(&plot_with(vec![Some(0.0), None, Some(100.0)]));
        assert_eq!(lo, -5.0);
        assert_eq!(hi, 105.0);
    }

    #[test]
    fn test_auto_range_single_value_and_empty() {
        assert_eq!(auto_range(&plot_with(vec![Some(5.0)])), (4.0, 6.0));
        assert_eq!(auto_range(&plot_with(vec![None, None])), (0.0, 1.0));
    }

    #[test]
    fn test_time_ticks_align_to_midnight() {
        let ticks = time_ticks(at(1, 13, 20), at(2, 13, 20), 3.0);
        assert_eq!(ticks.first(), Some(&at(1, 15, 0)));
        assert_eq!(ticks.last(), Some(&at(2, 12, 0)));
        assert_eq!(ticks.len(), 8);
        assert!(ticks.contains(&at(2, 0, 0)));
    }

    #[test]
    fn test_time_ticks_include_exact_start() {
        let ticks = time_ticks(at(1, 6, 0), at(1, 12, 0), 6.0);
        assert_eq!(ticks, vec![at(1, 6, 0), at(1, 12, 0)]);
        assert!(time_ticks(at(1, 6, 0), at(1, 12, 0), 0.0).is_empty());
    }

    #[test]
    fn test_value_ticks() {
        assert_eq!(value_ticks(0.0, 35.0, 10.0), vec![0.0, 10.0, 20.0, 30.0]);
        assert_eq!(value_ticks(-2.5, 2.5, 2.0), vec![-2.0, 0.0, 2.0]);
        assert!(value_ticks(0.0, 1.0, 0.0).is_empty());
    }

    #[test]
    fn test_nice_step() {
        assert_eq!(nice_step(0.0, 35.0, 5), 10.0);
        assert_eq!(nice_step(0.0, 100.0, 10), 10.0);
        assert_eq!(nice_step(0.0, 30.0, 10), 5.0);
        assert_eq!(nice_step(3.0, 3.0, 5), 1.0);
    }
}
