// Evaluates every subplot of a graph over its time range

use crate::data::{DataSource, DataWindow};
use crate::error::{EvaluationError, GraphError};
use crate::eval::Evaluator;
use crate::ir::{EvaluatedGraph, EvaluatedPlot, GraphSpec, PlotSpec, Series, SubplotSpec};
use crate::parser::Expr;
use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Latest timestamp among the sources the graph's plots read
pub fn latest_timestamp(spec: &GraphSpec, source: &dyn DataSource) -> Option<NaiveDateTime> {
    let names: BTreeSet<&str> = spec.plots.iter().map(|p| p.source.as_str()).collect();
    names
        .into_iter()
        .filter_map(|name| source.window(name))
        .filter_map(|window| window.last().map(|row| row.idx))
        .max()
}

/// Evaluate every subplot at every row in `[end - duration, end]`.
///
/// All field, function and source references are checked before any row is
/// evaluated. Windowed aggregates see the whole table, so rows just outside
/// the displayed range still contribute.
pub fn evaluate_graph(
    spec: &GraphSpec,
    source: &dyn DataSource,
    evaluator: &Evaluator<'_>,
    end: NaiveDateTime,
) -> Result<EvaluatedGraph, GraphError> {
    let start = end
        .checked_sub_signed(spec.duration)
        .unwrap_or(NaiveDateTime::MIN);
    info!(%start, %end, plots = spec.plots.len(), "Evaluating graph");

    let windows = spec
        .plots
        .iter()
        .enumerate()
        .map(|(i, plot)| check_plot(i, plot, source, evaluator))
        .collect::<Result<Vec<_>, _>>()?;

    let plots = spec
        .plots
        .par_iter()
        .zip(windows.par_iter())
        .enumerate()
        .map(|(i, (plot, window))| evaluate_plot(i, plot, *window, evaluator, start, end))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(EvaluatedGraph { start, end, plots })
}

/// Resolve a plot's source and check its subplots' references against it
fn check_plot<'s>(
    index: usize,
    plot: &PlotSpec,
    source: &'s dyn DataSource,
    evaluator: &Evaluator<'_>,
) -> Result<DataWindow<'s>, GraphError> {
    let window = source.window(&plot.source).ok_or_else(|| GraphError::Evaluation {
        path: format!("plot[{}]", index),
        source: EvaluationError::UnknownSource(plot.source.clone()),
    })?;

    for (j, subplot) in plot.subplots.iter().enumerate() {
        check_references(&subplot.ycalc.expr, window, evaluator).map_err(|source| GraphError::Evaluation {
            path: format!("plot[{}].subplot[{}]", index, j),
            source,
        })?;
    }
    Ok(window)
}

fn check_references(expr: &Expr, window: DataWindow<'_>, evaluator: &Evaluator<'_>) -> Result<(), EvaluationError> {
    if let Some(field) = expr.fields().into_iter().find(|f| window.column_index(f).is_none()) {
        return Err(EvaluationError::UnknownField(field.to_string()));
    }
    let functions = evaluator.functions();
    if let Some(name) = expr.functions().into_iter().find(|f| !functions.contains(f)) {
        return Err(EvaluationError::UnknownFunction(name.to_string()));
    }

    let mut arity = None;
    expr.walk(&mut |node: &Expr| {
        if let Expr::Call { function, args } = node {
            if args.len() != 1 && arity.is_none() {
                arity = Some(EvaluationError::Arity {
                    function: function.clone(),
                    expected: 1,
                    found: args.len(),
                });
            }
        }
    });
    if let Some(err) = arity {
        return Err(err);
    }

    let direction = evaluator.aggregator().direction_field();
    if expr.uses_aggregate() && window.column_index(direction).is_none() {
        return Err(EvaluationError::UnknownField(direction.to_string()));
    }
    Ok(())
}

fn evaluate_plot(
    index: usize,
    plot: &PlotSpec,
    window: DataWindow<'_>,
    evaluator: &Evaluator<'_>,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<EvaluatedPlot, GraphError> {
    let rows = window.rows();
    let lo = rows.partition_point(|r| r.idx < start);
    let hi = rows.partition_point(|r| r.idx <= end).max(lo);
    debug!(plot = index, source = %plot.source, rows = hi - lo, "Evaluating plot");

    let series = plot
        .subplots
        .par_iter()
        .enumerate()
        .map(|(j, subplot)| {
            evaluate_subplot(subplot, window, evaluator, lo..hi).map_err(|source| GraphError::Evaluation {
                path: format!("plot[{}].subplot[{}]", index, j),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(EvaluatedPlot { series })
}

fn evaluate_subplot(
    subplot: &SubplotSpec,
    window: DataWindow<'_>,
    evaluator: &Evaluator<'_>,
    range: std::ops::Range<usize>,
) -> Result<Series, EvaluationError> {
    let rows = window.rows();
    let points = range
        .map(|i| Ok((rows[i].idx, evaluator.evaluate(&subplot.ycalc.expr, window, i)?)))
        .collect::<Result<Vec<_>, EvaluationError>>()?;
    Ok(Series { points })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::WindowAggregator;
    use crate::data::{DataRow, MemoryStore, Table};
    use crate::functions::FunctionRegistry;
    use crate::template::parse_template;
    use chrono::{NaiveDate, TimeDelta};

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn store() -> MemoryStore {
        let rows = (0..8)
            .map(|i| DataRow {
                idx: at(9 + i / 2, (i % 2) * 30),
                values: vec![Some(i as f64), Some(i as f64 + 2.0), Some(90.0)],
            })
            .collect();
        let table = Table::new(
            vec!["wind_ave".to_string(), "wind_gust".to_string(), "wind_dir".to_string()],
            rows,
        )
        .unwrap();
        let mut store = MemoryStore::new();
        store.insert("raw", table);
        store
    }

    fn run(template: &str, end: NaiveDateTime) -> Result<EvaluatedGraph, GraphError> {
        let spec = parse_template(template).unwrap();
        let functions = FunctionRegistry::with_conversions();
        let aggregator = WindowAggregator::new(TimeDelta::minutes(30), "wind_dir").unwrap();
        let evaluator = Evaluator::new(&functions, &aggregator);
        evaluate_graph(&spec, &store(), &evaluator, end)
    }

    #[test]
    fn test_rows_limited_to_duration() {
        let template = "duration = \"hours=1\"\n[[plot]]\n[[plot.subplot]]\nycalc = \"data['wind_ave']\"\n";
        let graph = run(template, at(11, 0)).unwrap();
        assert_eq!(graph.start, at(10, 0));
        let points = &graph.plots[0].series[0].points;
        assert_eq!(points, &vec![(at(10, 0), Some(2.0)), (at(10, 30), Some(3.0)), (at(11, 0), Some(4.0))]);
    }

    #[test]
    fn test_latest_timestamp() {
        let spec = parse_template("[[plot]]\n[[plot.subplot]]\nycalc = \"1\"\n").unwrap();
        assert_eq!(latest_timestamp(&spec, &store()), Some(at(12, 30)));
    }

    #[test]
    fn test_unknown_field_reported_with_path() {
        let template = "[[plot]]\n[[plot.subplot]]\nycalc = \"1\"\n[[plot]]\n[[plot.subplot]]\nycalc = \"1\"\n[[plot.subplot]]\nycalc = \"data['rain']\"\n";
        let err = run(template, at(12, 0)).unwrap_err();
        assert_eq!(err.to_string(), "plot[1].subplot[1]: unknown field 'rain'");
    }

    #[test]
    fn test_unknown_source_and_function() {
        let template = "[[plot]]\nsource = \"hourly\"\n[[plot.subplot]]\nycalc = \"1\"\n";
        assert!(matches!(
            run(template, at(12, 0)).unwrap_err(),
            GraphError::Evaluation { source: EvaluationError::UnknownSource(_), .. }
        ));
        let template = "[[plot]]\n[[plot.subplot]]\nycalc = \"knots(data['wind_ave'])\"\n";
        assert!(matches!(
            run(template, at(12, 0)).unwrap_err(),
            GraphError::Evaluation { source: EvaluationError::UnknownFunction(_), .. }
        ));
    }

    #[test]
    fn test_unknown_field_fails_even_with_no_rows() {
        let template = "[[plot]]\n[[plot.subplot]]\nycalc = \"data['rain']\"\n";
        assert!(run(template, at(1, 0)).is_err());
    }

    #[test]
    fn test_aggregate_sees_rows_outside_range() {
        let template = "duration = \"minutes=30\"\n[[plot]]\n[[plot.subplot]]\nycalc = \"winddir_average(source[data['idx'] - timedelta(hours=1):data['idx'] + timedelta(hours=1)], 0.5, 2)\"\n";
        let graph = run(template, at(9, 30)).unwrap();
        let points = &graph.plots[0].series[0].points;
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|(_, v)| v.map(|v| (v - 90.0).abs() < 1e-9) == Some(true)));
    }
}
