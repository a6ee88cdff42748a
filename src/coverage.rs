// src/coverage.rs

use crate::error::{Error, Result};
use crate::model::{CoverageDetail, CoverageItem, CoverageReport, CoverageSeries, Spread};
use std::fs;
use std::path::Path;

/// Nominal length of a test run, in seconds
pub const DEFAULT_LENGTH: i64 = 10800;
/// Spacing of the standard checkpoints, in seconds
pub const DEFAULT_INTERVAL: i64 = 10;

/// Loads a `metric -> series` JSON file.
pub fn load_report(path: &Path) -> Result<CoverageReport> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

/// Resamples `series` at `times`, holding each sample until the next one.
/// Times before the first sample get a zero-covered placeholder.
pub fn pad(series: &[CoverageItem], times: &[i64]) -> Result<CoverageSeries> {
    let first = series.first().ok_or(Error::EmptySeries)?;

    let mut times = times.to_vec();
    times.sort_unstable();
    times.dedup();

    let mut current = CoverageDetail::placeholder(first.detail.total, first.detail.spread.is_some());
    let mut next = 0;
    let mut padded = Vec::with_capacity(times.len());
    for time in times {
        while next < series.len() && series[next].time <= time {
            current = series[next].detail;
            next += 1;
        }
        padded.push(CoverageItem::new(time, current));
    }
    Ok(padded)
}

/// Rescales times so that the last sample lands on `target_total_time`.
/// Scaled times are truncated to whole seconds.
pub fn normalize_time(series: &[CoverageItem], target_total_time: i64) -> Result<CoverageSeries> {
    let last = series.last().ok_or(Error::EmptySeries)?;
    if last.time == 0 {
        return Err(Error::ZeroDuration);
    }
    let rate = target_total_time as f64 / last.time as f64;
    Ok(series
        .iter()
        .map(|item| CoverageItem::new((item.time as f64 * rate) as i64, item.detail))
        .collect())
}

fn grid_times(length: i64, interval: i64) -> Result<Vec<i64>> {
    if interval <= 0 {
        return Err(Error::ZeroInterval);
    }
    Ok((0..=length / interval).map(|i| i * interval).collect())
}

/// Pads `series` onto its own times plus `0, interval, ..., length`.
pub fn extend_with_standard_grid(series: &[CoverageItem], length: i64, interval: i64) -> Result<CoverageSeries> {
    let mut times = grid_times(length, interval)?;
    times.extend(series.iter().map(|item| item.time));
    pad(series, &times)
}

/// Keeps only the samples that sit exactly on a grid point.
pub fn filter_to_standard_grid(series: &[CoverageItem], length: i64, interval: i64) -> Result<CoverageSeries> {
    if interval <= 0 {
        return Err(Error::ZeroInterval);
    }
    let end = length / interval * interval;
    Ok(series
        .iter()
        .filter(|item| item.time >= 0 && item.time <= end && item.time % interval == 0)
        .copied()
        .collect())
}

/// Coverage rate in percent at `target_time`, or at the end of the run when no
/// target is given. Runs longer than `normalize_time` are rescaled first.
pub fn appointed_time_coverage(
    series: &[CoverageItem],
    target_time: Option<i64>,
    normalize_time: Option<i64>,
) -> Result<f64> {
    let last = series.last().ok_or(Error::EmptySeries)?;
    let series = match normalize_time {
        Some(n) if last.time > n => self::normalize_time(series, n)?,
        _ => series.to_vec(),
    };

    let target = match target_time {
        Some(t) if target_time != normalize_time => t,
        _ => {
            let last = series.last().ok_or(Error::EmptySeries)?;
            return Ok(last.detail.rate * 100.0);
        }
    };

    let extended = extend_with_standard_grid(&series, target, target)?;
    let rate = extended
        .iter()
        .take_while(|item| item.time <= target)
        .last()
        .map_or(0.0, |item| item.detail.rate);
    Ok(rate * 100.0)
}

pub fn normalize_report(report: &CoverageReport, target_total_time: i64) -> Result<CoverageReport> {
    report
        .iter()
        .map(|(metric, series)| Ok((metric.clone(), normalize_time(series, target_total_time)?)))
        .collect()
}

pub fn extend_report(report: &CoverageReport, length: i64, interval: i64) -> Result<CoverageReport> {
    report
        .iter()
        .map(|(metric, series)| Ok((metric.clone(), extend_with_standard_grid(series, length, interval)?)))
        .collect()
}

pub fn filter_report(report: &CoverageReport, length: i64, interval: i64) -> Result<CoverageReport> {
    report
        .iter()
        .map(|(metric, series)| Ok((metric.clone(), filter_to_standard_grid(series, length, interval)?)))
        .collect()
}

/// How several runs are averaged into one series.
#[derive(Debug, Clone)]
pub struct CombineOptions {
    /// Attach a std band to every combined sample
    pub need_std: bool,
    /// Compute the band from the runs' rates instead of averaging their bands
    pub recalculate_std: bool,
    /// Rate is mean covered over mean total instead of the mean of the rates
    pub recalculate_rate: bool,
    /// All runs measure the same package, so totals must agree
    pub same_package: bool,
    pub length: i64,
    pub interval: i64,
}

impl Default for CombineOptions {
    fn default() -> Self {
        CombineOptions {
            need_std: false,
            recalculate_std: true,
            recalculate_rate: true,
            same_package: true,
            length: DEFAULT_LENGTH,
            interval: DEFAULT_INTERVAL,
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn population_std(values: &[f64]) -> f64 {
    let m = mean(values.iter().copied());
    mean(values.iter().map(|v| (v - m) * (v - m))).sqrt()
}

fn combine_details(time: i64, details: &[CoverageDetail], options: &CombineOptions) -> Result<CoverageDetail> {
    let totals: Vec<f64> = details.iter().map(|d| d.total).collect();
    if options.same_package && totals.iter().any(|t| *t != totals[0]) {
        return Err(Error::TotalMismatch { time, totals });
    }

    let covered = round_to(mean(details.iter().map(|d| d.covered)), 2);
    let total = round_to(mean(totals.iter().copied()), 2);
    let rate = if !options.recalculate_rate {
        round_to(mean(details.iter().map(|d| d.rate)), 4)
    } else if total > 0.0 {
        round_to(covered / total, 4)
    } else {
        0.0
    };

    let spread = if !options.need_std {
        None
    } else if !options.recalculate_std {
        let spreads: Vec<Spread> = details.iter().map(|d| d.spread.unwrap_or_default()).collect();
        Some(Spread {
            std: round_to(mean(spreads.iter().map(|s| s.std)), 4),
            std_lower: round_to(mean(spreads.iter().map(|s| s.std_lower)), 4),
            std_upper: round_to(mean(spreads.iter().map(|s| s.std_upper)), 4),
        })
    } else {
        let rates: Vec<f64> = details
            .iter()
            .map(|d| if total > 0.0 { d.covered / total } else { 0.0 })
            .collect();
        let std = round_to(population_std(&rates), 4);
        Some(Spread {
            std,
            std_lower: round_to(rate - std, 4),
            std_upper: round_to(rate + std, 4),
        })
    };

    Ok(CoverageDetail {
        covered,
        total,
        rate,
        spread,
    })
}

/// Averages several runs sample by sample over the union of their times, then
/// extends the result onto the standard grid.
pub fn combine(runs: &[CoverageSeries], options: &CombineOptions) -> Result<CoverageSeries> {
    if runs.is_empty() {
        return Err(Error::NothingToCombine);
    }

    let mut times: Vec<i64> = runs.iter().flatten().map(|item| item.time).collect();
    times.sort_unstable();
    times.dedup();

    let padded = runs
        .iter()
        .map(|run| pad(run, &times))
        .collect::<Result<Vec<_>>>()?;

    let mut combined = Vec::with_capacity(times.len());
    for (i, &time) in times.iter().enumerate() {
        let details: Vec<CoverageDetail> = padded.iter().map(|run| run[i].detail).collect();
        combined.push(CoverageItem::new(time, combine_details(time, &details, options)?));
    }

    extend_with_standard_grid(&combined, options.length, options.interval)
}

/// Combines every metric of the first run across all runs.
pub fn combine_reports(runs: &[CoverageReport], options: &CombineOptions) -> Result<CoverageReport> {
    let first = runs.first().ok_or(Error::NothingToCombine)?;

    let mut combined = CoverageReport::new();
    for metric in first.keys() {
        let series = runs
            .iter()
            .enumerate()
            .map(|(run, report)| {
                report.get(metric).cloned().ok_or_else(|| Error::MissingMetric {
                    metric: metric.clone(),
                    run,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        log::debug!("combining {} runs of {}", series.len(), metric);
        combined.insert(metric.clone(), combine(&series, options)?);
    }
    Ok(combined)
}
