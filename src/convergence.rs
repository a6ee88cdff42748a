// src/convergence.rs

use crate::error::{Error, Result};
use crate::faults::domain_of_key;
use crate::model::{key_app, CorpusAbstractDict, CoverageItem, CoverageReport, FaultDomain, SignatureKey};
use serde::Serialize;
use std::collections::BTreeMap;

/// Percentages of the final value whose reach time is reported
pub const PERCENTAGE_TARGETS: [u32; 30] = [
    0, 5, 10, 15, 20, 25, 30, 35, 40, 45, 50, 55, 60, 65, 70, 75, //
    80, 82, 84, 86, 88, 90, 92, 94, //
    95, 96, 97, 98, 99, 100,
];

/// Absorbs float noise in `p% of final` thresholds
const THRESHOLD_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageConvergence {
    pub final_coverage: f64,
    /// Earliest time the rate reached each percentage of the final rate
    pub percent_n_time: BTreeMap<u32, Option<i64>>,
    pub end_time: i64,
}

pub fn coverage_convergence(series: &[CoverageItem]) -> Result<CoverageConvergence> {
    let last = series.last().ok_or(Error::EmptySeries)?;
    let final_coverage = last.detail.rate;

    let mut percent_n_time: BTreeMap<u32, Option<i64>> =
        PERCENTAGE_TARGETS.iter().map(|p| (*p, None)).collect();
    let mut pending = PERCENTAGE_TARGETS.len();

    for item in series {
        if pending == 0 {
            break;
        }
        for (p, reached) in percent_n_time.iter_mut() {
            if reached.is_none()
                && item.detail.rate * 100.0 + THRESHOLD_TOLERANCE >= f64::from(*p) * final_coverage
            {
                *reached = Some(item.time);
                pending -= 1;
            }
        }
    }

    Ok(CoverageConvergence {
        final_coverage,
        percent_n_time,
        end_time: last.time,
    })
}

pub fn coverage_convergence_report(report: &CoverageReport) -> Result<BTreeMap<String, CoverageConvergence>> {
    report
        .iter()
        .map(|(metric, series)| Ok((metric.clone(), coverage_convergence(series)?)))
        .collect()
}

/// `(relative_time, key)` for every occurrence, restricted to `apps` when
/// given. Occurrences without a relative time are left out.
pub fn discovery_timeline(dict: &CorpusAbstractDict, apps: Option<&[String]>) -> Vec<(f64, SignatureKey)> {
    let mut timeline = Vec::new();
    for (key, items) in dict {
        if let Some(apps) = apps {
            if !apps.iter().any(|app| app == key_app(key)) {
                continue;
            }
        }
        for item in items {
            if let Some(t) = item.relative_time {
                timeline.push((t, key.clone()));
            }
        }
    }
    timeline
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainConvergence {
    /// Number of discoveries at this level
    pub n: usize,
    /// Seconds until each percentage of the discoveries had been made
    pub percent_n_time: BTreeMap<u32, f64>,
}

/// Per level, how long it took to find each percentage of everything that
/// was eventually found. A discovery counts for its own level and every
/// level that nests it.
pub fn fault_convergence(timeline: &[(f64, SignatureKey)]) -> BTreeMap<FaultDomain, DomainConvergence> {
    let mut times: BTreeMap<FaultDomain, Vec<f64>> =
        FaultDomain::ALL.iter().map(|d| (*d, Vec::new())).collect();
    for (t, key) in timeline {
        let domain = domain_of_key(key);
        for (level, list) in times.iter_mut() {
            if level.includes(domain) {
                list.push(*t);
            }
        }
    }

    times
        .into_iter()
        .map(|(level, mut list)| {
            list.sort_by(|a, b| a.total_cmp(b));
            let n = list.len();
            let percent_n_time = PERCENTAGE_TARGETS
                .iter()
                .map(|p| {
                    let rank = (n * *p as usize / 100) as i64 - 1;
                    let time = if rank < 0 { 0.0 } else { list[rank as usize] };
                    (*p, time)
                })
                .collect();
            (level, DomainConvergence { n, percent_n_time })
        })
        .collect()
}
