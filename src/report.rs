// src/report.rs

use crate::error::{Error, Result};
use crate::model::{AbstractItem, CoverageReport, FileAbstractDict};
use serde::Serialize;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const MAX_EXAMPLES: usize = 3;

/// How much of an abstract dict to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DetailLevel {
    /// Only the number of distinct keys
    Summary,
    /// Every key with its occurrence count
    Keys,
    /// Every key with a few example records
    Examples,
}

impl DetailLevel {
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => DetailLevel::Summary,
            1 => DetailLevel::Keys,
            _ => DetailLevel::Examples,
        }
    }
}

fn write_example(out: &mut String, index: usize, item: &AbstractItem) {
    let relative = match item.relative_time {
        Some(t) => format!("{:.2}s", t),
        None => "-".to_string(),
    };
    let _ = writeln!(
        out,
        "---------- Example {} ---------- {}({})",
        index + 1,
        item.occur_time,
        relative
    );
    let _ = writeln!(out, "{}", item.text);
}

/// Keys ordered by how often they occurred, most frequent first.
pub fn render_abstract_dict(dict: &FileAbstractDict, level: DetailLevel) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Unique bug count: {}", dict.len());

    if level >= DetailLevel::Keys {
        let mut ranked: Vec<_> = dict.iter().collect();
        ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        for (i, (key, items)) in ranked.iter().enumerate() {
            let _ = writeln!(out, "No.{:<2} [KEY] {}", i + 1, key);
            if level == DetailLevel::Examples {
                for (j, item) in items.iter().take(MAX_EXAMPLES).enumerate() {
                    write_example(&mut out, j, item);
                }
                if items.len() > MAX_EXAMPLES {
                    let _ = writeln!(out, "... Total {}", items.len());
                }
                out.push('\n');
            } else {
                let _ = writeln!(out, "Occur time: {}", items.len());
            }
        }
    }
    out
}

/// `metric` headers followed by right-aligned `time    detail` lines.
pub fn readable_coverage(report: &CoverageReport) -> String {
    let mut lines = Vec::new();
    for (metric, series) in report {
        let width = series.last().map_or(1, |item| item.time.to_string().len());
        lines.push(metric.clone());
        for item in series {
            lines.push(format!("    {:>width$}    {}", item.time, item.detail, width = width));
        }
    }
    lines.join("\n")
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).map_err(|e| Error::io(path, e))
}
