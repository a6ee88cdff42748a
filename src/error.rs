// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the analysis library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unrecognized log file name: {0}")]
    FileName(String),

    #[error("unknown app: {0}")]
    UnknownApp(String),

    #[error("unknown package: {0}")]
    UnknownPackage(String),

    #[error("pattern [{0}] is not valid")]
    InvalidPattern(String),

    #[error("line has no severity marker: {0:?}")]
    NoSeverity(String),

    #[error("line has no tag separator after the timestamp: {0:?}")]
    NoTagSeparator(String),

    #[error("record starting at line {line} is cut short by end of file")]
    TruncatedRecord { line: usize },

    #[error("coverage series is empty")]
    EmptySeries,

    #[error("cannot rescale a series whose last sample is at time 0")]
    ZeroDuration,

    #[error("grid interval must be positive")]
    ZeroInterval,

    #[error("totals differ across runs at time {time}: {totals:?}")]
    TotalMismatch { time: i64, totals: Vec<f64> },

    #[error("no series to combine")]
    NothingToCombine,

    #[error("run {run} has no {metric} series")]
    MissingMetric { metric: String, run: usize },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
