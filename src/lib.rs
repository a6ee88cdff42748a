// src/lib.rs

//! Mines Android logcat bug logs for deduplicated crash signatures and
//! analyzes how quickly testing runs converge on their final fault and
//! coverage numbers.

pub mod abstractor;
pub mod analyzer;
pub mod apps;
pub mod convergence;
pub mod coverage;
pub mod error;
pub mod extractor;
pub mod faults;
pub mod logcat;
pub mod model;
pub mod pattern;
pub mod report;

pub use error::{Error, Result};
