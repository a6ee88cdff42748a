// src/extractor.rs

use crate::error::{Error, Result};
use crate::logcat::{self, collect_stack_trace, content_from, normalize_location, StackTrace};
use crate::model::{make_key, RecordDomain, SignatureKey};
use regex::Regex;
use std::sync::OnceLock;

/// Broadcast used by the coverage collector to dump EMMA data; its ANRs are
/// an artefact of the harness, not of the app.
const COVERAGE_DUMP_ACTION: &str = "act=com.example.pkg.END_EMMA";

const ANR_RECORD_LINES: usize = 3;

/// What is being scanned: the app and how its code is recognized.
#[derive(Debug, Clone)]
pub struct ScanContext<'a> {
    pub app_name: &'a str,
    /// Full package, as it appears in process and ANR lines
    pub target_package: &'a str,
    /// Code package, as it appears in stack frames
    pub package_identifier: &'a str,
}

/// Which kind of record starts at a given line.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordShape<'a> {
    Fatal { content_start: usize, domain: &'a str },
    Anr { content_start: usize },
    GenericError { content_start: usize, domain: &'a str },
    NoMatch,
}

/// A recognized crash record.
#[derive(Debug, Clone, PartialEq)]
pub struct CrashRecord {
    pub key: SignatureKey,
    pub text: String,
    /// Number of lines the record spans, starting at the line it was found on
    pub consumed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Record(CrashRecord),
    /// A record was parsed but does not count as a fault of the app.
    Discarded { consumed: usize },
    NoRecord,
}

impl Extraction {
    /// How far the scan moves on after this line.
    pub fn advance(&self) -> usize {
        match self {
            Extraction::Record(record) => record.consumed.max(1),
            Extraction::Discarded { consumed } => (*consumed).max(1),
            Extraction::NoRecord => 1,
        }
    }
}

fn starts_with_digit(line: &str) -> bool {
    line.chars().next().map_or(false, |c| c.is_ascii_digit())
}

/// Decides the record shape at line `i`. The first matching shape wins.
pub fn classify<'a>(lines: &[&'a str], i: usize, ctx: &ScanContext<'_>) -> Result<RecordShape<'a>> {
    let line = lines[i];
    let next = lines.get(i + 1).copied();

    if let Some(content_start) = line.find("FATAL EXCEPTION") {
        if next.map_or(false, |n| n.contains(ctx.target_package)) {
            let domain = logcat::domain_of(line)?;
            return Ok(RecordShape::Fatal {
                content_start,
                domain,
            });
        }
    }

    if let Some(content_start) = line.find("ANR") {
        if line.contains(ctx.target_package) {
            return Ok(RecordShape::Anr { content_start });
        }
    }

    let next = match next {
        Some(n) if starts_with_digit(line) && starts_with_digit(n) => n,
        _ => return Ok(RecordShape::NoMatch),
    };
    let domain = match logcat::domain_of(line) {
        Ok(d) => d,
        Err(Error::NoSeverity(_)) => return Ok(RecordShape::NoMatch),
        Err(e) => return Err(e),
    };
    let content_start = logcat::content_start_of(line)?;

    let body = content_from(line, content_start).trim();
    let header = !body.is_empty() && !body.starts_with("at ") && !body.starts_with("Caused by: ");
    let followed_by_frame = logcat::domain_of(next).map_or(false, |d| d == domain)
        && content_from(next, content_start).trim().starts_with("at ");

    if header && followed_by_frame {
        Ok(RecordShape::GenericError {
            content_start,
            domain,
        })
    } else {
        Ok(RecordShape::NoMatch)
    }
}

/// Recognizes the record starting at line `i`, if any, and builds its key.
pub fn extract(lines: &[&str], i: usize, ctx: &ScanContext<'_>) -> Result<Extraction> {
    match classify(lines, i, ctx)? {
        RecordShape::Fatal {
            content_start,
            domain,
        } => {
            let trace =
                collect_stack_trace(lines, i, content_start, domain, ctx.package_identifier);
            fatal_record(&trace, ctx, i).map(Extraction::Record)
        }
        RecordShape::Anr { content_start } => anr_record(lines, i, content_start, ctx),
        RecordShape::GenericError {
            content_start,
            domain,
        } => {
            let trace =
                collect_stack_trace(lines, i, content_start, domain, ctx.package_identifier);
            Ok(generic_record(&trace, domain, ctx))
        }
        RecordShape::NoMatch => Ok(Extraction::NoRecord),
    }
}

fn fatal_record(trace: &StackTrace<'_>, ctx: &ScanContext<'_>, line: usize) -> Result<CrashRecord> {
    let last = *trace
        .lines
        .last()
        .ok_or(Error::TruncatedRecord { line })?;

    let exception = trace
        .lines
        .iter()
        .find(|l| l.contains("Exception:"))
        .map(|l| l.split(':').next().unwrap_or(""))
        .unwrap_or_else(|| trace.lines.get(2).copied().unwrap_or(last));

    let location = trace
        .first_code_line
        .unwrap_or_else(|| trace.lines.get(3).copied().unwrap_or(last));

    Ok(CrashRecord {
        key: make_key(
            ctx.app_name,
            &RecordDomain::Fatal,
            exception.trim(),
            &normalize_location(location),
        ),
        text: trace.joined(),
        consumed: trace.len(),
    })
}

struct ReasonFilters {
    object_id: Regex,
    digits: Regex,
}

fn reason_filters() -> &'static ReasonFilters {
    static FILTERS: OnceLock<ReasonFilters> = OnceLock::new();
    FILTERS.get_or_init(|| ReasonFilters {
        object_id: Regex::new(r"\{\w+").expect("static regex"),
        digits: Regex::new(r"[0-9]+").expect("static regex"),
    })
}

fn anr_record(
    lines: &[&str],
    i: usize,
    content_start: usize,
    ctx: &ScanContext<'_>,
) -> Result<Extraction> {
    if i + ANR_RECORD_LINES > lines.len() {
        return Err(Error::TruncatedRecord { line: i });
    }
    let record: Vec<&str> = lines[i..i + ANR_RECORD_LINES]
        .iter()
        .map(|l| content_from(l, content_start))
        .collect();
    let text = record.join("\n");

    if text.contains(COVERAGE_DUMP_ACTION) {
        log::trace!("skipping coverage dump ANR at line {}", i);
        return Ok(Extraction::Discarded {
            consumed: ANR_RECORD_LINES,
        });
    }

    let module = record[0]
        .split_once('(')
        .map(|(_, rest)| rest.split(')').next().unwrap_or(""))
        .unwrap_or("");

    let f = reason_filters();
    let reason = f.object_id.replace_all(record[2], "_");
    let reason = f.digits.replace_all(&reason, "_");

    Ok(Extraction::Record(CrashRecord {
        key: make_key(ctx.app_name, &RecordDomain::Anr, module, &reason),
        text,
        consumed: ANR_RECORD_LINES,
    }))
}

fn generic_record(trace: &StackTrace<'_>, domain: &str, ctx: &ScanContext<'_>) -> Extraction {
    let text = trace.joined();
    if !text.contains(ctx.package_identifier) {
        return Extraction::Discarded {
            consumed: trace.len(),
        };
    }

    let header = trace.lines.first().map_or("", |l| l.trim());
    let exception = header.split(':').next().unwrap_or(header);
    let location = match trace.first_code_line {
        Some(frame) => frame,
        None => header.get(exception.len() + 2..).unwrap_or(""),
    };

    Extraction::Record(CrashRecord {
        key: make_key(
            ctx.app_name,
            &RecordDomain::Error(domain.to_string()),
            exception,
            &normalize_location(location),
        ),
        text,
        consumed: trace.len(),
    })
}
