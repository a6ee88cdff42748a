// src/logcat.rs

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Width of the `MM-DD HH:MM:SS.mmm` prefix of every logcat line
pub const TIMESTAMP_WIDTH: usize = 18;

/// The tag colon is searched from here on, past the timestamp and its separator
const TAG_SEARCH_START: usize = TIMESTAMP_WIDTH + 1;

/// Severity domain (the logcat tag) of an error or fatal line, e.g.
/// `AndroidRuntime` in `01-11 16:20:01.123  1234  1234 E AndroidRuntime: ...`.
///
/// Fails for lines carrying neither an ` E ` nor an ` F ` marker, and for lines
/// with no colon after the timestamp.
pub fn domain_of(line: &str) -> Result<&str> {
    let marker = line
        .find(" E ")
        .or_else(|| line.find(" F "))
        .ok_or_else(|| Error::NoSeverity(line.to_string()))?;
    let colon = line
        .get(TAG_SEARCH_START..)
        .and_then(|rest| rest.find(':'))
        .map(|pos| pos + TAG_SEARCH_START)
        .ok_or_else(|| Error::NoTagSeparator(line.to_string()))?;

    Ok(line.get(marker + 2..colon).unwrap_or("").trim())
}

/// Column right after the tag colon, where the message body starts.
pub fn content_start_of(line: &str) -> Result<usize> {
    line.get(TAG_SEARCH_START..)
        .and_then(|rest| rest.find(':'))
        .map(|pos| pos + TAG_SEARCH_START + 1)
        .ok_or_else(|| Error::NoTagSeparator(line.to_string()))
}

/// The part of `line` from byte column `start`, or "" when the line is shorter.
pub fn content_from(line: &str, start: usize) -> &str {
    line.get(start..).unwrap_or("")
}

/// The fixed-width timestamp prefix of a line.
pub fn timestamp_prefix(line: &str) -> &str {
    match line.char_indices().nth(TIMESTAMP_WIDTH) {
        Some((end, _)) => &line[..end],
        None => line,
    }
}

/// A multi-line record cut out of a logcat buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct StackTrace<'a> {
    /// Each line from the content column on
    pub lines: Vec<&'a str>,
    /// First `at ...` frame that lies inside the app under test
    pub first_code_line: Option<&'a str>,
}

impl<'a> StackTrace<'a> {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn joined(&self) -> String {
        self.lines.join("\n")
    }
}

/// Greedily takes lines from `start` while they keep the same severity domain,
/// are not a `-` separator and have a non-blank body past `content_start`.
pub fn collect_stack_trace<'a>(
    lines: &[&'a str],
    start: usize,
    content_start: usize,
    domain: &str,
    package_identifier: &str,
) -> StackTrace<'a> {
    let mut trace = StackTrace {
        lines: Vec::new(),
        first_code_line: None,
    };

    for &line in lines.iter().skip(start) {
        if line.starts_with('-') {
            break;
        }
        let content = content_from(line, content_start);
        if content.trim().is_empty() {
            break;
        }
        match domain_of(line) {
            Ok(d) if d == domain => {}
            _ => break,
        }

        trace.lines.push(content);
        if trace.first_code_line.is_none()
            && content.trim_start().starts_with("at ")
            && content.contains(package_identifier)
        {
            trace.first_code_line = Some(content);
        }
    }
    trace
}

struct LocationFilters {
    braces: Regex,
    at_bracket: Regex,
    at_space: Regex,
    path: Regex,
}

fn location_filters() -> &'static LocationFilters {
    static FILTERS: OnceLock<LocationFilters> = OnceLock::new();
    FILTERS.get_or_init(|| LocationFilters {
        braces: Regex::new(r"\{.*\}").expect("static regex"),
        at_bracket: Regex::new(r"@.*\[").expect("static regex"),
        at_space: Regex::new(r"@.* ").expect("static regex"),
        path: Regex::new(r"/\S+/(\S/?)+").expect("static regex"),
    })
}

/// Removes run-specific noise from a location: object bodies, hash codes and
/// absolute paths.
pub fn normalize_location(location: &str) -> String {
    let f = location_filters();
    let s = f.braces.replace_all(location, "{_}");
    let s = f.at_bracket.replace_all(&s, "@_[");
    let s = f.at_space.replace_all(&s, "@_ ");
    let s = f.path.replace_all(&s, "/.../...");
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FATAL: &str = "01-11 16:20:01.123  1234  1234 E AndroidRuntime: FATAL EXCEPTION: main";

    #[test]
    fn domain_of_error_line() {
        assert_eq!(domain_of(FATAL).unwrap(), "AndroidRuntime");
        assert_eq!(
            domain_of("01-11 16:20:01.123  1234  1234 F libc    : Fatal signal 6").unwrap(),
            "libc"
        );
    }

    #[test]
    fn domain_of_rejects_non_error_lines() {
        let info = "01-11 16:20:01.123  1234  1234 I ActivityManager: Start proc";
        assert!(matches!(domain_of(info), Err(Error::NoSeverity(_))));
        assert!(matches!(
            domain_of("01-11 16:20:01.123 E no colon here"),
            Err(Error::NoTagSeparator(_))
        ));
    }

    #[test]
    fn content_column() {
        let start = content_start_of(FATAL).unwrap();
        assert_eq!(content_from(FATAL, start), " FATAL EXCEPTION: main");
        assert_eq!(content_from("short", 40), "");
    }

    #[test]
    fn timestamp_prefix_width() {
        assert_eq!(timestamp_prefix(FATAL), "01-11 16:20:01.123");
        assert_eq!(timestamp_prefix("01-11"), "01-11");
    }

    #[test]
    fn collects_same_domain_lines() {
        let lines = vec![
            "01-11 16:20:01.123  1234  1234 E Parcel  : java.lang.RuntimeException: bad parcel",
            "01-11 16:20:01.123  1234  1234 E Parcel  : \tat android.os.Parcel.read(Parcel.java:1)",
            "01-11 16:20:01.123  1234  1234 E Parcel  : \tat com.x.y.Foo.bar(Foo.java:10)",
            "01-11 16:20:01.123  1234  1234 E Parcel  : \tat com.x.y.Foo.baz(Foo.java:20)",
            "01-11 16:20:01.124  1234  1234 E Other   : \tat com.x.y.Foo.qux(Foo.java:30)",
        ];
        let start = content_start_of(lines[0]).unwrap();
        let trace = collect_stack_trace(&lines, 0, start, "Parcel", "x.y");
        assert_eq!(trace.len(), 4);
        assert_eq!(trace.first_code_line, Some(" \tat com.x.y.Foo.bar(Foo.java:10)"));
    }

    #[test]
    fn collection_stops_at_separator_and_blank_body() {
        let lines = vec![
            "01-11 16:20:01.123  1234  1234 E Tag: header",
            "--------- beginning of crash",
            "01-11 16:20:01.123  1234  1234 E Tag: more",
        ];
        let start = content_start_of(lines[0]).unwrap();
        assert_eq!(collect_stack_trace(&lines, 0, start, "Tag", "x").len(), 1);

        let blank = vec![
            "01-11 16:20:01.123  1234  1234 E Tag: header",
            "01-11 16:20:01.123  1234  1234 E Tag:   ",
        ];
        let trace = collect_stack_trace(&blank, 0, start, "Tag", "x");
        assert_eq!(trace.len(), 1);
        assert_eq!(trace.first_code_line, None);
    }

    #[test]
    fn normalizes_volatile_parts() {
        assert_eq!(
            normalize_location("at com.x.Foo.run(Foo.java:1) Intent { act=VIEW flg=0x1 }"),
            "at com.x.Foo.run(Foo.java:1) Intent {_}"
        );
        assert_eq!(normalize_location("Object@5f2a1b[main]"), "Object@_[main]");
        assert_eq!(normalize_location("View@a1b2c3 in window"), "View@_ window");
        assert_eq!(
            normalize_location("open failed: /data/user/0/com.x/files/a.db"),
            "open failed: /.../..."
        );
        assert_eq!(
            normalize_location("  at com.x.y.Foo.bar(Foo.java:10)"),
            "at com.x.y.Foo.bar(Foo.java:10)"
        );
    }
}
