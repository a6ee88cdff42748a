// src/abstractor.rs

use crate::apps::{real_code_package, AppRegistry, LogFileName};
use crate::error::{Error, Result};
use crate::extractor::{extract, Extraction, ScanContext};
use crate::logcat::timestamp_prefix;
use crate::model::{key_domain, key_identity, AbstractItem, FileAbstractDict};
use chrono::{Datelike, NaiveDateTime};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

const LINE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Seconds between the run start and a line's timestamp prefix.
///
/// Logcat prefixes carry no year; the start year is used, moved forward by one
/// when a December run has rolled over into January.
pub fn relative_seconds(prefix: &str, start: &NaiveDateTime) -> Option<f64> {
    let mut year = start.year();
    if start.month() == 12 && prefix.starts_with("01") {
        year += 1;
    }
    let time = NaiveDateTime::parse_from_str(&format!("{}-{}", year, prefix), LINE_TIME_FORMAT).ok()?;
    Some(((time - *start).num_milliseconds() as f64 / 1000.0).abs())
}

/// Scans one log file into its deduplicated signature dict.
pub fn file_to_abstract_dict(
    path: &Path,
    registry: &AppRegistry,
    target_time: Option<f64>,
) -> Result<FileAbstractDict> {
    let file = LogFileName::from_path(path)?;
    let target_package = registry.package_of(&file.app_name)?;
    let package_identifier = real_code_package(target_package);

    let text = read_log_text(path)?;
    let lines: Vec<&str> = text.lines().collect();

    let ctx = ScanContext {
        app_name: &file.app_name,
        target_package,
        package_identifier: &package_identifier,
    };
    Ok(abstract_lines(&lines, &ctx, &file.start_time, target_time, path))
}

fn read_log_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(e) => {
            log::warn!("{} is not valid UTF-8, decoding lossily", path.display());
            Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
        }
    }
}

/// Drives the extractor over `lines` from the top until the end or until a
/// line lies past `target_time`. Lines that fail to classify are logged and
/// skipped.
pub fn abstract_lines(
    lines: &[&str],
    ctx: &ScanContext<'_>,
    start_time: &NaiveDateTime,
    target_time: Option<f64>,
    source: &Path,
) -> FileAbstractDict {
    let mut dict = FileAbstractDict::new();

    let mut i = 0;
    while i < lines.len() {
        let occur_time = timestamp_prefix(lines[i]);
        let relative_time = relative_seconds(occur_time, start_time);
        if let (Some(t), Some(limit)) = (relative_time, target_time) {
            if t > limit {
                break;
            }
        }

        match extract(lines, i, ctx) {
            Ok(extraction) => {
                let advance = extraction.advance();
                if let Extraction::Record(record) = extraction {
                    dict.entry(record.key).or_default().push(AbstractItem {
                        text: record.text,
                        occur_time: occur_time.to_string(),
                        relative_time,
                    });
                }
                i += advance;
            }
            Err(e) => {
                log::warn!("{} line {}: {}", source.display(), i, e);
                i += 1;
            }
        }
    }

    dedup(dict)
}

/// Keeps one key per (exception, location) identity, preferring FATAL over
/// ANR over generic errors, then first-seen order.
pub fn dedup(dict: FileAbstractDict) -> FileAbstractDict {
    let mut entries: Vec<_> = dict.into_iter().collect();
    entries.sort_by_key(|(key, _)| key_domain(key).priority());

    let mut seen = HashSet::new();
    let mut kept = FileAbstractDict::new();
    for (key, items) in entries {
        if !seen.insert(key_identity(&key).to_string()) {
            log::debug!("dropping duplicate signature {}", key);
            continue;
        }
        kept.insert(key, items);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    const FATAL_KEY: &str =
        "App | FATAL | java.lang.NullPointerException | at com.x.y.Foo.bar(Foo.java:10)";

    fn sample_log() -> String {
        [
            "--------- beginning of main",
            "01-11 16:05:00.000  1234  1234 I ActivityManager: Start proc 1234:com.x.y/u0a1",
            "01-11 16:20:01.123  1234  1234 E AndroidRuntime: FATAL EXCEPTION: main",
            "01-11 16:20:01.123  1234  1234 E AndroidRuntime: Process: com.x.y, PID: 1234",
            "01-11 16:20:01.123  1234  1234 E AndroidRuntime: java.lang.NullPointerException: Attempt to invoke",
            "01-11 16:20:01.123  1234  1234 E AndroidRuntime: \tat android.view.View.performClick(View.java:7448)",
            "01-11 16:20:01.123  1234  1234 E AndroidRuntime: \tat com.x.y.Foo.bar(Foo.java:10)",
            "01-11 16:20:01.200  1234  1234 I Process : Sending signal. PID: 1234 SIG: 9",
            "01-11 16:30:00.000   900   950 E ActivityManager: ANR in com.x.y (com.x.y/.MainActivity)",
            "01-11 16:30:00.000   900   950 E ActivityManager: PID: 4321",
            "01-11 16:30:00.000   900   950 E ActivityManager: Reason: Input dispatching timed out",
            "01-11 16:40:00.000  1234  1300 E SQLiteDatabase: android.database.sqlite.SQLiteException: no such table: notes",
            "01-11 16:40:00.000  1234  1300 E SQLiteDatabase: \tat com.x.y.db.Store.load(Store.java:42)",
            "01-11 16:50:00.000  1234  1234 E AndroidRuntime: FATAL EXCEPTION: main",
            "01-11 16:50:00.000  1234  1234 E AndroidRuntime: Process: com.x.y, PID: 1234",
            "01-11 16:50:00.000  1234  1234 E AndroidRuntime: java.lang.NullPointerException: Attempt to invoke",
            "01-11 16:50:00.000  1234  1234 E AndroidRuntime: \tat android.view.View.performClick(View.java:7448)",
            "01-11 16:50:00.000  1234  1234 E AndroidRuntime: \tat com.x.y.Foo.bar(Foo.java:10)",
        ]
        .join("\n")
    }

    fn ctx() -> ScanContext<'static> {
        ScanContext {
            app_name: "App",
            target_package: "com.x.y",
            package_identifier: "x.y",
        }
    }

    fn start() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-01-11 16:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn scan(text: &str, target_time: Option<f64>) -> FileAbstractDict {
        let lines: Vec<&str> = text.lines().collect();
        abstract_lines(&lines, &ctx(), &start(), target_time, Path::new("test.txt"))
    }

    fn registry() -> AppRegistry {
        AppRegistry::new(BTreeMap::from([("App".to_string(), "com.x.y".to_string())]))
    }

    #[test]
    fn relative_time_from_prefix() {
        let t = relative_seconds("01-11 16:20:01.500", &start()).unwrap();
        assert!((t - 1201.5).abs() < 1e-9);
        assert_eq!(relative_seconds("--------- beginnin", &start()), None);
    }

    #[test]
    fn relative_time_across_new_year() {
        let start =
            NaiveDateTime::parse_from_str("2023-12-31 23:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(relative_seconds("01-01 01:00:00.000", &start), Some(7200.0));
    }

    #[test]
    fn scans_all_record_shapes() {
        let dict = scan(&sample_log(), None);
        let keys: Vec<&str> = dict.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                FATAL_KEY,
                "App | ANR | com.x.y/.MainActivity | Reason: Input dispatching timed out",
                "App | E:SQLiteDatabase | android.database.sqlite.SQLiteException | at com.x.y.db.Store.load(Store.java:42)",
            ]
        );

        let fatal = &dict[FATAL_KEY];
        assert_eq!(fatal.len(), 2);
        assert_eq!(fatal[0].occur_time, "01-11 16:20:01.123");
        assert!((fatal[0].relative_time.unwrap() - 1201.123).abs() < 1e-9);
        assert_eq!(fatal[1].relative_time, Some(3000.0));
    }

    #[test]
    fn stops_after_target_time() {
        let dict = scan(&sample_log(), Some(1500.0));
        assert_eq!(dict.len(), 1);
        assert_eq!(dict[FATAL_KEY].len(), 1);
    }

    #[test]
    fn bad_line_is_skipped() {
        let text = [
            "01-11 16:10:00.000  1234  1234 I Tag: FATAL EXCEPTION: main",
            "01-11 16:10:00.000  1234  1234 I Tag: Process: com.x.y, PID: 1234",
            sample_log().as_str(),
        ]
        .join("\n");
        assert_eq!(scan(&text, None).len(), 3);
    }

    #[test]
    fn fatal_wins_over_generic_error() {
        let mut dict = FileAbstractDict::new();
        let generic = "App | E:AndroidRuntime | java.lang.X | at com.x.y.A.b(A.java:1)";
        let fatal = "App | FATAL | java.lang.X | at com.x.y.A.b(A.java:1)";
        let other = "App | E:Parcel | java.lang.Y | at com.x.y.A.c(A.java:2)";
        for key in [generic, other, fatal] {
            dict.insert(key.to_string(), Vec::new());
        }

        let kept: Vec<String> = dedup(dict).into_keys().collect();
        assert_eq!(kept, vec![fatal.to_string(), other.to_string()]);
    }

    #[test]
    fn survivors_have_distinct_identities() {
        let dict = scan(&sample_log(), None);
        let identities: HashSet<&str> = dict.keys().map(|k| key_identity(k)).collect();
        assert_eq!(identities.len(), dict.len());
    }

    #[test]
    fn same_file_gives_same_dict() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("Apps.App_2024-01-11-16:00:00_t-1_bug.txt");
        fs::write(&path, sample_log()).unwrap();

        let first = file_to_abstract_dict(&path, &registry(), None).unwrap();
        let second = file_to_abstract_dict(&path, &registry(), None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Apps.App_2024-01-11-16:00:00_t-1_bug.txt");
        let mut bytes = b"01-11 16:01:00.000  1 1 I Tag: \xff\xfe\n".to_vec();
        bytes.extend_from_slice(sample_log().as_bytes());
        fs::write(&path, bytes).unwrap();

        let dict = file_to_abstract_dict(&path, &registry(), None).unwrap();
        assert!(dict.contains_key(FATAL_KEY));
    }

    #[test]
    fn unknown_app_fails() {
        let path = Path::new("Apps.Other_2024-01-11-16:00:00_t-1_bug.txt");
        assert!(matches!(
            file_to_abstract_dict(path, &registry(), None),
            Err(Error::UnknownApp(_))
        ));
    }
}
