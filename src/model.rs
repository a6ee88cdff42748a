// src/model.rs

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Canonical deduplication key: `"<app> | <domain> | <exception> | <location>"`
pub type SignatureKey = String;

/// Separator between the fields of a signature key
pub const KEY_SEPARATOR: &str = " | ";

/// One occurrence of a crash signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstractItem {
    /// Joined raw text of the record
    #[serde(rename = "abstract")]
    pub text: String,
    /// The 18-char logcat timestamp prefix of the record's first line
    pub occur_time: String,
    /// Seconds since the run started, when the timestamp parsed
    pub relative_time: Option<f64>,
}

/// Signature key -> occurrences, in first-seen order
pub type FileAbstractDict = IndexMap<SignatureKey, Vec<AbstractItem>>;

/// Union of several file dicts; lists concatenate in file order
pub type CorpusAbstractDict = FileAbstractDict;

/// Per-file results keyed by the file they came from, in scan order
pub type PerFileDicts = IndexMap<PathBuf, FileAbstractDict>;

/// The domain field of a signature key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordDomain {
    Fatal,
    Anr,
    /// A generic error block logged under the given severity domain (logcat tag)
    Error(String),
}

impl RecordDomain {
    pub fn parse(field: &str) -> Self {
        match field.trim() {
            "FATAL" => RecordDomain::Fatal,
            "ANR" => RecordDomain::Anr,
            other => RecordDomain::Error(other.strip_prefix("E:").unwrap_or(other).to_string()),
        }
    }

    /// Lower sorts first when resolving colliding signatures.
    pub fn priority(&self) -> u8 {
        match self {
            RecordDomain::Fatal => 1,
            RecordDomain::Anr => 2,
            RecordDomain::Error(_) => 3,
        }
    }
}

impl fmt::Display for RecordDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordDomain::Fatal => write!(f, "FATAL"),
            RecordDomain::Anr => write!(f, "ANR"),
            RecordDomain::Error(tag) => write!(f, "E:{}", tag),
        }
    }
}

pub fn make_key(app: &str, domain: &RecordDomain, exception: &str, location: &str) -> SignatureKey {
    [app, &domain.to_string(), exception, location].join(KEY_SEPARATOR)
}

/// First field of a key.
pub fn key_app(key: &str) -> &str {
    key.split('|').next().unwrap_or("").trim()
}

/// Second field of a key.
pub fn key_domain(key: &str) -> RecordDomain {
    RecordDomain::parse(key.split('|').nth(1).unwrap_or(""))
}

/// The last two fields of a key (exception and location), which identify a
/// fault independently of how severely it was reported.
pub fn key_identity(key: &str) -> &str {
    let mut cut = key.len();
    for _ in 0..2 {
        match key[..cut].rfind('|') {
            Some(pos) => cut = pos,
            None => return key,
        }
    }
    &key[cut + 1..]
}

/// Nested severity levels: Fatal ⊂ Vital ⊂ E_plus ⊂ E_all
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FaultDomain {
    #[serde(rename = "F")]
    Fatal,
    #[serde(rename = "V")]
    Vital,
    #[serde(rename = "E+")]
    EPlus,
    #[serde(rename = "E")]
    EAll,
}

impl FaultDomain {
    pub const ALL: [FaultDomain; 4] = [
        FaultDomain::Fatal,
        FaultDomain::Vital,
        FaultDomain::EPlus,
        FaultDomain::EAll,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FaultDomain::Fatal => "F",
            FaultDomain::Vital => "V",
            FaultDomain::EPlus => "E+",
            FaultDomain::EAll => "E",
        }
    }

    /// Whether a fault classified as `item` counts towards this level.
    pub fn includes(&self, item: FaultDomain) -> bool {
        item <= *self
    }
}

impl fmt::Display for FaultDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Cross-run spread attached to an averaged coverage sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Spread {
    pub std: f64,
    pub std_lower: f64,
    pub std_upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageDetail {
    pub covered: f64,
    pub total: f64,
    pub rate: f64,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub spread: Option<Spread>,
}

impl CoverageDetail {
    pub fn new(covered: f64, total: f64) -> Self {
        let rate = if total > 0.0 { covered / total } else { 0.0 };
        CoverageDetail {
            covered,
            total,
            rate,
            spread: None,
        }
    }

    /// Zero-covered placeholder used before the first real sample.
    pub fn placeholder(total: f64, with_spread: bool) -> Self {
        CoverageDetail {
            covered: 0.0,
            total,
            rate: 0.0,
            spread: with_spread.then(Spread::default),
        }
    }
}

impl fmt::Display for CoverageDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CoverageDetail(covered={}, total={}, rate={}",
            self.covered, self.total, self.rate
        )?;
        if let Some(spread) = &self.spread {
            write!(
                f,
                ", std={}, std_lower={}, std_upper={}",
                spread.std, spread.std_lower, spread.std_upper
            )?;
        }
        write!(f, ")")
    }
}

/// One sample of a coverage time series, held until the next one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageItem {
    pub time: i64,
    pub detail: CoverageDetail,
}

impl CoverageItem {
    pub fn new(time: i64, detail: CoverageDetail) -> Self {
        CoverageItem { time, detail }
    }
}

/// Time-ascending, duplicate-free samples
pub type CoverageSeries = Vec<CoverageItem>;

/// Metric name (INSTRUCTION, LINE, ...) -> series
pub type CoverageReport = BTreeMap<String, CoverageSeries>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_fields() {
        let key = make_key(
            "Notes",
            &RecordDomain::Error("AndroidRuntime".into()),
            "java.lang.IllegalStateException",
            "at org.secuso.Foo.bar(Foo.java:3)",
        );
        assert_eq!(
            key,
            "Notes | E:AndroidRuntime | java.lang.IllegalStateException | at org.secuso.Foo.bar(Foo.java:3)"
        );
        assert_eq!(key_app(&key), "Notes");
        assert_eq!(key_domain(&key), RecordDomain::Error("AndroidRuntime".into()));
        assert_eq!(
            key_identity(&key),
            " java.lang.IllegalStateException | at org.secuso.Foo.bar(Foo.java:3)"
        );
    }

    #[test]
    fn identity_ignores_domain() {
        let fatal = make_key("A", &RecordDomain::Fatal, "X", "at a.b");
        let generic = make_key("A", &RecordDomain::Error("AndroidRuntime".into()), "X", "at a.b");
        assert_eq!(key_identity(&fatal), key_identity(&generic));
    }

    #[test]
    fn fault_domain_nesting() {
        assert!(FaultDomain::EAll.includes(FaultDomain::Fatal));
        assert!(FaultDomain::Vital.includes(FaultDomain::Vital));
        assert!(!FaultDomain::Vital.includes(FaultDomain::EPlus));
        assert!(!FaultDomain::Fatal.includes(FaultDomain::Vital));
    }

    #[test]
    fn detail_serializes_without_spread() {
        let json = serde_json::to_string(&CoverageDetail::new(1.0, 4.0)).unwrap();
        assert_eq!(json, r#"{"covered":1.0,"total":4.0,"rate":0.25}"#);
        let back: CoverageDetail = serde_json::from_str(&json).unwrap();
        assert_eq!(back.spread, None);
    }
}
