// src/faults.rs

use crate::apps::{tag_of_path, LogFileName};
use crate::error::Result;
use crate::model::{key_domain, CorpusAbstractDict, FaultDomain, PerFileDicts, RecordDomain, SignatureKey};
use indexmap::IndexMap;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

/// Generic-error domains that are severe enough to count as E+.
pub const E_PLUS_DOMAINS: [&str; 7] = [
    "AndroidRuntime",
    "CrashAnrDetector",
    "ActivityManager",
    "SQLiteDatabase",
    "WindowManager",
    "ActivityThread",
    "Parcel",
];

pub type KeySet = BTreeSet<SignatureKey>;

/// Labelled key sets, e.g. one per run tag.
pub type FaultGroup = Vec<(String, KeySet)>;

/// Row (run tag) -> column -> count
pub type CountTable = IndexMap<String, BTreeMap<String, usize>>;

/// The most specific level a key belongs to.
pub fn domain_of_key(key: &str) -> FaultDomain {
    match key_domain(key) {
        RecordDomain::Fatal => FaultDomain::Fatal,
        RecordDomain::Anr => FaultDomain::Vital,
        RecordDomain::Error(tag) if E_PLUS_DOMAINS.contains(&tag.as_str()) => FaultDomain::EPlus,
        RecordDomain::Error(_) => FaultDomain::EAll,
    }
}

/// Cumulative counts: every level also counts the keys of the levels it nests.
pub fn count_by_domain<'a>(keys: impl IntoIterator<Item = &'a SignatureKey>) -> BTreeMap<FaultDomain, usize> {
    let domains: Vec<FaultDomain> = keys.into_iter().map(|k| domain_of_key(k)).collect();
    FaultDomain::ALL
        .iter()
        .map(|level| (*level, domains.iter().filter(|d| level.includes(**d)).count()))
        .collect()
}

/// For each member, the keys no other member of the group found.
pub fn unique_faults(group: &[(String, KeySet)]) -> FaultGroup {
    group
        .iter()
        .enumerate()
        .map(|(i, (label, keys))| {
            let unique = keys
                .iter()
                .filter(|key| {
                    !group
                        .iter()
                        .enumerate()
                        .any(|(j, (_, other))| j != i && other.contains(*key))
                })
                .cloned()
                .collect();
            (label.clone(), unique)
        })
        .collect()
}

/// For each member, the union of `k` members drawn uniformly with replacement.
/// The draw may pick the member itself, or the same member more than once.
pub fn combine_faults<R: Rng>(group: &[(String, KeySet)], k: usize, rng: &mut R) -> FaultGroup {
    let n = group.len();
    group
        .iter()
        .map(|(label, _)| {
            let mut combined = KeySet::new();
            for _ in 0..k {
                let drawn = &group[rng.gen_range(0..n)].1;
                combined.extend(drawn.iter().cloned());
            }
            (label.clone(), combined)
        })
        .collect()
}

/// Splits tag -> keys into groups sharing `identifier(tag)`, applies `combine`
/// to every group and returns the per-tag results.
fn regroup<'a>(
    sets: &'a BTreeMap<String, KeySet>,
    identifier: impl Fn(&'a str) -> &'a str,
    mut combine: impl FnMut(&[(String, KeySet)]) -> FaultGroup,
) -> FaultGroup {
    let mut groups: BTreeMap<&str, FaultGroup> = BTreeMap::new();
    for (tag, keys) in sets {
        groups
            .entry(identifier(tag))
            .or_default()
            .push((tag.clone(), keys.clone()));
    }
    groups.values().flat_map(|group| combine(group.as_slice())).collect()
}

fn last_segment(tag: &str) -> &str {
    tag.rsplit('-').next().unwrap_or("")
}

fn second_to_last_segment(tag: &str) -> &str {
    tag.rsplit('-').nth(1).unwrap_or("")
}

fn write_counts(table: &mut CountTable, tag: &str, column_prefix: &str, keys: &KeySet) {
    let row = table.entry(tag.to_string()).or_default();
    for (domain, count) in count_by_domain(keys) {
        row.insert(format!("{}{}", column_prefix, domain.label()), count);
    }
}

/// `(stem, run number)` so that `ape-2` sorts before `ape-10`.
fn tag_order(tag: &str) -> (String, i64) {
    match tag.rsplit_once('-') {
        Some((stem, n)) => match n.parse() {
            Ok(n) => (stem.to_string(), n),
            Err(_) => (tag.to_string(), -1),
        },
        None => (tag.to_string(), -1),
    }
}

/// Per run tag, the cumulative fault counts of every app as `<app>-<level>`
/// columns, plus derived columns per app:
///
/// - `<app>-U<level>`: faults no other tag with the same run number found
/// - `<app>-T3<level>`, `<app>-T5<level>`: faults of 3 or 5 runs of the same
///   tool drawn at random
///
/// Cells for app/tag pairs without a log are absent.
pub fn fault_count_table<R: Rng>(per_file: &PerFileDicts, rng: &mut R) -> Result<CountTable> {
    let mut table = CountTable::new();
    let mut per_app: BTreeMap<String, BTreeMap<String, KeySet>> = BTreeMap::new();

    for (path, dict) in per_file {
        let file = LogFileName::from_path(path)?;
        let tag = tag_of_path(path).unwrap_or(file.tag.as_str()).to_string();
        let keys: KeySet = dict.keys().cloned().collect();

        write_counts(&mut table, &tag, &format!("{}-", file.app_name), &keys);
        per_app
            .entry(file.app_name)
            .or_default()
            .insert(tag, keys);
    }

    for (app, sets) in &per_app {
        let derived = [
            ("U", regroup(sets, last_segment, |g| unique_faults(g))),
            ("T3", regroup(sets, second_to_last_segment, |g| combine_faults(g, 3, rng))),
            ("T5", regroup(sets, second_to_last_segment, |g| combine_faults(g, 5, rng))),
        ];
        for (prefix, group) in &derived {
            for (tag, keys) in group {
                write_counts(&mut table, tag, &format!("{}-{}", app, prefix), keys);
            }
        }
    }

    table.sort_by(|a, _, b, _| tag_order(a).cmp(&tag_order(b)));
    Ok(table)
}

/// Key x name table of occurrence counts across several corpus dicts.
pub fn occurrence_table(
    dicts: &IndexMap<String, CorpusAbstractDict>,
) -> BTreeMap<SignatureKey, BTreeMap<String, usize>> {
    let mut table: BTreeMap<SignatureKey, BTreeMap<String, usize>> = BTreeMap::new();
    for (name, dict) in dicts {
        for (key, items) in dict {
            table
                .entry(key.clone())
                .or_default()
                .insert(name.clone(), items.len());
        }
    }
    table
}
