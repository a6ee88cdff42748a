// src/analyzer.rs

use crate::abstractor::file_to_abstract_dict;
use crate::apps::AppRegistry;
use crate::error::{Error, Result};
use crate::model::{CorpusAbstractDict, FileAbstractDict, PerFileDicts};
use crate::pattern::TagPattern;
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Threads kept free for the rest of the machine by default
pub const DEFAULT_RESERVED_THREADS: usize = 4;

/// Which bug files of a corpus to analyze.
///
/// The corpus root holds one directory per run tag; each directory holds the
/// `*_bug.txt` logs of that run.
#[derive(Debug, Clone, Default)]
pub struct CorpusSelection {
    /// Only files of this app
    pub app: Option<String>,
    /// Only tags matching this pattern
    pub pattern: Option<TagPattern>,
    /// Explicit tags to look at instead of every directory under the root
    pub tags: Option<Vec<String>>,
}

impl CorpusSelection {
    pub fn tags(&self, root: &Path) -> Result<Vec<String>> {
        let mut tags = match &self.tags {
            Some(tags) => tags.clone(),
            None => list_names(root, |p| p.is_dir())?,
        };
        tags.sort();
        if let Some(pattern) = &self.pattern {
            tags.retain(|tag| pattern.is_match(tag));
        }
        Ok(tags)
    }

    /// Matching bug files, sorted by path.
    pub fn files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let app_prefix = self.app.as_ref().map(|app| format!("Apps.{}_", app));

        let mut files = Vec::new();
        for tag in self.tags(root)? {
            let dir = root.join(&tag);
            for name in list_names(&dir, |p| p.is_file())? {
                if !name.contains("bug") {
                    continue;
                }
                if let Some(prefix) = &app_prefix {
                    if !name.starts_with(prefix.as_str()) {
                        continue;
                    }
                }
                files.push(dir.join(name));
            }
        }
        files.sort();
        Ok(files)
    }
}

fn list_names(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if !keep(&path) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Ignore everything logged later than this many seconds into a run
    pub target_time: Option<f64>,
    /// Keep only the first occurrence of each key per file before merging
    pub compact: bool,
    pub reserved_threads: usize,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        AnalyzeOptions {
            target_time: None,
            compact: false,
            reserved_threads: DEFAULT_RESERVED_THREADS,
        }
    }
}

fn worker_count(reserved: usize) -> usize {
    let available = std::thread::available_parallelism().map_or(1, |n| n.get());
    available.saturating_sub(reserved).max(1)
}

/// Abstracts every file in parallel and merges the results in file order.
/// Any file that fails aborts the whole batch.
pub fn analyze(
    files: &[PathBuf],
    registry: &AppRegistry,
    options: &AnalyzeOptions,
) -> Result<(PerFileDicts, CorpusAbstractDict)> {
    let workers = worker_count(options.reserved_threads);
    log::info!("Analyzing {} bug files on {} workers", files.len(), workers);

    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;

    let bar = ProgressBar::new(files.len() as u64);
    bar.set_message("Abstracting logs");

    let dicts: Vec<FileAbstractDict> = pool.install(|| {
        files
            .par_iter()
            .progress_with(bar)
            .map(|path| file_to_abstract_dict(path, registry, options.target_time))
            .collect::<Result<Vec<_>>>()
    })?;

    let mut per_file = PerFileDicts::new();
    for (path, mut dict) in files.iter().cloned().zip(dicts) {
        if options.compact {
            compact(&mut dict);
        }
        per_file.insert(path, dict);
    }

    log::info!("Combining bug data of {} files", per_file.len());
    let combined = merge_dicts(per_file.values());
    Ok((per_file, combined))
}

/// Truncates every occurrence list to its first element.
pub fn compact(dict: &mut FileAbstractDict) {
    for items in dict.values_mut() {
        items.truncate(1);
    }
}

/// Unions dicts by key, concatenating occurrence lists in iteration order.
pub fn merge_dicts<'a>(dicts: impl IntoIterator<Item = &'a FileAbstractDict>) -> CorpusAbstractDict {
    let mut combined = CorpusAbstractDict::new();
    for dict in dicts {
        for (key, items) in dict {
            combined
                .entry(key.clone())
                .or_default()
                .extend(items.iter().cloned());
        }
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AbstractItem;

    fn item(text: &str) -> AbstractItem {
        AbstractItem {
            text: text.to_string(),
            occur_time: "01-11 16:20:01.123".to_string(),
            relative_time: Some(1.0),
        }
    }

    fn dict(entries: &[(&str, Vec<&str>)]) -> FileAbstractDict {
        entries
            .iter()
            .map(|(key, texts)| (key.to_string(), texts.iter().map(|t| item(t)).collect()))
            .collect()
    }

    #[test]
    fn merge_concatenates_in_order() {
        let first = dict(&[("A", vec!["a1"]), ("B", vec!["b1"])]);
        let second = dict(&[("B", vec!["b2", "b3"]), ("C", vec!["c1"])]);

        let merged = merge_dicts([&first, &second]);
        let keys: Vec<&str> = merged.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
        let b: Vec<&str> = merged["B"].iter().map(|i| i.text.as_str()).collect();
        assert_eq!(b, vec!["b1", "b2", "b3"]);
    }

    #[test]
    fn compact_keeps_first_occurrence() {
        let mut d = dict(&[("A", vec!["a1", "a2"]), ("B", vec![])]);
        compact(&mut d);
        assert_eq!(d["A"].len(), 1);
        assert_eq!(d["A"][0].text, "a1");
        assert!(d["B"].is_empty());
    }

    #[test]
    fn at_least_one_worker() {
        assert_eq!(worker_count(usize::MAX), 1);
    }

    #[test]
    fn selects_files_by_tag_and_app() {
        let root = tempfile::tempdir().unwrap();
        for (tag, name) in [
            ("ape-1", "Apps.Notes_2024-01-01-00:00:00_ape-1_bug.txt"),
            ("ape-1", "Apps.NotesPro_2024-01-01-00:00:00_ape-1_bug.txt"),
            ("ape-1", "Apps.Notes_2024-01-01-00:00:00_ape-1_coverage.txt"),
            ("ape-2", "Apps.Notes_2024-01-01-00:00:00_ape-2_bug.txt"),
            ("monkey-1", "Apps.Notes_2024-01-01-00:00:00_monkey-1_bug.txt"),
        ] {
            let dir = root.path().join(tag);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(name), "").unwrap();
        }

        let selection = CorpusSelection {
            app: Some("Notes".to_string()),
            pattern: Some(TagPattern::parse("ape*").unwrap()),
            tags: None,
        };
        assert_eq!(selection.tags(root.path()).unwrap(), vec!["ape-1", "ape-2"]);

        let files = selection.files(root.path()).unwrap();
        let names: Vec<&str> = files
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                "Apps.Notes_2024-01-01-00:00:00_ape-1_bug.txt",
                "Apps.Notes_2024-01-01-00:00:00_ape-2_bug.txt",
            ]
        );

        let everything = CorpusSelection::default().files(root.path()).unwrap();
        assert_eq!(everything.len(), 4);
    }

    #[test]
    fn missing_tag_directory_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let selection = CorpusSelection {
            tags: Some(vec!["nope".to_string()]),
            ..Default::default()
        };
        assert!(matches!(selection.files(root.path()), Err(Error::Io { .. })));
    }
}
