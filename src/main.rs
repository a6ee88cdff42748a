// src/main.rs

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Args, Command, CorpusArgs, GridArgs};
use crash_sift::analyzer::{self, AnalyzeOptions, CorpusSelection};
use crash_sift::apps::AppRegistry;
use crash_sift::model::{key_app, CorpusAbstractDict, CoverageReport, PerFileDicts};
use crash_sift::pattern::TagPattern;
use crash_sift::report::{self, DetailLevel};
use crash_sift::{convergence, coverage, faults};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

fn main() -> Result<()> {
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    let args = Args::parse();
    let start_time = Instant::now();

    let registry = match &args.apps {
        Some(path) => AppRegistry::from_json_file(path)
            .with_context(|| format!("loading app table {}", path.display()))?,
        None => AppRegistry::builtin(),
    };

    match &args.command {
        Command::Faults {
            corpus,
            detail,
            show_each,
            output,
        } => {
            let (per_file, combined) = analyze_corpus(corpus, &registry, args.reserve, false)?;
            let level = DetailLevel::from_level(*detail);
            if *show_each {
                for (path, dict) in &per_file {
                    println!("==== {}", path.display());
                    print!("{}", report::render_abstract_dict(dict, level));
                }
            }
            println!("==== combined ({} files)", per_file.len());
            print!("{}", report::render_abstract_dict(&combined, level));
            if let Some(path) = output {
                write_output(path, &combined)?;
            }
        }
        Command::Table { corpus, seed, output } => {
            let (per_file, _) = analyze_corpus(corpus, &registry, args.reserve, false)?;
            let mut rng = StdRng::seed_from_u64(*seed);
            let table = faults::fault_count_table(&per_file, &mut rng)
                .context("building fault count table")?;
            emit(output.as_deref(), &table)?;
        }
        Command::FaultConvergence { corpus, output } => {
            let (_, combined) = analyze_corpus(corpus, &registry, args.reserve, true)?;
            let mut result = BTreeMap::new();
            for app in apps_in(&combined) {
                let timeline = convergence::discovery_timeline(&combined, Some(std::slice::from_ref(&app)));
                result.insert(app, convergence::fault_convergence(&timeline));
            }
            emit(output.as_deref(), &result)?;
        }
        Command::CoverageConvergence {
            input,
            grid,
            show_series,
            output,
        } => {
            let aligned = aligned_coverage(input, grid)?;
            if *show_series {
                println!("{}", report::readable_coverage(&aligned));
            }
            let result = convergence::coverage_convergence_report(&aligned)
                .with_context(|| format!("convergence of {}", input.display()))?;
            emit(output.as_deref(), &result)?;
        }
        Command::CombineCoverage {
            inputs,
            grid,
            need_std,
            keep_std,
            mean_rate,
            mixed_packages,
            output,
        } => {
            let runs = inputs
                .iter()
                .map(|path| {
                    coverage::load_report(path).with_context(|| format!("reading {}", path.display()))
                })
                .collect::<Result<Vec<_>>>()?;
            let options = coverage::CombineOptions {
                need_std: *need_std,
                recalculate_std: !*keep_std,
                recalculate_rate: !*mean_rate,
                same_package: !*mixed_packages,
                length: grid.length,
                interval: grid.interval,
            };
            let combined = coverage::combine_reports(&runs, &options).context("combining coverage runs")?;
            emit(output.as_deref(), &combined)?;
        }
    }

    log::info!("Total time: {:.2?}", start_time.elapsed());
    Ok(())
}

fn analyze_corpus(
    corpus: &CorpusArgs,
    registry: &AppRegistry,
    reserved_threads: usize,
    compact: bool,
) -> Result<(PerFileDicts, CorpusAbstractDict)> {
    let pattern = corpus
        .pattern
        .as_deref()
        .map(TagPattern::parse)
        .transpose()
        .context("parsing tag pattern")?;
    let selection = CorpusSelection {
        app: corpus.app.clone(),
        pattern,
        tags: (!corpus.tag.is_empty()).then(|| corpus.tag.clone()),
    };
    let files = selection
        .files(&corpus.root)
        .with_context(|| format!("listing bug files under {}", corpus.root.display()))?;

    let options = AnalyzeOptions {
        target_time: corpus.target_time,
        compact,
        reserved_threads,
    };
    let analysis_start = Instant::now();
    let result = analyzer::analyze(&files, registry, &options).context("analyzing bug files")?;
    log::info!("Analysis finished in {:.2?}. Found {} files.", analysis_start.elapsed(), files.len());
    Ok(result)
}

fn apps_in(dict: &CorpusAbstractDict) -> Vec<String> {
    let mut apps: Vec<String> = dict.keys().map(|key| key_app(key).to_string()).collect();
    apps.sort();
    apps.dedup();
    apps
}

fn aligned_coverage(input: &Path, grid: &GridArgs) -> Result<CoverageReport> {
    let raw = coverage::load_report(input).with_context(|| format!("reading {}", input.display()))?;
    let normalized = coverage::normalize_report(&raw, grid.length)?;
    Ok(coverage::extend_report(&normalized, grid.length, grid.interval)?)
}

fn emit<T: serde::Serialize>(output: Option<&Path>, value: &T) -> Result<()> {
    match output {
        Some(path) => write_output(path, value),
        None => {
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(())
        }
    }
}

fn write_output<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    report::write_json(path, value).with_context(|| format!("writing {}", path.display()))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}
