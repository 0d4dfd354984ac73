use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use fence::Document;
use sandbox::{QuickJs, Sandbox};

use crate::config::Overrides;
use crate::report::{bold, fail_label, failure_reason, label, title};
use crate::runner::{self, BlockOutcome, BlockReport};

pub enum FileOutcome {
    Ran(Vec<BlockReport>),
    /// The file could not be read or configured.
    Broken(String),
}

pub struct FileResult {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Run every block of one document under its own resolved configuration.
pub async fn run_file(path: &Path, overrides: &Overrides) -> FileResult {
    let broken = |reason: String| FileResult {
        path: path.to_path_buf(),
        outcome: FileOutcome::Broken(reason),
    };

    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => return broken(format!("cannot read file: {}", e)),
    };
    let base_dir = path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let config = match overrides.resolve(&base_dir) {
        Ok(config) => config,
        Err(e) => return broken(e.to_string()),
    };

    let document = Document::scan(&source, 0, &config.delimiters());
    let sandbox = Sandbox::new(QuickJs::with_limits(config.limits())).with_bridge_name(&config.bridge);
    let verifier = config.verifier.build();
    let reports = runner::run_document(&sandbox, &document, &config.selection(), &verifier).await;

    FileResult {
        path: path.to_path_buf(),
        outcome: FileOutcome::Ran(reports),
    }
}

/// Discover `.md` files grouped by category (subfolder relative to root).
/// Files directly in `root` get category "" (uncategorized).
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_documents(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_documents(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_documents(&path, root, out);
        } else if path.extension().is_some_and(|ext| ext == "md") {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

/// List available categories for the given path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no .md files found in {}", path.display());
        return;
    }

    eprintln!("available categories:");
    for (cat, files) in &categories {
        let label = if cat.is_empty() { "(root)" } else { cat.as_str() };
        eprintln!("  {} ({} documents)", label, files.len());
    }
}

fn select_categories<'a>(
    all: &'a BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'a str, &'a Vec<PathBuf>> {
    if requested.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v)).collect();
    }
    let mut filtered = BTreeMap::new();
    for requested in requested {
        let req = requested.trim_matches('/');
        let mut found = false;
        for (cat, files) in all {
            if cat == req || cat.starts_with(&format!("{}/", req)) {
                filtered.insert(cat.as_str(), files);
                found = true;
            }
        }
        if !found {
            eprintln!(
                "warning: category '{}' not found (available: {})",
                req,
                all.keys()
                    .map(|k| if k.is_empty() { "(root)" } else { k.as_str() })
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
    filtered
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// One failure detail: where, and why.
struct Failure {
    location: String,
    reason: String,
}

fn print_file(result: &FileResult, no_color: bool, tally: &mut Tally, failures: &mut Vec<Failure>) {
    let name = result.path.display().to_string();
    match &result.outcome {
        FileOutcome::Broken(reason) => {
            tally.failed += 1;
            eprintln!("  {}  {}", fail_label(no_color), name);
            failures.push(Failure {
                location: name,
                reason: reason.clone(),
            });
        }
        FileOutcome::Ran(reports) => {
            eprintln!("  {}", name);
            if reports.is_empty() {
                eprintln!("    (no blocks)");
            }
            for report in reports {
                eprintln!("    {}  {}", label(report, no_color), title(report));
                match (&report.outcome, failure_reason(report)) {
                    (BlockOutcome::Skipped, _) => tally.skipped += 1,
                    (_, Some(reason)) => {
                        tally.failed += 1;
                        failures.push(Failure {
                            location: format!("{}:{}", name, report.line),
                            reason,
                        });
                    }
                    (_, None) => tally.passed += 1,
                }
            }
        }
    }
}

/// Run every block of every `.md` document under `path` (or a single file).
/// If `categories` is non-empty, only documents in those categories run.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub async fn run_tests(
    path: &Path,
    no_color: bool,
    categories: &[String],
    overrides: &Overrides,
) -> i32 {
    let selected: Vec<(String, Vec<PathBuf>)> = if path.is_file() {
        vec![(String::new(), vec![path.to_path_buf()])]
    } else {
        let all = discover_categorized(path);
        if all.is_empty() {
            eprintln!("no .md files found in {}", path.display());
            return 1;
        }
        let chosen = select_categories(&all, categories);
        if chosen.is_empty() {
            eprintln!("no matching categories found");
            return 1;
        }
        chosen
            .into_iter()
            .map(|(cat, files)| (cat.to_string(), files.clone()))
            .collect()
    };

    let mut tally = Tally::default();
    let mut failures = Vec::new();

    for (cat, files) in &selected {
        if !path.is_file() {
            let header = if cat.is_empty() { "(root)" } else { cat.as_str() };
            eprintln!();
            eprintln!("{}", bold(header, no_color));
        }
        for file in files {
            let result = run_file(file, overrides).await;
            print_file(&result, no_color, &mut tally, &mut failures);
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for f in &failures {
            eprintln!();
            eprintln!("  --- {} ---", f.location);
            for line in f.reason.lines() {
                eprintln!("  {}", line);
            }
        }
    }

    print_summary(&tally, no_color);
    if tally.failed == 0 { 0 } else { 1 }
}

fn print_summary(tally: &Tally, no_color: bool) {
    eprintln!();
    if tally.failed == 0 {
        eprintln!(
            "test result: {}. {} passed, 0 failed, {} skipped",
            if no_color { "ok" } else { "\x1b[32mok\x1b[0m" },
            tally.passed,
            tally.skipped
        );
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed, {} skipped (of {})",
            if no_color { "FAILED" } else { "\x1b[31mFAILED\x1b[0m" },
            tally.passed,
            tally.failed,
            tally.skipped,
            tally.passed + tally.failed + tally.skipped
        );
    }
}
