//! static-pyscan core: walks a source tree, parses every Python file,
//! classifies every call site into resolved/provisional/unresolved, and
//! assembles a structured call-graph report.

pub mod builtins;
pub mod cache;
pub mod diagnostics;
pub mod error;
pub mod module_name;
pub mod report;
pub mod resolve;
pub mod scan;
pub mod types;
pub mod walker;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use cache::HashMode;
use diagnostics::DiagnosticsBuilder;
use error::PyscanError;
use scan::{ScanOutcome, SkipReason};
use types::{Edge, FunctionRecord, ModuleImports, UnresolvedCall};

pub struct RunOptions {
    pub root: PathBuf,
    pub max_file_size: u64,
    pub workers: usize,
    pub skip_dirs: Vec<String>,
    pub cache_file: Option<PathBuf>,
    pub hash_mode: HashMode,
    pub ignore_builtin_unresolved: bool,
    pub edge_cap: Option<usize>,
}

pub struct RunStats {
    pub files: usize,
    pub functions: usize,
    pub edges: usize,
    pub unresolved: usize,
    pub reused_files: usize,
    pub parsed_files: usize,
    pub resolved_cross: usize,
    pub imported_resolved: usize,
    pub imported_missing: usize,
    pub ignored_builtins: usize,
    pub pruned: usize,
}

pub struct RunOutcome {
    pub report: serde_json::Value,
    pub stats: RunStats,
}

/// Runs the full pipeline: walk, fingerprint/cache gate, scan, global
/// resolve, and assemble the report. `generated_at` is supplied by the
/// caller (the CLI stamps it from the wall clock; the library itself never
/// reads the clock, keeping it deterministic and testable).
pub fn run(opts: &RunOptions, generated_at: String) -> Result<RunOutcome, PyscanError> {
    if !opts.root.is_dir() {
        return Err(PyscanError::InvalidRoot(opts.root.clone()));
    }

    let paths = walker::discover_python_files(&opts.root, &opts.skip_dirs);

    let prior_cache = match &opts.cache_file {
        Some(path) => cache::load_cache(path),
        None => cache::CacheFile::default(),
    };

    let edge_cap = opts.edge_cap.filter(|c| *c > 0);

    let mut size_skipped = 0usize;
    let mut parse_skipped = 0usize;
    let mut reused_files = 0usize;
    let mut reused_functions = 0usize;
    let mut reused_edges = 0usize;
    let mut reused_unresolved = 0usize;
    let mut parsed_files = 0usize;

    let mut all_functions: Vec<FunctionRecord> = Vec::new();
    let mut all_edges: Vec<Edge> = Vec::new();
    let mut all_unresolved: Vec<UnresolvedCall> = Vec::new();
    let mut modules_meta: Vec<ModuleImports> = Vec::new();
    let mut file_hashes: BTreeMap<String, String> = BTreeMap::new();
    let mut new_cache_units: BTreeMap<String, cache::CacheUnit> = BTreeMap::new();

    let mut diag_builder = DiagnosticsBuilder::default();

    // Split paths into cache-hit / needs-scan up front so the expensive
    // parallel step only does real work.
    struct PreparedPath {
        relpath: String,
        path: PathBuf,
        fingerprint: String,
        reuse: Option<cache::CacheUnit>,
    }

    let prepared: Vec<PreparedPath> = paths
        .iter()
        .map(|path| {
            let relpath = relpath_string(&opts.root, path);
            let fp = cache::fingerprint(path, opts.hash_mode);
            let reuse = prior_cache.units.get(&relpath).and_then(|unit| {
                if cache::can_reuse(&unit.hash, &fp, prior_cache.hash_mode, opts.hash_mode) {
                    Some(unit.clone())
                } else {
                    None
                }
            });
            PreparedPath {
                relpath,
                path: path.clone(),
                fingerprint: fp,
                reuse,
            }
        })
        .collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.workers.max(1))
        .build()
        .unwrap_or_else(|_| rayon::ThreadPoolBuilder::new().build().expect("default pool"));

    enum Outcome {
        Reused(cache::CacheUnit),
        Scanned(scan::ScannedFile),
        SkippedSize,
        SkippedParse,
    }

    let root = &opts.root;
    let max_file_size = opts.max_file_size;
    let outcomes: Vec<Outcome> = pool.install(|| {
        prepared
            .par_iter()
            .map(|p| {
                if let Some(unit) = &p.reuse {
                    return Outcome::Reused(unit.clone());
                }
                match scan::scan_file(root, &p.path, max_file_size) {
                    ScanOutcome::Scanned(s) => Outcome::Scanned(s),
                    ScanOutcome::Skipped(SkipReason::Size) => Outcome::SkippedSize,
                    ScanOutcome::Skipped(SkipReason::Parse) => Outcome::SkippedParse,
                }
            })
            .collect()
    });

    let mut running_edge_count = 0usize;
    let mut cap_hit = false;

    for (p, outcome) in prepared.iter().zip(outcomes.into_iter()) {
        file_hashes.insert(p.relpath.clone(), p.fingerprint.clone());

        if cap_hit {
            continue;
        }

        match outcome {
            Outcome::Reused(unit) => {
                reused_files += 1;
                reused_functions += unit.functions.len();
                reused_edges += unit.edges.len();
                reused_unresolved += unit.unresolved_calls.len();
                running_edge_count += unit.edges.len();
                all_functions.extend(unit.functions.clone());
                all_edges.extend(unit.edges.clone());
                all_unresolved.extend(unit.unresolved_calls.clone());
                new_cache_units.insert(p.relpath.clone(), unit);
            }
            Outcome::Scanned(scanned) => {
                parsed_files += 1;
                running_edge_count += scanned.records.edges.len();
                diag_builder.add_cross_alias(scanned.diag_cross_alias);
                diag_builder.add_from_import(scanned.diag_from_import);
                diag_builder.note_higher_order(scanned.diag_higher_order);
                modules_meta.push(scanned.imports);

                let unit = cache::CacheUnit {
                    hash: p.fingerprint.clone(),
                    functions: scanned.records.functions.clone(),
                    edges: scanned.records.edges.clone(),
                    unresolved_calls: scanned.records.unresolved.clone(),
                };
                all_functions.extend(scanned.records.functions);
                all_edges.extend(scanned.records.edges);
                all_unresolved.extend(scanned.records.unresolved);
                new_cache_units.insert(p.relpath.clone(), unit);
            }
            Outcome::SkippedSize => size_skipped += 1,
            Outcome::SkippedParse => parse_skipped += 1,
        }

        if let Some(cap) = edge_cap {
            if running_edge_count >= cap {
                cap_hit = true;
            }
        }
    }

    let pruned_files = if opts.cache_file.is_some() {
        let walked: std::collections::HashSet<&str> =
            prepared.iter().map(|p| p.relpath.as_str()).collect();
        prior_cache
            .units
            .keys()
            .filter(|relpath| !walked.contains(relpath.as_str()))
            .count()
    } else {
        0
    };

    let resolve_out = resolve::resolve(
        &all_functions,
        &all_edges,
        all_unresolved,
        opts.ignore_builtin_unresolved,
    );
    all_edges.extend(resolve_out.new_edges);
    let remaining_unresolved = resolve_out.remaining_unresolved;

    let unresolved_hist: Vec<(String, usize)> = resolve_out.stats.unresolved_hist.into_iter().collect();
    let diag = diag_builder.finish(unresolved_hist);

    let imported_hist: Vec<(String, usize)> = resolve_out.stats.imported_hist.into_iter().collect();

    let stats = RunStats {
        files: reused_files + parsed_files,
        functions: all_functions.len(),
        edges: all_edges.len(),
        unresolved: remaining_unresolved.len(),
        reused_files,
        parsed_files,
        resolved_cross: resolve_out.stats.resolved_cross_module,
        imported_resolved: resolve_out.stats.resolved_external,
        imported_missing: resolve_out.stats.imported_missing,
        ignored_builtins: resolve_out.stats.ignored_builtins,
        pruned: pruned_files,
    };

    if let Some(cache_path) = &opts.cache_file {
        cache::save_cache(cache_path, opts.hash_mode, &new_cache_units);
    }

    let report = report::build(report::ReportInput {
        root: report::absolute_root(&opts.root),
        generated_at,
        files: stats.files,
        workers: opts.workers,
        skipped: report::SkippedCounts {
            size: size_skipped,
            parse: parse_skipped,
        },
        functions: all_functions,
        edges: all_edges,
        unresolved_calls: remaining_unresolved,
        modules_meta,
        file_hashes,
        cache_units: opts.cache_file.as_ref().map(|_| new_cache_units),
        cache: report::CacheStats {
            reused_files,
            reused_functions,
            reused_edges,
            reused_unresolved,
            parsed_files,
            pruned_files,
        },
        hash_mode: opts.cache_file.as_ref().map(|_| opts.hash_mode),
        resolved_external: resolve_out.stats.resolved_external,
        imported_missing: resolve_out.stats.imported_missing,
        imported_hist,
        resolved_cross_module: resolve_out.stats.resolved_cross_module,
        ignored_builtins: resolve_out.stats.ignored_builtins,
        diag,
    });

    Ok(RunOutcome { report, stats })
}

fn relpath_string(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}
