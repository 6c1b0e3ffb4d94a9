//! Reporter: assembles the final JSON record.
//!
//! Fields are built on typed structs for internal clarity, then converted
//! through `serde_json::Value` before serialization — `serde_json`'s default
//! `Map` (without the `preserve_order` feature, which this workspace does
//! not enable) is `BTreeMap`-backed, so round-tripping through `Value`
//! yields keys in sorted order at every nesting level, matching the
//! externally documented schema.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::cache::{CacheUnit, HashMode};
use crate::diagnostics::Diagnostics;
use crate::types::{Edge, FunctionRecord, ModuleImports, UnresolvedCall};

#[derive(Debug, Default, Serialize)]
pub struct SkippedCounts {
    pub size: usize,
    pub parse: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct CacheStats {
    pub reused_files: usize,
    pub reused_functions: usize,
    pub reused_edges: usize,
    pub reused_unresolved: usize,
    pub parsed_files: usize,
    pub pruned_files: usize,
}

pub struct ReportInput {
    pub root: String,
    pub generated_at: String,
    pub files: usize,
    pub workers: usize,
    pub skipped: SkippedCounts,
    pub functions: Vec<FunctionRecord>,
    pub edges: Vec<Edge>,
    pub unresolved_calls: Vec<UnresolvedCall>,
    pub modules_meta: Vec<ModuleImports>,
    pub file_hashes: BTreeMap<String, String>,
    pub cache_units: Option<BTreeMap<String, CacheUnit>>,
    pub cache: CacheStats,
    pub hash_mode: Option<HashMode>,
    pub resolved_external: usize,
    pub imported_missing: usize,
    pub imported_hist: Vec<(String, usize)>,
    pub resolved_cross_module: usize,
    pub ignored_builtins: usize,
    pub diag: Diagnostics,
}

#[derive(Serialize)]
struct Report {
    engine: &'static str,
    version: u32,
    generated_at: String,
    root: String,
    files: usize,
    skipped: SkippedCounts,
    functions: Vec<FunctionRecord>,
    edges: Vec<Edge>,
    unresolved_calls: Vec<UnresolvedCall>,
    modules_meta: Vec<ModuleImports>,
    file_hashes: BTreeMap<String, String>,
    workers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_units: Option<BTreeMap<String, CacheUnit>>,
    cache: CacheStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved_external: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    imported_missing: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    imported_candidates: Option<usize>,
    imported_hist: Vec<(String, usize)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved_cross_module: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ignored_builtins: Option<usize>,
    diag: Diagnostics,
}

const IMPORTED_HIST_CAP: usize = 15;

pub fn build(input: ReportInput) -> serde_json::Value {
    let mut imported_hist = input.imported_hist;
    imported_hist.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    imported_hist.truncate(IMPORTED_HIST_CAP);

    let report = Report {
        engine: "static-pyscan",
        version: 1,
        generated_at: input.generated_at,
        root: input.root,
        files: input.files,
        skipped: input.skipped,
        functions: input.functions,
        edges: input.edges,
        unresolved_calls: input.unresolved_calls,
        modules_meta: input.modules_meta,
        file_hashes: input.file_hashes,
        workers: input.workers,
        cache_units: input.cache_units,
        cache: input.cache,
        hash_mode: input.hash_mode.map(|m| m.to_string()),
        resolved_external: (input.resolved_external > 0).then_some(input.resolved_external),
        imported_missing: (input.imported_missing > 0).then_some(input.imported_missing),
        imported_candidates: (input.imported_missing > 0)
            .then_some(input.resolved_external + input.imported_missing),
        imported_hist,
        resolved_cross_module: (input.resolved_cross_module > 0).then_some(input.resolved_cross_module),
        ignored_builtins: (input.ignored_builtins > 0).then_some(input.ignored_builtins),
        diag: input.diag,
    };

    serde_json::to_value(&report).expect("report struct always serializes")
}

pub fn to_string_pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).expect("value always serializes")
}

pub fn absolute_root(root: &Path) -> String {
    root.canonicalize()
        .unwrap_or_else(|_| root.to_path_buf())
        .to_string_lossy()
        .to_string()
}
