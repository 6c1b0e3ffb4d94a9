//! Global resolver: the second, single-threaded pass that upgrades
//! provisional edges and remaining unresolved calls into fully resolved
//! edges, after every file has been scanned.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::builtins::BUILTINS;
use crate::types::{Edge, FunctionRecord, Provenance, UnresolvedCall};

#[derive(Debug, Default)]
pub struct ResolveStats {
    pub resolved_external: usize,
    pub imported_missing: usize,
    pub resolved_cross_module: usize,
    pub ignored_builtins: usize,
    pub imported_hist: BTreeMap<String, usize>,
    pub unresolved_hist: BTreeMap<String, usize>,
}

pub struct ResolveOutput {
    pub new_edges: Vec<Edge>,
    pub remaining_unresolved: Vec<UnresolvedCall>,
    pub stats: ResolveStats,
}

/// Runs Pass A (imported/aliased candidates already present as provisional
/// edges) followed by Pass B (remaining unresolved simple/attribute names).
///
/// Pass A conceptually covers both `provisional-fromimport` edges (upgraded
/// to `static-cross-import`, matching §4.3's literal text) and
/// `provisional-alias` edges (upgraded to `static-cross-module`, matching
/// the aliased-module-call scenario) — see DESIGN.md for the reconciliation
/// of this with the narrower Pass-A prose.
pub fn resolve(
    functions: &[FunctionRecord],
    provisional_edges: &[Edge],
    unresolved: Vec<UnresolvedCall>,
    ignore_builtin_unresolved: bool,
) -> ResolveOutput {
    let func_set: HashSet<&str> = functions.iter().map(|f| f.qualname.as_str()).collect();
    let caller_module: HashMap<&str, &str> = functions
        .iter()
        .map(|f| (f.qualname.as_str(), f.module.as_str()))
        .collect();

    let mut stats = ResolveStats::default();
    let mut new_edges = Vec::new();

    // Pass A.
    for edge in provisional_edges {
        if !edge.provenance.is_provisional() {
            continue;
        }
        let own_module = caller_module.get(edge.caller.as_str()).copied().unwrap_or("");
        if !own_module.is_empty() && edge.callee.starts_with(&format!("{}.", own_module)) {
            continue;
        }

        let candidates = candidate_callees(&edge.callee, own_module);
        let hit = candidates.iter().find(|c| func_set.contains(c.as_str()));

        match hit {
            Some(resolved) => {
                let provenance = match edge.provenance {
                    Provenance::ProvisionalFromimport => Provenance::StaticCrossImport,
                    Provenance::ProvisionalAlias => Provenance::StaticCrossModule,
                    _ => unreachable!(),
                };
                new_edges.push(Edge::new(edge.caller.clone(), resolved.clone(), provenance));
                stats.resolved_external += 1;
            }
            None => {
                stats.imported_missing += 1;
                let leading = edge.callee.trim_start_matches('.').split('.').next().unwrap_or("").to_string();
                *stats.imported_hist.entry(leading).or_insert(0) += 1;
            }
        }
    }

    // Pass B.
    let top_modules: BTreeSet<String> = functions
        .iter()
        .map(|f| f.module.split('.').next().unwrap_or("").to_string())
        .filter(|m| !m.is_empty())
        .collect();

    let mut remaining_unresolved = Vec::new();
    for entry in unresolved {
        let clean = entry.name.trim_start_matches('.').to_string();

        if ignore_builtin_unresolved && BUILTINS.contains(clean.as_str()) {
            stats.ignored_builtins += 1;
            continue;
        }

        let mut candidates = vec![clean.clone()];
        for tm in &top_modules {
            candidates.push(format!("{}.{}", tm, clean));
        }

        let mut resolved = None;
        for cand in &candidates {
            if func_set.contains(cand.as_str()) {
                resolved = Some(cand.clone());
                break;
            }
            let suffix_matches: Vec<&str> = func_set
                .iter()
                .filter(|fq| **fq == cand.as_str() || fq.ends_with(&format!(".{}", cand)))
                .copied()
                .collect();
            if suffix_matches.len() == 1 {
                resolved = Some(suffix_matches[0].to_string());
                break;
            }
        }

        match resolved {
            Some(callee) => {
                new_edges.push(Edge::new(entry.caller.clone(), callee, Provenance::StaticCrossModule));
                stats.resolved_cross_module += 1;
            }
            None => {
                let leading = clean.split('.').next().unwrap_or("").to_string();
                *stats.unresolved_hist.entry(leading).or_insert(0) += 1;
                remaining_unresolved.push(entry);
            }
        }
    }

    ResolveOutput {
        new_edges,
        remaining_unresolved,
        stats,
    }
}

/// Builds the ordered candidate list for a provisional edge's dotted
/// callee: the relative-import-normalized form (if the callee carries
/// leading dots) tried first, then the literal dotted string.
fn candidate_callees(callee: &str, own_module: &str) -> Vec<String> {
    let dots = callee.chars().take_while(|&c| c == '.').count();
    if dots == 0 {
        return vec![callee.to_string()];
    }

    let remainder = &callee[dots..];
    let own_parts: Vec<&str> = own_module.split('.').filter(|p| !p.is_empty()).collect();
    let keep = own_parts.len().saturating_sub(dots);
    let mut normalized_parts: Vec<&str> = own_parts[..keep].to_vec();
    if !remainder.is_empty() {
        normalized_parts.push(remainder);
    }
    let normalized = normalized_parts.join(".");

    if normalized.is_empty() {
        vec![callee.to_string()]
    } else {
        vec![normalized, callee.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FunctionKind;

    fn func(qualname: &str, module: &str) -> FunctionRecord {
        FunctionRecord::new(
            qualname.to_string(),
            qualname.rsplit('.').next().unwrap().to_string(),
            module.to_string(),
            FunctionKind::Function,
            1,
            1,
        )
    }

    #[test]
    fn from_import_upgrades_to_static_cross_import() {
        let functions = vec![
            func("pkg.util.greet", "pkg.util"),
            func("pkg.worker.Worker.run", "pkg.worker"),
        ];
        let edges = vec![Edge::new(
            "pkg.worker.Worker.run".to_string(),
            ".util.greet".to_string(),
            Provenance::ProvisionalFromimport,
        )];
        let out = resolve(&functions, &edges, Vec::new(), false);
        assert_eq!(out.new_edges.len(), 1);
        assert_eq!(out.new_edges[0].callee, "pkg.util.greet");
        assert_eq!(out.new_edges[0].provenance, Provenance::StaticCrossImport);
        assert_eq!(out.stats.resolved_external, 1);
    }

    #[test]
    fn alias_upgrades_to_static_cross_module() {
        let functions = vec![func("pkg.util.greet", "pkg.util")];
        let edges = vec![Edge::new(
            "mod.run".to_string(),
            "pkg.util.greet".to_string(),
            Provenance::ProvisionalAlias,
        )];
        let out = resolve(&functions, &edges, Vec::new(), false);
        assert_eq!(out.new_edges.len(), 1);
        assert_eq!(out.new_edges[0].provenance, Provenance::StaticCrossModule);
    }

    #[test]
    fn missing_import_target_increments_counter() {
        let functions = vec![func("pkg.util.other", "pkg.util")];
        let edges = vec![Edge::new(
            "mod.run".to_string(),
            "pkg.missing.thing".to_string(),
            Provenance::ProvisionalFromimport,
        )];
        let out = resolve(&functions, &edges, Vec::new(), false);
        assert!(out.new_edges.is_empty());
        assert_eq!(out.stats.imported_missing, 1);
        assert_eq!(out.stats.imported_hist.get("pkg"), Some(&1));
    }

    #[test]
    fn pass_b_resolves_via_top_module_prefix() {
        let functions = vec![func("pkg.sub.helper", "pkg.sub")];
        let unresolved = vec![UnresolvedCall { caller: "mod.run".to_string(), name: "helper".to_string() }];
        let out = resolve(&functions, &[], unresolved, false);
        assert_eq!(out.new_edges.len(), 1);
        assert_eq!(out.new_edges[0].callee, "pkg.sub.helper");
        assert_eq!(out.new_edges[0].provenance, Provenance::StaticCrossModule);
        assert_eq!(out.stats.resolved_cross_module, 1);
    }

    #[test]
    fn pass_b_ambiguous_suffix_stays_unresolved() {
        let functions = vec![func("a.helper", "a"), func("b.helper", "b")];
        let unresolved = vec![UnresolvedCall { caller: "mod.run".to_string(), name: "helper".to_string() }];
        let out = resolve(&functions, &[], unresolved, false);
        assert!(out.new_edges.is_empty());
        assert_eq!(out.remaining_unresolved.len(), 1);
    }

    #[test]
    fn builtin_filter_drops_entry() {
        let unresolved = vec![UnresolvedCall { caller: "mod.run".to_string(), name: "len".to_string() }];
        let out = resolve(&[], &[], unresolved, true);
        assert!(out.remaining_unresolved.is_empty());
        assert_eq!(out.stats.ignored_builtins, 1);
    }

    #[test]
    fn relative_import_normalization_finds_target() {
        let functions = vec![
            func("pkg.beta.b_mod.beta_mid", "pkg.beta.b_mod"),
            func("pkg.alpha.a_mod.alpha_entry", "pkg.alpha.a_mod"),
        ];
        let edges = vec![Edge::new(
            "pkg.alpha.a_mod.alpha_entry".to_string(),
            "..beta.b_mod.beta_mid".to_string(),
            Provenance::ProvisionalFromimport,
        )];
        let out = resolve(&functions, &edges, Vec::new(), false);
        assert_eq!(out.new_edges.len(), 1);
        assert_eq!(out.new_edges[0].callee, "pkg.beta.b_mod.beta_mid");
    }

    #[test]
    fn idempotent_second_pass_adds_nothing() {
        let functions = vec![
            func("pkg.util.greet", "pkg.util"),
            func("pkg.mod.run", "pkg.mod"),
        ];
        let edges = vec![Edge::new(
            "pkg.mod.run".to_string(),
            ".util.greet".to_string(),
            Provenance::ProvisionalFromimport,
        )];
        let first = resolve(&functions, &edges, Vec::new(), false);
        assert_eq!(first.new_edges.len(), 1);
        // Feeding the already-resolved edge (now static-cross-import, no
        // longer provisional) back in produces no further edges.
        let second = resolve(&functions, &first.new_edges, Vec::new(), false);
        assert!(second.new_edges.is_empty());
    }
}
