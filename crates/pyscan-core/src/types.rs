//! Shared data model: the entities produced by the scanner and consumed by
//! the resolver and reporter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    Function,
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub id: String,
    pub name: String,
    pub qualname: String,
    pub module: String,
    pub kind: FunctionKind,
    pub lineno: usize,
    pub endlineno: usize,
}

impl FunctionRecord {
    pub fn new(
        qualname: String,
        name: String,
        module: String,
        kind: FunctionKind,
        lineno: usize,
        endlineno: usize,
    ) -> Self {
        Self {
            id: qualname.clone(),
            name,
            qualname,
            module,
            kind,
            lineno,
            endlineno,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    StaticPyscan,
    StaticCrossImport,
    StaticCrossModule,
    ProvisionalAlias,
    ProvisionalFromimport,
}

impl Provenance {
    pub fn is_provisional(self) -> bool {
        matches!(self, Provenance::ProvisionalAlias | Provenance::ProvisionalFromimport)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub caller: String,
    pub callee: String,
    pub kind: String,
    pub provenance: Provenance,
}

impl Edge {
    pub fn new(caller: String, callee: String, provenance: Provenance) -> Self {
        Self {
            caller,
            callee,
            kind: "call".to_string(),
            provenance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedCall {
    pub caller: String,
    pub name: String,
}

/// Import metadata for a single module, surfaced in `modules_meta` for
/// freshly-parsed files only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleImports {
    pub module: String,
    /// alias -> module path
    pub imports: BTreeMap<String, String>,
    /// local name -> fully qualified module.symbol (dots preserved for
    /// relative imports)
    pub from_imports: BTreeMap<String, String>,
}

/// One scanned file's worth of output, whether freshly parsed or rehydrated
/// from the cache.
#[derive(Debug, Clone, Default)]
pub struct FileRecords {
    pub functions: Vec<FunctionRecord>,
    pub edges: Vec<Edge>,
    pub unresolved: Vec<UnresolvedCall>,
}

/// A diagnostic sample recorded alongside a provisional edge or a
/// higher-order reference, for operator inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagSample {
    pub caller: String,
    pub name: String,
    pub target: String,
}
