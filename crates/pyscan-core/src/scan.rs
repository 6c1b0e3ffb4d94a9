//! Per-file scanner: parses a single source file and produces
//! [`FunctionRecord`]s, [`Edge`]s, [`UnresolvedCall`]s and import metadata.
//!
//! Built on `tree-sitter`/`tree-sitter-python`, following the teacher's
//! `parser::python` module, generalized from "top-level nodes only" to a
//! full nested two-pass walk: a first sweep registers every lexically
//! top-level function/class/method so forward references resolve, then a
//! full traversal classifies every call site while tracking a scope stack,
//! a call stack, and the two import maps.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use crate::types::{DiagSample, Edge, FileRecords, FunctionKind, FunctionRecord, ModuleImports, Provenance, UnresolvedCall};

#[derive(Debug)]
pub enum SkipReason {
    Size,
    Parse,
}

pub enum ScanOutcome {
    Skipped(SkipReason),
    Scanned(ScannedFile),
}

pub struct ScannedFile {
    pub records: FileRecords,
    pub imports: ModuleImports,
    pub diag_cross_alias: Vec<DiagSample>,
    pub diag_from_import: Vec<DiagSample>,
    pub diag_higher_order: Vec<DiagSample>,
}

/// Parses and scans one file. `max_file_size` is in bytes; files larger
/// than that are counted as size-skipped without being read further.
pub fn scan_file(root: &Path, path: &Path, max_file_size: u64) -> ScanOutcome {
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    };
    if size > max_file_size {
        return ScanOutcome::Skipped(SkipReason::Size);
    }

    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "read failed, skipping");
            return ScanOutcome::Skipped(SkipReason::Parse);
        }
    };

    let mut parser = Parser::new();
    if parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .is_err()
    {
        return ScanOutcome::Skipped(SkipReason::Parse);
    }

    let tree = match parser.parse(&source, None) {
        Some(t) => t,
        None => {
            tracing::warn!(file = %path.display(), "parser produced no tree, skipping");
            return ScanOutcome::Skipped(SkipReason::Parse);
        }
    };
    if tree.root_node().has_error() {
        // The original falls back to a best-effort parse; tree-sitter's
        // error-recovery nodes let us keep scanning whatever did parse
        // rather than discarding the whole file.
        tracing::debug!(file = %path.display(), "parse tree contains error nodes, scanning best-effort");
    }

    let module = crate::module_name::module_name(root, path);
    let mut scanner = ModuleScanner::new(module, source);
    scanner.run(&tree);

    ScanOutcome::Scanned(ScannedFile {
        records: FileRecords {
            functions: scanner.functions,
            edges: scanner.edges,
            unresolved: scanner.unresolved,
        },
        imports: ModuleImports {
            module: scanner.module.clone(),
            imports: scanner.imported_modules.clone().into_iter().collect(),
            from_imports: scanner.imported_names.clone().into_iter().collect(),
        },
        diag_cross_alias: scanner.diag_cross_alias,
        diag_from_import: scanner.diag_from_import,
        diag_higher_order: scanner.diag_higher_order,
    })
}

struct ModuleScanner {
    module: String,
    source: Vec<u8>,

    functions: Vec<FunctionRecord>,
    edges: Vec<Edge>,
    unresolved: Vec<UnresolvedCall>,

    /// simple name -> qualnames declared in this module
    name_index: HashMap<String, Vec<String>>,
    /// class qualified prefix -> direct method names
    class_methods: HashMap<String, HashSet<String>>,

    imported_modules: HashMap<String, String>,
    imported_names: HashMap<String, String>,

    /// nesting of class/function names, for qualname construction
    stack: Vec<String>,
    /// qualnames of functions currently open, for caller attribution
    current_func: Vec<String>,

    /// node ids already registered as FunctionRecords by the first pass
    registered_ids: HashSet<usize>,

    diag_cross_alias: Vec<DiagSample>,
    diag_from_import: Vec<DiagSample>,
    diag_higher_order: Vec<DiagSample>,
}

impl ModuleScanner {
    fn new(module: String, source: String) -> Self {
        Self {
            module,
            source: source.into_bytes(),
            functions: Vec::new(),
            edges: Vec::new(),
            unresolved: Vec::new(),
            name_index: HashMap::new(),
            class_methods: HashMap::new(),
            imported_modules: HashMap::new(),
            imported_names: HashMap::new(),
            stack: Vec::new(),
            current_func: Vec::new(),
            registered_ids: HashSet::new(),
            diag_cross_alias: Vec::new(),
            diag_from_import: Vec::new(),
            diag_higher_order: Vec::new(),
        }
    }

    fn text(&self, node: Node) -> String {
        node.utf8_text(&self.source).unwrap_or("").to_string()
    }

    fn qual(&self, name: &str) -> String {
        let mut parts: Vec<&str> = vec![self.module.as_str()];
        parts.extend(self.stack.iter().map(String::as_str));
        parts.push(name);
        parts.into_iter().filter(|p| !p.is_empty()).collect::<Vec<_>>().join(".")
    }

    fn qual_prefix(&self) -> String {
        let mut parts: Vec<&str> = vec![self.module.as_str()];
        parts.extend(self.stack.iter().map(String::as_str));
        parts.into_iter().filter(|p| !p.is_empty()).collect::<Vec<_>>().join(".")
    }

    fn run(&mut self, tree: &Tree) {
        let root = tree.root_node();
        self.first_pass(root);
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            self.visit(child);
        }
    }

    /// Registers every lexically top-level function/method so forward
    /// references resolve during the second pass.
    fn first_pass(&mut self, root: Node) {
        for stmt in direct_statements(root) {
            match stmt.kind() {
                "function_definition" => {
                    if let Some(name_node) = stmt.child_by_field_name("name") {
                        let name = self.text(name_node);
                        let lineno = stmt.start_position().row + 1;
                        let endlineno = stmt.end_position().row + 1;
                        let qualname = format!("{}.{}", self.module, name).trim_start_matches('.').to_string();
                        self.name_index.entry(name.clone()).or_default().push(qualname.clone());
                        self.functions.push(FunctionRecord::new(
                            qualname,
                            name,
                            self.module.clone(),
                            FunctionKind::Function,
                            lineno,
                            endlineno,
                        ));
                        self.registered_ids.insert(stmt.id());
                    }
                }
                "class_definition" => {
                    if let Some(class_name_node) = stmt.child_by_field_name("name") {
                        let class_name = self.text(class_name_node);
                        if let Some(body) = stmt.child_by_field_name("body") {
                            for member in direct_statements(body) {
                                if member.kind() == "function_definition" {
                                    if let Some(mname_node) = member.child_by_field_name("name") {
                                        let mname = self.text(mname_node);
                                        let qual = format!("{}.{}.{}", self.module, class_name, mname)
                                            .trim_start_matches('.')
                                            .to_string();
                                        self.name_index.entry(mname).or_default().push(qual);
                                    }
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn visit(&mut self, node: Node) {
        match node.kind() {
            "function_definition" => self.visit_function_def(node),
            "class_definition" => self.visit_class_def(node),
            "decorated_definition" => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    self.visit(child);
                }
            }
            "import_statement" => self.visit_import(node),
            "import_from_statement" => self.visit_import_from(node),
            "call" => self.visit_call(node),
            _ => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    self.visit(child);
                }
            }
        }
    }

    fn visit_children(&mut self, node: Node) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child);
        }
    }

    fn visit_function_def(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let qualname = self.qual(&name);
        let lineno = node.start_position().row + 1;
        let endlineno = node.end_position().row + 1;
        let is_method = enclosing_def_kind(node) == EnclosingKind::Class;

        if !self.registered_ids.contains(&node.id()) {
            // Nested functions/closures aren't seen by `first_pass` (it only
            // pre-registers lexically top-level functions and direct class
            // methods), so this is the only place they ever reach
            // `name_index` — without it, a same-module call to a nested
            // function falls through to `unresolved` instead of resolving.
            self.name_index.entry(name.clone()).or_default().push(qualname.clone());
            self.functions.push(FunctionRecord::new(
                qualname.clone(),
                name,
                self.module.clone(),
                if is_method { FunctionKind::Method } else { FunctionKind::Function },
                lineno,
                endlineno,
            ));
            self.registered_ids.insert(node.id());
        }

        self.stack.push(self.text(name_node));
        self.current_func.push(qualname);
        if let Some(params) = node.child_by_field_name("parameters") {
            self.visit_children(params);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body);
        }
        self.current_func.pop();
        self.stack.pop();
    }

    fn visit_class_def(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let class_name = self.text(name_node);
        self.stack.push(class_name);
        let class_qual = self.qual_prefix();
        let methods = self.class_methods.entry(class_qual).or_default();

        if let Some(body) = node.child_by_field_name("body") {
            for member in direct_statements(body) {
                if member.kind() == "function_definition" {
                    if let Some(mname_node) = member.child_by_field_name("name") {
                        methods.insert(self.text(mname_node));
                    }
                }
            }
        }

        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            self.visit_children(superclasses);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body);
        }
        self.stack.pop();
    }

    fn visit_call(&mut self, node: Node) {
        if let Some(caller) = self.current_func.last().cloned() {
            if let Some(func_node) = node.child_by_field_name("function") {
                self.classify_call(&caller, func_node);
                self.maybe_record_higher_order(&caller, func_node, node);
            }
        }
        self.visit_children(node);
    }

    fn classify_call(&mut self, caller: &str, func_node: Node) {
        match func_node.kind() {
            "identifier" => {
                let name = self.text(func_node);
                self.classify_simple_name(caller, &name);
            }
            "attribute" => {
                let Some(object) = func_node.child_by_field_name("object") else {
                    return;
                };
                let Some(attr_node) = func_node.child_by_field_name("attribute") else {
                    return;
                };
                let attr = self.text(attr_node);
                if object.kind() == "identifier" {
                    let base = self.text(object);
                    if base == "self" {
                        if let Some(qual) = self.resolve_self_method(&attr) {
                            self.edges.push(Edge::new(caller.to_string(), qual, Provenance::StaticPyscan));
                            return;
                        }
                    }
                    if let Some(module_path) = self.imported_modules.get(&base).cloned() {
                        let full = format!("{}.{}", module_path, attr);
                        self.diag_cross_alias.push(DiagSample {
                            caller: caller.to_string(),
                            name: format!("{}.{}", base, attr),
                            target: full.clone(),
                        });
                        self.edges.push(Edge::new(caller.to_string(), full, Provenance::ProvisionalAlias));
                        return;
                    }
                }
                self.unresolved.push(UnresolvedCall { caller: caller.to_string(), name: attr });
            }
            // call of a call, subscript, lambda literal, etc.: ignored.
            _ => {}
        }
    }

    fn classify_simple_name(&mut self, caller: &str, name: &str) {
        if let Some(candidates) = self.name_index.get(name).cloned() {
            let resolved = if candidates.len() > 1 && !self.stack.is_empty() {
                let prefix = format!(
                    "{}.{}",
                    self.module,
                    self.stack[..self.stack.len() - 1].join(".")
                );
                candidates
                    .iter()
                    .find(|c| c.starts_with(&prefix))
                    .cloned()
                    .unwrap_or_else(|| candidates[0].clone())
            } else {
                candidates[0].clone()
            };
            self.edges.push(Edge::new(caller.to_string(), resolved, Provenance::StaticPyscan));
        } else if let Some(full) = self.imported_names.get(name).cloned() {
            self.diag_from_import.push(DiagSample {
                caller: caller.to_string(),
                name: name.to_string(),
                target: full.clone(),
            });
            self.edges.push(Edge::new(caller.to_string(), full, Provenance::ProvisionalFromimport));
        } else {
            self.unresolved.push(UnresolvedCall { caller: caller.to_string(), name: name.to_string() });
        }
    }

    fn resolve_self_method(&self, attr: &str) -> Option<String> {
        if self.stack.len() < 2 {
            return None;
        }
        let class_qual = format!("{}.{}", self.module, self.stack[..self.stack.len() - 1].join("."))
            .trim_start_matches('.')
            .to_string();
        let methods = self.class_methods.get(&class_qual)?;
        if methods.contains(attr) {
            Some(format!("{}.{}", class_qual, attr))
        } else {
            None
        }
    }

    /// Additive diagnostic: a bare-name argument to `partial(...)` is a
    /// reference, not a call, and must never become an edge.
    fn maybe_record_higher_order(&mut self, caller: &str, func_node: Node, call_node: Node) {
        if func_node.kind() != "identifier" || self.text(func_node) != "partial" {
            return;
        }
        let Some(args) = call_node.child_by_field_name("arguments") else {
            return;
        };
        let mut cursor = args.walk();
        let first_arg = args.named_children(&mut cursor).next();
        let Some(arg) = first_arg else {
            return;
        };
        if arg.kind() != "identifier" {
            return;
        }
        let name = self.text(arg);
        let target = if let Some(candidates) = self.name_index.get(&name) {
            candidates.first().cloned()
        } else {
            self.imported_names.get(&name).cloned()
        };
        if let Some(target) = target {
            self.diag_higher_order.push(DiagSample {
                caller: caller.to_string(),
                name,
                target,
            });
        }
    }

    fn visit_import(&mut self, node: Node) {
        let mut cursor = node.walk();
        let name_nodes: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name_node in name_nodes {
            match name_node.kind() {
                "aliased_import" => {
                    let Some(orig) = name_node.child_by_field_name("name") else { continue };
                    let Some(alias) = name_node.child_by_field_name("alias") else { continue };
                    self.imported_modules.insert(self.text(alias), self.text(orig));
                }
                _ => {
                    let full = self.text(name_node);
                    let root = full.split('.').next().unwrap_or(&full).to_string();
                    self.imported_modules.insert(root.clone(), root);
                }
            }
        }
    }

    fn visit_import_from(&mut self, node: Node) {
        let Some(module_field) = node.child_by_field_name("module_name") else {
            return;
        };
        let (level, module_opt) = if module_field.kind() == "relative_import" {
            let txt = self.text(module_field);
            let dots = txt.chars().take_while(|&c| c == '.').count();
            let rest = txt[dots..].to_string();
            (dots, if rest.is_empty() { None } else { Some(rest) })
        } else {
            (0, Some(self.text(module_field)))
        };

        if level > 0 && module_opt.is_none() {
            return;
        }

        let mod_str = if level > 0 {
            format!("{}{}", ".".repeat(level), module_opt.unwrap_or_default())
        } else {
            module_opt.unwrap_or_default()
        };

        let mut cursor = node.walk();
        let name_nodes: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name_node in name_nodes {
            match name_node.kind() {
                "aliased_import" => {
                    let Some(orig) = name_node.child_by_field_name("name") else { continue };
                    let Some(alias) = name_node.child_by_field_name("alias") else { continue };
                    let orig_text = self.text(orig);
                    self.imported_names.insert(self.text(alias), format!("{}.{}", mod_str, orig_text));
                }
                "wildcard_import" => {
                    self.imported_names.insert("*".to_string(), format!("{}.*", mod_str));
                }
                _ => {
                    let orig_text = self.text(name_node);
                    self.imported_names.insert(orig_text.clone(), format!("{}.{}", mod_str, orig_text));
                }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum EnclosingKind {
    Class,
    Other,
}

/// Walks up from a (possibly decorator-wrapped) definition node to decide
/// whether its lexical parent is a class body.
fn enclosing_def_kind(node: Node) -> EnclosingKind {
    let mut cur = node;
    if let Some(parent) = cur.parent() {
        if parent.kind() == "decorated_definition" {
            cur = parent;
        }
    }
    match cur.parent() {
        Some(block) if block.kind() == "block" => match block.parent() {
            Some(grandparent) if grandparent.kind() == "class_definition" => EnclosingKind::Class,
            _ => EnclosingKind::Other,
        },
        _ => EnclosingKind::Other,
    }
}

/// The direct statement children of a `module` or `block` node, unwrapping
/// `decorated_definition` wrappers to their inner function/class definition.
fn direct_statements(node: Node) -> Vec<Node> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "decorated_definition" {
            if let Some(inner) = child.named_child(child.named_child_count().saturating_sub(1)) {
                out.push(inner);
                continue;
            }
        }
        out.push(child);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scan_source(dir: &TempDir, relpath: &str, source: &str) -> ScannedFile {
        let path = dir.path().join(relpath);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, source).unwrap();
        match scan_file(dir.path(), &path, 1_000_000) {
            ScanOutcome::Scanned(s) => s,
            ScanOutcome::Skipped(reason) => panic!("expected scan, got skip: {:?}", reason),
        }
    }

    #[test]
    fn simple_function_declaration() {
        let dir = TempDir::new().unwrap();
        let s = scan_source(&dir, "mod.py", "def f():\n    pass\n");
        assert_eq!(s.records.functions.len(), 1);
        assert_eq!(s.records.functions[0].qualname, "mod.f");
        assert_eq!(s.records.functions[0].kind, FunctionKind::Function);
    }

    #[test]
    fn method_kind_and_self_resolution() {
        let dir = TempDir::new().unwrap();
        let source = "class Worker:\n    def run(self):\n        return self.helper()\n    def helper(self):\n        return 1\n";
        let s = scan_source(&dir, "worker.py", source);
        let run = s.records.functions.iter().find(|f| f.name == "run").unwrap();
        assert_eq!(run.kind, FunctionKind::Method);
        assert_eq!(run.qualname, "worker.Worker.run");
        assert_eq!(s.records.edges.len(), 1);
        assert_eq!(s.records.edges[0].callee, "worker.Worker.helper");
        assert_eq!(s.records.edges[0].provenance, Provenance::StaticPyscan);
    }

    #[test]
    fn forward_reference_resolves() {
        let dir = TempDir::new().unwrap();
        let source = "def a():\n    return b()\n\ndef b():\n    return 1\n";
        let s = scan_source(&dir, "mod.py", source);
        assert_eq!(s.records.edges.len(), 1);
        assert_eq!(s.records.edges[0].callee, "mod.b");
    }

    #[test]
    fn nested_function_call_resolves() {
        let dir = TempDir::new().unwrap();
        let source = "def outer():\n    def helper():\n        return 1\n    return helper()\n";
        let s = scan_source(&dir, "mod.py", source);
        let helper = s.records.functions.iter().find(|f| f.name == "helper").unwrap();
        assert_eq!(helper.qualname, "mod.outer.helper");
        assert_eq!(s.records.edges.len(), 1);
        assert_eq!(s.records.edges[0].callee, "mod.outer.helper");
        assert_eq!(s.records.edges[0].provenance, Provenance::StaticPyscan);
        assert!(s.records.unresolved.is_empty());
    }

    #[test]
    fn module_scope_call_is_ignored() {
        let dir = TempDir::new().unwrap();
        let source = "def f():\n    pass\n\nf()\n";
        let s = scan_source(&dir, "mod.py", source);
        assert!(s.records.edges.is_empty());
        assert!(s.records.unresolved.is_empty());
    }

    #[test]
    fn from_import_produces_provisional_edge() {
        let dir = TempDir::new().unwrap();
        let source = "from .util import greet\n\ndef run():\n    return greet()\n";
        let s = scan_source(&dir, "pkg/worker.py", source);
        assert_eq!(s.records.edges.len(), 1);
        assert_eq!(s.records.edges[0].callee, ".util.greet");
        assert_eq!(s.records.edges[0].provenance, Provenance::ProvisionalFromimport);
    }

    #[test]
    fn aliased_module_call_is_provisional() {
        let dir = TempDir::new().unwrap();
        let source = "import pkg.util as u\n\ndef run():\n    return u.greet()\n";
        let s = scan_source(&dir, "mod.py", source);
        assert_eq!(s.records.edges.len(), 1);
        assert_eq!(s.records.edges[0].callee, "pkg.util.greet");
        assert_eq!(s.records.edges[0].provenance, Provenance::ProvisionalAlias);
    }

    #[test]
    fn call_of_call_produces_no_record() {
        let dir = TempDir::new().unwrap();
        let source = "def make():\n    return lambda: None\n\ndef run():\n    return make()()\n";
        let s = scan_source(&dir, "mod.py", source);
        // `make()` resolves; the outer `(...)()` callee is a call, so it is
        // ignored rather than unresolved.
        assert_eq!(s.records.edges.len(), 1);
        assert_eq!(s.records.edges[0].callee, "mod.make");
        assert!(s.records.unresolved.is_empty());
    }

    #[test]
    fn higher_order_partial_reference_is_diagnostic_only() {
        let dir = TempDir::new().unwrap();
        let source = "from .util import greet\n\ndef make_partial():\n    fn = partial(greet, 'x')\n    return fn\n";
        let s = scan_source(&dir, "pkg/partial_use.py", source);
        assert_eq!(s.diag_higher_order.len(), 1);
        assert_eq!(s.diag_higher_order[0].name, "greet");
        // `partial` is a bare name with no local or imported definition, so
        // the call site itself is unresolved; `greet` must never appear as
        // an edge callee from this call site.
        assert!(s.records.edges.iter().all(|e| e.callee != ".util.greet"));
        assert!(s.records.unresolved.iter().any(|u| u.name == "partial"));
    }

    #[test]
    fn nested_class_methods_do_not_leak_into_name_index() {
        let dir = TempDir::new().unwrap();
        let source = "class A:\n    def m(self):\n        pass\n\nclass B:\n    def m(self):\n        return self.m()\n";
        let s = scan_source(&dir, "mod.py", source);
        let b_m = s
            .records
            .edges
            .iter()
            .find(|e| e.caller == "mod.B.m")
            .unwrap();
        assert_eq!(b_m.callee, "mod.B.m");
    }
}
