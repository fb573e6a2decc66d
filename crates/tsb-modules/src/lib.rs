//! Module graph loading.
//!
//! Resolves `./relative` specifiers against the importing file (adding `.ts`
//! or `.js` when needed) and bare names against the builtin module set
//! (`events`, `timers`, `stream`). Modules load once, cached by canonical
//! path. Evaluation order is a depth-first post-order of the import graph —
//! dependencies first, ties broken by import order — and cycles are
//! tolerated: the importer of an in-progress module sees its
//! partially-initialized exports at runtime.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::debug;
use tsb_common::{Diagnostic, LineMap};
use tsb_parser::ast::{NodeId, Stmt, StmtKind};

/// Builtin module specifiers provided by the runtime.
pub const BUILTIN_MODULES: &[&str] = &["events", "timers", "stream"];

pub fn is_builtin_specifier(spec: &str) -> bool {
    BUILTIN_MODULES.contains(&spec)
}

/// Where module source comes from; the CLI uses the file system, tests use
/// an in-memory table.
pub trait SourceHost {
    fn read(&self, path: &str) -> Result<String, String>;
    fn exists(&self, path: &str) -> bool;
}

/// Reads modules from disk.
pub struct FsHost;

impl SourceHost for FsHost {
    fn read(&self, path: &str) -> Result<String, String> {
        std::fs::read_to_string(path).map_err(|e| e.to_string())
    }

    fn exists(&self, path: &str) -> bool {
        std::path::Path::new(path).is_file()
    }
}

/// Serves modules from an in-memory map, for tests.
#[derive(Default)]
pub struct MemoryHost {
    files: FxHashMap<String, String>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<String>, source: impl Into<String>) -> &mut Self {
        self.files.insert(path.into(), source.into());
        self
    }
}

impl SourceHost for MemoryHost {
    fn read(&self, path: &str) -> Result<String, String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| format!("file not found: {path}"))
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

/// A loaded module.
#[derive(Debug)]
pub struct Module {
    /// Canonical path, the cache key.
    pub path: String,
    pub source: String,
    pub line_map: LineMap,
    pub ast: Vec<Stmt>,
    /// Import specifier → canonical dep path ("" for builtins).
    pub dep_paths: FxHashMap<String, String>,
}

/// The whole program: modules in evaluation order, entry last.
#[derive(Debug)]
pub struct ModuleGraph {
    /// Modules in evaluation order (dependencies before importers).
    pub modules: Vec<Module>,
    /// Index of the entry module in `modules` (always the last).
    pub entry: usize,
    /// The next free AST node id after all modules.
    pub next_node_id: NodeId,
}

impl ModuleGraph {
    pub fn module_by_path(&self, path: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.path == path)
    }
}

/// Load the graph rooted at `entry_path`.
pub fn load_graph(host: &dyn SourceHost, entry_path: &str) -> Result<ModuleGraph, Diagnostic> {
    let mut loader = Loader {
        host,
        loaded: IndexMap::new(),
        in_progress: Vec::new(),
        order: Vec::new(),
        next_node_id: 0,
    };
    let canonical = loader.resolve_specifier(entry_path, ".")?;
    loader.load(&canonical)?;
    let mut modules = Vec::new();
    for path in &loader.order {
        let module = loader.loaded.shift_remove(path).expect("ordered modules are loaded");
        modules.push(module);
    }
    let entry = modules.len() - 1;
    debug!(count = modules.len(), "module graph loaded");
    Ok(ModuleGraph {
        modules,
        entry,
        next_node_id: loader.next_node_id,
    })
}

struct Loader<'h> {
    host: &'h dyn SourceHost,
    loaded: IndexMap<String, Module>,
    in_progress: Vec<String>,
    order: Vec<String>,
    next_node_id: NodeId,
}

impl<'h> Loader<'h> {
    fn load(&mut self, canonical: &str) -> Result<(), Diagnostic> {
        if self.loaded.contains_key(canonical) || self.in_progress.iter().any(|p| p == canonical)
        {
            // Already loaded, or a cycle: the runtime sees the
            // partially-initialized exports object.
            return Ok(());
        }
        self.in_progress.push(canonical.to_string());

        let source = self
            .host
            .read(canonical)
            .map_err(|e| Diagnostic::io(format!("cannot load module '{canonical}': {e}")))?;
        let line_map = LineMap::new(&source);
        let (ast, next_id) =
            tsb_parser::parse_source_with_ids(&source, self.next_node_id)
                .map_err(|d| d.with_file(canonical))?;
        self.next_node_id = next_id;

        let mut dep_paths = FxHashMap::default();
        for spec in collect_specifiers(&ast) {
            if is_builtin_specifier(&spec) {
                dep_paths.insert(spec, String::new());
                continue;
            }
            let dep = self.resolve_specifier(&spec, canonical)?;
            self.load(&dep)?;
            dep_paths.insert(spec, dep);
        }

        self.in_progress.pop();
        self.order.push(canonical.to_string());
        self.loaded.insert(
            canonical.to_string(),
            Module {
                path: canonical.to_string(),
                source,
                line_map,
                ast,
                dep_paths,
            },
        );
        Ok(())
    }

    /// Resolve a specifier relative to the importing module's path.
    fn resolve_specifier(&self, spec: &str, importer: &str) -> Result<String, Diagnostic> {
        if !spec.starts_with('.') {
            // Entry paths arrive here too; everything else must be relative
            // or a builtin (already filtered).
            let candidates = candidate_paths(spec);
            for c in &candidates {
                if self.host.exists(c) {
                    return Ok(normalize(c));
                }
            }
            return Err(Diagnostic::io(format!(
                "cannot resolve module '{spec}': not a builtin and not a file"
            )));
        }
        let base = parent_dir(importer);
        let joined = if base.is_empty() {
            spec.to_string()
        } else {
            format!("{base}/{spec}")
        };
        let joined = normalize(&joined);
        for c in candidate_paths(&joined) {
            if self.host.exists(&c) {
                return Ok(normalize(&c));
            }
        }
        Err(Diagnostic::io(format!(
            "cannot resolve module '{spec}' imported from '{importer}'"
        )))
    }
}

fn candidate_paths(base: &str) -> Vec<String> {
    if base.ends_with(".ts") || base.ends_with(".js") {
        vec![base.to_string()]
    } else {
        vec![
            base.to_string(),
            format!("{base}.ts"),
            format!("{base}.js"),
        ]
    }
}

fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

/// Lexical path normalization (no file system access, so the memory host
/// behaves identically to the disk host).
fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let absolute = path.starts_with('/');
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            p => parts.push(p),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Every import specifier in a module, in source order.
fn collect_specifiers(ast: &[Stmt]) -> Vec<String> {
    let mut specs = Vec::new();
    for stmt in ast {
        match &stmt.kind {
            StmtKind::Import(spec) => specs.push(spec.specifier.clone()),
            StmtKind::ImportRequire { specifier, .. } => specs.push(specifier.clone()),
            StmtKind::ExportNamed {
                from: Some(from), ..
            } => specs.push(from.clone()),
            _ => {}
        }
    }
    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_with(files: &[(&str, &str)]) -> MemoryHost {
        let mut host = MemoryHost::new();
        for (path, src) in files {
            host.add(*path, *src);
        }
        host
    }

    #[test]
    fn dependency_order_is_dependencies_first() {
        let host = host_with(&[
            ("a.ts", "export const a = 1;"),
            ("b.ts", "import './a'; export const b = 2;"),
            ("main.ts", "import './b';"),
        ]);
        let graph = load_graph(&host, "main.ts").expect("load");
        let paths: Vec<&str> = graph.modules.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["a.ts", "b.ts", "main.ts"]);
        assert_eq!(graph.entry, 2);
    }

    #[test]
    fn modules_load_once_despite_multiple_importers() {
        let host = host_with(&[
            ("shared.ts", "export const s = 1;"),
            ("x.ts", "import {s} from './shared'; export const x = s;"),
            ("y.ts", "import {s} from './shared'; export const y = s;"),
            ("main.ts", "import './x'; import './y';"),
        ]);
        let graph = load_graph(&host, "main.ts").expect("load");
        let count = graph
            .modules
            .iter()
            .filter(|m| m.path == "shared.ts")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn cycles_are_tolerated() {
        let host = host_with(&[
            ("a.ts", "import {b} from './b'; export const a = 1;"),
            ("b.ts", "import {a} from './a'; export const b = 2;"),
            ("main.ts", "import './a';"),
        ]);
        let graph = load_graph(&host, "main.ts").expect("load");
        assert_eq!(graph.modules.len(), 3);
    }

    #[test]
    fn extensions_are_added_when_missing() {
        let host = host_with(&[("lib/util.ts", "export const u = 1;"), ("main.ts", "import {u} from './lib/util';")]);
        let graph = load_graph(&host, "main.ts").expect("load");
        assert!(graph.module_by_path("lib/util.ts").is_some());
    }

    #[test]
    fn builtin_specifiers_resolve_to_no_module() {
        let host = host_with(&[("main.ts", "import {EventEmitter} from 'events';")]);
        let graph = load_graph(&host, "main.ts").expect("load");
        assert_eq!(graph.modules.len(), 1);
        assert_eq!(graph.modules[0].dep_paths.get("events"), Some(&String::new()));
    }

    #[test]
    fn missing_module_is_an_io_error() {
        let host = host_with(&[("main.ts", "import './nope';")]);
        let err = load_graph(&host, "main.ts").unwrap_err();
        assert!(err.message.contains("cannot resolve"), "{}", err.message);
    }

    #[test]
    fn node_ids_are_unique_across_modules() {
        let host = host_with(&[
            ("a.ts", "export const a = 1 + 2;"),
            ("main.ts", "import {a} from './a'; const b = a + 3;"),
        ]);
        let graph = load_graph(&host, "main.ts").expect("load");
        assert!(graph.next_node_id > 0);
    }
}
