//! The compilation driver: module loading → resolution → type checking →
//! lowering → re-resolution → emission → artifact.
//!
//! The resolver runs twice by design: once on the parsed AST for the
//! user-facing errors (TDZ, duplicate declarations, misplaced
//! break/await/yield), and once on the lowered AST to compute the scope
//! distances the emitter consumes — lowering introduces temporaries and
//! rewrites control flow, so distances are only final afterwards.

use rustc_hash::FxHashMap;
use tracing::debug;
use tsb_binder::Resolver;
use tsb_checker::{Checker, CheckerContext};
use tsb_common::{Diagnostic, LineMap};
use tsb_emitter::{compile_program, ModuleInput, Program};
use tsb_lowering::lower_module;
use tsb_modules::{load_graph, SourceHost};
use tsb_vm::RunOutcome;

/// Per-module line maps for diagnostic rendering.
pub struct LineMaps {
    maps: FxHashMap<String, LineMap>,
}

impl LineMaps {
    pub fn render(&self, diag: &Diagnostic) -> String {
        self.maps
            .get(&diag.file)
            .map(|m| diag.render(Some(m)))
            .unwrap_or_else(|| diag.render(None))
    }
}

/// Compile the module graph rooted at `entry` into a program image.
pub fn compile(host: &dyn SourceHost, entry: &str) -> Result<(Program, LineMaps), Diagnostic> {
    let graph = load_graph(host, entry)?;
    let mut line_maps = FxHashMap::default();
    for module in &graph.modules {
        line_maps.insert(module.path.clone(), module.line_map.clone());
    }
    let line_maps = LineMaps { maps: line_maps };

    // User-facing resolution pass.
    for module in &graph.modules {
        Resolver::new()
            .resolve_module(&module.ast)
            .map_err(|d| d.with_file(&module.path))?;
    }

    // Type checking, dependencies first.
    let mut checker_ctx = CheckerContext::new();
    for module in &graph.modules {
        Checker::check_module(&mut checker_ctx, &module.path, &module.ast, &module.dep_paths)?;
    }

    // Lowering, then the distance-computing resolution pass.
    let mut next_id = graph.next_node_id;
    let mut lowered = Vec::with_capacity(graph.modules.len());
    for module in graph.modules {
        let ast = lower_module(module.ast, &mut next_id);
        let resolve = Resolver::new()
            .resolve_module(&ast)
            .map_err(|d| d.with_file(&module.path))?;
        lowered.push((module.path, ast, resolve, module.dep_paths));
    }

    let inputs: Vec<ModuleInput<'_>> = lowered
        .iter()
        .map(|(path, ast, resolve, dep_paths)| ModuleInput {
            path,
            ast,
            resolve,
            dep_paths,
        })
        .collect();
    let program = compile_program(&inputs, &checker_ctx)?;
    debug!(modules = program.modules.len(), "compilation finished");
    Ok((program, line_maps))
}

/// Compile and run in one step, with caller-supplied output streams.
pub fn compile_and_run(
    host: &dyn SourceHost,
    entry: &str,
    stdout: Box<dyn std::io::Write>,
    stderr: Box<dyn std::io::Write>,
) -> Result<RunOutcome, Diagnostic> {
    let (program, _) = compile(host, entry)?;
    // The runner works from the encoded artifact so the whole
    // emit → write → load → execute path is exercised.
    let bytes = tsb_emitter::encode_artifact(program)?;
    tsb_vm::run_artifact_bytes(&bytes, stdout, stderr)
}
