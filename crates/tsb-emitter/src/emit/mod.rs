//! The emitting visitor.
//!
//! `mod.rs` holds the emitter context, function compilation, and statement
//! emission; `expr.rs` the expression visitor; `class.rs` classes, enums,
//! namespaces, destructuring, loops over iterators, and try/catch/finally.
//!
//! The compile-time scope stack mirrors the resolver's scoping rules
//! exactly and spans nested function compilation, so a resolver distance
//! `d` always indexes `scopes[len-1-d]` regardless of closure depth. Hidden
//! slots (iterator registers, expression temporaries) are appended to the
//! innermost scope; slot counts are back-patched when a scope closes.

mod class;
mod expr;

use rustc_hash::FxHashMap;
use tracing::debug;
use tsb_binder::ResolveMap;
use tsb_checker::CheckerContext;
use tsb_common::{Diagnostic, Span};
use tsb_parser::ast::*;

use crate::il::{
    ClassDef, Const, FuncDef, FuncKind, ImportImage, ModuleImage, Op, Program, RtHelper,
};

/// Per-module input to compilation.
pub struct ModuleInput<'a> {
    pub path: &'a str,
    pub ast: &'a [Stmt],
    pub resolve: &'a ResolveMap,
    /// Import specifier → canonical dep path ("" for builtins).
    pub dep_paths: &'a FxHashMap<String, String>,
}

/// Compile every module into one program image.
pub fn compile_program(
    modules: &[ModuleInput<'_>],
    checker: &CheckerContext,
) -> Result<Program, Diagnostic> {
    let mut emitter = Emitter {
        checker,
        resolve: None,
        constants: Vec::new(),
        const_map: FxHashMap::default(),
        functions: Vec::new(),
        classes: Vec::new(),
        frames: Vec::new(),
        scopes: Vec::new(),
        module_path: String::new(),
        module_index: 0,
    };
    let mut images = Vec::new();
    for (index, module) in modules.iter().enumerate() {
        emitter.resolve = Some(module.resolve);
        emitter.module_path = module.path.to_string();
        emitter.module_index = index as u32;
        let image = emitter
            .compile_module(module)
            .map_err(|d| d.with_file(module.path))?;
        images.push(image);
    }
    debug!(
        functions = emitter.functions.len(),
        classes = emitter.classes.len(),
        constants = emitter.constants.len(),
        "emission complete"
    );
    Ok(Program {
        constants: emitter.constants,
        functions: emitter.functions,
        classes: emitter.classes,
        helper_names: Vec::new(), // populated by the artifact writer
        entry: images.len() as u32 - 1,
        modules: images,
    })
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum ConstKey {
    Number(u64),
    Str(u64),
    BigInt(i64),
}

pub(crate) struct Scope {
    names: FxHashMap<String, u16>,
    count: u16,
    /// Instruction index of the `PushScope` to patch; `None` for function
    /// scopes (whose count lands in `FuncDef.scope_slots`).
    push_ip: Option<usize>,
    /// `this`/`super` scopes exist at runtime without an emitted
    /// `PushScope` (created by method invocation / class creation).
    pseudo: bool,
}

pub(crate) enum RegionKind {
    Catch,
    /// The finally block, re-emitted inline at each early exit.
    Finally { stmts: Vec<Stmt>, scope_depth: usize },
}

pub(crate) struct LoopCtx {
    break_patches: Vec<usize>,
    continue_patches: Vec<usize>,
    /// Scope depth just inside the loop (break/continue unwind to here).
    scope_depth: usize,
    region_depth: usize,
}

pub(crate) struct FnFrame {
    pub code: Vec<Op>,
    loops: Vec<LoopCtx>,
    regions: Vec<RegionKind>,
    /// Resume-stub instruction indexes; state `k` is entry `k - 1`.
    resume_ips: Vec<u32>,
    /// Index of the dispatch `Switch` to patch, for suspendable functions.
    dispatch_ip: Option<usize>,
    is_module_top: bool,
    temp_counter: u16,
    /// Scope-stack length when this frame began (its scopes start here).
    scope_base: usize,
}

pub(crate) struct Emitter<'a> {
    pub checker: &'a CheckerContext,
    pub resolve: Option<&'a ResolveMap>,
    constants: Vec<Const>,
    const_map: FxHashMap<ConstKey, u32>,
    pub functions: Vec<FuncDef>,
    pub classes: Vec<ClassDef>,
    frames: Vec<FnFrame>,
    /// The shared compile-time scope stack, spanning nested functions.
    scopes: Vec<Scope>,
    pub module_path: String,
    module_index: u32,
}

impl<'a> Emitter<'a> {
    // =========================================================================
    // Low-level helpers
    // =========================================================================

    pub(crate) fn frame(&mut self) -> &mut FnFrame {
        self.frames.last_mut().expect("inside a function frame")
    }

    pub(crate) fn emit(&mut self, op: Op) -> usize {
        let code = &mut self.frame().code;
        code.push(op);
        code.len() - 1
    }

    pub(crate) fn here(&mut self) -> u32 {
        self.frame().code.len() as u32
    }

    pub(crate) fn patch_jump(&mut self, at: usize) {
        let target = self.here();
        let code = &mut self.frame().code;
        match &mut code[at] {
            Op::Jump(t)
            | Op::JumpIfFalse(t)
            | Op::JumpIfTrue(t)
            | Op::JumpIfNullish(t)
            | Op::JumpIfNotNullish(t)
            | Op::EnterTryCatch { catch: t }
            | Op::EnterTryFinally { finally: t } => *t = target,
            other => unreachable!("patching a non-jump {other:?}"),
        }
    }

    pub(crate) fn const_idx(&mut self, c: Const) -> u32 {
        let key = match &c {
            Const::Number(n) => Some(ConstKey::Number(n.to_bits())),
            Const::Str(s) => {
                use std::hash::{Hash, Hasher};
                let mut h = rustc_hash::FxHasher::default();
                s.hash(&mut h);
                Some(ConstKey::Str(h.finish()))
            }
            Const::BigInt(v) => Some(ConstKey::BigInt(*v)),
            Const::Regex { .. } => None,
        };
        if let Some(key) = key {
            if let Some(&idx) = self.const_map.get(&key) {
                if self.constants[idx as usize] == c {
                    return idx;
                }
            }
            let idx = self.constants.len() as u32;
            self.constants.push(c);
            self.const_map.insert(key, idx);
            return idx;
        }
        let idx = self.constants.len() as u32;
        self.constants.push(c);
        idx
    }

    pub(crate) fn str_const(&mut self, s: &str) -> u32 {
        self.const_idx(Const::Str(s.to_string()))
    }

    pub(crate) fn emit_number(&mut self, n: f64) {
        let idx = self.const_idx(Const::Number(n));
        self.emit(Op::Const(idx));
    }

    pub(crate) fn emit_str(&mut self, s: &str) {
        let idx = self.str_const(s);
        self.emit(Op::Const(idx));
    }

    pub(crate) fn helper(&mut self, helper: RtHelper, argc: u8) {
        self.emit(Op::CallRuntime {
            helper: helper as u32,
            argc,
        });
    }

    // =========================================================================
    // Scopes
    // =========================================================================

    fn push_function_scope(&mut self) {
        self.scopes.push(Scope {
            names: FxHashMap::default(),
            count: 0,
            push_ip: None,
            pseudo: false,
        });
    }

    pub(crate) fn push_block_scope(&mut self) {
        let ip = self.emit(Op::PushScope(0));
        self.scopes.push(Scope {
            names: FxHashMap::default(),
            count: 0,
            push_ip: Some(ip),
            pseudo: false,
        });
    }

    pub(crate) fn push_pseudo_scope(&mut self, name: &str) {
        let mut names = FxHashMap::default();
        names.insert(name.to_string(), 0);
        self.scopes.push(Scope {
            names,
            count: 1,
            push_ip: None,
            pseudo: true,
        });
    }

    pub(crate) fn pop_pseudo_scope(&mut self) {
        let scope = self.scopes.pop().expect("scope to pop");
        debug_assert!(scope.pseudo, "expected a pseudo scope");
    }

    pub(crate) fn pop_block_scope(&mut self) {
        let scope = self.scopes.pop().expect("scope to pop");
        debug_assert!(!scope.pseudo, "expected a block scope");
        if let Some(ip) = scope.push_ip {
            self.frame().code[ip] = Op::PushScope(scope.count);
            self.emit(Op::PopScope);
        }
    }

    pub(crate) fn declare_slot(&mut self, name: &str) -> u16 {
        let scope = self.scopes.last_mut().expect("a scope");
        if let Some(&slot) = scope.names.get(name) {
            return slot;
        }
        let slot = scope.count;
        scope.names.insert(name.to_string(), slot);
        scope.count += 1;
        slot
    }

    pub(crate) fn alloc_temp(&mut self) -> u16 {
        let n = self.frame().temp_counter;
        self.frame().temp_counter += 1;
        self.declare_slot(&format!("@tmp{n}"))
    }

    /// Slot of `name` at resolver distance `d`.
    pub(crate) fn slot_at_distance(
        &mut self,
        name: &str,
        distance: u16,
        span: Span,
    ) -> Result<(u16, u16), Diagnostic> {
        let idx = self
            .scopes
            .len()
            .checked_sub(1 + distance as usize)
            .ok_or_else(|| {
                Diagnostic::emit(format!("scope distance for '{name}' out of range"), span)
            })?;
        match self.scopes[idx].names.get(name) {
            Some(&slot) => Ok((distance, slot)),
            None => Err(Diagnostic::emit(
                format!("no slot for '{name}' at distance {distance}"),
                span,
            )),
        }
    }

    pub(crate) fn distance_of(&self, id: NodeId) -> Option<u16> {
        self.resolve.and_then(|r| r.distance(id))
    }

    pub(crate) fn at_module_top(&self) -> bool {
        let frame = self.frames.last().expect("frame");
        frame.is_module_top && self.scopes.len() == frame.scope_base + 1
    }

    // =========================================================================
    // Early exits (break/continue/return) across try regions and scopes
    // =========================================================================

    /// Emit the unwinding for an early exit: close protected regions above
    /// `region_target` (running finally blocks inline), then pop runtime
    /// scopes down to `scope_target` (`None` for returns, which discard the
    /// whole frame).
    pub(crate) fn emit_exit_unwind(
        &mut self,
        region_target: usize,
        scope_target: Option<usize>,
    ) -> Result<(), Diagnostic> {
        let mut vdepth = self.scopes.len();
        let region_count = self.frames.last().expect("frame").regions.len();
        for i in (region_target..region_count).rev() {
            self.emit(Op::PopTry);
            let finally = match &self.frames.last().expect("frame").regions[i] {
                RegionKind::Catch => None,
                RegionKind::Finally { stmts, scope_depth } => {
                    Some((stmts.clone(), *scope_depth))
                }
            };
            if let Some((stmts, scope_depth)) = finally {
                self.emit_pops_between(scope_depth, vdepth);
                vdepth = scope_depth;
                // Compile the finally body against the scope stack as it
                // stood at the try statement.
                let saved = self.scopes.split_off(scope_depth);
                self.push_block_scope();
                self.collect_scope_decls(&stmts);
                self.emit_hoisted_functions(&stmts)?;
                for s in &stmts {
                    self.emit_stmt(s)?;
                }
                self.pop_block_scope();
                self.scopes.extend(saved);
            }
        }
        if let Some(target) = scope_target {
            self.emit_pops_between(target, vdepth);
        }
        Ok(())
    }

    fn emit_pops_between(&mut self, from: usize, to: usize) {
        let pops = self.scopes[from..to].iter().filter(|s| !s.pseudo).count();
        for _ in 0..pops {
            self.emit(Op::PopScope);
        }
    }

    // =========================================================================
    // Functions
    // =========================================================================

    fn new_frame(&mut self, is_module_top: bool) {
        let scope_base = self.scopes.len();
        self.frames.push(FnFrame {
            code: Vec::new(),
            loops: Vec::new(),
            regions: Vec::new(),
            resume_ips: Vec::new(),
            dispatch_ip: None,
            is_module_top,
            temp_counter: 0,
            scope_base,
        });
    }

    /// Compile a function literal; returns its function-table index.
    pub(crate) fn compile_function(
        &mut self,
        func: &FunctionLit,
        name: &str,
        binds_this: bool,
    ) -> Result<u32, Diagnostic> {
        let kind = match (func.is_async(), func.is_generator()) {
            (false, false) => FuncKind::Normal,
            (true, false) => FuncKind::Async,
            (false, true) => FuncKind::Generator,
            (true, true) => FuncKind::AsyncGenerator,
        };
        self.new_frame(false);
        self.push_function_scope();

        // Parameter slots in order; complex patterns park the incoming
        // value in a hidden slot and destructure in the prologue.
        let mut pattern_params = Vec::new();
        for (i, p) in func.params.iter().enumerate() {
            match &p.pattern {
                Pattern::Identifier { name, .. } => {
                    self.declare_slot(name);
                }
                other => {
                    let slot = self.declare_slot(&format!("@param{i}"));
                    let mut names = Vec::new();
                    other.bound_names(&mut names);
                    for n in &names {
                        self.declare_slot(n);
                    }
                    pattern_params.push((slot, other.clone()));
                }
            }
        }
        self.collect_scope_decls(&func.body);

        // Suspendable functions start with the resume dispatch.
        if func.is_suspendable() {
            self.emit(Op::LoadState);
            let ip = self.emit(Op::Switch(Vec::new()));
            self.frame().dispatch_ip = Some(ip);
        }

        // Defaults: `p === undefined` takes the default expression.
        for p in &func.params {
            if let (Some(default), Pattern::Identifier { name, .. }) = (&p.default, &p.pattern) {
                let (depth, slot) = self.slot_at_distance(name, 0, func.span)?;
                self.emit(Op::LoadVar { depth, slot });
                self.emit(Op::Undefined);
                self.emit(Op::StrictEq);
                let skip = self.emit(Op::JumpIfFalse(0));
                self.emit_expr(default)?;
                self.emit(Op::StoreVar { depth, slot });
                self.patch_jump(skip);
            }
        }
        for (slot, pattern) in &pattern_params {
            self.emit(Op::LoadVar {
                depth: 0,
                slot: *slot,
            });
            self.emit_destructure(pattern)?;
        }

        self.emit_hoisted_functions(&func.body)?;
        for stmt in &func.body {
            self.emit_stmt(stmt)?;
        }
        self.emit(Op::ReturnUndefined);

        // Patch the dispatch table: state k → its resume stub.
        if let Some(ip) = self.frames.last().expect("frame").dispatch_ip {
            let resume = self.frames.last().expect("frame").resume_ips.clone();
            let mut table = vec![u32::MAX]; // state 0 falls through to the body
            table.extend(resume);
            self.frame().code[ip] = Op::Switch(table);
        }

        let frame = self.frames.pop().expect("frame");
        let fn_scope = self.scopes.pop().expect("function scope");
        debug_assert!(fn_scope.push_ip.is_none() && !fn_scope.pseudo);
        let def = FuncDef {
            name: name.to_string(),
            n_params: func.params.len() as u16,
            has_rest: func.params.last().is_some_and(|p| p.is_rest),
            scope_slots: fn_scope.count,
            binds_this,
            kind,
            module: self.module_index,
            code: frame.code,
        };
        self.functions.push(def);
        Ok(self.functions.len() as u32 - 1)
    }

    /// Names a scope's statements declare, mirroring the resolver: direct
    /// statements plus `Sequence`/`Export` contents.
    pub(crate) fn collect_scope_decls(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.collect_stmt_decls(stmt);
        }
    }

    fn collect_stmt_decls(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Var { decls, .. } => {
                for d in decls {
                    let mut names = Vec::new();
                    d.pattern.bound_names(&mut names);
                    for n in names {
                        self.declare_slot(&n);
                    }
                }
            }
            StmtKind::Function { name, .. } => {
                self.declare_slot(name);
            }
            StmtKind::Class(decl) if !decl.name.is_empty() => {
                self.declare_slot(&decl.name);
            }
            StmtKind::Enum(decl) => {
                self.declare_slot(&decl.name);
            }
            StmtKind::Namespace(decl) => {
                self.declare_slot(&decl.name);
            }
            StmtKind::Sequence(body) => self.collect_scope_decls(body),
            StmtKind::Export(inner) => self.collect_stmt_decls(inner),
            _ => {}
        }
    }

    /// Function declarations hoist their closures to the top of the scope.
    pub(crate) fn emit_hoisted_functions(&mut self, stmts: &[Stmt]) -> Result<(), Diagnostic> {
        for stmt in stmts {
            let inner = match &stmt.kind {
                StmtKind::Export(inner) => inner,
                _ => stmt,
            };
            match &inner.kind {
                StmtKind::Function { name, func } => {
                    let name = name.clone();
                    let idx = self.compile_function(func, &name, false)?;
                    self.emit(Op::MakeClosure { func: idx });
                    self.store_declaration(&name, false, stmt.span)?;
                }
                StmtKind::Sequence(body) => self.emit_hoisted_functions(body)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Store the value on the stack into a freshly declared binding: a
    /// module-level cell at top level, a scope slot otherwise.
    pub(crate) fn store_declaration(
        &mut self,
        name: &str,
        mutable: bool,
        span: Span,
    ) -> Result<(), Diagnostic> {
        if self.at_module_top() {
            let idx = self.str_const(name);
            self.emit(Op::DefineGlobal { name: idx, mutable });
            Ok(())
        } else {
            let (depth, slot) = self.slot_at_distance(name, 0, span)?;
            self.emit(Op::StoreVar { depth, slot });
            Ok(())
        }
    }

    // =========================================================================
    // Modules
    // =========================================================================

    fn compile_module(&mut self, module: &ModuleInput<'_>) -> Result<ModuleImage, Diagnostic> {
        self.new_frame(true);
        // One scope for expression temporaries; declarations become cells.
        self.push_function_scope();

        self.emit_hoisted_functions(module.ast)?;
        for stmt in module.ast {
            self.emit_stmt(stmt)?;
        }
        self.emit(Op::ReturnUndefined);

        let frame = self.frames.pop().expect("frame");
        let top_scope = self.scopes.pop().expect("module scope");
        self.functions.push(FuncDef {
            name: format!("<module:{}>", module.path),
            n_params: 0,
            has_rest: false,
            scope_slots: top_scope.count,
            binds_this: false,
            kind: FuncKind::Normal,
            module: self.module_index,
            code: frame.code,
        });
        let init = self.functions.len() as u32 - 1;

        let mut exports = Vec::new();
        let mut reexports = Vec::new();
        let mut imports = Vec::new();
        for stmt in module.ast {
            match &stmt.kind {
                StmtKind::Import(spec) => {
                    let dep = module
                        .dep_paths
                        .get(&spec.specifier)
                        .cloned()
                        .unwrap_or_default();
                    imports.push(ImportImage {
                        specifier: spec.specifier.clone(),
                        dep_path: dep,
                        default: spec.default.clone(),
                        namespace: spec.namespace.clone(),
                        named: spec.named.clone(),
                    });
                }
                StmtKind::ImportRequire { name, specifier } => {
                    let dep = module.dep_paths.get(specifier).cloned().unwrap_or_default();
                    imports.push(ImportImage {
                        specifier: specifier.clone(),
                        dep_path: dep,
                        default: None,
                        namespace: Some(name.clone()),
                        named: Vec::new(),
                    });
                }
                StmtKind::Export(inner) => {
                    for name in exported_names_of(inner) {
                        exports.push((name.clone(), name));
                    }
                }
                StmtKind::ExportNamed { names, from } => match from {
                    Some(spec) => {
                        let dep = module.dep_paths.get(spec).cloned().unwrap_or_default();
                        for (name, alias) in names {
                            let exported = alias.clone().unwrap_or_else(|| name.clone());
                            reexports.push((exported, dep.clone(), name.clone()));
                        }
                    }
                    None => {
                        for (name, alias) in names {
                            let exported = alias.clone().unwrap_or_else(|| name.clone());
                            exports.push((exported, name.clone()));
                        }
                    }
                },
                StmtKind::ExportDefault(_) => {
                    exports.push(("default".to_string(), "default".to_string()));
                }
                _ => {}
            }
        }

        Ok(ModuleImage {
            path: module.path.to_string(),
            init,
            exports,
            reexports,
            imports,
        })
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub(crate) fn emit_stmt(&mut self, stmt: &Stmt) -> Result<(), Diagnostic> {
        match &stmt.kind {
            StmtKind::Block(body) => {
                self.push_block_scope();
                self.collect_scope_decls(body);
                self.emit_hoisted_functions(body)?;
                for s in body {
                    self.emit_stmt(s)?;
                }
                self.pop_block_scope();
                Ok(())
            }
            StmtKind::Sequence(body) => {
                for s in body {
                    self.emit_stmt(s)?;
                }
                Ok(())
            }
            StmtKind::Var { kind, decls } => {
                for decl in decls {
                    self.emit_var_decl(kind, decl)?;
                }
                Ok(())
            }
            // Hoisted already; nothing at the original position.
            StmtKind::Function { .. } => Ok(()),
            StmtKind::Class(decl) => {
                self.emit_class(decl)?;
                self.store_declaration(&decl.name, false, stmt.span)
            }
            StmtKind::Enum(decl) => {
                self.emit_enum(decl)?;
                self.store_declaration(&decl.name, false, stmt.span)
            }
            StmtKind::Interface(_) | StmtKind::TypeAlias(_) => Ok(()),
            StmtKind::Namespace(decl) => {
                self.emit_namespace(decl)?;
                self.store_declaration(&decl.name, false, stmt.span)
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.emit_expr(cond)?;
                let to_else = self.emit(Op::JumpIfFalse(0));
                self.emit_stmt_scoped(then)?;
                match otherwise {
                    Some(other) => {
                        let to_end = self.emit(Op::Jump(0));
                        self.patch_jump(to_else);
                        self.emit_stmt_scoped(other)?;
                        self.patch_jump(to_end);
                    }
                    None => self.patch_jump(to_else),
                }
                Ok(())
            }
            StmtKind::While { cond, body } => {
                let loop_start = self.here();
                self.emit_expr(cond)?;
                let exit = self.emit(Op::JumpIfFalse(0));
                self.begin_loop();
                self.emit_stmt_scoped(body)?;
                self.emit(Op::Jump(loop_start));
                self.patch_jump(exit);
                self.end_loop(loop_start);
                Ok(())
            }
            StmtKind::DoWhile { body, cond } => {
                let loop_start = self.here();
                self.begin_loop();
                self.emit_stmt_scoped(body)?;
                let cond_ip = self.here();
                self.emit_expr(cond)?;
                self.emit(Op::JumpIfTrue(loop_start));
                self.end_loop(cond_ip);
                Ok(())
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                self.push_block_scope();
                if let Some(init) = init {
                    self.collect_stmt_decls(init);
                    self.emit_stmt(init)?;
                }
                let loop_start = self.here();
                let exit = match cond {
                    Some(cond) => {
                        self.emit_expr(cond)?;
                        Some(self.emit(Op::JumpIfFalse(0)))
                    }
                    None => None,
                };
                self.begin_loop();
                self.emit_stmt_scoped(body)?;
                let continue_target = self.here();
                if let Some(update) = update {
                    self.emit_expr(update)?;
                    self.emit(Op::Pop);
                }
                self.emit(Op::Jump(loop_start));
                if let Some(exit) = exit {
                    self.patch_jump(exit);
                }
                self.end_loop(continue_target);
                self.pop_block_scope();
                Ok(())
            }
            StmtKind::ForOf {
                pattern,
                iterable,
                body,
                ..
            } => {
                self.emit_expr(iterable)?;
                self.emit(Op::GetIter);
                self.emit_for_iterator(pattern, body)
            }
            StmtKind::ForIn {
                pattern,
                object,
                body,
                ..
            } => {
                // Enumerate own keys, then run an ordinary element loop.
                self.emit_expr(object)?;
                self.helper(RtHelper::ObjectKeys, 1);
                self.emit(Op::GetIter);
                self.emit_for_iterator(pattern, body)
            }
            StmtKind::TryCatch {
                try_block,
                catch,
                finally,
            } => self.emit_try(try_block, catch.as_ref(), finally.as_ref()),
            StmtKind::Throw(expr) => {
                self.emit_expr(expr)?;
                self.emit(Op::Throw);
                Ok(())
            }
            StmtKind::Return(value) => {
                match value {
                    Some(v) => self.emit_expr(v)?,
                    None => {
                        self.emit(Op::Undefined);
                    }
                }
                // Run pending finally blocks on the way out.
                self.emit_exit_unwind(0, None)?;
                self.emit(Op::Return);
                Ok(())
            }
            StmtKind::Break => {
                let (scope_depth, region_depth) = {
                    let lp = self
                        .frame()
                        .loops
                        .last()
                        .expect("resolver validated loop context");
                    (lp.scope_depth, lp.region_depth)
                };
                self.emit_exit_unwind(region_depth, Some(scope_depth))?;
                let jump = self.emit(Op::Jump(0));
                self.frame()
                    .loops
                    .last_mut()
                    .expect("loop")
                    .break_patches
                    .push(jump);
                Ok(())
            }
            StmtKind::Continue => {
                let (scope_depth, region_depth) = {
                    let lp = self
                        .frame()
                        .loops
                        .last()
                        .expect("resolver validated loop context");
                    (lp.scope_depth, lp.region_depth)
                };
                self.emit_exit_unwind(region_depth, Some(scope_depth))?;
                let jump = self.emit(Op::Jump(0));
                self.frame()
                    .loops
                    .last_mut()
                    .expect("loop")
                    .continue_patches
                    .push(jump);
                Ok(())
            }
            StmtKind::Import(_) | StmtKind::ImportRequire { .. } => Ok(()),
            StmtKind::Export(inner) => self.emit_stmt(inner),
            StmtKind::ExportNamed { .. } => Ok(()),
            StmtKind::ExportDefault(expr) => {
                self.emit_expr(expr)?;
                let idx = self.str_const("default");
                self.emit(Op::DefineGlobal {
                    name: idx,
                    mutable: false,
                });
                Ok(())
            }
            StmtKind::Expression(expr) => {
                self.emit_expr(expr)?;
                self.emit(Op::Pop);
                Ok(())
            }
        }
    }

    /// Single-statement bodies get their own scope, exactly as the resolver
    /// scoped them.
    pub(crate) fn emit_stmt_scoped(&mut self, stmt: &Stmt) -> Result<(), Diagnostic> {
        match &stmt.kind {
            StmtKind::Block(_) => self.emit_stmt(stmt),
            _ => {
                self.push_block_scope();
                self.collect_stmt_decls(stmt);
                self.emit_hoisted_functions(std::slice::from_ref(stmt))?;
                self.emit_stmt(stmt)?;
                self.pop_block_scope();
                Ok(())
            }
        }
    }

    pub(crate) fn begin_loop(&mut self) {
        let scope_depth = self.scopes.len();
        let region_depth = self.frames.last().expect("frame").regions.len();
        self.frame().loops.push(LoopCtx {
            break_patches: Vec::new(),
            continue_patches: Vec::new(),
            scope_depth,
            region_depth,
        });
    }

    pub(crate) fn end_loop(&mut self, continue_target: u32) {
        let ctx = self.frame().loops.pop().expect("loop context");
        let break_target = self.here();
        for at in ctx.break_patches {
            self.frame().code[at] = Op::Jump(break_target);
        }
        for at in ctx.continue_patches {
            self.frame().code[at] = Op::Jump(continue_target);
        }
    }

    pub(crate) fn push_region(&mut self, region: RegionKind) {
        self.frame().regions.push(region);
    }

    pub(crate) fn pop_region(&mut self) {
        self.frame().regions.pop().expect("region to pop");
    }

    fn emit_var_decl(&mut self, kind: &VarKind, decl: &VarDecl) -> Result<(), Diagnostic> {
        let mutable = kind.is_mutable();
        match &decl.pattern {
            Pattern::Identifier { name, .. } => {
                match &decl.init {
                    Some(init) => self.emit_expr(init)?,
                    None => {
                        self.emit(Op::Undefined);
                    }
                }
                self.store_declaration(name, mutable, decl.span)
            }
            pattern => {
                let init = decl.init.as_ref().ok_or_else(|| {
                    Diagnostic::emit(
                        "destructuring declaration requires an initializer",
                        decl.span,
                    )
                })?;
                self.emit_expr(init)?;
                if self.at_module_top() {
                    self.emit_destructure_global(pattern, mutable)
                } else {
                    self.emit_destructure(pattern)
                }
            }
        }
    }
}

/// Names a declaration exports.
pub(crate) fn exported_names_of(stmt: &Stmt) -> Vec<String> {
    match &stmt.kind {
        StmtKind::Var { decls, .. } => {
            let mut names = Vec::new();
            for d in decls {
                d.pattern.bound_names(&mut names);
            }
            names
        }
        StmtKind::Function { name, .. } => vec![name.clone()],
        StmtKind::Class(decl) => vec![decl.name.clone()],
        StmtKind::Enum(decl) => vec![decl.name.clone()],
        StmtKind::Namespace(decl) => vec![decl.name.clone()],
        _ => Vec::new(),
    }
}
