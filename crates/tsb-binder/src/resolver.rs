//! The resolver walk.

use rustc_hash::FxHashMap;
use tracing::trace;
use tsb_common::{Diagnostic, Span};
use tsb_parser::ast::*;

/// Output of resolution: node id → scope hops (0 = innermost).
///
/// Absence means the name is looked up through module bindings at runtime.
#[derive(Clone, Debug, Default)]
pub struct ResolveMap {
    distances: FxHashMap<NodeId, u16>,
}

impl ResolveMap {
    pub fn distance(&self, id: NodeId) -> Option<u16> {
        self.distances.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FunctionKind {
    None,
    Function,
    Arrow,
    Method,
    Initializer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ClassKind {
    None,
    Class,
    Subclass,
}

#[derive(Clone, Copy, Debug)]
struct Binding {
    defined: bool,
    mutable: bool,
}

pub struct Resolver {
    scopes: Vec<FxHashMap<String, Binding>>,
    map: ResolveMap,
    function: FunctionKind,
    class: ClassKind,
    loop_depth: u32,
    in_async: bool,
    in_generator: bool,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver {
            scopes: Vec::new(),
            map: ResolveMap::default(),
            function: FunctionKind::None,
            class: ClassKind::None,
            loop_depth: 0,
            in_async: false,
            in_generator: false,
        }
    }

    /// Resolve a module body. Top-level bindings are module globals and get
    /// no distance entries.
    pub fn resolve_module(mut self, body: &[Stmt]) -> Result<ResolveMap, Diagnostic> {
        self.resolve_stmts(body)?;
        trace!(resolved = self.map.len(), "module resolution complete");
        Ok(self.map)
    }

    // ---- scope helpers ----

    fn begin_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, mutable: bool, span: Span) -> Result<(), Diagnostic> {
        let Some(scope) = self.scopes.last_mut() else {
            return Ok(()); // module global
        };
        if scope.contains_key(name) {
            return Err(Diagnostic::resolve(
                format!("duplicate declaration of '{name}' in the same scope"),
                span,
            ));
        }
        scope.insert(
            name.to_string(),
            Binding {
                defined: false,
                mutable,
            },
        );
        Ok(())
    }

    fn define(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            if let Some(b) = scope.get_mut(name) {
                b.defined = true;
            }
        }
    }

    fn declare_and_define(&mut self, name: &str, mutable: bool, span: Span) -> Result<(), Diagnostic> {
        self.declare(name, mutable, span)?;
        self.define(name);
        Ok(())
    }

    /// Record the distance for a read of `name` at node `id`.
    fn resolve_read(&mut self, id: NodeId, name: &str, span: Span) -> Result<(), Diagnostic> {
        for (hops, scope) in self.scopes.iter().rev().enumerate() {
            if let Some(binding) = scope.get(name) {
                if !binding.defined && hops == 0 {
                    return Err(Diagnostic::resolve(
                        format!("cannot read '{name}' before it is initialized"),
                        span,
                    ));
                }
                self.map.distances.insert(id, hops as u16);
                return Ok(());
            }
        }
        Ok(()) // module-level or builtin; resolved at runtime
    }

    /// Record the distance for a write, checking mutability.
    fn resolve_write(&mut self, id: NodeId, name: &str, span: Span) -> Result<(), Diagnostic> {
        for (hops, scope) in self.scopes.iter().rev().enumerate() {
            if let Some(binding) = scope.get(name) {
                if !binding.mutable && binding.defined {
                    return Err(Diagnostic::resolve(
                        format!("cannot assign to constant '{name}'"),
                        span,
                    ));
                }
                self.map.distances.insert(id, hops as u16);
                return Ok(());
            }
        }
        Ok(())
    }

    fn declare_pattern(&mut self, pattern: &Pattern, mutable: bool) -> Result<(), Diagnostic> {
        let mut names = Vec::new();
        pattern.bound_names(&mut names);
        for name in names {
            self.declare(&name, mutable, pattern.span())?;
        }
        Ok(())
    }

    fn define_pattern(&mut self, pattern: &Pattern) {
        let mut names = Vec::new();
        pattern.bound_names(&mut names);
        for name in names {
            self.define(&name);
        }
    }

    /// Resolve default-value expressions nested in a pattern.
    fn resolve_pattern_defaults(&mut self, pattern: &Pattern) -> Result<(), Diagnostic> {
        match pattern {
            Pattern::Identifier { .. } => Ok(()),
            Pattern::Array { elements, rest, .. } => {
                for e in elements.iter().flatten() {
                    self.resolve_pattern_defaults(e)?;
                }
                if let Some(r) = rest {
                    self.resolve_pattern_defaults(r)?;
                }
                Ok(())
            }
            Pattern::Object { props, .. } => {
                for p in props {
                    self.resolve_pattern_defaults(&p.value)?;
                }
                Ok(())
            }
            Pattern::Default { inner, default, .. } => {
                self.resolve_expr(default)?;
                self.resolve_pattern_defaults(inner)
            }
        }
    }

    // ---- statements ----

    fn resolve_stmts(&mut self, stmts: &[Stmt]) -> Result<(), Diagnostic> {
        // Function declarations hoist: declare the names first, resolve the
        // bodies after the surrounding statements so forward references to
        // later `let`/`const` bindings in this block resolve correctly.
        for stmt in stmts {
            if let StmtKind::Function { name, .. } = &stmt.kind {
                self.declare_and_define(name, false, stmt.span)?;
            }
            if let StmtKind::Export(inner) = &stmt.kind {
                if let StmtKind::Function { name, .. } = &inner.kind {
                    self.declare_and_define(name, false, inner.span)?;
                }
            }
        }
        let mut deferred: Vec<&FunctionLit> = Vec::new();
        for stmt in stmts {
            self.resolve_stmt(stmt, &mut deferred)?;
        }
        for func in deferred {
            self.resolve_function(func, FunctionKind::Function)?;
        }
        Ok(())
    }

    fn resolve_stmt<'a>(
        &mut self,
        stmt: &'a Stmt,
        deferred: &mut Vec<&'a FunctionLit>,
    ) -> Result<(), Diagnostic> {
        match &stmt.kind {
            StmtKind::Block(body) => {
                self.begin_scope();
                self.resolve_stmts(body)?;
                self.end_scope();
                Ok(())
            }
            StmtKind::Sequence(body) => {
                for s in body {
                    let mut inner = Vec::new();
                    self.resolve_stmt(s, &mut inner)?;
                    for f in inner {
                        self.resolve_function(f, FunctionKind::Function)?;
                    }
                }
                Ok(())
            }
            StmtKind::Var { kind, decls } => {
                for decl in decls {
                    self.declare_pattern(&decl.pattern, kind.is_mutable())?;
                    self.resolve_pattern_defaults(&decl.pattern)?;
                    if let Some(init) = &decl.init {
                        self.resolve_expr(init)?;
                    }
                    self.define_pattern(&decl.pattern);
                }
                Ok(())
            }
            StmtKind::Function { func, .. } => {
                // Name was hoisted in resolve_stmts.
                deferred.push(func);
                Ok(())
            }
            StmtKind::Class(decl) => {
                if !decl.name.is_empty() {
                    self.declare_and_define(&decl.name, false, stmt.span)?;
                }
                self.resolve_class(decl)
            }
            StmtKind::Enum(decl) => {
                self.declare_and_define(&decl.name, false, stmt.span)?;
                for member in &decl.members {
                    if let Some(init) = &member.init {
                        self.resolve_expr(init)?;
                    }
                }
                Ok(())
            }
            StmtKind::Interface(_) | StmtKind::TypeAlias(_) => Ok(()),
            StmtKind::Namespace(decl) => {
                self.declare_and_define(&decl.name, false, stmt.span)?;
                self.begin_scope();
                self.resolve_stmts(&decl.body)?;
                self.end_scope();
                Ok(())
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.resolve_expr(cond)?;
                self.resolve_stmt_scoped(then)?;
                if let Some(e) = otherwise {
                    self.resolve_stmt_scoped(e)?;
                }
                Ok(())
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                self.begin_scope();
                if let Some(init) = init {
                    let mut inner = Vec::new();
                    self.resolve_stmt(init, &mut inner)?;
                    for f in inner {
                        self.resolve_function(f, FunctionKind::Function)?;
                    }
                }
                if let Some(cond) = cond {
                    self.resolve_expr(cond)?;
                }
                if let Some(update) = update {
                    self.resolve_expr(update)?;
                }
                self.loop_depth += 1;
                self.resolve_stmt_scoped(body)?;
                self.loop_depth -= 1;
                self.end_scope();
                Ok(())
            }
            StmtKind::ForOf {
                pattern,
                iterable,
                body,
                ..
            } => {
                // The iterable is evaluated in the enclosing scope.
                self.resolve_expr(iterable)?;
                self.begin_scope();
                self.declare_pattern(pattern, true)?;
                self.resolve_pattern_defaults(pattern)?;
                self.define_pattern(pattern);
                self.loop_depth += 1;
                self.resolve_stmt_scoped(body)?;
                self.loop_depth -= 1;
                self.end_scope();
                Ok(())
            }
            StmtKind::ForIn {
                pattern,
                object,
                body,
                ..
            } => {
                self.resolve_expr(object)?;
                self.begin_scope();
                self.declare_pattern(pattern, true)?;
                self.define_pattern(pattern);
                self.loop_depth += 1;
                self.resolve_stmt_scoped(body)?;
                self.loop_depth -= 1;
                self.end_scope();
                Ok(())
            }
            StmtKind::While { cond, body } => {
                self.resolve_expr(cond)?;
                self.loop_depth += 1;
                self.resolve_stmt_scoped(body)?;
                self.loop_depth -= 1;
                Ok(())
            }
            StmtKind::DoWhile { body, cond } => {
                self.loop_depth += 1;
                self.resolve_stmt_scoped(body)?;
                self.loop_depth -= 1;
                self.resolve_expr(cond)
            }
            StmtKind::TryCatch {
                try_block,
                catch,
                finally,
            } => {
                self.begin_scope();
                self.resolve_stmts(try_block)?;
                self.end_scope();
                if let Some(clause) = catch {
                    self.begin_scope();
                    if let Some(param) = &clause.param {
                        self.declare_pattern(param, true)?;
                        self.define_pattern(param);
                    }
                    self.resolve_stmts(&clause.body)?;
                    self.end_scope();
                }
                if let Some(fin) = finally {
                    self.begin_scope();
                    self.resolve_stmts(fin)?;
                    self.end_scope();
                }
                Ok(())
            }
            StmtKind::Throw(expr) => self.resolve_expr(expr),
            StmtKind::Return(value) => {
                if self.function == FunctionKind::None {
                    return Err(Diagnostic::resolve(
                        "'return' outside of a function",
                        stmt.span,
                    ));
                }
                if let Some(v) = value {
                    if self.function == FunctionKind::Initializer {
                        return Err(Diagnostic::resolve(
                            "cannot return a value from a constructor",
                            stmt.span,
                        ));
                    }
                    self.resolve_expr(v)?;
                }
                Ok(())
            }
            StmtKind::Break | StmtKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(Diagnostic::resolve(
                        "'break' or 'continue' outside of a loop",
                        stmt.span,
                    ));
                }
                Ok(())
            }
            StmtKind::Import(spec) => {
                // Imported names are module bindings; no scope entries, but a
                // duplicate with a local declaration would be caught by the
                // checker. Nothing to resolve here.
                let _ = spec;
                Ok(())
            }
            StmtKind::ImportRequire { .. } => Ok(()),
            StmtKind::Export(inner) => {
                if matches!(inner.kind, StmtKind::Function { .. }) {
                    // Name already hoisted; resolve the body deferred.
                    if let StmtKind::Function { func, .. } = &inner.kind {
                        deferred.push(func);
                    }
                    Ok(())
                } else {
                    let mut inner_deferred = Vec::new();
                    self.resolve_stmt(inner, &mut inner_deferred)?;
                    for f in inner_deferred {
                        self.resolve_function(f, FunctionKind::Function)?;
                    }
                    Ok(())
                }
            }
            StmtKind::ExportNamed { .. } => Ok(()),
            StmtKind::ExportDefault(expr) => self.resolve_expr(expr),
            StmtKind::Expression(expr) => self.resolve_expr(expr),
        }
    }

    /// Loop/if bodies that are single statements still get their own scope.
    fn resolve_stmt_scoped(&mut self, stmt: &Stmt) -> Result<(), Diagnostic> {
        match &stmt.kind {
            StmtKind::Block(body) => {
                self.begin_scope();
                self.resolve_stmts(body)?;
                self.end_scope();
                Ok(())
            }
            _ => {
                self.begin_scope();
                let mut deferred = Vec::new();
                self.resolve_stmt(stmt, &mut deferred)?;
                for f in deferred {
                    self.resolve_function(f, FunctionKind::Function)?;
                }
                self.end_scope();
                Ok(())
            }
        }
    }

    fn resolve_function(&mut self, func: &FunctionLit, kind: FunctionKind) -> Result<(), Diagnostic> {
        let enclosing_fn = self.function;
        let enclosing_async = self.in_async;
        let enclosing_gen = self.in_generator;
        self.function = kind;
        if func.is_arrow() {
            // Arrows inherit async-ness visibility for `await` checking only
            // through their own flag; `this` passes through untouched.
            self.in_async = func.is_async();
            self.in_generator = false;
        } else {
            self.in_async = func.is_async();
            self.in_generator = func.is_generator();
        }

        let enclosing_loops = self.loop_depth;
        self.loop_depth = 0;

        self.begin_scope();
        for param in &func.params {
            self.declare_pattern(&param.pattern, true)?;
            if let Some(default) = &param.default {
                self.resolve_expr(default)?;
            }
            self.resolve_pattern_defaults(&param.pattern)?;
            self.define_pattern(&param.pattern);
        }
        self.resolve_stmts(&func.body)?;
        self.end_scope();

        self.loop_depth = enclosing_loops;
        self.function = enclosing_fn;
        self.in_async = enclosing_async;
        self.in_generator = enclosing_gen;
        Ok(())
    }

    fn resolve_class(&mut self, decl: &ClassDecl) -> Result<(), Diagnostic> {
        // Decorator expressions evaluate in the scope enclosing the class.
        for d in &decl.decorators {
            self.resolve_expr(d)?;
        }
        for member in &decl.members {
            let decorators = match member {
                ClassMember::Field(f) => &f.decorators,
                ClassMember::Method(m) => &m.decorators,
            };
            for d in decorators {
                self.resolve_expr(d)?;
            }
        }
        let enclosing_class = self.class;
        self.class = ClassKind::Class;

        if let Some(superclass) = &decl.superclass {
            self.resolve_expr(superclass)?;
            self.class = ClassKind::Subclass;
            self.begin_scope();
            self.declare_and_define("super", false, decl.span)?;
        }

        self.begin_scope();
        self.declare_and_define("this", false, decl.span)?;

        for member in &decl.members {
            match member {
                ClassMember::Field(field) => {
                    if let PropertyKey::Computed(key) = &field.key {
                        self.resolve_expr(key)?;
                    }
                    if let Some(init) = &field.init {
                        // Field initializers run as a synthesized method, so
                        // they get a function-like scope of their own.
                        let enclosing = self.function;
                        self.function = FunctionKind::Method;
                        self.begin_scope();
                        self.resolve_expr(init)?;
                        self.end_scope();
                        self.function = enclosing;
                    }
                }
                ClassMember::Method(method) => {
                    if let PropertyKey::Computed(key) = &method.key {
                        self.resolve_expr(key)?;
                    }
                    let kind = if method.kind == MethodKind::Constructor {
                        FunctionKind::Initializer
                    } else {
                        FunctionKind::Method
                    };
                    self.resolve_function(&method.func, kind)?;
                }
            }
        }

        self.end_scope();
        if decl.superclass.is_some() {
            self.end_scope();
        }
        self.class = enclosing_class;
        Ok(())
    }

    // ---- expressions ----

    fn resolve_expr(&mut self, expr: &Expr) -> Result<(), Diagnostic> {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::ImportMeta | ExprKind::NewTarget => Ok(()),
            ExprKind::Variable { name } => self.resolve_read(expr.id, name, expr.span),
            ExprKind::This => {
                if self.class == ClassKind::None && self.function == FunctionKind::None {
                    return Err(Diagnostic::resolve(
                        "'this' outside of a class or function",
                        expr.span,
                    ));
                }
                self.resolve_read(expr.id, "this", expr.span)
            }
            ExprKind::Super => {
                if self.class != ClassKind::Subclass {
                    return Err(Diagnostic::resolve(
                        "'super' requires an enclosing class with a superclass",
                        expr.span,
                    ));
                }
                self.resolve_read(expr.id, "super", expr.span)
            }
            ExprKind::Get { object, .. } => self.resolve_expr(object),
            ExprKind::Set { object, value, .. } => {
                self.resolve_expr(object)?;
                self.resolve_expr(value)
            }
            ExprKind::GetIndex { object, index, .. } => {
                self.resolve_expr(object)?;
                self.resolve_expr(index)
            }
            ExprKind::SetIndex {
                object,
                index,
                value,
            } => {
                self.resolve_expr(object)?;
                self.resolve_expr(index)?;
                self.resolve_expr(value)
            }
            ExprKind::GetPrivate { object, .. } => self.resolve_expr(object),
            ExprKind::SetPrivate { object, value, .. } => {
                self.resolve_expr(object)?;
                self.resolve_expr(value)
            }
            ExprKind::CallPrivate { object, args, .. } => {
                self.resolve_expr(object)?;
                for a in args {
                    self.resolve_expr(a)?;
                }
                Ok(())
            }
            ExprKind::Call { callee, args, .. } => {
                self.resolve_expr(callee)?;
                for a in args {
                    self.resolve_expr(a)?;
                }
                Ok(())
            }
            ExprKind::New { callee, args, .. } => {
                self.resolve_expr(callee)?;
                for a in args {
                    self.resolve_expr(a)?;
                }
                Ok(())
            }
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)
            }
            ExprKind::Unary { operand, .. } => self.resolve_expr(operand),
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                self.resolve_expr(cond)?;
                self.resolve_expr(then)?;
                self.resolve_expr(otherwise)
            }
            ExprKind::Assign { name, value } => {
                self.resolve_expr(value)?;
                self.resolve_write(expr.id, name, expr.span)
            }
            ExprKind::CompoundAssign { name, value, .. }
            | ExprKind::LogicalAssign { name, value, .. } => {
                self.resolve_expr(value)?;
                self.resolve_write(expr.id, name, expr.span)
            }
            ExprKind::CompoundSet { object, value, .. }
            | ExprKind::LogicalSet { object, value, .. } => {
                self.resolve_expr(object)?;
                self.resolve_expr(value)
            }
            ExprKind::CompoundSetIndex {
                object,
                index,
                value,
                ..
            }
            | ExprKind::LogicalSetIndex {
                object,
                index,
                value,
                ..
            } => {
                self.resolve_expr(object)?;
                self.resolve_expr(index)?;
                self.resolve_expr(value)
            }
            ExprKind::PrefixIncrement { target, .. }
            | ExprKind::PostfixIncrement { target, .. } => {
                if let ExprKind::Variable { name } = &target.kind {
                    self.resolve_write(target.id, name, target.span)
                } else {
                    self.resolve_expr(target)
                }
            }
            ExprKind::ArrayLiteral { elements } => {
                for e in elements {
                    self.resolve_expr(e)?;
                }
                Ok(())
            }
            ExprKind::ObjectLiteral { props } => {
                for p in props {
                    match p {
                        ObjectProperty::KeyValue { key, value } => {
                            if let PropertyKey::Computed(k) = key {
                                self.resolve_expr(k)?;
                            }
                            self.resolve_expr(value)?;
                        }
                        ObjectProperty::Spread(e) => self.resolve_expr(e)?,
                    }
                }
                Ok(())
            }
            ExprKind::Spread { expr: inner } => self.resolve_expr(inner),
            ExprKind::ArrowFunction { func } => self.resolve_function(func, FunctionKind::Arrow),
            ExprKind::FunctionExpr { func } => {
                self.resolve_function(func, FunctionKind::Function)
            }
            ExprKind::ClassExpr { decl } => self.resolve_class(decl),
            ExprKind::TemplateLiteral { exprs, .. } => {
                for e in exprs {
                    self.resolve_expr(e)?;
                }
                Ok(())
            }
            ExprKind::TaggedTemplate { tag, exprs, .. } => {
                self.resolve_expr(tag)?;
                for e in exprs {
                    self.resolve_expr(e)?;
                }
                Ok(())
            }
            ExprKind::DynamicImport { arg } => self.resolve_expr(arg),
            ExprKind::Await { expr: inner } => {
                if !self.in_async {
                    return Err(Diagnostic::resolve(
                        "'await' is only allowed inside async functions",
                        expr.span,
                    ));
                }
                self.resolve_expr(inner)
            }
            ExprKind::Yield { expr: inner } => {
                if !self.in_generator {
                    return Err(Diagnostic::resolve(
                        "'yield' is only allowed inside generator functions",
                        expr.span,
                    ));
                }
                if let Some(e) = inner {
                    self.resolve_expr(e)?;
                }
                Ok(())
            }
            ExprKind::YieldStar { expr: inner } => {
                if !self.in_generator {
                    return Err(Diagnostic::resolve(
                        "'yield*' is only allowed inside generator functions",
                        expr.span,
                    ));
                }
                self.resolve_expr(inner)
            }
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod tests;
