//! Capture-set computation for state machines.
//!
//! The capture set of a function is every free identifier it (or any
//! function nested inside it) references that is not bound by its own
//! parameters or local declarations. `this` and `super` references mark the
//! machine as capturing `this`.

use rustc_hash::FxHashSet;
use tsb_parser::ast::*;

pub struct CaptureSet {
    pub names: Vec<String>,
    pub captures_this: bool,
}

pub fn compute_captures(func: &FunctionLit) -> CaptureSet {
    let mut walker = Walker {
        scopes: Vec::new(),
        free: Vec::new(),
        seen: FxHashSet::default(),
        captures_this: false,
    };
    walker.enter_function(func);
    CaptureSet {
        names: walker.free,
        captures_this: walker.captures_this,
    }
}

struct Walker {
    scopes: Vec<FxHashSet<String>>,
    free: Vec<String>,
    seen: FxHashSet<String>,
    captures_this: bool,
}

impl Walker {
    fn enter_function(&mut self, func: &FunctionLit) {
        let mut scope = FxHashSet::default();
        for p in &func.params {
            let mut names = Vec::new();
            p.pattern.bound_names(&mut names);
            scope.extend(names);
        }
        self.scopes.push(scope);
        for p in &func.params {
            if let Some(d) = &p.default {
                self.expr(d);
            }
        }
        self.block(&func.body);
        self.scopes.pop();
    }

    fn declared(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.contains(name))
    }

    fn mark(&mut self, name: &str) {
        if name.starts_with('@') {
            return; // lowering-internal helpers
        }
        if !self.declared(name) && self.seen.insert(name.to_string()) {
            self.free.push(name.to_string());
        }
    }

    /// Declarations hoist within their block for capture purposes.
    fn block(&mut self, stmts: &[Stmt]) {
        let mut scope = FxHashSet::default();
        for s in stmts {
            collect_declared(s, &mut scope);
        }
        self.scopes.push(scope);
        for s in stmts {
            self.stmt(s);
        }
        self.scopes.pop();
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(body) | StmtKind::Sequence(body) => self.block(body),
            StmtKind::Var { decls, .. } => {
                for d in decls {
                    self.pattern_defaults(&d.pattern);
                    if let Some(init) = &d.init {
                        self.expr(init);
                    }
                }
            }
            StmtKind::Function { func, .. } => self.enter_function(func),
            StmtKind::Class(decl) => self.class(decl),
            StmtKind::Enum(decl) => {
                for m in &decl.members {
                    if let Some(init) = &m.init {
                        self.expr(init);
                    }
                }
            }
            StmtKind::Interface(_) | StmtKind::TypeAlias(_) => {}
            StmtKind::Namespace(decl) => self.block(&decl.body),
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond);
                self.stmt(then);
                if let Some(e) = otherwise {
                    self.stmt(e);
                }
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let mut scope = FxHashSet::default();
                if let Some(init) = init {
                    collect_declared(init, &mut scope);
                }
                self.scopes.push(scope);
                if let Some(init) = init {
                    self.stmt(init);
                }
                if let Some(c) = cond {
                    self.expr(c);
                }
                if let Some(u) = update {
                    self.expr(u);
                }
                self.stmt(body);
                self.scopes.pop();
            }
            StmtKind::ForOf {
                pattern,
                iterable,
                body,
                ..
            } => {
                self.expr(iterable);
                let mut scope = FxHashSet::default();
                let mut names = Vec::new();
                pattern.bound_names(&mut names);
                scope.extend(names);
                self.scopes.push(scope);
                self.pattern_defaults(pattern);
                self.stmt(body);
                self.scopes.pop();
            }
            StmtKind::ForIn {
                pattern,
                object,
                body,
                ..
            } => {
                self.expr(object);
                let mut scope = FxHashSet::default();
                let mut names = Vec::new();
                pattern.bound_names(&mut names);
                scope.extend(names);
                self.scopes.push(scope);
                self.stmt(body);
                self.scopes.pop();
            }
            StmtKind::While { cond, body } => {
                self.expr(cond);
                self.stmt(body);
            }
            StmtKind::DoWhile { body, cond } => {
                self.stmt(body);
                self.expr(cond);
            }
            StmtKind::TryCatch {
                try_block,
                catch,
                finally,
            } => {
                self.block(try_block);
                if let Some(clause) = catch {
                    let mut scope = FxHashSet::default();
                    if let Some(p) = &clause.param {
                        let mut names = Vec::new();
                        p.bound_names(&mut names);
                        scope.extend(names);
                    }
                    self.scopes.push(scope);
                    self.block(&clause.body);
                    self.scopes.pop();
                }
                if let Some(fin) = finally {
                    self.block(fin);
                }
            }
            StmtKind::Throw(e) => self.expr(e),
            StmtKind::Return(v) => {
                if let Some(v) = v {
                    self.expr(v);
                }
            }
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Import(_) | StmtKind::ImportRequire { .. } => {}
            StmtKind::Export(inner) => self.stmt(inner),
            StmtKind::ExportNamed { .. } => {}
            StmtKind::ExportDefault(e) => self.expr(e),
            StmtKind::Expression(e) => self.expr(e),
        }
    }

    fn class(&mut self, decl: &ClassDecl) {
        for d in &decl.decorators {
            self.expr(d);
        }
        if let Some(s) = &decl.superclass {
            self.expr(s);
        }
        for member in &decl.members {
            match member {
                ClassMember::Field(f) => {
                    if let PropertyKey::Computed(k) = &f.key {
                        self.expr(k);
                    }
                    if let Some(init) = &f.init {
                        self.expr(init);
                    }
                }
                ClassMember::Method(m) => {
                    if let PropertyKey::Computed(k) = &m.key {
                        self.expr(k);
                    }
                    self.enter_function(&m.func);
                }
            }
        }
    }

    fn pattern_defaults(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Identifier { .. } => {}
            Pattern::Array { elements, rest, .. } => {
                for e in elements.iter().flatten() {
                    self.pattern_defaults(e);
                }
                if let Some(r) = rest {
                    self.pattern_defaults(r);
                }
            }
            Pattern::Object { props, .. } => {
                for p in props {
                    self.pattern_defaults(&p.value);
                }
            }
            Pattern::Default { inner, default, .. } => {
                self.expr(default);
                self.pattern_defaults(inner);
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::ImportMeta | ExprKind::NewTarget => {}
            ExprKind::Variable { name } => self.mark(name),
            ExprKind::This | ExprKind::Super => self.captures_this = true,
            ExprKind::Get { object, .. } => self.expr(object),
            ExprKind::Set { object, value, .. } => {
                self.expr(object);
                self.expr(value);
            }
            ExprKind::GetIndex { object, index, .. } => {
                self.expr(object);
                self.expr(index);
            }
            ExprKind::SetIndex {
                object,
                index,
                value,
            } => {
                self.expr(object);
                self.expr(index);
                self.expr(value);
            }
            ExprKind::GetPrivate { object, .. } => self.expr(object),
            ExprKind::SetPrivate { object, value, .. } => {
                self.expr(object);
                self.expr(value);
            }
            ExprKind::CallPrivate { object, args, .. } => {
                self.expr(object);
                for a in args {
                    self.expr(a);
                }
            }
            ExprKind::Call { callee, args, .. } => {
                self.expr(callee);
                for a in args {
                    self.expr(a);
                }
            }
            ExprKind::New { callee, args, .. } => {
                self.expr(callee);
                for a in args {
                    self.expr(a);
                }
            }
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond);
                self.expr(then);
                self.expr(otherwise);
            }
            ExprKind::Assign { name, value } => {
                self.mark(name);
                self.expr(value);
            }
            ExprKind::CompoundAssign { name, value, .. }
            | ExprKind::LogicalAssign { name, value, .. } => {
                self.mark(name);
                self.expr(value);
            }
            ExprKind::CompoundSet { object, value, .. }
            | ExprKind::LogicalSet { object, value, .. } => {
                self.expr(object);
                self.expr(value);
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
                self.expr(object);
                self.expr(index);
                self.expr(value);
            }
            ExprKind::PrefixIncrement { target, .. }
            | ExprKind::PostfixIncrement { target, .. } => self.expr(target),
            ExprKind::ArrayLiteral { elements } => {
                for e in elements {
                    self.expr(e);
                }
            }
            ExprKind::ObjectLiteral { props } => {
                for p in props {
                    match p {
                        ObjectProperty::KeyValue { key, value } => {
                            if let PropertyKey::Computed(k) = key {
                                self.expr(k);
                            }
                            self.expr(value);
                        }
                        ObjectProperty::Spread(e) => self.expr(e),
                    }
                }
            }
            ExprKind::Spread { expr: e } => self.expr(e),
            ExprKind::ArrowFunction { func } | ExprKind::FunctionExpr { func } => {
                self.enter_function(func);
            }
            ExprKind::ClassExpr { decl } => self.class(decl),
            ExprKind::TemplateLiteral { exprs, .. } => {
                for e in exprs {
                    self.expr(e);
                }
            }
            ExprKind::TaggedTemplate { tag, exprs, .. } => {
                self.expr(tag);
                for e in exprs {
                    self.expr(e);
                }
            }
            ExprKind::DynamicImport { arg } => self.expr(arg),
            ExprKind::Await { expr: e } => self.expr(e),
            ExprKind::Yield { expr: e } => {
                if let Some(e) = e {
                    self.expr(e);
                }
            }
            ExprKind::YieldStar { expr: e } => self.expr(e),
        }
    }
}

fn collect_declared(stmt: &Stmt, scope: &mut FxHashSet<String>) {
    match &stmt.kind {
        StmtKind::Var { decls, .. } => {
            for d in decls {
                let mut names = Vec::new();
                d.pattern.bound_names(&mut names);
                scope.extend(names);
            }
        }
        StmtKind::Function { name, .. } => {
            scope.insert(name.clone());
        }
        StmtKind::Class(decl) => {
            scope.insert(decl.name.clone());
        }
        StmtKind::Enum(decl) => {
            scope.insert(decl.name.clone());
        }
        StmtKind::Namespace(decl) => {
            scope.insert(decl.name.clone());
        }
        StmtKind::Export(inner) => collect_declared(inner, scope),
        _ => {}
    }
}
