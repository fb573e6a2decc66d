//! The checking walk: declaration hoisting, imports, statements,
//! expressions.
//!
//! Checking is deliberately lenient where the subset leaves types open
//! (`any` flows freely, unknown globals resolve to `any`); it is strict
//! about what it knows: members of declared classes/interfaces/enums,
//! access modifiers, readonly, assignability of annotated bindings, and
//! callable arity.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::debug;
use tsb_common::{Diagnostic, Span};
use tsb_parser::ast::*;

use crate::compat::is_compatible;
use crate::context::{CheckerContext, ModuleExports, TypeBinding};
use crate::members::{self, AccessCtx, Resolved, WriteResolved};
use crate::types::{
    ClassData, ClassId, EnumConst, EnumData, FunctionType, InterfaceData, InterfaceMemberDef,
    MemberDef, NamespaceData, TypeInfo, substitute, substitute_fn,
};

pub struct Checker<'a> {
    ctx: &'a mut CheckerContext,
    /// Value scopes; index 0 is the module scope.
    values: Vec<FxHashMap<String, TypeInfo>>,
    /// Type-name scopes; index 0 is the module scope.
    types: Vec<FxHashMap<String, TypeBinding>>,
    enclosing_class: Option<ClassId>,
    in_ctor: bool,
    return_types: Vec<TypeInfo>,
    exports: ModuleExports,
}

impl<'a> Checker<'a> {
    /// Check one module. `dep_paths` maps each import specifier appearing in
    /// this module to the canonical path of the dep (empty string for
    /// builtin modules). On success the module's exports are recorded on the
    /// context.
    pub fn check_module(
        ctx: &'a mut CheckerContext,
        path: &str,
        ast: &[Stmt],
        dep_paths: &FxHashMap<String, String>,
    ) -> Result<(), Diagnostic> {
        debug!(module = path, "type checking");
        let mut checker = Checker {
            ctx,
            values: vec![FxHashMap::default()],
            types: vec![FxHashMap::default()],
            enclosing_class: None,
            in_ctor: false,
            return_types: Vec::new(),
            exports: ModuleExports::default(),
        };
        checker
            .run(ast, dep_paths)
            .map_err(|d| d.with_file(path))?;
        let exports = std::mem::take(&mut checker.exports);
        checker
            .ctx
            .module_exports
            .insert(path.to_string(), exports);
        Ok(())
    }

    fn run(&mut self, ast: &[Stmt], dep_paths: &FxHashMap<String, String>) -> Result<(), Diagnostic> {
        self.bind_imports(ast, dep_paths)?;
        self.hoist_declarations(ast, "")?;
        for stmt in ast {
            self.check_stmt(stmt)?;
        }
        self.collect_exports(ast, dep_paths)?;
        Ok(())
    }

    // =========================================================================
    // Imports and exports
    // =========================================================================

    fn bind_imports(
        &mut self,
        ast: &[Stmt],
        dep_paths: &FxHashMap<String, String>,
    ) -> Result<(), Diagnostic> {
        for stmt in ast {
            match &stmt.kind {
                StmtKind::Import(spec) => {
                    let dep = dep_paths.get(&spec.specifier).cloned().unwrap_or_default();
                    let exports = self.ctx.module_exports.get(&dep).cloned();
                    if let Some(ns) = &spec.namespace {
                        let ty = match &exports {
                            Some(e) => TypeInfo::Record(
                                e.values
                                    .iter()
                                    .map(|(k, v)| (k.clone(), v.clone()))
                                    .collect(),
                            ),
                            None => TypeInfo::Any,
                        };
                        self.values[0].insert(ns.clone(), ty);
                    }
                    if let Some(default) = &spec.default {
                        let ty = exports
                            .as_ref()
                            .and_then(|e| e.values.get("default").cloned())
                            .unwrap_or(TypeInfo::Any);
                        self.values[0].insert(default.clone(), ty);
                    }
                    for (name, alias) in &spec.named {
                        let local = alias.as_ref().unwrap_or(name);
                        match &exports {
                            Some(e) => {
                                let mut found = false;
                                if let Some(ty) = e.values.get(name) {
                                    self.values[0].insert(local.clone(), ty.clone());
                                    found = true;
                                }
                                if let Some(binding) = e.types.get(name) {
                                    self.types[0].insert(local.clone(), binding.clone());
                                    found = true;
                                }
                                if !found {
                                    return Err(Diagnostic::type_error(
                                        format!(
                                            "module '{}' has no export named '{name}'",
                                            spec.specifier
                                        ),
                                        spec.span,
                                    ));
                                }
                            }
                            None => {
                                // Builtin module: values are runtime-provided.
                                self.values[0].insert(local.clone(), TypeInfo::Any);
                            }
                        }
                    }
                }
                StmtKind::ImportRequire { name, .. } => {
                    self.values[0].insert(name.clone(), TypeInfo::Any);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn collect_exports(
        &mut self,
        ast: &[Stmt],
        dep_paths: &FxHashMap<String, String>,
    ) -> Result<(), Diagnostic> {
        for stmt in ast {
            match &stmt.kind {
                StmtKind::Export(inner) => {
                    for name in declared_names(inner) {
                        if let Some(ty) = self.lookup_value(&name) {
                            self.exports.values.insert(name.clone(), ty);
                        }
                        if let Some(binding) = self.types[0].get(&name) {
                            self.exports.types.insert(name.clone(), binding.clone());
                        }
                    }
                }
                StmtKind::ExportNamed { names, from } => {
                    let dep_exports = from.as_ref().and_then(|spec| {
                        let dep = dep_paths.get(spec).cloned().unwrap_or_default();
                        self.ctx.module_exports.get(&dep).cloned()
                    });
                    for (name, alias) in names {
                        let exported = alias.as_ref().unwrap_or(name);
                        match &dep_exports {
                            Some(e) => {
                                if let Some(ty) = e.values.get(name) {
                                    self.exports.values.insert(exported.clone(), ty.clone());
                                }
                                if let Some(b) = e.types.get(name) {
                                    self.exports.types.insert(exported.clone(), b.clone());
                                }
                            }
                            None => {
                                if let Some(ty) = self.lookup_value(name) {
                                    self.exports.values.insert(exported.clone(), ty);
                                }
                                if let Some(b) = self.types[0].get(name) {
                                    self.exports.types.insert(exported.clone(), b.clone());
                                }
                            }
                        }
                    }
                }
                StmtKind::ExportDefault(expr) => {
                    let ty = self.infer_expr(expr)?;
                    self.exports.values.insert("default".to_string(), ty);
                }
                _ => {}
            }
        }
        Ok(())
    }

    // =========================================================================
    // Declaration hoisting
    // =========================================================================

    /// Register classes/interfaces/enums/aliases/namespaces and function
    /// signatures before bodies are checked. `prefix` is the namespace path
    /// ("" at module level).
    fn hoist_declarations(&mut self, stmts: &[Stmt], prefix: &str) -> Result<(), Diagnostic> {
        // Shells first so members can reference each other.
        for stmt in stmts {
            let inner = unwrap_export(stmt);
            match &inner.kind {
                StmtKind::Class(decl) => {
                    let id = self.ctx.add_class(ClassData {
                        name: decl.name.clone(),
                        type_params: decl.type_params.clone(),
                        ..Default::default()
                    });
                    self.register_type(prefix, &decl.name, TypeBinding::Class(id));
                    self.values[0].insert(decl.name.clone(), TypeInfo::Class(id));
                }
                StmtKind::Interface(decl) => {
                    let id = self.ctx.add_interface(InterfaceData {
                        name: decl.name.clone(),
                        type_params: decl.type_params.clone(),
                        ..Default::default()
                    });
                    self.register_type(prefix, &decl.name, TypeBinding::Interface(id));
                }
                StmtKind::Enum(decl) => {
                    let data = self.evaluate_enum(decl)?;
                    let id = self.ctx.add_enum(data);
                    self.register_type(prefix, &decl.name, TypeBinding::Enum(id));
                    self.values[0].insert(decl.name.clone(), TypeInfo::Enum(id));
                }
                StmtKind::Namespace(decl) => {
                    let id = self.ctx.add_namespace(NamespaceData {
                        name: decl.name.clone(),
                        ..Default::default()
                    });
                    self.register_type(prefix, &decl.name, TypeBinding::Namespace(id));
                    self.values[0].insert(decl.name.clone(), TypeInfo::Namespace(id));
                    let nested_prefix = join_path(prefix, &decl.name);
                    self.hoist_declarations(&decl.body, &nested_prefix)?;
                    // Exported namespace values land on the namespace data.
                    let mut members = IndexMap::new();
                    for s in &decl.body {
                        if let StmtKind::Export(exported) = &s.kind {
                            for name in declared_names(exported) {
                                let ty = self.preview_declared_type(exported, &name)?;
                                members.insert(name, ty);
                            }
                        }
                    }
                    self.ctx.namespaces[id].members = members;
                }
                _ => {}
            }
        }
        // Aliases, then member signatures (may reference any shell).
        for stmt in stmts {
            let inner = unwrap_export(stmt);
            match &inner.kind {
                StmtKind::TypeAlias(decl) => {
                    self.push_type_params(&decl.type_params);
                    let ty = self.resolve_type(&decl.ty)?;
                    self.pop_type_params(&decl.type_params);
                    self.register_type(
                        prefix,
                        &decl.name,
                        TypeBinding::Alias {
                            params: decl.type_params.clone(),
                            ty,
                        },
                    );
                }
                StmtKind::Interface(decl) => {
                    let TypeBinding::Interface(id) =
                        self.lookup_type(&join_path(prefix, &decl.name)).expect("hoisted")
                    else {
                        unreachable!("interface shell registered above");
                    };
                    self.push_type_params(&decl.type_params);
                    let mut extends = Vec::new();
                    for base in &decl.extends {
                        extends.push(self.resolve_type(base)?);
                    }
                    let mut members = IndexMap::new();
                    for m in &decl.members {
                        members.insert(
                            m.name.clone(),
                            InterfaceMemberDef {
                                ty: self.resolve_type(&m.ty)?,
                                optional: m.optional,
                                readonly: m.readonly,
                            },
                        );
                    }
                    self.pop_type_params(&decl.type_params);
                    self.ctx.interfaces[id].extends = extends;
                    self.ctx.interfaces[id].members = members;
                }
                StmtKind::Class(decl) => {
                    let TypeBinding::Class(id) =
                        self.lookup_type(&join_path(prefix, &decl.name)).expect("hoisted")
                    else {
                        unreachable!("class shell registered above");
                    };
                    self.fill_class_members(id, decl)?;
                }
                StmtKind::Function { name, func } => {
                    let ty = self.function_type_of(func)?;
                    self.values[0].insert(name.clone(), ty);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn register_type(&mut self, prefix: &str, name: &str, binding: TypeBinding) {
        self.types[0].insert(join_path(prefix, name), binding);
    }

    fn lookup_type(&self, name: &str) -> Option<TypeBinding> {
        for scope in self.types.iter().rev() {
            if let Some(b) = scope.get(name) {
                return Some(b.clone());
            }
        }
        None
    }

    /// The type a declaration would bind for `name`, used to type namespace
    /// exports before their bodies are checked.
    fn preview_declared_type(&mut self, stmt: &Stmt, name: &str) -> Result<TypeInfo, Diagnostic> {
        match &stmt.kind {
            StmtKind::Function { func, .. } => self.function_type_of(func),
            StmtKind::Class(_) | StmtKind::Enum(_) => {
                Ok(self.values[0].get(name).cloned().unwrap_or(TypeInfo::Any))
            }
            StmtKind::Var { decls, .. } => {
                for d in decls {
                    let mut names = Vec::new();
                    d.pattern.bound_names(&mut names);
                    if names.iter().any(|n| n == name) {
                        if let Some(ann) = &d.type_ann {
                            return self.resolve_type(ann);
                        }
                        return Ok(TypeInfo::Any);
                    }
                }
                Ok(TypeInfo::Any)
            }
            _ => Ok(TypeInfo::Any),
        }
    }

    fn evaluate_enum(&mut self, decl: &EnumDecl) -> Result<EnumData, Diagnostic> {
        let mut members = IndexMap::new();
        let mut next_auto = 0.0f64;
        for member in &decl.members {
            let value = match &member.init {
                None => {
                    let v = EnumConst::Num(next_auto);
                    next_auto += 1.0;
                    v
                }
                Some(expr) => match enum_const_of(expr) {
                    Some(EnumConst::Num(n)) => {
                        next_auto = n + 1.0;
                        EnumConst::Num(n)
                    }
                    Some(s) => s,
                    None => {
                        return Err(Diagnostic::type_error(
                            format!(
                                "initializer of enum member '{}.{}' must be a number or string literal",
                                decl.name, member.name
                            ),
                            member.span,
                        ));
                    }
                },
            };
            members.insert(member.name.clone(), value);
        }
        Ok(EnumData {
            name: decl.name.clone(),
            members,
        })
    }

    fn fill_class_members(&mut self, id: ClassId, decl: &ClassDecl) -> Result<(), Diagnostic> {
        self.push_type_params(&decl.type_params);

        if let Some(superclass) = &decl.superclass {
            let super_ty = self.infer_expr(superclass)?;
            match super_ty {
                TypeInfo::Class(super_id) => {
                    let mut args = Vec::new();
                    for a in &decl.super_type_args {
                        args.push(self.resolve_type(a)?);
                    }
                    self.ctx.classes[id].superclass = Some((super_id, args));
                }
                TypeInfo::Any => {}
                other => {
                    return Err(Diagnostic::type_error(
                        format!(
                            "superclass of '{}' must be a class, found '{}'",
                            decl.name,
                            self.ctx.display_type(&other)
                        ),
                        superclass.span,
                    ));
                }
            }
        }

        let mut fields = IndexMap::new();
        let mut methods = IndexMap::new();
        let mut getters = IndexMap::new();
        let mut setters = IndexMap::new();
        let mut statics = IndexMap::new();
        let mut ctor = None;

        for member in &decl.members {
            match member {
                ClassMember::Field(field) => {
                    let Some(name) = field.key.static_name() else {
                        continue; // computed keys are dynamic properties
                    };
                    let key = if field.is_private_name {
                        format!("#{name}")
                    } else {
                        name
                    };
                    let ty = match &field.type_ann {
                        Some(ann) => self.resolve_type(ann)?,
                        None => field
                            .init
                            .as_ref()
                            .and_then(literal_type_of)
                            .unwrap_or(TypeInfo::Any),
                    };
                    let def = MemberDef {
                        ty,
                        access: if field.is_private_name {
                            Access::Private
                        } else {
                            field.access
                        },
                        readonly: field.readonly,
                        declaring: id,
                    };
                    if field.is_static {
                        statics.insert(key, def);
                    } else {
                        fields.insert(key, def);
                    }
                }
                ClassMember::Method(method) => {
                    let Some(name) = method.key.static_name() else {
                        continue;
                    };
                    let key = if method.is_private_name {
                        format!("#{name}")
                    } else {
                        name
                    };
                    let fty = self.function_type_of(&method.func)?;
                    let def = MemberDef {
                        ty: fty.clone(),
                        access: if method.is_private_name {
                            Access::Private
                        } else {
                            method.access
                        },
                        readonly: false,
                        declaring: id,
                    };
                    match method.kind {
                        MethodKind::Constructor => {
                            if let TypeInfo::Function(f) = fty {
                                ctor = Some(*f);
                            }
                        }
                        MethodKind::Getter => {
                            getters.insert(key, def);
                        }
                        MethodKind::Setter => {
                            setters.insert(key, def);
                        }
                        MethodKind::Method => {
                            if method.is_static {
                                statics.insert(key, def);
                            } else {
                                methods.insert(key, def);
                            }
                        }
                    }
                }
            }
        }

        self.pop_type_params(&decl.type_params);
        let data = &mut self.ctx.classes[id];
        data.fields = fields;
        data.methods = methods;
        data.getters = getters;
        data.setters = setters;
        data.statics = statics;
        data.ctor = ctor;
        Ok(())
    }

    fn function_type_of(&mut self, func: &FunctionLit) -> Result<TypeInfo, Diagnostic> {
        self.push_type_params(&func.type_params);
        let mut params = Vec::new();
        let mut required = 0;
        for p in &func.params {
            let ty = match &p.type_ann {
                Some(ann) => self.resolve_type(ann)?,
                None => TypeInfo::Any,
            };
            if p.default.is_none() && !p.optional && !p.is_rest {
                required = params.len() + 1;
            }
            params.push(ty);
        }
        let has_rest = func.params.last().is_some_and(|p| p.is_rest);
        let mut ret = match &func.return_type {
            Some(ann) => self.resolve_type(ann)?,
            None => TypeInfo::Any,
        };
        if func.is_async() && !matches!(ret, TypeInfo::Promise(_)) {
            ret = TypeInfo::promise(ret);
        }
        self.pop_type_params(&func.type_params);
        Ok(FunctionType {
            params,
            ret,
            required,
            has_rest,
        }
        .into_type())
    }

    fn push_type_params(&mut self, params: &[String]) {
        if params.is_empty() {
            return;
        }
        let mut scope = FxHashMap::default();
        for p in params {
            scope.insert(
                p.clone(),
                TypeBinding::Alias {
                    params: Vec::new(),
                    ty: TypeInfo::TypeParam(p.clone()),
                },
            );
        }
        self.types.push(scope);
    }

    fn pop_type_params(&mut self, params: &[String]) {
        if !params.is_empty() {
            self.types.pop();
        }
    }

    // =========================================================================
    // Type annotation resolution
    // =========================================================================

    fn resolve_type(&mut self, ann: &TypeExpr) -> Result<TypeInfo, Diagnostic> {
        match ann {
            TypeExpr::Named { path, args, span } => self.resolve_named_type(path, args, *span),
            TypeExpr::Union(parts) => {
                let mut resolved = Vec::new();
                for p in parts {
                    resolved.push(self.resolve_type(p)?);
                }
                Ok(TypeInfo::union(resolved))
            }
            TypeExpr::Array(elem) => Ok(TypeInfo::array(self.resolve_type(elem)?)),
            TypeExpr::Tuple { elems, rest } => {
                let mut resolved = Vec::new();
                for e in elems {
                    resolved.push(self.resolve_type(e)?);
                }
                let rest = match rest {
                    Some(r) => Some(Box::new(self.resolve_type(r)?)),
                    None => None,
                };
                Ok(TypeInfo::Tuple {
                    elems: resolved,
                    rest,
                })
            }
            TypeExpr::Function { params, ret } => {
                let mut ptys = Vec::new();
                let mut required = 0;
                for p in params {
                    let ty = self.resolve_type(&p.ty)?;
                    if !p.optional && !p.is_rest {
                        required = ptys.len() + 1;
                    }
                    ptys.push(ty);
                }
                let has_rest = params.last().is_some_and(|p| p.is_rest);
                let ret = self.resolve_type(ret)?;
                Ok(FunctionType {
                    params: ptys,
                    ret,
                    required,
                    has_rest,
                }
                .into_type())
            }
            TypeExpr::Object(members) => {
                let mut fields = IndexMap::new();
                for m in members {
                    fields.insert(m.name.clone(), self.resolve_type(&m.ty)?);
                }
                Ok(TypeInfo::Record(fields))
            }
            // Literal types widen to their base primitive.
            TypeExpr::Literal(lit, _) => Ok(match lit {
                Lit::Number(_) => TypeInfo::Number,
                Lit::Str(_) => TypeInfo::Str,
                Lit::Bool(_) => TypeInfo::Boolean,
                Lit::BigInt(_) => TypeInfo::BigInt,
                Lit::Null => TypeInfo::Null,
                Lit::Undefined => TypeInfo::Undefined,
                Lit::Regex { .. } => TypeInfo::RegExp,
            }),
        }
    }

    fn resolve_named_type(
        &mut self,
        path: &[String],
        args: &[TypeExpr],
        span: Span,
    ) -> Result<TypeInfo, Diagnostic> {
        let mut resolved_args = Vec::new();
        for a in args {
            resolved_args.push(self.resolve_type(a)?);
        }
        let key = path.join(".");
        if path.len() == 1 {
            let one = |n: usize| -> TypeInfo {
                resolved_args.get(n).cloned().unwrap_or(TypeInfo::Any)
            };
            match path[0].as_str() {
                "number" => return Ok(TypeInfo::Number),
                "string" => return Ok(TypeInfo::Str),
                "boolean" => return Ok(TypeInfo::Boolean),
                "null" => return Ok(TypeInfo::Null),
                "undefined" => return Ok(TypeInfo::Undefined),
                "void" => return Ok(TypeInfo::Void),
                "bigint" => return Ok(TypeInfo::BigInt),
                "symbol" => return Ok(TypeInfo::Symbol),
                "any" | "unknown" | "never" | "object" => return Ok(TypeInfo::Any),
                "Array" => return Ok(TypeInfo::array(one(0))),
                "Map" => return Ok(TypeInfo::MapTy(Box::new(one(0)), Box::new(one(1)))),
                "Set" => return Ok(TypeInfo::SetTy(Box::new(one(0)))),
                "WeakMap" => {
                    return Ok(TypeInfo::WeakMapTy(Box::new(one(0)), Box::new(one(1))));
                }
                "WeakSet" => return Ok(TypeInfo::WeakSetTy(Box::new(one(0)))),
                "Promise" => return Ok(TypeInfo::promise(one(0))),
                "Date" => return Ok(TypeInfo::Date),
                "RegExp" => return Ok(TypeInfo::RegExp),
                _ => {}
            }
        }
        match self.lookup_type(&key) {
            Some(TypeBinding::Class(id)) => {
                let params = &self.ctx.classes[id].type_params;
                let mut args = resolved_args;
                args.resize(params.len(), TypeInfo::Any);
                Ok(TypeInfo::Instance { class: id, args })
            }
            Some(TypeBinding::Interface(id)) => Ok(TypeInfo::Interface(id)),
            Some(TypeBinding::Enum(id)) => Ok(TypeInfo::Enum(id)),
            Some(TypeBinding::Namespace(_)) => Err(Diagnostic::type_error(
                format!("namespace '{key}' cannot be used as a type"),
                span,
            )),
            Some(TypeBinding::Alias { params, ty }) => {
                let mut map = FxHashMap::default();
                for (i, p) in params.iter().enumerate() {
                    map.insert(
                        p.clone(),
                        resolved_args.get(i).cloned().unwrap_or(TypeInfo::Any),
                    );
                }
                Ok(substitute(&ty, &map))
            }
            None => Err(Diagnostic::type_error(
                format!("unknown type name '{key}'"),
                span,
            )),
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn check_stmt(&mut self, stmt: &Stmt) -> Result<(), Diagnostic> {
        match &stmt.kind {
            StmtKind::Block(body) | StmtKind::Sequence(body) => {
                self.values.push(FxHashMap::default());
                // Nested declarations hoist within their block.
                self.hoist_nested_functions(body)?;
                for s in body {
                    self.check_stmt(s)?;
                }
                self.values.pop();
                Ok(())
            }
            StmtKind::Var { kind, decls } => {
                for decl in decls {
                    self.check_var_decl(kind, decl)?;
                }
                Ok(())
            }
            StmtKind::Function { name, func } => {
                // Signature may already be hoisted; ensure binding exists for
                // nested scopes, then check the body.
                let ty = self.function_type_of(func)?;
                self.bind_value(name, ty);
                self.check_function_body(func, None)
            }
            StmtKind::Class(decl) => self.check_class_body(decl),
            StmtKind::Enum(_) | StmtKind::Interface(_) | StmtKind::TypeAlias(_) => Ok(()),
            StmtKind::Namespace(decl) => {
                self.values.push(FxHashMap::default());
                self.hoist_nested_functions(&decl.body)?;
                for s in &decl.body {
                    self.check_stmt(s)?;
                }
                self.values.pop();
                Ok(())
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.infer_expr(cond)?;
                self.check_stmt_scoped(then)?;
                if let Some(e) = otherwise {
                    self.check_stmt_scoped(e)?;
                }
                Ok(())
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                self.values.push(FxHashMap::default());
                if let Some(init) = init {
                    self.check_stmt(init)?;
                }
                if let Some(cond) = cond {
                    self.infer_expr(cond)?;
                }
                if let Some(update) = update {
                    self.infer_expr(update)?;
                }
                self.check_stmt_scoped(body)?;
                self.values.pop();
                Ok(())
            }
            StmtKind::ForOf {
                pattern,
                iterable,
                body,
                is_await,
                ..
            } => {
                let iter_ty = self.infer_expr(iterable)?;
                let elem = element_type_of(&iter_ty, *is_await);
                self.values.push(FxHashMap::default());
                self.bind_pattern(pattern, &elem)?;
                self.check_stmt_scoped(body)?;
                self.values.pop();
                Ok(())
            }
            StmtKind::ForIn {
                pattern,
                object,
                body,
                ..
            } => {
                self.infer_expr(object)?;
                self.values.push(FxHashMap::default());
                self.bind_pattern(pattern, &TypeInfo::Str)?;
                self.check_stmt_scoped(body)?;
                self.values.pop();
                Ok(())
            }
            StmtKind::While { cond, body } => {
                self.infer_expr(cond)?;
                self.check_stmt_scoped(body)
            }
            StmtKind::DoWhile { body, cond } => {
                self.check_stmt_scoped(body)?;
                self.infer_expr(cond)?;
                Ok(())
            }
            StmtKind::TryCatch {
                try_block,
                catch,
                finally,
            } => {
                self.values.push(FxHashMap::default());
                self.hoist_nested_functions(try_block)?;
                for s in try_block {
                    self.check_stmt(s)?;
                }
                self.values.pop();
                if let Some(clause) = catch {
                    self.values.push(FxHashMap::default());
                    if let Some(param) = &clause.param {
                        self.bind_pattern(param, &TypeInfo::Any)?;
                    }
                    self.hoist_nested_functions(&clause.body)?;
                    for s in &clause.body {
                        self.check_stmt(s)?;
                    }
                    self.values.pop();
                }
                if let Some(fin) = finally {
                    self.values.push(FxHashMap::default());
                    self.hoist_nested_functions(fin)?;
                    for s in fin {
                        self.check_stmt(s)?;
                    }
                    self.values.pop();
                }
                Ok(())
            }
            StmtKind::Throw(expr) => {
                self.infer_expr(expr)?;
                Ok(())
            }
            StmtKind::Return(value) => {
                let actual = match value {
                    Some(v) => self.infer_expr(v)?,
                    None => TypeInfo::Undefined,
                };
                if let Some(expected) = self.return_types.last().cloned() {
                    // Async bodies return the promised value.
                    let expected = match &expected {
                        TypeInfo::Promise(inner) => (**inner).clone(),
                        other => other.clone(),
                    };
                    if !matches!(expected, TypeInfo::Any | TypeInfo::Void)
                        && !is_compatible(self.ctx, &actual, &expected)
                    {
                        return Err(Diagnostic::type_error(
                            format!(
                                "return type '{}' is not assignable to declared type '{}'",
                                self.ctx.display_type(&actual),
                                self.ctx.display_type(&expected)
                            ),
                            stmt.span,
                        ));
                    }
                }
                Ok(())
            }
            StmtKind::Break | StmtKind::Continue => Ok(()),
            StmtKind::Import(_) | StmtKind::ImportRequire { .. } => Ok(()),
            StmtKind::Export(inner) => self.check_stmt(inner),
            StmtKind::ExportNamed { .. } => Ok(()),
            StmtKind::ExportDefault(expr) => {
                self.infer_expr(expr)?;
                Ok(())
            }
            StmtKind::Expression(expr) => {
                self.infer_expr(expr)?;
                Ok(())
            }
        }
    }

    fn check_stmt_scoped(&mut self, stmt: &Stmt) -> Result<(), Diagnostic> {
        self.values.push(FxHashMap::default());
        self.check_stmt(stmt)?;
        self.values.pop();
        Ok(())
    }

    /// Give nested function declarations their signatures before checking
    /// the block's statements, mirroring hoisting.
    fn hoist_nested_functions(&mut self, body: &[Stmt]) -> Result<(), Diagnostic> {
        for s in body {
            if let StmtKind::Function { name, func } = &s.kind {
                let ty = self.function_type_of(func)?;
                self.bind_value(name, ty);
            }
        }
        Ok(())
    }

    fn check_var_decl(&mut self, kind: &VarKind, decl: &VarDecl) -> Result<(), Diagnostic> {
        let _ = kind;
        let annotated = match &decl.type_ann {
            Some(ann) => Some(self.resolve_type(ann)?),
            None => None,
        };
        let init_ty = match &decl.init {
            Some(init) => Some(self.infer_expr(init)?),
            None => None,
        };
        if let (Some(want), Some(got)) = (&annotated, &init_ty) {
            if !is_compatible(self.ctx, got, want) {
                return Err(Diagnostic::type_error(
                    format!(
                        "type '{}' is not assignable to type '{}'",
                        self.ctx.display_type(got),
                        self.ctx.display_type(want)
                    ),
                    decl.span,
                ));
            }
        }
        let ty = annotated.or(init_ty).unwrap_or(TypeInfo::Any);
        self.bind_pattern(&decl.pattern, &ty)
    }

    fn bind_value(&mut self, name: &str, ty: TypeInfo) {
        self.values
            .last_mut()
            .expect("at least the module scope")
            .insert(name.to_string(), ty);
    }

    fn bind_pattern(&mut self, pattern: &Pattern, ty: &TypeInfo) -> Result<(), Diagnostic> {
        match pattern {
            Pattern::Identifier { name, .. } => {
                self.bind_value(name, ty.clone());
                Ok(())
            }
            Pattern::Array { elements, rest, .. } => {
                for (i, e) in elements.iter().enumerate() {
                    if let Some(p) = e {
                        let elem_ty = match ty {
                            TypeInfo::Array(elem) => (**elem).clone(),
                            TypeInfo::Tuple { elems, .. } => {
                                elems.get(i).cloned().unwrap_or(TypeInfo::Undefined)
                            }
                            _ => TypeInfo::Any,
                        };
                        self.bind_pattern(p, &elem_ty)?;
                    }
                }
                if let Some(r) = rest {
                    let rest_ty = match ty {
                        TypeInfo::Array(_) => ty.clone(),
                        _ => TypeInfo::Any,
                    };
                    self.bind_pattern(r, &rest_ty)?;
                }
                Ok(())
            }
            Pattern::Object { props, rest, .. } => {
                for p in props {
                    let member_ty = members::member_type_for_structural(self.ctx, ty, &p.key)
                        .unwrap_or(TypeInfo::Any);
                    self.bind_pattern(&p.value, &member_ty)?;
                }
                if let Some(r) = rest {
                    self.bind_value(r, TypeInfo::Any);
                }
                Ok(())
            }
            Pattern::Default { inner, default, .. } => {
                self.infer_expr(default)?;
                self.bind_pattern(inner, ty)
            }
        }
    }

    fn check_function_body(
        &mut self,
        func: &FunctionLit,
        this_class: Option<ClassId>,
    ) -> Result<(), Diagnostic> {
        self.push_type_params(&func.type_params);
        self.values.push(FxHashMap::default());
        for p in &func.params {
            let ty = match &p.type_ann {
                Some(ann) => self.resolve_type(ann)?,
                None => TypeInfo::Any,
            };
            let ty = if p.is_rest { TypeInfo::array(ty) } else { ty };
            self.bind_pattern(&p.pattern, &ty)?;
            if let Some(default) = &p.default {
                self.infer_expr(default)?;
            }
        }
        let declared_ret = match &func.return_type {
            Some(ann) => self.resolve_type(ann)?,
            None => TypeInfo::Any,
        };
        self.return_types.push(declared_ret);
        let saved_class = self.enclosing_class;
        if let Some(cls) = this_class {
            self.enclosing_class = Some(cls);
        }
        self.hoist_nested_functions(&func.body)?;
        for s in &func.body {
            self.check_stmt(s)?;
        }
        self.enclosing_class = saved_class;
        self.return_types.pop();
        self.values.pop();
        self.pop_type_params(&func.type_params);
        Ok(())
    }

    fn check_class_body(&mut self, decl: &ClassDecl) -> Result<(), Diagnostic> {
        let Some(TypeBinding::Class(id)) = self.lookup_type(&decl.name) else {
            // Class expressions and nested classes register on demand.
            let id = self.ctx.add_class(ClassData {
                name: decl.name.clone(),
                type_params: decl.type_params.clone(),
                ..Default::default()
            });
            self.types[0].insert(decl.name.clone(), TypeBinding::Class(id));
            if !decl.name.is_empty() {
                self.bind_value(&decl.name, TypeInfo::Class(id));
            }
            self.fill_class_members(id, decl)?;
            return self.check_class_members(id, decl);
        };
        self.check_class_members(id, decl)
    }

    fn check_class_members(&mut self, id: ClassId, decl: &ClassDecl) -> Result<(), Diagnostic> {
        for d in &decl.decorators {
            self.infer_expr(d)?;
        }
        self.push_type_params(&decl.type_params);
        let saved_class = self.enclosing_class;
        self.enclosing_class = Some(id);

        for member in &decl.members {
            match member {
                ClassMember::Field(field) => {
                    for d in &field.decorators {
                        self.infer_expr(d)?;
                    }
                    if let Some(init) = &field.init {
                        let got = self.infer_expr(init)?;
                        if let Some(name) = field.key.static_name() {
                            let key = if field.is_private_name {
                                format!("#{name}")
                            } else {
                                name
                            };
                            let table = if field.is_static {
                                &self.ctx.classes[id].statics
                            } else {
                                &self.ctx.classes[id].fields
                            };
                            if let Some(def) = table.get(&key) {
                                if !is_compatible(self.ctx, &got, &def.ty) {
                                    return Err(Diagnostic::type_error(
                                        format!(
                                            "initializer type '{}' is not assignable to field '{key}' of type '{}'",
                                            self.ctx.display_type(&got),
                                            self.ctx.display_type(&def.ty)
                                        ),
                                        field.span,
                                    ));
                                }
                            }
                        }
                    }
                }
                ClassMember::Method(method) => {
                    for d in &method.decorators {
                        self.infer_expr(d)?;
                    }
                    let was_ctor = self.in_ctor;
                    self.in_ctor = method.kind == MethodKind::Constructor;
                    self.check_function_body(&method.func, Some(id))?;
                    self.in_ctor = was_ctor;
                }
            }
        }

        self.enclosing_class = saved_class;
        self.pop_type_params(&decl.type_params);
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn lookup_value(&self, name: &str) -> Option<TypeInfo> {
        for scope in self.values.iter().rev() {
            if let Some(ty) = scope.get(name) {
                return Some(ty.clone());
            }
        }
        None
    }

    fn access_ctx(&self) -> AccessCtx {
        AccessCtx {
            enclosing: self.enclosing_class,
            in_ctor: self.in_ctor,
        }
    }

    pub fn infer_expr(&mut self, expr: &Expr) -> Result<TypeInfo, Diagnostic> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(match lit {
                Lit::Number(_) => TypeInfo::Number,
                Lit::BigInt(_) => TypeInfo::BigInt,
                Lit::Str(_) => TypeInfo::Str,
                Lit::Bool(_) => TypeInfo::Boolean,
                Lit::Null => TypeInfo::Null,
                Lit::Undefined => TypeInfo::Undefined,
                Lit::Regex { .. } => TypeInfo::RegExp,
            }),
            ExprKind::Variable { name } => Ok(self.lookup_value(name).unwrap_or(TypeInfo::Any)),
            ExprKind::This => Ok(match self.enclosing_class {
                Some(id) => self.ctx.classes[id].self_instance(id),
                None => TypeInfo::Any,
            }),
            ExprKind::Super => Ok(match self
                .enclosing_class
                .and_then(|id| self.ctx.classes[id].superclass.clone())
            {
                Some((super_id, args)) => TypeInfo::Instance {
                    class: super_id,
                    args,
                },
                None => TypeInfo::Any,
            }),
            ExprKind::Get {
                object,
                name,
                optional,
            } => {
                let mut recv = self.infer_expr(object)?;
                if *optional {
                    recv = strip_nullish(recv);
                }
                let resolved = members::resolve_read(self.ctx, &recv, name, self.access_ctx())
                    .map_err(|msg| Diagnostic::type_error(msg, expr.span))?;
                match resolved {
                    Resolved::Member(ty) => {
                        if matches!(recv, TypeInfo::Instance { .. }) {
                            self.ctx.proven_access.insert(expr.id);
                        }
                        Ok(ty)
                    }
                    Resolved::EnumMember(ty, value) => {
                        self.ctx.enum_member_consts.insert(expr.id, value);
                        Ok(ty)
                    }
                    Resolved::NotFound => self.member_not_found(&recv, name, expr.span),
                }
            }
            ExprKind::Set {
                object,
                name,
                value,
            } => {
                let recv = self.infer_expr(object)?;
                let got = self.infer_expr(value)?;
                let resolved = members::resolve_write(self.ctx, &recv, name, self.access_ctx())
                    .map_err(|msg| Diagnostic::type_error(msg, expr.span))?;
                match resolved {
                    WriteResolved::Settable(want) => {
                        if !is_compatible(self.ctx, &got, &want) {
                            return Err(Diagnostic::type_error(
                                format!(
                                    "type '{}' is not assignable to property '{name}' of type '{}'",
                                    self.ctx.display_type(&got),
                                    self.ctx.display_type(&want)
                                ),
                                expr.span,
                            ));
                        }
                        if matches!(recv, TypeInfo::Instance { .. }) {
                            self.ctx.proven_access.insert(expr.id);
                        }
                        Ok(got)
                    }
                    WriteResolved::GetterOnly => Err(Diagnostic::type_error(
                        format!(
                            "cannot assign to '{name}': the property has a getter but no setter"
                        ),
                        expr.span,
                    )),
                    WriteResolved::NotFound => match recv {
                        TypeInfo::Instance { .. }
                        | TypeInfo::Class(_)
                        | TypeInfo::Interface(_) => {
                            self.member_not_found(&recv, name, expr.span)
                        }
                        _ => Ok(got),
                    },
                }
            }
            ExprKind::GetIndex {
                object,
                index,
                optional,
            } => {
                let mut recv = self.infer_expr(object)?;
                if *optional {
                    recv = strip_nullish(recv);
                }
                let index_ty = self.infer_expr(index)?;
                Ok(index_result_type(&recv, index, &index_ty))
            }
            ExprKind::SetIndex {
                object,
                index,
                value,
            } => {
                self.infer_expr(object)?;
                self.infer_expr(index)?;
                self.infer_expr(value)
            }
            ExprKind::GetPrivate { object, name } => {
                let recv = self.infer_expr(object)?;
                let key = format!("#{name}");
                let resolved = members::resolve_read(self.ctx, &recv, &key, self.access_ctx())
                    .map_err(|msg| Diagnostic::type_error(msg, expr.span))?;
                match resolved {
                    Resolved::Member(ty) => Ok(ty),
                    _ => self.member_not_found(&recv, &key, expr.span),
                }
            }
            ExprKind::SetPrivate {
                object,
                name,
                value,
            } => {
                let recv = self.infer_expr(object)?;
                let got = self.infer_expr(value)?;
                let key = format!("#{name}");
                members::resolve_write(self.ctx, &recv, &key, self.access_ctx())
                    .map_err(|msg| Diagnostic::type_error(msg, expr.span))?;
                Ok(got)
            }
            ExprKind::CallPrivate { object, name, args } => {
                let recv = self.infer_expr(object)?;
                let key = format!("#{name}");
                let resolved = members::resolve_read(self.ctx, &recv, &key, self.access_ctx())
                    .map_err(|msg| Diagnostic::type_error(msg, expr.span))?;
                let fty = match resolved {
                    Resolved::Member(ty) => ty,
                    _ => return self.member_not_found(&recv, &key, expr.span),
                };
                self.check_call(&fty, args, expr.span)
            }
            ExprKind::Call {
                callee,
                args,
                optional,
            } => {
                let mut fty = self.infer_expr(callee)?;
                if *optional {
                    fty = strip_nullish(fty);
                }
                self.check_call(&fty, args, expr.span)
            }
            ExprKind::New {
                callee,
                type_args,
                args,
            } => {
                let callee_ty = self.infer_expr(callee)?;
                match callee_ty {
                    TypeInfo::Class(id) => {
                        let params = self.ctx.classes[id].type_params.clone();
                        let mut resolved_args = Vec::new();
                        for a in type_args {
                            resolved_args.push(self.resolve_type(a)?);
                        }
                        resolved_args.resize(params.len(), TypeInfo::Any);
                        let mut map = FxHashMap::default();
                        for (p, a) in params.iter().zip(resolved_args.iter()) {
                            map.insert(p.clone(), a.clone());
                        }
                        if let Some(ctor) = self.ctx.classes[id].ctor.clone() {
                            let ctor = substitute_fn(&ctor, &map);
                            // Missing arguments pad with undefined at
                            // runtime, so only provided args are checked.
                            for (i, arg) in args.iter().enumerate() {
                                let got = self.infer_expr(arg)?;
                                if let Some(want) = ctor.params.get(i) {
                                    if !is_compatible(self.ctx, &got, want)
                                        && !is_compatible(self.ctx, want, &got)
                                    {
                                        return Err(Diagnostic::type_error(
                                            format!(
                                                "argument of type '{}' is not assignable to parameter of type '{}'",
                                                self.ctx.display_type(&got),
                                                self.ctx.display_type(want)
                                            ),
                                            arg.span,
                                        ));
                                    }
                                }
                            }
                        } else {
                            for arg in args {
                                self.infer_expr(arg)?;
                            }
                        }
                        Ok(TypeInfo::Instance {
                            class: id,
                            args: resolved_args,
                        })
                    }
                    TypeInfo::Any => {
                        for arg in args {
                            self.infer_expr(arg)?;
                        }
                        Ok(TypeInfo::Any)
                    }
                    other => Err(Diagnostic::type_error(
                        format!(
                            "'new' requires a class, found '{}'",
                            self.ctx.display_type(&other)
                        ),
                        callee.span,
                    )),
                }
            }
            ExprKind::Binary { op, left, right } => {
                let lt = self.infer_expr(left)?;
                let rt = self.infer_expr(right)?;
                Ok(self.binary_result(expr.id, *op, &lt, &rt))
            }
            ExprKind::Logical { left, right, .. } => {
                let lt = self.infer_expr(left)?;
                let rt = self.infer_expr(right)?;
                Ok(TypeInfo::union(vec![lt, rt]))
            }
            ExprKind::Unary { op, operand } => {
                let ty = self.infer_expr(operand)?;
                Ok(match op {
                    UnaryOp::Neg | UnaryOp::Plus | UnaryOp::BitNot => {
                        if matches!(ty, TypeInfo::BigInt) {
                            TypeInfo::BigInt
                        } else {
                            TypeInfo::Number
                        }
                    }
                    UnaryOp::Not | UnaryOp::Delete => TypeInfo::Boolean,
                    UnaryOp::Typeof => TypeInfo::Str,
                    UnaryOp::Void => TypeInfo::Undefined,
                })
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                self.infer_expr(cond)?;
                let t = self.infer_expr(then)?;
                let e = self.infer_expr(otherwise)?;
                Ok(TypeInfo::union(vec![t, e]))
            }
            ExprKind::Assign { name, value } => {
                let got = self.infer_expr(value)?;
                if let Some(want) = self.lookup_value(name) {
                    if !matches!(want, TypeInfo::Any)
                        && !is_compatible(self.ctx, &got, &want)
                    {
                        return Err(Diagnostic::type_error(
                            format!(
                                "type '{}' is not assignable to '{name}' of type '{}'",
                                self.ctx.display_type(&got),
                                self.ctx.display_type(&want)
                            ),
                            expr.span,
                        ));
                    }
                }
                Ok(got)
            }
            ExprKind::CompoundAssign { op, name, value } => {
                let vt = self.infer_expr(value)?;
                let base = self.lookup_value(name).unwrap_or(TypeInfo::Any);
                Ok(self.binary_result(expr.id, *op, &base, &vt))
            }
            ExprKind::LogicalAssign { name, value, .. } => {
                let vt = self.infer_expr(value)?;
                let base = self.lookup_value(name).unwrap_or(TypeInfo::Any);
                Ok(TypeInfo::union(vec![base, vt]))
            }
            ExprKind::CompoundSet {
                object, op, value, ..
            } => {
                let _ = self.infer_expr(object)?;
                let vt = self.infer_expr(value)?;
                Ok(self.binary_result(expr.id, *op, &TypeInfo::Any, &vt))
            }
            ExprKind::CompoundSetIndex {
                object,
                index,
                op,
                value,
            } => {
                self.infer_expr(object)?;
                self.infer_expr(index)?;
                let vt = self.infer_expr(value)?;
                Ok(self.binary_result(expr.id, *op, &TypeInfo::Any, &vt))
            }
            ExprKind::LogicalSet { object, value, .. } => {
                self.infer_expr(object)?;
                self.infer_expr(value)
            }
            ExprKind::LogicalSetIndex {
                object,
                index,
                value,
                ..
            } => {
                self.infer_expr(object)?;
                self.infer_expr(index)?;
                self.infer_expr(value)
            }
            ExprKind::PrefixIncrement { target, .. }
            | ExprKind::PostfixIncrement { target, .. } => {
                let ty = self.infer_expr(target)?;
                if !matches!(
                    ty,
                    TypeInfo::Number | TypeInfo::BigInt | TypeInfo::Any | TypeInfo::Union(_)
                ) {
                    return Err(Diagnostic::type_error(
                        format!(
                            "increment target must be numeric, found '{}'",
                            self.ctx.display_type(&ty)
                        ),
                        expr.span,
                    ));
                }
                Ok(ty)
            }
            ExprKind::ArrayLiteral { elements } => {
                let mut elem_types: Vec<TypeInfo> = Vec::new();
                let mut has_spread = false;
                for e in elements {
                    match &e.kind {
                        ExprKind::Spread { expr: inner } => {
                            has_spread = true;
                            let t = self.infer_expr(inner)?;
                            if let TypeInfo::Array(elem) = t {
                                elem_types.push(*elem);
                            }
                        }
                        _ => elem_types.push(self.infer_expr(e)?),
                    }
                }
                let _ = has_spread;
                elem_types.dedup();
                Ok(match elem_types.len() {
                    0 => TypeInfo::array(TypeInfo::Any),
                    1 => TypeInfo::array(elem_types.pop().expect("one element")),
                    n if n <= 4 => TypeInfo::array(TypeInfo::union(elem_types)),
                    _ => TypeInfo::array(TypeInfo::Any),
                })
            }
            ExprKind::ObjectLiteral { props } => {
                let mut fields = IndexMap::new();
                for p in props {
                    match p {
                        ObjectProperty::KeyValue { key, value } => {
                            let ty = self.infer_expr(value)?;
                            if let PropertyKey::Computed(k) = key {
                                self.infer_expr(k)?;
                            }
                            if let Some(name) = key.static_name() {
                                fields.insert(name, ty);
                            }
                        }
                        ObjectProperty::Spread(e) => {
                            let t = self.infer_expr(e)?;
                            if let TypeInfo::Record(src) = t {
                                for (k, v) in src {
                                    fields.insert(k, v);
                                }
                            }
                        }
                    }
                }
                Ok(TypeInfo::Record(fields))
            }
            ExprKind::Spread { expr: inner } => self.infer_expr(inner),
            ExprKind::ArrowFunction { func } | ExprKind::FunctionExpr { func } => {
                let ty = self.function_type_of(func)?;
                // Arrows keep the enclosing `this`.
                let this_class = if func.is_arrow() {
                    self.enclosing_class
                } else {
                    None
                };
                self.check_function_body(func, this_class)?;
                Ok(ty)
            }
            ExprKind::ClassExpr { decl } => {
                let id = self.ctx.add_class(ClassData {
                    name: decl.name.clone(),
                    type_params: decl.type_params.clone(),
                    ..Default::default()
                });
                self.fill_class_members(id, decl)?;
                self.check_class_members(id, decl)?;
                Ok(TypeInfo::Class(id))
            }
            ExprKind::TemplateLiteral { exprs, .. } => {
                for e in exprs {
                    self.infer_expr(e)?;
                }
                Ok(TypeInfo::Str)
            }
            ExprKind::TaggedTemplate { tag, exprs, .. } => {
                self.infer_expr(tag)?;
                for e in exprs {
                    self.infer_expr(e)?;
                }
                Ok(TypeInfo::Any)
            }
            ExprKind::DynamicImport { arg } => {
                self.infer_expr(arg)?;
                Ok(TypeInfo::promise(TypeInfo::Any))
            }
            ExprKind::ImportMeta => {
                let mut fields = IndexMap::new();
                fields.insert("url".to_string(), TypeInfo::Str);
                fields.insert("filename".to_string(), TypeInfo::Str);
                fields.insert("dirname".to_string(), TypeInfo::Str);
                Ok(TypeInfo::Record(fields))
            }
            ExprKind::NewTarget => Ok(TypeInfo::Any),
            ExprKind::Await { expr: inner } => {
                let ty = self.infer_expr(inner)?;
                Ok(match ty {
                    TypeInfo::Promise(inner) => *inner,
                    other => other,
                })
            }
            ExprKind::Yield { expr: inner } => {
                if let Some(e) = inner {
                    self.infer_expr(e)?;
                }
                Ok(TypeInfo::Any)
            }
            ExprKind::YieldStar { expr: inner } => {
                self.infer_expr(inner)?;
                Ok(TypeInfo::Any)
            }
        }
    }

    fn member_not_found(
        &self,
        recv: &TypeInfo,
        name: &str,
        span: Span,
    ) -> Result<TypeInfo, Diagnostic> {
        match recv {
            TypeInfo::Instance { .. }
            | TypeInfo::Class(_)
            | TypeInfo::Interface(_)
            | TypeInfo::Record(_)
            | TypeInfo::Enum(_)
            | TypeInfo::Namespace(_) => Err(Diagnostic::type_error(
                format!(
                    "property '{name}' does not exist on type '{}'",
                    self.ctx.display_type(recv)
                ),
                span,
            )),
            // Builtin tables are not exhaustive: unknown members of
            // primitives degrade to any and fail (or not) at runtime.
            _ => Ok(TypeInfo::Any),
        }
    }

    fn check_call(
        &mut self,
        fty: &TypeInfo,
        args: &[Expr],
        span: Span,
    ) -> Result<TypeInfo, Diagnostic> {
        let mut arg_types = Vec::new();
        let mut has_spread = false;
        for a in args {
            if matches!(a.kind, ExprKind::Spread { .. }) {
                has_spread = true;
            }
            arg_types.push(self.infer_expr(a)?);
        }
        match fty {
            TypeInfo::Function(f) => {
                if !has_spread {
                    if arg_types.len() < f.required {
                        return Err(Diagnostic::type_error(
                            format!(
                                "expected at least {} argument(s), got {}",
                                f.required,
                                arg_types.len()
                            ),
                            span,
                        ));
                    }
                    if arg_types.len() > f.params.len() && !f.has_rest {
                        return Err(Diagnostic::type_error(
                            format!(
                                "expected at most {} argument(s), got {}",
                                f.params.len(),
                                arg_types.len()
                            ),
                            span,
                        ));
                    }
                    for (i, got) in arg_types.iter().enumerate() {
                        let want = f
                            .params
                            .get(i)
                            .or_else(|| f.params.last().filter(|_| f.has_rest));
                        if let Some(want) = want {
                            if !is_compatible(self.ctx, got, want)
                                && !is_compatible(self.ctx, want, got)
                            {
                                return Err(Diagnostic::type_error(
                                    format!(
                                        "argument of type '{}' is not assignable to parameter of type '{}'",
                                        self.ctx.display_type(got),
                                        self.ctx.display_type(want)
                                    ),
                                    args[i].span,
                                ));
                            }
                        }
                    }
                }
                Ok(f.ret.clone())
            }
            TypeInfo::Overloaded(sigs) => {
                // Pick the unique best overload: first signature whose arity
                // and parameters accept the arguments.
                for sig in sigs {
                    let arity_ok = arg_types.len() >= sig.required
                        && (arg_types.len() <= sig.params.len() || sig.has_rest);
                    let params_ok = arg_types.iter().enumerate().all(|(i, got)| {
                        sig.params
                            .get(i)
                            .map(|want| {
                                is_compatible(self.ctx, got, want)
                                    || is_compatible(self.ctx, want, got)
                            })
                            .unwrap_or(sig.has_rest)
                    });
                    if arity_ok && params_ok {
                        return Ok(sig.ret.clone());
                    }
                }
                Err(Diagnostic::type_error(
                    "no overload matches this call".to_string(),
                    span,
                ))
            }
            TypeInfo::Class(id) => Err(Diagnostic::type_error(
                format!(
                    "class '{}' must be instantiated with 'new'",
                    self.ctx.classes[*id].name
                ),
                span,
            )),
            _ => Ok(TypeInfo::Any),
        }
    }

    fn binary_result(
        &mut self,
        node: NodeId,
        op: BinaryOp,
        lt: &TypeInfo,
        rt: &TypeInfo,
    ) -> TypeInfo {
        use BinaryOp::*;
        match op {
            Add => {
                if matches!(lt, TypeInfo::Str) || matches!(rt, TypeInfo::Str) {
                    TypeInfo::Str
                } else if matches!(lt, TypeInfo::BigInt) && matches!(rt, TypeInfo::BigInt) {
                    TypeInfo::BigInt
                } else if matches!(lt, TypeInfo::Number) && matches!(rt, TypeInfo::Number) {
                    self.ctx.numeric_adds.insert(node);
                    TypeInfo::Number
                } else {
                    TypeInfo::Any
                }
            }
            Sub | Mul | Div | Mod | Pow | BitAnd | BitOr | BitXor | Shl | Shr | UShr => {
                if matches!(lt, TypeInfo::BigInt) || matches!(rt, TypeInfo::BigInt) {
                    TypeInfo::BigInt
                } else {
                    TypeInfo::Number
                }
            }
            EqEq | NotEq | StrictEq | StrictNotEq | Less | LessEq | Greater | GreaterEq | In
            | Instanceof => TypeInfo::Boolean,
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn unwrap_export(stmt: &Stmt) -> &Stmt {
    match &stmt.kind {
        StmtKind::Export(inner) => inner,
        _ => stmt,
    }
}

/// Names a declaration statement binds at its level.
fn declared_names(stmt: &Stmt) -> Vec<String> {
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
        StmtKind::Interface(decl) => vec![decl.name.clone()],
        StmtKind::TypeAlias(decl) => vec![decl.name.clone()],
        StmtKind::Namespace(decl) => vec![decl.name.clone()],
        _ => Vec::new(),
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn enum_const_of(expr: &Expr) -> Option<EnumConst> {
    match &expr.kind {
        ExprKind::Literal(Lit::Number(n)) => Some(EnumConst::Num(*n)),
        ExprKind::Literal(Lit::Str(s)) => Some(EnumConst::Str(s.clone())),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match &operand.kind {
            ExprKind::Literal(Lit::Number(n)) => Some(EnumConst::Num(-n)),
            _ => None,
        },
        _ => None,
    }
}

fn literal_type_of(expr: &Expr) -> Option<TypeInfo> {
    match &expr.kind {
        ExprKind::Literal(Lit::Number(_)) => Some(TypeInfo::Number),
        ExprKind::Literal(Lit::Str(_)) => Some(TypeInfo::Str),
        ExprKind::Literal(Lit::Bool(_)) => Some(TypeInfo::Boolean),
        ExprKind::Literal(Lit::BigInt(_)) => Some(TypeInfo::BigInt),
        _ => None,
    }
}

fn strip_nullish(ty: TypeInfo) -> TypeInfo {
    match ty {
        TypeInfo::Union(parts) => {
            let kept: Vec<TypeInfo> = parts.into_iter().filter(|p| !p.is_nullish()).collect();
            TypeInfo::union(kept)
        }
        other => other,
    }
}

/// Result type of `recv[index]`.
fn index_result_type(recv: &TypeInfo, index: &Expr, index_ty: &TypeInfo) -> TypeInfo {
    match recv {
        TypeInfo::Array(elem) => (**elem).clone(),
        TypeInfo::Tuple { elems, rest } => match &index.kind {
            ExprKind::Literal(Lit::Number(n)) => {
                let i = *n as usize;
                elems
                    .get(i)
                    .cloned()
                    .or_else(|| rest.as_ref().map(|r| (**r).clone()))
                    .unwrap_or(TypeInfo::Undefined)
            }
            _ => TypeInfo::union(elems.clone()),
        },
        TypeInfo::Str if matches!(index_ty, TypeInfo::Number) => TypeInfo::Str,
        TypeInfo::Record(fields) => match &index.kind {
            ExprKind::Literal(Lit::Str(s)) => fields.get(s).cloned().unwrap_or(TypeInfo::Any),
            _ => TypeInfo::Any,
        },
        _ => TypeInfo::Any,
    }
}

/// Element type produced by `for…of` / `for await…of`.
fn element_type_of(iterable: &TypeInfo, is_await: bool) -> TypeInfo {
    let _ = is_await;
    match iterable {
        TypeInfo::Array(elem) => (**elem).clone(),
        TypeInfo::SetTy(elem) => (**elem).clone(),
        TypeInfo::MapTy(k, v) => TypeInfo::Tuple {
            elems: vec![(**k).clone(), (**v).clone()],
            rest: None,
        },
        TypeInfo::Str => TypeInfo::Str,
        TypeInfo::Tuple { elems, .. } => TypeInfo::union(elems.clone()),
        _ => TypeInfo::Any,
    }
}

#[cfg(test)]
#[path = "tests/checker_tests.rs"]
mod tests;
