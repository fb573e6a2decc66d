//! Classes, enums, namespaces, destructuring, iterator loops, and
//! try/catch/finally emission.

use tsb_common::{Diagnostic, Span};
use tsb_parser::ast::*;

use super::{exported_names_of, Emitter, RegionKind};
use crate::il::{ClassDef, FuncDef, FuncKind, Op, RtHelper};

impl<'a> Emitter<'a> {
    // =========================================================================
    // Classes
    // =========================================================================

    pub(crate) fn emit_class(&mut self, decl: &ClassDecl) -> Result<(), Diagnostic> {
        let has_super = decl.superclass.is_some();
        if let Some(superclass) = &decl.superclass {
            self.emit_expr(superclass)?;
        }

        // Methods and initializers compile inside the class's `this` scope
        // (and `super` scope for subclasses), matching the resolver.
        if has_super {
            self.push_pseudo_scope("super");
        }
        self.push_pseudo_scope("this");

        let mut def = ClassDef {
            name: decl.name.clone(),
            has_super,
            ..Default::default()
        };
        let mut instance_fields: Vec<(&ClassField, String)> = Vec::new();
        let mut static_fields: Vec<(&ClassField, String)> = Vec::new();
        let mut decorated: Vec<(String, Vec<Expr>, Option<String>)> = Vec::new();

        for member in &decl.members {
            match member {
                ClassMember::Method(m) => {
                    let Some(name) = m.key.static_name() else {
                        return Err(Diagnostic::emit(
                            "computed method keys are not supported",
                            m.span,
                        ));
                    };
                    let key = if m.is_private_name {
                        format!("#{name}")
                    } else {
                        name
                    };
                    if !m.decorators.is_empty() {
                        let tag = m.func.return_type.as_ref().and_then(design_type_tag);
                        decorated.push((key.clone(), m.decorators.clone(), tag));
                    }
                    match m.kind {
                        MethodKind::Constructor => {
                            def.ctor = Some(self.compile_function(&m.func, &key, true)?);
                        }
                        MethodKind::Getter => {
                            let idx = self.compile_function(&m.func, &key, true)?;
                            def.getters.push((key, idx));
                        }
                        MethodKind::Setter => {
                            let idx = self.compile_function(&m.func, &key, true)?;
                            def.setters.push((key, idx));
                        }
                        MethodKind::Method => {
                            if m.is_static {
                                let idx = self.compile_function(&m.func, &key, false)?;
                                def.static_methods.push((key, idx));
                            } else {
                                let idx = self.compile_function(&m.func, &key, true)?;
                                def.methods.push((key, idx));
                            }
                        }
                    }
                }
                ClassMember::Field(f) => {
                    let Some(name) = f.key.static_name() else {
                        return Err(Diagnostic::emit(
                            "computed field keys are not supported",
                            f.span,
                        ));
                    };
                    let key = if f.is_private_name {
                        format!("#{name}")
                    } else {
                        name
                    };
                    if !f.decorators.is_empty() {
                        let tag = f.type_ann.as_ref().and_then(design_type_tag);
                        decorated.push((key.clone(), f.decorators.clone(), tag));
                    }
                    if f.is_static {
                        static_fields.push((f, key));
                    } else {
                        instance_fields.push((f, key));
                    }
                }
            }
        }

        if !instance_fields.is_empty() {
            def.field_init = Some(self.compile_field_init(&instance_fields, decl.span)?);
        }
        if !static_fields.is_empty() {
            def.static_init = Some(self.compile_field_init(&static_fields, decl.span)?);
        }

        self.pop_pseudo_scope(); // this
        if has_super {
            self.pop_pseudo_scope(); // super
        }

        let class_idx = self.classes.len() as u32;
        self.classes.push(def);
        self.emit(Op::MakeClass(class_idx));

        // Member decorators run after class creation: dec(Class, key), with
        // design:type metadata recorded first.
        if !decorated.is_empty() {
            let tmp = self.alloc_temp();
            self.emit(Op::StoreVar {
                depth: 0,
                slot: tmp,
            });
            for (key, decorators, tag) in &decorated {
                if let Some(tag) = tag {
                    let reflect = self.str_const("Reflect");
                    self.emit(Op::LoadGlobal(reflect));
                    self.emit_str("design:type");
                    self.emit_str(tag);
                    self.emit(Op::LoadVar {
                        depth: 0,
                        slot: tmp,
                    });
                    self.emit_str(key);
                    let define = self.str_const("defineMetadata");
                    self.emit(Op::CallMethod {
                        name: define,
                        argc: 4,
                    });
                    self.emit(Op::Pop);
                }
                for dec in decorators {
                    self.emit_expr(dec)?;
                    self.emit(Op::LoadVar {
                        depth: 0,
                        slot: tmp,
                    });
                    self.emit_str(key);
                    self.emit(Op::Call { argc: 2 });
                    self.emit(Op::Pop);
                }
            }
            self.emit(Op::LoadVar {
                depth: 0,
                slot: tmp,
            });
        }

        // Class decorators: `C = dec(C) ?? C`, innermost last.
        for dec in decl.decorators.iter().rev() {
            let tmp = self.alloc_temp();
            self.emit(Op::StoreVar {
                depth: 0,
                slot: tmp,
            });
            self.emit_expr(dec)?;
            self.emit(Op::LoadVar {
                depth: 0,
                slot: tmp,
            });
            self.emit(Op::Call { argc: 1 });
            self.emit(Op::Dup);
            let keep = self.emit(Op::JumpIfNotNullish(0));
            self.emit(Op::Pop);
            self.emit(Op::LoadVar {
                depth: 0,
                slot: tmp,
            });
            self.patch_jump(keep);
        }
        Ok(())
    }

    /// Synthesize the initializer that assigns each field of `fields` on
    /// `this` (instances) or the class value (statics).
    fn compile_field_init(
        &mut self,
        fields: &[(&ClassField, String)],
        span: Span,
    ) -> Result<u32, Diagnostic> {
        self.new_frame(false);
        self.push_function_scope();
        for (f, key) in fields {
            let (depth, slot) = self.slot_at_distance("this", 1, span)?;
            self.emit(Op::LoadVar { depth, slot });
            match &f.init {
                Some(init) => self.emit_expr(init)?,
                None => {
                    self.emit(Op::Undefined);
                }
            }
            let idx = self.str_const(key);
            if f.is_private_name {
                self.emit(Op::SetPrivate(idx));
            } else {
                self.emit(Op::SetProp(idx));
            }
            self.emit(Op::Pop);
        }
        self.emit(Op::ReturnUndefined);
        let frame = self.frames.pop().expect("frame");
        let scope = self.scopes.pop().expect("field init scope");
        self.functions.push(FuncDef {
            name: "<fields>".to_string(),
            n_params: 0,
            has_rest: false,
            scope_slots: scope.count,
            binds_this: true,
            kind: FuncKind::Normal,
            module: self.module_index,
            code: frame.code,
        });
        Ok(self.functions.len() as u32 - 1)
    }

    // =========================================================================
    // Enums
    // =========================================================================

    pub(crate) fn emit_enum(&mut self, decl: &EnumDecl) -> Result<(), Diagnostic> {
        self.emit(Op::MakeObject);
        let mut next_auto = 0.0f64;
        for member in &decl.members {
            let value = match &member.init {
                None => {
                    let v = next_auto;
                    next_auto += 1.0;
                    Some(v)
                }
                Some(expr) => match &expr.kind {
                    ExprKind::Literal(Lit::Number(n)) => {
                        next_auto = n + 1.0;
                        Some(*n)
                    }
                    ExprKind::Literal(Lit::Str(s)) => {
                        self.emit_str(s);
                        let idx = self.str_const(&member.name);
                        self.emit(Op::SetPropKeep(idx));
                        continue;
                    }
                    ExprKind::Unary {
                        op: UnaryOp::Neg,
                        operand,
                    } => match &operand.kind {
                        ExprKind::Literal(Lit::Number(n)) => {
                            next_auto = -n + 1.0;
                            Some(-n)
                        }
                        _ => None,
                    },
                    _ => None,
                },
            };
            let Some(value) = value else {
                return Err(Diagnostic::emit(
                    format!("enum member '{}' requires a constant initializer", member.name),
                    member.span,
                ));
            };
            // Forward mapping…
            self.emit_number(value);
            let idx = self.str_const(&member.name);
            self.emit(Op::SetPropKeep(idx));
            // …and the numeric reverse mapping.
            self.emit_number(value);
            self.emit_str(&member.name);
            self.emit(Op::SetIndexKeep);
        }
        self.emit(Op::Freeze);
        Ok(())
    }

    // =========================================================================
    // Namespaces
    // =========================================================================

    pub(crate) fn emit_namespace(&mut self, decl: &NamespaceDecl) -> Result<(), Diagnostic> {
        self.push_block_scope();
        self.collect_scope_decls(&decl.body);
        self.emit_hoisted_functions(&decl.body)?;
        for stmt in &decl.body {
            self.emit_stmt(stmt)?;
        }
        // The namespace value is an object of the exported bindings.
        self.emit(Op::MakeObject);
        for stmt in &decl.body {
            if let StmtKind::Export(inner) = &stmt.kind {
                for name in exported_names_of(inner) {
                    let (depth, slot) = self.slot_at_distance(&name, 0, decl.span)?;
                    self.emit(Op::LoadVar { depth, slot });
                    let idx = self.str_const(&name);
                    self.emit(Op::SetPropKeep(idx));
                }
            }
        }
        self.pop_block_scope();
        Ok(())
    }

    // =========================================================================
    // Destructuring
    // =========================================================================

    /// Destructure the value on the stack into scope slots.
    pub(crate) fn emit_destructure(&mut self, pattern: &Pattern) -> Result<(), Diagnostic> {
        self.emit_destructure_with(pattern, &BindMode::Slot)
    }

    /// Destructure the value on the stack into module-level cells.
    pub(crate) fn emit_destructure_global(
        &mut self,
        pattern: &Pattern,
        mutable: bool,
    ) -> Result<(), Diagnostic> {
        self.emit_destructure_with(pattern, &BindMode::Global { mutable })
    }

    fn bind_leaf(&mut self, name: &str, span: Span, mode: &BindMode) -> Result<(), Diagnostic> {
        match mode {
            BindMode::Slot => {
                let (depth, slot) = self.slot_at_distance(name, 0, span)?;
                self.emit(Op::StoreVar { depth, slot });
                Ok(())
            }
            BindMode::Global { mutable } => {
                let idx = self.str_const(name);
                self.emit(Op::DefineGlobal {
                    name: idx,
                    mutable: *mutable,
                });
                Ok(())
            }
        }
    }

    fn emit_destructure_with(
        &mut self,
        pattern: &Pattern,
        mode: &BindMode,
    ) -> Result<(), Diagnostic> {
        match pattern {
            Pattern::Identifier { name, span } => self.bind_leaf(name, *span, mode),
            Pattern::Default {
                inner,
                default,
                ..
            } => {
                self.emit(Op::Dup);
                self.emit(Op::Undefined);
                self.emit(Op::StrictEq);
                let keep = self.emit(Op::JumpIfFalse(0));
                self.emit(Op::Pop);
                self.emit_expr(default)?;
                self.patch_jump(keep);
                self.emit_destructure_with(inner, mode)
            }
            Pattern::Array {
                elements,
                rest,
                span,
            } => {
                let tmp = self.alloc_temp();
                self.emit(Op::StoreVar {
                    depth: 0,
                    slot: tmp,
                });
                for (i, element) in elements.iter().enumerate() {
                    let Some(element) = element else { continue };
                    self.emit(Op::LoadVar {
                        depth: 0,
                        slot: tmp,
                    });
                    self.emit_number(i as f64);
                    self.emit(Op::GetIndexOp);
                    self.emit_destructure_with(element, mode)?;
                }
                if let Some(rest) = rest {
                    self.emit(Op::LoadVar {
                        depth: 0,
                        slot: tmp,
                    });
                    self.emit_number(elements.len() as f64);
                    let slice = self.str_const("slice");
                    self.emit(Op::CallMethod {
                        name: slice,
                        argc: 1,
                    });
                    self.emit_destructure_with(rest, mode)?;
                }
                let _ = span;
                Ok(())
            }
            Pattern::Object { props, rest, span } => {
                let tmp = self.alloc_temp();
                self.emit(Op::StoreVar {
                    depth: 0,
                    slot: tmp,
                });
                for prop in props {
                    self.emit(Op::LoadVar {
                        depth: 0,
                        slot: tmp,
                    });
                    let idx = self.str_const(&prop.key);
                    self.emit(Op::GetProp(idx));
                    self.emit_destructure_with(&prop.value, mode)?;
                }
                if let Some(rest) = rest {
                    self.emit(Op::MakeObject);
                    self.emit(Op::LoadVar {
                        depth: 0,
                        slot: tmp,
                    });
                    self.helper(RtHelper::MergeIntoObject, 2);
                    for prop in props {
                        let idx = self.str_const(&prop.key);
                        self.emit(Op::Dup);
                        self.emit(Op::DeleteProp(idx));
                        self.emit(Op::Pop);
                    }
                    self.bind_leaf(rest, *span, mode)?;
                }
                Ok(())
            }
        }
    }

    // =========================================================================
    // Iterator loops (for…of / for…in)
    // =========================================================================

    /// An iterator is on the stack; drive it binding each element into
    /// `pattern` and running `body`.
    pub(crate) fn emit_for_iterator(
        &mut self,
        pattern: &Pattern,
        body: &Stmt,
    ) -> Result<(), Diagnostic> {
        self.push_block_scope();
        let mut names = Vec::new();
        pattern.bound_names(&mut names);
        for n in &names {
            self.declare_slot(n);
        }
        let iter_slot = self.alloc_temp();
        self.emit(Op::StoreVar {
            depth: 0,
            slot: iter_slot,
        });
        self.begin_loop();
        let loop_start = self.here();
        self.emit(Op::LoadVar {
            depth: 0,
            slot: iter_slot,
        });
        self.emit(Op::IterNext);
        let done = self.emit(Op::JumpIfTrue(0));
        // Stack: the element value.
        self.emit_destructure(pattern)?;
        self.emit_stmt_scoped(body)?;
        self.emit(Op::Jump(loop_start));
        self.patch_jump(done);
        self.emit(Op::Pop); // drop the final undefined element
        self.end_loop(loop_start);
        self.pop_block_scope();
        Ok(())
    }

    // =========================================================================
    // try / catch / finally
    // =========================================================================

    pub(crate) fn emit_try(
        &mut self,
        try_block: &[Stmt],
        catch: Option<&CatchClause>,
        finally: Option<&Vec<Stmt>>,
    ) -> Result<(), Diagnostic> {
        let finally_enter = finally.map(|stmts| {
            let at = self.emit(Op::EnterTryFinally { finally: 0 });
            self.push_region(RegionKind::Finally {
                stmts: stmts.clone(),
                scope_depth: self.scopes.len(),
            });
            at
        });
        let catch_enter = catch.map(|_| {
            let at = self.emit(Op::EnterTryCatch { catch: 0 });
            self.push_region(RegionKind::Catch);
            at
        });

        // The try block proper.
        self.push_block_scope();
        self.collect_scope_decls(try_block);
        self.emit_hoisted_functions(try_block)?;
        for s in try_block {
            self.emit_stmt(s)?;
        }
        self.pop_block_scope();

        let mut after_catch = None;
        if let Some(clause) = catch {
            self.emit(Op::PopTry);
            self.pop_region();
            let over = self.emit(Op::Jump(0));
            let enter = catch_enter.expect("catch enter recorded");
            self.patch_jump(enter);
            // Exception value is on the stack here.
            self.push_block_scope();
            if let Some(param) = &clause.param {
                let mut names = Vec::new();
                param.bound_names(&mut names);
                for n in &names {
                    self.declare_slot(n);
                }
                self.emit_destructure(param)?;
            } else {
                self.emit(Op::Pop);
            }
            self.collect_scope_decls(&clause.body);
            self.emit_hoisted_functions(&clause.body)?;
            for s in &clause.body {
                self.emit_stmt(s)?;
            }
            self.pop_block_scope();
            after_catch = Some(over);
        }
        if let Some(over) = after_catch {
            self.patch_jump(over);
        }

        if let Some(stmts) = finally {
            self.emit(Op::PopTry);
            self.pop_region();
            // Normal-path finally, inline.
            self.emit_finally_block(stmts)?;
            let over = self.emit(Op::Jump(0));
            let enter = finally_enter.expect("finally enter recorded");
            self.patch_jump(enter);
            // Exception-path finally: the VM carries the pending completion.
            self.emit_finally_block(stmts)?;
            self.emit(Op::EndFinally);
            self.patch_jump(over);
        }
        Ok(())
    }

    fn emit_finally_block(&mut self, stmts: &[Stmt]) -> Result<(), Diagnostic> {
        self.push_block_scope();
        self.collect_scope_decls(stmts);
        self.emit_hoisted_functions(stmts)?;
        for s in stmts {
            self.emit_stmt(s)?;
        }
        self.pop_block_scope();
        Ok(())
    }
}

enum BindMode {
    Slot,
    Global { mutable: bool },
}

/// Tag used for `design:type` metadata, derived from the member's
/// annotation.
fn design_type_tag(ty: &TypeExpr) -> Option<String> {
    match ty {
        TypeExpr::Named { path, .. } => path.last().cloned(),
        TypeExpr::Array(_) => Some("Array".to_string()),
        TypeExpr::Function { .. } => Some("Function".to_string()),
        _ => Some("Object".to_string()),
    }
}
