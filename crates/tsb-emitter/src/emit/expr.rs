//! Expression emission.
//!
//! Member/call chains are compiled as a unit so optional links short-circuit
//! the whole chain: each `?.` duplicates the receiver and branches to a
//! shared bail label that replaces it with `undefined`.

use tsb_common::{Diagnostic, Span};
use tsb_parser::ast::*;

use super::Emitter;
use crate::il::{Const, Op, RtHelper};

impl<'a> Emitter<'a> {
    pub(crate) fn emit_expr(&mut self, expr: &Expr) -> Result<(), Diagnostic> {
        match &expr.kind {
            ExprKind::Literal(lit) => self.emit_literal(lit),
            ExprKind::Variable { name } => self.emit_variable_read(expr.id, name, expr.span),
            ExprKind::This => {
                match self.distance_of(expr.id) {
                    Some(d) => {
                        let (depth, slot) = self.slot_at_distance("this", d, expr.span)?;
                        self.emit(Op::LoadVar { depth, slot });
                    }
                    // `this` outside any class resolves to undefined.
                    None => {
                        self.emit(Op::Undefined);
                    }
                }
                Ok(())
            }
            ExprKind::Super => Err(Diagnostic::emit(
                "'super' is only valid in member access or calls",
                expr.span,
            )),

            ExprKind::Get { .. }
            | ExprKind::GetIndex { .. }
            | ExprKind::GetPrivate { .. }
            | ExprKind::Call { .. }
            | ExprKind::CallPrivate { .. } => self.emit_chain_root(expr),

            ExprKind::Set {
                object,
                name,
                value,
            } => {
                if let ExprKind::Super = object.kind {
                    return Err(Diagnostic::emit("cannot assign through 'super'", expr.span));
                }
                self.emit_expr(object)?;
                self.emit_expr(value)?;
                let idx = self.str_const(name);
                if self.checker.proven_access.contains(&expr.id) {
                    self.emit(Op::SetPropDirect(idx));
                } else {
                    self.emit(Op::SetProp(idx));
                }
                Ok(())
            }
            ExprKind::SetIndex {
                object,
                index,
                value,
            } => {
                self.emit_expr(object)?;
                self.emit_expr(index)?;
                self.emit_expr(value)?;
                self.emit(Op::SetIndexOp);
                Ok(())
            }
            ExprKind::SetPrivate {
                object,
                name,
                value,
            } => {
                self.emit_expr(object)?;
                self.emit_expr(value)?;
                let idx = self.str_const(&format!("#{name}"));
                self.emit(Op::SetPrivate(idx));
                Ok(())
            }

            ExprKind::New {
                callee,
                type_args: _,
                args,
            } => {
                if args.iter().any(|a| matches!(a.kind, ExprKind::Spread { .. })) {
                    return Err(Diagnostic::emit(
                        "spread arguments in 'new' are not supported",
                        expr.span,
                    ));
                }
                self.emit_expr(callee)?;
                for a in args {
                    self.emit_expr(a)?;
                }
                self.emit(Op::New {
                    argc: args.len() as u8,
                });
                Ok(())
            }

            ExprKind::Binary { op, left, right } => self.emit_binary(expr.id, *op, left, right),
            ExprKind::Logical { op, left, right } => {
                self.emit_expr(left)?;
                self.emit(Op::Dup);
                let skip = match op {
                    LogicalOp::And => self.emit(Op::JumpIfFalse(0)),
                    LogicalOp::Or => self.emit(Op::JumpIfTrue(0)),
                    LogicalOp::Nullish => self.emit(Op::JumpIfNotNullish(0)),
                };
                self.emit(Op::Pop);
                self.emit_expr(right)?;
                self.patch_jump(skip);
                Ok(())
            }
            ExprKind::Unary { op, operand } => self.emit_unary(*op, operand),
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                self.emit_expr(cond)?;
                let to_else = self.emit(Op::JumpIfFalse(0));
                self.emit_expr(then)?;
                let to_end = self.emit(Op::Jump(0));
                self.patch_jump(to_else);
                self.emit_expr(otherwise)?;
                self.patch_jump(to_end);
                Ok(())
            }

            ExprKind::Assign { name, value } => {
                self.emit_expr(value)?;
                self.emit(Op::Dup);
                self.emit_variable_write(expr.id, name, expr.span)
            }
            ExprKind::CompoundAssign { name, op, value } => {
                self.emit_variable_read(expr.id, name, expr.span)?;
                self.emit_expr(value)?;
                self.emit_binary_op(*op, false);
                self.emit(Op::Dup);
                self.emit_variable_write(expr.id, name, expr.span)
            }
            ExprKind::LogicalAssign { name, op, value } => {
                self.emit_variable_read(expr.id, name, expr.span)?;
                self.emit(Op::Dup);
                let skip = match op {
                    LogicalOp::And => self.emit(Op::JumpIfFalse(0)),
                    LogicalOp::Or => self.emit(Op::JumpIfTrue(0)),
                    LogicalOp::Nullish => self.emit(Op::JumpIfNotNullish(0)),
                };
                self.emit(Op::Pop);
                self.emit_expr(value)?;
                self.emit(Op::Dup);
                self.emit_variable_write(expr.id, name, expr.span)?;
                self.patch_jump(skip);
                Ok(())
            }
            ExprKind::CompoundSet {
                object,
                name,
                op,
                value,
            } => {
                self.emit_expr(object)?;
                self.emit(Op::Dup);
                let idx = self.str_const(name);
                self.emit(Op::GetProp(idx));
                self.emit_expr(value)?;
                self.emit_binary_op(*op, false);
                self.emit(Op::SetProp(idx));
                Ok(())
            }
            ExprKind::CompoundSetIndex {
                object,
                index,
                op,
                value,
            } => {
                let tmp_obj = self.alloc_temp();
                let tmp_idx = self.alloc_temp();
                self.emit_expr(object)?;
                self.emit(Op::StoreVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                self.emit_expr(index)?;
                self.emit(Op::StoreVar {
                    depth: 0,
                    slot: tmp_idx,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_idx,
                });
                self.emit(Op::GetIndexOp);
                self.emit_expr(value)?;
                self.emit_binary_op(*op, false);
                // Stack: [new]; rebuild (obj, index, new) for the store.
                let tmp_new = self.alloc_temp();
                self.emit(Op::StoreVar {
                    depth: 0,
                    slot: tmp_new,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_idx,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_new,
                });
                self.emit(Op::SetIndexOp);
                Ok(())
            }
            ExprKind::LogicalSet {
                object,
                name,
                op,
                value,
            } => {
                let tmp_obj = self.alloc_temp();
                self.emit_expr(object)?;
                self.emit(Op::StoreVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                let idx = self.str_const(name);
                self.emit(Op::GetProp(idx));
                self.emit(Op::Dup);
                let skip = match op {
                    LogicalOp::And => self.emit(Op::JumpIfFalse(0)),
                    LogicalOp::Or => self.emit(Op::JumpIfTrue(0)),
                    LogicalOp::Nullish => self.emit(Op::JumpIfNotNullish(0)),
                };
                self.emit(Op::Pop);
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                self.emit_expr(value)?;
                self.emit(Op::SetProp(idx));
                self.patch_jump(skip);
                Ok(())
            }
            ExprKind::LogicalSetIndex {
                object,
                index,
                op,
                value,
            } => {
                let tmp_obj = self.alloc_temp();
                let tmp_idx = self.alloc_temp();
                self.emit_expr(object)?;
                self.emit(Op::StoreVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                self.emit_expr(index)?;
                self.emit(Op::StoreVar {
                    depth: 0,
                    slot: tmp_idx,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_idx,
                });
                self.emit(Op::GetIndexOp);
                self.emit(Op::Dup);
                let skip = match op {
                    LogicalOp::And => self.emit(Op::JumpIfFalse(0)),
                    LogicalOp::Or => self.emit(Op::JumpIfTrue(0)),
                    LogicalOp::Nullish => self.emit(Op::JumpIfNotNullish(0)),
                };
                self.emit(Op::Pop);
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_idx,
                });
                self.emit_expr(value)?;
                self.emit(Op::SetIndexOp);
                self.patch_jump(skip);
                Ok(())
            }

            ExprKind::PrefixIncrement { target, negative } => {
                self.emit_increment(target, *negative, true, expr.span)
            }
            ExprKind::PostfixIncrement { target, negative } => {
                self.emit_increment(target, *negative, false, expr.span)
            }

            ExprKind::ArrayLiteral { elements } => {
                let has_spread = elements
                    .iter()
                    .any(|e| matches!(e.kind, ExprKind::Spread { .. }));
                if has_spread {
                    self.emit(Op::MakeArray(0));
                    for e in elements {
                        if let ExprKind::Spread { expr: inner } = &e.kind {
                            self.emit_expr(inner)?;
                            self.helper(RtHelper::ConcatArrays, 2);
                        } else {
                            self.emit_expr(e)?;
                            self.emit(Op::ArrayPush);
                        }
                    }
                } else {
                    for e in elements {
                        self.emit_expr(e)?;
                    }
                    self.emit(Op::MakeArray(elements.len() as u16));
                }
                Ok(())
            }
            ExprKind::ObjectLiteral { props } => {
                self.emit(Op::MakeObject);
                for p in props {
                    match p {
                        ObjectProperty::KeyValue { key, value } => match key {
                            PropertyKey::Computed(k) => {
                                self.emit_expr(k)?;
                                self.emit_expr(value)?;
                                self.emit(Op::SetIndexKeep);
                            }
                            key => {
                                let name = key.static_name().unwrap_or_default();
                                self.emit_expr(value)?;
                                let idx = self.str_const(&name);
                                self.emit(Op::SetPropKeep(idx));
                            }
                        },
                        ObjectProperty::Spread(src) => {
                            self.emit_expr(src)?;
                            self.helper(RtHelper::MergeIntoObject, 2);
                        }
                    }
                }
                Ok(())
            }
            ExprKind::Spread { .. } => Err(Diagnostic::emit(
                "spread is only valid in calls, arrays, and object literals",
                expr.span,
            )),

            ExprKind::ArrowFunction { func } | ExprKind::FunctionExpr { func } => {
                let name = func.name.clone().unwrap_or_default();
                let idx = self.compile_function(func, &name, false)?;
                self.emit(Op::MakeClosure { func: idx });
                Ok(())
            }
            ExprKind::ClassExpr { decl } => self.emit_class(decl),

            ExprKind::TemplateLiteral { quasis, exprs } => {
                self.emit_str(&quasis[0].cooked);
                for (i, e) in exprs.iter().enumerate() {
                    self.emit_expr(e)?;
                    self.helper(RtHelper::Stringify, 1);
                    self.helper(RtHelper::Add, 2);
                    if let Some(q) = quasis.get(i + 1) {
                        if !q.cooked.is_empty() {
                            self.emit_str(&q.cooked);
                            self.helper(RtHelper::Add, 2);
                        }
                    }
                }
                Ok(())
            }
            ExprKind::TaggedTemplate { tag, quasis, exprs } => {
                // tag(cookedArray, rawArray, valuesArray)
                self.emit_expr(tag)?;
                for q in quasis {
                    self.emit_str(&q.cooked);
                }
                self.emit(Op::MakeArray(quasis.len() as u16));
                for q in quasis {
                    self.emit_str(&q.raw);
                }
                self.emit(Op::MakeArray(quasis.len() as u16));
                for e in exprs {
                    self.emit_expr(e)?;
                }
                self.emit(Op::MakeArray(exprs.len() as u16));
                self.emit(Op::Call { argc: 3 });
                Ok(())
            }

            ExprKind::DynamicImport { arg } => {
                self.emit_expr(arg)?;
                self.helper(RtHelper::DynamicImport, 1);
                Ok(())
            }
            ExprKind::ImportMeta => {
                let path = self.module_path.clone();
                let dir = match path.rfind('/') {
                    Some(i) => path[..i].to_string(),
                    None => ".".to_string(),
                };
                self.emit(Op::MakeObject);
                self.emit_str(&format!("file://{path}"));
                let url = self.str_const("url");
                self.emit(Op::SetPropKeep(url));
                self.emit_str(&path);
                let filename = self.str_const("filename");
                self.emit(Op::SetPropKeep(filename));
                self.emit_str(&dir);
                let dirname = self.str_const("dirname");
                self.emit(Op::SetPropKeep(dirname));
                self.emit(Op::Freeze);
                Ok(())
            }
            ExprKind::NewTarget => {
                self.emit(Op::LoadNewTarget);
                Ok(())
            }

            ExprKind::Await { expr: inner } => {
                self.emit_expr(inner)?;
                self.emit_suspend(Op::SuspendAwait)
            }
            ExprKind::Yield { expr: inner } => {
                match inner {
                    Some(e) => self.emit_expr(e)?,
                    None => {
                        self.emit(Op::Undefined);
                    }
                }
                self.emit_suspend(Op::SuspendYield)
            }
            ExprKind::YieldStar { .. } => Err(Diagnostic::emit(
                "yield* must be expanded by lowering before emission",
                expr.span,
            )),
        }
    }

    fn emit_suspend(&mut self, suspend: Op) -> Result<(), Diagnostic> {
        let state = self.frames.last().expect("frame").resume_ips.len() as u16 + 1;
        self.emit(Op::SetState(state));
        self.emit(suspend);
        let resume_ip = self.here();
        self.emit(Op::ResumeValue);
        self.frame().resume_ips.push(resume_ip);
        Ok(())
    }

    fn emit_literal(&mut self, lit: &Lit) -> Result<(), Diagnostic> {
        match lit {
            Lit::Number(n) => self.emit_number(*n),
            Lit::BigInt(v) => {
                let idx = self.const_idx(Const::BigInt(*v));
                self.emit(Op::Const(idx));
            }
            Lit::Str(s) => self.emit_str(s),
            Lit::Bool(true) => {
                self.emit(Op::True);
            }
            Lit::Bool(false) => {
                self.emit(Op::False);
            }
            Lit::Null => {
                self.emit(Op::Null);
            }
            Lit::Undefined => {
                self.emit(Op::Undefined);
            }
            Lit::Regex { pattern, flags } => {
                let idx = self.const_idx(Const::Regex {
                    pattern: pattern.clone(),
                    flags: flags.clone(),
                });
                self.emit(Op::Const(idx));
            }
        }
        Ok(())
    }

    pub(crate) fn emit_variable_read(
        &mut self,
        id: NodeId,
        name: &str,
        span: Span,
    ) -> Result<(), Diagnostic> {
        match self.distance_of(id) {
            Some(d) => {
                let (depth, slot) = self.slot_at_distance(name, d, span)?;
                self.emit(Op::LoadVar { depth, slot });
            }
            None => {
                let idx = self.str_const(name);
                self.emit(Op::LoadGlobal(idx));
            }
        }
        Ok(())
    }

    /// Pops the value on the stack into the binding.
    fn emit_variable_write(&mut self, id: NodeId, name: &str, span: Span) -> Result<(), Diagnostic> {
        match self.distance_of(id) {
            Some(d) => {
                let (depth, slot) = self.slot_at_distance(name, d, span)?;
                self.emit(Op::StoreVar { depth, slot });
            }
            None => {
                let idx = self.str_const(name);
                self.emit(Op::StoreGlobal(idx));
            }
        }
        Ok(())
    }

    fn emit_binary(
        &mut self,
        id: NodeId,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<(), Diagnostic> {
        self.emit_expr(left)?;
        self.emit_expr(right)?;
        let numeric_proven = self.checker.numeric_adds.contains(&id);
        self.emit_binary_op(op, numeric_proven);
        Ok(())
    }

    /// Operator application for two stacked operands.
    pub(crate) fn emit_binary_op(&mut self, op: BinaryOp, numeric_add: bool) {
        match op {
            BinaryOp::Add if numeric_add => {
                self.emit(Op::NumAdd);
            }
            BinaryOp::Add => self.helper(RtHelper::Add, 2),
            BinaryOp::Sub => {
                self.emit(Op::Sub);
            }
            BinaryOp::Mul => {
                self.emit(Op::Mul);
            }
            BinaryOp::Div => {
                self.emit(Op::Div);
            }
            BinaryOp::Mod => {
                self.emit(Op::Mod);
            }
            BinaryOp::Pow => {
                self.emit(Op::Pow);
            }
            BinaryOp::BitAnd => {
                self.emit(Op::BitAnd);
            }
            BinaryOp::BitOr => {
                self.emit(Op::BitOr);
            }
            BinaryOp::BitXor => {
                self.emit(Op::BitXor);
            }
            BinaryOp::Shl => {
                self.emit(Op::Shl);
            }
            BinaryOp::Shr => {
                self.emit(Op::Shr);
            }
            BinaryOp::UShr => self.helper(RtHelper::UnsignedShiftRight, 2),
            BinaryOp::EqEq => self.helper(RtHelper::Equals, 2),
            BinaryOp::NotEq => {
                self.helper(RtHelper::Equals, 2);
                self.emit(Op::Not);
            }
            BinaryOp::StrictEq => {
                self.emit(Op::StrictEq);
            }
            BinaryOp::StrictNotEq => {
                self.emit(Op::StrictNeq);
            }
            BinaryOp::Less => {
                self.emit(Op::Less);
            }
            BinaryOp::LessEq => {
                self.emit(Op::LessEq);
            }
            BinaryOp::Greater => {
                self.emit(Op::Greater);
            }
            BinaryOp::GreaterEq => {
                self.emit(Op::GreaterEq);
            }
            BinaryOp::In => {
                self.emit(Op::HasPropOp);
            }
            BinaryOp::Instanceof => {
                self.emit(Op::InstanceofOp);
            }
        }
    }

    fn emit_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<(), Diagnostic> {
        if op == UnaryOp::Typeof {
            // typeof of an unresolved name must not throw.
            if let ExprKind::Variable { name } = &operand.kind {
                if self.distance_of(operand.id).is_none() {
                    let idx = self.str_const(name);
                    self.emit(Op::LoadGlobalSoft(idx));
                    self.emit(Op::TypeofOp);
                    return Ok(());
                }
            }
        }
        if op == UnaryOp::Delete {
            match &operand.kind {
                ExprKind::Get { object, name, .. } => {
                    self.emit_expr(object)?;
                    let idx = self.str_const(name);
                    self.emit(Op::DeleteProp(idx));
                    return Ok(());
                }
                ExprKind::GetIndex { object, index, .. } => {
                    self.emit_expr(object)?;
                    self.emit_expr(index)?;
                    self.emit(Op::DeleteIndex);
                    return Ok(());
                }
                _ => {
                    self.emit_expr(operand)?;
                    self.emit(Op::Pop);
                    self.emit(Op::True);
                    return Ok(());
                }
            }
        }
        self.emit_expr(operand)?;
        match op {
            UnaryOp::Neg => {
                self.emit(Op::Neg);
            }
            UnaryOp::Plus => {
                self.emit(Op::ToNum);
            }
            UnaryOp::Not => {
                self.emit(Op::Not);
            }
            UnaryOp::BitNot => {
                self.emit(Op::BitNot);
            }
            UnaryOp::Typeof => {
                self.emit(Op::TypeofOp);
            }
            UnaryOp::Void => {
                self.emit(Op::Pop);
                self.emit(Op::Undefined);
            }
            UnaryOp::Delete => unreachable!("handled above"),
        }
        Ok(())
    }

    fn emit_increment(
        &mut self,
        target: &Expr,
        negative: bool,
        prefix: bool,
        span: Span,
    ) -> Result<(), Diagnostic> {
        let delta = if negative { -1.0 } else { 1.0 };
        match &target.kind {
            ExprKind::Variable { name } => {
                self.emit_variable_read(target.id, name, span)?;
                self.emit(Op::ToNum);
                if !prefix {
                    self.emit(Op::Dup);
                }
                self.emit_number(delta);
                self.emit(Op::NumAdd);
                if prefix {
                    self.emit(Op::Dup);
                    self.emit_variable_write(target.id, name, span)?;
                } else {
                    self.emit_variable_write(target.id, name, span)?;
                }
                Ok(())
            }
            ExprKind::Get { object, name, .. } => {
                let tmp_obj = self.alloc_temp();
                let tmp_old = self.alloc_temp();
                self.emit_expr(object)?;
                self.emit(Op::StoreVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                let idx = self.str_const(name);
                self.emit(Op::GetProp(idx));
                self.emit(Op::ToNum);
                self.emit(Op::StoreVar {
                    depth: 0,
                    slot: tmp_old,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_old,
                });
                self.emit_number(delta);
                self.emit(Op::NumAdd);
                self.emit(Op::SetProp(idx));
                if !prefix {
                    self.emit(Op::Pop);
                    self.emit(Op::LoadVar {
                        depth: 0,
                        slot: tmp_old,
                    });
                }
                Ok(())
            }
            ExprKind::GetIndex { object, index, .. } => {
                let tmp_obj = self.alloc_temp();
                let tmp_idx = self.alloc_temp();
                let tmp_old = self.alloc_temp();
                self.emit_expr(object)?;
                self.emit(Op::StoreVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                self.emit_expr(index)?;
                self.emit(Op::StoreVar {
                    depth: 0,
                    slot: tmp_idx,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_idx,
                });
                self.emit(Op::GetIndexOp);
                self.emit(Op::ToNum);
                self.emit(Op::StoreVar {
                    depth: 0,
                    slot: tmp_old,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_idx,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_old,
                });
                self.emit_number(delta);
                self.emit(Op::NumAdd);
                self.emit(Op::SetIndexOp);
                if !prefix {
                    self.emit(Op::Pop);
                    self.emit(Op::LoadVar {
                        depth: 0,
                        slot: tmp_old,
                    });
                }
                Ok(())
            }
            _ => Err(Diagnostic::emit("invalid increment target", span)),
        }
    }

    // =========================================================================
    // Member / call chains
    // =========================================================================

    fn emit_chain_root(&mut self, expr: &Expr) -> Result<(), Diagnostic> {
        if spine_has_optional(expr) {
            let mut patches = Vec::new();
            self.emit_chain(expr, &mut Some(&mut patches))?;
            let done = self.emit(Op::Jump(0));
            for p in patches {
                self.patch_jump(p);
            }
            self.emit(Op::Pop);
            self.emit(Op::Undefined);
            self.patch_jump(done);
            Ok(())
        } else {
            self.emit_chain(expr, &mut None)
        }
    }

    fn bail(&mut self, patches: &mut Option<&mut Vec<usize>>) {
        if let Some(patches) = patches {
            self.emit(Op::Dup);
            let at = self.emit(Op::JumpIfNullish(0));
            patches.push(at);
        }
    }

    fn emit_chain(
        &mut self,
        expr: &Expr,
        patches: &mut Option<&mut Vec<usize>>,
    ) -> Result<(), Diagnostic> {
        match &expr.kind {
            ExprKind::Get {
                object,
                name,
                optional,
            } => {
                // Enum member reads fold to constants.
                if let Some(value) = self.checker.enum_member_consts.get(&expr.id).cloned() {
                    match value {
                        tsb_checker::EnumConst::Num(n) => self.emit_number(n),
                        tsb_checker::EnumConst::Str(s) => self.emit_str(&s),
                    }
                    return Ok(());
                }
                if let ExprKind::Super = object.kind {
                    return self.emit_super_member(object.id, expr.id, name, expr.span, None);
                }
                self.emit_chain(object, patches)?;
                if *optional {
                    self.bail(patches);
                }
                let idx = self.str_const(name);
                if self.checker.proven_access.contains(&expr.id) {
                    self.emit(Op::GetPropDirect(idx));
                } else {
                    self.emit(Op::GetProp(idx));
                }
                Ok(())
            }
            ExprKind::GetIndex {
                object,
                index,
                optional,
            } => {
                self.emit_chain(object, patches)?;
                if *optional {
                    self.bail(patches);
                }
                self.emit_expr(index)?;
                self.emit(Op::GetIndexOp);
                Ok(())
            }
            ExprKind::GetPrivate { object, name } => {
                self.emit_chain(object, patches)?;
                let idx = self.str_const(&format!("#{name}"));
                self.emit(Op::GetPrivate(idx));
                Ok(())
            }
            ExprKind::CallPrivate { object, name, args } => {
                self.emit_chain(object, patches)?;
                for a in args {
                    self.emit_expr(a)?;
                }
                let idx = self.str_const(&format!("#{name}"));
                self.emit(Op::CallMethod {
                    name: idx,
                    argc: args.len() as u8,
                });
                Ok(())
            }
            ExprKind::Call {
                callee,
                args,
                optional,
            } => self.emit_call(callee, args, *optional, patches, expr.span),
            _ => self.emit_expr(expr),
        }
    }

    fn emit_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        optional: bool,
        patches: &mut Option<&mut Vec<usize>>,
        span: Span,
    ) -> Result<(), Diagnostic> {
        let has_spread = args.iter().any(|a| matches!(a.kind, ExprKind::Spread { .. }));

        // super(...)
        if let ExprKind::Super = callee.kind {
            if has_spread {
                return Err(Diagnostic::emit("spread in super() is not supported", span));
            }
            self.emit_this_and_super(callee.id, span)?;
            for a in args {
                self.emit_expr(a)?;
            }
            self.emit(Op::CallSuperCtor {
                argc: args.len() as u8,
            });
            return Ok(());
        }
        // super.m(...)
        if let ExprKind::Get {
            object,
            name,
            ..
        } = &callee.kind
        {
            if let ExprKind::Super = object.kind {
                if has_spread {
                    return Err(Diagnostic::emit(
                        "spread in super method calls is not supported",
                        span,
                    ));
                }
                self.emit_this_and_super(object.id, span)?;
                for a in args {
                    self.emit_expr(a)?;
                }
                let idx = self.str_const(name);
                self.emit(Op::CallSuperMethod {
                    name: idx,
                    argc: args.len() as u8,
                });
                return Ok(());
            }
        }

        match &callee.kind {
            // Method calls keep the receiver for `this`.
            ExprKind::Get {
                object,
                name,
                optional: opt_get,
            } if !optional && !has_spread => {
                self.emit_chain(object, patches)?;
                if *opt_get {
                    self.bail(patches);
                }
                for a in args {
                    self.emit_expr(a)?;
                }
                let idx = self.str_const(name);
                self.emit(Op::CallMethod {
                    name: idx,
                    argc: args.len() as u8,
                });
                Ok(())
            }
            ExprKind::Get {
                object,
                name,
                optional: opt_get,
            } => {
                // Optional or spread method call through the invoke helper.
                let tmp_obj = self.alloc_temp();
                self.emit_chain(object, patches)?;
                if *opt_get {
                    self.bail(patches);
                }
                self.emit(Op::StoreVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                let idx = self.str_const(name);
                self.emit(Op::GetProp(idx));
                if optional {
                    self.bail(patches);
                }
                self.emit(Op::LoadVar {
                    depth: 0,
                    slot: tmp_obj,
                });
                self.emit_args_array(args)?;
                self.helper(RtHelper::InvokeWithThis, 3);
                Ok(())
            }
            _ => {
                self.emit_chain(callee, patches)?;
                if optional {
                    self.bail(patches);
                }
                if has_spread {
                    self.emit_args_array(args)?;
                    self.helper(RtHelper::InvokeValue, 2);
                } else {
                    for a in args {
                        self.emit_expr(a)?;
                    }
                    self.emit(Op::Call {
                        argc: args.len() as u8,
                    });
                }
                Ok(())
            }
        }
    }

    fn emit_args_array(&mut self, args: &[Expr]) -> Result<(), Diagnostic> {
        self.emit(Op::MakeArray(0));
        for a in args {
            if let ExprKind::Spread { expr: inner } = &a.kind {
                self.emit_expr(inner)?;
                self.helper(RtHelper::ConcatArrays, 2);
            } else {
                self.emit_expr(a)?;
                self.emit(Op::ArrayPush);
            }
        }
        Ok(())
    }

    /// Push `this` then the superclass value, for super dispatch.
    fn emit_this_and_super(&mut self, super_id: NodeId, span: Span) -> Result<(), Diagnostic> {
        let super_d = self.distance_of(super_id).ok_or_else(|| {
            Diagnostic::emit("'super' used outside a subclass member", span)
        })?;
        // `this` lives one scope inside the `super` scope.
        let this_d = super_d - 1;
        let (depth, slot) = self.slot_at_distance("this", this_d, span)?;
        self.emit(Op::LoadVar { depth, slot });
        let (depth, slot) = self.slot_at_distance("super", super_d, span)?;
        self.emit(Op::LoadVar { depth, slot });
        Ok(())
    }

    fn emit_super_member(
        &mut self,
        super_id: NodeId,
        _get_id: NodeId,
        name: &str,
        span: Span,
        _patches: Option<()>,
    ) -> Result<(), Diagnostic> {
        self.emit_this_and_super(super_id, span)?;
        let idx = self.str_const(name);
        self.emit(Op::GetSuperProp(idx));
        Ok(())
    }
}

/// Does the member/call spine of this expression contain an optional link?
fn spine_has_optional(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Get {
            object, optional, ..
        }
        | ExprKind::GetIndex {
            object, optional, ..
        } => *optional || spine_has_optional(object),
        ExprKind::Call {
            callee, optional, ..
        } => *optional || spine_has_optional(callee),
        ExprKind::GetPrivate { object, .. } | ExprKind::CallPrivate { object, .. } => {
            spine_has_optional(object)
        }
        _ => false,
    }
}
