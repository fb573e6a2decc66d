//! Property access resolution.
//!
//! The read path walks, in order: class statics, namespace members, enum
//! members, instance getters/fields/methods through the superclass chain
//! (substituting generic arguments level by level), interface and record
//! members, then the builtin member tables for primitives and collections.
//! Access modifiers are enforced against the enclosing class; the write path
//! additionally distinguishes setter-less getters and readonly fields.

use rustc_hash::FxHashMap;

use crate::context::CheckerContext;
use crate::types::{substitute, ClassId, EnumConst, FunctionType, TypeInfo};
use tsb_parser::ast::Access;

/// Where an access happens, for `private`/`protected`/`readonly` checks.
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessCtx {
    pub enclosing: Option<ClassId>,
    pub in_ctor: bool,
}

#[derive(Clone, Debug)]
pub enum Resolved {
    /// A readable member with this type.
    Member(TypeInfo),
    /// An enum member read, foldable to a constant.
    EnumMember(TypeInfo, EnumConst),
    NotFound,
}

#[derive(Clone, Debug)]
pub enum WriteResolved {
    /// Assignable; the value must be compatible with this type.
    Settable(TypeInfo),
    /// A getter exists but no setter.
    GetterOnly,
    NotFound,
}

/// Resolve `recv.name` for reading. `Err` carries an access-violation
/// message.
pub fn resolve_read(
    ctx: &CheckerContext,
    recv: &TypeInfo,
    name: &str,
    acc: AccessCtx,
) -> Result<Resolved, String> {
    match recv {
        TypeInfo::Any => Ok(Resolved::Member(TypeInfo::Any)),

        // Static members of a class value.
        TypeInfo::Class(id) => {
            let mut current = Some(*id);
            while let Some(cid) = current {
                let class = &ctx.classes[cid];
                if let Some(member) = class.statics.get(name) {
                    check_access(ctx, member.access, member.declaring, &class.name, name, acc)?;
                    return Ok(Resolved::Member(member.ty.clone()));
                }
                current = class.superclass.as_ref().map(|(s, _)| *s);
            }
            Ok(Resolved::NotFound)
        }

        TypeInfo::Namespace(id) => Ok(match ctx.namespaces[*id].members.get(name) {
            Some(ty) => Resolved::Member(ty.clone()),
            None => Resolved::NotFound,
        }),

        TypeInfo::Enum(id) => {
            let data = &ctx.enums[*id];
            match data.members.get(name) {
                Some(value) => Ok(Resolved::EnumMember(
                    data.member_type(name).expect("member exists"),
                    value.clone(),
                )),
                None => Ok(Resolved::NotFound),
            }
        }

        TypeInfo::Instance { class, args } => {
            instance_member(ctx, *class, args, name, acc).map(|found| match found {
                Some(ty) => Resolved::Member(ty),
                None => Resolved::NotFound,
            })
        }

        TypeInfo::Interface(id) => Ok(match interface_member(ctx, *id, name) {
            Some(ty) => Resolved::Member(ty),
            None => Resolved::NotFound,
        }),

        TypeInfo::Record(fields) => Ok(match fields.get(name) {
            Some(ty) => Resolved::Member(ty.clone()),
            None => Resolved::NotFound,
        }),

        TypeInfo::Union(parts) => {
            let mut results = Vec::new();
            for part in parts {
                if part.is_nullish() {
                    continue;
                }
                match resolve_read(ctx, part, name, acc)? {
                    Resolved::Member(ty) => results.push(ty),
                    Resolved::EnumMember(ty, _) => results.push(ty),
                    Resolved::NotFound => return Ok(Resolved::Member(TypeInfo::Any)),
                }
            }
            Ok(match results.len() {
                0 => Resolved::NotFound,
                _ => Resolved::Member(TypeInfo::union(results)),
            })
        }

        // Primitive and collection builtins.
        _ => Ok(match builtin_member(ctx, recv, name) {
            Some(ty) => Resolved::Member(ty),
            None => Resolved::NotFound,
        }),
    }
}

/// Resolve `recv.name = v`: setter, then field (readonly-checked), then
/// substituted generic members.
pub fn resolve_write(
    ctx: &CheckerContext,
    recv: &TypeInfo,
    name: &str,
    acc: AccessCtx,
) -> Result<WriteResolved, String> {
    match recv {
        TypeInfo::Any => Ok(WriteResolved::Settable(TypeInfo::Any)),

        TypeInfo::Class(id) => {
            let class = &ctx.classes[*id];
            match class.statics.get(name) {
                Some(member) => {
                    check_access(ctx, member.access, member.declaring, &class.name, name, acc)?;
                    Ok(WriteResolved::Settable(member.ty.clone()))
                }
                None => Ok(WriteResolved::NotFound),
            }
        }

        TypeInfo::Instance { class, args } => {
            let mut subst: FxHashMap<String, TypeInfo> = FxHashMap::default();
            let mut current = Some((*class, args.clone()));
            while let Some((cid, level_args)) = current {
                let data = &ctx.classes[cid];
                extend_substitution(&mut subst, &data.type_params, &level_args);
                if let Some(setter) = data.setters.get(name) {
                    check_access(ctx, setter.access, setter.declaring, &data.name, name, acc)?;
                    // A setter's type is its single parameter type.
                    let ty = match &setter.ty {
                        TypeInfo::Function(f) => {
                            f.params.first().cloned().unwrap_or(TypeInfo::Any)
                        }
                        other => other.clone(),
                    };
                    return Ok(WriteResolved::Settable(substitute(&ty, &subst)));
                }
                if let Some(field) = data.fields.get(name) {
                    check_access(ctx, field.access, field.declaring, &data.name, name, acc)?;
                    if field.readonly {
                        let inside_declaring = acc.enclosing == Some(field.declaring);
                        if !(inside_declaring && acc.in_ctor) {
                            return Err(format!(
                                "cannot assign to readonly property '{name}' of '{}'",
                                data.name
                            ));
                        }
                    }
                    return Ok(WriteResolved::Settable(substitute(&field.ty, &subst)));
                }
                if data.getters.contains_key(name) {
                    return Ok(WriteResolved::GetterOnly);
                }
                current = data
                    .superclass
                    .as_ref()
                    .map(|(s, sa)| (*s, sa.iter().map(|t| substitute(t, &subst)).collect()));
            }
            Ok(WriteResolved::NotFound)
        }

        TypeInfo::Record(fields) => Ok(match fields.get(name) {
            Some(ty) => WriteResolved::Settable(ty.clone()),
            None => WriteResolved::NotFound,
        }),

        TypeInfo::Interface(id) => {
            let iface = &ctx.interfaces[*id];
            match iface.members.get(name) {
                Some(m) if m.readonly => Err(format!(
                    "cannot assign to readonly property '{name}' of '{}'",
                    iface.name
                )),
                Some(m) => Ok(WriteResolved::Settable(m.ty.clone())),
                None => Ok(WriteResolved::NotFound),
            }
        }

        _ => Ok(WriteResolved::Settable(TypeInfo::Any)),
    }
}

/// Member lookup without access checks, for structural compatibility.
pub fn member_type_for_structural(
    ctx: &CheckerContext,
    ty: &TypeInfo,
    name: &str,
) -> Option<TypeInfo> {
    match ty {
        TypeInfo::Record(fields) => fields.get(name).cloned(),
        TypeInfo::Interface(id) => interface_member(ctx, *id, name),
        TypeInfo::Instance { class, args } => {
            instance_member(ctx, *class, args, name, AccessCtx::default())
                .ok()
                .flatten()
        }
        _ => builtin_member(ctx, ty, name),
    }
}

fn check_access(
    ctx: &CheckerContext,
    access: Access,
    declaring: ClassId,
    class_name: &str,
    member: &str,
    acc: AccessCtx,
) -> Result<(), String> {
    match access {
        Access::Public => Ok(()),
        Access::Private => {
            if acc.enclosing == Some(declaring) {
                Ok(())
            } else {
                Err(format!(
                    "property '{member}' is private and only accessible within class '{class_name}'"
                ))
            }
        }
        Access::Protected => match acc.enclosing {
            Some(enc) if ctx.is_subclass_of(enc, declaring) => Ok(()),
            _ => Err(format!(
                "property '{member}' is protected and only accessible within class '{class_name}' and its subclasses"
            )),
        },
    }
}

/// Instance member lookup: getter, field, method; then up the superclass
/// chain with generic substitution composed level by level.
fn instance_member(
    ctx: &CheckerContext,
    class: ClassId,
    args: &[TypeInfo],
    name: &str,
    acc: AccessCtx,
) -> Result<Option<TypeInfo>, String> {
    let mut subst: FxHashMap<String, TypeInfo> = FxHashMap::default();
    let mut current = Some((class, args.to_vec()));
    while let Some((cid, level_args)) = current {
        let data = &ctx.classes[cid];
        extend_substitution(&mut subst, &data.type_params, &level_args);
        if let Some(member) = data.getters.get(name) {
            check_access(ctx, member.access, member.declaring, &data.name, name, acc)?;
            // A getter resolves to its return type.
            let ty = match substitute(&member.ty, &subst) {
                TypeInfo::Function(f) => f.ret,
                other => other,
            };
            return Ok(Some(ty));
        }
        if let Some(member) = data.fields.get(name).or_else(|| data.methods.get(name)) {
            check_access(ctx, member.access, member.declaring, &data.name, name, acc)?;
            return Ok(Some(substitute(&member.ty, &subst)));
        }
        current = data
            .superclass
            .as_ref()
            .map(|(s, sa)| (*s, sa.iter().map(|t| substitute(t, &subst)).collect()));
    }
    Ok(None)
}

fn extend_substitution(
    subst: &mut FxHashMap<String, TypeInfo>,
    params: &[String],
    args: &[TypeInfo],
) {
    for (i, p) in params.iter().enumerate() {
        let arg = args.get(i).cloned().unwrap_or(TypeInfo::Any);
        subst.insert(p.clone(), arg);
    }
}

fn interface_member(ctx: &CheckerContext, id: usize, name: &str) -> Option<TypeInfo> {
    let iface = &ctx.interfaces[id];
    if let Some(m) = iface.members.get(name) {
        return Some(m.ty.clone());
    }
    for base in &iface.extends {
        if let TypeInfo::Interface(base_id) = base {
            if let Some(ty) = interface_member(ctx, *base_id, name) {
                return Some(ty);
            }
        }
    }
    None
}

// =============================================================================
// Builtin member tables
// =============================================================================

fn f(params: Vec<TypeInfo>, ret: TypeInfo) -> TypeInfo {
    FunctionType::new(params, ret).with_required(0).into_type()
}

fn f_rest(params: Vec<TypeInfo>, ret: TypeInfo) -> TypeInfo {
    FunctionType::new(params, ret)
        .with_required(0)
        .with_rest()
        .into_type()
}

/// Builtin members of primitives, collections, dates, regexes, and promises.
pub fn builtin_member(ctx: &CheckerContext, recv: &TypeInfo, name: &str) -> Option<TypeInfo> {
    use TypeInfo::*;
    let any = || TypeInfo::Any;
    match recv {
        Str => Some(match name {
            "length" => Number,
            "charAt" | "at" => f(vec![Number], Str),
            "charCodeAt" | "codePointAt" => f(vec![Number], Number),
            "indexOf" | "lastIndexOf" => f(vec![Str], Number),
            "includes" | "startsWith" | "endsWith" => f(vec![Str], Boolean),
            "slice" | "substring" => f(vec![Number, Number], Str),
            "toUpperCase" | "toLowerCase" | "trim" | "trimStart" | "trimEnd" | "toString" => {
                f(vec![], Str)
            }
            "split" => f(vec![Str], TypeInfo::array(Str)),
            "repeat" => f(vec![Number], Str),
            "padStart" | "padEnd" => f(vec![Number, Str], Str),
            "concat" => f_rest(vec![Str], Str),
            "replace" | "replaceAll" => f(vec![Str, Str], Str),
            "localeCompare" => f(vec![Str], Number),
            _ => return None,
        }),
        Number => Some(match name {
            "toFixed" => f(vec![TypeInfo::Number], Str),
            "toString" => f(vec![TypeInfo::Number], Str),
            _ => return None,
        }),
        Boolean => Some(match name {
            "toString" => f(vec![], Str),
            _ => return None,
        }),
        BigInt => Some(match name {
            "toString" => f(vec![], Str),
            _ => return None,
        }),
        Array(elem) => array_member(elem, name),
        Tuple { elems, .. } => {
            let elem = TypeInfo::union(elems.clone());
            array_member(&elem, name)
        }
        Date => Some(match name {
            "getTime" | "getFullYear" | "getMonth" | "getDate" | "getHours" | "getMinutes"
            | "getSeconds" | "getMilliseconds" | "valueOf" => f(vec![], Number),
            "toISOString" | "toString" => f(vec![], Str),
            _ => return None,
        }),
        RegExp => Some(match name {
            "test" => f(vec![Str], Boolean),
            "exec" => f(vec![Str], any()),
            "source" | "flags" => Str,
            "lastIndex" => Number,
            _ => return None,
        }),
        MapTy(k, v) => Some(match name {
            "get" => f(vec![(**k).clone()], TypeInfo::union(vec![(**v).clone(), Undefined])),
            "set" => f(vec![(**k).clone(), (**v).clone()], recv.clone()),
            "has" | "delete" => f(vec![(**k).clone()], Boolean),
            "clear" => f(vec![], Void),
            "size" => Number,
            "forEach" => f(vec![any()], Void),
            "keys" | "values" | "entries" => f(vec![], any()),
            _ => return None,
        }),
        SetTy(e) => Some(match name {
            "add" => f(vec![(**e).clone()], recv.clone()),
            "has" | "delete" => f(vec![(**e).clone()], Boolean),
            "clear" => f(vec![], Void),
            "size" => Number,
            "forEach" => f(vec![any()], Void),
            "keys" | "values" | "entries" => f(vec![], any()),
            "union" | "intersection" | "difference" | "symmetricDifference" => {
                f(vec![recv.clone()], recv.clone())
            }
            "isSubsetOf" | "isSupersetOf" | "isDisjointFrom" => f(vec![recv.clone()], Boolean),
            _ => return None,
        }),
        WeakMapTy(k, v) => Some(match name {
            "get" => f(vec![(**k).clone()], TypeInfo::union(vec![(**v).clone(), Undefined])),
            "set" => f(vec![(**k).clone(), (**v).clone()], recv.clone()),
            "has" | "delete" => f(vec![(**k).clone()], Boolean),
            _ => return None,
        }),
        WeakSetTy(e) => Some(match name {
            "add" => f(vec![(**e).clone()], recv.clone()),
            "has" | "delete" => f(vec![(**e).clone()], Boolean),
            _ => return None,
        }),
        Promise(t) => Some(match name {
            "then" => f(vec![any(), any()], TypeInfo::promise(any())),
            "catch" => f(vec![any()], TypeInfo::promise((**t).clone())),
            "finally" => f(vec![any()], TypeInfo::promise((**t).clone())),
            _ => return None,
        }),
        Enum(id) => ctx.enums[*id].member_type(name),
        _ => None,
    }
}

fn array_member(elem: &TypeInfo, name: &str) -> Option<TypeInfo> {
    use TypeInfo::*;
    let e = || elem.clone();
    let arr = || TypeInfo::array(elem.clone());
    let any = || TypeInfo::Any;
    Some(match name {
        "length" => Number,
        "push" | "unshift" => f_rest(vec![e()], Number),
        "pop" | "shift" => f(vec![], TypeInfo::union(vec![e(), Undefined])),
        "at" => f(vec![Number], TypeInfo::union(vec![e(), Undefined])),
        "slice" => f(vec![Number, Number], arr()),
        "splice" => f_rest(vec![Number, Number], arr()),
        "toSpliced" => f_rest(vec![Number, Number], arr()),
        "reverse" | "toReversed" => f(vec![], arr()),
        "sort" | "toSorted" => f(vec![any()], arr()),
        "with" => f(vec![Number, e()], arr()),
        "flat" => f(vec![Number], TypeInfo::array(any())),
        "flatMap" => f(vec![any()], TypeInfo::array(any())),
        "map" => f(vec![any()], TypeInfo::array(any())),
        "filter" => f(vec![any()], arr()),
        "forEach" => f(vec![any()], Void),
        "find" => f(vec![any()], TypeInfo::union(vec![e(), Undefined])),
        "findIndex" | "indexOf" | "lastIndexOf" => f(vec![any()], Number),
        "some" | "every" | "includes" => f(vec![any()], Boolean),
        "reduce" | "reduceRight" => f(vec![any(), any()], any()),
        "join" => f(vec![Str], Str),
        "concat" => f_rest(vec![any()], arr()),
        "keys" | "values" | "entries" => f(vec![], any()),
        "fill" => f(vec![e(), Number, Number], arr()),
        _ => return None,
    })
}
