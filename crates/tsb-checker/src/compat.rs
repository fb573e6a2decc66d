//! Assignability.
//!
//! `is_compatible(ctx, source, target)` — can a value of `source` be used
//! where `target` is expected. `any` is compatible in both directions;
//! unions cover when every branch covers; records cover covariantly by key;
//! function parameters are bivariant. `null`/`undefined` are assignable to
//! anything, matching the subset's non-strict model.

use crate::context::CheckerContext;
use crate::members;
use crate::types::{FunctionType, TypeInfo};

pub fn is_compatible(ctx: &CheckerContext, source: &TypeInfo, target: &TypeInfo) -> bool {
    if matches!(source, TypeInfo::Any) || matches!(target, TypeInfo::Any) {
        return true;
    }
    if source == target {
        return true;
    }
    if source.is_nullish() {
        return true;
    }
    match (source, target) {
        // Unions
        (TypeInfo::Union(parts), _) => parts.iter().all(|p| is_compatible(ctx, p, target)),
        (_, TypeInfo::Union(parts)) => parts.iter().any(|p| is_compatible(ctx, source, p)),

        // void accepts undefined-producing expressions; everything funnels
        // into void return positions.
        (_, TypeInfo::Void) => true,
        (TypeInfo::Void, TypeInfo::Undefined) => true,

        // Enum members are their base primitive.
        (TypeInfo::Enum(id), TypeInfo::Number) => ctx.enums[*id]
            .members
            .values()
            .all(|c| matches!(c, crate::types::EnumConst::Num(_))),

        // Arrays and tuples
        (TypeInfo::Array(a), TypeInfo::Array(b)) => is_compatible(ctx, a, b),
        (TypeInfo::Tuple { elems, .. }, TypeInfo::Array(b)) => {
            elems.iter().all(|e| is_compatible(ctx, e, b))
        }
        (TypeInfo::Tuple { elems: a, .. }, TypeInfo::Tuple { elems: b, .. }) => {
            a.len() == b.len()
                && a.iter().zip(b.iter()).all(|(x, y)| is_compatible(ctx, x, y))
        }

        // Collections are covariant in their element types.
        (TypeInfo::MapTy(ka, va), TypeInfo::MapTy(kb, vb)) => {
            is_compatible(ctx, ka, kb) && is_compatible(ctx, va, vb)
        }
        (TypeInfo::SetTy(a), TypeInfo::SetTy(b)) => is_compatible(ctx, a, b),
        (TypeInfo::WeakMapTy(ka, va), TypeInfo::WeakMapTy(kb, vb)) => {
            is_compatible(ctx, ka, kb) && is_compatible(ctx, va, vb)
        }
        (TypeInfo::WeakSetTy(a), TypeInfo::WeakSetTy(b)) => is_compatible(ctx, a, b),
        (TypeInfo::Promise(a), TypeInfo::Promise(b)) => is_compatible(ctx, a, b),

        // Instances are nominal through the superclass chain.
        (
            TypeInfo::Instance { class: a, args: aa },
            TypeInfo::Instance { class: b, args: ba },
        ) => {
            if a == b {
                aa.len() == ba.len()
                    && aa.iter().zip(ba.iter()).all(|(x, y)| is_compatible(ctx, x, y))
            } else {
                ctx.is_subclass_of(*a, *b)
            }
        }

        // Structural targets: every member of the target must be present and
        // covariantly compatible on the source.
        (_, TypeInfo::Record(fields)) => fields.iter().all(|(name, want)| {
            members::member_type_for_structural(ctx, source, name)
                .map(|got| is_compatible(ctx, &got, want))
                .unwrap_or(false)
        }),
        (_, TypeInfo::Interface(id)) => {
            let iface = &ctx.interfaces[*id];
            let ok = iface.members.iter().all(|(name, m)| {
                if m.optional {
                    return true;
                }
                members::member_type_for_structural(ctx, source, name)
                    .map(|got| is_compatible(ctx, &got, &m.ty))
                    .unwrap_or(false)
            });
            ok && iface
                .extends
                .iter()
                .all(|base| is_compatible(ctx, source, base))
        }
        // Functions: bivariant parameters, covariant return.
        (TypeInfo::Function(a), TypeInfo::Function(b)) => function_compatible(ctx, a, b),
        (TypeInfo::Overloaded(sigs), TypeInfo::Function(b)) => {
            sigs.iter().any(|a| function_compatible(ctx, a, b))
        }

        _ => false,
    }
}

fn function_compatible(ctx: &CheckerContext, a: &FunctionType, b: &FunctionType) -> bool {
    if a.required > b.params.len() && !b.has_rest {
        return false;
    }
    let pairs = a.params.iter().zip(b.params.iter());
    let params_ok = pairs.into_iter().all(|(pa, pb)| {
        // Bivariance keeps the subset's callback patterns checkable.
        is_compatible(ctx, pa, pb) || is_compatible(ctx, pb, pa)
    });
    params_ok && (matches!(b.ret, TypeInfo::Void) || is_compatible(ctx, &a.ret, &b.ret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassData, FunctionType};
    use indexmap::IndexMap;

    #[test]
    fn any_is_compatible_both_ways() {
        let ctx = CheckerContext::new();
        assert!(is_compatible(&ctx, &TypeInfo::Any, &TypeInfo::Number));
        assert!(is_compatible(&ctx, &TypeInfo::Number, &TypeInfo::Any));
    }

    #[test]
    fn union_source_requires_every_branch() {
        let ctx = CheckerContext::new();
        let num_or_str = TypeInfo::Union(vec![TypeInfo::Number, TypeInfo::Str]);
        assert!(!is_compatible(&ctx, &num_or_str, &TypeInfo::Number));
        assert!(is_compatible(&ctx, &TypeInfo::Number, &num_or_str));
        assert!(is_compatible(&ctx, &num_or_str, &num_or_str));
    }

    #[test]
    fn record_target_checks_each_key_covariantly() {
        let ctx = CheckerContext::new();
        let mut smaller = IndexMap::new();
        smaller.insert("x".to_string(), TypeInfo::Number);
        let mut bigger = IndexMap::new();
        bigger.insert("x".to_string(), TypeInfo::Number);
        bigger.insert("y".to_string(), TypeInfo::Str);
        let smaller = TypeInfo::Record(smaller);
        let bigger = TypeInfo::Record(bigger);
        assert!(is_compatible(&ctx, &bigger, &smaller));
        assert!(!is_compatible(&ctx, &smaller, &bigger));
    }

    #[test]
    fn subclass_instances_are_assignable_to_base() {
        let mut ctx = CheckerContext::new();
        let base = ctx.add_class(ClassData {
            name: "Base".into(),
            ..Default::default()
        });
        let derived = ctx.add_class(ClassData {
            name: "Derived".into(),
            superclass: Some((base, Vec::new())),
            ..Default::default()
        });
        let b = TypeInfo::Instance {
            class: base,
            args: vec![],
        };
        let d = TypeInfo::Instance {
            class: derived,
            args: vec![],
        };
        assert!(is_compatible(&ctx, &d, &b));
        assert!(!is_compatible(&ctx, &b, &d));
    }

    #[test]
    fn function_parameters_are_bivariant() {
        let ctx = CheckerContext::new();
        let takes_any = FunctionType::new(vec![TypeInfo::Any], TypeInfo::Void).into_type();
        let takes_num = FunctionType::new(vec![TypeInfo::Number], TypeInfo::Void).into_type();
        assert!(is_compatible(&ctx, &takes_any, &takes_num));
        assert!(is_compatible(&ctx, &takes_num, &takes_any));
    }
}
