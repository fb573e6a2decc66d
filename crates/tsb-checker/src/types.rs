//! `TypeInfo` and the declaration tables.
//!
//! Nominal declarations (classes, interfaces, enums, namespaces) live in
//! arena-style tables on the `CheckerContext` and are referenced by index, so
//! `TypeInfo` stays a plain cloneable value with no reference cycles even for
//! mutually recursive classes.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tsb_parser::ast::Access;

pub type ClassId = usize;
pub type InterfaceId = usize;
pub type EnumId = usize;
pub type NamespaceId = usize;

/// The type of an expression or binding.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeInfo {
    Any,
    Number,
    Str,
    Boolean,
    Null,
    Undefined,
    Void,
    BigInt,
    Symbol,
    Array(Box<TypeInfo>),
    Tuple {
        elems: Vec<TypeInfo>,
        rest: Option<Box<TypeInfo>>,
    },
    Union(Vec<TypeInfo>),
    /// Anonymous object type.
    Record(IndexMap<String, TypeInfo>),
    Function(Box<FunctionType>),
    /// Overload set; the final signature is the implementation.
    Overloaded(Vec<FunctionType>),
    /// The class value itself (constructor object). Generic class
    /// definitions are `Class` whose data carries type parameters.
    Class(ClassId),
    /// An instance. `args` instantiate the class's type parameters and are
    /// empty for non-generic classes.
    Instance {
        class: ClassId,
        args: Vec<TypeInfo>,
    },
    Interface(InterfaceId),
    Enum(EnumId),
    Namespace(NamespaceId),
    Date,
    RegExp,
    MapTy(Box<TypeInfo>, Box<TypeInfo>),
    SetTy(Box<TypeInfo>),
    WeakMapTy(Box<TypeInfo>, Box<TypeInfo>),
    WeakSetTy(Box<TypeInfo>),
    Promise(Box<TypeInfo>),
    /// An in-scope type parameter, replaced by substitution.
    TypeParam(String),
}

impl TypeInfo {
    pub fn is_nullish(&self) -> bool {
        matches!(self, TypeInfo::Null | TypeInfo::Undefined)
    }

    pub fn array(elem: TypeInfo) -> TypeInfo {
        TypeInfo::Array(Box::new(elem))
    }

    pub fn promise(inner: TypeInfo) -> TypeInfo {
        TypeInfo::Promise(Box::new(inner))
    }

    pub fn union(mut parts: Vec<TypeInfo>) -> TypeInfo {
        parts.dedup();
        if parts.len() == 1 {
            parts.pop().expect("one element")
        } else {
            TypeInfo::Union(parts)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionType {
    pub params: Vec<TypeInfo>,
    pub ret: TypeInfo,
    /// Parameters without defaults and not optional.
    pub required: usize,
    pub has_rest: bool,
}

impl FunctionType {
    pub fn new(params: Vec<TypeInfo>, ret: TypeInfo) -> Self {
        let required = params.len();
        FunctionType {
            params,
            ret,
            required,
            has_rest: false,
        }
    }

    pub fn with_required(mut self, required: usize) -> Self {
        self.required = required;
        self
    }

    pub fn with_rest(mut self) -> Self {
        self.has_rest = true;
        self
    }

    pub fn into_type(self) -> TypeInfo {
        TypeInfo::Function(Box::new(self))
    }
}

/// A class member (field, method, getter, setter, or static).
#[derive(Clone, Debug)]
pub struct MemberDef {
    pub ty: TypeInfo,
    pub access: Access,
    pub readonly: bool,
    pub declaring: ClassId,
}

#[derive(Clone, Debug, Default)]
pub struct ClassData {
    pub name: String,
    pub type_params: Vec<String>,
    pub superclass: Option<(ClassId, Vec<TypeInfo>)>,
    pub fields: IndexMap<String, MemberDef>,
    pub methods: IndexMap<String, MemberDef>,
    pub getters: IndexMap<String, MemberDef>,
    pub setters: IndexMap<String, MemberDef>,
    /// Static fields and methods share one table.
    pub statics: IndexMap<String, MemberDef>,
    pub ctor: Option<FunctionType>,
}

impl ClassData {
    /// Instance type of this class with its own parameters as arguments.
    pub fn self_instance(&self, id: ClassId) -> TypeInfo {
        TypeInfo::Instance {
            class: id,
            args: self
                .type_params
                .iter()
                .map(|p| TypeInfo::TypeParam(p.clone()))
                .collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct InterfaceMemberDef {
    pub ty: TypeInfo,
    pub optional: bool,
    pub readonly: bool,
}

#[derive(Clone, Debug, Default)]
pub struct InterfaceData {
    pub name: String,
    pub type_params: Vec<String>,
    pub extends: Vec<TypeInfo>,
    pub members: IndexMap<String, InterfaceMemberDef>,
}

/// A compile-time enum member value.
#[derive(Clone, Debug, PartialEq)]
pub enum EnumConst {
    Num(f64),
    Str(String),
}

#[derive(Clone, Debug, Default)]
pub struct EnumData {
    pub name: String,
    pub members: IndexMap<String, EnumConst>,
}

impl EnumData {
    pub fn member_type(&self, name: &str) -> Option<TypeInfo> {
        self.members.get(name).map(|c| match c {
            EnumConst::Num(_) => TypeInfo::Number,
            EnumConst::Str(_) => TypeInfo::Str,
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct NamespaceData {
    pub name: String,
    /// Exported values of the namespace.
    pub members: IndexMap<String, TypeInfo>,
}

/// Substitution of type parameters. Applying a map twice is a fixpoint:
/// substituted results contain no parameter that the map covers.
pub fn substitute(ty: &TypeInfo, map: &FxHashMap<String, TypeInfo>) -> TypeInfo {
    if map.is_empty() {
        return ty.clone();
    }
    match ty {
        TypeInfo::TypeParam(name) => map.get(name).cloned().unwrap_or_else(|| ty.clone()),
        TypeInfo::Array(elem) => TypeInfo::Array(Box::new(substitute(elem, map))),
        TypeInfo::Tuple { elems, rest } => TypeInfo::Tuple {
            elems: elems.iter().map(|t| substitute(t, map)).collect(),
            rest: rest.as_ref().map(|t| Box::new(substitute(t, map))),
        },
        TypeInfo::Union(parts) => {
            TypeInfo::union(parts.iter().map(|t| substitute(t, map)).collect())
        }
        TypeInfo::Record(fields) => TypeInfo::Record(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), substitute(v, map)))
                .collect(),
        ),
        TypeInfo::Function(f) => substitute_fn(f, map).into_type(),
        TypeInfo::Overloaded(sigs) => {
            TypeInfo::Overloaded(sigs.iter().map(|f| substitute_fn(f, map)).collect())
        }
        TypeInfo::Instance { class, args } => TypeInfo::Instance {
            class: *class,
            args: args.iter().map(|t| substitute(t, map)).collect(),
        },
        TypeInfo::MapTy(k, v) => TypeInfo::MapTy(
            Box::new(substitute(k, map)),
            Box::new(substitute(v, map)),
        ),
        TypeInfo::SetTy(e) => TypeInfo::SetTy(Box::new(substitute(e, map))),
        TypeInfo::WeakMapTy(k, v) => TypeInfo::WeakMapTy(
            Box::new(substitute(k, map)),
            Box::new(substitute(v, map)),
        ),
        TypeInfo::WeakSetTy(e) => TypeInfo::WeakSetTy(Box::new(substitute(e, map))),
        TypeInfo::Promise(inner) => TypeInfo::Promise(Box::new(substitute(inner, map))),
        other => other.clone(),
    }
}

/// Substitute through every signature of a function type, including each
/// overload.
pub fn substitute_fn(f: &FunctionType, map: &FxHashMap<String, TypeInfo>) -> FunctionType {
    FunctionType {
        params: f.params.iter().map(|t| substitute(t, map)).collect(),
        ret: substitute(&f.ret, map),
        required: f.required,
        has_rest: f.has_rest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution_replaces_parameters_everywhere() {
        let mut map = FxHashMap::default();
        map.insert("T".to_string(), TypeInfo::Number);
        let ty = TypeInfo::Array(Box::new(TypeInfo::TypeParam("T".to_string())));
        assert_eq!(substitute(&ty, &map), TypeInfo::array(TypeInfo::Number));

        let f = FunctionType::new(
            vec![TypeInfo::TypeParam("T".to_string())],
            TypeInfo::promise(TypeInfo::TypeParam("T".to_string())),
        )
        .into_type();
        let subbed = substitute(&f, &map);
        match subbed {
            TypeInfo::Function(f) => {
                assert_eq!(f.params[0], TypeInfo::Number);
                assert_eq!(f.ret, TypeInfo::promise(TypeInfo::Number));
            }
            other => panic!("expected function type, got {other:?}"),
        }
    }

    #[test]
    fn substitution_is_idempotent_at_fixpoint() {
        let mut map = FxHashMap::default();
        map.insert("T".to_string(), TypeInfo::Str);
        let ty = TypeInfo::Tuple {
            elems: vec![
                TypeInfo::TypeParam("T".to_string()),
                TypeInfo::TypeParam("U".to_string()),
            ],
            rest: None,
        };
        let once = substitute(&ty, &map);
        let twice = substitute(&once, &map);
        assert_eq!(once, twice);
    }

    #[test]
    fn union_constructor_collapses_duplicates() {
        let u = TypeInfo::union(vec![TypeInfo::Number, TypeInfo::Number]);
        assert_eq!(u, TypeInfo::Number);
    }
}
