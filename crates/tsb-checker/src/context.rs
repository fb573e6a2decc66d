//! `CheckerContext` — the explicit state threaded through checking.
//!
//! All formerly-global registries (declaration tables, the side tables the
//! emitter consumes) are fields here; the context is created once per
//! compilation and handed to the emitter read-only afterwards.

use rustc_hash::{FxHashMap, FxHashSet};
use tsb_parser::ast::NodeId;

use crate::types::{
    ClassData, ClassId, EnumConst, EnumData, EnumId, InterfaceData, InterfaceId, NamespaceData,
    NamespaceId, TypeInfo,
};

/// How a type name resolves in a module's type environment.
#[derive(Clone, Debug)]
pub enum TypeBinding {
    Class(ClassId),
    Interface(InterfaceId),
    Enum(EnumId),
    Namespace(NamespaceId),
    Alias {
        params: Vec<String>,
        ty: TypeInfo,
    },
}

/// Everything a module exposes to its importers.
#[derive(Clone, Debug, Default)]
pub struct ModuleExports {
    pub values: FxHashMap<String, TypeInfo>,
    pub types: FxHashMap<String, TypeBinding>,
}

#[derive(Debug, Default)]
pub struct CheckerContext {
    pub classes: Vec<ClassData>,
    pub interfaces: Vec<InterfaceData>,
    pub enums: Vec<EnumData>,
    pub namespaces: Vec<NamespaceData>,
    /// Exports per module, keyed by the module's canonical path string.
    pub module_exports: FxHashMap<String, ModuleExports>,

    // ---- side tables consumed by the emitter ----
    /// `Binary(Add)` nodes where both operands are provably numeric, so the
    /// emitter can use the inline numeric add instead of the runtime helper.
    pub numeric_adds: FxHashSet<NodeId>,
    /// `Get`/`Set` nodes whose receiver class is proven; the emitter uses
    /// direct dispatch instead of the generic property helper.
    pub proven_access: FxHashSet<NodeId>,
    /// `Get` nodes that are enum member reads, folded to constants.
    pub enum_member_consts: FxHashMap<NodeId, EnumConst>,
}

impl CheckerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, data: ClassData) -> ClassId {
        self.classes.push(data);
        self.classes.len() - 1
    }

    pub fn add_interface(&mut self, data: InterfaceData) -> InterfaceId {
        self.interfaces.push(data);
        self.interfaces.len() - 1
    }

    pub fn add_enum(&mut self, data: EnumData) -> EnumId {
        self.enums.push(data);
        self.enums.len() - 1
    }

    pub fn add_namespace(&mut self, data: NamespaceData) -> NamespaceId {
        self.namespaces.push(data);
        self.namespaces.len() - 1
    }

    pub fn class(&self, id: ClassId) -> &ClassData {
        &self.classes[id]
    }

    /// Is `sub` the same class as `ancestor` or one of its subclasses?
    pub fn is_subclass_of(&self, sub: ClassId, ancestor: ClassId) -> bool {
        let mut current = Some(sub);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.classes[id].superclass.as_ref().map(|(s, _)| *s);
        }
        false
    }

    /// A short printable name for diagnostics.
    pub fn display_type(&self, ty: &TypeInfo) -> String {
        match ty {
            TypeInfo::Any => "any".into(),
            TypeInfo::Number => "number".into(),
            TypeInfo::Str => "string".into(),
            TypeInfo::Boolean => "boolean".into(),
            TypeInfo::Null => "null".into(),
            TypeInfo::Undefined => "undefined".into(),
            TypeInfo::Void => "void".into(),
            TypeInfo::BigInt => "bigint".into(),
            TypeInfo::Symbol => "symbol".into(),
            TypeInfo::Array(e) => format!("{}[]", self.display_type(e)),
            TypeInfo::Tuple { elems, .. } => {
                let parts: Vec<String> = elems.iter().map(|t| self.display_type(t)).collect();
                format!("[{}]", parts.join(", "))
            }
            TypeInfo::Union(parts) => {
                let parts: Vec<String> = parts.iter().map(|t| self.display_type(t)).collect();
                parts.join(" | ")
            }
            TypeInfo::Record(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", self.display_type(v)))
                    .collect();
                format!("{{{}}}", parts.join("; "))
            }
            TypeInfo::Function(f) => {
                let params: Vec<String> =
                    f.params.iter().map(|t| self.display_type(t)).collect();
                format!("({}) => {}", params.join(", "), self.display_type(&f.ret))
            }
            TypeInfo::Overloaded(sigs) => format!("overloaded function ({} signatures)", sigs.len()),
            TypeInfo::Class(id) => format!("typeof {}", self.classes[*id].name),
            TypeInfo::Instance { class, args } => {
                let name = &self.classes[*class].name;
                if args.is_empty() {
                    name.clone()
                } else {
                    let parts: Vec<String> = args.iter().map(|t| self.display_type(t)).collect();
                    format!("{name}<{}>", parts.join(", "))
                }
            }
            TypeInfo::Interface(id) => self.interfaces[*id].name.clone(),
            TypeInfo::Enum(id) => self.enums[*id].name.clone(),
            TypeInfo::Namespace(id) => format!("namespace {}", self.namespaces[*id].name),
            TypeInfo::Date => "Date".into(),
            TypeInfo::RegExp => "RegExp".into(),
            TypeInfo::MapTy(k, v) => format!(
                "Map<{}, {}>",
                self.display_type(k),
                self.display_type(v)
            ),
            TypeInfo::SetTy(e) => format!("Set<{}>", self.display_type(e)),
            TypeInfo::WeakMapTy(k, v) => format!(
                "WeakMap<{}, {}>",
                self.display_type(k),
                self.display_type(v)
            ),
            TypeInfo::WeakSetTy(e) => format!("WeakSet<{}>", self.display_type(e)),
            TypeInfo::Promise(inner) => format!("Promise<{}>", self.display_type(inner)),
            TypeInfo::TypeParam(name) => name.clone(),
        }
    }
}
