//! Reflection metadata: the `(target, propertyKey?, metadataKey) → value`
//! store behind the `Reflect.*Metadata` surface.
//!
//! This is the one documented process-wide singleton of the runtime; it
//! lives on `RuntimeCtx` so it stays explicit.

use crate::ops::strict_equals;
use crate::value::Value;

struct Entry {
    target: Value,
    property: Option<String>,
    key: String,
    value: Value,
}

#[derive(Default)]
pub struct MetadataStore {
    entries: Vec<Entry>,
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MetadataStore({} entries)", self.entries.len())
    }
}

impl MetadataStore {
    fn position(&self, target: &Value, property: Option<&str>, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| {
            e.key == key
                && e.property.as_deref() == property
                && strict_equals(&e.target, target)
        })
    }

    pub fn define(&mut self, key: String, value: Value, target: Value, property: Option<String>) {
        match self.position(&target, property.as_deref(), &key) {
            Some(i) => self.entries[i].value = value,
            None => self.entries.push(Entry {
                target,
                property,
                key,
                value,
            }),
        }
    }

    /// `getOwn`: exact target only.
    pub fn get_own(&self, key: &str, target: &Value, property: Option<&str>) -> Option<Value> {
        self.position(target, property, key)
            .map(|i| self.entries[i].value.clone())
    }

    /// `get`: walks the class hierarchy when the target is a class value.
    pub fn get(&self, key: &str, target: &Value, property: Option<&str>) -> Option<Value> {
        if let Some(v) = self.get_own(key, target, property) {
            return Some(v);
        }
        if let Value::Class(class) = target {
            let mut current = class.superclass.clone();
            while let Some(c) = current {
                let as_value = Value::Class(c.clone());
                if let Some(v) = self.get_own(key, &as_value, property) {
                    return Some(v);
                }
                current = c.superclass.clone();
            }
        }
        None
    }

    pub fn has(&self, key: &str, target: &Value, property: Option<&str>) -> bool {
        self.get(key, target, property).is_some()
    }

    pub fn has_own(&self, key: &str, target: &Value, property: Option<&str>) -> bool {
        self.get_own(key, target, property).is_some()
    }

    pub fn delete(&mut self, key: &str, target: &Value, property: Option<&str>) -> bool {
        match self.position(target, property, key) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn keys(&self, target: &Value, property: Option<&str>) -> Vec<String> {
        let mut out = Vec::new();
        for e in &self.entries {
            if e.property.as_deref() == property && strict_equals(&e.target, target) {
                if !out.contains(&e.key) {
                    out.push(e.key.clone());
                }
            }
        }
        out
    }
}

/// Argument unpacking for the `Reflect.*Metadata` builtin surface.
pub mod args {
    use crate::ops::to_display_string;
    use crate::value::Value;

    fn get(args: &[Value], i: usize) -> Value {
        args.get(i).cloned().unwrap_or(Value::Undefined)
    }

    fn property_of(v: Option<&Value>) -> Option<String> {
        match v {
            None | Some(Value::Undefined) => None,
            Some(other) => Some(to_display_string(other)),
        }
    }

    /// `defineMetadata(key, value, target, propertyKey?)`.
    pub fn define(args: &[Value]) -> (String, Value, Value, Option<String>) {
        (
            to_display_string(&get(args, 0)),
            get(args, 1),
            get(args, 2),
            property_of(args.get(3)),
        )
    }

    /// `getMetadata(key, target, propertyKey?)` and friends.
    pub fn query(args: &[Value]) -> (String, Value, Option<String>) {
        (
            to_display_string(&get(args, 0)),
            get(args, 1),
            property_of(args.get(2)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_then_get_round_trips() {
        let mut store = MetadataStore::default();
        let target = Value::str("target");
        store.define(
            "design:type".to_string(),
            Value::str("number"),
            target.clone(),
            Some("age".to_string()),
        );
        assert_eq!(
            store
                .get("design:type", &target, Some("age"))
                .and_then(|v| v.as_str().map(str::to_string)),
            Some("number".to_string())
        );
        assert!(store.has_own("design:type", &target, Some("age")));
        assert!(!store.has("design:type", &target, None));
    }

    #[test]
    fn delete_removes_only_the_exact_entry() {
        let mut store = MetadataStore::default();
        let target = Value::str("t");
        store.define("a".to_string(), Value::Number(1.0), target.clone(), None);
        store.define("b".to_string(), Value::Number(2.0), target.clone(), None);
        assert!(store.delete("a", &target, None));
        assert!(!store.delete("a", &target, None));
        assert_eq!(store.keys(&target, None), vec!["b".to_string()]);
    }
}
