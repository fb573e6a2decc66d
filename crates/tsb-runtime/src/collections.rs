//! Map, Set, WeakMap, WeakSet methods, including the ES2025 set operations.
//!
//! Weak collections share the strong implementations: the single-threaded
//! Rc-based runtime has no GC hooks to observe, so weakness degrades to
//! strong references (documented in DESIGN.md).

use crate::value::{JsSet, Ref, Value};
use crate::{throw_type_error, Host};

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

pub fn call_map_method(
    host: &mut dyn Host,
    map: &Ref<crate::value::JsMap>,
    name: &str,
    args: Vec<Value>,
    recv: &Value,
) -> Result<Value, Value> {
    match name {
        "get" => {
            let key = arg(&args, 0);
            let m = map.borrow();
            Ok(m.find(&key)
                .map(|i| m.entries[i].1.clone())
                .unwrap_or(Value::Undefined))
        }
        "set" => {
            let key = arg(&args, 0);
            let value = arg(&args, 1);
            let mut m = map.borrow_mut();
            match m.find(&key) {
                Some(i) => m.entries[i].1 = value,
                None => m.entries.push((key, value)),
            }
            Ok(recv.clone())
        }
        "has" => {
            let key = arg(&args, 0);
            Ok(Value::Bool(map.borrow().find(&key).is_some()))
        }
        "delete" => {
            let key = arg(&args, 0);
            let mut m = map.borrow_mut();
            match m.find(&key) {
                Some(i) => {
                    m.entries.remove(i);
                    Ok(Value::Bool(true))
                }
                None => Ok(Value::Bool(false)),
            }
        }
        "clear" => {
            map.borrow_mut().entries.clear();
            Ok(Value::Undefined)
        }
        "forEach" => {
            let cb = arg(&args, 0);
            let snapshot = map.borrow().entries.clone();
            for (k, v) in snapshot {
                host.call(cb.clone(), Value::Undefined, vec![v, k, recv.clone()])?;
            }
            Ok(Value::Undefined)
        }
        "keys" => {
            let keys: Vec<Value> = map.borrow().entries.iter().map(|(k, _)| k.clone()).collect();
            crate::iter::get_iterator(host, &Value::array(keys))
        }
        "values" => {
            let values: Vec<Value> =
                map.borrow().entries.iter().map(|(_, v)| v.clone()).collect();
            crate::iter::get_iterator(host, &Value::array(values))
        }
        "entries" => crate::iter::get_iterator(host, recv),
        _ => Err(throw_type_error(format!(
            "map method '{name}' is not supported"
        ))),
    }
}

pub fn call_set_method(
    host: &mut dyn Host,
    set: &Ref<JsSet>,
    name: &str,
    args: Vec<Value>,
    recv: &Value,
) -> Result<Value, Value> {
    match name {
        "add" => {
            let value = arg(&args, 0);
            let mut s = set.borrow_mut();
            if s.find(&value).is_none() {
                s.entries.push(value);
            }
            Ok(recv.clone())
        }
        "has" => Ok(Value::Bool(set.borrow().find(&arg(&args, 0)).is_some())),
        "delete" => {
            let mut s = set.borrow_mut();
            match s.find(&arg(&args, 0)) {
                Some(i) => {
                    s.entries.remove(i);
                    Ok(Value::Bool(true))
                }
                None => Ok(Value::Bool(false)),
            }
        }
        "clear" => {
            set.borrow_mut().entries.clear();
            Ok(Value::Undefined)
        }
        "forEach" => {
            let cb = arg(&args, 0);
            let snapshot = set.borrow().entries.clone();
            for v in snapshot {
                host.call(
                    cb.clone(),
                    Value::Undefined,
                    vec![v.clone(), v, recv.clone()],
                )?;
            }
            Ok(Value::Undefined)
        }
        "keys" | "values" => {
            let values = set.borrow().entries.clone();
            crate::iter::get_iterator(host, &Value::array(values))
        }
        "entries" => {
            let pairs: Vec<Value> = set
                .borrow()
                .entries
                .iter()
                .map(|v| Value::array(vec![v.clone(), v.clone()]))
                .collect();
            crate::iter::get_iterator(host, &Value::array(pairs))
        }
        // ES2025 set operations: the argument must be set-like.
        "union" => {
            let other = other_set(&arg(&args, 0))?;
            let mut out = set.borrow().entries.clone();
            for v in other {
                if !out.iter().any(|x| crate::ops::same_value_zero(x, &v)) {
                    out.push(v);
                }
            }
            Ok(make_set(out))
        }
        "intersection" => {
            let other = JsSet {
                entries: other_set(&arg(&args, 0))?,
            };
            let out: Vec<Value> = set
                .borrow()
                .entries
                .iter()
                .filter(|v| other.find(v).is_some())
                .cloned()
                .collect();
            Ok(make_set(out))
        }
        "difference" => {
            let other = JsSet {
                entries: other_set(&arg(&args, 0))?,
            };
            let out: Vec<Value> = set
                .borrow()
                .entries
                .iter()
                .filter(|v| other.find(v).is_none())
                .cloned()
                .collect();
            Ok(make_set(out))
        }
        "symmetricDifference" => {
            let other_entries = other_set(&arg(&args, 0))?;
            let other = JsSet {
                entries: other_entries.clone(),
            };
            let this = set.borrow();
            let mut out: Vec<Value> = this
                .entries
                .iter()
                .filter(|v| other.find(v).is_none())
                .cloned()
                .collect();
            for v in other_entries {
                if this.find(&v).is_none() {
                    out.push(v);
                }
            }
            Ok(make_set(out))
        }
        "isSubsetOf" => {
            let other = JsSet {
                entries: other_set(&arg(&args, 0))?,
            };
            Ok(Value::Bool(
                set.borrow().entries.iter().all(|v| other.find(v).is_some()),
            ))
        }
        "isSupersetOf" => {
            let other = other_set(&arg(&args, 0))?;
            let this = set.borrow();
            Ok(Value::Bool(other.iter().all(|v| this.find(v).is_some())))
        }
        "isDisjointFrom" => {
            let other = JsSet {
                entries: other_set(&arg(&args, 0))?,
            };
            Ok(Value::Bool(
                set.borrow().entries.iter().all(|v| other.find(v).is_none()),
            ))
        }
        _ => Err(throw_type_error(format!(
            "set method '{name}' is not supported"
        ))),
    }
}

fn make_set(entries: Vec<Value>) -> Value {
    Value::SetV(crate::value::make_ref(JsSet { entries }))
}

/// Accept a Set (or an array, for convenience) as the set-like operand.
fn other_set(v: &Value) -> Result<Vec<Value>, Value> {
    match v {
        Value::SetV(s) => Ok(s.borrow().entries.clone()),
        Value::Array(a) => Ok(a.borrow().clone()),
        _ => Err(throw_type_error("argument must be a Set")),
    }
}

/// Construct a Map/Set from an optional iterable of entries.
pub fn construct_map(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let mut map = crate::value::JsMap::default();
    if let Some(init) = args.first() {
        if !init.is_nullish() {
            for entry in crate::iter::collect_iterable(host, init)? {
                let Value::Array(pair) = &entry else {
                    return Err(throw_type_error("Map constructor expects [key, value] pairs"));
                };
                let pair = pair.borrow();
                let key = pair.first().cloned().unwrap_or(Value::Undefined);
                let value = pair.get(1).cloned().unwrap_or(Value::Undefined);
                match map.find(&key) {
                    Some(i) => map.entries[i].1 = value,
                    None => map.entries.push((key, value)),
                }
            }
        }
    }
    Ok(Value::MapV(crate::value::make_ref(map)))
}

pub fn construct_set(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let mut set = JsSet::default();
    if let Some(init) = args.first() {
        if !init.is_nullish() {
            for v in crate::iter::collect_iterable(host, init)? {
                if set.find(&v).is_none() {
                    set.entries.push(v);
                }
            }
        }
    }
    Ok(Value::SetV(crate::value::make_ref(set)))
}
