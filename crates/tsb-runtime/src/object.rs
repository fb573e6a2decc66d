//! Property and index access, object construction, spread helpers.

use indexmap::IndexMap;
use std::rc::Rc;

use crate::iter;
use crate::ops::{to_display_string, to_integer_or_infinity};
use crate::value::{Closure, JsObject, Value};
use crate::{throw_type_error, Host};

/// JS ToPropertyKey.
pub fn property_key(v: &Value) -> String {
    match v {
        Value::Number(n) => crate::ops::format_number(*n),
        other => to_display_string(other),
    }
}

/// The generic property read: own properties first, then class getters and
/// methods up the superclass chain, then the native pseudo-properties.
pub fn get_property(host: &mut dyn Host, recv: &Value, name: &str) -> Result<Value, Value> {
    match recv {
        Value::Undefined | Value::Null => Err(throw_type_error(format!(
            "cannot read properties of {} (reading '{name}')",
            to_display_string(recv)
        ))),
        Value::Object(obj) => {
            let maybe = {
                let obj = obj.borrow();
                if let Some(v) = obj.props.get(name) {
                    Some(v.clone())
                } else if let Some(class) = obj.class.clone() {
                    if let Some((slot, owner)) = class.find_getter(name) {
                        let getter = Value::Function(Rc::new(Closure {
                            func: slot.func,
                            env: owner_env(&class, owner),
                            bound_this: Some(recv.clone()),
                            name: name.to_string(),
                        }));
                        drop(obj);
                        return host.call(getter, recv.clone(), Vec::new());
                    }
                    class.find_method(name).map(|(slot, owner)| {
                        Value::Function(Rc::new(Closure {
                            func: slot.func,
                            env: owner_env(&class, owner),
                            bound_this: Some(recv.clone()),
                            name: name.to_string(),
                        }))
                    })
                } else {
                    None
                }
            };
            Ok(maybe.unwrap_or(Value::Undefined))
        }
        Value::Class(class) => Ok(class.find_static(name).unwrap_or(Value::Undefined)),
        Value::Array(items) => Ok(match name {
            "length" => Value::Number(items.borrow().len() as f64),
            _ => Value::Undefined,
        }),
        Value::Str(s) => Ok(match name {
            "length" => Value::Number(s.chars().count() as f64),
            _ => Value::Undefined,
        }),
        Value::MapV(m) => Ok(match name {
            "size" => Value::Number(m.borrow().entries.len() as f64),
            _ => Value::Undefined,
        }),
        Value::SetV(s) => Ok(match name {
            "size" => Value::Number(s.borrow().entries.len() as f64),
            _ => Value::Undefined,
        }),
        Value::RegExp(r) => Ok(match name {
            "source" => Value::str(&r.pattern),
            "flags" => Value::str(&r.flags),
            _ => Value::Undefined,
        }),
        Value::Writable(w) => {
            let w = w.borrow();
            Ok(match name {
                "writable" => Value::Bool(w.writable),
                "ended" | "writableEnded" => Value::Bool(w.ended),
                "finished" | "writableFinished" => Value::Bool(w.finished),
                "destroyed" => Value::Bool(w.destroyed),
                "corked" => Value::Number(w.corked as f64),
                "_writeCallback" => w.write_callback.clone(),
                "_finalCallback" => w.final_callback.clone(),
                _ => Value::Undefined,
            })
        }
        _ => Ok(Value::Undefined),
    }
}

fn owner_env(
    class: &Rc<crate::value::ClassValue>,
    owner: &crate::value::ClassValue,
) -> Rc<crate::value::Env> {
    // Find the Rc for the owning class along the chain so the method closes
    // over the right definition environment.
    let mut current = Some(Rc::clone(class));
    while let Some(c) = current {
        if std::ptr::eq(Rc::as_ptr(&c), owner as *const _) {
            return Rc::clone(&c.env);
        }
        current = c.superclass.clone();
    }
    Rc::clone(&class.env)
}

/// The generic property write: setters through the chain, then own
/// properties. Frozen objects ignore writes.
pub fn set_property(
    host: &mut dyn Host,
    recv: &Value,
    name: &str,
    value: Value,
) -> Result<(), Value> {
    match recv {
        Value::Undefined | Value::Null => Err(throw_type_error(format!(
            "cannot set properties of {} (setting '{name}')",
            to_display_string(recv)
        ))),
        Value::Object(obj) => {
            let setter = {
                let obj = obj.borrow();
                if obj.frozen {
                    return Ok(());
                }
                obj.class.clone().and_then(|class| {
                    class.find_setter(name).map(|(slot, owner)| {
                        Value::Function(Rc::new(Closure {
                            func: slot.func,
                            env: owner_env(&class, owner),
                            bound_this: Some(recv.clone()),
                            name: name.to_string(),
                        }))
                    })
                })
            };
            if let Some(setter) = setter {
                host.call(setter, recv.clone(), vec![value])?;
                return Ok(());
            }
            obj.borrow_mut().props.insert(name.to_string(), value);
            Ok(())
        }
        Value::Class(class) => {
            class.statics.borrow_mut().insert(name.to_string(), value);
            Ok(())
        }
        Value::Writable(w) => {
            match name {
                "_writeCallback" => w.borrow_mut().write_callback = value,
                "_finalCallback" => w.borrow_mut().final_callback = value,
                _ => {}
            }
            Ok(())
        }
        Value::Array(items) => {
            if name == "length" {
                let n = to_integer_or_infinity(&value).max(0) as usize;
                items.borrow_mut().resize(n, Value::Undefined);
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Indexed read: arrays, strings, maps, and objects.
pub fn get_index(host: &mut dyn Host, recv: &Value, index: &Value) -> Result<Value, Value> {
    match recv {
        Value::Array(items) => {
            if let Value::Number(n) = index {
                let items = items.borrow();
                let i = *n;
                if i.fract() == 0.0 && i >= 0.0 && (i as usize) < items.len() {
                    return Ok(items[i as usize].clone());
                }
                return Ok(Value::Undefined);
            }
            get_property(host, recv, &property_key(index))
        }
        Value::Str(s) => {
            if let Value::Number(n) = index {
                let i = *n;
                if i.fract() == 0.0 && i >= 0.0 {
                    if let Some(c) = s.chars().nth(i as usize) {
                        return Ok(Value::str(c.to_string()));
                    }
                }
                return Ok(Value::Undefined);
            }
            get_property(host, recv, &property_key(index))
        }
        Value::MapV(m) => {
            let m = m.borrow();
            Ok(m.find(index)
                .map(|i| m.entries[i].1.clone())
                .unwrap_or(Value::Undefined))
        }
        _ => get_property(host, recv, &property_key(index)),
    }
}

/// Indexed write: arrays grow with holes; maps insert; objects get props.
pub fn set_index(
    host: &mut dyn Host,
    recv: &Value,
    index: &Value,
    value: Value,
) -> Result<(), Value> {
    match recv {
        Value::Array(items) => {
            if let Value::Number(n) = index {
                let i = *n;
                if i.fract() == 0.0 && i >= 0.0 {
                    let mut items = items.borrow_mut();
                    let idx = i as usize;
                    if idx >= items.len() {
                        items.resize(idx + 1, Value::Undefined);
                    }
                    items[idx] = value;
                    return Ok(());
                }
            }
            Ok(())
        }
        Value::MapV(m) => {
            let mut m = m.borrow_mut();
            match m.find(index) {
                Some(i) => m.entries[i].1 = value,
                None => m.entries.push((index.clone(), value)),
            }
            Ok(())
        }
        _ => set_property(host, recv, &property_key(index), value),
    }
}

/// `{...source}` spread: copy enumerable own entries into `target`.
pub fn merge_into_object(host: &mut dyn Host, target: &Value, source: &Value) -> Result<(), Value> {
    let Value::Object(target_obj) = target else {
        return Err(throw_type_error("spread target must be an object"));
    };
    match source {
        Value::Undefined | Value::Null => Ok(()),
        Value::Object(src) => {
            let entries: Vec<(String, Value)> = src
                .borrow()
                .props
                .iter()
                .filter(|(k, _)| !k.starts_with('#'))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let mut t = target_obj.borrow_mut();
            for (k, v) in entries {
                t.props.insert(k, v);
            }
            Ok(())
        }
        Value::Array(items) => {
            let items: Vec<Value> = items.borrow().clone();
            let mut t = target_obj.borrow_mut();
            for (i, v) in items.into_iter().enumerate() {
                t.props.insert(i.to_string(), v);
            }
            Ok(())
        }
        Value::Str(s) => {
            let mut t = target_obj.borrow_mut();
            for (i, c) in s.chars().enumerate() {
                t.props.insert(i.to_string(), Value::str(c.to_string()));
            }
            Ok(())
        }
        _ => {
            let _ = host;
            Ok(())
        }
    }
}

/// Array spread / spread-call flattening: append `value`'s elements to
/// `target`, honoring the iterator protocol for non-array iterables.
pub fn concat_spread(host: &mut dyn Host, target: &Value, value: &Value) -> Result<(), Value> {
    let Value::Array(target_items) = target else {
        return Err(throw_type_error("spread target must be an array"));
    };
    match value {
        Value::Array(src) => {
            let src: Vec<Value> = src.borrow().clone();
            target_items.borrow_mut().extend(src);
            Ok(())
        }
        _ => {
            let items = iter::collect_iterable(host, value)?;
            target_items.borrow_mut().extend(items);
            Ok(())
        }
    }
}

/// `Object.keys` / `values` / `entries`.
pub fn object_keys(v: &Value) -> Vec<String> {
    match v {
        Value::Object(obj) => obj
            .borrow()
            .props
            .keys()
            .filter(|k| !k.starts_with('#') && !k.starts_with("__"))
            .cloned()
            .collect(),
        Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

pub fn create_object(props: Vec<(String, Value)>) -> Value {
    let mut obj = JsObject::plain();
    obj.props = props.into_iter().collect::<IndexMap<_, _>>();
    Value::object(obj)
}

/// `Object.freeze`: marks the object; writes become no-ops. Idempotent.
pub fn freeze(v: &Value) -> Value {
    if let Value::Object(obj) = v {
        obj.borrow_mut().frozen = true;
    }
    v.clone()
}

pub fn is_frozen(v: &Value) -> bool {
    match v {
        Value::Object(obj) => obj.borrow().frozen,
        _ => false,
    }
}

/// `Object.assign(target, ...sources)`.
pub fn object_assign(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let mut iter = args.into_iter();
    let target = iter.next().unwrap_or(Value::Undefined);
    for source in iter {
        merge_into_object(host, &target, &source)?;
    }
    Ok(target)
}
