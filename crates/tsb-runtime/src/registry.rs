//! The runtime helper symbol table.
//!
//! Emitted code references helpers by name; the artifact writer records the
//! referenced names in its symbol table and the loader binds them back to
//! these functions. Names are namespaced `rt.*` so a rewrite pass can remap
//! stale internal references onto this public surface.

use crate::value::Value;
use crate::{iter, json, object, ops, promise, Host};

pub type NativeFn = fn(&mut dyn Host, Vec<Value>) -> Result<Value, Value>;

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn rt_add(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    ops::add(&arg(&args, 0), &arg(&args, 1))
}

fn rt_equals(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::Bool(ops::equals(&arg(&args, 0), &arg(&args, 1))))
}

fn rt_strict_equals(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::Bool(ops::strict_equals(&arg(&args, 0), &arg(&args, 1))))
}

fn rt_is_truthy(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::Bool(ops::is_truthy(&arg(&args, 0))))
}

fn rt_stringify(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::str(ops::to_display_string(&arg(&args, 0))))
}

fn rt_type_of(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::str(ops::type_of(&arg(&args, 0))))
}

fn rt_instance_of(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    ops::instance_of(&arg(&args, 0), &arg(&args, 1)).map(Value::Bool)
}

fn rt_get_property(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let name = ops::to_display_string(&arg(&args, 1));
    object::get_property(host, &arg(&args, 0), &name)
}

fn rt_set_property(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let name = ops::to_display_string(&arg(&args, 1));
    object::set_property(host, &arg(&args, 0), &name, arg(&args, 2))?;
    Ok(Value::Undefined)
}

fn rt_get_index(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    object::get_index(host, &arg(&args, 0), &arg(&args, 1))
}

fn rt_set_index(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    object::set_index(host, &arg(&args, 0), &arg(&args, 1), arg(&args, 2))?;
    Ok(Value::Undefined)
}

fn rt_merge_into_object(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let target = arg(&args, 0);
    object::merge_into_object(host, &target, &arg(&args, 1))?;
    Ok(target)
}

fn rt_concat_arrays(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let target = arg(&args, 0);
    object::concat_spread(host, &target, &arg(&args, 1))?;
    Ok(target)
}

fn rt_create_array(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::array(args))
}

fn rt_create_object(_host: &mut dyn Host, _args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::object(crate::value::JsObject::plain()))
}

/// `(callee, argsArray)` — indirect call with a materialized argument list
/// (spread calls).
fn rt_invoke_value(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let callee = arg(&args, 0);
    let call_args = match arg(&args, 1) {
        Value::Array(items) => items.borrow().clone(),
        _ => Vec::new(),
    };
    ops::invoke_value(host, callee, call_args)
}

/// `(callee, this, argsArray)`.
fn rt_invoke_with_this(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let callee = arg(&args, 0);
    let this = arg(&args, 1);
    let call_args = match arg(&args, 2) {
        Value::Array(items) => items.borrow().clone(),
        _ => Vec::new(),
    };
    ops::invoke_with_this(host, callee, this, call_args)
}

fn rt_to_integer_or_infinity(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::Number(ops::to_integer_or_infinity(&arg(&args, 0)) as f64))
}

fn rt_unsigned_shift_right(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(ops::unsigned_shift_right(&arg(&args, 0), &arg(&args, 1)))
}

fn rt_json_stringify(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    json::stringify(host, &arg(&args, 0))
}

fn rt_json_parse(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let text = ops::to_display_string(&arg(&args, 0));
    json::parse(host, &text, args.get(1).cloned())
}

fn rt_get_iterator(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    iter::get_iterator(host, &arg(&args, 0))
}

fn rt_get_async_iterator(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    iter::get_async_iterator(host, &arg(&args, 0))
}

fn rt_iterator_next(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let (value, done) = iter::iterator_next(host, &arg(&args, 0))?;
    Ok(iter::iter_result(value, done))
}

/// `using`-declaration disposal: call `@@dispose` (or `dispose`) if present.
fn rt_dispose(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let target = arg(&args, 0);
    if target.is_nullish() {
        return Ok(Value::Undefined);
    }
    for name in ["@@dispose", "dispose"] {
        let method = object::get_property(host, &target, name)?;
        if method.is_callable() {
            return host.call(method, target, Vec::new());
        }
    }
    Ok(Value::Undefined)
}

fn rt_promise_resolve(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::Promise(promise::resolve_value(
        host.ctx_mut(),
        arg(&args, 0),
    )))
}

fn rt_dynamic_import(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let spec = ops::to_display_string(&arg(&args, 0));
    host.dynamic_import(&spec)
}

/// Enumerable own keys, for `for…in`.
fn rt_object_keys(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::array(
        object::object_keys(&arg(&args, 0))
            .into_iter()
            .map(Value::str)
            .collect(),
    ))
}

/// The complete helper table, in a stable order. The artifact's symbol
/// table holds a subset of these names.
pub const HELPERS: &[(&str, NativeFn)] = &[
    ("rt.add", rt_add),
    ("rt.equals", rt_equals),
    ("rt.strict_equals", rt_strict_equals),
    ("rt.is_truthy", rt_is_truthy),
    ("rt.stringify", rt_stringify),
    ("rt.type_of", rt_type_of),
    ("rt.instance_of", rt_instance_of),
    ("rt.get_property", rt_get_property),
    ("rt.set_property", rt_set_property),
    ("rt.get_index", rt_get_index),
    ("rt.set_index", rt_set_index),
    ("rt.merge_into_object", rt_merge_into_object),
    ("rt.concat_arrays", rt_concat_arrays),
    ("rt.create_array", rt_create_array),
    ("rt.create_object", rt_create_object),
    ("rt.invoke_value", rt_invoke_value),
    ("rt.invoke_with_this", rt_invoke_with_this),
    ("rt.to_integer_or_infinity", rt_to_integer_or_infinity),
    ("rt.unsigned_shift_right", rt_unsigned_shift_right),
    ("rt.json_stringify", rt_json_stringify),
    ("rt.json_parse", rt_json_parse),
    ("rt.get_iterator", rt_get_iterator),
    ("rt.get_async_iterator", rt_get_async_iterator),
    ("rt.iterator_next", rt_iterator_next),
    ("rt.dispose", rt_dispose),
    ("rt.promise_resolve", rt_promise_resolve),
    ("rt.dynamic_import", rt_dynamic_import),
    ("rt.object_keys", rt_object_keys),
];

pub fn helper_by_name(name: &str) -> Option<NativeFn> {
    HELPERS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, f)| *f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_helper_name_is_unique_and_namespaced() {
        let mut seen = std::collections::HashSet::new();
        for (name, _) in HELPERS {
            assert!(name.starts_with("rt."), "{name} lacks the rt. namespace");
            assert!(seen.insert(*name), "duplicate helper {name}");
        }
    }

    #[test]
    fn lookup_finds_known_helpers() {
        assert!(helper_by_name("rt.add").is_some());
        assert!(helper_by_name("rt.json_stringify").is_some());
        assert!(helper_by_name("rt.bogus").is_none());
    }
}
