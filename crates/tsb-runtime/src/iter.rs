//! The iterable / iterator protocol over runtime values.
//!
//! Native collections iterate over a snapshot taken when the iterator is
//! created. Generators iterate by resuming their machine through the host.
//! User objects participate via an `@@iterator` method returning an object
//! with `next()`.

use crate::object::get_property;
use crate::ops::is_truthy;
use crate::value::{make_ref, JsObject, NativeIter, Value};
use crate::{throw_type_error, Host};

pub const ITERATOR_KEY: &str = "@@iterator";
pub const ASYNC_ITERATOR_KEY: &str = "@@asyncIterator";

fn native_iter(items: Vec<Value>) -> Value {
    Value::Iter(make_ref(NativeIter { items, pos: 0 }))
}

/// `GetIterator`: any iterable → an iterator value.
pub fn get_iterator(host: &mut dyn Host, v: &Value) -> Result<Value, Value> {
    match v {
        Value::Array(items) => Ok(native_iter(items.borrow().clone())),
        Value::Str(s) => Ok(native_iter(
            s.chars().map(|c| Value::str(c.to_string())).collect(),
        )),
        Value::SetV(set) => Ok(native_iter(set.borrow().entries.clone())),
        Value::MapV(map) => Ok(native_iter(
            map.borrow()
                .entries
                .iter()
                .map(|(k, val)| Value::array(vec![k.clone(), val.clone()]))
                .collect(),
        )),
        Value::Machine(_) | Value::Iter(_) => Ok(v.clone()),
        Value::Object(obj) => {
            let method = obj.borrow().props.get(ITERATOR_KEY).cloned();
            match method {
                Some(m) => host.call(m, v.clone(), Vec::new()),
                // An object already shaped like an iterator works directly.
                None if obj.borrow().props.contains_key("next") => Ok(v.clone()),
                None => Err(throw_type_error("value is not iterable")),
            }
        }
        _ => Err(throw_type_error(format!(
            "{} is not iterable",
            crate::ops::to_display_string(v)
        ))),
    }
}

/// `GetAsyncIterator`: prefers `@@asyncIterator`, falls back to the sync
/// protocol (awaiting a plain result object is a no-op).
pub fn get_async_iterator(host: &mut dyn Host, v: &Value) -> Result<Value, Value> {
    if let Value::Object(obj) = v {
        let method = obj.borrow().props.get(ASYNC_ITERATOR_KEY).cloned();
        if let Some(m) = method {
            return host.call(m, v.clone(), Vec::new());
        }
    }
    if let Value::Machine(_) = v {
        return Ok(v.clone());
    }
    get_iterator(host, v)
}

/// One protocol step: `(value, done)`.
pub fn iterator_next(host: &mut dyn Host, iter: &Value) -> Result<(Value, bool), Value> {
    iterator_next_with(host, iter, Value::Undefined)
}

pub fn iterator_next_with(
    host: &mut dyn Host,
    iter: &Value,
    sent: Value,
) -> Result<(Value, bool), Value> {
    match iter {
        Value::Iter(state) => {
            let mut state = state.borrow_mut();
            if state.pos < state.items.len() {
                let v = state.items[state.pos].clone();
                state.pos += 1;
                Ok((v, false))
            } else {
                Ok((Value::Undefined, true))
            }
        }
        Value::Machine(machine) => {
            let result = host.machine_resume(machine.clone(), sent, None)?;
            let value = get_property(host, &result, "value")?;
            let done = get_property(host, &result, "done")?;
            Ok((value, is_truthy(&done)))
        }
        Value::Object(_) => {
            let next = get_property(host, iter, "next")?;
            let result = host.call(next, iter.clone(), vec![sent])?;
            let value = get_property(host, &result, "value")?;
            let done = get_property(host, &result, "done")?;
            Ok((value, is_truthy(&done)))
        }
        _ => Err(throw_type_error("iterator protocol violated")),
    }
}

/// Materialize a whole iterable (spread, `Array.from`-style consumers).
pub fn collect_iterable(host: &mut dyn Host, v: &Value) -> Result<Vec<Value>, Value> {
    let iter = get_iterator(host, v)?;
    let mut out = Vec::new();
    loop {
        let (value, done) = iterator_next(host, &iter)?;
        if done {
            return Ok(out);
        }
        out.push(value);
    }
}

/// The `{value, done}` result object of the protocol.
pub fn iter_result(value: Value, done: bool) -> Value {
    let mut obj = JsObject::plain();
    obj.props.insert("value".to_string(), value);
    obj.props.insert("done".to_string(), Value::Bool(done));
    Value::object(obj)
}
