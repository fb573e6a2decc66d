//! The event emitter.
//!
//! Listeners fire synchronously in registration order against a snapshot
//! taken before the first listener runs: a listener that removes itself
//! still runs this dispatch, and one added during dispatch waits for the
//! next `emit`. Exceeding the max-listeners threshold (default 10) warns
//! once per event name.

use crate::ops::strict_equals;
use crate::value::{make_ref, EmitterState, Ref, Value};
use crate::{throw_type_error, Host};

pub const DEFAULT_MAX_LISTENERS: usize = 10;

pub fn new_emitter() -> Value {
    Value::Emitter(make_ref(EmitterState {
        listeners: Default::default(),
        max_listeners: DEFAULT_MAX_LISTENERS,
        warned: Vec::new(),
    }))
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn event_name(v: &Value) -> String {
    crate::ops::to_display_string(v)
}

pub fn call_emitter_method(
    host: &mut dyn Host,
    state: &Ref<EmitterState>,
    name: &str,
    args: Vec<Value>,
    recv: &Value,
) -> Result<Value, Value> {
    match name {
        "on" | "addListener" => {
            let event = event_name(&arg(&args, 0));
            let listener = arg(&args, 1);
            add_listener(host, state, &event, listener, false)?;
            Ok(recv.clone())
        }
        "prependListener" => {
            let event = event_name(&arg(&args, 0));
            let listener = arg(&args, 1);
            add_listener(host, state, &event, listener, true)?;
            Ok(recv.clone())
        }
        "once" => {
            let event = event_name(&arg(&args, 0));
            let listener = arg(&args, 1);
            // The wrapper is the registered identity; it removes itself
            // before delegating.
            let wrapper = make_once_wrapper(listener);
            add_listener(host, state, &event, wrapper, false)?;
            Ok(recv.clone())
        }
        "removeListener" | "off" => {
            let event = event_name(&arg(&args, 0));
            let listener = arg(&args, 1);
            let mut s = state.borrow_mut();
            if let Some(list) = s.listeners.get_mut(&event) {
                if let Some(pos) = list.iter().position(|l| {
                    strict_equals(l, &listener) || once_target_matches(l, &listener)
                }) {
                    list.remove(pos);
                }
            }
            Ok(recv.clone())
        }
        "removeAllListeners" => {
            let mut s = state.borrow_mut();
            if args.is_empty() {
                s.listeners.clear();
            } else {
                let event = event_name(&arg(&args, 0));
                s.listeners.shift_remove(&event);
            }
            Ok(recv.clone())
        }
        "listenerCount" => {
            let event = event_name(&arg(&args, 0));
            let count = state
                .borrow()
                .listeners
                .get(&event)
                .map(|l| l.len())
                .unwrap_or(0);
            Ok(Value::Number(count as f64))
        }
        "listeners" => {
            let event = event_name(&arg(&args, 0));
            let list = state
                .borrow()
                .listeners
                .get(&event)
                .cloned()
                .unwrap_or_default();
            Ok(Value::array(list))
        }
        "eventNames" => {
            let names: Vec<Value> = state
                .borrow()
                .listeners
                .keys()
                .map(Value::str)
                .collect();
            Ok(Value::array(names))
        }
        "setMaxListeners" => {
            let n = crate::ops::to_number(&arg(&args, 0));
            state.borrow_mut().max_listeners = n.max(0.0) as usize;
            Ok(recv.clone())
        }
        "getMaxListeners" => Ok(Value::Number(state.borrow().max_listeners as f64)),
        "emit" => {
            let event = event_name(&arg(&args, 0));
            let rest: Vec<Value> = args.iter().skip(1).cloned().collect();
            emit(host, state, recv, &event, rest)
        }
        _ => Err(throw_type_error(format!(
            "emitter method '{name}' is not supported"
        ))),
    }
}

fn add_listener(
    host: &mut dyn Host,
    state: &Ref<EmitterState>,
    event: &str,
    listener: Value,
    prepend: bool,
) -> Result<(), Value> {
    let is_once_wrapper =
        matches!(&listener, Value::Object(o) if o.borrow().props.contains_key("__once"));
    if !listener.is_callable() && !is_once_wrapper {
        return Err(throw_type_error("listener must be a function"));
    }
    let warn = {
        let mut s = state.borrow_mut();
        let list = s.listeners.entry(event.to_string()).or_default();
        if prepend {
            list.insert(0, listener);
        } else {
            list.push(listener);
        }
        let count = list.len();
        let max = s.max_listeners;
        if max > 0 && count > max && !s.warned.iter().any(|w| w == event) {
            s.warned.push(event.to_string());
            Some(count)
        } else {
            None
        }
    };
    if let Some(count) = warn {
        host.ctx_mut().write_err(&format!(
            "MaxListenersExceededWarning: {count} '{event}' listeners added"
        ));
    }
    Ok(())
}

/// Dispatch against a snapshot. Returns whether any listener ran.
pub fn emit(
    host: &mut dyn Host,
    state: &Ref<EmitterState>,
    recv: &Value,
    event: &str,
    args: Vec<Value>,
) -> Result<Value, Value> {
    let snapshot = state
        .borrow()
        .listeners
        .get(event)
        .cloned()
        .unwrap_or_default();
    if snapshot.is_empty() {
        return Ok(Value::Bool(false));
    }
    for listener in snapshot {
        let listener = resolve_once(host, state, event, listener)?;
        if let Some(listener) = listener {
            // Errors propagate immediately out of emit.
            host.call(listener, recv.clone(), args.clone())?;
        }
    }
    Ok(Value::Bool(true))
}

// `once` wrappers are plain objects `{__once: target}` so identity-based
// removal can match either the wrapper or the original listener.
fn make_once_wrapper(target: Value) -> Value {
    let mut obj = crate::value::JsObject::plain();
    obj.props.insert("__once".to_string(), target);
    Value::object(obj)
}

fn once_target_matches(registered: &Value, probe: &Value) -> bool {
    if let Value::Object(obj) = registered {
        if let Some(target) = obj.borrow().props.get("__once") {
            return strict_equals(target, probe);
        }
    }
    false
}

/// Unwrap a `once` wrapper: remove it from the live list and return the
/// target; plain listeners pass through.
fn resolve_once(
    host: &mut dyn Host,
    state: &Ref<EmitterState>,
    event: &str,
    listener: Value,
) -> Result<Option<Value>, Value> {
    let _ = host;
    if let Value::Object(obj) = &listener {
        let target = obj.borrow().props.get("__once").cloned();
        if let Some(target) = target {
            let mut s = state.borrow_mut();
            if let Some(list) = s.listeners.get_mut(event) {
                if let Some(pos) = list.iter().position(|l| strict_equals(l, &listener)) {
                    list.remove(pos);
                } else {
                    // Already removed during this dispatch; the snapshot
                    // rule still runs it once.
                }
            }
            return Ok(Some(target));
        }
    }
    Ok(Some(listener))
}
