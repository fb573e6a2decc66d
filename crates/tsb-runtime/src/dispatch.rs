//! Method dispatch by receiver kind.
//!
//! `CallMethod` instructions land here: class instances walk their method
//! tables, native receivers use the per-type method implementations, plain
//! objects fall back to callable properties.

use std::rc::Rc;

use crate::ops::{format_number, to_display_string, to_integer_or_infinity};
use crate::value::{Closure, MachineKind, Ref, StateMachineObj, Value, MACHINE_DONE};
use crate::{array, collections, events, iter, promise, stream, throw_type_error, Host};

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

pub fn call_method(
    host: &mut dyn Host,
    recv: &Value,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, Value> {
    match recv {
        Value::Undefined | Value::Null => Err(throw_type_error(format!(
            "cannot call '{name}' of {}",
            to_display_string(recv)
        ))),
        Value::Object(obj) => {
            let target = {
                let o = obj.borrow();
                match o.props.get(name) {
                    Some(v) => Some(v.clone()),
                    None => o.class.clone().and_then(|class| {
                        class.find_method(name).map(|(slot, _)| {
                            Value::Function(Rc::new(Closure {
                                func: slot.func,
                                env: class_env_for(&class, name),
                                bound_this: Some(recv.clone()),
                                name: name.to_string(),
                            }))
                        })
                    }),
                }
            };
            let target = match target {
                Some(t) => t,
                // A getter may produce the callable.
                None => crate::object::get_property(host, recv, name)?,
            };
            if !target.is_callable() {
                return Err(throw_type_error(format!("{name} is not a function")));
            }
            host.call(target, recv.clone(), args)
        }
        Value::Class(class) => {
            let target = class.find_static(name).ok_or_else(|| {
                throw_type_error(format!("{}.{name} is not a function", class.name))
            })?;
            if !target.is_callable() {
                return Err(throw_type_error(format!("{name} is not a function")));
            }
            host.call(target, recv.clone(), args)
        }
        Value::Array(items) => array::call_array_method(host, items, name, args),
        Value::Str(s) => call_string_method(s, name, args),
        Value::Number(n) => match name {
            "toFixed" => {
                let digits = to_integer_or_infinity(&arg(&args, 0)).clamp(0, 100) as usize;
                Ok(Value::str(format!("{n:.digits$}")))
            }
            "toString" => Ok(Value::str(format_number(*n))),
            _ => Err(throw_type_error(format!(
                "number method '{name}' is not supported"
            ))),
        },
        Value::Bool(b) => match name {
            "toString" => Ok(Value::str(b.to_string())),
            _ => Err(throw_type_error(format!(
                "boolean method '{name}' is not supported"
            ))),
        },
        Value::BigInt(n) => match name {
            "toString" => Ok(Value::str(n.to_string())),
            _ => Err(throw_type_error(format!(
                "bigint method '{name}' is not supported"
            ))),
        },
        Value::MapV(m) => collections::call_map_method(host, m, name, args, recv),
        Value::SetV(s) => collections::call_set_method(host, s, name, args, recv),
        Value::Emitter(e) => events::call_emitter_method(host, e, name, args, recv),
        Value::Writable(w) => stream::call_writable_method(host, w, name, args, recv),
        Value::Promise(p) => match name {
            "then" => Ok(promise::then(
                host.ctx_mut(),
                p,
                arg(&args, 0),
                arg(&args, 1),
            )),
            "catch" => Ok(promise::then(
                host.ctx_mut(),
                p,
                Value::Undefined,
                arg(&args, 0),
            )),
            "finally" => {
                // Both paths run the callback; the settlement passes through.
                let cb = arg(&args, 0);
                Ok(promise::then(host.ctx_mut(), p, cb.clone(), cb))
            }
            _ => Err(throw_type_error(format!(
                "promise method '{name}' is not supported"
            ))),
        },
        Value::Machine(machine) => call_machine_method(host, machine, name, args),
        Value::Iter(_) => match name {
            "next" => {
                let (value, done) = iter::iterator_next(host, recv)?;
                Ok(iter::iter_result(value, done))
            }
            _ => Err(throw_type_error(format!(
                "iterator method '{name}' is not supported"
            ))),
        },
        Value::Date(ms) => call_date_method(*ms, name),
        Value::RegExp(r) => match name {
            "test" => {
                let input = to_display_string(&arg(&args, 0));
                regex_test(&r.pattern, &input).map(Value::Bool)
            }
            "toString" => Ok(Value::str(format!("/{}/{}", r.pattern, r.flags))),
            _ => Err(throw_type_error(format!(
                "regexp method '{name}' is not supported"
            ))),
        },
        Value::Function(_) | Value::Builtin(_) => match name {
            "call" => {
                let this = arg(&args, 0);
                let rest: Vec<Value> = args.iter().skip(1).cloned().collect();
                host.call(recv.clone(), this, rest)
            }
            "apply" => {
                let this = arg(&args, 0);
                let rest = match args.get(1) {
                    Some(Value::Array(items)) => items.borrow().clone(),
                    _ => Vec::new(),
                };
                host.call(recv.clone(), this, rest)
            }
            "bind" => {
                let this = arg(&args, 0);
                match recv {
                    Value::Function(f) => Ok(Value::Function(Rc::new(Closure {
                        func: f.func,
                        env: f.env.clone(),
                        bound_this: Some(this),
                        name: f.name.clone(),
                    }))),
                    other => Ok(other.clone()),
                }
            }
            _ => Err(throw_type_error(format!(
                "function method '{name}' is not supported"
            ))),
        },
        _ => Err(throw_type_error(format!(
            "cannot call '{name}' on {}",
            to_display_string(recv)
        ))),
    }
}

fn class_env_for(
    class: &Rc<crate::value::ClassValue>,
    method: &str,
) -> Rc<crate::value::Env> {
    // The owning class's env; methods of a superclass close over the
    // superclass definition environment.
    let mut current = Some(Rc::clone(class));
    while let Some(c) = current {
        if c.methods.contains_key(method) {
            return Rc::clone(&c.env);
        }
        current = c.superclass.clone();
    }
    Rc::clone(&class.env)
}

// =============================================================================
// Generators / async generators
// =============================================================================

fn call_machine_method(
    host: &mut dyn Host,
    machine: &Ref<StateMachineObj>,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, Value> {
    let kind = machine.borrow().kind;
    match name {
        "next" => {
            let sent = arg(&args, 0);
            match kind {
                MachineKind::AsyncGenerator => {
                    async_step(host, machine, sent, None)
                }
                _ => host.machine_resume(machine.clone(), sent, None),
            }
        }
        // `return(v)` forces the final state with that value.
        "return" => {
            let value = arg(&args, 0);
            {
                let mut m = machine.borrow_mut();
                m.done = true;
                m.state = MACHINE_DONE;
            }
            let result = iter::iter_result(value, true);
            Ok(match kind {
                MachineKind::AsyncGenerator => {
                    Value::Promise(promise::resolve_value(host.ctx_mut(), result))
                }
                _ => result,
            })
        }
        // `throw(e)` injects at the saved suspension point; the innermost
        // enclosing try/catch receives it, otherwise the machine finishes.
        "throw" => {
            let error = arg(&args, 0);
            match kind {
                MachineKind::AsyncGenerator => async_step(host, machine, Value::Undefined, Some(error)),
                _ => host.machine_resume(machine.clone(), Value::Undefined, Some(error)),
            }
        }
        _ => Err(throw_type_error(format!(
            "generator method '{name}' is not supported"
        ))),
    }
}

/// One async-generator step: returns a promise for the `{value, done}`
/// record; the VM settles it when the machine reaches a yield or finishes.
fn async_step(
    host: &mut dyn Host,
    machine: &Ref<StateMachineObj>,
    sent: Value,
    inject: Option<Value>,
) -> Result<Value, Value> {
    let result = host.machine_resume(machine.clone(), sent, inject)?;
    // The VM returns either an immediate record or a promise it will settle
    // after intervening awaits.
    Ok(match result {
        p @ Value::Promise(_) => p,
        record => Value::Promise(promise::resolve_value(host.ctx_mut(), record)),
    })
}

// =============================================================================
// Strings
// =============================================================================

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn clamp_str_index(v: &Value, len: usize) -> usize {
    let i = to_integer_or_infinity(v);
    if i < 0 {
        (len as i64 + i).max(0) as usize
    } else {
        (i as usize).min(len)
    }
}

fn call_string_method(s: &Rc<str>, name: &str, args: Vec<Value>) -> Result<Value, Value> {
    let text: &str = s;
    Ok(match name {
        "charAt" => {
            let i = to_integer_or_infinity(&arg(&args, 0));
            if i >= 0 {
                text.chars()
                    .nth(i as usize)
                    .map(|c| Value::str(c.to_string()))
                    .unwrap_or_else(|| Value::str(""))
            } else {
                Value::str("")
            }
        }
        "charCodeAt" => {
            let i = to_integer_or_infinity(&arg(&args, 0));
            if i >= 0 {
                text.chars()
                    .nth(i as usize)
                    .map(|c| Value::Number(c as u32 as f64))
                    .unwrap_or(Value::Number(f64::NAN))
            } else {
                Value::Number(f64::NAN)
            }
        }
        "codePointAt" => {
            let i = to_integer_or_infinity(&arg(&args, 0));
            if i >= 0 {
                text.chars()
                    .nth(i as usize)
                    .map(|c| Value::Number(c as u32 as f64))
                    .unwrap_or(Value::Undefined)
            } else {
                Value::Undefined
            }
        }
        "at" => {
            let len = char_len(text);
            let i = to_integer_or_infinity(&arg(&args, 0));
            let idx = if i < 0 { len as i64 + i } else { i };
            if idx >= 0 && (idx as usize) < len {
                Value::str(text.chars().nth(idx as usize).expect("in range").to_string())
            } else {
                Value::Undefined
            }
        }
        "indexOf" => {
            let needle = to_display_string(&arg(&args, 0));
            text.find(&needle)
                .map(|b| Value::Number(text[..b].chars().count() as f64))
                .unwrap_or(Value::Number(-1.0))
        }
        "lastIndexOf" => {
            let needle = to_display_string(&arg(&args, 0));
            text.rfind(&needle)
                .map(|b| Value::Number(text[..b].chars().count() as f64))
                .unwrap_or(Value::Number(-1.0))
        }
        "includes" => Value::Bool(text.contains(&to_display_string(&arg(&args, 0)))),
        "startsWith" => Value::Bool(text.starts_with(&to_display_string(&arg(&args, 0)))),
        "endsWith" => Value::Bool(text.ends_with(&to_display_string(&arg(&args, 0)))),
        "slice" | "substring" => {
            let len = char_len(text);
            let mut start = match args.first() {
                None | Some(Value::Undefined) => 0,
                Some(v) => clamp_str_index(v, len),
            };
            let mut end = match args.get(1) {
                None | Some(Value::Undefined) => len,
                Some(v) => clamp_str_index(v, len),
            };
            if name == "substring" && start > end {
                std::mem::swap(&mut start, &mut end);
            }
            if start >= end {
                Value::str("")
            } else {
                Value::str(text.chars().skip(start).take(end - start).collect::<String>())
            }
        }
        "toUpperCase" => Value::str(text.to_uppercase()),
        "toLowerCase" => Value::str(text.to_lowercase()),
        "trim" => Value::str(text.trim()),
        "trimStart" => Value::str(text.trim_start()),
        "trimEnd" => Value::str(text.trim_end()),
        "split" => {
            let sep = arg(&args, 0);
            match sep {
                Value::Undefined => Value::array(vec![Value::Str(s.clone())]),
                sep => {
                    let sep = to_display_string(&sep);
                    if sep.is_empty() {
                        Value::array(
                            text.chars().map(|c| Value::str(c.to_string())).collect(),
                        )
                    } else {
                        Value::array(text.split(&sep).map(Value::str).collect())
                    }
                }
            }
        }
        "repeat" => {
            let n = to_integer_or_infinity(&arg(&args, 0));
            if n < 0 {
                return Err(crate::throw_range_error("repeat count must be non-negative"));
            }
            Value::str(text.repeat(n as usize))
        }
        "padStart" | "padEnd" => {
            let target = to_integer_or_infinity(&arg(&args, 0)).max(0) as usize;
            let pad = match args.get(1) {
                None | Some(Value::Undefined) => " ".to_string(),
                Some(v) => to_display_string(v),
            };
            let len = char_len(text);
            if len >= target || pad.is_empty() {
                Value::Str(s.clone())
            } else {
                let fill: String = pad.chars().cycle().take(target - len).collect();
                if name == "padStart" {
                    Value::str(format!("{fill}{text}"))
                } else {
                    Value::str(format!("{text}{fill}"))
                }
            }
        }
        "concat" => {
            let mut out = text.to_string();
            for a in &args {
                out.push_str(&to_display_string(a));
            }
            Value::str(out)
        }
        "replace" => {
            let from = to_display_string(&arg(&args, 0));
            let to = to_display_string(&arg(&args, 1));
            Value::str(text.replacen(&from, &to, 1))
        }
        "replaceAll" => {
            let from = to_display_string(&arg(&args, 0));
            let to = to_display_string(&arg(&args, 1));
            Value::str(text.replace(&from, &to))
        }
        "localeCompare" => {
            let other = to_display_string(&arg(&args, 0));
            Value::Number(match text.cmp(other.as_str()) {
                std::cmp::Ordering::Less => -1.0,
                std::cmp::Ordering::Equal => 0.0,
                std::cmp::Ordering::Greater => 1.0,
            })
        }
        "toString" => Value::Str(s.clone()),
        _ => {
            return Err(throw_type_error(format!(
                "string method '{name}' is not supported"
            )));
        }
    })
}

// =============================================================================
// Dates
// =============================================================================

/// Civil-from-days conversion for the UTC getters.
fn civil_from_ms(ms: f64) -> (i64, u32, u32, u32, u32, u32, u32) {
    let total_ms = ms as i64;
    let (days, rem_ms) = (total_ms.div_euclid(86_400_000), total_ms.rem_euclid(86_400_000));
    let secs = rem_ms / 1000;
    let (hour, min, sec) = (secs / 3600, (secs / 60) % 60, secs % 60);
    let millis = rem_ms % 1000;

    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if m <= 2 { y + 1 } else { y };
    (
        year,
        m as u32,
        d as u32,
        hour as u32,
        min as u32,
        sec as u32,
        millis as u32,
    )
}

fn call_date_method(ms: f64, name: &str) -> Result<Value, Value> {
    let (year, month, day, hour, min, sec, millis) = civil_from_ms(ms);
    Ok(match name {
        "getTime" | "valueOf" => Value::Number(ms),
        "getFullYear" => Value::Number(year as f64),
        "getMonth" => Value::Number((month - 1) as f64),
        "getDate" => Value::Number(day as f64),
        "getHours" => Value::Number(hour as f64),
        "getMinutes" => Value::Number(min as f64),
        "getSeconds" => Value::Number(sec as f64),
        "getMilliseconds" => Value::Number(millis as f64),
        "toISOString" => Value::str(format!(
            "{year:04}-{month:02}-{day:02}T{hour:02}:{min:02}:{sec:02}.{millis:03}Z"
        )),
        "toString" => Value::str(format!(
            "{year:04}-{month:02}-{day:02} {hour:02}:{min:02}:{sec:02}"
        )),
        _ => {
            return Err(throw_type_error(format!(
                "date method '{name}' is not supported"
            )));
        }
    })
}

// =============================================================================
// Regex (literal subset)
// =============================================================================

/// The accepted subset supports literal patterns (no metacharacters) as
/// substring tests.
fn regex_test(pattern: &str, input: &str) -> Result<bool, Value> {
    const META: &[char] = &['\\', '[', ']', '(', ')', '{', '}', '*', '+', '?', '|', '^', '$', '.'];
    if pattern.chars().any(|c| META.contains(&c)) {
        return Err(throw_type_error(
            "only literal regex patterns are supported",
        ));
    }
    Ok(input.contains(pattern))
}

