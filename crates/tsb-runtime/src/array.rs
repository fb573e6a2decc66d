//! Array methods.
//!
//! `sort`/`toSorted` implement the three-phase semantics: partition defined
//! elements from `undefined`, stable-insertion-sort the defined ones (a
//! comparator returning NaN or 0 keeps order, positive swaps, negative
//! keeps; without a comparator elements stringify and compare ordinally),
//! then append the `undefined`s.

use crate::ops::{same_value_zero, strict_equals, to_display_string, to_integer_or_infinity};
use crate::value::{Ref, Value};
use crate::{throw_type_error, Host};

/// Clamp a relative index per the JS rules (`ToIntegerOrInfinity` plus
/// length-relative negatives).
fn clamp_index(v: &Value, len: usize) -> usize {
    let i = to_integer_or_infinity(v);
    if i < 0 {
        let from_end = len as i64 + i;
        from_end.max(0) as usize
    } else {
        (i as usize).min(len)
    }
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

/// Dispatch an array method by name.
pub fn call_array_method(
    host: &mut dyn Host,
    items: &Ref<Vec<Value>>,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, Value> {
    match name {
        "push" => {
            let mut v = items.borrow_mut();
            v.extend(args);
            Ok(Value::Number(v.len() as f64))
        }
        "pop" => Ok(items.borrow_mut().pop().unwrap_or(Value::Undefined)),
        "shift" => {
            let mut v = items.borrow_mut();
            if v.is_empty() {
                Ok(Value::Undefined)
            } else {
                Ok(v.remove(0))
            }
        }
        "unshift" => {
            let mut v = items.borrow_mut();
            for (i, a) in args.into_iter().enumerate() {
                v.insert(i, a);
            }
            Ok(Value::Number(v.len() as f64))
        }
        "at" => {
            let v = items.borrow();
            let i = to_integer_or_infinity(&arg(&args, 0));
            let idx = if i < 0 { v.len() as i64 + i } else { i };
            if idx >= 0 && (idx as usize) < v.len() {
                Ok(v[idx as usize].clone())
            } else {
                Ok(Value::Undefined)
            }
        }
        "slice" => {
            let v = items.borrow();
            let len = v.len();
            let start = if args.is_empty() {
                0
            } else {
                clamp_index(&arg(&args, 0), len)
            };
            let end = match args.get(1) {
                None | Some(Value::Undefined) => len,
                Some(e) => clamp_index(e, len),
            };
            Ok(Value::array(v[start.min(end)..end].to_vec()))
        }
        "splice" => {
            let mut v = items.borrow_mut();
            let removed = splice_inner(&mut v, &args);
            Ok(Value::array(removed))
        }
        "toSpliced" => {
            let mut copy = items.borrow().clone();
            splice_inner(&mut copy, &args);
            Ok(Value::array(copy))
        }
        "reverse" => {
            items.borrow_mut().reverse();
            Ok(Value::Array(items.clone()))
        }
        "toReversed" => {
            let mut copy = items.borrow().clone();
            copy.reverse();
            Ok(Value::array(copy))
        }
        "with" => {
            let mut copy = items.borrow().clone();
            let len = copy.len();
            let i = to_integer_or_infinity(&arg(&args, 0));
            let idx = if i < 0 { len as i64 + i } else { i };
            if idx < 0 || idx as usize >= len {
                return Err(crate::throw_range_error("invalid index for Array.with"));
            }
            copy[idx as usize] = arg(&args, 1);
            Ok(Value::array(copy))
        }
        "sort" => {
            let comparator = arg(&args, 0);
            let sorted = sort_values(host, items.borrow().clone(), &comparator)?;
            *items.borrow_mut() = sorted;
            Ok(Value::Array(items.clone()))
        }
        "toSorted" => {
            let comparator = arg(&args, 0);
            let sorted = sort_values(host, items.borrow().clone(), &comparator)?;
            Ok(Value::array(sorted))
        }
        "flat" => {
            let depth = match args.first() {
                None | Some(Value::Undefined) => 1,
                Some(d) => to_integer_or_infinity(d),
            };
            let v = items.borrow().clone();
            Ok(Value::array(flatten(v, depth)))
        }
        "flatMap" => {
            let cb = arg(&args, 0);
            let snapshot = items.borrow().clone();
            let mut out = Vec::new();
            for (i, item) in snapshot.into_iter().enumerate() {
                let mapped = host.call(
                    cb.clone(),
                    Value::Undefined,
                    vec![item, Value::Number(i as f64), Value::Array(items.clone())],
                )?;
                match mapped {
                    Value::Array(inner) => out.extend(inner.borrow().iter().cloned()),
                    other => out.push(other),
                }
            }
            Ok(Value::array(out))
        }
        "map" => {
            let cb = arg(&args, 0);
            let snapshot = items.borrow().clone();
            let mut out = Vec::with_capacity(snapshot.len());
            for (i, item) in snapshot.into_iter().enumerate() {
                out.push(host.call(
                    cb.clone(),
                    Value::Undefined,
                    vec![item, Value::Number(i as f64), Value::Array(items.clone())],
                )?);
            }
            Ok(Value::array(out))
        }
        "filter" => {
            let cb = arg(&args, 0);
            let snapshot = items.borrow().clone();
            let mut out = Vec::new();
            for (i, item) in snapshot.into_iter().enumerate() {
                let keep = host.call(
                    cb.clone(),
                    Value::Undefined,
                    vec![
                        item.clone(),
                        Value::Number(i as f64),
                        Value::Array(items.clone()),
                    ],
                )?;
                if crate::ops::is_truthy(&keep) {
                    out.push(item);
                }
            }
            Ok(Value::array(out))
        }
        "forEach" => {
            let cb = arg(&args, 0);
            let snapshot = items.borrow().clone();
            for (i, item) in snapshot.into_iter().enumerate() {
                host.call(
                    cb.clone(),
                    Value::Undefined,
                    vec![item, Value::Number(i as f64), Value::Array(items.clone())],
                )?;
            }
            Ok(Value::Undefined)
        }
        "find" | "findIndex" => {
            let cb = arg(&args, 0);
            let snapshot = items.borrow().clone();
            for (i, item) in snapshot.into_iter().enumerate() {
                let hit = host.call(
                    cb.clone(),
                    Value::Undefined,
                    vec![
                        item.clone(),
                        Value::Number(i as f64),
                        Value::Array(items.clone()),
                    ],
                )?;
                if crate::ops::is_truthy(&hit) {
                    return Ok(if name == "find" {
                        item
                    } else {
                        Value::Number(i as f64)
                    });
                }
            }
            Ok(if name == "find" {
                Value::Undefined
            } else {
                Value::Number(-1.0)
            })
        }
        "some" | "every" => {
            let cb = arg(&args, 0);
            let snapshot = items.borrow().clone();
            for (i, item) in snapshot.into_iter().enumerate() {
                let hit = host.call(
                    cb.clone(),
                    Value::Undefined,
                    vec![item, Value::Number(i as f64), Value::Array(items.clone())],
                )?;
                let truthy = crate::ops::is_truthy(&hit);
                if name == "some" && truthy {
                    return Ok(Value::Bool(true));
                }
                if name == "every" && !truthy {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(name == "every"))
        }
        "reduce" => {
            let cb = arg(&args, 0);
            let snapshot = items.borrow().clone();
            let mut iter = snapshot.into_iter().enumerate();
            let mut acc = match args.get(1) {
                Some(initial) => initial.clone(),
                None => match iter.next() {
                    Some((_, first)) => first,
                    None => {
                        return Err(throw_type_error("reduce of empty array with no initial value"));
                    }
                },
            };
            for (i, item) in iter {
                acc = host.call(
                    cb.clone(),
                    Value::Undefined,
                    vec![
                        acc,
                        item,
                        Value::Number(i as f64),
                        Value::Array(items.clone()),
                    ],
                )?;
            }
            Ok(acc)
        }
        "includes" => {
            let needle = arg(&args, 0);
            Ok(Value::Bool(
                items.borrow().iter().any(|v| same_value_zero(v, &needle)),
            ))
        }
        "indexOf" => {
            let needle = arg(&args, 0);
            Ok(items
                .borrow()
                .iter()
                .position(|v| strict_equals(v, &needle))
                .map(|i| Value::Number(i as f64))
                .unwrap_or(Value::Number(-1.0)))
        }
        "lastIndexOf" => {
            let needle = arg(&args, 0);
            Ok(items
                .borrow()
                .iter()
                .rposition(|v| strict_equals(v, &needle))
                .map(|i| Value::Number(i as f64))
                .unwrap_or(Value::Number(-1.0)))
        }
        "join" => {
            let sep = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(s) => to_display_string(s),
            };
            let parts: Vec<String> = items
                .borrow()
                .iter()
                .map(|v| match v {
                    Value::Undefined | Value::Null => String::new(),
                    other => to_display_string(other),
                })
                .collect();
            Ok(Value::str(parts.join(&sep)))
        }
        "concat" => {
            let mut out = items.borrow().clone();
            for a in args {
                match a {
                    // Arrays are concat-spreadable; everything else appends.
                    Value::Array(inner) => out.extend(inner.borrow().iter().cloned()),
                    other => out.push(other),
                }
            }
            Ok(Value::array(out))
        }
        "fill" => {
            let value = arg(&args, 0);
            let mut v = items.borrow_mut();
            let len = v.len();
            let start = match args.get(1) {
                None | Some(Value::Undefined) => 0,
                Some(s) => clamp_index(s, len),
            };
            let end = match args.get(2) {
                None | Some(Value::Undefined) => len,
                Some(e) => clamp_index(e, len),
            };
            for slot in &mut v[start.min(end)..end] {
                *slot = value.clone();
            }
            drop(v);
            Ok(Value::Array(items.clone()))
        }
        "keys" => Ok(crate::iter::get_iterator(
            host,
            &Value::array(
                (0..items.borrow().len())
                    .map(|i| Value::Number(i as f64))
                    .collect(),
            ),
        )?),
        "values" => crate::iter::get_iterator(host, &Value::Array(items.clone())),
        "entries" => {
            let pairs: Vec<Value> = items
                .borrow()
                .iter()
                .enumerate()
                .map(|(i, v)| Value::array(vec![Value::Number(i as f64), v.clone()]))
                .collect();
            crate::iter::get_iterator(host, &Value::array(pairs))
        }
        "toString" => Ok(Value::str(to_display_string(&Value::Array(items.clone())))),
        _ => Err(throw_type_error(format!(
            "array method '{name}' is not supported"
        ))),
    }
}

fn splice_inner(v: &mut Vec<Value>, args: &[Value]) -> Vec<Value> {
    let len = v.len();
    let start = if args.is_empty() {
        0
    } else {
        clamp_index(&args[0], len)
    };
    let delete_count = match args.get(1) {
        None if args.is_empty() => 0,
        None => len - start,
        Some(d) => {
            let d = to_integer_or_infinity(d).max(0) as usize;
            d.min(len - start)
        }
    };
    let removed: Vec<Value> = v.splice(start..start + delete_count, args[2.min(args.len())..].iter().cloned()).collect();
    removed
}

fn flatten(items: Vec<Value>, depth: i64) -> Vec<Value> {
    let mut out = Vec::new();
    for v in items {
        match v {
            Value::Array(inner) if depth > 0 => {
                out.extend(flatten(inner.borrow().clone(), depth - 1));
            }
            other => out.push(other),
        }
    }
    out
}

/// Three-phase stable sort.
pub fn sort_values(
    host: &mut dyn Host,
    items: Vec<Value>,
    comparator: &Value,
) -> Result<Vec<Value>, Value> {
    // Phase 1: partition defined vs undefined.
    let mut defined = Vec::with_capacity(items.len());
    let mut undefined_count = 0usize;
    for v in items {
        if matches!(v, Value::Undefined) {
            undefined_count += 1;
        } else {
            defined.push(v);
        }
    }

    // Phase 2: stable insertion sort over the defined elements.
    let use_comparator = comparator.is_callable();
    let mut i = 1;
    while i < defined.len() {
        let mut j = i;
        while j > 0 {
            let should_swap = if use_comparator {
                let r = host.call(
                    comparator.clone(),
                    Value::Undefined,
                    vec![defined[j - 1].clone(), defined[j].clone()],
                )?;
                let n = crate::ops::to_number(&r);
                // NaN and 0 leave the order unchanged.
                n > 0.0
            } else {
                let a = to_display_string(&defined[j - 1]);
                let b = to_display_string(&defined[j]);
                a > b
            };
            if should_swap {
                defined.swap(j - 1, j);
                j -= 1;
            } else {
                break;
            }
        }
        i += 1;
    }

    // Phase 3: undefineds at the end.
    defined.extend(std::iter::repeat_with(|| Value::Undefined).take(undefined_count));
    Ok(defined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Ref, StateMachineObj};
    use crate::{Host, RuntimeCtx};

    struct NoopHost {
        ctx: RuntimeCtx,
    }

    impl NoopHost {
        fn new() -> Self {
            NoopHost {
                ctx: RuntimeCtx::new(Box::new(Vec::new()), Box::new(Vec::new())),
            }
        }
    }

    impl Host for NoopHost {
        fn call(&mut self, _c: Value, _t: Value, _a: Vec<Value>) -> Result<Value, Value> {
            panic!("test host cannot run user code");
        }
        fn construct(&mut self, _c: Value, _a: Vec<Value>) -> Result<Value, Value> {
            panic!("test host cannot construct");
        }
        fn machine_resume(
            &mut self,
            _m: Ref<StateMachineObj>,
            _s: Value,
            _i: Option<Value>,
        ) -> Result<Value, Value> {
            panic!("test host cannot resume machines");
        }
        fn dynamic_import(&mut self, _s: &str) -> Result<Value, Value> {
            panic!("test host cannot import");
        }
        fn ctx_mut(&mut self) -> &mut RuntimeCtx {
            &mut self.ctx
        }
    }

    fn nums(values: &[f64]) -> Vec<Value> {
        values.iter().map(|n| Value::Number(*n)).collect()
    }

    #[test]
    fn default_sort_stringifies_and_keeps_undefined_last() {
        let mut host = NoopHost::new();
        let input = vec![
            Value::Number(3.0),
            Value::Undefined,
            Value::Number(1.0),
            Value::Undefined,
            Value::Number(2.0),
        ];
        let sorted = sort_values(&mut host, input, &Value::Undefined).unwrap();
        let rendered: Vec<String> = sorted.iter().map(to_display_string).collect();
        assert_eq!(rendered, vec!["1", "2", "3", "undefined", "undefined"]);
    }

    #[test]
    fn default_sort_is_ordinal_on_stringified_values() {
        let mut host = NoopHost::new();
        let sorted = sort_values(&mut host, nums(&[10.0, 9.0, 2.0]), &Value::Undefined).unwrap();
        let rendered: Vec<String> = sorted.iter().map(to_display_string).collect();
        // "10" < "2" < "9" ordinally.
        assert_eq!(rendered, vec!["10", "2", "9"]);
    }

    #[test]
    fn sort_preserves_multiset() {
        let mut host = NoopHost::new();
        let input = nums(&[5.0, 3.0, 5.0, 1.0]);
        let sorted = sort_values(&mut host, input.clone(), &Value::Undefined).unwrap();
        assert_eq!(sorted.len(), input.len());
        for v in &input {
            let in_count = input.iter().filter(|x| strict_equals(x, v)).count();
            let out_count = sorted.iter().filter(|x| strict_equals(x, v)).count();
            assert_eq!(in_count, out_count);
        }
    }

    #[test]
    fn splice_clamps_via_to_integer_or_infinity() {
        let mut v = nums(&[1.0, 2.0, 3.0, 4.0]);
        let removed = splice_inner(
            &mut v,
            &[Value::Number(1.0), Value::Number(f64::INFINITY)],
        );
        assert_eq!(removed.len(), 3);
        assert_eq!(v.len(), 1);
    }
}
