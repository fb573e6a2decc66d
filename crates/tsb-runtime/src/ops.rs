//! Value helpers: JS coercions, arithmetic, equality, `typeof`,
//! `instanceof`, and number formatting.

use std::rc::Rc;

use crate::value::{ClassValue, Value};
use crate::{throw_type_error, Host};

/// JS ToBoolean.
pub fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Undefined | Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::BigInt(n) => *n != 0,
        Value::Str(s) => !s.is_empty(),
        Value::Uninitialized => false,
        _ => true,
    }
}

/// JS ToNumber for the subset.
pub fn to_number(v: &Value) -> f64 {
    match v {
        Value::Number(n) => *n,
        Value::Bool(true) => 1.0,
        Value::Bool(false) => 0.0,
        Value::Null => 0.0,
        Value::Undefined => f64::NAN,
        Value::Str(s) => {
            let t = s.trim();
            if t.is_empty() {
                0.0
            } else {
                t.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Value::BigInt(n) => *n as f64,
        Value::Date(ms) => *ms,
        _ => f64::NAN,
    }
}

/// ToIntegerOrInfinity: NaN → 0, ±∞ preserved as the i32 extremes.
pub fn to_integer_or_infinity(v: &Value) -> i64 {
    let n = to_number(v);
    if n.is_nan() {
        0
    } else if n == f64::INFINITY {
        i32::MAX as i64
    } else if n == f64::NEG_INFINITY {
        i32::MIN as i64
    } else {
        n.trunc() as i64
    }
}

/// JS ToString for primitives and containers (the `String()` coercion).
pub fn to_display_string(v: &Value) -> String {
    match v {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(*n),
        Value::BigInt(n) => n.to_string(),
        Value::Str(s) => s.to_string(),
        Value::Array(items) => {
            let items = items.borrow();
            let parts: Vec<String> = items
                .iter()
                .map(|v| match v {
                    Value::Undefined | Value::Null => String::new(),
                    other => to_display_string(other),
                })
                .collect();
            parts.join(",")
        }
        Value::Object(_) => "[object Object]".to_string(),
        Value::Function(f) => format!("function {}() {{ ... }}", f.name),
        Value::Builtin(b) => format!("function {}() {{ [native code] }}", b.name),
        Value::Class(c) => format!("class {}", c.name),
        Value::MapV(_) => "[object Map]".to_string(),
        Value::SetV(_) => "[object Set]".to_string(),
        Value::Date(ms) => format!("[Date {ms}]"),
        Value::RegExp(r) => format!("/{}/{}", r.pattern, r.flags),
        Value::Promise(_) => "[object Promise]".to_string(),
        Value::Machine(_) => "[object Generator]".to_string(),
        Value::Emitter(_) => "[object EventEmitter]".to_string(),
        Value::Writable(_) => "[object Writable]".to_string(),
        Value::Iter(_) => "[object Iterator]".to_string(),
        Value::Uninitialized => "undefined".to_string(),
    }
}

/// Shortest round-trip number formatting with the JS fixups: `Infinity`,
/// `-0` prints as `0`, exponential form past the 1e21 / 1e-7 thresholds.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == f64::INFINITY {
        return "Infinity".to_string();
    }
    if n == f64::NEG_INFINITY {
        return "-Infinity".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if abs >= 1e21 {
        let formatted = format!("{n:e}");
        // Rust prints `1e21`; JS prints `1e+21`.
        return match formatted.find('e') {
            Some(idx) if !formatted[idx + 1..].starts_with('-') => {
                format!("{}e+{}", &formatted[..idx], &formatted[idx + 1..])
            }
            _ => formatted,
        };
    }
    if abs < 1e-6 {
        let formatted = format!("{n:e}");
        return formatted;
    }
    if n.fract() == 0.0 && abs < 9.007_199_254_740_992e15 {
        return format!("{}", n as i64);
    }
    let s = format!("{n}");
    s
}

fn number_add(a: f64, b: f64) -> Value {
    Value::Number(a + b)
}

/// The `+` helper: string concatenation when either side is a string,
/// bigint addition when both are bigints, numeric addition otherwise.
pub fn add(a: &Value, b: &Value) -> Result<Value, Value> {
    match (a, b) {
        (Value::Str(_), _) | (_, Value::Str(_)) => Ok(Value::str(format!(
            "{}{}",
            to_display_string(a),
            to_display_string(b)
        ))),
        (Value::BigInt(x), Value::BigInt(y)) => Ok(Value::BigInt(x.wrapping_add(*y))),
        (Value::BigInt(_), _) | (_, Value::BigInt(_)) => Err(throw_type_error(
            "cannot mix BigInt and other types in addition",
        )),
        // Arrays and objects stringify through ToPrimitive.
        (Value::Array(_), _) | (_, Value::Array(_)) | (Value::Object(_), _)
        | (_, Value::Object(_)) => Ok(Value::str(format!(
            "{}{}",
            to_display_string(a),
            to_display_string(b)
        ))),
        _ => Ok(number_add(to_number(a), to_number(b))),
    }
}

/// Dispatch for bigint binary operators.
pub fn bigint_binary(op: &str, a: i64, b: i64) -> Result<Value, Value> {
    Ok(match op {
        "+" => Value::BigInt(a.wrapping_add(b)),
        "-" => Value::BigInt(a.wrapping_sub(b)),
        "*" => Value::BigInt(a.wrapping_mul(b)),
        "/" => {
            if b == 0 {
                return Err(crate::throw_range_error("division by zero"));
            }
            Value::BigInt(a.wrapping_div(b))
        }
        "%" => {
            if b == 0 {
                return Err(crate::throw_range_error("division by zero"));
            }
            Value::BigInt(a.wrapping_rem(b))
        }
        "**" => {
            let exp = u32::try_from(b)
                .map_err(|_| crate::throw_range_error("exponent must be non-negative"))?;
            Value::BigInt(a.wrapping_pow(exp))
        }
        "&" => Value::BigInt(a & b),
        "|" => Value::BigInt(a | b),
        "^" => Value::BigInt(a ^ b),
        "<<" => Value::BigInt(a.wrapping_shl(b as u32)),
        ">>" => Value::BigInt(a.wrapping_shr(b as u32)),
        _ => return Err(throw_type_error(format!("bad bigint operator '{op}'"))),
    })
}

/// Strict equality (`===`): same type, same value; references by identity.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::BigInt(x), Value::BigInt(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => std::ptr::eq(*x, *y),
        (Value::Class(x), Value::Class(y)) => Rc::ptr_eq(x, y),
        (Value::MapV(x), Value::MapV(y)) => Rc::ptr_eq(x, y),
        (Value::SetV(x), Value::SetV(y)) => Rc::ptr_eq(x, y),
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::RegExp(x), Value::RegExp(y)) => Rc::ptr_eq(x, y),
        (Value::Promise(x), Value::Promise(y)) => Rc::ptr_eq(x, y),
        (Value::Machine(x), Value::Machine(y)) => Rc::ptr_eq(x, y),
        (Value::Emitter(x), Value::Emitter(y)) => Rc::ptr_eq(x, y),
        (Value::Writable(x), Value::Writable(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// SameValueZero: strict equality, except NaN equals NaN.
pub fn same_value_zero(a: &Value, b: &Value) -> bool {
    if let (Value::Number(x), Value::Number(y)) = (a, b) {
        return x == y || (x.is_nan() && y.is_nan());
    }
    strict_equals(a, b)
}

/// Loose equality (`==`): `null == undefined` is true; numeric/string
/// coercions follow the JS table.
pub fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Undefined)
        | (Value::Undefined, Value::Null)
        | (Value::Null, Value::Null)
        | (Value::Undefined, Value::Undefined) => true,
        (Value::Null, _) | (_, Value::Null) | (Value::Undefined, _) | (_, Value::Undefined) => {
            false
        }
        (Value::Number(_), Value::Str(_)) | (Value::Str(_), Value::Number(_)) => {
            to_number(a) == to_number(b)
        }
        (Value::Bool(_), _) => equals(&Value::Number(to_number(a)), b),
        (_, Value::Bool(_)) => equals(a, &Value::Number(to_number(b))),
        (Value::BigInt(x), Value::Number(y)) | (Value::Number(y), Value::BigInt(x)) => {
            *x as f64 == *y
        }
        (Value::BigInt(x), Value::Str(s)) | (Value::Str(s), Value::BigInt(x)) => {
            s.trim().parse::<i64>().map(|v| v == *x).unwrap_or(false)
        }
        _ => strict_equals(a, b),
    }
}

/// The `typeof` operator.
pub fn type_of(v: &Value) -> &'static str {
    match v {
        Value::Undefined | Value::Uninitialized => "undefined",
        Value::Null => "object",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::BigInt(_) => "bigint",
        Value::Str(_) => "string",
        Value::Function(_) | Value::Builtin(_) | Value::Class(_) => "function",
        _ => "object",
    }
}

/// `instanceof`: class instances walk the superclass chain; the builtin
/// pseudo-constructors match their native values.
pub fn instance_of(value: &Value, class: &Value) -> Result<bool, Value> {
    match class {
        Value::Class(wanted) => Ok(match value {
            Value::Object(obj) => {
                let obj = obj.borrow();
                let mut current = obj.class.clone();
                let mut found = false;
                while let Some(c) = current {
                    if Rc::ptr_eq(&c, wanted) {
                        found = true;
                        break;
                    }
                    current = c.superclass.clone();
                }
                found
            }
            _ => false,
        }),
        Value::Builtin(b) => Ok(native_instance_matches(value, b.name)),
        // Native constructors are marker objects installed by the loader.
        Value::Object(obj) => {
            let marker = obj.borrow().props.get("__native_ctor").cloned();
            match marker {
                Some(name) => Ok(native_instance_matches(value, &to_display_string(&name))),
                None => Err(throw_type_error(
                    "right-hand side of 'instanceof' is not callable",
                )),
            }
        }
        _ => Err(throw_type_error(
            "right-hand side of 'instanceof' is not callable",
        )),
    }
}

fn native_instance_matches(value: &Value, ctor: &str) -> bool {
    match ctor {
        "Error" | "TypeError" | "RangeError" | "SyntaxError" => match value {
            Value::Object(obj) => {
                let o = obj.borrow();
                o.props.contains_key("message") && o.props.contains_key("name")
            }
            _ => false,
        },
        "Array" => matches!(value, Value::Array(_)),
        "Map" | "WeakMap" => matches!(value, Value::MapV(_)),
        "Set" | "WeakSet" => matches!(value, Value::SetV(_)),
        "Promise" => matches!(value, Value::Promise(_)),
        "Date" => matches!(value, Value::Date(_)),
        "RegExp" => matches!(value, Value::RegExp(_)),
        "EventEmitter" => matches!(value, Value::Emitter(_)),
        "Writable" => matches!(value, Value::Writable(_)),
        _ => false,
    }
}

/// Relational comparison used by `<`, `<=`, `>`, `>=`.
pub fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.as_ref().cmp(y.as_ref())),
        (Value::BigInt(x), Value::BigInt(y)) => Some(x.cmp(y)),
        _ => to_number(a).partial_cmp(&to_number(b)),
    }
}

/// Unsigned right shift via zero extension.
pub fn unsigned_shift_right(a: &Value, b: &Value) -> Value {
    let x = to_uint32(a);
    let shift = to_uint32(b) & 31;
    Value::Number((x >> shift) as f64)
}

pub fn to_int32(v: &Value) -> i32 {
    let n = to_number(v);
    if !n.is_finite() {
        return 0;
    }
    n as i64 as u32 as i32
}

pub fn to_uint32(v: &Value) -> u32 {
    to_int32(v) as u32
}

/// Walk a class chain for `ClassValue` identity (used by access checks in
/// the VM when needed).
pub fn class_extends(sub: &Rc<ClassValue>, ancestor: &Rc<ClassValue>) -> bool {
    let mut current = Some(Rc::clone(sub));
    while let Some(c) = current {
        if Rc::ptr_eq(&c, ancestor) {
            return true;
        }
        current = c.superclass.clone();
    }
    false
}

/// Invoke an arbitrary callable value (the `invoke_value` helper).
pub fn invoke_value(host: &mut dyn Host, callee: Value, args: Vec<Value>) -> Result<Value, Value> {
    invoke_with_this(host, callee, Value::Undefined, args)
}

pub fn invoke_with_this(
    host: &mut dyn Host,
    callee: Value,
    this: Value,
    args: Vec<Value>,
) -> Result<Value, Value> {
    if !callee.is_callable() {
        return Err(throw_type_error(format!(
            "{} is not a function",
            to_display_string(&callee)
        )));
    }
    host.call(callee, this, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_equality_conflates_null_and_undefined_only() {
        assert!(equals(&Value::Null, &Value::Undefined));
        assert!(!strict_equals(&Value::Null, &Value::Undefined));
        assert!(!equals(&Value::Null, &Value::Number(0.0)));
        assert!(!equals(&Value::Undefined, &Value::Bool(false)));
    }

    #[test]
    fn loose_equality_coerces_numbers_and_strings() {
        assert!(equals(&Value::Number(1.0), &Value::str("1")));
        assert!(equals(&Value::Bool(true), &Value::Number(1.0)));
        assert!(!equals(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
    }

    #[test]
    fn add_follows_js_rules() {
        assert!(matches!(
            add(&Value::Number(1.0), &Value::Number(2.0)).unwrap(),
            Value::Number(n) if n == 3.0
        ));
        assert_eq!(
            add(&Value::str("a"), &Value::Number(1.0))
                .unwrap()
                .as_str()
                .unwrap(),
            "a1"
        );
        assert_eq!(
            add(&Value::Number(1.0), &Value::str(""))
                .unwrap()
                .as_str()
                .unwrap(),
            "1"
        );
        assert!(add(&Value::BigInt(1), &Value::Number(1.0)).is_err());
    }

    #[test]
    fn to_integer_or_infinity_edges() {
        assert_eq!(to_integer_or_infinity(&Value::Number(f64::NAN)), 0);
        assert_eq!(
            to_integer_or_infinity(&Value::Number(f64::INFINITY)),
            i32::MAX as i64
        );
        assert_eq!(
            to_integer_or_infinity(&Value::Number(f64::NEG_INFINITY)),
            i32::MIN as i64
        );
        assert_eq!(to_integer_or_infinity(&Value::Number(3.9)), 3);
        assert_eq!(to_integer_or_infinity(&Value::Number(-3.9)), -3);
    }

    #[test]
    fn format_number_matches_js_conventions() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(1e21), "1e+21");
    }

    #[test]
    fn unsigned_shift_zero_extends() {
        assert!(matches!(
            unsigned_shift_right(&Value::Number(-1.0), &Value::Number(0.0)),
            Value::Number(n) if n == 4294967295.0
        ));
    }

    #[test]
    fn typeof_table() {
        assert_eq!(type_of(&Value::Null), "object");
        assert_eq!(type_of(&Value::Undefined), "undefined");
        assert_eq!(type_of(&Value::BigInt(1)), "bigint");
        assert_eq!(type_of(&Value::str("x")), "string");
    }
}
