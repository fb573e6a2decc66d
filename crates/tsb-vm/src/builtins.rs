//! The global environment: `console`, `JSON`, `Math`, `Object`, `Number`,
//! `Promise`, `Reflect`, `Symbol`, timer functions, and the builtin module
//! exports (`events`, `timers`, `stream`).
//!
//! Namespace globals are plain objects carrying builtin function values, so
//! property extraction (`const log = console.log`) works like any other
//! property read. Constructable natives carry a `__native_ctor` marker the
//! VM's `new` path recognizes.

use tsb_runtime::metadata::args as metadata_args;
use tsb_runtime::value::{BuiltinDef, JsObject, Value};
use tsb_runtime::{console, json, object, ops, promise, Host};

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

// ---- console ----

fn b_console_log(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    console::console_log(host, args)
}
fn b_console_error(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    console::console_error(host, args)
}
fn b_console_trace(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    console::console_trace(host, args)
}
fn b_console_count(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    console::console_count(host, args)
}
fn b_console_time(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    console::console_time(host, args)
}
fn b_console_time_end(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    console::console_time_end(host, args)
}
fn b_console_time_log(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    console::console_time_log(host, args)
}

static CONSOLE_LOG: BuiltinDef = BuiltinDef {
    name: "console.log",
    func: b_console_log,
};
static CONSOLE_ERROR: BuiltinDef = BuiltinDef {
    name: "console.error",
    func: b_console_error,
};
static CONSOLE_TRACE: BuiltinDef = BuiltinDef {
    name: "console.trace",
    func: b_console_trace,
};
static CONSOLE_COUNT: BuiltinDef = BuiltinDef {
    name: "console.count",
    func: b_console_count,
};
static CONSOLE_TIME: BuiltinDef = BuiltinDef {
    name: "console.time",
    func: b_console_time,
};
static CONSOLE_TIME_END: BuiltinDef = BuiltinDef {
    name: "console.timeEnd",
    func: b_console_time_end,
};
static CONSOLE_TIME_LOG: BuiltinDef = BuiltinDef {
    name: "console.timeLog",
    func: b_console_time_log,
};

// ---- JSON ----

fn b_json_stringify(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    json::stringify(host, &arg(&args, 0))
}
fn b_json_parse(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let text = ops::to_display_string(&arg(&args, 0));
    json::parse(host, &text, args.get(1).cloned())
}

static JSON_STRINGIFY: BuiltinDef = BuiltinDef {
    name: "JSON.stringify",
    func: b_json_stringify,
};
static JSON_PARSE: BuiltinDef = BuiltinDef {
    name: "JSON.parse",
    func: b_json_parse,
};

// ---- Math ----

macro_rules! math_unary {
    ($fn_name:ident, $static_name:ident, $label:literal, $op:expr) => {
        fn $fn_name(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
            let f: fn(f64) -> f64 = $op;
            Ok(Value::Number(f(ops::to_number(&arg(&args, 0)))))
        }
        static $static_name: BuiltinDef = BuiltinDef {
            name: $label,
            func: $fn_name,
        };
    };
}

math_unary!(b_math_floor, MATH_FLOOR, "Math.floor", |n| n.floor());
math_unary!(b_math_ceil, MATH_CEIL, "Math.ceil", |n| n.ceil());
math_unary!(b_math_round, MATH_ROUND, "Math.round", |n| (n + 0.5).floor());
math_unary!(b_math_trunc, MATH_TRUNC, "Math.trunc", |n| n.trunc());
math_unary!(b_math_abs, MATH_ABS, "Math.abs", |n| n.abs());
math_unary!(b_math_sqrt, MATH_SQRT, "Math.sqrt", |n| n.sqrt());
math_unary!(b_math_sign, MATH_SIGN, "Math.sign", |n| {
    if n.is_nan() || n == 0.0 { n } else { n.signum() }
});

fn b_math_max(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let mut best = f64::NEG_INFINITY;
    for a in &args {
        let n = ops::to_number(a);
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        best = best.max(n);
    }
    Ok(Value::Number(best))
}
fn b_math_min(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let mut best = f64::INFINITY;
    for a in &args {
        let n = ops::to_number(a);
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        best = best.min(n);
    }
    Ok(Value::Number(best))
}
fn b_math_pow(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::Number(
        ops::to_number(&arg(&args, 0)).powf(ops::to_number(&arg(&args, 1))),
    ))
}

static MATH_MAX: BuiltinDef = BuiltinDef {
    name: "Math.max",
    func: b_math_max,
};
static MATH_MIN: BuiltinDef = BuiltinDef {
    name: "Math.min",
    func: b_math_min,
};
static MATH_POW: BuiltinDef = BuiltinDef {
    name: "Math.pow",
    func: b_math_pow,
};

// ---- Object ----

fn b_object_keys(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::array(
        object::object_keys(&arg(&args, 0))
            .into_iter()
            .map(Value::str)
            .collect(),
    ))
}
fn b_object_values(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(match arg(&args, 0) {
        Value::Object(obj) => Value::array(
            obj.borrow()
                .props
                .iter()
                .filter(|(k, _)| !k.starts_with('#') && !k.starts_with("__"))
                .map(|(_, v)| v.clone())
                .collect(),
        ),
        Value::Array(items) => Value::Array(items),
        _ => Value::array(Vec::new()),
    })
}
fn b_object_entries(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(match arg(&args, 0) {
        Value::Object(obj) => Value::array(
            obj.borrow()
                .props
                .iter()
                .filter(|(k, _)| !k.starts_with('#') && !k.starts_with("__"))
                .map(|(k, v)| Value::array(vec![Value::str(k), v.clone()]))
                .collect(),
        ),
        _ => Value::array(Vec::new()),
    })
}
fn b_object_assign(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    object::object_assign(host, args)
}
fn b_object_freeze(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(object::freeze(&arg(&args, 0)))
}
fn b_object_is_frozen(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::Bool(object::is_frozen(&arg(&args, 0))))
}

static OBJECT_KEYS: BuiltinDef = BuiltinDef {
    name: "Object.keys",
    func: b_object_keys,
};
static OBJECT_VALUES: BuiltinDef = BuiltinDef {
    name: "Object.values",
    func: b_object_values,
};
static OBJECT_ENTRIES: BuiltinDef = BuiltinDef {
    name: "Object.entries",
    func: b_object_entries,
};
static OBJECT_ASSIGN: BuiltinDef = BuiltinDef {
    name: "Object.assign",
    func: b_object_assign,
};
static OBJECT_FREEZE: BuiltinDef = BuiltinDef {
    name: "Object.freeze",
    func: b_object_freeze,
};
static OBJECT_IS_FROZEN: BuiltinDef = BuiltinDef {
    name: "Object.isFrozen",
    func: b_object_is_frozen,
};

// ---- Number / global numeric helpers ----

fn b_number_is_integer(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::Bool(matches!(
        arg(&args, 0),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0
    )))
}
fn b_number_is_nan(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_nan())))
}
fn b_number_is_finite(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_finite())))
}
fn b_global_is_nan(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::Bool(ops::to_number(&arg(&args, 0)).is_nan()))
}
fn b_parse_float(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let s = ops::to_display_string(&arg(&args, 0));
    let t = s.trim();
    // Longest numeric prefix.
    let mut end = 0;
    let bytes = t.as_bytes();
    let mut seen_dot = false;
    let mut seen_e = false;
    while end < bytes.len() {
        let c = bytes[end] as char;
        let ok = c.is_ascii_digit()
            || (c == '-' || c == '+') && (end == 0 || (bytes[end - 1] | 0x20) == b'e')
            || c == '.' && !seen_dot && !seen_e
            || (c == 'e' || c == 'E') && !seen_e && end > 0;
        if !ok {
            break;
        }
        if c == '.' {
            seen_dot = true;
        }
        if c == 'e' || c == 'E' {
            seen_e = true;
        }
        end += 1;
    }
    Ok(t[..end]
        .parse::<f64>()
        .map(Value::Number)
        .unwrap_or(Value::Number(f64::NAN)))
}
fn b_parse_int(_host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let s = ops::to_display_string(&arg(&args, 0));
    let radix = match args.get(1) {
        None | Some(Value::Undefined) => 10,
        Some(v) => {
            let r = ops::to_number(v) as u32;
            if r == 0 { 10 } else { r }
        }
    };
    let t = s.trim();
    let (neg, digits) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let digits = if radix == 16 {
        digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits)
    } else {
        digits
    };
    let mut value: f64 = 0.0;
    let mut any = false;
    for c in digits.chars() {
        match c.to_digit(radix) {
            Some(d) => {
                value = value * radix as f64 + d as f64;
                any = true;
            }
            None => break,
        }
    }
    if !any {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(if neg { -value } else { value }))
}

static NUMBER_IS_INTEGER: BuiltinDef = BuiltinDef {
    name: "Number.isInteger",
    func: b_number_is_integer,
};
static NUMBER_IS_NAN: BuiltinDef = BuiltinDef {
    name: "Number.isNaN",
    func: b_number_is_nan,
};
static NUMBER_IS_FINITE: BuiltinDef = BuiltinDef {
    name: "Number.isFinite",
    func: b_number_is_finite,
};
static GLOBAL_IS_NAN: BuiltinDef = BuiltinDef {
    name: "isNaN",
    func: b_global_is_nan,
};
static PARSE_FLOAT: BuiltinDef = BuiltinDef {
    name: "parseFloat",
    func: b_parse_float,
};
static PARSE_INT: BuiltinDef = BuiltinDef {
    name: "parseInt",
    func: b_parse_int,
};

// ---- Promise statics ----

fn b_promise_resolve(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::Promise(promise::resolve_value(
        host.ctx_mut(),
        arg(&args, 0),
    )))
}
fn b_promise_reject(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::Promise(promise::rejected_promise(
        host.ctx_mut(),
        arg(&args, 0),
    )))
}
fn b_promise_all(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    promise::promise_all(host, &arg(&args, 0))
}
fn b_promise_race(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    promise::promise_race(host, &arg(&args, 0))
}

static PROMISE_RESOLVE: BuiltinDef = BuiltinDef {
    name: "Promise.resolve",
    func: b_promise_resolve,
};
static PROMISE_REJECT: BuiltinDef = BuiltinDef {
    name: "Promise.reject",
    func: b_promise_reject,
};
static PROMISE_ALL: BuiltinDef = BuiltinDef {
    name: "Promise.all",
    func: b_promise_all,
};
static PROMISE_RACE: BuiltinDef = BuiltinDef {
    name: "Promise.race",
    func: b_promise_race,
};

// ---- timers ----

fn timer_args(args: &[Value]) -> (Value, f64, Vec<Value>) {
    let cb = arg(args, 0);
    let delay = ops::to_number(&arg(args, 1));
    let rest: Vec<Value> = args.iter().skip(2).cloned().collect();
    (cb, if delay.is_nan() { 0.0 } else { delay }, rest)
}

fn b_set_timeout(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let (cb, delay, rest) = timer_args(&args);
    let ctx = host.ctx_mut();
    let now = ctx.now_ms();
    let id = ctx.timers.schedule(cb, rest, now, delay, false);
    Ok(Value::Number(id as f64))
}
fn b_set_interval(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let (cb, delay, rest) = timer_args(&args);
    let ctx = host.ctx_mut();
    let now = ctx.now_ms();
    let id = ctx.timers.schedule(cb, rest, now, delay, true);
    Ok(Value::Number(id as f64))
}
fn b_clear_timer(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    if let Value::Number(id) = arg(&args, 0) {
        host.ctx_mut().timers.cancel(id as u32);
    }
    Ok(Value::Undefined)
}
fn b_set_immediate(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let cb = arg(&args, 0);
    let rest: Vec<Value> = args.iter().skip(1).cloned().collect();
    let ctx = host.ctx_mut();
    let now = ctx.now_ms();
    let id = ctx.timers.schedule(cb, rest, now, 0.0, false);
    Ok(Value::Number(id as f64))
}
fn b_queue_microtask(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let cb = arg(&args, 0);
    host.ctx_mut()
        .enqueue(tsb_runtime::ctx::Microtask::Call {
            callee: cb,
            args: Vec::new(),
        });
    Ok(Value::Undefined)
}

static SET_TIMEOUT: BuiltinDef = BuiltinDef {
    name: "setTimeout",
    func: b_set_timeout,
};
static SET_INTERVAL: BuiltinDef = BuiltinDef {
    name: "setInterval",
    func: b_set_interval,
};
static CLEAR_TIMEOUT: BuiltinDef = BuiltinDef {
    name: "clearTimeout",
    func: b_clear_timer,
};
static CLEAR_INTERVAL: BuiltinDef = BuiltinDef {
    name: "clearInterval",
    func: b_clear_timer,
};
static SET_IMMEDIATE: BuiltinDef = BuiltinDef {
    name: "setImmediate",
    func: b_set_immediate,
};
static CLEAR_IMMEDIATE: BuiltinDef = BuiltinDef {
    name: "clearImmediate",
    func: b_clear_timer,
};
static QUEUE_MICROTASK: BuiltinDef = BuiltinDef {
    name: "queueMicrotask",
    func: b_queue_microtask,
};

// ---- Date statics ----

fn b_date_now(host: &mut dyn Host, _args: Vec<Value>) -> Result<Value, Value> {
    Ok(Value::Number(host.ctx_mut().now_ms()))
}
static DATE_NOW: BuiltinDef = BuiltinDef {
    name: "Date.now",
    func: b_date_now,
};

// ---- Reflect metadata ----

fn b_reflect_define(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let (key, value, target, property) = metadata_args::define(&args);
    host.ctx_mut().metadata.define(key, value, target, property);
    Ok(Value::Undefined)
}
fn b_reflect_get(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let (key, target, property) = metadata_args::query(&args);
    Ok(host
        .ctx_mut()
        .metadata
        .get(&key, &target, property.as_deref())
        .unwrap_or(Value::Undefined))
}
fn b_reflect_get_own(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let (key, target, property) = metadata_args::query(&args);
    Ok(host
        .ctx_mut()
        .metadata
        .get_own(&key, &target, property.as_deref())
        .unwrap_or(Value::Undefined))
}
fn b_reflect_has(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let (key, target, property) = metadata_args::query(&args);
    Ok(Value::Bool(host.ctx_mut().metadata.has(
        &key,
        &target,
        property.as_deref(),
    )))
}
fn b_reflect_has_own(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let (key, target, property) = metadata_args::query(&args);
    Ok(Value::Bool(host.ctx_mut().metadata.has_own(
        &key,
        &target,
        property.as_deref(),
    )))
}
fn b_reflect_delete(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let (key, target, property) = metadata_args::query(&args);
    Ok(Value::Bool(host.ctx_mut().metadata.delete(
        &key,
        &target,
        property.as_deref(),
    )))
}
fn b_reflect_keys(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let target = arg(&args, 0);
    let property = args.get(1).and_then(|v| v.as_str().map(str::to_string));
    Ok(Value::array(
        host.ctx_mut()
            .metadata
            .keys(&target, property.as_deref())
            .into_iter()
            .map(Value::str)
            .collect(),
    ))
}

static REFLECT_DEFINE: BuiltinDef = BuiltinDef {
    name: "Reflect.defineMetadata",
    func: b_reflect_define,
};
static REFLECT_GET: BuiltinDef = BuiltinDef {
    name: "Reflect.getMetadata",
    func: b_reflect_get,
};
static REFLECT_GET_OWN: BuiltinDef = BuiltinDef {
    name: "Reflect.getOwnMetadata",
    func: b_reflect_get_own,
};
static REFLECT_HAS: BuiltinDef = BuiltinDef {
    name: "Reflect.hasMetadata",
    func: b_reflect_has,
};
static REFLECT_HAS_OWN: BuiltinDef = BuiltinDef {
    name: "Reflect.hasOwnMetadata",
    func: b_reflect_has_own,
};
static REFLECT_DELETE: BuiltinDef = BuiltinDef {
    name: "Reflect.deleteMetadata",
    func: b_reflect_delete,
};
static REFLECT_KEYS: BuiltinDef = BuiltinDef {
    name: "Reflect.getMetadataKeys",
    func: b_reflect_keys,
};

// ---- lowering helper globals ----

fn b_get_iterator(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    tsb_runtime::iter::get_iterator(host, &arg(&args, 0))
}
fn b_get_async_iterator(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    tsb_runtime::iter::get_async_iterator(host, &arg(&args, 0))
}
fn b_dispose(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
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

static GET_ITERATOR_HELPER: BuiltinDef = BuiltinDef {
    name: "@getIterator",
    func: b_get_iterator,
};
static GET_ASYNC_ITERATOR_HELPER: BuiltinDef = BuiltinDef {
    name: "@getAsyncIterator",
    func: b_get_async_iterator,
};
static DISPOSE_HELPER: BuiltinDef = BuiltinDef {
    name: "@dispose",
    func: b_dispose,
};

// =============================================================================
// Assembly
// =============================================================================

/// A constructable native: an object with methods plus the `__native_ctor`
/// marker the VM's `new` path dispatches on.
fn native_ctor(name: &str, props: Vec<(&str, Value)>) -> Value {
    let mut obj = JsObject::plain();
    obj.props
        .insert("__native_ctor".to_string(), Value::str(name));
    for (k, v) in props {
        obj.props.insert(k.to_string(), v);
    }
    Value::object(obj)
}

fn namespace(props: Vec<(&str, Value)>) -> Value {
    let mut obj = JsObject::plain();
    for (k, v) in props {
        obj.props.insert(k.to_string(), v);
    }
    Value::object(obj)
}

/// Build the global environment.
pub fn install_globals(globals: &mut rustc_hash::FxHashMap<String, Value>) {
    let console = namespace(vec![
        ("log", Value::Builtin(&CONSOLE_LOG)),
        ("info", Value::Builtin(&CONSOLE_LOG)),
        ("debug", Value::Builtin(&CONSOLE_LOG)),
        ("error", Value::Builtin(&CONSOLE_ERROR)),
        ("warn", Value::Builtin(&CONSOLE_ERROR)),
        ("trace", Value::Builtin(&CONSOLE_TRACE)),
        ("count", Value::Builtin(&CONSOLE_COUNT)),
        ("time", Value::Builtin(&CONSOLE_TIME)),
        ("timeEnd", Value::Builtin(&CONSOLE_TIME_END)),
        ("timeLog", Value::Builtin(&CONSOLE_TIME_LOG)),
    ]);
    globals.insert("console".to_string(), console);

    globals.insert(
        "JSON".to_string(),
        namespace(vec![
            ("stringify", Value::Builtin(&JSON_STRINGIFY)),
            ("parse", Value::Builtin(&JSON_PARSE)),
        ]),
    );

    globals.insert(
        "Math".to_string(),
        namespace(vec![
            ("floor", Value::Builtin(&MATH_FLOOR)),
            ("ceil", Value::Builtin(&MATH_CEIL)),
            ("round", Value::Builtin(&MATH_ROUND)),
            ("trunc", Value::Builtin(&MATH_TRUNC)),
            ("abs", Value::Builtin(&MATH_ABS)),
            ("sqrt", Value::Builtin(&MATH_SQRT)),
            ("sign", Value::Builtin(&MATH_SIGN)),
            ("max", Value::Builtin(&MATH_MAX)),
            ("min", Value::Builtin(&MATH_MIN)),
            ("pow", Value::Builtin(&MATH_POW)),
            ("PI", Value::Number(std::f64::consts::PI)),
            ("E", Value::Number(std::f64::consts::E)),
        ]),
    );

    globals.insert(
        "Object".to_string(),
        namespace(vec![
            ("keys", Value::Builtin(&OBJECT_KEYS)),
            ("values", Value::Builtin(&OBJECT_VALUES)),
            ("entries", Value::Builtin(&OBJECT_ENTRIES)),
            ("assign", Value::Builtin(&OBJECT_ASSIGN)),
            ("freeze", Value::Builtin(&OBJECT_FREEZE)),
            ("isFrozen", Value::Builtin(&OBJECT_IS_FROZEN)),
        ]),
    );

    globals.insert(
        "Number".to_string(),
        namespace(vec![
            ("isInteger", Value::Builtin(&NUMBER_IS_INTEGER)),
            ("isNaN", Value::Builtin(&NUMBER_IS_NAN)),
            ("isFinite", Value::Builtin(&NUMBER_IS_FINITE)),
            ("parseFloat", Value::Builtin(&PARSE_FLOAT)),
            ("parseInt", Value::Builtin(&PARSE_INT)),
            ("MAX_SAFE_INTEGER", Value::Number(9007199254740991.0)),
            ("MIN_SAFE_INTEGER", Value::Number(-9007199254740991.0)),
            ("EPSILON", Value::Number(f64::EPSILON)),
            ("NaN", Value::Number(f64::NAN)),
        ]),
    );

    globals.insert(
        "Promise".to_string(),
        native_ctor(
            "Promise",
            vec![
                ("resolve", Value::Builtin(&PROMISE_RESOLVE)),
                ("reject", Value::Builtin(&PROMISE_REJECT)),
                ("all", Value::Builtin(&PROMISE_ALL)),
                ("race", Value::Builtin(&PROMISE_RACE)),
            ],
        ),
    );

    globals.insert(
        "Date".to_string(),
        native_ctor("Date", vec![("now", Value::Builtin(&DATE_NOW))]),
    );
    globals.insert("Map".to_string(), native_ctor("Map", Vec::new()));
    globals.insert("Set".to_string(), native_ctor("Set", Vec::new()));
    globals.insert("WeakMap".to_string(), native_ctor("WeakMap", Vec::new()));
    globals.insert("WeakSet".to_string(), native_ctor("WeakSet", Vec::new()));
    globals.insert("Array".to_string(), native_ctor("Array", Vec::new()));
    globals.insert("Error".to_string(), native_ctor("Error", Vec::new()));
    globals.insert("TypeError".to_string(), native_ctor("TypeError", Vec::new()));
    globals.insert(
        "RangeError".to_string(),
        native_ctor("RangeError", Vec::new()),
    );
    globals.insert(
        "SyntaxError".to_string(),
        native_ctor("SyntaxError", Vec::new()),
    );

    globals.insert(
        "Reflect".to_string(),
        namespace(vec![
            ("defineMetadata", Value::Builtin(&REFLECT_DEFINE)),
            ("getMetadata", Value::Builtin(&REFLECT_GET)),
            ("getOwnMetadata", Value::Builtin(&REFLECT_GET_OWN)),
            ("hasMetadata", Value::Builtin(&REFLECT_HAS)),
            ("hasOwnMetadata", Value::Builtin(&REFLECT_HAS_OWN)),
            ("deleteMetadata", Value::Builtin(&REFLECT_DELETE)),
            ("getMetadataKeys", Value::Builtin(&REFLECT_KEYS)),
        ]),
    );

    globals.insert(
        "Symbol".to_string(),
        namespace(vec![
            ("iterator", Value::str("@@iterator")),
            ("asyncIterator", Value::str("@@asyncIterator")),
            ("dispose", Value::str("@@dispose")),
        ]),
    );

    for def in [
        &SET_TIMEOUT,
        &SET_INTERVAL,
        &CLEAR_TIMEOUT,
        &CLEAR_INTERVAL,
        &SET_IMMEDIATE,
        &CLEAR_IMMEDIATE,
        &QUEUE_MICROTASK,
        &GLOBAL_IS_NAN,
        &PARSE_FLOAT,
        &PARSE_INT,
    ] {
        globals.insert(def.name.to_string(), Value::Builtin(def));
    }
    globals.insert("NaN".to_string(), Value::Number(f64::NAN));
    globals.insert("Infinity".to_string(), Value::Number(f64::INFINITY));

    // Lowering-internal helpers; names start with '@' so user code cannot
    // shadow them.
    globals.insert(
        GET_ITERATOR_HELPER.name.to_string(),
        Value::Builtin(&GET_ITERATOR_HELPER),
    );
    globals.insert(
        GET_ASYNC_ITERATOR_HELPER.name.to_string(),
        Value::Builtin(&GET_ASYNC_ITERATOR_HELPER),
    );
    globals.insert(
        DISPOSE_HELPER.name.to_string(),
        Value::Builtin(&DISPOSE_HELPER),
    );
}

/// Export sets of the builtin modules (`events`, `timers`, `stream`).
pub fn builtin_module_exports(specifier: &str) -> Vec<(String, Value)> {
    match specifier {
        "events" => vec![(
            "EventEmitter".to_string(),
            native_ctor("EventEmitter", Vec::new()),
        )],
        "timers" => vec![
            ("setTimeout".to_string(), Value::Builtin(&SET_TIMEOUT)),
            ("clearTimeout".to_string(), Value::Builtin(&CLEAR_TIMEOUT)),
            ("setInterval".to_string(), Value::Builtin(&SET_INTERVAL)),
            (
                "clearInterval".to_string(),
                Value::Builtin(&CLEAR_INTERVAL),
            ),
            ("setImmediate".to_string(), Value::Builtin(&SET_IMMEDIATE)),
            (
                "clearImmediate".to_string(),
                Value::Builtin(&CLEAR_IMMEDIATE),
            ),
        ],
        "stream" => vec![(
            "Writable".to_string(),
            native_ctor("Writable", Vec::new()),
        )],
        _ => Vec::new(),
    }
}
