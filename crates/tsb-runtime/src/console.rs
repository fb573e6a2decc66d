//! Console: formatting, counters, virtual-clock timers.
//!
//! `log`/`info`/`debug` go to stdout, `warn`/`error` to stderr. Format
//! specifiers `%s %d %i %f %o` are substituted left to right; `%%` is a
//! literal percent; missing arguments leave the specifier in place; extra
//! arguments are space-joined after the formatted text.

use crate::ops::{format_number, to_display_string, to_number};
use crate::value::Value;
use crate::Host;

/// Node-style value rendering for console output.
pub fn inspect(v: &Value) -> String {
    inspect_depth(v, false)
}

fn inspect_depth(v: &Value, nested: bool) -> String {
    match v {
        Value::Str(s) if nested => format!("'{s}'"),
        Value::Str(s) => s.to_string(),
        Value::Array(items) => {
            let items = items.borrow();
            if items.is_empty() {
                return "[]".to_string();
            }
            let parts: Vec<String> = items.iter().map(|v| inspect_depth(v, true)).collect();
            format!("[ {} ]", parts.join(", "))
        }
        Value::Object(obj) => {
            let obj = obj.borrow();
            let class_prefix = obj
                .class
                .as_ref()
                .map(|c| format!("{} ", c.name))
                .unwrap_or_default();
            if obj.props.is_empty() {
                return format!("{class_prefix}{{}}");
            }
            let parts: Vec<String> = obj
                .props
                .iter()
                .filter(|(k, _)| !k.starts_with('#'))
                .map(|(k, v)| format!("{k}: {}", inspect_depth(v, true)))
                .collect();
            format!("{class_prefix}{{ {} }}", parts.join(", "))
        }
        Value::MapV(m) => {
            let m = m.borrow();
            if m.entries.is_empty() {
                return "Map(0) {}".to_string();
            }
            let parts: Vec<String> = m
                .entries
                .iter()
                .map(|(k, v)| {
                    format!("{} => {}", inspect_depth(k, true), inspect_depth(v, true))
                })
                .collect();
            format!("Map({}) {{ {} }}", m.entries.len(), parts.join(", "))
        }
        Value::SetV(s) => {
            let s = s.borrow();
            if s.entries.is_empty() {
                return "Set(0) {}".to_string();
            }
            let parts: Vec<String> = s.entries.iter().map(|v| inspect_depth(v, true)).collect();
            format!("Set({}) {{ {} }}", s.entries.len(), parts.join(", "))
        }
        Value::BigInt(n) => format!("{n}n"),
        Value::Function(f) => {
            if f.name.is_empty() {
                "[Function (anonymous)]".to_string()
            } else {
                format!("[Function: {}]", f.name)
            }
        }
        Value::Builtin(b) => format!("[Function: {}]", b.name),
        Value::Class(c) => format!("[class {}]", c.name),
        Value::Promise(_) => "Promise { <pending> }".to_string(),
        other => to_display_string(other),
    }
}

/// Apply `%`-specifier formatting per the console contract.
pub fn format_message(args: &[Value]) -> String {
    let Some(Value::Str(fmt)) = args.first() else {
        // No format string: inspect everything, space-joined.
        let parts: Vec<String> = args.iter().map(inspect).collect();
        return parts.join(" ");
    };
    let fmt = fmt.to_string();
    let mut out = String::with_capacity(fmt.len());
    let mut next_arg = 1usize;
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some(&(spec @ ('s' | 'd' | 'i' | 'f' | 'o'))) => {
                chars.next();
                if next_arg >= args.len() {
                    // Missing argument: the specifier stays literal.
                    out.push('%');
                    out.push(spec);
                    continue;
                }
                let arg = &args[next_arg];
                next_arg += 1;
                match spec {
                    's' => out.push_str(&to_display_string(arg)),
                    'd' | 'i' => {
                        let n = to_number(arg);
                        if n.is_nan() {
                            out.push_str("NaN");
                        } else {
                            out.push_str(&format_number(n.trunc()));
                        }
                    }
                    'f' => out.push_str(&format_number(to_number(arg))),
                    'o' => out.push_str(&inspect(arg)),
                    _ => unreachable!("peeked specifier"),
                }
            }
            _ => out.push('%'),
        }
    }
    // Extra arguments space-join at the end.
    for arg in &args[next_arg.min(args.len())..] {
        out.push(' ');
        out.push_str(&inspect(arg));
    }
    out
}

pub fn console_log(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let line = format_message(&args);
    host.ctx_mut().write_out(&line);
    Ok(Value::Undefined)
}

pub fn console_error(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let line = format_message(&args);
    host.ctx_mut().write_err(&line);
    Ok(Value::Undefined)
}

pub fn console_trace(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let line = format_message(&args);
    let rendered = if line.is_empty() {
        "Trace:".to_string()
    } else {
        format!("Trace: {line}")
    };
    host.ctx_mut().write_err(&rendered);
    Ok(Value::Undefined)
}

pub fn console_count(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let label = match args.first() {
        None | Some(Value::Undefined) => "default".to_string(),
        Some(v) => to_display_string(v),
    };
    let ctx = host.ctx_mut();
    let n = ctx.counts.entry(label.clone()).or_insert(0);
    *n += 1;
    let line = format!("{label}: {n}");
    ctx.write_out(&line);
    Ok(Value::Undefined)
}

pub fn console_time(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let label = time_label(&args);
    let ctx = host.ctx_mut();
    let now = ctx.now_ms();
    ctx.time_marks.insert(label, now);
    Ok(Value::Undefined)
}

pub fn console_time_end(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let label = time_label(&args);
    let ctx = host.ctx_mut();
    match ctx.time_marks.remove(&label) {
        Some(start) => {
            let elapsed = ctx.now_ms() - start;
            let line = format!("{label}: {}ms", format_number(elapsed));
            ctx.write_out(&line);
        }
        None => {
            let line = format!("Warning: no such label '{label}' for console.timeEnd()");
            ctx.write_err(&line);
        }
    }
    Ok(Value::Undefined)
}

pub fn console_time_log(host: &mut dyn Host, args: Vec<Value>) -> Result<Value, Value> {
    let label = time_label(&args);
    let extra: Vec<Value> = args.iter().skip(1).cloned().collect();
    let ctx = host.ctx_mut();
    match ctx.time_marks.get(&label).copied() {
        Some(start) => {
            let elapsed = ctx.now_ms() - start;
            let mut line = format!("{label}: {}ms", format_number(elapsed));
            for v in &extra {
                line.push(' ');
                line.push_str(&inspect(v));
            }
            ctx.write_out(&line);
        }
        None => {
            let line = format!("Warning: no such label '{label}' for console.timeLog()");
            ctx.write_err(&line);
        }
    }
    Ok(Value::Undefined)
}

fn time_label(args: &[Value]) -> String {
    match args.first() {
        None | Some(Value::Undefined) => "default".to_string(),
        Some(v) => to_display_string(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_substitutes_in_order() {
        let args = vec![
            Value::str("Name: %s, Age: %d, Score: %f"),
            Value::str("Alice"),
            Value::Number(30.0),
            Value::Number(95.5),
        ];
        assert_eq!(format_message(&args), "Name: Alice, Age: 30, Score: 95.5");
    }

    #[test]
    fn double_percent_is_literal() {
        let args = vec![Value::str("100%% sure"), Value::Number(1.0)];
        assert_eq!(format_message(&args), "100% sure 1");
    }

    #[test]
    fn missing_arguments_leave_specifier() {
        let args = vec![Value::str("a=%s b=%s"), Value::str("x")];
        assert_eq!(format_message(&args), "a=x b=%s");
    }

    #[test]
    fn extra_arguments_join_with_spaces() {
        let args = vec![Value::str("done"), Value::Number(1.0), Value::str("two")];
        assert_eq!(format_message(&args), "done 1 two");
    }

    #[test]
    fn integer_specifier_truncates() {
        let args = vec![Value::str("%i"), Value::Number(3.9)];
        assert_eq!(format_message(&args), "3");
    }
}
