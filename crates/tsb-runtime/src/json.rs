//! Hand-written JSON: a recursive stringifier and a parser with reviver
//! support. No external library.
//!
//! Output conventions: `null`, `true`/`false`, strings with minimal
//! escaping, numbers in shortest round-trip form (NaN/Infinity serialize as
//! `null`), arrays and objects with no spaces. Class instances reflect
//! their property dictionary; `__`-prefixed backing-field names are
//! camelCased for output keys; `toJSON()` is honored; BigInt throws.

use crate::object::get_property;
use crate::ops::format_number;
use crate::value::{JsObject, Value};
use crate::{throw_type_error, Host};

pub fn stringify(host: &mut dyn Host, value: &Value) -> Result<Value, Value> {
    match stringify_value(host, value)? {
        Some(s) => Ok(Value::str(s)),
        None => Ok(Value::Undefined),
    }
}

/// `None` means the value is skipped entirely (functions, undefined).
fn stringify_value(host: &mut dyn Host, value: &Value) -> Result<Option<String>, Value> {
    Ok(Some(match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if n.is_finite() {
                format_number(*n)
            } else {
                "null".to_string()
            }
        }
        Value::BigInt(_) => {
            return Err(throw_type_error("Do not know how to serialize a BigInt"));
        }
        Value::Str(s) => escape_string(s),
        Value::Array(items) => {
            let items = items.borrow().clone();
            let mut parts = Vec::with_capacity(items.len());
            for item in &items {
                // Holes and unserializable entries become null in arrays.
                parts.push(stringify_value(host, item)?.unwrap_or_else(|| "null".to_string()));
            }
            format!("[{}]", parts.join(","))
        }
        Value::Object(obj) => {
            let has_to_json = {
                let o = obj.borrow();
                o.props.contains_key("toJSON")
                    || o.class
                        .as_ref()
                        .is_some_and(|c| c.find_method("toJSON").is_some())
            };
            if has_to_json {
                let method = get_property(host, value, "toJSON")?;
                if method.is_callable() {
                    let replaced = host.call(method, value.clone(), Vec::new())?;
                    return stringify_value(host, &replaced);
                }
            }
            let entries: Vec<(String, Value)> = obj
                .borrow()
                .props
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let is_instance = obj.borrow().class.is_some();
            let mut parts = Vec::new();
            for (key, v) in entries {
                if key.starts_with('#') {
                    continue; // private fields never serialize
                }
                let out_key = if is_instance && key.starts_with("__") {
                    camel_case_backing_field(&key)
                } else {
                    key
                };
                if let Some(rendered) = stringify_value(host, &v)? {
                    parts.push(format!("{}:{}", escape_string(&out_key), rendered));
                }
            }
            format!("{{{}}}", parts.join(","))
        }
        Value::MapV(_) | Value::SetV(_) => "{}".to_string(),
        Value::Date(ms) => escape_string(&format!("{ms}")),
        Value::Undefined
        | Value::Function(_)
        | Value::Builtin(_)
        | Value::Class(_)
        | Value::Machine(_)
        | Value::Promise(_)
        | Value::RegExp(_)
        | Value::Emitter(_)
        | Value::Writable(_)
        | Value::Iter(_)
        | Value::Uninitialized => return Ok(None),
    }))
}

/// `__first_name` → `firstName`.
fn camel_case_backing_field(key: &str) -> String {
    let trimmed = key.trim_start_matches('_');
    let mut out = String::with_capacity(trimmed.len());
    let mut upper_next = false;
    for (i, c) in trimmed.chars().enumerate() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else if i == 0 {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Minimal escaping: `"` `\\`, the short control escapes, `\uXXXX` for the
/// rest of C0.
fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// =============================================================================
// Parsing
// =============================================================================

pub fn parse(host: &mut dyn Host, text: &str, reviver: Option<Value>) -> Result<Value, Value> {
    let mut parser = JsonParser {
        bytes: text.as_bytes(),
        pos: 0,
        text,
    };
    parser.skip_ws();
    let value = parser.parse_value()?;
    parser.skip_ws();
    if parser.pos != parser.bytes.len() {
        return Err(syntax_error("unexpected trailing characters"));
    }
    match reviver {
        Some(reviver) if reviver.is_callable() => {
            revive(host, &reviver, Value::str(""), value)
        }
        _ => Ok(value),
    }
}

/// Bottom-up reviver walk: children first, then the node itself; `undefined`
/// results delete object properties.
fn revive(host: &mut dyn Host, reviver: &Value, key: Value, value: Value) -> Result<Value, Value> {
    let value = match &value {
        Value::Array(items) => {
            let snapshot = items.borrow().clone();
            let mut out = Vec::with_capacity(snapshot.len());
            for (i, item) in snapshot.into_iter().enumerate() {
                let revived = revive(host, reviver, Value::str(i.to_string()), item)?;
                out.push(revived);
            }
            Value::array(out)
        }
        Value::Object(obj) => {
            let snapshot: Vec<(String, Value)> = obj
                .borrow()
                .props
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let mut out = JsObject::plain();
            for (k, v) in snapshot {
                let revived = revive(host, reviver, Value::str(&k), v)?;
                if !matches!(revived, Value::Undefined) {
                    out.props.insert(k, revived);
                }
            }
            Value::object(out)
        }
        _ => value,
    };
    host.call(reviver.clone(), Value::Undefined, vec![key, value])
}

fn syntax_error(message: &str) -> Value {
    crate::value::error_value("SyntaxError", format!("JSON.parse: {message}"))
}

struct JsonParser<'a> {
    bytes: &'a [u8],
    text: &'a str,
    pos: usize,
}

impl<'a> JsonParser<'a> {
    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len()
            && matches!(self.bytes[self.pos], b' ' | b'\t' | b'\n' | b'\r')
        {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn parse_value(&mut self) -> Result<Value, Value> {
        match self.peek() {
            Some(b'{') => self.parse_object(),
            Some(b'[') => self.parse_array(),
            Some(b'"') => Ok(Value::str(self.parse_string()?)),
            Some(b't') => self.parse_keyword("true", Value::Bool(true)),
            Some(b'f') => self.parse_keyword("false", Value::Bool(false)),
            Some(b'n') => self.parse_keyword("null", Value::Null),
            Some(c) if c == b'-' || c.is_ascii_digit() => self.parse_number(),
            _ => Err(syntax_error("unexpected character")),
        }
    }

    fn parse_keyword(&mut self, word: &str, value: Value) -> Result<Value, Value> {
        if self.text[self.pos..].starts_with(word) {
            self.pos += word.len();
            Ok(value)
        } else {
            Err(syntax_error("unexpected keyword"))
        }
    }

    fn parse_number(&mut self) -> Result<Value, Value> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        self.text[start..self.pos]
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|_| syntax_error("malformed number"))
    }

    fn parse_string(&mut self) -> Result<String, Value> {
        self.pos += 1; // opening quote
        let mut out = String::new();
        loop {
            let rest = &self.text[self.pos..];
            let mut chars = rest.char_indices();
            let Some((i, c)) = chars.next() else {
                return Err(syntax_error("unterminated string"));
            };
            debug_assert_eq!(i, 0);
            self.pos += c.len_utf8();
            match c {
                '"' => return Ok(out),
                '\\' => {
                    let Some(e) = self.text[self.pos..].chars().next() else {
                        return Err(syntax_error("unterminated escape"));
                    };
                    self.pos += e.len_utf8();
                    match e {
                        '"' => out.push('"'),
                        '\\' => out.push('\\'),
                        '/' => out.push('/'),
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'b' => out.push('\u{0008}'),
                        'f' => out.push('\u{000C}'),
                        'u' => {
                            let hex = self
                                .text
                                .get(self.pos..self.pos + 4)
                                .ok_or_else(|| syntax_error("bad unicode escape"))?;
                            let code = u32::from_str_radix(hex, 16)
                                .map_err(|_| syntax_error("bad unicode escape"))?;
                            self.pos += 4;
                            out.push(
                                char::from_u32(code)
                                    .ok_or_else(|| syntax_error("bad unicode escape"))?,
                            );
                        }
                        _ => return Err(syntax_error("bad escape character")),
                    }
                }
                c if (c as u32) < 0x20 => return Err(syntax_error("control character in string")),
                c => out.push(c),
            }
        }
    }

    fn parse_array(&mut self) -> Result<Value, Value> {
        self.pos += 1;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::array(items));
        }
        loop {
            self.skip_ws();
            items.push(self.parse_value()?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::array(items));
                }
                _ => return Err(syntax_error("expected ',' or ']'")),
            }
        }
    }

    fn parse_object(&mut self) -> Result<Value, Value> {
        self.pos += 1;
        let mut obj = JsObject::plain();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Value::object(obj));
        }
        loop {
            self.skip_ws();
            if self.peek() != Some(b'"') {
                return Err(syntax_error("expected string key"));
            }
            let key = self.parse_string()?;
            self.skip_ws();
            if self.peek() != Some(b':') {
                return Err(syntax_error("expected ':'"));
            }
            self.pos += 1;
            self.skip_ws();
            let value = self.parse_value()?;
            obj.props.insert(key, value);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::object(obj));
                }
                _ => return Err(syntax_error("expected ',' or '}'")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::camel_case_backing_field;

    #[test]
    fn backing_field_names_camel_case() {
        assert_eq!(camel_case_backing_field("__first_name"), "firstName");
        assert_eq!(camel_case_backing_field("__value"), "value");
        assert_eq!(camel_case_backing_field("__HTTP_code"), "hTTPCode");
    }
}
