//! The writable stream base class.
//!
//! State machine `{writable, ended, finished, destroyed, corked}` with
//! user-settable `_writeCallback` / `_finalCallback`. `end()` is idempotent
//! and emits `finish`; `destroy(err)` emits `error` (when `err` is
//! non-null) then `close`, and is idempotent too. `cork`/`uncork` buffer
//! writes without flushing. Mutating methods chain by returning `this`.

use crate::events;
use crate::value::{make_ref, EmitterState, Ref, Value, WritableState};
use crate::{throw_type_error, Host};

pub fn new_writable() -> Value {
    Value::Writable(make_ref(WritableState {
        writable: true,
        ended: false,
        finished: false,
        destroyed: false,
        corked: 0,
        buffered: Vec::new(),
        write_callback: Value::Undefined,
        final_callback: Value::Undefined,
        emitter: make_ref(EmitterState {
            listeners: Default::default(),
            max_listeners: events::DEFAULT_MAX_LISTENERS,
            warned: Vec::new(),
        }),
    }))
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

pub fn call_writable_method(
    host: &mut dyn Host,
    state: &Ref<WritableState>,
    name: &str,
    args: Vec<Value>,
    recv: &Value,
) -> Result<Value, Value> {
    match name {
        "write" => {
            let chunk = arg(&args, 0);
            let (cb, deliver) = {
                let mut s = state.borrow_mut();
                if s.destroyed {
                    return Err(throw_type_error("write after destroy"));
                }
                if s.ended {
                    return Err(throw_type_error("write after end"));
                }
                if s.corked > 0 {
                    s.buffered.push(chunk.clone());
                    (Value::Undefined, None)
                } else {
                    (s.write_callback.clone(), Some(chunk))
                }
            };
            if let Some(chunk) = deliver {
                if cb.is_callable() {
                    host.call(cb, recv.clone(), vec![chunk])?;
                }
            }
            Ok(Value::Bool(true))
        }
        "end" => {
            let already = {
                let mut s = state.borrow_mut();
                let already = s.ended;
                if !already {
                    s.ended = true;
                    s.writable = false;
                }
                already
            };
            if !already {
                // Optional final chunk behaves like a write.
                if let Some(chunk) = args.first() {
                    let cb = state.borrow().write_callback.clone();
                    if cb.is_callable() {
                        host.call(cb, recv.clone(), vec![chunk.clone()])?;
                    }
                }
                let final_cb = state.borrow().final_callback.clone();
                if final_cb.is_callable() {
                    host.call(final_cb, recv.clone(), Vec::new())?;
                }
                state.borrow_mut().finished = true;
                let emitter = state.borrow().emitter.clone();
                events::emit(host, &emitter, recv, "finish", Vec::new())?;
            }
            Ok(recv.clone())
        }
        "destroy" => {
            let err = arg(&args, 0);
            let already = {
                let mut s = state.borrow_mut();
                let already = s.destroyed;
                s.destroyed = true;
                s.writable = false;
                already
            };
            if !already {
                let emitter = state.borrow().emitter.clone();
                if !err.is_nullish() {
                    events::emit(host, &emitter, recv, "error", vec![err])?;
                }
                events::emit(host, &emitter, recv, "close", Vec::new())?;
            }
            Ok(recv.clone())
        }
        "cork" => {
            state.borrow_mut().corked += 1;
            Ok(recv.clone())
        }
        "uncork" => {
            let flush = {
                let mut s = state.borrow_mut();
                if s.corked > 0 {
                    s.corked -= 1;
                }
                if s.corked == 0 {
                    std::mem::take(&mut s.buffered)
                } else {
                    Vec::new()
                }
            };
            let cb = state.borrow().write_callback.clone();
            for chunk in flush {
                if cb.is_callable() {
                    host.call(cb.clone(), recv.clone(), vec![chunk])?;
                }
            }
            Ok(recv.clone())
        }
        // Event registration delegates to the embedded emitter.
        "on" | "addListener" | "once" | "prependListener" | "removeListener" | "off"
        | "emit" | "listenerCount" | "listeners" | "removeAllListeners" => {
            let emitter = state.borrow().emitter.clone();
            let result = events::call_emitter_method(host, &emitter, name, args, recv)?;
            // Chainable registration returns the stream itself.
            Ok(match result {
                Value::Emitter(_) => recv.clone(),
                other => other,
            })
        }
        _ => Err(throw_type_error(format!(
            "writable method '{name}' is not supported"
        ))),
    }
}
