//! Promises and the microtask machinery.
//!
//! Settlement never runs user code synchronously: reactions are queued as
//! microtasks and drained by the cooperative driver, preserving JS ordering
//! within a tick. `Promise.resolve` of a non-promise is synchronous.

use crate::ctx::{Microtask, RuntimeCtx};
use crate::value::{PromiseState, PromiseStatus, Reaction, Ref, StateMachineObj, Value};
use crate::{throw_type_error, Host};

/// `Promise.resolve`: promises pass through, plain values fulfill a fresh
/// promise synchronously.
pub fn resolve_value(ctx: &mut RuntimeCtx, value: Value) -> Ref<PromiseState> {
    if let Value::Promise(p) = value {
        return p;
    }
    let p = PromiseState::pending();
    fulfill(ctx, &p, value);
    p
}

pub fn rejected_promise(ctx: &mut RuntimeCtx, value: Value) -> Ref<PromiseState> {
    let p = PromiseState::pending();
    reject(ctx, &p, value);
    p
}

pub fn fulfill(ctx: &mut RuntimeCtx, promise: &Ref<PromiseState>, value: Value) {
    // Resolving with a promise adopts its eventual state.
    if let Value::Promise(inner) = &value {
        let target = promise.clone();
        add_reaction(
            ctx,
            inner,
            Reaction::Then {
                on_fulfilled: None,
                on_rejected: None,
                target,
            },
        );
        return;
    }
    let reactions = {
        let mut p = promise.borrow_mut();
        if p.status != PromiseStatus::Pending {
            return;
        }
        p.status = PromiseStatus::Fulfilled;
        p.value = value.clone();
        std::mem::take(&mut p.reactions)
    };
    queue_reactions(ctx, reactions, value, false);
}

pub fn reject(ctx: &mut RuntimeCtx, promise: &Ref<PromiseState>, value: Value) {
    let reactions = {
        let mut p = promise.borrow_mut();
        if p.status != PromiseStatus::Pending {
            return;
        }
        p.status = PromiseStatus::Rejected;
        p.value = value.clone();
        std::mem::take(&mut p.reactions)
    };
    queue_reactions(ctx, reactions, value, true);
}

/// Attach a reaction, queueing immediately when already settled.
pub fn add_reaction(ctx: &mut RuntimeCtx, promise: &Ref<PromiseState>, reaction: Reaction) {
    let settled = {
        let mut p = promise.borrow_mut();
        p.handled = true;
        match p.status {
            PromiseStatus::Pending => None,
            PromiseStatus::Fulfilled => Some((p.value.clone(), false)),
            PromiseStatus::Rejected => Some((p.value.clone(), true)),
        }
    };
    match settled {
        None => promise.borrow_mut().reactions.push(reaction),
        Some((value, rejected)) => queue_reactions(ctx, vec![reaction], value, rejected),
    }
}

fn queue_reactions(ctx: &mut RuntimeCtx, reactions: Vec<Reaction>, value: Value, rejected: bool) {
    for reaction in reactions {
        match reaction {
            Reaction::Then {
                on_fulfilled,
                on_rejected,
                target,
            } => {
                let handler = if rejected { on_rejected } else { on_fulfilled };
                match handler {
                    Some(handler) => ctx.enqueue(Microtask::ReactThen {
                        handler,
                        argument: value.clone(),
                        target,
                    }),
                    // No handler for this settlement: pass through.
                    None => ctx.enqueue(Microtask::Settle {
                        promise: target,
                        value: value.clone(),
                        rejected,
                    }),
                }
            }
            Reaction::Resume(machine) => ctx.enqueue(Microtask::Resume {
                machine,
                value: value.clone(),
                rejected,
            }),
            // Collector hooks run inline; they never touch user code.
            Reaction::Native(f) => f(ctx, value.clone(), rejected),
        }
    }
}

/// `p.then(onFulfilled, onRejected)` → the chained promise.
pub fn then(
    ctx: &mut RuntimeCtx,
    promise: &Ref<PromiseState>,
    on_fulfilled: Value,
    on_rejected: Value,
) -> Value {
    let target = PromiseState::pending();
    add_reaction(
        ctx,
        promise,
        Reaction::Then {
            on_fulfilled: on_fulfilled.is_callable().then_some(on_fulfilled),
            on_rejected: on_rejected.is_callable().then_some(on_rejected),
            target: target.clone(),
        },
    );
    Value::Promise(target)
}

/// Run one queued microtask. The VM's event loop calls this.
pub fn run_microtask(host: &mut dyn Host, task: Microtask) -> Result<(), Value> {
    match task {
        Microtask::Call { callee, args } => {
            host.call(callee, Value::Undefined, args)?;
            Ok(())
        }
        Microtask::Settle {
            promise,
            value,
            rejected,
        } => {
            let ctx = host.ctx_mut();
            if rejected {
                reject(ctx, &promise, value);
            } else {
                fulfill(ctx, &promise, value);
            }
            Ok(())
        }
        Microtask::ReactThen {
            handler,
            argument,
            target,
        } => {
            match host.call(handler, Value::Undefined, vec![argument]) {
                Ok(result) => fulfill(host.ctx_mut(), &target, result),
                Err(error) => reject(host.ctx_mut(), &target, error),
            }
            Ok(())
        }
        Microtask::Resume {
            machine,
            value,
            rejected,
        } => {
            let inject = rejected.then(|| value.clone());
            let sent = if rejected { Value::Undefined } else { value };
            // Errors escaping the resume settle the machine's promise
            // inside the VM; a hard error here is a runtime bug surfaced
            // as an unhandled value.
            host.machine_resume(machine, sent, inject)?;
            Ok(())
        }
    }
}

/// Register resumption of `machine` when `promise` settles (the awaiter).
pub fn await_promise(
    ctx: &mut RuntimeCtx,
    promise: &Ref<PromiseState>,
    machine: Ref<StateMachineObj>,
) {
    add_reaction(ctx, promise, Reaction::Resume(machine));
}

/// `Promise.all`: settle with an array of results, reject on the first
/// rejection.
pub fn promise_all(host: &mut dyn Host, iterable: &Value) -> Result<Value, Value> {
    let items = crate::iter::collect_iterable(host, iterable)?;
    let ctx = host.ctx_mut();
    let target = PromiseState::pending();
    let total = items.len();
    if total == 0 {
        fulfill(ctx, &target, Value::array(Vec::new()));
        return Ok(Value::Promise(target));
    }
    // Collector state shared by per-item chains.
    let results = crate::value::make_ref(vec![Value::Undefined; total]);
    let remaining = crate::value::make_ref(total);
    for (i, item) in items.into_iter().enumerate() {
        let p = resolve_value(ctx, item);
        let results = results.clone();
        let remaining = remaining.clone();
        let target = target.clone();
        chain_native(ctx, &p, move |ctx, value, rejected| {
            if rejected {
                reject(ctx, &target, value);
                return;
            }
            results.borrow_mut()[i] = value;
            let mut left = remaining.borrow_mut();
            *left -= 1;
            if *left == 0 {
                let collected = results.borrow().clone();
                fulfill(ctx, &target, Value::array(collected));
            }
        });
    }
    Ok(Value::Promise(target))
}

/// Run `f` with the settlement of `promise`: immediately when already
/// settled, as a stored native reaction otherwise.
fn chain_native(
    ctx: &mut RuntimeCtx,
    promise: &Ref<PromiseState>,
    f: impl FnOnce(&mut RuntimeCtx, Value, bool) + 'static,
) {
    let status = promise.borrow().status.clone();
    match status {
        PromiseStatus::Fulfilled => {
            let value = promise.borrow().value.clone();
            f(ctx, value, false);
        }
        PromiseStatus::Rejected => {
            let value = promise.borrow().value.clone();
            f(ctx, value, true);
        }
        PromiseStatus::Pending => {
            promise.borrow_mut().reactions.push(Reaction::Native(Box::new(f)));
        }
    }
}

/// `Promise.race`.
pub fn promise_race(host: &mut dyn Host, iterable: &Value) -> Result<Value, Value> {
    let items = crate::iter::collect_iterable(host, iterable)?;
    let ctx = host.ctx_mut();
    let target = PromiseState::pending();
    for item in items {
        let p = resolve_value(ctx, item);
        let target = target.clone();
        chain_native(ctx, &p, move |ctx, value, rejected| {
            if rejected {
                reject(ctx, &target, value);
            } else {
                fulfill(ctx, &target, value);
            }
        });
    }
    Ok(Value::Promise(target))
}

/// Construct a promise from an executor `(resolve, reject) => …`: the
/// executor receives native callback builtins bound through a shared cell.
pub fn unhandled_rejection_message(value: &Value) -> String {
    format!(
        "Unhandled promise rejection: {}",
        crate::ops::to_display_string(value)
    )
}

/// Ensure a value is a promise (used by `await` lowering support).
pub fn coerce_to_promise(ctx: &mut RuntimeCtx, value: Value) -> Ref<PromiseState> {
    resolve_value(ctx, value)
}

/// Reject with a TypeError for non-thenable misuse.
pub fn not_thenable_error(what: &str) -> Value {
    throw_type_error(format!("{what} is not thenable"))
}
