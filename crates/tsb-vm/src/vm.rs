//! The stack VM and the cooperative driver.
//!
//! Each compiled-code call runs its own interpreter loop (Rust recursion
//! handles nesting). Exceptions unwind through per-frame protected regions;
//! suspendable functions park their environment and region stack on the
//! machine record and re-enter through the state dispatch at the top of
//! their code.

use rustc_hash::FxHashMap;
use std::rc::Rc;
use tracing::{debug, warn};
use tsb_common::Diagnostic;
use tsb_emitter::il::{Const, FuncDef, FuncKind, Op};
use tsb_emitter::Program;
use tsb_runtime::value::{
    make_ref, ClassValue, Closure, Env, JsObject, JsRegExp, MachineKind, MethodSlot,
    PromiseState, Ref, SavedTry, StateMachineObj, Value, MACHINE_DONE, MACHINE_RUNNING,
};
use tsb_runtime::{
    collections, dispatch, events, iter, object, ops, promise, registry, stream,
    throw_reference_error, throw_type_error, Host, RuntimeCtx,
};

/// One module's runtime state.
struct ModuleRt {
    /// Local binding cells, including non-exported ones.
    bindings: FxHashMap<String, Binding>,
    /// Imported name → dep export cell.
    imports: FxHashMap<String, Ref<Value>>,
    /// Export name → cell (pre-created so cycles see live bindings).
    exports: FxHashMap<String, Ref<Value>>,
    ns_object: Option<Value>,
}

struct Binding {
    cell: Ref<Value>,
    mutable: bool,
}

struct TryRegion {
    catch_ip: Option<u32>,
    finally_ip: Option<u32>,
    env: Rc<Env>,
    stack_len: usize,
}

/// Pending completion while an exception-path finally runs.
enum Pending {
    Throw(Value),
}

struct Frame<'p> {
    func: &'p FuncDef,
    ip: usize,
    stack: Vec<Value>,
    env: Rc<Env>,
    trys: Vec<TryRegion>,
    machine: Option<Ref<StateMachineObj>>,
    new_target: Option<Value>,
    pending: Option<Pending>,
}

enum Completion {
    Return(Value),
    SuspendedAwait,
    SuspendedYield,
}

pub struct Vm<'p> {
    program: &'p Program,
    helpers: Vec<registry::NativeFn>,
    ctx: RuntimeCtx,
    modules: Vec<ModuleRt>,
    globals: FxHashMap<String, Value>,
    constants: Vec<Value>,
}

/// Result of running a program to completion.
pub struct RunOutcome {
    /// The thrown value that escaped the entry point, if any.
    pub error: Option<Value>,
}

/// Load and run an artifact image with the given output streams.
pub fn run_program(
    program: &Program,
    stdout: Box<dyn std::io::Write>,
    stderr: Box<dyn std::io::Write>,
) -> Result<RunOutcome, Diagnostic> {
    let mut vm = Vm::new(program, RuntimeCtx::new(stdout, stderr))?;
    Ok(vm.run())
}

impl<'p> Vm<'p> {
    pub fn new(program: &'p Program, ctx: RuntimeCtx) -> Result<Self, Diagnostic> {
        // Bind the artifact's helper symbol table to native functions.
        let mut helpers = Vec::with_capacity(program.helper_names.len());
        for name in &program.helper_names {
            let f = registry::helper_by_name(name).ok_or_else(|| {
                Diagnostic::io(format!("artifact references unknown runtime symbol '{name}'"))
            })?;
            helpers.push(f);
        }

        let constants = program
            .constants
            .iter()
            .map(|c| match c {
                Const::Number(n) => Value::Number(*n),
                Const::Str(s) => Value::str(s),
                Const::BigInt(v) => Value::BigInt(*v),
                Const::Regex { pattern, flags } => Value::RegExp(Rc::new(JsRegExp {
                    pattern: pattern.clone(),
                    flags: flags.clone(),
                })),
            })
            .collect();

        let mut globals = FxHashMap::default();
        crate::builtins::install_globals(&mut globals);

        // Pre-create every module's export cells so cyclic importers see
        // the partially-initialized bindings.
        let mut modules = Vec::with_capacity(program.modules.len());
        for image in &program.modules {
            let mut bindings = FxHashMap::default();
            let mut exports = FxHashMap::default();
            for (export_name, local) in &image.exports {
                let cell = make_ref(Value::Uninitialized);
                bindings.insert(
                    local.clone(),
                    Binding {
                        cell: cell.clone(),
                        mutable: true,
                    },
                );
                exports.insert(export_name.clone(), cell);
            }
            modules.push(ModuleRt {
                bindings,
                imports: FxHashMap::default(),
                exports,
                ns_object: None,
            });
        }

        Ok(Vm {
            program,
            helpers,
            ctx,
            modules,
            globals,
            constants,
        })
    }

    /// Run every module in evaluation order, then drive the event loop
    /// until the microtask queue and the live timer set are both empty.
    pub fn run(&mut self) -> RunOutcome {
        debug!(modules = self.program.modules.len(), "starting program");
        if let Err(e) = self.wire_imports() {
            return RunOutcome { error: Some(e) };
        }
        for index in 0..self.program.modules.len() {
            let init = self.program.modules[index].init;
            let env = Env::new(
                self.program.functions[init as usize].scope_slots as usize,
                None,
            );
            if let Err(e) = self.run_function(init, env, None, None) {
                return RunOutcome { error: Some(e) };
            }
            if let Err(e) = self.drain_microtasks() {
                return RunOutcome { error: Some(e) };
            }
        }
        // The cooperative loop: drain microtasks, then advance the virtual
        // clock to the next live timer. Exit when nothing remains.
        loop {
            if let Err(e) = self.drain_microtasks() {
                return RunOutcome { error: Some(e) };
            }
            let Some(next) = self.ctx.timers.next_time() else {
                break;
            };
            if next > self.ctx.clock_ms {
                self.ctx.clock_ms = next;
            }
            let due = self.ctx.timers.take_due(self.ctx.clock_ms);
            for (cb, args) in due {
                if let Err(e) = self.call(cb, Value::Undefined, args) {
                    return RunOutcome { error: Some(e) };
                }
                if let Err(e) = self.drain_microtasks() {
                    return RunOutcome { error: Some(e) };
                }
            }
        }
        RunOutcome { error: None }
    }

    fn drain_microtasks(&mut self) -> Result<(), Value> {
        while let Some(task) = self.ctx.microtasks.pop_front() {
            promise::run_microtask(self, task)?;
        }
        Ok(())
    }

    /// Bind import cells and re-export cells across modules.
    fn wire_imports(&mut self) -> Result<(), Value> {
        let program = self.program;
        for index in 0..program.modules.len() {
            let image = &program.modules[index];
            let mut imports: FxHashMap<String, Ref<Value>> = FxHashMap::default();
            let mut ns_imports: Vec<(String, Value)> = Vec::new();
            for import in &image.imports {
                if import.dep_path.is_empty() {
                    // Builtin module.
                    let table = crate::builtins::builtin_module_exports(&import.specifier);
                    for (name, alias) in &import.named {
                        let local = alias.as_ref().unwrap_or(name);
                        let value = table
                            .iter()
                            .find(|(n, _)| n == name)
                            .map(|(_, v)| v.clone())
                            .ok_or_else(|| {
                                throw_type_error(format!(
                                    "module '{}' has no export '{name}'",
                                    import.specifier
                                ))
                            })?;
                        imports.insert(local.clone(), make_ref(value));
                    }
                    if let Some(ns) = &import.namespace {
                        let mut obj = JsObject::plain();
                        for (name, value) in &table {
                            obj.props.insert(name.clone(), value.clone());
                        }
                        ns_imports.push((ns.clone(), Value::object(obj)));
                    }
                    continue;
                }
                let dep_index = program
                    .modules
                    .iter()
                    .position(|m| m.path == import.dep_path)
                    .ok_or_else(|| {
                        throw_type_error(format!("unresolved module '{}'", import.specifier))
                    })?;
                for (name, alias) in &import.named {
                    let local = alias.as_ref().unwrap_or(name);
                    let cell = self.modules[dep_index]
                        .exports
                        .get(name)
                        .cloned()
                        .ok_or_else(|| {
                            throw_type_error(format!(
                                "module '{}' has no export '{name}'",
                                import.specifier
                            ))
                        })?;
                    imports.insert(local.clone(), cell);
                }
                if let Some(default) = &import.default {
                    let cell = self.modules[dep_index]
                        .exports
                        .get("default")
                        .cloned()
                        .ok_or_else(|| {
                            throw_type_error(format!(
                                "module '{}' has no default export",
                                import.specifier
                            ))
                        })?;
                    imports.insert(default.clone(), cell);
                }
                if let Some(ns) = &import.namespace {
                    let value = self.namespace_object(dep_index);
                    ns_imports.push((ns.clone(), value));
                }
            }
            // Re-exports share the dependency's cells.
            for (exported, dep_path, source) in &image.reexports {
                let dep_index = program
                    .modules
                    .iter()
                    .position(|m| m.path == *dep_path)
                    .ok_or_else(|| {
                        throw_type_error(format!("unresolved re-export from '{dep_path}'"))
                    })?;
                let cell = self.modules[dep_index]
                    .exports
                    .get(source)
                    .cloned()
                    .ok_or_else(|| {
                        throw_type_error(format!("module '{dep_path}' has no export '{source}'"))
                    })?;
                self.modules[index].exports.insert(exported.clone(), cell);
            }
            let module = &mut self.modules[index];
            module.imports = imports;
            for (name, value) in ns_imports {
                module.imports.insert(name, make_ref(value));
            }
        }
        Ok(())
    }

    /// The namespace object of a module: a snapshot of its export cells.
    fn namespace_object(&mut self, index: usize) -> Value {
        if let Some(obj) = &self.modules[index].ns_object {
            return obj.clone();
        }
        let mut obj = JsObject::plain();
        for (name, cell) in &self.modules[index].exports {
            let v = cell.borrow().clone();
            obj.props.insert(
                name.clone(),
                if matches!(v, Value::Uninitialized) {
                    Value::Undefined
                } else {
                    v
                },
            );
        }
        let value = Value::object(obj);
        self.modules[index].ns_object = Some(value.clone());
        value
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn bind_params(&self, func: &FuncDef, env: &Rc<Env>, args: &[Value]) {
        let n = func.n_params as usize;
        for i in 0..n {
            let value = if func.has_rest && i == n - 1 {
                Value::array(args.get(i..).map(|s| s.to_vec()).unwrap_or_default())
            } else {
                args.get(i).cloned().unwrap_or(Value::Undefined)
            };
            env.set(i as u16, value);
        }
    }

    /// Invoke a closure value.
    fn call_closure(
        &mut self,
        closure: &Closure,
        this: Value,
        args: Vec<Value>,
        new_target: Option<Value>,
    ) -> Result<Value, Value> {
        let program = self.program;
        let func = &program.functions[closure.func as usize];
        let effective_this = closure.bound_this.clone().unwrap_or(this);
        let parent = if func.binds_this {
            let this_env = Env::new(1, Some(closure.env.clone()));
            this_env.set(0, effective_this);
            this_env
        } else {
            closure.env.clone()
        };
        let env = Env::new(func.scope_slots as usize, Some(parent));
        self.bind_params(func, &env, &args);

        match func.kind {
            FuncKind::Normal => {
                match self.run_function(closure.func, env, None, new_target)? {
                    Completion::Return(v) => Ok(v),
                    _ => Err(throw_type_error("unexpected suspension in normal function")),
                }
            }
            FuncKind::Async => {
                let machine = make_ref(StateMachineObj {
                    func: closure.func,
                    env,
                    kind: MachineKind::Async,
                    state: 0,
                    done: false,
                    sent: Value::Undefined,
                    injected_error: None,
                    yielded: Value::Undefined,
                    promise: Some(PromiseState::pending()),
                    pending_next: None,
                    saved_trys: Vec::new(),
                    result: Value::Undefined,
                });
                let p = machine.borrow().promise.clone().expect("async promise");
                // The body runs synchronously up to the first await.
                self.machine_resume(machine, Value::Undefined, None)?;
                Ok(Value::Promise(p))
            }
            FuncKind::Generator | FuncKind::AsyncGenerator => {
                let kind = if func.kind == FuncKind::Generator {
                    MachineKind::Generator
                } else {
                    MachineKind::AsyncGenerator
                };
                Ok(Value::Machine(make_ref(StateMachineObj {
                    func: closure.func,
                    env,
                    kind,
                    state: 0,
                    done: false,
                    sent: Value::Undefined,
                    injected_error: None,
                    yielded: Value::Undefined,
                    promise: None,
                    pending_next: None,
                    saved_trys: Vec::new(),
                    result: Value::Undefined,
                })))
            }
        }
    }

    fn construct_value(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, Value> {
        match &callee {
            Value::Class(class) => {
                let instance = Value::object(JsObject::instance_of(class.clone()));
                // Field initializers run base-first.
                let mut chain = Vec::new();
                let mut current = Some(class.clone());
                while let Some(c) = current {
                    chain.push(c.clone());
                    current = c.superclass.clone();
                }
                for c in chain.iter().rev() {
                    if let Some(init) = c.field_init {
                        let closure = Closure {
                            func: init,
                            env: c.env.clone(),
                            bound_this: Some(instance.clone()),
                            name: "<fields>".to_string(),
                        };
                        self.call_closure(&closure, instance.clone(), Vec::new(), None)?;
                    }
                }
                // The most-derived constructor; super() dispatches upward.
                let ctor = chain.iter().find_map(|c| c.ctor.map(|f| (f, c.clone())));
                if let Some((ctor_fn, owner)) = ctor {
                    let closure = Closure {
                        func: ctor_fn,
                        env: owner.env.clone(),
                        bound_this: Some(instance.clone()),
                        name: "constructor".to_string(),
                    };
                    self.call_closure(
                        &closure,
                        instance.clone(),
                        args,
                        Some(callee.clone()),
                    )?;
                }
                Ok(instance)
            }
            Value::Object(obj) => {
                let marker = obj.borrow().props.get("__native_ctor").cloned();
                let Some(marker) = marker else {
                    return Err(throw_type_error("value is not a constructor"));
                };
                let name = ops::to_display_string(&marker);
                self.construct_native(&name, args)
            }
            _ => Err(throw_type_error("value is not a constructor")),
        }
    }

    fn construct_native(&mut self, name: &str, args: Vec<Value>) -> Result<Value, Value> {
        match name {
            "Map" | "WeakMap" => collections::construct_map(self, args),
            "Set" | "WeakSet" => collections::construct_set(self, args),
            "Array" => Ok(Value::array(args)),
            "Date" => Ok(Value::Date(match args.first() {
                Some(v) => ops::to_number(v),
                None => self.ctx.now_ms(),
            })),
            "EventEmitter" => Ok(events::new_emitter()),
            "Writable" => Ok(stream::new_writable()),
            "Promise" => {
                let executor = args.into_iter().next().unwrap_or(Value::Undefined);
                let p = PromiseState::pending();
                let resolve = settle_callback(&p, false);
                let reject = settle_callback(&p, true);
                if executor.is_callable() {
                    if let Err(e) = self.call(executor, Value::Undefined, vec![resolve, reject])
                    {
                        promise::reject(&mut self.ctx, &p, e);
                    }
                }
                Ok(Value::Promise(p))
            }
            "Error" | "TypeError" | "RangeError" | "SyntaxError" => {
                let message = match args.first() {
                    Some(v) => ops::to_display_string(v),
                    None => String::new(),
                };
                Ok(tsb_runtime::value::error_value(name, message))
            }
            other => Err(throw_type_error(format!("cannot construct '{other}'"))),
        }
    }

    // =========================================================================
    // The interpreter loop
    // =========================================================================

    fn run_function(
        &mut self,
        func_idx: u32,
        env: Rc<Env>,
        machine: Option<Ref<StateMachineObj>>,
        new_target: Option<Value>,
    ) -> Result<Completion, Value> {
        let program = self.program;
        let func = &program.functions[func_idx as usize];
        let mut frame = Frame {
            func,
            ip: 0,
            stack: Vec::with_capacity(8),
            env,
            trys: Vec::new(),
            machine,
            new_target,
            pending: None,
        };
        // Resuming machines restore their protected regions.
        if let Some(m) = &frame.machine {
            let saved = std::mem::take(&mut m.borrow_mut().saved_trys);
            frame.trys = saved
                .into_iter()
                .map(|s| TryRegion {
                    catch_ip: s.catch_ip,
                    finally_ip: s.finally_ip,
                    env: s.env,
                    stack_len: s.stack_len,
                })
                .collect();
        }
        self.exec(&mut frame)
    }

    fn exec(&mut self, frame: &mut Frame<'p>) -> Result<Completion, Value> {
        loop {
            let result = self.step(frame);
            match result {
                Ok(Some(completion)) => return Ok(completion),
                Ok(None) => {}
                Err(error) => {
                    // Unwind to the innermost protected region.
                    match frame.trys.pop() {
                        None => return Err(error),
                        Some(region) => {
                            frame.stack.truncate(region.stack_len);
                            frame.env = region.env;
                            if let Some(catch_ip) = region.catch_ip {
                                frame.stack.push(error);
                                frame.ip = catch_ip as usize;
                            } else if let Some(finally_ip) = region.finally_ip {
                                frame.pending = Some(Pending::Throw(error));
                                frame.ip = finally_ip as usize;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Execute one instruction. `Ok(Some(_))` ends the call.
    fn step(&mut self, frame: &mut Frame<'p>) -> Result<Option<Completion>, Value> {
        let op = frame.func.code[frame.ip].clone();
        frame.ip += 1;
        match op {
            Op::Const(idx) => frame.stack.push(self.constants[idx as usize].clone()),
            Op::Undefined => frame.stack.push(Value::Undefined),
            Op::Null => frame.stack.push(Value::Null),
            Op::True => frame.stack.push(Value::Bool(true)),
            Op::False => frame.stack.push(Value::Bool(false)),
            Op::Dup => {
                let top = frame.stack.last().expect("stack underflow").clone();
                frame.stack.push(top);
            }
            Op::Pop => {
                frame.stack.pop();
            }
            Op::Swap => {
                let len = frame.stack.len();
                frame.stack.swap(len - 1, len - 2);
            }

            Op::PushScope(slots) => {
                frame.env = Env::new(slots as usize, Some(frame.env.clone()));
            }
            Op::PopScope => {
                let parent = frame.env.parent.clone().expect("scope to pop");
                frame.env = parent;
            }
            Op::LoadVar { depth, slot } => {
                let value = frame.env.ancestor(depth).get(slot);
                if matches!(value, Value::Uninitialized) {
                    return Err(throw_reference_error(
                        "cannot access binding before initialization",
                    ));
                }
                frame.stack.push(value);
            }
            Op::StoreVar { depth, slot } => {
                let value = frame.stack.pop().expect("value to store");
                frame.env.ancestor(depth).set(slot, value);
            }
            Op::LoadGlobal(idx) => {
                let name = self.const_str(idx);
                let value = self.load_global(frame.func.module, &name)?;
                frame.stack.push(value);
            }
            Op::LoadGlobalSoft(idx) => {
                let name = self.const_str(idx);
                let value = self
                    .load_global(frame.func.module, &name)
                    .unwrap_or(Value::Undefined);
                frame.stack.push(value);
            }
            Op::StoreGlobal(idx) => {
                let name = self.const_str(idx);
                let value = frame.stack.pop().expect("value to store");
                self.store_global(frame.func.module, &name, value)?;
            }
            Op::DefineGlobal { name, mutable } => {
                let name = self.const_str(name);
                let value = frame.stack.pop().expect("value to define");
                let module = &mut self.modules[frame.func.module as usize];
                match module.bindings.get_mut(&name) {
                    // Export cells are pre-created; definition fills them in
                    // and settles their mutability.
                    Some(binding) => {
                        *binding.cell.borrow_mut() = value;
                        binding.mutable = mutable;
                    }
                    None => {
                        module.bindings.insert(
                            name,
                            Binding {
                                cell: make_ref(value),
                                mutable,
                            },
                        );
                    }
                }
            }

            Op::MakeClosure { func } => {
                let name = self.program.functions[func as usize].name.clone();
                frame.stack.push(Value::Function(Rc::new(Closure {
                    func,
                    env: frame.env.clone(),
                    bound_this: None,
                    name,
                })));
            }
            Op::Call { argc } => {
                let args = pop_n(&mut frame.stack, argc as usize);
                let callee = frame.stack.pop().expect("callee");
                let result = self.call(callee, Value::Undefined, args)?;
                frame.stack.push(result);
            }
            Op::CallMethod { name, argc } => {
                let args = pop_n(&mut frame.stack, argc as usize);
                let recv = frame.stack.pop().expect("receiver");
                let name = self.const_str(name);
                let result = dispatch::call_method(self, &recv, &name, args)?;
                frame.stack.push(result);
            }
            Op::CallRuntime { helper, argc } => {
                let args = pop_n(&mut frame.stack, argc as usize);
                let f = self.helpers[helper as usize];
                let result = f(self, args)?;
                frame.stack.push(result);
            }
            Op::New { argc } => {
                let args = pop_n(&mut frame.stack, argc as usize);
                let callee = frame.stack.pop().expect("constructor");
                let result = self.construct_value(callee, args)?;
                frame.stack.push(result);
            }
            Op::Return => {
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                return Ok(Some(Completion::Return(value)));
            }
            Op::ReturnUndefined => {
                return Ok(Some(Completion::Return(Value::Undefined)));
            }

            Op::Jump(t) => frame.ip = t as usize,
            Op::JumpIfFalse(t) => {
                let v = frame.stack.pop().expect("condition");
                if !ops::is_truthy(&v) {
                    frame.ip = t as usize;
                }
            }
            Op::JumpIfTrue(t) => {
                let v = frame.stack.pop().expect("condition");
                if ops::is_truthy(&v) {
                    frame.ip = t as usize;
                }
            }
            Op::JumpIfNullish(t) => {
                let v = frame.stack.pop().expect("condition");
                if v.is_nullish() {
                    frame.ip = t as usize;
                }
            }
            Op::JumpIfNotNullish(t) => {
                let v = frame.stack.pop().expect("condition");
                if !v.is_nullish() {
                    frame.ip = t as usize;
                }
            }
            Op::Switch(table) => {
                let v = frame.stack.pop().expect("switch value");
                let idx = ops::to_number(&v) as i64;
                if idx >= 0 {
                    if let Some(&target) = table.get(idx as usize) {
                        if target != u32::MAX {
                            frame.ip = target as usize;
                        }
                    }
                }
            }

            Op::EnterTryCatch { catch } => frame.trys.push(TryRegion {
                catch_ip: Some(catch),
                finally_ip: None,
                env: frame.env.clone(),
                stack_len: frame.stack.len(),
            }),
            Op::EnterTryFinally { finally } => frame.trys.push(TryRegion {
                catch_ip: None,
                finally_ip: Some(finally),
                env: frame.env.clone(),
                stack_len: frame.stack.len(),
            }),
            Op::PopTry => {
                frame.trys.pop();
            }
            Op::Throw => {
                let value = frame.stack.pop().expect("thrown value");
                return Err(value);
            }
            Op::EndFinally => {
                if let Some(Pending::Throw(value)) = frame.pending.take() {
                    return Err(value);
                }
            }

            Op::NumAdd => {
                let b = frame.stack.pop().expect("rhs");
                let a = frame.stack.pop().expect("lhs");
                frame
                    .stack
                    .push(Value::Number(ops::to_number(&a) + ops::to_number(&b)));
            }
            Op::Sub => self.numeric_binary(frame, "-")?,
            Op::Mul => self.numeric_binary(frame, "*")?,
            Op::Div => self.numeric_binary(frame, "/")?,
            Op::Mod => self.numeric_binary(frame, "%")?,
            Op::Pow => self.numeric_binary(frame, "**")?,
            Op::BitAnd => self.int_binary(frame, "&")?,
            Op::BitOr => self.int_binary(frame, "|")?,
            Op::BitXor => self.int_binary(frame, "^")?,
            Op::Shl => self.int_binary(frame, "<<")?,
            Op::Shr => self.int_binary(frame, ">>")?,
            Op::Neg => {
                let v = frame.stack.pop().expect("operand");
                frame.stack.push(match v {
                    Value::BigInt(n) => Value::BigInt(-n),
                    other => Value::Number(-ops::to_number(&other)),
                });
            }
            Op::ToNum => {
                let v = frame.stack.pop().expect("operand");
                frame.stack.push(match v {
                    b @ Value::BigInt(_) => b,
                    other => Value::Number(ops::to_number(&other)),
                });
            }
            Op::Not => {
                let v = frame.stack.pop().expect("operand");
                frame.stack.push(Value::Bool(!ops::is_truthy(&v)));
            }
            Op::BitNot => {
                let v = frame.stack.pop().expect("operand");
                frame.stack.push(match v {
                    Value::BigInt(n) => Value::BigInt(!n),
                    other => Value::Number(!ops::to_int32(&other) as f64),
                });
            }
            Op::TypeofOp => {
                let v = frame.stack.pop().expect("operand");
                frame.stack.push(Value::str(ops::type_of(&v)));
            }
            Op::StrictEq => {
                let b = frame.stack.pop().expect("rhs");
                let a = frame.stack.pop().expect("lhs");
                frame.stack.push(Value::Bool(ops::strict_equals(&a, &b)));
            }
            Op::StrictNeq => {
                let b = frame.stack.pop().expect("rhs");
                let a = frame.stack.pop().expect("lhs");
                frame.stack.push(Value::Bool(!ops::strict_equals(&a, &b)));
            }
            Op::Less => self.compare_op(frame, |o| o == std::cmp::Ordering::Less)?,
            Op::LessEq => self.compare_op(frame, |o| o != std::cmp::Ordering::Greater)?,
            Op::Greater => self.compare_op(frame, |o| o == std::cmp::Ordering::Greater)?,
            Op::GreaterEq => self.compare_op(frame, |o| o != std::cmp::Ordering::Less)?,
            Op::InstanceofOp => {
                let class = frame.stack.pop().expect("class");
                let value = frame.stack.pop().expect("value");
                frame
                    .stack
                    .push(Value::Bool(ops::instance_of(&value, &class)?));
            }
            Op::HasPropOp => {
                let obj = frame.stack.pop().expect("object");
                let key = frame.stack.pop().expect("key");
                frame.stack.push(Value::Bool(has_property(&obj, &key)));
            }

            Op::MakeArray(n) => {
                let items = pop_n(&mut frame.stack, n as usize);
                frame.stack.push(Value::array(items));
            }
            Op::MakeObject => frame.stack.push(Value::object(JsObject::plain())),
            Op::SetPropKeep(name) => {
                let value = frame.stack.pop().expect("value");
                let name = self.const_str(name);
                if let Some(Value::Object(obj)) = frame.stack.last() {
                    obj.borrow_mut().props.insert(name, value);
                }
            }
            Op::SetIndexKeep => {
                let value = frame.stack.pop().expect("value");
                let key = frame.stack.pop().expect("key");
                if let Some(Value::Object(obj)) = frame.stack.last() {
                    obj.borrow_mut()
                        .props
                        .insert(object::property_key(&key), value);
                }
            }
            Op::ArrayPush => {
                let value = frame.stack.pop().expect("element");
                if let Some(Value::Array(items)) = frame.stack.last() {
                    items.borrow_mut().push(value);
                }
            }
            Op::GetProp(name) | Op::GetPropDirect(name) => {
                let recv = frame.stack.pop().expect("receiver");
                let name = self.const_str(name);
                let value = object::get_property(self, &recv, &name)?;
                frame.stack.push(value);
            }
            Op::SetProp(name) | Op::SetPropDirect(name) => {
                let value = frame.stack.pop().expect("value");
                let recv = frame.stack.pop().expect("receiver");
                let name = self.const_str(name);
                object::set_property(self, &recv, &name, value.clone())?;
                frame.stack.push(value);
            }
            Op::GetIndexOp => {
                let index = frame.stack.pop().expect("index");
                let recv = frame.stack.pop().expect("receiver");
                let value = object::get_index(self, &recv, &index)?;
                frame.stack.push(value);
            }
            Op::SetIndexOp => {
                let value = frame.stack.pop().expect("value");
                let index = frame.stack.pop().expect("index");
                let recv = frame.stack.pop().expect("receiver");
                object::set_index(self, &recv, &index, value.clone())?;
                frame.stack.push(value);
            }
            Op::GetPrivate(name) => {
                let recv = frame.stack.pop().expect("receiver");
                let name = self.const_str(name);
                let value = self.get_private(&recv, &name)?;
                frame.stack.push(value);
            }
            Op::SetPrivate(name) => {
                let value = frame.stack.pop().expect("value");
                let recv = frame.stack.pop().expect("receiver");
                let name = self.const_str(name);
                match &recv {
                    Value::Object(obj) => {
                        obj.borrow_mut().props.insert(name, value.clone());
                    }
                    _ => {
                        return Err(throw_type_error(
                            "cannot set a private field on a non-object",
                        ));
                    }
                }
                frame.stack.push(value);
            }
            Op::DeleteProp(name) => {
                let recv = frame.stack.pop().expect("receiver");
                let name = self.const_str(name);
                let deleted = match &recv {
                    Value::Object(obj) => obj.borrow_mut().props.shift_remove(&name).is_some(),
                    _ => false,
                };
                frame.stack.push(Value::Bool(deleted));
            }
            Op::DeleteIndex => {
                let index = frame.stack.pop().expect("index");
                let recv = frame.stack.pop().expect("receiver");
                let deleted = match &recv {
                    Value::Object(obj) => obj
                        .borrow_mut()
                        .props
                        .shift_remove(&object::property_key(&index))
                        .is_some(),
                    Value::Array(items) => {
                        let i = ops::to_integer_or_infinity(&index);
                        let mut items = items.borrow_mut();
                        if i >= 0 && (i as usize) < items.len() {
                            items[i as usize] = Value::Undefined;
                            true
                        } else {
                            false
                        }
                    }
                    _ => false,
                };
                frame.stack.push(Value::Bool(deleted));
            }
            Op::Freeze => {
                let v = frame.stack.pop().expect("object");
                frame.stack.push(object::freeze(&v));
            }

            Op::MakeClass(idx) => {
                let program = self.program;
                let def = &program.classes[idx as usize];
                let superclass = if def.has_super {
                    match frame.stack.pop().expect("superclass") {
                        Value::Class(c) => Some(c),
                        other => {
                            return Err(throw_type_error(format!(
                                "cannot extend {}; only user-defined classes can be extended",
                                ops::to_display_string(&other)
                            )));
                        }
                    }
                } else {
                    None
                };
                let class_env = match &superclass {
                    Some(sup) => {
                        let e = Env::new(1, Some(frame.env.clone()));
                        e.set(0, Value::Class(sup.clone()));
                        e
                    }
                    None => frame.env.clone(),
                };
                let to_slots = |list: &[(String, u32)]| {
                    list.iter()
                        .map(|(n, f)| {
                            (
                                n.clone(),
                                MethodSlot {
                                    func: *f,
                                    is_static: false,
                                },
                            )
                        })
                        .collect::<FxHashMap<_, _>>()
                };
                let class = Rc::new(ClassValue {
                    name: def.name.clone(),
                    superclass,
                    env: class_env.clone(),
                    ctor: def.ctor,
                    field_init: def.field_init,
                    methods: to_slots(&def.methods),
                    getters: to_slots(&def.getters),
                    setters: to_slots(&def.setters),
                    statics: std::cell::RefCell::new(FxHashMap::default()),
                });
                // Static methods become closures over the class env.
                for (name, func) in &def.static_methods {
                    class.statics.borrow_mut().insert(
                        name.clone(),
                        Value::Function(Rc::new(Closure {
                            func: *func,
                            env: class_env.clone(),
                            bound_this: None,
                            name: name.clone(),
                        })),
                    );
                }
                let class_value = Value::Class(class.clone());
                if let Some(static_init) = def.static_init {
                    let closure = Closure {
                        func: static_init,
                        env: class_env,
                        bound_this: Some(class_value.clone()),
                        name: "<static fields>".to_string(),
                    };
                    self.call_closure(&closure, class_value.clone(), Vec::new(), None)?;
                }
                frame.stack.push(class_value);
            }
            Op::CallSuperCtor { argc } => {
                let args = pop_n(&mut frame.stack, argc as usize);
                let superclass = frame.stack.pop().expect("superclass");
                let this = frame.stack.pop().expect("this");
                let Value::Class(superclass) = superclass else {
                    return Err(throw_type_error("'super' is not a class"));
                };
                // First constructor up the chain.
                let mut current = Some(superclass);
                let ctor = loop {
                    match current {
                        None => break None,
                        Some(c) => {
                            if let Some(f) = c.ctor {
                                break Some((f, c));
                            }
                            current = c.superclass.clone();
                        }
                    }
                };
                if let Some((ctor_fn, owner)) = ctor {
                    let closure = Closure {
                        func: ctor_fn,
                        env: owner.env.clone(),
                        bound_this: Some(this.clone()),
                        name: "constructor".to_string(),
                    };
                    self.call_closure(&closure, this, args, None)?;
                }
                frame.stack.push(Value::Undefined);
            }
            Op::CallSuperMethod { name, argc } => {
                let args = pop_n(&mut frame.stack, argc as usize);
                let superclass = frame.stack.pop().expect("superclass");
                let this = frame.stack.pop().expect("this");
                let name = self.const_str(name);
                let Value::Class(superclass) = superclass else {
                    return Err(throw_type_error("'super' is not a class"));
                };
                let method = find_method_closure(&superclass, &name, Some(this.clone()))
                    .ok_or_else(|| {
                        throw_type_error(format!("super.{name} is not a function"))
                    })?;
                let result = self.call(method, this, args)?;
                frame.stack.push(result);
            }
            Op::GetSuperProp(name) => {
                let superclass = frame.stack.pop().expect("superclass");
                let this = frame.stack.pop().expect("this");
                let name = self.const_str(name);
                let Value::Class(superclass) = superclass else {
                    return Err(throw_type_error("'super' is not a class"));
                };
                if let Some((slot, owner_env)) = find_getter_slot(&superclass, &name) {
                    let getter = Value::Function(Rc::new(Closure {
                        func: slot,
                        env: owner_env,
                        bound_this: Some(this.clone()),
                        name,
                    }));
                    let result = self.call(getter, this, Vec::new())?;
                    frame.stack.push(result);
                } else if let Some(method) =
                    find_method_closure(&superclass, &name, Some(this.clone()))
                {
                    frame.stack.push(method);
                } else {
                    frame.stack.push(Value::Undefined);
                }
            }
            Op::LoadNewTarget => {
                frame
                    .stack
                    .push(frame.new_target.clone().unwrap_or(Value::Undefined));
            }

            Op::SetState(state) => {
                if let Some(m) = &frame.machine {
                    m.borrow_mut().state = state as i32;
                }
            }
            Op::SuspendAwait => {
                let awaited = frame.stack.pop().expect("awaited value");
                let machine = frame
                    .machine
                    .clone()
                    .expect("await outside a state machine");
                self.save_machine_frame(&machine, frame);
                let p = promise::resolve_value(&mut self.ctx, awaited);
                promise::await_promise(&mut self.ctx, &p, machine);
                return Ok(Some(Completion::SuspendedAwait));
            }
            Op::SuspendYield => {
                let yielded = frame.stack.pop().expect("yielded value");
                let machine = frame
                    .machine
                    .clone()
                    .expect("yield outside a state machine");
                machine.borrow_mut().yielded = yielded;
                self.save_machine_frame(&machine, frame);
                return Ok(Some(Completion::SuspendedYield));
            }
            Op::ResumeValue => {
                let machine = frame.machine.clone().expect("resume in a state machine");
                let injected = machine.borrow_mut().injected_error.take();
                if let Some(error) = injected {
                    return Err(error);
                }
                let sent = std::mem::replace(&mut machine.borrow_mut().sent, Value::Undefined);
                frame.stack.push(sent);
            }
            Op::LoadState => {
                let state = frame
                    .machine
                    .as_ref()
                    .map(|m| m.borrow().state)
                    .unwrap_or(0);
                frame.stack.push(Value::Number(state as f64));
            }

            Op::GetIter => {
                let v = frame.stack.pop().expect("iterable");
                let it = iter::get_iterator(self, &v)?;
                frame.stack.push(it);
            }
            Op::IterNext => {
                let it = frame.stack.pop().expect("iterator");
                let (value, done) = iter::iterator_next(self, &it)?;
                frame.stack.push(value);
                frame.stack.push(Value::Bool(done));
            }
        }
        Ok(None)
    }

    fn save_machine_frame(&mut self, machine: &Ref<StateMachineObj>, frame: &Frame<'p>) {
        let mut m = machine.borrow_mut();
        m.env = frame.env.clone();
        m.saved_trys = frame
            .trys
            .iter()
            .map(|r| SavedTry {
                catch_ip: r.catch_ip,
                finally_ip: r.finally_ip,
                env: r.env.clone(),
                stack_len: r.stack_len,
            })
            .collect();
    }

    fn numeric_binary(&mut self, frame: &mut Frame<'p>, op: &str) -> Result<(), Value> {
        let b = frame.stack.pop().expect("rhs");
        let a = frame.stack.pop().expect("lhs");
        let result = match (&a, &b) {
            (Value::BigInt(x), Value::BigInt(y)) => ops::bigint_binary(op, *x, *y)?,
            _ => {
                let (x, y) = (ops::to_number(&a), ops::to_number(&b));
                Value::Number(match op {
                    "-" => x - y,
                    "*" => x * y,
                    "/" => x / y,
                    "%" => x % y,
                    "**" => x.powf(y),
                    _ => unreachable!("numeric operator"),
                })
            }
        };
        frame.stack.push(result);
        Ok(())
    }

    fn int_binary(&mut self, frame: &mut Frame<'p>, op: &str) -> Result<(), Value> {
        let b = frame.stack.pop().expect("rhs");
        let a = frame.stack.pop().expect("lhs");
        let result = match (&a, &b) {
            (Value::BigInt(x), Value::BigInt(y)) => ops::bigint_binary(op, *x, *y)?,
            _ => {
                let x = ops::to_int32(&a);
                let shift = ops::to_uint32(&b) & 31;
                Value::Number(match op {
                    "&" => (x & ops::to_int32(&b)) as f64,
                    "|" => (x | ops::to_int32(&b)) as f64,
                    "^" => (x ^ ops::to_int32(&b)) as f64,
                    "<<" => (x << shift) as f64,
                    ">>" => (x >> shift) as f64,
                    _ => unreachable!("integer operator"),
                })
            }
        };
        frame.stack.push(result);
        Ok(())
    }

    fn compare_op(
        &mut self,
        frame: &mut Frame<'p>,
        accept: fn(std::cmp::Ordering) -> bool,
    ) -> Result<(), Value> {
        let b = frame.stack.pop().expect("rhs");
        let a = frame.stack.pop().expect("lhs");
        let result = match ops::compare(&a, &b) {
            Some(ordering) => accept(ordering),
            None => false, // NaN comparisons
        };
        frame.stack.push(Value::Bool(result));
        Ok(())
    }

    fn const_str(&self, idx: u32) -> String {
        match &self.program.constants[idx as usize] {
            Const::Str(s) => s.clone(),
            other => ops::to_display_string(&match other {
                Const::Number(n) => Value::Number(*n),
                Const::BigInt(v) => Value::BigInt(*v),
                _ => Value::Undefined,
            }),
        }
    }

    fn load_global(&mut self, module: u32, name: &str) -> Result<Value, Value> {
        let rt = &self.modules[module as usize];
        if let Some(binding) = rt.bindings.get(name) {
            let v = binding.cell.borrow().clone();
            if matches!(v, Value::Uninitialized) {
                return Err(throw_reference_error(format!(
                    "cannot access '{name}' before initialization"
                )));
            }
            return Ok(v);
        }
        if let Some(cell) = rt.imports.get(name) {
            let v = cell.borrow().clone();
            if matches!(v, Value::Uninitialized) {
                return Err(throw_reference_error(format!(
                    "cannot access '{name}' before initialization"
                )));
            }
            return Ok(v);
        }
        if let Some(v) = self.globals.get(name) {
            return Ok(v.clone());
        }
        Err(throw_reference_error(format!("{name} is not defined")))
    }

    fn store_global(&mut self, module: u32, name: &str, value: Value) -> Result<(), Value> {
        let rt = &self.modules[module as usize];
        match rt.bindings.get(name) {
            Some(binding) if binding.mutable => {
                *binding.cell.borrow_mut() = value;
                Ok(())
            }
            Some(_) => Err(throw_type_error(format!(
                "assignment to constant variable '{name}'"
            ))),
            None if rt.imports.contains_key(name) => Err(throw_type_error(format!(
                "cannot assign to imported binding '{name}'"
            ))),
            None => Err(throw_reference_error(format!("{name} is not defined"))),
        }
    }

    fn get_private(&mut self, recv: &Value, name: &str) -> Result<Value, Value> {
        match recv {
            Value::Object(obj) => {
                let found = {
                    let o = obj.borrow();
                    match o.props.get(name) {
                        Some(v) => Some(v.clone()),
                        None => o.class.clone().and_then(|class| {
                            find_method_closure(&class, name, Some(recv.clone()))
                        }),
                    }
                };
                found.ok_or_else(|| {
                    throw_type_error(format!(
                        "private member '{name}' is not present on this object"
                    ))
                })
            }
            _ => Err(throw_type_error(
                "cannot read a private field of a non-object",
            )),
        }
    }
}

fn pop_n(stack: &mut Vec<Value>, n: usize) -> Vec<Value> {
    stack.split_off(stack.len() - n)
}

fn has_property(obj: &Value, key: &Value) -> bool {
    let name = object::property_key(key);
    match obj {
        Value::Object(o) => {
            let o = o.borrow();
            o.props.contains_key(&name)
                || o.class
                    .as_ref()
                    .is_some_and(|c| c.find_method(&name).is_some() || c.find_getter(&name).is_some())
        }
        Value::Array(items) => match key {
            Value::Number(n) => {
                n.fract() == 0.0 && *n >= 0.0 && (*n as usize) < items.borrow().len()
            }
            _ => name == "length",
        },
        Value::MapV(m) => m.borrow().find(key).is_some(),
        _ => false,
    }
}

/// A bound closure for a method found along the superclass chain.
fn find_method_closure(
    class: &Rc<ClassValue>,
    name: &str,
    bound_this: Option<Value>,
) -> Option<Value> {
    let mut current = Some(class.clone());
    while let Some(c) = current {
        if let Some(slot) = c.methods.get(name) {
            return Some(Value::Function(Rc::new(Closure {
                func: slot.func,
                env: c.env.clone(),
                bound_this,
                name: name.to_string(),
            })));
        }
        current = c.superclass.clone();
    }
    None
}

fn find_getter_slot(class: &Rc<ClassValue>, name: &str) -> Option<(u32, Rc<Env>)> {
    let mut current = Some(class.clone());
    while let Some(c) = current {
        if let Some(slot) = c.getters.get(name) {
            return Some((slot.func, c.env.clone()));
        }
        current = c.superclass.clone();
    }
    None
}

/// Promise-executor settle callbacks: marker objects the VM's call path
/// recognizes.
fn settle_callback(promise: &Ref<PromiseState>, reject: bool) -> Value {
    let mut obj = JsObject::plain();
    obj.props
        .insert("__settle".to_string(), Value::Promise(promise.clone()));
    obj.props
        .insert("__reject".to_string(), Value::Bool(reject));
    Value::object(obj)
}

// =============================================================================
// Host implementation
// =============================================================================

impl<'p> Host for Vm<'p> {
    fn call(&mut self, callee: Value, this: Value, args: Vec<Value>) -> Result<Value, Value> {
        match &callee {
            Value::Function(closure) => {
                let closure = closure.clone();
                self.call_closure(&closure, this, args, None)
            }
            Value::Builtin(def) => (def.func)(self, args),
            Value::Class(class) => Err(throw_type_error(format!(
                "class '{}' must be instantiated with 'new'",
                class.name
            ))),
            Value::Object(obj) => {
                // Promise-executor settle callbacks.
                let marker = {
                    let o = obj.borrow();
                    o.props.get("__settle").cloned().map(|p| {
                        (
                            p,
                            o.props
                                .get("__reject")
                                .map(ops::is_truthy)
                                .unwrap_or(false),
                        )
                    })
                };
                if let Some((Value::Promise(p), is_reject)) = marker {
                    let value = args.into_iter().next().unwrap_or(Value::Undefined);
                    if is_reject {
                        promise::reject(&mut self.ctx, &p, value);
                    } else {
                        promise::fulfill(&mut self.ctx, &p, value);
                    }
                    return Ok(Value::Undefined);
                }
                Err(throw_type_error("value is not a function"))
            }
            other => Err(throw_type_error(format!(
                "{} is not a function",
                ops::to_display_string(other)
            ))),
        }
    }

    fn construct(&mut self, class: Value, args: Vec<Value>) -> Result<Value, Value> {
        self.construct_value(class, args)
    }

    fn machine_resume(
        &mut self,
        machine: Ref<StateMachineObj>,
        sent: Value,
        inject: Option<Value>,
    ) -> Result<Value, Value> {
        let (kind, state, func, env) = {
            let m = machine.borrow();
            (m.kind, m.state, m.func, m.env.clone())
        };
        if state == MACHINE_DONE {
            let record = iter::iter_result(Value::Undefined, true);
            return Ok(match kind {
                MachineKind::AsyncGenerator => {
                    Value::Promise(promise::resolve_value(&mut self.ctx, record))
                }
                _ => record,
            });
        }
        if state == MACHINE_RUNNING {
            return Err(throw_type_error("machine is already running"));
        }
        // Throwing into a machine that never started completes it.
        if state == 0 && inject.is_some() {
            let error = inject.expect("just checked");
            let mut m = machine.borrow_mut();
            m.done = true;
            m.state = MACHINE_DONE;
            return Err(error);
        }
        {
            let mut m = machine.borrow_mut();
            m.sent = sent;
            m.injected_error = inject;
        }
        // Async generators answer `next()` with a promise settled at the
        // next yield (or completion), surviving intermediate awaits.
        if kind == MachineKind::AsyncGenerator && machine.borrow().pending_next.is_none() {
            machine.borrow_mut().pending_next = Some(PromiseState::pending());
        }

        let outcome = self.run_function(func, env, Some(machine.clone()), None);
        match outcome {
            Ok(Completion::SuspendedAwait) => Ok(match kind {
                MachineKind::AsyncGenerator => {
                    let p = machine.borrow().pending_next.clone().expect("pending next");
                    Value::Promise(p)
                }
                _ => iter::iter_result(Value::Undefined, false),
            }),
            Ok(Completion::SuspendedYield) => {
                let yielded =
                    std::mem::replace(&mut machine.borrow_mut().yielded, Value::Undefined);
                let record = iter::iter_result(yielded, false);
                Ok(match kind {
                    MachineKind::AsyncGenerator => {
                        let p = machine
                            .borrow_mut()
                            .pending_next
                            .take()
                            .expect("pending next");
                        promise::fulfill(&mut self.ctx, &p, record);
                        Value::Promise(p)
                    }
                    _ => record,
                })
            }
            Ok(Completion::Return(value)) => {
                {
                    let mut m = machine.borrow_mut();
                    m.done = true;
                    m.state = MACHINE_DONE;
                    m.result = value.clone();
                }
                match kind {
                    MachineKind::Async => {
                        let p = machine.borrow().promise.clone().expect("async promise");
                        promise::fulfill(&mut self.ctx, &p, value);
                        Ok(iter::iter_result(Value::Undefined, true))
                    }
                    MachineKind::AsyncGenerator => {
                        let record = iter::iter_result(value, true);
                        let p = machine
                            .borrow_mut()
                            .pending_next
                            .take()
                            .expect("pending next");
                        promise::fulfill(&mut self.ctx, &p, record);
                        Ok(Value::Promise(p))
                    }
                    MachineKind::Generator => Ok(iter::iter_result(value, true)),
                }
            }
            Err(error) => {
                {
                    let mut m = machine.borrow_mut();
                    m.done = true;
                    m.state = MACHINE_DONE;
                }
                match kind {
                    MachineKind::Async => {
                        let p = machine.borrow().promise.clone().expect("async promise");
                        let handled = p.borrow().handled;
                        if !handled {
                            warn!(
                                error = %ops::to_display_string(&error),
                                "unhandled promise rejection"
                            );
                        }
                        promise::reject(&mut self.ctx, &p, error);
                        Ok(iter::iter_result(Value::Undefined, true))
                    }
                    MachineKind::AsyncGenerator => {
                        let p = machine
                            .borrow_mut()
                            .pending_next
                            .take()
                            .expect("pending next");
                        promise::reject(&mut self.ctx, &p, error);
                        Ok(Value::Promise(p))
                    }
                    MachineKind::Generator => Err(error),
                }
            }
        }
    }

    fn dynamic_import(&mut self, specifier: &str) -> Result<Value, Value> {
        let trimmed = specifier.trim_start_matches("./");
        let candidates = [
            trimmed.to_string(),
            format!("{trimmed}.ts"),
            format!("{trimmed}.js"),
        ];
        let found = self.program.modules.iter().position(|m| {
            candidates
                .iter()
                .any(|c| m.path == *c || m.path.ends_with(&format!("/{c}")))
        });
        let ctx_promise = match found {
            Some(index) => {
                let ns = self.namespace_object(index);
                promise::resolve_value(&mut self.ctx, ns)
            }
            None => promise::rejected_promise(
                &mut self.ctx,
                throw_type_error(format!("cannot resolve dynamic import '{specifier}'")),
            ),
        };
        Ok(Value::Promise(ctx_promise))
    }

    fn ctx_mut(&mut self) -> &mut RuntimeCtx {
        &mut self.ctx
    }
}

/// Render an escaped error value for the CLI.
pub fn error_to_string(value: &Value) -> String {
    if let Value::Object(obj) = value {
        let o = obj.borrow();
        if let (Some(name), Some(message)) = (o.props.get("name"), o.props.get("message")) {
            return format!(
                "{}: {}",
                ops::to_display_string(name),
                ops::to_display_string(message)
            );
        }
    }
    ops::to_display_string(value)
}

/// Keep the entry knot in one place for the CLI: decode, run, report.
pub fn run_artifact_bytes(
    bytes: &[u8],
    stdout: Box<dyn std::io::Write>,
    stderr: Box<dyn std::io::Write>,
) -> Result<RunOutcome, Diagnostic> {
    let program = tsb_emitter::decode_artifact(bytes)?;
    let mut vm = Vm::new(&program, RuntimeCtx::new(stdout, stderr))?;
    Ok(vm.run())
}
