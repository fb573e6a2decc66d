//! `RuntimeCtx` — the explicit mutable state of a running program.
//!
//! The virtual clock, the timer queue, the microtask queue, console
//! bookkeeping, and the reflection-metadata store. Output streams are
//! injected so the test harness can capture stdout/stderr.

use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::io::Write;

use crate::metadata::MetadataStore;
use crate::timers::TimerQueue;
use crate::value::{Ref, StateMachineObj, Value};

/// One queued microtask.
pub enum Microtask {
    /// Call a user function (promise reaction handlers).
    Call {
        callee: Value,
        args: Vec<Value>,
    },
    /// Resume a suspended state machine with a settlement.
    Resume {
        machine: Ref<StateMachineObj>,
        value: Value,
        rejected: bool,
    },
    /// Settle a dependent promise (reaction without a handler).
    Settle {
        promise: Ref<crate::value::PromiseState>,
        value: Value,
        rejected: bool,
    },
    /// Run a `then` reaction: invoke the handler and settle `target` with
    /// its result.
    ReactThen {
        handler: Value,
        argument: Value,
        target: Ref<crate::value::PromiseState>,
    },
}

pub struct RuntimeCtx {
    /// Virtual milliseconds since program start.
    pub clock_ms: f64,
    pub timers: TimerQueue,
    pub microtasks: VecDeque<Microtask>,
    pub metadata: MetadataStore,
    pub stdout: Box<dyn Write>,
    pub stderr: Box<dyn Write>,
    /// `console.count` counters by label.
    pub counts: FxHashMap<String, u64>,
    /// `console.time` start times by label.
    pub time_marks: FxHashMap<String, f64>,
}

impl RuntimeCtx {
    pub fn new(stdout: Box<dyn Write>, stderr: Box<dyn Write>) -> Self {
        RuntimeCtx {
            clock_ms: 0.0,
            timers: TimerQueue::default(),
            microtasks: VecDeque::new(),
            metadata: MetadataStore::default(),
            stdout,
            stderr,
            counts: FxHashMap::default(),
            time_marks: FxHashMap::default(),
        }
    }

    pub fn with_process_streams() -> Self {
        Self::new(Box::new(std::io::stdout()), Box::new(std::io::stderr()))
    }

    pub fn now_ms(&self) -> f64 {
        self.clock_ms
    }

    pub fn enqueue(&mut self, task: Microtask) {
        self.microtasks.push_back(task);
    }

    pub fn write_out(&mut self, line: &str) {
        let _ = writeln!(self.stdout, "{line}");
    }

    pub fn write_err(&mut self, line: &str) {
        let _ = writeln!(self.stderr, "{line}");
    }
}
