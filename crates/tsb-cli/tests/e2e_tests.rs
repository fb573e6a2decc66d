//! End-to-end scenarios: compile exact sources through the whole pipeline
//! (parse → resolve → check → lower → emit → artifact encode/decode) and
//! run them in the VM, asserting exact stdout.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use tsb_cli::driver;
use tsb_modules::MemoryHost;

#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn take(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).to_string()
    }
}

/// Compile `files` and run `entry`; returns (stdout, stderr, escaped error).
fn run(files: &[(&str, &str)], entry: &str) -> (String, String, Option<String>) {
    let mut host = MemoryHost::new();
    for (path, source) in files {
        host.add(*path, *source);
    }
    let out = SharedBuf::default();
    let err = SharedBuf::default();
    let outcome = driver::compile_and_run(
        &host,
        entry,
        Box::new(out.clone()),
        Box::new(err.clone()),
    )
    .unwrap_or_else(|d| panic!("compilation failed: {d}"));
    let error = outcome.error.map(|e| tsb_vm::error_to_string(&e));
    (out.take(), err.take(), error)
}

fn run_main(source: &str) -> String {
    let (stdout, _stderr, error) = run(&[("main.ts", source)], "main.ts");
    assert_eq!(error, None, "program threw");
    stdout
}

// =============================================================================
// Core behaviors
// =============================================================================

#[test]
fn scenario_module_ordering() {
    let (stdout, _, error) = run(
        &[
            ("a.ts", "console.log(\"a\");"),
            ("b.ts", "import './a';\nconsole.log(\"b\");"),
            ("main.ts", "import './b';\nconsole.log(\"main\");"),
        ],
        "main.ts",
    );
    assert_eq!(error, None);
    assert_eq!(stdout, "a\nb\nmain\n");
}

#[test]
fn scenario_named_export_and_alias() {
    let (stdout, _, error) = run(
        &[
            ("m.ts", "export const value = 42;"),
            ("main.ts", "import {value as v} from './m';\nconsole.log(v);"),
        ],
        "main.ts",
    );
    assert_eq!(error, None);
    assert_eq!(stdout, "42\n");
}

#[test]
fn scenario_async_try_catch_crossing_await() {
    let stdout = run_main(
        "async function f() { throw \"e\"; }\nasync function m() { try { await f(); } catch (e) { console.log(\"caught:\" + e); } }\nm();",
    );
    assert_eq!(stdout, "caught:e\n");
}

#[test]
fn scenario_sort_stability_with_undefined() {
    let stdout = run_main(
        "console.log([3, undefined, 1, undefined, 2].sort().join(\",\"));",
    );
    assert_eq!(stdout, "1,2,3,,\n");
}

#[test]
fn scenario_listener_snapshot() {
    let stdout = run_main(
        r#"import {EventEmitter} from 'events';
const em = new EventEmitter();
function l2() { console.log("L2"); }
function l1() { console.log("L1"); em.removeListener("evt", l2); }
function l3() { console.log("L3"); }
em.on("evt", l1);
em.on("evt", l2);
em.on("evt", l3);
em.emit("evt");
em.emit("evt");
"#,
    );
    assert_eq!(stdout, "L1\nL2\nL3\nL1\nL3\n");
}

#[test]
fn scenario_console_format() {
    let stdout = run_main(
        "console.log(\"Name: %s, Age: %d, Score: %f\", \"Alice\", 30, 95.5);",
    );
    assert_eq!(stdout, "Name: Alice, Age: 30, Score: 95.5\n");
}

// =============================================================================
// Language coverage
// =============================================================================

#[test]
fn arithmetic_and_string_coercion() {
    assert_eq!(run_main("console.log(1 + 2);"), "3\n");
    assert_eq!(run_main("console.log(\"a\" + 1);"), "a1\n");
    assert_eq!(run_main("console.log(7 % 3, 2 ** 10, 7 / 2);"), "1 1024 3.5\n");
    assert_eq!(run_main("console.log(-1 >>> 0);"), "4294967295\n");
}

#[test]
fn loose_vs_strict_equality() {
    assert_eq!(
        run_main("console.log(null == undefined, null === undefined);"),
        "true false\n"
    );
    assert_eq!(run_main("console.log(1 == \"1\", 1 === 1);"), "true true\n");
}

#[test]
fn closures_capture_by_reference() {
    let stdout = run_main(
        "function counter() { let n = 0; return () => { n = n + 1; return n; }; }\nconst c = counter();\nc();\nc();\nconsole.log(c());",
    );
    assert_eq!(stdout, "3\n");
}

#[test]
fn classes_inheritance_getters_private_fields() {
    let stdout = run_main(
        r#"class Animal {
  protected name: string;
  constructor(name: string) { this.name = name; }
  speak(): string { return this.name + " makes a sound"; }
}
class Dog extends Animal {
  #tricks: number = 0;
  constructor(name: string) { super(name); }
  speak(): string { return super.speak() + "; woof"; }
  learn() { this.#tricks = this.#tricks + 1; return this; }
  get tricks(): number { return this.#tricks; }
}
const d = new Dog("Rex");
console.log(d.speak());
d.learn().learn();
console.log(d.tricks);
console.log(d instanceof Dog, d instanceof Animal);
"#,
    );
    assert_eq!(
        stdout,
        "Rex makes a sound; woof\n2\ntrue true\n"
    );
}

#[test]
fn static_members_and_setters() {
    let stdout = run_main(
        r#"class Counter {
  static total: number = 0;
  value: number = 0;
  set bump(n: number) { this.value = this.value + n; Counter.total = Counter.total + n; }
}
const a = new Counter();
const b = new Counter();
a.bump = 2;
b.bump = 3;
console.log(a.value, b.value, Counter.total);
"#,
    );
    assert_eq!(stdout, "2 3 5\n");
}

#[test]
fn enums_fold_forward_and_reverse() {
    let stdout = run_main(
        "enum Color { Red, Green = 5, Blue }\nconsole.log(Color.Red, Color.Blue, Color[5]);",
    );
    assert_eq!(stdout, "0 6 Green\n");
}

#[test]
fn generics_substitute_through_members() {
    let stdout = run_main(
        r#"class Box<T> {
  value: T;
  constructor(v: T) { this.value = v; }
  map<U>(f: (v: T) => U): U { return f(this.value); }
}
const b = new Box<number>(21);
console.log(b.map((v: number) => v * 2));
"#,
    );
    assert_eq!(stdout, "42\n");
}

#[test]
fn destructuring_declarations_and_params() {
    let stdout = run_main(
        r#"const {a, b: {c}, d = 9} = {a: 1, b: {c: 2}};
const [x, , y, ...rest] = [10, 20, 30, 40, 50];
function dist({dx, dy}: {dx: number, dy: number}): number { return Math.sqrt(dx * dx + dy * dy); }
console.log(a, c, d, x, y, rest.join("+"), dist({dx: 3, dy: 4}));
"#,
    );
    assert_eq!(stdout, "1 2 9 10 30 40+50 5\n");
}

#[test]
fn spread_in_calls_arrays_and_objects() {
    let stdout = run_main(
        r#"function sum(...nums: number[]): number { return nums.reduce((a: number, b: number) => a + b, 0); }
const parts = [2, 3];
console.log(sum(1, ...parts, 4));
const merged = {x: 1, ...{y: 2}, z: 3};
console.log(JSON.stringify(merged));
console.log([0, ...parts].join("-"));
"#,
    );
    assert_eq!(stdout, "10\n{\"x\":1,\"y\":2,\"z\":3}\n0-2-3\n");
}

#[test]
fn template_literals_and_tagged_templates() {
    assert_eq!(
        run_main("const n = 7;\nconsole.log(`n=${n} next=${n + 1}`);"),
        "n=7 next=8\n"
    );
    let stdout = run_main(
        r#"function tag(cooked: any, raw: any, values: any) { return cooked[0] + values[0] + "|" + raw[1]; }
console.log(tag`a${1}\n`);
"#,
    );
    assert_eq!(stdout, "a1|\\n\n");
}

#[test]
fn optional_chaining_short_circuits_whole_chain() {
    let stdout = run_main(
        "const a: any = undefined;\nconsole.log(a?.b.c);\nconst obj: any = {b: {c: 5}};\nconsole.log(obj?.b.c);",
    );
    assert_eq!(stdout, "undefined\n5\n");
}

#[test]
fn logical_assignment_operators() {
    let stdout = run_main(
        "let a: any = null;\na ??= 5;\nlet b: any = 0;\nb ||= 7;\nlet c: any = 1;\nc &&= 9;\nconsole.log(a, b, c);",
    );
    assert_eq!(stdout, "5 7 9\n");
}

#[test]
fn compound_assignment_and_increments() {
    let stdout = run_main(
        "let n = 10;\nn += 5;\nn -= 3;\nconsole.log(n, n++, n, ++n);\nconst arr = [1];\narr[0] += 4;\nconsole.log(arr[0]);",
    );
    assert_eq!(stdout, "12 12 13 14\n5\n");
}

#[test]
fn for_of_for_in_and_iterators() {
    let stdout = run_main(
        r#"const seen: string[] = [];
for (const x of [1, 2, 3]) { seen.push("v" + x); }
for (const k in {a: 1, b: 2}) { seen.push("k" + k); }
for (const ch of "hi") { seen.push(ch); }
console.log(seen.join(","));
"#,
    );
    assert_eq!(stdout, "v1,v2,v3,ka,kb,h,i\n");
}

#[test]
fn try_catch_finally_ordering() {
    let stdout = run_main(
        r#"function f(): string {
  try {
    throw "boom";
  } catch (e) {
    console.log("caught " + e);
    return "from-catch";
  } finally {
    console.log("finally");
  }
}
console.log(f());
"#,
    );
    assert_eq!(stdout, "caught boom\nfinally\nfrom-catch\n");
}

#[test]
fn finally_runs_on_break_and_loop_exits() {
    let stdout = run_main(
        r#"for (let i = 0; i < 3; i = i + 1) {
  try {
    if (i == 1) { break; }
    console.log("body " + i);
  } finally {
    console.log("fin " + i);
  }
}
console.log("after");
"#,
    );
    assert_eq!(stdout, "body 0\nfin 0\nfin 1\nafter\n");
}

#[test]
fn generators_yield_and_delegate() {
    let stdout = run_main(
        r#"function* inner() { yield 2; yield 3; return 99; }
function* gen() { yield 1; const got = yield* inner(); yield got; }
const g = gen();
const out: any[] = [];
let r = g.next();
while (!r.done) { out.push(r.value); r = g.next(); }
console.log(out.join(","));
"#,
    );
    assert_eq!(stdout, "1,2,3,99\n");
}

#[test]
fn generator_send_return_and_throw() {
    let stdout = run_main(
        r#"function* echo() {
  const a = yield "first";
  yield "got:" + a;
}
const g = echo();
console.log(g.next().value);
console.log(g.next("hello").value);
console.log(g.return(7).value, g.next().done);
"#,
    );
    assert_eq!(stdout, "first\ngot:hello\n7 true\n");
}

#[test]
fn async_await_chains_and_promise_all() {
    let stdout = run_main(
        r#"async function double(n: number): Promise<number> { return n * 2; }
async function main() {
  const one = await double(1);
  const rest = await Promise.all([double(10), double(20)]);
  console.log(one, rest.join("+"));
}
main();
"#,
    );
    assert_eq!(stdout, "2 20+40\n");
}

#[test]
fn async_arrow_captures_enclosing_locals_and_this() {
    let stdout = run_main(
        r#"class Calc {
  base: number = 10;
  async run(): Promise<number> {
    const extra = 5;
    const add = async (n: number) => this.base + extra + n;
    return await add(1);
  }
}
const c = new Calc();
c.run().then((v: number) => console.log(v));
"#,
    );
    assert_eq!(stdout, "16\n");
}

#[test]
fn for_await_of_drives_async_iteration() {
    let stdout = run_main(
        r#"async function main() {
  const out: number[] = [];
  for await (const x of [1, 2, 3]) { out.push(x * x); }
  console.log(out.join(","));
}
main();
"#,
    );
    assert_eq!(stdout, "1,4,9\n");
}

#[test]
fn async_generator_yields_across_awaits() {
    let stdout = run_main(
        r#"async function* seq() {
  yield 1;
  const n = await Promise.resolve(2);
  yield n;
}
async function main() {
  const out: number[] = [];
  for await (const v of seq()) { out.push(v); }
  console.log(out.join(","));
}
main();
"#,
    );
    assert_eq!(stdout, "1,2\n");
}

#[test]
fn virtual_timers_fire_in_scheduled_order() {
    let stdout = run_main(
        r#"setTimeout(() => console.log("late"), 20);
setTimeout(() => console.log("early"), 5);
console.log("sync");
"#,
    );
    assert_eq!(stdout, "sync\nearly\nlate\n");
}

#[test]
fn intervals_rearm_until_cleared() {
    let stdout = run_main(
        r#"let n = 0;
const id = setInterval(() => {
  n = n + 1;
  console.log("tick" + n);
  if (n == 3) { clearInterval(id); }
}, 10);
"#,
    );
    assert_eq!(stdout, "tick1\ntick2\ntick3\n");
}

#[test]
fn json_round_trip_and_camel_cased_backing_fields() {
    assert_eq!(
        run_main(
            "const x = {n: 1.5, s: \"a\", ok: true, nul: null, arr: [1, 2], nested: {k: \"v\"}};\nconsole.log(JSON.stringify(JSON.parse(JSON.stringify(x))) === JSON.stringify(x));"
        ),
        "true\n"
    );
    let stdout = run_main(
        r#"class User {
  __first_name: string = "Ada";
  age: number = 36;
}
console.log(JSON.stringify(new User()));
console.log(JSON.stringify({inf: 1 / 0, nan: 0 / 0}));
"#,
    );
    assert_eq!(
        stdout,
        "{\"firstName\":\"Ada\",\"age\":36}\n{\"inf\":null,\"nan\":null}\n"
    );
}

#[test]
fn json_parse_reviver_runs_bottom_up_and_drops_undefined() {
    let stdout = run_main(
        r#"const parsed = JSON.parse("{\"keep\":1,\"drop\":2}", (key: string, value: any) => {
  if (key == "drop") { return undefined; }
  return value;
});
console.log(JSON.stringify(parsed));
"#,
    );
    assert_eq!(stdout, "{\"keep\":1}\n");
}

#[test]
fn set_operations_es2025() {
    let stdout = run_main(
        r#"const a = new Set([1, 2, 3]);
const b = new Set([3, 4]);
const fmt = (s: Set<number>) => {
  const items: number[] = [];
  s.forEach((v: number) => items.push(v));
  return items.join(",");
};
console.log(fmt(a.union(b)));
console.log(fmt(a.intersection(b)));
console.log(fmt(a.difference(b)));
console.log(fmt(a.symmetricDifference(b)));
console.log(a.isSubsetOf(new Set([1, 2, 3, 9])), a.isSupersetOf(new Set([2])), a.isDisjointFrom(new Set([7])));
"#,
    );
    assert_eq!(stdout, "1,2,3,4\n3\n1,2\n1,2,4\ntrue true true\n");
}

#[test]
fn maps_preserve_insertion_order() {
    let stdout = run_main(
        r#"const m = new Map<string, number>();
m.set("b", 2).set("a", 1).set("b", 20);
const parts: string[] = [];
m.forEach((v: number, k: string) => parts.push(k + "=" + v));
console.log(parts.join(","), m.size, m.get("a"), m.has("zz"));
"#,
    );
    assert_eq!(stdout, "b=20,a=1 2 1 false\n");
}

#[test]
fn array_methods_cover_es2025_additions() {
    let stdout = run_main(
        r#"const base = [3, 1, 2];
console.log(base.toSorted((a: number, b: number) => a - b).join(","), base.join(","));
console.log(base.toReversed().join(","));
console.log(base.with(1, 9).join(","));
console.log(base.toSpliced(0, 1, 7).join(","));
console.log([[1, [2]], 3].flat(2).join(","));
"#,
    );
    assert_eq!(stdout, "1,2,3 3,1,2\n2,1,3\n3,9,2\n7,1,2\n1,2,3\n");
}

#[test]
fn writable_stream_lifecycle() {
    let stdout = run_main(
        r#"import {Writable} from 'stream';
const w = new Writable();
w._writeCallback = (chunk: any) => console.log("wrote:" + chunk);
w.on("finish", () => console.log("finish"));
w.on("close", () => console.log("close"));
w.cork();
w.write("a");
w.write("b");
w.uncork();
w.end();
w.end();
console.log(w.writable, w.ended, w.finished);
w.destroy();
w.destroy();
"#,
    );
    assert_eq!(
        stdout,
        "wrote:a\nwrote:b\nfinish\nfalse true true\nclose\n"
    );
}

#[test]
fn using_declarations_dispose_at_scope_exit() {
    let stdout = run_main(
        r#"function open(name: string) {
  return {
    name,
    [Symbol.dispose]: () => console.log("disposed " + name),
  };
}
function work() {
  using h = open("res");
  console.log("using " + h.name);
}
work();
"#,
    );
    assert_eq!(stdout, "using res\ndisposed res\n");
}

#[test]
fn namespaces_expose_exported_members() {
    let stdout = run_main(
        "namespace Geo { export const pi = 3; export function area(r: number): number { return pi * r * r; } }\nconsole.log(Geo.area(2), Geo.pi);",
    );
    assert_eq!(stdout, "12 3\n");
}

#[test]
fn object_freeze_is_idempotent_and_blocks_writes() {
    let stdout = run_main(
        r#"const o: any = {a: 1};
Object.freeze(Object.freeze(o));
o.a = 99;
console.log(o.a, Object.isFrozen(o));
"#,
    );
    assert_eq!(stdout, "1 true\n");
}

#[test]
fn console_count_and_time_use_virtual_clock() {
    let stdout = run_main(
        r#"console.count("x");
console.count("x");
console.count();
console.time("t");
console.timeEnd("t");
"#,
    );
    assert_eq!(stdout, "x: 1\nx: 2\ndefault: 1\nt: 0ms\n");
}

#[test]
fn reexports_and_default_exports() {
    let (stdout, _, error) = run(
        &[
            ("base.ts", "export const answer = 42;\nexport default function greet(): string { return \"hi\"; }"),
            ("hub.ts", "export {answer} from './base';"),
            (
                "main.ts",
                "import greet from './base';\nimport {answer} from './hub';\nconsole.log(greet(), answer);",
            ),
        ],
        "main.ts",
    );
    assert_eq!(error, None);
    assert_eq!(stdout, "hi 42\n");
}

#[test]
fn circular_imports_see_live_bindings() {
    let (stdout, _, error) = run(
        &[
            (
                "a.ts",
                "import {bName} from './b';\nexport const aName = \"A\";\nexport function describeA(): string { return \"a sees \" + bName; }",
            ),
            (
                "b.ts",
                "import {aName} from './a';\nexport const bName = \"B\";\nexport function describeB(): string { return \"b sees \" + aName; }",
            ),
            (
                "main.ts",
                "import {describeA} from './a';\nimport {describeB} from './b';\nconsole.log(describeA());\nconsole.log(describeB());",
            ),
        ],
        "main.ts",
    );
    assert_eq!(error, None);
    assert_eq!(stdout, "a sees B\nb sees A\n");
}

#[test]
fn escaped_exceptions_exit_nonzero_with_message() {
    let (stdout, _stderr, error) = run(
        &[("main.ts", "throw new Error(\"fatal\");")],
        "main.ts",
    );
    assert_eq!(stdout, "");
    assert_eq!(error.as_deref(), Some("Error: fatal"));
}

#[test]
fn typeof_and_instanceof() {
    let stdout = run_main(
        "console.log(typeof 1, typeof \"s\", typeof undefined, typeof null, typeof missingGlobal);",
    );
    assert_eq!(stdout, "number string undefined object undefined\n");
}

#[test]
fn promise_executor_and_then_chain() {
    let stdout = run_main(
        r#"const p = new Promise((resolve: any, reject: any) => { resolve(5); });
p.then((v: number) => v + 1).then((v: number) => console.log("got " + v));
console.log("sync");
"#,
    );
    assert_eq!(stdout, "sync\ngot 6\n");
}

#[test]
fn disk_host_and_artifact_file_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let entry = dir.path().join("main.ts");
    std::fs::write(&entry, "console.log(\"from disk\");").unwrap();
    let (program, _) =
        driver::compile(&tsb_modules::FsHost, &entry.to_string_lossy()).expect("compile");
    let artifact = dir.path().join("main.tsbc");
    tsb_emitter::write_artifact(program, &artifact).expect("write artifact");
    let bytes = std::fs::read(&artifact).unwrap();
    let out = SharedBuf::default();
    let err = SharedBuf::default();
    let outcome = tsb_vm::run_artifact_bytes(&bytes, Box::new(out.clone()), Box::new(err.clone()))
        .expect("run artifact");
    assert!(outcome.error.is_none());
    assert_eq!(out.take(), "from disk\n");
}

#[test]
fn decorator_metadata_round_trips() {
    let stdout = run_main(
        r#"function tag(target: any, key: any) { }
class Model {
  @tag age: number = 1;
}
const m = new Model();
console.log(Reflect.getMetadata("design:type", Model, "age"), m.age);
"#,
    );
    assert_eq!(stdout, "number 1\n");
}
