use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use quill_bytecode::Constant;
use quill_codegen::Compiler;
use test_env_log::test;

use super::{VirtualMachine, VmConfig};
use crate::builtin::BuiltinRegistry;
use crate::error::RuntimeError;
use crate::gc::alloc::Heap;
use crate::value::Value;

/// A compiler and a VM sharing one registry, like a REPL session.
struct Harness {
    registry: Rc<RefCell<BuiltinRegistry>>,
    compiler: Compiler,
    vm: VirtualMachine,
}

impl Harness {
    fn new() -> Self {
        Self::with(BuiltinRegistry::with_std(), VmConfig::default())
    }

    fn with(registry: BuiltinRegistry, config: VmConfig) -> Self {
        let registry = Rc::new(RefCell::new(registry));
        Harness {
            vm: VirtualMachine::new(config, registry.clone()),
            registry,
            compiler: Compiler::new(),
        }
    }

    fn run(&mut self, src: &str) -> Result<Option<Value>, RuntimeError> {
        let (ast, errors) = quill_syn::parse(src);
        assert!(errors.is_empty(), "Parse error: {:?}", errors);
        let program = self
            .compiler
            .compile(&ast, &mut *self.registry.borrow_mut())
            .expect("program should compile");
        self.vm.run(&program)
    }

    /// Run a program ending in a top-level `return` and render the result.
    fn eval(&mut self, src: &str) -> String {
        let v = self
            .run(src)
            .unwrap_or_else(|e| panic!("runtime error: {}", e))
            .expect("program should return a value");
        self.vm.display(v)
    }

    fn global(&self, name: &str) -> String {
        let slot = self
            .compiler
            .globals()
            .iter()
            .position(|g| g == name)
            .unwrap_or_else(|| panic!("no global named {}", name));
        self.vm.display(self.vm.global(slot).unwrap())
    }
}

fn eval(src: &str) -> String {
    Harness::new().eval(src)
}

fn run_err(src: &str) -> RuntimeError {
    Harness::new()
        .run(src)
        .expect_err("program should fail at run time")
}

#[test]
fn test_arithmetic_matches_host() {
    let cases: &[(&str, f64)] = &[
        ("1 + 2 * 3", 7.0),
        ("(1 + 2) * 3 - 4 / 2", 7.0),
        ("10 - 4 - 3", 3.0),
        ("2 * 3 + 4 * 5 - 6 / 3", 24.0),
        ("-(3 - 5) * 2", 4.0),
        ("1 / 4 + 1 / 4", 0.5),
    ];
    for (src, expected) in cases {
        let mut h = Harness::new();
        let v = h.run(&format!("return {};", src)).unwrap();
        assert_eq!(v, Some(Value::Number(*expected)), "{}", src);
    }
}

#[test]
fn test_comparison_and_logic() {
    assert_eq!(eval("return 1 < 2;"), "true");
    assert_eq!(eval("return 2 <= 1;"), "false");
    assert_eq!(eval("return 3 >= 3;"), "true");
    assert_eq!(eval("return 1 != 1;"), "false");
    assert_eq!(eval("return \"abc\" < \"abd\";"), "true");
    assert_eq!(eval("return 1 && 0;"), "false");
    assert_eq!(eval("return nil || 2;"), "true");
    assert_eq!(eval("return !nil;"), "true");
    assert_eq!(eval("return (6 & 3) + (6 | 3) + (6 ^ 3) + ~0;"), "13");
}

#[test]
fn test_equality() {
    assert_eq!(eval("return \"a\" + \"b\" == \"ab\";"), "true");
    assert_eq!(eval("return [1, [2]] == [1, [2]];"), "true");
    assert_eq!(eval("return [1, 2] == [2, 1];"), "false");
    assert_eq!(eval("return { x: 1 } == { x: 1 };"), "false");
    assert_eq!(eval("var p = { x: 1 }; return p == p;"), "true");
    assert_eq!(eval("return 1 == \"1\";"), "false");
    assert_eq!(eval("return nil == nil;"), "true");
}

#[test]
fn test_equality_of_deep_and_cyclic_arrays() {
    let deep = "
        var a = 1; var b = 1; var i = 0;
        while (i < 40) { a = [a]; b = [b]; i = i + 1; }
        return a == b;";
    assert_eq!(eval(deep), "true");
    assert_eq!(
        eval("var a = [[[[[[[[[[[[[[[[[[[1]]]]]]]]]]]]]]]]]]]; return a == [[[[[[[[[[[[[[[[[[[2]]]]]]]]]]]]]]]]]]];"),
        "false"
    );

    let mut h = Harness::new();
    h.run(
        "var a = [0, 1]; a[0] = a;
        var b = [0, 1]; b[0] = b;
        var c = [0, 2]; c[0] = c;
        var same = a == b; var different = a == c;",
    )
    .unwrap();
    assert_eq!(h.global("same"), "true");
    assert_eq!(h.global("different"), "false");
}

#[test]
fn test_concatenation() {
    assert_eq!(eval("return \"foo\" + \"bar\";"), "foobar");
    assert_eq!(eval("return [1, 2] + [\"x\"];"), "[1, 2, \"x\"]");
}

#[test]
fn test_scope_shadowing() {
    let mut h = Harness::new();
    h.run(
        "var x = 1; var inner; var outer;
        { var x = 2; inner = x; }
        outer = x;",
    )
    .unwrap();
    assert_eq!(h.global("inner"), "2");
    assert_eq!(h.global("outer"), "1");
}

#[test]
fn test_upvalues_across_two_levels() {
    let src = "
        function outer() {
            var a = 10;
            function middle() {
                var b = 5;
                function inner() { return a * 2 + b; }
                return inner();
            }
            return middle();
        }
        return outer();";
    assert_eq!(eval(src), "25");
}

#[test]
fn test_upvalue_assignment_updates_enclosing_local() {
    let src = "
        function counter() {
            var n = 0;
            function bump() { n = n + 1; }
            bump(); bump(); bump();
            return n;
        }
        return counter();";
    assert_eq!(eval(src), "3");
}

#[test]
fn test_recursive_local_function_reads_enclosing_frame() {
    let src = "
        function outer() {
            function fact(n) {
                if (n < 2) { return 1; }
                return n * fact(n - 1);
            }
            return fact(5);
        }
        return outer();";
    assert_eq!(eval(src), "120");
}

#[test]
fn test_upvalue_reached_through_sibling_call() {
    let src = "
        var out = 0;
        {
            var x = 7;
            function f() { return x; }
            function g() { return f(); }
            out = g();
        }
        return out;";
    assert_eq!(eval(src), "7");
}

#[test]
fn test_upvalue_in_function_passed_down() {
    let src = "
        function outer() {
            var base = 40;
            function add(n) { return base + n; }
            function apply(fn, v) { return fn(v); }
            return apply(add, 2);
        }
        return outer();";
    assert_eq!(eval(src), "42");
}

#[test]
fn test_escaped_function_cannot_read_finished_frame() {
    let err = run_err(
        "function make() { var v = 1; function get() { return v; } return get; }
        var g = make();
        return g();",
    );
    assert!(matches!(err, RuntimeError::DanglingReference(_)), "{:?}", err);
}

#[test]
fn test_control_flow() {
    let src = "
        var i = 0; var sum = 0;
        while (i < 10) {
            if (i == 3) { sum = sum + 100; }
            else if (i > 7) { sum = sum - 1; }
            else { sum = sum + i; }
            i = i + 1;
        }
        return sum;";
    // 0+1+2 + 100 + 4+5+6+7 - 2
    assert_eq!(eval(src), "123");
}

#[test]
fn test_recursion() {
    let src = "
        function fib(n) {
            if (n < 2) { return n; }
            return fib(n - 1) + fib(n - 2);
        }
        return fib(15);";
    assert_eq!(eval(src), "610");
}

#[test]
fn test_call_frame_discipline() {
    let mut h = Harness::new();
    h.run(
        "function zero() { return 1; }
        function one(a) { return a; }
        function three(a, b, c) { return a + b * c; }
        function nothing(a, b) { var t = a + b; }
        var r0 = zero(); var r1 = one(2); var r3 = three(1, 2, 3);
        nothing(1, 2); one(5);",
    )
    .unwrap();
    assert_eq!(h.global("r0"), "1");
    assert_eq!(h.global("r1"), "2");
    assert_eq!(h.global("r3"), "7");
    assert!(h.vm.heap().stack().is_empty());
    assert!(h.vm.heap.frames.is_empty());

    let slot = |h: &Harness, name: &str| h.compiler.globals().iter().position(|g| g == name).unwrap();
    let three = h.vm.global(slot(&h, "three")).unwrap();
    let nothing = h.vm.global(slot(&h, "nothing")).unwrap();
    let zero = h.vm.global(slot(&h, "zero")).unwrap();

    let args = [Value::Number(2.0), Value::Number(3.0), Value::Number(4.0)];
    assert_eq!(h.vm.call(three, &args).unwrap(), Some(Value::Number(14.0)));
    assert!(h.vm.heap().stack().is_empty());
    assert_eq!(h.vm.call(zero, &[]).unwrap(), Some(Value::Number(1.0)));
    assert!(h.vm.heap().stack().is_empty());
    assert_eq!(h.vm.call(nothing, &args[..2]).unwrap(), None);
    assert!(h.vm.heap().stack().is_empty());
}

#[test]
fn test_index_bounds() {
    let base = "var a = [1, 2, 3];";
    assert_eq!(eval(&format!("{} return a[0] + a[2];", base)), "4");
    assert!(matches!(
        run_err(&format!("{} a[3];", base)),
        RuntimeError::IndexOutOfRange { len: 3, .. }
    ));
    assert!(matches!(
        run_err(&format!("{} a[-1];", base)),
        RuntimeError::IndexOutOfRange { len: 3, .. }
    ));
    assert!(matches!(
        run_err(&format!("{} a[3] = 0;", base)),
        RuntimeError::IndexOutOfRange { len: 3, .. }
    ));
    assert!(matches!(
        run_err(&format!("{} a[-1] = 0;", base)),
        RuntimeError::IndexOutOfRange { len: 3, .. }
    ));
    assert!(matches!(
        run_err(&format!("{} a[0.5];", base)),
        RuntimeError::InvalidIndex(_)
    ));
    assert!(matches!(
        run_err(&format!("{} a[\"0\"];", base)),
        RuntimeError::InvalidIndex("string")
    ));
    assert!(matches!(run_err("var n = 1; n[0];"), RuntimeError::NotIndexable("number")));
}

#[test]
fn test_array_writes() {
    assert_eq!(eval("var a = [1, 2, 3]; a[1] = \"two\"; return a;"), "[1, \"two\", 3]");
    assert_eq!(eval("var a = [0]; return a[0] = 5;"), "5");
}

#[test]
fn test_string_indexing() {
    assert_eq!(eval("return \"héllo\"[1];"), "é");
    assert!(matches!(
        run_err("var s = \"abc\"; s[0] = \"x\";"),
        RuntimeError::NotIndexable(_)
    ));
}

#[test]
fn test_structs() {
    assert_eq!(
        eval("struct Vec2 { x: 0, y: 0 } var v = Vec2(); v.x = 3; return v.x + v.y;"),
        "3"
    );
    assert_eq!(
        eval("struct P { x: 0 } var a = P(); var b = P(); a.x = 1; return b.x;"),
        "0"
    );
    assert_eq!(eval("var p = { name: \"q\" }; p.extra = 2; return p.extra;"), "2");
    assert_eq!(eval("return { k: [1] };"), "{k: [1]}");

    match run_err("var p = { x: 1 }; p.z;") {
        RuntimeError::NoSuchMember(name) => assert_eq!(name, "z"),
        e => panic!("unexpected error {:?}", e),
    }
    assert!(matches!(run_err("var n = 1; n.x;"), RuntimeError::NotAStruct("number")));
}

#[test]
fn test_global_references() {
    let mut h = Harness::new();
    h.run(
        "function inc(p) { p = p + 1; }
        var x = 1;
        inc(ref x); inc(ref x);",
    )
    .unwrap();
    assert_eq!(h.global("x"), "3");
}

#[test]
fn test_element_and_local_references() {
    assert_eq!(
        eval("var a = [1, 2, 3]; var r = ref a[1]; r = 20; return a;"),
        "[1, 20, 3]"
    );
    assert_eq!(
        eval(
            "function f() { var y = 1; var r = ref y; r = 5; return y; }
            return f();"
        ),
        "5"
    );
    assert_eq!(eval("var x = 4; var r = ref x; return r * 2;"), "8");
    assert!(matches!(
        run_err("var a = [1]; var r = ref a[1];"),
        RuntimeError::IndexOutOfRange { len: 1, .. }
    ));
}

#[test]
fn test_type_errors() {
    assert!(matches!(
        run_err("1 + \"a\";"),
        RuntimeError::TypeMismatch {
            op: "+",
            left: "number",
            right: "string"
        }
    ));
    assert!(matches!(
        run_err("-\"a\";"),
        RuntimeError::UnaryTypeMismatch {
            op: "-",
            operand: "string"
        }
    ));
    assert!(matches!(run_err("nil();"), RuntimeError::NotCallable("nil")));
    assert!(matches!(
        run_err("function f(a) {} f(1, 2);"),
        RuntimeError::ArityMismatch {
            expected: 1,
            got: 2
        }
    ));
}

#[test]
fn test_stack_overflow_is_an_error() {
    let mut h = Harness::with(
        BuiltinRegistry::with_std(),
        VmConfig {
            frame_capacity: 32,
            ..VmConfig::default()
        },
    );
    let err = h.run("function f() { return f(); } f();").unwrap_err();
    assert!(matches!(err, RuntimeError::StackOverflow("call frames")));

    // The machine is still usable after the error.
    assert!(h.vm.heap().stack().is_empty());
    assert!(h.vm.heap.frames.is_empty());
    assert_eq!(h.eval("return 1 + 1;"), "2");
}

#[test]
fn test_repl_style_globals_persist() {
    let mut h = Harness::new();
    assert_eq!(h.run("var x = 41;").unwrap(), None);
    assert_eq!(h.eval("return x + 1;"), "42");
    assert!(h.run("x = x + \"oops\";").is_err());
    assert_eq!(h.eval("return x;"), "41");
}

#[test]
fn test_std_builtins() {
    assert_eq!(eval("return sizeof([1, 2, 3]) + sizeof(\"héllo\");"), "8");
    assert_eq!(eval("return sizeof({ a: 1, b: 2 });"), "2");
    assert_eq!(
        eval("var a = [1, 3]; insert(a, 1, 2); insert(a, 3, 4); return a;"),
        "[1, 2, 3, 4]"
    );
    assert_eq!(
        eval("var a = [1, 2, 3]; var first = erase(a, 0); return [first, a];"),
        "[1, [2, 3]]"
    );
    assert_eq!(eval("return clock() >= 0;"), "true");
    assert!(matches!(run_err("sizeof(1);"), RuntimeError::Native(_)));
    assert!(matches!(
        run_err("erase([1], 1);"),
        RuntimeError::IndexOutOfRange { len: 1, .. }
    ));
}

fn double(heap: &mut Heap, args: &mut [Value], out: &mut Value) -> Result<bool, RuntimeError> {
    match args {
        [v] => match heap.actual_value(*v)? {
            Value::Number(n) => {
                *out = Value::Number(n * 2.0);
                Ok(true)
            }
            _ => Err(RuntimeError::native("double expects a number")),
        },
        _ => Err(RuntimeError::native("double expects 1 argument")),
    }
}

fn nothing(_: &mut Heap, _: &mut [Value], _: &mut Value) -> Result<bool, RuntimeError> {
    Ok(false)
}

#[test]
fn test_registered_builtins() {
    let mut registry = BuiltinRegistry::with_std();
    registry.register_fn("double", double).unwrap();
    registry.register_fn("nothing", nothing).unwrap();
    registry
        .register_constant("answer", Constant::Number(42.0))
        .unwrap();
    registry
        .register_constant("greeting", Constant::Str("hi".into()))
        .unwrap();
    let mut h = Harness::with(registry, VmConfig::default());

    assert_eq!(h.eval("return double(answer);"), "84");
    assert_eq!(h.eval("return greeting + \"!\";"), "hi!");
    assert!(matches!(
        h.run("var x = nothing();").unwrap_err(),
        RuntimeError::StackUnderflow
    ));
    assert!(matches!(
        h.run("double(\"a\");").unwrap_err(),
        RuntimeError::Native(_)
    ));
}

#[test]
fn test_duplicate_builtin_is_rejected() {
    let mut registry = BuiltinRegistry::with_std();
    assert!(matches!(
        registry.register_fn("print", nothing),
        Err(crate::builtin::RegistryError::Duplicate(name)) if name == "print"
    ));
    assert_eq!(registry.len(), 6);
}

#[test]
fn test_missing_library_fails_to_load() {
    let mut registry = BuiltinRegistry::with_std();
    let err = registry
        .load_library("/nonexistent/libquill_missing.so")
        .unwrap_err();
    assert!(matches!(err, crate::builtin::LoadError::Open { .. }));
    assert!(!registry.is_loaded("/nonexistent/libquill_missing.so"));
    assert_eq!(registry.len(), 6);
}

#[test]
fn test_gc_during_execution() {
    let mut h = Harness::with(
        BuiltinRegistry::with_std(),
        VmConfig {
            gc_threshold: 8,
            ..VmConfig::default()
        },
    );
    let src = "
        var parts = [];
        var s = \"\";
        var i = 0;
        while (i < 200) {
            s = s + \"x\";
            insert(parts, 0, { n: i });
            i = i + 1;
        }
        return sizeof(s) + parts[0].n + parts[199].n;";
    assert_eq!(h.eval(src), "399");
    assert!(h.vm.heap().stats().collections > 0);

    let live = h.vm.heap().live_count();
    let freed = h.vm.collect_garbage();
    assert_eq!(h.vm.heap().live_count(), live - freed);
    assert!(h.vm.shutdown() > 0);
    assert_eq!(h.vm.heap().live_count(), 0);
}
