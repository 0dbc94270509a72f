use expect_test::expect;
use pretty_assertions::assert_eq;
use quill_vm::{RuntimeError, Value, VmConfig};
use test_env_log::test;

use crate::diagnostic::line_and_column;
use crate::{Session, SessionError, EXIT_COMPILE_ERROR, EXIT_RUNTIME_ERROR};

fn session() -> Session {
    Session::new(VmConfig::default())
}

#[test]
fn test_run_returns_top_level_value() {
    let mut s = session();
    let v = s.run("var x = 20; return x * 2 + 2;").unwrap();
    assert_eq!(v, Some(Value::Number(42.0)));
    assert_eq!(s.run("x = 1;").unwrap(), None);
    assert_eq!(s.global("x"), Some(Value::Number(1.0)));
}

#[test]
fn test_failed_compile_does_not_define_globals() {
    let mut s = session();
    let err = s.run("var x = 1; var x = 2;").unwrap_err();
    assert_eq!(err.exit_code(), EXIT_COMPILE_ERROR);
    assert!(matches!(&err, SessionError::Compile(errors) if errors[0].id == "redefinition"));

    assert_eq!(s.global("x"), None);
    s.run("var x = 3;").unwrap();
    assert_eq!(s.global("x"), Some(Value::Number(3.0)));
}

#[test]
fn test_runtime_error_keeps_session_usable() {
    let mut s = session();
    s.run("var a = [1];").unwrap();
    let err = s.run("a[5];").unwrap_err();
    assert_eq!(err.exit_code(), EXIT_RUNTIME_ERROR);
    assert!(matches!(
        err,
        SessionError::Runtime(RuntimeError::IndexOutOfRange { len: 1, .. })
    ));
    assert_eq!(err.render("a[5];", "<repl>"), "runtime error: index 5 is out of range for length 1\n");

    let v = s.run("return sizeof(a);").unwrap().unwrap();
    assert_eq!(s.display(v), "1");
}

#[test]
fn test_parse_errors_are_reported_together() {
    let s = session();
    let err = s.parse("var x = ;\nvar y = ;").unwrap_err();
    assert_eq!(err.exit_code(), EXIT_COMPILE_ERROR);
    match &err {
        SessionError::Parse(errors) => assert_eq!(errors.len(), 2),
        e => panic!("unexpected error {:?}", e),
    }
    let rendered = err.render("var x = ;\nvar y = ;", "in.quill");
    assert!(rendered.contains("--> in.quill:1:9"), "{}", rendered);
    assert!(rendered.contains("--> in.quill:2:9"), "{}", rendered);
}

#[test]
fn test_render_compile_error() {
    let src = "var a = 1;\nvar b = c;";
    let err = session().run(src).unwrap_err();
    expect![[r#"
        error: cannot find `c` in this scope [unresolved-name]
         --> <eval>:2:9
          |
        2 | var b = c;
          |         ^
    "#]]
    .assert_eq(&err.render(src, "<eval>"));
}

#[test]
fn test_render_underlines_whole_span() {
    let src = "print(missing);";
    let err = session().run(src).unwrap_err();
    expect![[r#"
        error: cannot find `missing` in this scope [unresolved-name]
         --> f:1:7
          |
        1 | print(missing);
          |       ^^^^^^^
    "#]]
    .assert_eq(&err.render(src, "f"));
}

#[test]
fn test_line_and_column() {
    assert_eq!(line_and_column("abc", 0), (1, 1));
    assert_eq!(line_and_column("abc\ndef", 5), (2, 2));
    assert_eq!(line_and_column("é = 1", 3), (1, 3));
}

#[test]
fn test_disassembly_names_builtins() {
    let mut s = session();
    let program = s.compile("print(1);").unwrap();
    let disasm = s.disassemble(&program);
    assert!(
        disasm.contains("00000000\tOP_GET_BUILTIN\t0\tprint"),
        "{}",
        disasm
    );
}

#[test]
fn test_gc_config_is_honored() {
    let mut s = Session::new(VmConfig {
        gc_threshold: 4,
        ..VmConfig::default()
    });
    s.run(
        "var i = 0; var keep = [];
        while (i < 50) { keep = keep + [\"s\" + \"t\"]; i = i + 1; }",
    )
    .unwrap();
    let v = s.run("return sizeof(keep);").unwrap().unwrap();
    assert_eq!(s.display(v), "50");
    assert!(s.vm().heap().stats().collections > 0);
}

#[test]
fn test_host_calls_script_function() {
    let mut s = session();
    s.run("var base = 10; function add(a, b) { return base + a + b; }")
        .unwrap();
    let add = s.global("add").unwrap();
    let v = s
        .vm_mut()
        .call(add, &[Value::Number(1.0), Value::Number(2.0)])
        .unwrap();
    assert_eq!(v, Some(Value::Number(13.0)));

    let err = s.vm_mut().call(add, &[Value::Number(1.0)]).unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::ArityMismatch {
            expected: 2,
            got: 1
        }
    ));
}
