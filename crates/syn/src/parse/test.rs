use test_env_log::test;

use super::{parse, ParseError, ParseErrorKind};
use crate::{Lexer, SynTag};

fn assert_tree_matches(src: &str, tree: &str) {
    let (program, errors) = parse(src);
    assert_eq!(errors, Vec::<ParseError>::new(), "unexpected parse errors");
    let result_formatted = format!("{}", program);
    let actual = result_formatted.trim();
    let expected = tree.trim();
    if actual != expected {
        let diff = colored_diff::PrettyDifference { actual, expected };
        panic!("tree mismatch (< expected / > actual):\n{}", diff);
    }
}

#[test]
fn test_lex_skips_whitespace_and_comments() {
    use SynTag::*;
    let input = "var x = 1; // trailing\nx >= 2.5";
    let res = Lexer::new(input).collect::<Vec<_>>();
    pretty_assertions::assert_eq!(
        res,
        vec![VarKw, Ident, Assign, Number, Semicolon, Ident, Ge, Number]
    );
}

#[test]
fn test_parse_empty() {
    let (program, errors) = parse("  // nothing here\n");
    assert!(program.stmts.is_empty());
    assert!(errors.is_empty());
}

#[test]
fn test_parse_precedence() {
    assert_tree_matches(
        "1 + 2 * 3; 1 - 2 - 3; a || b && c == d; x | y ^ z & w;",
        r#"
(+ 1 (* 2 3))
(- (- 1 2) 3)
(|| a (&& b (== c d)))
(| x (^ y (& z w)))
"#,
    );
}

#[test]
fn test_parse_assign_is_right_assoc() {
    assert_tree_matches("a = b = 1 + 2;", "(= a (= b (+ 1 2)))");
}

#[test]
fn test_parse_postfix_chain() {
    assert_tree_matches(
        "a.b[1](2, 3); -p.x; f(ref a[1], ref x);",
        r#"
(call (index (. a b) 1) 2 3)
(- (. p x))
(call f (ref (index a 1)) (ref x))
"#,
    );
}

#[test]
fn test_parse_statements() {
    let input = r#"
var x = 1;
function add(a, b) { return a + b; }
struct Vec2 { x: 0, y: 0 }
if (x < 2) { x = 3; } else if (x) { } else { print("no"); }
while (x) { x = x - 1; }
{ var s = [1, "a", ]; }
import("./libext.so");
"#;
    assert_tree_matches(
        input,
        r#"
(var x 1)
(function add (a b) (block (return (+ a b))))
(struct Vec2 (x 0) (y 0))
(if (< x 2) (block (= x 3)) (if x (block) (block (call print "no"))))
(while x (block (= x (- x 1))))
(block (var s [1 "a"]))
(import "./libext.so")
"#,
    );
}

#[test]
fn test_parse_literals() {
    assert_tree_matches(
        r#"var p = { x: 1, y: 2.5 }; var e = {}; var s = "a\n\"b\""; var n = nil; true; return;"#,
        r#"
(var p {x: 1 y: 2.5})
(var e {})
(var s "a\n\"b\"")
(var n nil)
true
(return)
"#,
    );
}

#[test]
fn test_parse_anonymous_function() {
    assert_tree_matches(
        "var f = function(n) { return n * 2; }; function() { return 1; }();",
        r#"
(var f (function (n) (block (return (* n 2)))))
(call (function () (block (return 1))))
"#,
    );
}

#[test]
fn test_parse_error_recovery() {
    let (program, errors) = parse("var = 1; var y = 2; (1 + ; y = 3;");
    assert_eq!(errors.len(), 2, "{:?}", errors);
    assert_eq!(
        errors[0].kind,
        ParseErrorKind::Expected {
            expected: SynTag::Ident,
            got: Some(SynTag::Assign),
        }
    );
    assert_eq!(errors[0].span, 4..5);
    assert_eq!(
        errors[1].kind,
        ParseErrorKind::ExpectExpr {
            got: Some(SynTag::Semicolon)
        }
    );
    let formatted = format!("{}", program);
    pretty_assertions::assert_eq!(formatted.trim(), "(var y 2)\n(= y 3)");
}

#[test]
fn test_parse_stray_brace_and_bad_escape() {
    let (_, errors) = parse(r#"}; var s = "\q";"#);
    let kinds = errors.into_iter().map(|e| e.kind).collect::<Vec<_>>();
    pretty_assertions::assert_eq!(
        kinds,
        vec![
            ParseErrorKind::Unexpected(SynTag::RBrace),
            ParseErrorKind::ExpectExpr {
                got: Some(SynTag::Semicolon)
            },
            ParseErrorKind::InvalidEscape('q'),
        ]
    );
}

#[test]
fn test_parse_missing_semicolon_reports_end_of_input() {
    let (_, errors) = parse("x = 1");
    assert_eq!(errors.len(), 1);
    assert_eq!(format!("{}", errors[0]), "expected `;`, found end of input");
    assert_eq!(errors[0].span, 5..5);
}
