use std::sync::Arc;

use expect_test::expect;
use smol_str::SmolStr;

use crate::inst::{Inst, InstContainer, InstContainerMut, InstCursor};
use crate::{format_number, Constant, Function};

#[test]
fn test_opcode_words_round_trip() {
    let all = [
        Inst::Constant,
        Inst::Add,
        Inst::GetLocal,
        Inst::Call,
        Inst::Discard,
        Inst::Import,
    ];
    for inst in all {
        assert_eq!(Inst::from_word(inst.word()), Some(inst));
    }
    assert_eq!(Inst::from_word(-1), None);
    assert_eq!(Inst::from_word(10_000), None);
}

#[test]
fn test_fixed_arity() {
    assert_eq!(Inst::Add.arity(), 0);
    assert_eq!(Inst::Constant.arity(), 1);
    assert_eq!(Inst::GetLocal.arity(), 3);
    assert_eq!(
        Inst::RefIndexLocal.operand_names(),
        &["depth", "index", "is_upvalue"]
    );
}

#[test]
fn test_emit_and_patch() {
    let mut code = vec![];
    code.emit_p(Inst::JumpIfFalse, &[-1]);
    let placeholder = code.position() - 1;
    code.emit(Inst::Add);
    let target = code.position() as i32;
    code.patch(placeholder, target);

    pretty_assertions::assert_eq!(code, vec![Inst::JumpIfFalse.word(), 3, Inst::Add.word()]);

    let mut cursor = InstCursor::new(&code);
    assert_eq!(cursor.read_inst(), Inst::JumpIfFalse);
    assert_eq!(cursor.read_operand(), 3);
    assert_eq!(cursor.read_inst(), Inst::Add);
    assert!(cursor.is_at_end());
}

#[test]
#[should_panic(expected = "corrupt bytecode")]
fn test_reading_invalid_opcode_panics() {
    let code = vec![255];
    InstCursor::new(&code).read_inst();
}

#[test]
fn test_format_number() {
    assert_eq!(format_number(7.0), "7");
    assert_eq!(format_number(-3.0), "-3");
    assert_eq!(format_number(2.5), "2.5");
}

#[test]
fn test_disassemble() {
    let inner = Function {
        name: Some("twice".into()),
        code: {
            let mut c = vec![];
            c.emit_p(Inst::Constant, &[0])
                .emit_p(Inst::GetLocal, &[0, 0, 0])
                .emit(Inst::Mul)
                .emit_p(Inst::Return, &[1]);
            c
        },
        constants: vec![Constant::Number(2.0)],
        param_count: 1,
        local_count: 1,
    };
    let main = Function {
        name: Some("<main>".into()),
        code: {
            let mut c = vec![];
            c.emit_p(Inst::Constant, &[0])
                .emit_p(Inst::SetGlobal, &[0])
                .emit(Inst::Discard)
                .emit_p(Inst::Constant, &[1])
                .emit_p(Inst::GetBuiltin, &[1])
                .emit_p(Inst::Call, &[1])
                .emit(Inst::Discard)
                .emit_p(Inst::Return, &[0]);
            c
        },
        constants: vec![
            Constant::Function(Arc::new(inner)),
            Constant::Str("hi".into()),
        ],
        param_count: 0,
        local_count: 0,
    };

    let builtins: Vec<SmolStr> = vec!["print".into(), "println".into()];
    expect![[r#"
        == <main> ==
        00000000	OP_CONSTANT	0	<function twice>
        00000002	OP_SET_GLOBAL	0
        00000004	OP_DISCARD
        00000005	OP_CONSTANT	1	"hi"
        00000007	OP_GET_BUILTIN	1	println
        00000009	OP_CALL	1
        00000011	OP_DISCARD
        00000012	OP_RETURN	0

        == twice ==
        00000000	OP_CONSTANT	0	2
        00000002	OP_GET_LOCAL	0 0 0
        00000006	OP_MUL
        00000007	OP_RETURN	1
    "#]]
    .assert_eq(&main.disassemble(&builtins));
}
