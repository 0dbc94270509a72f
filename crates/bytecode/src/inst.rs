mod util;

use enum_ordinalize::Ordinalize;

pub use util::*;

macro_rules! define_inst {
    (
        $(#[$meta:meta])*
        // type names
        $ty_vis:vis $type:ident,
        // instruction variant definition
        $(
            // metadata for this variant. Will be put inside the final enum
            $(#[$variant_meta:meta])*
            // variant name
            $name:ident
            // name used in disassembly
            = $mnemonic:literal
            // operand words
            $(($($param:ident),*))?
        ),* $(,)?
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Copy, Ordinalize)]
        #[repr(u8)]
        $ty_vis enum $type {$(
            $(#[$variant_meta])*
            $name
        ),*}

        impl $type {
            /// Names of the operand words following this opcode, in order.
            pub fn operand_names(self) -> &'static [&'static str] {
                match self {$(
                    $type::$name => &[$($(stringify!($param)),*)?],
                )*}
            }

            /// Number of operand words following this opcode.
            pub fn arity(self) -> usize {
                self.operand_names().len()
            }

            pub fn mnemonic(self) -> &'static str {
                match self {$(
                    $type::$name => $mnemonic,
                )*}
            }

            /// Decode an opcode word.
            pub fn from_word(word: i32) -> Option<$type> {
                u8::try_from(word).ok().and_then($type::from_ordinal)
            }

            pub fn word(self) -> i32 {
                self.ordinal() as i32
            }
        }

        impl ::std::fmt::Display for $type {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.mnemonic())
            }
        }
    };
}

// instruction definition.
//
// Each line is an instruction. The words in parentheses are the operands that
// follow the opcode word in the instruction stream; every opcode has a fixed
// operand count.
//
// Binary operators expect the left operand on the stack top and the right
// operand below it.
define_inst! {
    /// The list of instructions.
    pub Inst,

    /// Push the `idx`th constant of the current function
    Constant = "OP_CONSTANT" (idx),

    // arithmetic
    Add = "OP_ADD",
    Sub = "OP_SUB",
    Mul = "OP_MUL",
    Div = "OP_DIV",

    // comparison and logic
    Greater = "OP_GREATER",
    Less = "OP_LESS",
    Equal = "OP_EQUAL",
    /// Logical and of both operands' truthiness. Both operands are always evaluated.
    And = "OP_AND",
    /// Logical or of both operands' truthiness. Both operands are always evaluated.
    Or = "OP_OR",
    Not = "OP_NOT",
    /// Arithmetic negation
    Minus = "OP_MINUS",

    BitAnd = "OP_BIT_AND",
    BitOr = "OP_BIT_OR",
    BitXor = "OP_BIT_XOR",
    BitNot = "OP_BIT_NOT",

    // compound types
    /// Create a new array from `count` values. The first element is on the stack top.
    Array = "OP_ARRAY" (count),
    /// Pops `[index, target]` and pushes `target[index]`.
    GetIndex = "OP_GET_INDEX",
    /// Pops `[index, target]` and stores the value left below them into `target[index]`.
    SetIndex = "OP_SET_INDEX",
    /// Create a new struct from `count` `(value, name)` pairs.
    Struct = "OP_STRUCT" (count),
    /// Pops `[name, target]` and pushes the member.
    GetStruct = "OP_GET_STRUCT",
    /// Pops `[name, target]` and stores the value left below them into the member.
    SetStruct = "OP_SET_STRUCT",

    // control flow
    /// Continue at the absolute offset `target`
    Jump = "OP_JUMP" (target),
    /// Pop the stack top, continue at `target` if it is falsy
    JumpIfFalse = "OP_JUMP_IF_FALSE" (target),

    // load/stores
    GetGlobal = "OP_GET_GLOBAL" (slot),
    /// Store the stack top into a global slot. The value stays on the stack.
    SetGlobal = "OP_SET_GLOBAL" (slot),
    /// Load a local. If `is_upvalue` is set, the slot lives in the frame
    /// `depth` frames below the current one.
    GetLocal = "OP_GET_LOCAL" (depth, index, is_upvalue),
    /// Store the stack top into a local. The value stays on the stack.
    SetLocal = "OP_SET_LOCAL" (depth, index, is_upvalue),
    GetBuiltin = "OP_GET_BUILTIN" (idx),

    // references
    RefGlobal = "OP_REF_GLOBAL" (slot),
    RefLocal = "OP_REF_LOCAL" (depth, index, is_upvalue),
    /// Pops an index and pushes a reference to that element of the array in a global slot
    RefIndexGlobal = "OP_REF_INDEX_GLOBAL" (slot),
    /// Pops an index and pushes a reference to that element of the array in a local slot
    RefIndexLocal = "OP_REF_INDEX_LOCAL" (depth, index, is_upvalue),

    // function
    /// Call a function. The stack contains first the callee, and then the
    /// `argc` arguments to be passed into the function.
    ///
    /// ```plaintext
    /// (stack bottom) ..., func, arg0, arg1, ..., argN (stack top)
    ///                    |-----> These values are popped
    ///                    |<-- The result is pushed, if there is one
    /// (stack bottom) ..., result (stack top)
    /// ```
    Call = "OP_CALL" (argc),
    /// Return from the current function with 0 or 1 values
    Return = "OP_RETURN" (count),

    /// Truncate the stack to the current frame's floor (its base plus its locals).
    Discard = "OP_DISCARD",

    /// Load the extension library whose path is the `idx`th constant
    Import = "OP_IMPORT" (idx),
}
