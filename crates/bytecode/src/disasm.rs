use std::fmt::Write;

use itertools::Itertools;
use smol_str::SmolStr;

use crate::inst::{Inst, InstContainer, InstCursor};
use crate::{Constant, Function};

impl Function {
    /// Render this function and every function in its constant pool, one
    /// instruction per line: `<offset>\t<MNEMONIC>\t<operands...>`.
    ///
    /// `builtins` is used to name `OP_GET_BUILTIN` operands.
    pub fn disassemble(&self, builtins: &[SmolStr]) -> String {
        let mut out = String::new();
        self.disassemble_into(&mut out, builtins);
        out
    }

    fn disassemble_into(&self, out: &mut String, builtins: &[SmolStr]) {
        let name = self.name.as_deref().unwrap_or("<anonymous>");
        let _ = writeln!(out, "== {} ==", name);

        let mut cursor = InstCursor::new(&self.code);
        while !cursor.is_at_end() {
            let offset = cursor.ip();
            let inst = cursor.read_inst();
            let operands = (0..inst.arity())
                .map(|_| cursor.read_word())
                .collect::<Vec<_>>();

            let _ = write!(out, "{:08}\t{}", offset, inst);
            if !operands.is_empty() {
                let _ = write!(out, "\t{}", operands.iter().join(" "));
            }
            match inst {
                Inst::Constant | Inst::Import => {
                    if let Some(c) = self.constants.get(operands[0] as usize) {
                        let _ = write!(out, "\t{}", c);
                    }
                }
                Inst::GetBuiltin => {
                    if let Some(name) = builtins.get(operands[0] as usize) {
                        let _ = write!(out, "\t{}", name);
                    }
                }
                _ => {}
            }
            out.push('\n');
        }

        for c in &self.constants {
            if let Constant::Function(f) = c {
                out.push('\n');
                f.disassemble_into(out, builtins);
            }
        }
    }
}
